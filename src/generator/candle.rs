//! Candle-backed local generator
//!
//! Loads Qwen2-family checkpoints through the Candle ML framework and runs
//! the incremental decoding loop. Model and tokenizer are loaded once at
//! construction; a failure here is fatal to the caller, there is no
//! degraded mode.

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::qwen2::{Config as Qwen2Config, ModelForCausalLM as Qwen2Model};
use std::sync::Mutex;

use super::{Generator, GeneratorConfig, SamplingParams};
use crate::model::{select_device, HubModelConfig, ModelLoader, ModelPath, TokenizerWrapper};

/// Fallback end-of-sequence ID for Qwen2 vocabularies
const QWEN2_EOS_TOKEN_ID: u32 = 151643;

/// Candle-based text generator
pub struct CandleGenerator {
    /// Model wrapped in Mutex for interior mutability (the KV cache mutates
    /// during the forward pass)
    model: Mutex<GeneratorModel>,
    tokenizer: TokenizerWrapper,
    config: GeneratorConfig,
    device: Device,
    eos_token_id: u32,
}

/// Loaded model, one variant per supported architecture
#[derive(Debug)]
enum GeneratorModel {
    Qwen2(Qwen2Model),
}

impl GeneratorModel {
    /// Drop the keys/values cached by a previous forward pass
    fn clear_cache(&mut self) {
        match self {
            GeneratorModel::Qwen2(model) => model.clear_kv_cache(),
        }
    }
}

impl CandleGenerator {
    /// Resolve, validate, and load the model eagerly
    pub fn new(mut config: GeneratorConfig) -> Result<Self> {
        let device = select_device(config.device)?;

        tracing::info!("Loading generation model: {}", config.model_id);
        tracing::info!("  Device: {:?}", device);
        tracing::info!("  Dtype: {}", config.dtype);
        tracing::info!("  Max new tokens: {}", config.max_new_tokens);

        let model_path = ModelLoader::new()?.resolve(&config.model_id)?;

        let hub_config = HubModelConfig::from_file(&model_path.config_file)?;
        hub_config.ensure_causal_decoder()?;

        if let Some(limit) = hub_config.max_position_embeddings {
            if config.max_seq_length > limit {
                tracing::warn!(
                    "max_seq_length {} exceeds the checkpoint's context window of {}, clamping",
                    config.max_seq_length,
                    limit
                );
                config.max_seq_length = limit;
            }
        }

        let tokenizer =
            TokenizerWrapper::from_model_path(&model_path).context("Failed to load tokenizer")?;

        let eos_token_id = hub_config
            .eos_token_id
            .or_else(|| tokenizer.eos_token_id())
            .unwrap_or(QWEN2_EOS_TOKEN_ID);

        let model = Self::load_model(&hub_config, &model_path, &config, &device)?;

        tracing::info!("Generator loaded successfully");

        Ok(Self {
            model: Mutex::new(model),
            tokenizer,
            config,
            device,
            eos_token_id,
        })
    }

    fn load_model(
        hub_config: &HubModelConfig,
        model_path: &ModelPath,
        config: &GeneratorConfig,
        device: &Device,
    ) -> Result<GeneratorModel> {
        let dtype = match config.dtype.as_str() {
            "f16" => DType::F16,
            "bf16" => DType::BF16,
            _ => DType::F32,
        };

        match hub_config.resolved_model_type().as_deref() {
            Some("qwen2") => {
                let config_str = std::fs::read_to_string(&model_path.config_file)
                    .context("Failed to read model config")?;
                let qwen_config: Qwen2Config =
                    serde_json::from_str(&config_str).context("Failed to parse Qwen2 config")?;

                tracing::info!(
                    "Loading Qwen2: vocab={} hidden={} layers={}",
                    qwen_config.vocab_size,
                    qwen_config.hidden_size,
                    qwen_config.num_hidden_layers
                );

                let vb = unsafe {
                    VarBuilder::from_mmaped_safetensors(&[&model_path.weights_file], dtype, device)
                        .context("Failed to load model weights")?
                };

                let model =
                    Qwen2Model::new(&qwen_config, vb).context("Failed to create Qwen2 model")?;

                Ok(GeneratorModel::Qwen2(model))
            }
            other => anyhow::bail!(
                "Unsupported model architecture: {:?} (architectures: {:?}). Supported: qwen2",
                other,
                hub_config.architectures
            ),
        }
    }

    /// Incremental decoding loop
    fn complete_internal(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        let mut all_tokens = self.tokenizer.encode(prompt, true)?;
        let prompt_len = all_tokens.len();

        if prompt_len == 0 {
            anyhow::bail!("Empty prompt after tokenization");
        }

        let max_tokens = params.max_new_tokens.unwrap_or(self.config.max_new_tokens);

        let seed = params.seed.unwrap_or(42);
        let temperature = if params.temperature > 0.0 {
            Some(params.temperature as f64)
        } else {
            None
        };
        let top_p = if params.top_p < 1.0 {
            Some(params.top_p as f64)
        } else {
            None
        };

        // temperature None makes this argmax (greedy) sampling
        let mut logits_processor = LogitsProcessor::new(seed, temperature, top_p);

        // Each request decodes from position 0 against an empty cache
        self.model
            .lock()
            .map_err(|e| anyhow::anyhow!("Model lock poisoned: {}", e))?
            .clear_cache();

        let mut pos = 0;
        for _ in 0..max_tokens {
            let context_size = if pos == 0 { all_tokens.len() } else { 1 };
            let start_pos = all_tokens.len().saturating_sub(context_size);
            let input_ids: Vec<u32> = all_tokens[start_pos..].to_vec();

            let input_tensor = Tensor::new(&input_ids[..], &self.device)?.unsqueeze(0)?;

            let logits = {
                let mut model_guard = self
                    .model
                    .lock()
                    .map_err(|e| anyhow::anyhow!("Model lock poisoned: {}", e))?;
                match &mut *model_guard {
                    GeneratorModel::Qwen2(model) => model.forward(&input_tensor, pos)?,
                }
            };

            // Logits for the last position only
            let logits = logits.squeeze(0)?;
            let logits = if logits.dims().len() > 1 {
                logits.get(logits.dim(0)? - 1)?
            } else {
                logits
            };

            let logits = if params.top_k > 0 {
                self.apply_top_k(&logits, params.top_k)?
            } else {
                logits
            };

            let logits = if params.repetition_penalty != 1.0 {
                self.apply_repetition_penalty(&logits, &all_tokens, params.repetition_penalty)?
            } else {
                logits
            };

            let next_token = logits_processor.sample(&logits)?;

            all_tokens.push(next_token);
            pos += context_size;

            if next_token == self.eos_token_id {
                tracing::debug!("Generation stopped: EOS token");
                break;
            }

            if !params.stop_sequences.is_empty() {
                let generated = self.tokenizer.decode(&all_tokens[prompt_len..], true)?;
                if params.stop_sequences.iter().any(|s| generated.contains(s)) {
                    tracing::debug!("Generation stopped: stop sequence");
                    break;
                }
            }
        }

        let continuation = self.tokenizer.decode(&all_tokens[prompt_len..], true)?;

        Ok(format!("{}{}", prompt, continuation))
    }

    /// Keep only the k highest logits, masking the rest to -inf
    fn apply_top_k(&self, logits: &Tensor, k: usize) -> Result<Tensor> {
        let vocab_size = logits.dim(0)?;
        if k >= vocab_size {
            return Ok(logits.clone());
        }

        let logits_vec: Vec<f32> = logits.to_vec1()?;
        let mut indexed: Vec<(usize, f32)> = logits_vec.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut filtered = vec![f32::NEG_INFINITY; vocab_size];
        for (idx, val) in indexed.into_iter().take(k) {
            filtered[idx] = val;
        }

        Ok(Tensor::new(&filtered[..], logits.device())?)
    }

    /// Penalize tokens that already appeared in the sequence
    ///
    /// Each distinct token in the history is penalized once, however many
    /// times it occurred.
    fn apply_repetition_penalty(
        &self,
        logits: &Tensor,
        tokens: &[u32],
        penalty: f32,
    ) -> Result<Tensor> {
        let mut logits_vec: Vec<f32> = logits.to_vec1()?;
        let seen: std::collections::HashSet<u32> = tokens.iter().copied().collect();

        for token in seen {
            let idx = token as usize;
            if idx < logits_vec.len() {
                if logits_vec[idx] > 0.0 {
                    logits_vec[idx] /= penalty;
                } else {
                    logits_vec[idx] *= penalty;
                }
            }
        }

        Ok(Tensor::new(&logits_vec[..], logits.device())?)
    }
}

impl Generator for CandleGenerator {
    fn complete(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        self.complete_internal(prompt, params)
    }

    fn model_name(&self) -> &str {
        &self.config.model_id
    }

    fn max_context_length(&self) -> usize {
        self.config.max_seq_length
    }

    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(self.tokenizer.encode(text, false)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DevicePreference;
    use crate::prompt::PromptBuilder;

    #[test]
    fn test_unsupported_architecture_rejected() {
        let hub_config = HubModelConfig {
            architectures: vec!["GPTBigCodeForCausalLM".to_string()],
            model_type: Some("gpt_bigcode".to_string()),
            vocab_size: Some(49152),
            hidden_size: Some(2048),
            num_hidden_layers: Some(24),
            max_position_embeddings: Some(8192),
            eos_token_id: Some(0),
            extra: serde_json::Value::Null,
        };
        let model_path = ModelPath {
            path: "/tmp".into(),
            model_id: "test".to_string(),
            is_local: true,
            config_file: "/tmp/config.json".into(),
            weights_file: "/tmp/model.safetensors".into(),
            tokenizer_file: None,
        };
        let config = GeneratorConfig::new("test").with_device(DevicePreference::Cpu);

        let result =
            CandleGenerator::load_model(&hub_config, &model_path, &config, &Device::Cpu);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Unsupported model architecture"));
    }

    /// One decoder layer, eight-word vocabulary, zero weights. Enough to
    /// drive the decode loop on CPU without downloading anything.
    fn write_tiny_qwen2_checkpoint(dir: &std::path::Path) {
        let config = r#"{
            "architectures": ["Qwen2ForCausalLM"],
            "model_type": "qwen2",
            "vocab_size": 8,
            "hidden_size": 8,
            "intermediate_size": 16,
            "num_hidden_layers": 1,
            "num_attention_heads": 2,
            "num_key_value_heads": 1,
            "max_position_embeddings": 64,
            "sliding_window": 64,
            "max_window_layers": 1,
            "tie_word_embeddings": false,
            "rope_theta": 10000.0,
            "rms_norm_eps": 1e-6,
            "use_sliding_window": false,
            "hidden_act": "silu",
            "eos_token_id": 0
        }"#;
        std::fs::write(dir.join("config.json"), config).unwrap();

        let tokenizer = r#"{
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": {"type": "Whitespace"},
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": {"<unk>": 0, "a": 1, "b": 2, "c": 3, "d": 4, "e": 5, "f": 6, "g": 7},
                "unk_token": "<unk>"
            }
        }"#;
        std::fs::write(dir.join("tokenizer.json"), tokenizer).unwrap();

        let shapes: &[(&str, &[usize])] = &[
            ("model.embed_tokens.weight", &[8, 8]),
            ("model.layers.0.self_attn.q_proj.weight", &[8, 8]),
            ("model.layers.0.self_attn.q_proj.bias", &[8]),
            ("model.layers.0.self_attn.k_proj.weight", &[4, 8]),
            ("model.layers.0.self_attn.k_proj.bias", &[4]),
            ("model.layers.0.self_attn.v_proj.weight", &[4, 8]),
            ("model.layers.0.self_attn.v_proj.bias", &[4]),
            ("model.layers.0.self_attn.o_proj.weight", &[8, 8]),
            ("model.layers.0.mlp.gate_proj.weight", &[16, 8]),
            ("model.layers.0.mlp.up_proj.weight", &[16, 8]),
            ("model.layers.0.mlp.down_proj.weight", &[8, 16]),
            ("model.layers.0.input_layernorm.weight", &[8]),
            ("model.layers.0.post_attention_layernorm.weight", &[8]),
            ("model.norm.weight", &[8]),
            ("lm_head.weight", &[8, 8]),
        ];
        let mut tensors = std::collections::HashMap::<String, Tensor>::new();
        for (name, dims) in shapes {
            tensors.insert(
                name.to_string(),
                Tensor::zeros(*dims, DType::F32, &Device::Cpu).unwrap(),
            );
        }
        candle_core::safetensors::save(&tensors, dir.join("model.safetensors")).unwrap();
    }

    #[test]
    fn test_second_completion_matches_first() {
        let dir = tempfile::tempdir().unwrap();
        write_tiny_qwen2_checkpoint(dir.path());

        let generator = CandleGenerator::new(
            GeneratorConfig::new(dir.path().to_str().unwrap())
                .with_device(DevicePreference::Cpu)
                .with_max_new_tokens(4),
        )
        .unwrap();

        // The same instance serves every request for the process lifetime,
        // so a completion must not disturb the ones after it.
        let first = generator
            .complete("a b c d", &SamplingParams::greedy())
            .unwrap();
        let second = generator
            .complete("a b c d", &SamplingParams::greedy())
            .unwrap();

        assert!(first.starts_with("a b c d"));
        assert!(first.len() > "a b c d".len());
        assert_eq!(first, second);
    }

    #[test]
    #[ignore]
    fn test_complete_returns_prompt_and_continuation() {
        let generator = CandleGenerator::new(
            GeneratorConfig::default()
                .with_device(DevicePreference::Cpu)
                .with_max_new_tokens(16),
        )
        .unwrap();

        let prompt = PromptBuilder::new().build("Count all users.");
        let output = generator
            .complete(&prompt, &SamplingParams::greedy())
            .unwrap();

        assert!(output.starts_with(&prompt));
        assert!(output.len() > prompt.len());

        // Greedy decoding on a fresh cache is deterministic, so a repeat
        // request through the same instance yields the same text
        let again = generator
            .complete(&prompt, &SamplingParams::greedy())
            .unwrap();
        assert_eq!(output, again);
    }
}
