//! Generator construction and sampling knobs

use crate::model::DevicePreference;
use serde::{Deserialize, Serialize};

/// How to load the offline model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// HuggingFace model ID or local checkpoint directory
    pub model_id: String,
    pub device: DevicePreference,
    /// Generation budget per request
    pub max_new_tokens: usize,
    /// Weight dtype: "f32", "f16", or "bf16"
    pub dtype: String,
    /// Upper bound on total sequence length. Clamped to the checkpoint's
    /// `max_position_embeddings` at load time.
    pub max_seq_length: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model_id: "Qwen/Qwen2.5-Coder-0.5B".to_string(),
            device: DevicePreference::Auto,
            max_new_tokens: 256,
            dtype: "f32".to_string(),
            max_seq_length: 4096,
        }
    }
}

impl GeneratorConfig {
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            ..Default::default()
        }
    }

    pub fn with_device(mut self, device: DevicePreference) -> Self {
        self.device = device;
        self
    }

    pub fn with_max_new_tokens(mut self, max_tokens: usize) -> Self {
        self.max_new_tokens = max_tokens;
        self
    }

    pub fn with_dtype(mut self, dtype: &str) -> Self {
        self.dtype = dtype.to_string();
        self
    }

    pub fn with_max_seq_length(mut self, max_seq_length: usize) -> Self {
        self.max_seq_length = max_seq_length;
        self
    }
}

/// Decoding controls for a single completion.
///
/// The default is greedy decoding: drafts must be reproducible, so
/// temperature stays at zero unless a caller opts into sampling. All
/// fields are public; anything without a setter can be set with struct
/// update syntax.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingParams {
    /// 0.0 selects argmax decoding
    pub temperature: f32,
    /// Nucleus sampling threshold, 1.0 disables
    pub top_p: f32,
    /// 0 disables
    pub top_k: usize,
    /// 1.0 disables
    pub repetition_penalty: f32,
    /// Overrides the generator's configured budget when set
    pub max_new_tokens: Option<usize>,
    /// Generation stops once any of these appears in the decoded output
    pub stop_sequences: Vec<String>,
    /// Only meaningful with temperature above zero
    pub seed: Option<u64>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            top_p: 1.0,
            top_k: 0,
            repetition_penalty: 1.0,
            max_new_tokens: None,
            stop_sequences: vec![],
            seed: None,
        }
    }
}

impl SamplingParams {
    /// Deterministic argmax decoding (same as the default, named for
    /// call sites)
    pub fn greedy() -> Self {
        Self::default()
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_new_tokens(mut self, max_tokens: usize) -> Self {
        self.max_new_tokens = Some(max_tokens);
        self
    }

    pub fn with_stop_sequences(mut self, sequences: Vec<String>) -> Self {
        self.stop_sequences = sequences;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_config_defaults() {
        let config = GeneratorConfig::default();

        assert_eq!(config.model_id, "Qwen/Qwen2.5-Coder-0.5B");
        assert_eq!(config.max_new_tokens, 256);
        assert_eq!(config.dtype, "f32");
        assert_eq!(config.max_seq_length, 4096);
    }

    #[test]
    fn test_generator_config_builder() {
        let config = GeneratorConfig::new("custom-model")
            .with_max_new_tokens(128)
            .with_dtype("f16")
            .with_device(DevicePreference::Cpu);

        assert_eq!(config.model_id, "custom-model");
        assert_eq!(config.max_new_tokens, 128);
        assert_eq!(config.dtype, "f16");
        assert_eq!(config.device, DevicePreference::Cpu);
    }

    #[test]
    fn test_sampling_defaults_are_greedy() {
        let params = SamplingParams::greedy();

        assert_eq!(params.temperature, 0.0);
        assert_eq!(params.top_p, 1.0);
        assert_eq!(params.top_k, 0);
        assert_eq!(params.repetition_penalty, 1.0);
        assert!(params.max_new_tokens.is_none());
        assert!(params.stop_sequences.is_empty());
    }

    #[test]
    fn test_sampling_overrides() {
        let params = SamplingParams {
            top_k: 40,
            ..SamplingParams::default()
        }
        .with_temperature(0.5)
        .with_max_new_tokens(64)
        .with_stop_sequences(vec!["\n#".to_string()]);

        assert_eq!(params.temperature, 0.5);
        assert_eq!(params.top_k, 40);
        assert_eq!(params.max_new_tokens, Some(64));
        assert_eq!(params.stop_sequences.len(), 1);
    }
}
