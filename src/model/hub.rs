//! Checkpoint resolution
//!
//! Maps a Hub model ID or a local directory onto the concrete files the
//! generator loads: `config.json`, safetensors weights, `tokenizer.json`.
//! Remote checkpoints are fetched through `hf-hub` and land in its shared
//! cache; identifiers that start with `.`, `/`, or `~` are treated as
//! filesystem paths and never trigger a download.

use anyhow::{anyhow, Context, Result};
use hf_hub::api::sync::Api;
use std::path::{Path, PathBuf};

/// Files for one resolved checkpoint.
#[derive(Debug, Clone)]
pub struct ModelPath {
    /// Directory the files live in (Hub cache or the local directory)
    pub path: PathBuf,
    /// Identifier the checkpoint was resolved from
    pub model_id: String,
    /// True when resolved from a local directory rather than the Hub
    pub is_local: bool,
    pub config_file: PathBuf,
    pub weights_file: PathBuf,
    /// `tokenizer.json`, when the checkpoint ships one
    pub tokenizer_file: Option<PathBuf>,
}

impl ModelPath {
    /// Resolve a checkpoint that already sits in a local directory.
    pub fn from_local(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(anyhow!("model directory not found: {}", dir.display()));
        }

        let config_file = dir.join("config.json");
        if !config_file.exists() {
            return Err(anyhow!("no config.json in {}", dir.display()));
        }

        // VarBuilder mmaps safetensors; pickle checkpoints cannot be loaded
        let weights_file = dir.join("model.safetensors");
        if !weights_file.exists() {
            return Err(anyhow!(
                "no model.safetensors in {} (only safetensors checkpoints are supported)",
                dir.display()
            ));
        }

        let tokenizer_file = dir.join("tokenizer.json");

        Ok(Self {
            model_id: dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "local".to_string()),
            path: dir.to_path_buf(),
            is_local: true,
            config_file,
            weights_file,
            tokenizer_file: tokenizer_file.exists().then_some(tokenizer_file),
        })
    }
}

/// The subset of `config.json` the loader inspects.
///
/// Architecture routing and the decoder check read the typed fields. The
/// full document is re-parsed by the model-specific config when weights
/// load, so unknown keys are collected rather than rejected.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct HubModelConfig {
    #[serde(default)]
    pub architectures: Vec<String>,
    pub model_type: Option<String>,
    pub vocab_size: Option<usize>,
    pub hidden_size: Option<usize>,
    pub num_hidden_layers: Option<usize>,
    /// Context window the checkpoint was trained with
    pub max_position_embeddings: Option<usize>,
    /// End-of-sequence ID, when the config records one
    pub eos_token_id: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl HubModelConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;
        serde_json::from_str(&raw).context("Malformed config.json")
    }

    /// Decoder-only checkpoints advertise a `*ForCausalLM` architecture.
    pub fn is_causal_lm(&self) -> bool {
        self.architectures
            .iter()
            .any(|arch| arch.contains("ForCausalLM"))
            || matches!(self.model_type.as_deref(), Some("qwen2"))
    }

    /// Model family, read from `model_type` or inferred from the
    /// architecture list.
    pub fn resolved_model_type(&self) -> Option<String> {
        if let Some(kind) = &self.model_type {
            return Some(kind.clone());
        }
        self.architectures.iter().find_map(|arch| {
            arch.to_lowercase()
                .contains("qwen2")
                .then(|| "qwen2".to_string())
        })
    }

    /// Reject checkpoints the generator cannot run, before any weights are
    /// touched.
    pub fn ensure_causal_decoder(&self) -> Result<()> {
        if !self.is_causal_lm() {
            return Err(anyhow!(
                "Not a causal language model (architectures: {:?}, model_type: {:?})",
                self.architectures,
                self.model_type
            ));
        }
        for (field, present) in [
            ("vocab_size", self.vocab_size.is_some()),
            ("hidden_size", self.hidden_size.is_some()),
            ("num_hidden_layers", self.num_hidden_layers.is_some()),
        ] {
            if !present {
                return Err(anyhow!("config.json is missing {}", field));
            }
        }
        Ok(())
    }
}

/// Resolves model identifiers, downloading from the Hub when needed.
pub struct ModelLoader {
    api: Api,
}

impl ModelLoader {
    pub fn new() -> Result<Self> {
        Ok(Self {
            api: Api::new().context("Failed to initialize the HuggingFace Hub client")?,
        })
    }

    /// Turn an identifier into checkpoint files.
    ///
    /// Anything that exists on disk, or starts with `.`, `/`, or `~`, is
    /// treated as a local directory. Everything else goes through the Hub
    /// cache.
    pub fn resolve(&self, model_id_or_path: &str) -> Result<ModelPath> {
        if Path::new(model_id_or_path).exists() {
            tracing::info!("Using local checkpoint: {}", model_id_or_path);
            return ModelPath::from_local(model_id_or_path);
        }
        if looks_like_path(model_id_or_path) {
            return Err(anyhow!("local model path not found: {}", model_id_or_path));
        }
        self.fetch(model_id_or_path)
    }

    fn fetch(&self, model_id: &str) -> Result<ModelPath> {
        tracing::info!("Fetching checkpoint from the HuggingFace Hub: {}", model_id);
        let repo = self.api.model(model_id.to_string());

        let config_file = repo
            .get("config.json")
            .with_context(|| format!("Failed to fetch config.json for {}", model_id))?;

        let weights_file = repo.get("model.safetensors").map_err(|e| {
            anyhow!(
                "{} has no model.safetensors (only safetensors checkpoints are supported): {}",
                model_id,
                e
            )
        })?;

        let tokenizer_file = repo.get("tokenizer.json").ok();
        if tokenizer_file.is_none() {
            tracing::warn!("{} ships no tokenizer.json", model_id);
        }

        let path = config_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        tracing::debug!("Checkpoint cached at {}", path.display());

        Ok(ModelPath {
            path,
            model_id: model_id.to_string(),
            is_local: false,
            config_file,
            weights_file,
            tokenizer_file,
        })
    }
}

fn looks_like_path(s: &str) -> bool {
    s.starts_with('.') || s.starts_with('/') || s.starts_with('~')
}
