//! Tokenizer access for the generator
//!
//! Thin layer over `tokenizers` that adapts its boxed error type to
//! `anyhow` and knows the usual end-of-sequence spellings.

use anyhow::Result;
use std::path::Path;
use tokenizers::Tokenizer;

use super::hub::{ModelLoader, ModelPath};

/// End-of-sequence spellings, checked in order. A `config.json`
/// `eos_token_id` wins over this lookup when both exist.
const EOS_TOKENS: [&str; 4] = ["<|endoftext|>", "</s>", "<|im_end|>", "<eos>"];

pub struct TokenizerWrapper {
    tokenizer: Tokenizer,
}

impl TokenizerWrapper {
    /// Load from a `tokenizer.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        Ok(Self { tokenizer })
    }

    /// Load the tokenizer belonging to a resolved checkpoint.
    pub fn from_model_path(model_path: &ModelPath) -> Result<Self> {
        match &model_path.tokenizer_file {
            Some(file) => Self::from_file(file),
            None => Err(anyhow::anyhow!(
                "{} has no tokenizer.json",
                model_path.model_id
            )),
        }
    }

    /// Resolve a model ID or local path and load its tokenizer.
    pub fn from_pretrained(model_id_or_path: &str) -> Result<Self> {
        let model_path = ModelLoader::new()?.resolve(model_id_or_path)?;
        Self::from_model_path(&model_path)
    }

    pub fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, add_special_tokens)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;
        Ok(encoding.get_ids().to_vec())
    }

    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.tokenizer
            .decode(ids, skip_special_tokens)
            .map_err(|e| anyhow::anyhow!("Detokenization failed: {}", e))
    }

    /// Vocabulary ID of the end-of-sequence token, if any spelling is
    /// present.
    pub fn eos_token_id(&self) -> Option<u32> {
        EOS_TOKENS
            .iter()
            .find_map(|token| self.tokenizer.token_to_id(token))
    }
}
