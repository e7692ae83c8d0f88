//! Offline text generation
//!
//! Trait-based abstraction over local decoder LLMs with a Candle
//! implementation.

pub mod candle;
pub mod config;

pub use candle::CandleGenerator;
pub use config::{GeneratorConfig, SamplingParams};

use anyhow::Result;

/// A loaded model that can continue prompts.
pub trait Generator: Send + Sync {
    /// Continue `prompt`, returning the prompt with its continuation
    /// appended.
    ///
    /// The prompt travels with the output because downstream extraction
    /// keys off markers inside it.
    fn complete(&self, prompt: &str, params: &SamplingParams) -> Result<String>;

    /// Identifier of the underlying model
    fn model_name(&self) -> &str;

    /// Longest sequence the model accepts, in tokens
    fn max_context_length(&self) -> usize;

    /// Token count of `text`, for checking prompts against the context
    /// window
    fn count_tokens(&self, text: &str) -> Result<usize>;
}

/// Build the default Candle-backed generator.
pub fn create_generator(config: GeneratorConfig) -> Result<Box<dyn Generator>> {
    Ok(Box::new(CandleGenerator::new(config)?))
}
