//! Conversion pipeline orchestration
//!
//! Chains prompt construction, offline generation, draft extraction,
//! optional remote refinement, and fence stripping into one deterministic
//! request-to-SQL flow.
//!
//! # Architecture
//!
//! ```text
//! Request
//!     │
//!     ▼
//! ┌───────────────┐
//! │ PromptBuilder │  ← fixed few-shot schema template
//! └───────────────┘
//!     │
//!     ▼ Prompt
//! ┌───────────────┐
//! │   Generator   │  ← local causal LM, greedy decoding
//! └───────────────┘
//!     │
//!     ▼ raw completion
//! ┌───────────────┐
//! │  extract_sql  │  ← marker search + comment filtering
//! └───────────────┘
//!     │
//!     ▼ draft
//! ┌───────────────┐
//! │ RemoteRefiner │  ← optional, fail-open
//! └───────────────┘
//!     │
//!     ▼
//! ┌───────────────┐
//! │ strip_fences  │
//! └───────────────┘
//!     │
//!     ▼
//! FinalSQL (String)
//! ```
//!
//! Generator errors propagate to the caller; refinement failures are
//! absorbed and the draft passes through unchanged.
//!
//! # Example
//!
//! ```ignore
//! use text2sql::generator::{create_generator, GeneratorConfig};
//! use text2sql::pipeline::PipelineBuilder;
//!
//! let generator = create_generator(GeneratorConfig::default())?;
//! let pipeline = PipelineBuilder::new()
//!     .generator_boxed(generator)
//!     .refiner_from_env()
//!     .build()?;
//!
//! let sql = pipeline.convert("Find total number of orders placed by each user.")?;
//! println!("{}", sql);
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::extract::{extract_sql, strip_fences};
use crate::generator::{Generator, SamplingParams};
use crate::prompt::PromptBuilder;
use crate::refine::{Refinement, RemoteRefiner};

/// Configuration for the conversion pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Sampling parameters for draft generation
    pub sampling_params: SamplingParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampling_params: SamplingParams::greedy(),
        }
    }
}

/// Outcome of a single request conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversion {
    /// Final SQL statement (may be empty if the model produced nothing
    /// usable)
    pub sql: String,
    /// Draft as extracted from offline generation, before refinement
    pub draft: String,
    /// Whether the remote refiner produced the final text
    pub refined: bool,
    /// Prompt length in tokens
    pub prompt_tokens: usize,
    /// Offline generation time in milliseconds
    pub generation_time_ms: u64,
    /// Remote refinement time in milliseconds (0 when skipped)
    pub refinement_time_ms: u64,
}

impl Conversion {
    /// Get total processing time in milliseconds
    pub fn total_time_ms(&self) -> u64 {
        self.generation_time_ms + self.refinement_time_ms
    }
}

impl std::fmt::Display for Conversion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SQL: {}", self.sql)?;
        if self.refined {
            writeln!(f, "\nDraft before refinement: {}", self.draft)?;
        }
        writeln!(
            f,
            "\nTiming: generation={}ms, refinement={}ms, total={}ms ({} prompt tokens)",
            self.generation_time_ms,
            self.refinement_time_ms,
            self.total_time_ms(),
            self.prompt_tokens
        )?;
        Ok(())
    }
}

/// Request-to-SQL conversion pipeline
///
/// Owns the generator for the process lifetime; construct it once at
/// startup (model loading is the expensive step) and reuse it across
/// requests. Use `PipelineBuilder` to assemble one.
pub struct Pipeline {
    prompt_builder: PromptBuilder,
    generator: Box<dyn Generator>,
    refiner: Option<RemoteRefiner>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline (use PipelineBuilder instead)
    pub fn new(
        prompt_builder: PromptBuilder,
        generator: Box<dyn Generator>,
        refiner: Option<RemoteRefiner>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            prompt_builder,
            generator,
            refiner,
            config,
        }
    }

    /// Convert a natural-language request into a single SQL statement
    ///
    /// This is the primary entry point. Errors only when offline
    /// generation itself fails; refinement failures degrade to the
    /// unrefined draft.
    pub fn convert(&self, request: &str) -> Result<String> {
        Ok(self.convert_detailed(request)?.sql)
    }

    /// Convert a request, returning the full diagnostic report
    pub fn convert_detailed(&self, request: &str) -> Result<Conversion> {
        let request = request.trim();
        let prompt = self.prompt_builder.build(request);

        let prompt_tokens = self.generator.count_tokens(&prompt)?;
        if prompt_tokens > self.generator.max_context_length() {
            tracing::warn!(
                "Prompt ({} tokens) exceeds model context ({} tokens)",
                prompt_tokens,
                self.generator.max_context_length()
            );
        }

        let generation_start = Instant::now();
        let raw = self
            .generator
            .complete(&prompt, &self.config.sampling_params)?;
        let generation_time_ms = generation_start.elapsed().as_millis() as u64;

        let draft = extract_sql(&raw);
        tracing::debug!("Extracted draft: {}", draft);

        let mut refinement_time_ms = 0;
        let (refined, text) = match &self.refiner {
            Some(refiner) => {
                let refinement_start = Instant::now();
                let outcome = refiner.refine(request, &draft);
                refinement_time_ms = refinement_start.elapsed().as_millis() as u64;

                match outcome {
                    Refinement::Refined(text) => (true, text),
                    Refinement::Unavailable(_) => {
                        // Reason already logged by the refiner
                        tracing::debug!("Falling back to unrefined draft");
                        (false, draft.clone())
                    }
                }
            }
            None => {
                tracing::debug!("No refiner configured, keeping draft");
                (false, draft.clone())
            }
        };

        let sql = strip_fences(&text);

        Ok(Conversion {
            sql,
            draft,
            refined,
            prompt_tokens,
            generation_time_ms,
            refinement_time_ms,
        })
    }

    /// Get the generator reference
    pub fn generator(&self) -> &dyn Generator {
        self.generator.as_ref()
    }

    /// Get the refiner reference (if configured)
    pub fn refiner(&self) -> Option<&RemoteRefiner> {
        self.refiner.as_ref()
    }
}

/// Builder for Pipeline
pub struct PipelineBuilder {
    prompt_builder: PromptBuilder,
    generator: Option<Box<dyn Generator>>,
    refiner: Option<RemoteRefiner>,
    config: PipelineConfig,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            prompt_builder: PromptBuilder::new(),
            generator: None,
            refiner: None,
            config: PipelineConfig::default(),
        }
    }

    /// Set the prompt builder
    pub fn prompt_builder(mut self, prompt_builder: PromptBuilder) -> Self {
        self.prompt_builder = prompt_builder;
        self
    }

    /// Set the generator using a boxed trait object
    pub fn generator_boxed(mut self, generator: Box<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set the refiner
    pub fn refiner(mut self, refiner: RemoteRefiner) -> Self {
        self.refiner = Some(refiner);
        self
    }

    /// Configure the refiner from the environment
    ///
    /// Leaves the pipeline offline-only when no credential is set.
    pub fn refiner_from_env(mut self) -> Self {
        self.refiner = RemoteRefiner::from_env();
        match &self.refiner {
            Some(refiner) => {
                tracing::info!("Remote refinement enabled (model: {})", refiner.model())
            }
            None => tracing::debug!("No refinement credential set, running offline-only"),
        }
        self
    }

    /// Set the config
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set sampling parameters directly
    pub fn sampling_params(mut self, params: SamplingParams) -> Self {
        self.config.sampling_params = params;
        self
    }

    /// Build the pipeline
    pub fn build(self) -> Result<Pipeline> {
        let generator = self
            .generator
            .context("Generator is required to build Pipeline")?;

        Ok(Pipeline::new(
            self.prompt_builder,
            generator,
            self.refiner,
            self.config,
        ))
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refine::RefinerConfig;

    /// Echoes the prompt followed by a fixed continuation
    struct EchoGenerator {
        continuation: String,
    }

    impl EchoGenerator {
        fn new(continuation: &str) -> Self {
            Self {
                continuation: continuation.to_string(),
            }
        }
    }

    impl Generator for EchoGenerator {
        fn complete(&self, prompt: &str, _params: &SamplingParams) -> Result<String> {
            Ok(format!("{}\n{}", prompt, self.continuation))
        }

        fn model_name(&self) -> &str {
            "echo"
        }

        fn max_context_length(&self) -> usize {
            4096
        }

        fn count_tokens(&self, text: &str) -> Result<usize> {
            Ok(text.split_whitespace().count())
        }
    }

    struct FailingGenerator;

    impl Generator for FailingGenerator {
        fn complete(&self, _prompt: &str, _params: &SamplingParams) -> Result<String> {
            anyhow::bail!("device lost")
        }

        fn model_name(&self) -> &str {
            "failing"
        }

        fn max_context_length(&self) -> usize {
            4096
        }

        fn count_tokens(&self, _text: &str) -> Result<usize> {
            Ok(0)
        }
    }

    fn offline_pipeline(continuation: &str) -> Pipeline {
        PipelineBuilder::new()
            .generator_boxed(Box::new(EchoGenerator::new(continuation)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_convert_fenced_draft() {
        let pipeline = offline_pipeline("```sql\nSELECT COUNT(*) FROM orders;\n```");
        let sql = pipeline
            .convert("Find total number of orders placed by each user.")
            .unwrap();

        assert_eq!(sql, "SELECT COUNT(*) FROM orders;");
    }

    #[test]
    fn test_convert_plain_draft() {
        let pipeline = offline_pipeline("SELECT email FROM users;");

        assert_eq!(
            pipeline.convert("List every email address.").unwrap(),
            "SELECT email FROM users;"
        );
    }

    #[test]
    fn test_convert_matches_unrefined_chain() {
        // Without a refiner, convert must equal the composed stages exactly
        let continuation = "```sql\nSELECT order_total FROM orders;\n```\n# done";
        let request = "Show order totals.";
        let pipeline = offline_pipeline(continuation);

        let prompt = PromptBuilder::new().build(request);
        let raw = format!("{}\n{}", prompt, continuation);
        let expected = strip_fences(&extract_sql(&raw));

        assert_eq!(pipeline.convert(request).unwrap(), expected);
    }

    #[test]
    fn test_convert_trims_request() {
        let pipeline = offline_pipeline("SELECT 1;");

        let padded = pipeline.convert("  count things  ").unwrap();
        let plain = pipeline.convert("count things").unwrap();

        assert_eq!(padded, plain);
    }

    #[test]
    fn test_convert_empty_continuation() {
        let pipeline = offline_pipeline("");

        // An empty draft is a valid outcome, not an error
        assert_eq!(pipeline.convert("anything").unwrap(), "");
    }

    #[test]
    fn test_unreachable_refiner_keeps_draft() {
        let refiner = RemoteRefiner::new(
            RefinerConfig::new("sk-test").with_endpoint("http://127.0.0.1:9/v1/chat/completions"),
        );
        let pipeline = PipelineBuilder::new()
            .generator_boxed(Box::new(EchoGenerator::new("SELECT 1;")))
            .refiner(refiner)
            .build()
            .unwrap();

        let conversion = pipeline.convert_detailed("select one").unwrap();
        assert!(!conversion.refined);
        assert_eq!(conversion.sql, "SELECT 1;");

        // Same output as a pipeline that never had a refiner
        let offline = offline_pipeline("SELECT 1;").convert("select one").unwrap();
        assert_eq!(conversion.sql, offline);
    }

    #[test]
    fn test_generator_error_propagates() {
        let pipeline = PipelineBuilder::new()
            .generator_boxed(Box::new(FailingGenerator))
            .build()
            .unwrap();

        assert!(pipeline.convert("anything").is_err());
    }

    #[test]
    fn test_build_requires_generator() {
        let result = PipelineBuilder::new().build();

        assert!(result.is_err());
    }

    #[test]
    fn test_conversion_report_fields() {
        let pipeline = offline_pipeline("SELECT 1;");
        assert_eq!(pipeline.generator().model_name(), "echo");
        assert!(pipeline.refiner().is_none());

        let conversion = pipeline.convert_detailed("select one").unwrap();

        assert_eq!(conversion.sql, "SELECT 1;");
        assert_eq!(conversion.draft, "SELECT 1;");
        assert!(!conversion.refined);
        assert!(conversion.prompt_tokens > 0);
        assert_eq!(conversion.refinement_time_ms, 0);
    }

    #[test]
    fn test_conversion_display() {
        let conversion = Conversion {
            sql: "SELECT 1;".to_string(),
            draft: "SELECT 1;".to_string(),
            refined: false,
            prompt_tokens: 120,
            generation_time_ms: 500,
            refinement_time_ms: 100,
        };

        let display = format!("{}", conversion);
        assert!(display.contains("SQL: SELECT 1;"));
        assert!(display.contains("600ms"));
        assert!(!display.contains("Draft before refinement"));
    }
}
