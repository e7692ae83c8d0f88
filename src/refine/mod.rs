//! Remote draft refinement
//!
//! One optional correction round trip against a hosted chat-completion
//! service. The refiner is strictly fail-open: without a credential it is
//! never constructed, and any transport or protocol failure is logged and
//! reported as `Unavailable` so the pipeline keeps the offline draft. It
//! never retries and never turns a working conversion into an error.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;

/// Environment variable holding the service credential. Absent or empty
/// means offline-only mode, which is a supported configuration.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable overriding the refinement model name
pub const MODEL_ENV: &str = "TEXT2SQL_REFINER_MODEL";

/// Default hosted model used for refinement
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default chat-completions endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_MESSAGE: &str =
    "You are a senior database engineer. Return ONLY one valid SQL statement. No explanations.";

/// Configuration for the hosted refinement service
#[derive(Debug, Clone)]
pub struct RefinerConfig {
    /// API key for the hosted service
    pub api_key: String,

    /// Chat model used for refinement
    pub model: String,

    /// Chat-completions endpoint
    pub endpoint: String,
}

impl RefinerConfig {
    /// Create a config with the default model and endpoint
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Read refiner settings from the environment
    ///
    /// Returns `None` when the credential variable is unset or empty.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var(API_KEY_ENV).ok()?;
        if api_key.trim().is_empty() {
            return None;
        }

        let model = std::env::var(MODEL_ENV).unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Some(Self {
            api_key,
            model,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    /// Set the model name
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Set the endpoint URL
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }
}

/// Outcome of a refinement attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refinement {
    /// The service returned corrected SQL
    Refined(String),
    /// The attempt failed; the caller keeps the draft. The payload is the
    /// logged reason.
    Unavailable(String),
}

/// Client for the hosted refinement service
pub struct RemoteRefiner {
    client: reqwest::blocking::Client,
    config: RefinerConfig,
}

impl RemoteRefiner {
    /// Create a refiner with the given configuration
    pub fn new(config: RefinerConfig) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            config,
        }
    }

    /// Construct a refiner from environment configuration, if present
    pub fn from_env() -> Option<Self> {
        RefinerConfig::from_env().map(Self::new)
    }

    /// Get the configured model name
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Attempt one correction round trip
    ///
    /// Never fails: every error becomes `Refinement::Unavailable` after
    /// logging. No retry is attempted.
    pub fn refine(&self, request: &str, draft: &str) -> Refinement {
        match self.call_service(request, draft) {
            Ok(text) => Refinement::Refined(text),
            Err(e) => {
                tracing::warn!("Refinement unavailable, keeping draft: {:#}", e);
                Refinement::Unavailable(format!("{:#}", e))
            }
        }
    }

    fn call_service(&self, request: &str, draft: &str) -> Result<String> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_MESSAGE},
                {"role": "user", "content": user_message(request, draft)},
            ],
            "temperature": 0.0,
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .context("Refinement request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().unwrap_or_default();
            anyhow::bail!("Refinement service returned {}: {}", status, error_text);
        }

        let parsed: ChatResponse = response
            .json()
            .context("Failed to parse refinement response")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .context("Refinement response contained no choices")?;

        Ok(content.trim().to_string())
    }
}

/// Format the user message embedding the request and draft
fn user_message(request: &str, draft: &str) -> String {
    format!(
        "User request: {}\n# Draft SQL (may be wrong):\n{}\n# Final SQL:",
        request, draft
    )
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RefinerConfig::new("sk-test");

        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_config_builder() {
        let config = RefinerConfig::new("sk-test")
            .with_model("gpt-4o")
            .with_endpoint("http://localhost:8080/v1/chat/completions");

        assert_eq!(config.model, "gpt-4o");
        assert!(config.endpoint.starts_with("http://localhost"));
    }

    // The only test that touches the credential variables; covers unset,
    // empty, and set in sequence to avoid interleaving with itself.
    #[test]
    fn test_config_from_env_gating() {
        std::env::remove_var(API_KEY_ENV);
        std::env::remove_var(MODEL_ENV);
        assert!(RefinerConfig::from_env().is_none());

        std::env::set_var(API_KEY_ENV, "  ");
        assert!(RefinerConfig::from_env().is_none());

        std::env::set_var(API_KEY_ENV, "sk-test");
        let config = RefinerConfig::from_env().unwrap();
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.model, DEFAULT_MODEL);

        std::env::set_var(MODEL_ENV, "gpt-4o");
        let config = RefinerConfig::from_env().unwrap();
        assert_eq!(config.model, "gpt-4o");

        std::env::remove_var(API_KEY_ENV);
        std::env::remove_var(MODEL_ENV);
    }

    #[test]
    fn test_user_message_format() {
        let message = user_message("list users", "SELECT * FROM users;");

        assert_eq!(
            message,
            "User request: list users\n# Draft SQL (may be wrong):\nSELECT * FROM users;\n# Final SQL:"
        );
    }

    #[test]
    fn test_refine_fails_open_on_unreachable_endpoint() {
        // Connection refused locally; no network required
        let config =
            RefinerConfig::new("sk-test").with_endpoint("http://127.0.0.1:9/v1/chat/completions");
        let refiner = RemoteRefiner::new(config);

        match refiner.refine("list users", "SELECT * FROM users;") {
            Refinement::Unavailable(reason) => assert!(!reason.is_empty()),
            Refinement::Refined(text) => panic!("expected failure, got {:?}", text),
        }
    }

    #[test]
    fn test_chat_response_parsing() {
        let json = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "SELECT 1;"}}
            ]
        }"#;

        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content, "SELECT 1;");
    }
}
