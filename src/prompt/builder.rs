//! Prompt builder
//!
//! Substitutes the user request into the few-shot template. The request is
//! inserted verbatim with no escaping; the demonstration schema is fixed, so
//! there is nothing to sanitize against here.

use super::template::{REQUEST_SLOT, SQL_FEW_SHOT_TEMPLATE};

/// Builds generation prompts from a template with a `{request}` slot
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            template: SQL_FEW_SHOT_TEMPLATE.to_string(),
        }
    }
}

impl PromptBuilder {
    /// Create a builder using the default few-shot template
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the template; it must contain a `{request}` slot
    pub fn with_template(mut self, template: &str) -> Self {
        self.template = template.to_string();
        self
    }

    /// Get the template text
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Build the prompt for a request. Deterministic: the same request
    /// always yields the same prompt.
    pub fn build(&self, request: &str) -> String {
        self.template.replace(REQUEST_SLOT, request)
    }
}
