// Database models - Chat API endpoints
use serde::{Deserialize, Serialize};

use crate::llm_engine::provider::FALLBACK_MODEL;

/// Per-endpoint request quirks (pacing, default model)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestPolicy {
    /// Minimum time between two requests to the same URL; 0 disables pacing
    pub min_request_interval_ms: u64,
    /// Model used when the endpoint leaves `model` empty
    pub default_model: Option<String>,
}

/// An OpenAI-compatible chat-completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiEndpoint {
    pub id: String,
    pub name: String,
    pub url: String,
    pub key: String,
    /// May be empty; see [`ApiEndpoint::effective_model`]
    pub model: String,
    pub policy: RequestPolicy,
    pub sort_order: i32,
}

impl ApiEndpoint {
    /// Endpoint not backed by the store, e.g. for one-off requests
    pub fn new(name: impl Into<String>, url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            url: url.into(),
            key: key.into(),
            model: String::new(),
            policy: RequestPolicy::default(),
            sort_order: 0,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_policy(mut self, policy: RequestPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Name of the first missing required field, if any
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.url.trim().is_empty() {
            Some("url")
        } else if self.key.trim().is_empty() {
            Some("key")
        } else {
            None
        }
    }

    pub fn is_configured(&self) -> bool {
        self.missing_field().is_none()
    }

    /// Configured model, else the policy default, else the fixed fallback
    pub fn effective_model(&self) -> &str {
        if !self.model.trim().is_empty() {
            return &self.model;
        }
        match self.policy.default_model.as_deref() {
            Some(model) if !model.trim().is_empty() => model,
            _ => FALLBACK_MODEL,
        }
    }

    /// Name for log lines and diagnostics
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.url
        } else {
            &self.name
        }
    }
}

/// Input for creating a new endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApiEndpoint {
    pub name: String,
    pub url: String,
    pub key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub policy: RequestPolicy,
}

/// Input for updating an endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateApiEndpoint {
    pub name: Option<String>,
    pub url: Option<String>,
    pub key: Option<String>,
    pub model: Option<String>,
    pub policy: Option<RequestPolicy>,
    pub sort_order: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field() {
        assert_eq!(ApiEndpoint::new("a", "", "k").missing_field(), Some("url"));
        assert_eq!(ApiEndpoint::new("a", "http://x", " ").missing_field(), Some("key"));
        assert!(ApiEndpoint::new("a", "http://x", "k").is_configured());
    }

    #[test]
    fn test_effective_model() {
        let endpoint = ApiEndpoint::new("a", "http://x", "k");
        assert_eq!(endpoint.effective_model(), FALLBACK_MODEL);

        let with_policy = endpoint.clone().with_policy(RequestPolicy {
            min_request_interval_ms: 2000,
            default_model: Some("glm-4-airx".to_string()),
        });
        assert_eq!(with_policy.effective_model(), "glm-4-airx");

        let explicit = with_policy.with_model("glm-4-plus");
        assert_eq!(explicit.effective_model(), "glm-4-plus");
    }
}
