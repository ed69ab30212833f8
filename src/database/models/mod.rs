// Database models - Re-exports all domain-specific models
//
// This module is split into focused files by domain:
// - settings.rs: Application settings and defaults
// - endpoint.rs: Chat API endpoints and their request policy
// - template.rs: Prompt templates

mod settings;
mod endpoint;
mod template;

pub use settings::{Setting, AllSettings, AbortPolicy};
pub use endpoint::{ApiEndpoint, RequestPolicy, CreateApiEndpoint, UpdateApiEndpoint};
pub use template::{PromptTemplate, CreatePromptTemplate, UpdatePromptTemplate};
