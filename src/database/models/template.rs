// Database models - Prompt Templates
use serde::{Deserialize, Serialize};

/// A prompt template applied to the selection on the first turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptTemplate {
    pub id: String,
    pub name: String,
    /// Template text with optional `{{selection}}` / `{{context}}` tokens
    pub template: String,
    pub is_builtin: bool,
    pub sort_order: i32,
    pub created_at: String,
}

/// Input for creating a new prompt template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePromptTemplate {
    pub name: String,
    pub template: String,
    pub sort_order: Option<i32>,
}

/// Input for updating a prompt template
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePromptTemplate {
    pub name: Option<String>,
    pub template: Option<String>,
    pub sort_order: Option<i32>,
}
