//! A conversation started from one selection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::PromptTemplate;
use crate::llm_engine::provider::ChatMessage;

/// One conversation: the history plus what the first turn is built from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Text the user selected when starting the session
    pub selection: String,
    /// Lines around the cursor at that time
    pub context: String,
    /// Template picked explicitly for the first turn
    pub template: Option<PromptTemplate>,
    /// Endpoint index to use instead of the configured default
    pub endpoint_override: Option<usize>,
    pub created_at: DateTime<Utc>,
    history: Vec<ChatMessage>,
}

impl Session {
    pub fn new(selection: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            selection: selection.into(),
            context: context.into(),
            template: None,
            endpoint_override: None,
            created_at: Utc::now(),
            history: Vec::new(),
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    pub fn with_endpoint(mut self, index: usize) -> Self {
        self.endpoint_override = Some(index);
        self
    }

    /// Messages so far, oldest first
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn is_first_turn(&self) -> bool {
        self.history.is_empty()
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.history.last()
    }

    pub(crate) fn push(&mut self, message: ChatMessage) {
        self.history.push(message);
    }

    /// Drop everything after the first `len` messages
    pub(crate) fn truncate(&mut self, len: usize) {
        self.history.truncate(len);
    }

    /// Forget the conversation but keep the selection, e.g. to ask again
    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}
