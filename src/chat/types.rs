//! Chat types and structures

use serde::{Deserialize, Serialize};

/// How a turn that did not fail ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Stream finished; `signaled` is false when the body ended without `[DONE]`
    Completed { answer: String, signaled: bool },
    /// Cancelled by the user; `committed` tells whether the partial answer
    /// went into the history
    Aborted { partial: String, committed: bool },
}

impl TurnOutcome {
    /// Answer text, complete or partial
    pub fn text(&self) -> &str {
        match self {
            TurnOutcome::Completed { answer, .. } => answer,
            TurnOutcome::Aborted { partial, .. } => partial,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TurnOutcome::Completed { .. })
    }
}
