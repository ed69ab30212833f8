// Database models - Settings
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A single setting stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub value_type: String,
    pub updated_at: String,
}

/// What to do with a partial answer when the user cancels mid-stream
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AbortPolicy {
    /// Append the partial answer to history, tagged as interrupted
    #[default]
    CommitTagged,
    /// Drop the partial answer
    Discard,
}

impl fmt::Display for AbortPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortPolicy::CommitTagged => write!(f, "commit_tagged"),
            AbortPolicy::Discard => write!(f, "discard"),
        }
    }
}

impl FromStr for AbortPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commit_tagged" => Ok(AbortPolicy::CommitTagged),
            "discard" => Ok(AbortPolicy::Discard),
            other => Err(format!("Unknown abort policy: {}", other)),
        }
    }
}

/// All settings loaded at call time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllSettings {
    /// Endpoint used when the host does not pick one
    pub default_api_index: usize,
    /// Template used on the first turn when none is chosen explicitly
    pub default_prompt_index: usize,
    /// Lines of context taken on each side of the cursor
    pub context_radius: usize,
    pub abort_policy: AbortPolicy,
    /// Longest wait for response headers or the next streamed chunk; 0 disables it
    pub request_timeout_secs: u64,
}

impl Default for AllSettings {
    fn default() -> Self {
        Self {
            default_api_index: 0,
            default_prompt_index: 0,
            context_radius: 2,
            abort_policy: AbortPolicy::CommitTagged,
            request_timeout_secs: 120,
        }
    }
}
