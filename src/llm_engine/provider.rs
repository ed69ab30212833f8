//! Chat provider trait and types
//!
//! Defines the message model shared by sessions and providers, the error
//! taxonomy for a single chat exchange, and the interface every streaming
//! backend implements.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::database::models::ApiEndpoint;
use crate::llm_engine::stream::ChatStream;

/// Model used when neither the endpoint nor its policy names one
pub const FALLBACK_MODEL: &str = "moonshot-v1-32k";

/// Error types for a chat exchange
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Endpoint is missing its URL or key; detected before any network call
    #[error("API endpoint '{endpoint}' is not fully configured: missing {missing}")]
    Configuration {
        endpoint: String,
        missing: &'static str,
    },
    /// Non-2xx status, empty body, or the connection failed
    #[error("{}", describe_transport(.status, .message))]
    Transport {
        status: Option<u16>,
        message: String,
    },
    /// The caller cancelled the request before a response arrived
    #[error("Request cancelled")]
    Aborted,
    /// A request is already in flight for this session
    #[error("Session {0} already has a request in flight")]
    Busy(String),
    /// The settings store could not be read
    #[error("Settings unavailable: {0}")]
    Settings(String),
}

fn describe_transport(status: &Option<u16>, message: &str) -> String {
    match *status {
        Some(code) if message.is_empty() => format!("HTTP error: {}", code),
        Some(code) => format!("HTTP error: {} ({})", code, message),
        None => format!("Request failed: {}", message),
    }
}

impl ChatError {
    pub fn transport(message: impl Into<String>) -> Self {
        ChatError::Transport {
            status: None,
            message: message.into(),
        }
    }

    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        ChatError::Transport {
            status: Some(status),
            message: message.into(),
        }
    }
}

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    /// Set on an assistant message committed from a cancelled stream
    #[serde(default)]
    pub interrupted: bool,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            interrupted: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            interrupted: false,
        }
    }

    pub fn interrupted_assistant(content: impl Into<String>) -> Self {
        Self {
            interrupted: true,
            ..Self::assistant(content)
        }
    }
}

/// Message as it goes over the wire: role and content only
#[derive(Debug, Serialize)]
pub struct WireMessage<'a> {
    pub role: MessageRole,
    pub content: &'a str,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(msg: &'a ChatMessage) -> Self {
        Self {
            role: msg.role,
            content: &msg.content,
        }
    }
}

/// Streaming chat-completion request body
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub stream: bool,
    pub messages: Vec<WireMessage<'a>>,
}

impl<'a> ChatCompletionRequest<'a> {
    pub fn streaming(model: &'a str, messages: &'a [ChatMessage]) -> Self {
        Self {
            model,
            stream: true,
            messages: messages.iter().map(WireMessage::from).collect(),
        }
    }
}

/// Raw response body as a stream of chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ChatError>> + Send>>;

/// Callback for streaming responses
pub type StreamCallback = Box<dyn Fn(String) + Send + Sync>;

/// The interface every streaming chat backend implements
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Get the provider name (e.g., "openai-compatible")
    fn provider_name(&self) -> &'static str;

    /// Send the conversation and return the decoded response stream.
    ///
    /// `messages` is the full history including the new user turn. The
    /// returned stream observes `cancel` on every pull.
    async fn open_stream(
        &self,
        endpoint: &ApiEndpoint,
        messages: &[ChatMessage],
        cancel: CancellationToken,
    ) -> Result<ChatStream, ChatError>;
}
