//! Streaming chat engine
//!
//! - `provider`: message model, error taxonomy and the `ChatProvider` trait
//! - `sse`: incremental decoder for `data:` records
//! - `stream`: pull-based event stream over one response body
//! - `providers`: HTTP backends

pub mod provider;
pub mod providers;
pub mod sse;
pub mod stream;

pub use provider::{
    ChatCompletionRequest, ChatError, ChatMessage, ChatProvider, MessageRole, StreamCallback,
    FALLBACK_MODEL,
};
pub use providers::{OpenAiCompatConfig, OpenAiCompatProvider};
pub use sse::{SseDecoder, SseRecord};
pub use stream::{ChatStream, StreamEvent, StreamStats};
