// ask-ai - streaming "ask about the selection" chat client
//
// Turns an editor selection into a prompt through a template, streams the
// answer from an OpenAI-compatible endpoint and keeps the conversation for
// follow-up questions.

// Performance logging macros - exported for use by other modules
#[macro_use]
pub mod macros;

// Core modules
pub mod database;
pub mod llm_engine;
pub mod templates;
pub mod chat;
pub mod host;
pub mod state;

pub use chat::{Session, TaskRegistry, TurnOutcome};
pub use database::DatabaseManager;
pub use host::{context_window, BufferSink, CallbackSink, ChatSink};
pub use llm_engine::{ChatError, ChatMessage, ChatProvider, MessageRole, OpenAiCompatProvider};
pub use state::AskAi;
pub use templates::resolver::{prefill_input, resolve};

/// Initialize env_logger to output to stderr (reads RUST_LOG env var).
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Same as [`init_logging`] with a custom filter for when RUST_LOG is unset
pub fn init_logging_with_default(filter: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp_millis()
        .try_init();
}
