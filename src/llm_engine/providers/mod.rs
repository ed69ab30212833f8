//! Chat provider implementations
//!
//! Each provider implements the ChatProvider trait for a specific wire format

pub mod openai_compat;

pub use openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
