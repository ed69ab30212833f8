//! Prompt templates
//!
//! Storage lives in `database::template_repo`; this module turns a template
//! and the user's selection into the text that is actually sent.

pub mod resolver;

pub use resolver::{choose_template, first_turn_prompt, prefill_input, resolve, PrefilledInput};
