//! Chat sessions over a streaming provider
//!
//! Module structure:
//! - types.rs: TurnOutcome
//! - session.rs: Session (history, selection, context)
//! - task_registry.rs: TaskRegistry, one in-flight request per session
//! - completion.rs: run_first_turn / run_follow_up and the history rules

pub mod types;
pub mod session;
pub mod task_registry;
pub mod completion;

pub use types::TurnOutcome;
pub use session::Session;
pub use task_registry::{ChatTask, TaskGuard, TaskRegistry};
pub use completion::{run_first_turn, run_follow_up, TurnContext};
