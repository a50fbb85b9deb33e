//! Agent module - the tool dispatch loop.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Append the user prompt to the thread and load its history
//! 2. Ask the oracle for a decision, offering the tool catalog
//! 3. If it requests tools, run them concurrently and record each call and result
//! 4. Repeat until it answers, the iteration cap is hit, or the deadline passes

mod orchestrator;
mod prompt;

pub use orchestrator::{
    AgentError, AgentLimits, LogEntryType, Orchestrator, Reply, StopReason, TurnLogEntry,
};
pub use prompt::build_system_prompt;
