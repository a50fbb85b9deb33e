//! # Agent Sandbox
//!
//! A tool-calling agent loop with an isolated code-execution sandbox.
//!
//! This library provides:
//! - A bounded reason/dispatch loop driven by an OpenAI-compatible model
//! - A tool registry with typed input schemas
//! - A sandbox that runs untrusted snippets in locked-down child processes
//! - HTTP services for chat and for remote code execution
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Receive a prompt via the API and append it to the thread
//! 2. Ask the oracle for a decision, offering the tool catalog
//! 3. Run any requested tools and record each call and its result
//! 4. Repeat until the oracle answers or a limit is reached
//!
//! ## Example
//!
//! ```rust,ignore
//! use agent_sandbox::{api, config::Config};
//!
//! let config = Config::from_env()?;
//! api::serve(config).await?;
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod llm;
pub mod safety;
pub mod sandbox;
pub mod store;
pub mod tools;

pub use config::Config;
