//! Core logic including the agent loop, tool execution, configurations, etc.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
mod config;
pub mod conversation;
mod model_client;
pub mod tool;

pub use agent::{
    Agent, AgentBuilder, AgentMode, TranscriptSource, TurnOutcome, TurnStatus,
};
pub use config::AgentConfig;
