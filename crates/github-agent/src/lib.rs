//! A conversational agent that carries out GitHub operations.
//!
//! The crate wires a hosted model to the tools of a GitHub MCP server and
//! includes a CLI for using it in the terminal. It can also be used as a
//! library to embed the agent in other hosts.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod bootstrap;
pub mod command;
pub mod config;
mod session;
pub mod tools;

pub use session::{Reply, Session, SessionBuilder};

/// Re-exports of [`github_agent_core`] crate.
pub mod core {
    pub use github_agent_core::*;
}
