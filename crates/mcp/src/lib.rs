//! A minimal Model Context Protocol client.
//!
//! The client launches a tool server as a child process and talks
//! newline-delimited JSON-RPC 2.0 over its stdio. Only the parts needed to
//! discover and invoke tools are implemented.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod client;
mod config;
mod error;
mod protocol;

pub use client::McpClient;
pub use config::McpServerConfig;
pub use error::Error;
pub use protocol::{CallToolResult, Content, ServerInfo, ToolDescriptor};
