//! Tools that models can use.

mod mcp;

pub use mcp::McpTool;
