//! Startup of the tool source and the fallback decision.

use clap::ValueEnum;
use github_agent_core::tool::ToolRegistry;
use github_agent_mcp::{
    Error as McpError, McpClient, McpServerConfig, ServerInfo, ToolDescriptor,
};
use serde::Deserialize;
use thiserror::Error;

use crate::tools::McpTool;

/// Why the tool registry could not be set up.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// A variable the tool server needs is not set.
    #[error("environment variable `{var}` is not set")]
    MissingCredential {
        /// Name of the variable.
        var: String,
    },
    /// The tool server could not be started or talked to.
    #[error(transparent)]
    Mcp(#[from] McpError),
    /// The tool server offers no tools.
    #[error("MCP server '{server}' provides no tools")]
    NoTools {
        /// Name of the server.
        server: String,
    },
}

impl BootstrapError {
    /// Returns the name of the server involved, if it was reached.
    pub fn server(&self) -> Option<&str> {
        match self {
            BootstrapError::MissingCredential { .. } => None,
            BootstrapError::Mcp(err) => Some(err.server()),
            BootstrapError::NoTools { server } => Some(server),
        }
    }
}

/// Which bootstrap failures switch the session to tool-less mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Fall back on every bootstrap failure.
    #[default]
    Any,
    /// Fall back only when the tool server itself is unreachable.
    Unreachable,
    /// Never fall back; bootstrap failures end the process.
    Never,
}

impl FallbackPolicy {
    /// Returns `true` if `err` should lead to tool-less mode.
    pub fn allows(self, err: &BootstrapError) -> bool {
        match self {
            FallbackPolicy::Any => true,
            FallbackPolicy::Never => false,
            FallbackPolicy::Unreachable => matches!(
                err,
                BootstrapError::Mcp(
                    McpError::Spawn { .. }
                        | McpError::Transport { .. }
                        | McpError::InvalidJson { .. }
                        | McpError::Terminated { .. }
                        | McpError::Cancelled { .. }
                        | McpError::Timeout { .. }
                )
            ),
        }
    }
}

/// What to start and what it needs.
#[derive(Clone, Debug)]
pub struct BootstrapOptions {
    /// How to launch the tool server.
    pub server: McpServerConfig,
    /// Variables that must be set before launching.
    pub required_env: Vec<String>,
    /// Whether an empty tool list is a failure.
    pub require_tools: bool,
}

/// A running tool server and the tools it offers.
pub struct Toolset {
    /// The connection to the server.
    pub client: McpClient,
    /// The tools, ready to be handed to an agent.
    pub registry: ToolRegistry,
    /// The descriptors in the order the server listed them.
    pub descriptors: Vec<ToolDescriptor>,
    /// The name and version the server reported.
    pub server_info: Option<ServerInfo>,
    /// Usage instructions the server sent, meant for the model.
    pub instructions: Option<String>,
}

impl Toolset {
    /// Wraps the listed tools of a connected server.
    pub async fn new(client: McpClient, descriptors: Vec<ToolDescriptor>) -> Self {
        let registry = McpTool::registry(&client, descriptors.iter().cloned());
        let server_info = client.server_info().await;
        let instructions = client
            .instructions()
            .await
            .filter(|text| !text.trim().is_empty());
        Self {
            client,
            registry,
            descriptors,
            server_info,
            instructions,
        }
    }
}

/// The outcome of [`bootstrap`].
pub enum Bootstrap {
    /// Tools are available.
    Tools(Toolset),
    /// Tools are not available and the policy allows going on without them.
    Fallback(BootstrapError),
}

/// Starts the tool server and collects its tools. A single attempt is made.
///
/// `env` looks up environment variables, usually [`std::env::var`].
pub async fn load_tools(
    options: &BootstrapOptions,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Toolset, BootstrapError> {
    for var in &options.required_env {
        if env(var).is_none_or(|value| value.trim().is_empty()) {
            return Err(BootstrapError::MissingCredential { var: var.clone() });
        }
    }

    let client = McpClient::spawn(&options.server).await?;
    let descriptors = match client.list_tools().await {
        Ok(descriptors) => descriptors,
        Err(err) => {
            client.shutdown().await;
            return Err(err.into());
        }
    };
    if descriptors.is_empty() && options.require_tools {
        client.shutdown().await;
        return Err(BootstrapError::NoTools {
            server: options.server.name.clone(),
        });
    }
    info!(
        server = %options.server.name,
        count = descriptors.len(),
        "loaded tools"
    );

    Ok(Toolset::new(client, descriptors).await)
}

/// Runs [`load_tools`] and applies the fallback policy to its failure.
pub async fn bootstrap(
    options: &BootstrapOptions,
    policy: FallbackPolicy,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Bootstrap, BootstrapError> {
    match load_tools(options, env).await {
        Ok(toolset) => Ok(Bootstrap::Tools(toolset)),
        Err(err) if policy.allows(&err) => {
            warn!(server = ?err.server(), "falling back to tool-less mode: {err}");
            Ok(Bootstrap::Fallback(err))
        }
        Err(err) => Err(err),
    }
}
