use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// How to launch an MCP server.
///
/// The defaults run the official GitHub MCP server in a container. The
/// container reads `GITHUB_PERSONAL_ACCESS_TOKEN`, which is forwarded from
/// the environment of this process.
///
/// Values of `env` may hold credentials and are left out of the `Debug`
/// output.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct McpServerConfig {
    /// A short name used in logs and errors.
    pub name: String,
    /// The executable to run.
    pub command: String,
    /// Arguments passed to `command`.
    pub args: Vec<String>,
    /// Extra environment variables for the server process.
    pub env: BTreeMap<String, String>,
    /// Working directory of the server process.
    pub workdir: Option<PathBuf>,
    /// Upper bound for the initialization handshake, in seconds.
    pub startup_timeout_secs: Option<u64>,
}

impl McpServerConfig {
    /// Returns the handshake timeout, if any.
    #[inline]
    pub fn startup_timeout(&self) -> Option<Duration> {
        self.startup_timeout_secs.map(Duration::from_secs)
    }
}

impl Debug for McpServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpServerConfig")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env", &RedactedEnv(&self.env))
            .field("workdir", &self.workdir)
            .field("startup_timeout_secs", &self.startup_timeout_secs)
            .finish()
    }
}

struct RedactedEnv<'a>(&'a BTreeMap<String, String>);

impl Debug for RedactedEnv<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|key| (key, "<redacted>")))
            .finish()
    }
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            name: "github".to_owned(),
            command: "docker".to_owned(),
            args: [
                "run",
                "-i",
                "--rm",
                "-e",
                "GITHUB_PERSONAL_ACCESS_TOKEN",
                "ghcr.io/github/github-mcp-server",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            env: BTreeMap::new(),
            workdir: None,
            startup_timeout_secs: Some(120),
        }
    }
}
