use thiserror::Error;

/// Errors from talking to an MCP server.
#[derive(Debug, Error)]
pub enum Error {
    /// The server process could not be started.
    #[error("failed to spawn MCP server '{server}': {source}")]
    Spawn {
        /// Name of the server.
        server: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Reading from or writing to the server failed.
    #[error("MCP server '{server}' transport error: {message}")]
    Transport {
        /// Name of the server.
        server: String,
        /// What went wrong.
        message: String,
    },
    /// A message could not be encoded or decoded.
    #[error("MCP server '{server}' returned invalid JSON: {source}")]
    InvalidJson {
        /// Name of the server.
        server: String,
        /// The underlying serialization error.
        #[source]
        source: serde_json::Error,
    },
    /// The server answered a request with a JSON-RPC error.
    #[error("MCP server '{server}' returned JSON-RPC error {code}: {message}")]
    Rpc {
        /// Name of the server.
        server: String,
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },
    /// The server closed its output while requests were pending.
    #[error("MCP server '{server}' terminated unexpectedly")]
    Terminated {
        /// Name of the server.
        server: String,
    },
    /// The request was dropped before a response arrived.
    #[error("MCP server '{server}' request cancelled")]
    Cancelled {
        /// Name of the server.
        server: String,
    },
    /// The handshake did not complete in time.
    #[error("MCP server '{server}' did not finish the handshake within {seconds}s")]
    Timeout {
        /// Name of the server.
        server: String,
        /// The configured limit.
        seconds: u64,
    },
}

impl Error {
    /// Returns the name of the server this error is about.
    pub fn server(&self) -> &str {
        match self {
            Error::Spawn { server, .. }
            | Error::Transport { server, .. }
            | Error::InvalidJson { server, .. }
            | Error::Rpc { server, .. }
            | Error::Terminated { server }
            | Error::Cancelled { server }
            | Error::Timeout { server, .. } => server,
        }
    }
}
