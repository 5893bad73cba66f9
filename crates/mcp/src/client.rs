use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use serde_json::{Value, json};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader,
    BufWriter,
};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::time::timeout;
use tracing::Instrument;

use crate::config::McpServerConfig;
use crate::error::Error;
use crate::protocol::{
    CallToolResult, InitializeResult, JSONRPC_VERSION, ListToolsResult,
    METHOD_NOT_FOUND, PROTOCOL_VERSION, ServerInfo, ToolDescriptor,
};

type BoxedWriter = BufWriter<Box<dyn AsyncWrite + Send + Unpin>>;
type Responder = oneshot::Sender<Result<Value, Error>>;

/// A connection to one MCP server.
///
/// Cloning the client is cheap, all clones share the same connection.
/// Requests may be issued concurrently; responses are matched to their
/// requests by id.
#[derive(Clone)]
pub struct McpClient {
    inner: Arc<Inner>,
}

struct Inner {
    server: String,
    writer: AsyncMutex<Option<BoxedWriter>>,
    pending: AsyncMutex<HashMap<u64, Responder>>,
    id_counter: AtomicU64,
    child: AsyncMutex<Option<Child>>,
    instructions: AsyncMutex<Option<String>>,
    server_info: AsyncMutex<Option<ServerInfo>>,
}

impl McpClient {
    /// Launches the server process and performs the handshake.
    ///
    /// This is a single attempt, failures are not retried.
    pub async fn spawn(config: &McpServerConfig) -> Result<Self, Error> {
        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &config.workdir {
            command.current_dir(dir);
        }

        info!(
            server = %config.name,
            command = %config.command,
            "spawning MCP server"
        );
        let mut child = command.spawn().map_err(|source| Error::Spawn {
            server: config.name.clone(),
            source,
        })?;

        let transport_error = |message: &str| Error::Transport {
            server: config.name.clone(),
            message: message.to_owned(),
        };
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| transport_error("failed to capture server stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| transport_error("failed to capture server stdout"))?;

        let client = Self::start(config.name.clone(), stdout, stdin, Some(child));
        let handshake = match config.startup_timeout() {
            Some(limit) => match timeout(limit, client.initialize()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    server: config.name.clone(),
                    seconds: limit.as_secs(),
                }),
            },
            None => client.initialize().await,
        };
        if let Err(err) = handshake {
            client.shutdown().await;
            return Err(err);
        }
        Ok(client)
    }

    /// Performs the handshake over an already established byte stream.
    pub async fn connect<R, W>(
        name: impl Into<String>,
        reader: R,
        writer: W,
    ) -> Result<Self, Error>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let client = Self::start(name.into(), reader, writer, None);
        client.initialize().await?;
        Ok(client)
    }

    fn start<R, W>(
        server: String,
        reader: R,
        writer: W,
        child: Option<Child>,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        let inner = Arc::new(Inner {
            server,
            writer: AsyncMutex::new(Some(BufWriter::new(writer))),
            pending: AsyncMutex::new(HashMap::new()),
            id_counter: AtomicU64::new(1),
            child: AsyncMutex::new(child),
            instructions: AsyncMutex::new(None),
            server_info: AsyncMutex::new(None),
        });

        // The reader only holds a weak reference, so dropping the last
        // client drops the child process as well.
        let server = inner.server.clone();
        tokio::spawn(
            reader_loop(Arc::downgrade(&inner), reader)
                .instrument(debug_span!("mcp reader", server = %server)),
        );
        Self { inner }
    }

    /// Returns the configured name of the server.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.server
    }

    /// Returns the usage instructions the server sent during the handshake.
    pub async fn instructions(&self) -> Option<String> {
        self.inner.instructions.lock().await.clone()
    }

    /// Returns the name and version the server reported.
    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.inner.server_info.lock().await.clone()
    }

    async fn initialize(&self) -> Result<(), Error> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {}
        });
        let result = self.inner.send_request("initialize", params).await?;
        let result: InitializeResult = self.inner.decode(result)?;
        debug!(
            server = %self.inner.server,
            protocol_version = ?result.protocol_version,
            server_info = ?result.server_info,
            "handshake completed"
        );
        *self.inner.instructions.lock().await = result.instructions;
        *self.inner.server_info.lock().await = result.server_info;

        self.inner
            .send_notification("notifications/initialized", json!({}))
            .await
    }

    /// Fetches every tool the server offers, following pagination.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, Error> {
        let mut tools = vec![];
        let mut cursor: Option<String> = None;
        loop {
            let params = match &cursor {
                Some(cursor) => json!({ "cursor": cursor }),
                None => json!({}),
            };
            let result = self.inner.send_request("tools/list", params).await?;
            let page: ListToolsResult = self.inner.decode(result)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        debug!(
            server = %self.inner.server,
            count = tools.len(),
            "listed tools"
        );
        Ok(tools)
    }

    /// Invokes a tool by name.
    ///
    /// A tool that ran but failed is reported through
    /// [`CallToolResult::is_error`], not as an `Err`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, Error> {
        let params = json!({
            "name": name,
            "arguments": match arguments {
                Value::Null => Value::Object(Default::default()),
                other => other,
            }
        });
        let result = self.inner.send_request("tools/call", params).await?;
        self.inner.decode(result)
    }

    /// Closes the connection and stops the server process.
    pub async fn shutdown(&self) {
        self.inner.writer.lock().await.take();

        let child = self.inner.child.lock().await.take();
        if let Some(mut child) = child {
            if let Err(err) = child.kill().await {
                debug!(
                    server = %self.inner.server,
                    %err,
                    "failed to kill MCP server process (may have already exited)"
                );
            }
        }
        self.inner.fail_all_pending().await;
    }
}

async fn reader_loop<R>(inner: Weak<Inner>, reader: R)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(%err, "failed to read from MCP server");
                break;
            }
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => {
                if let Err(err) = inner.process_inbound_message(value).await {
                    warn!(%err, "failed to process message from MCP server");
                }
            }
            Err(err) => {
                // Servers sometimes log to stdout, skip those lines.
                debug!(line = trimmed, %err, "skipping non-JSON line");
            }
        }
    }

    if let Some(inner) = inner.upgrade() {
        inner.writer.lock().await.take();
        inner.fail_all_pending().await;
    }
    debug!("reader finished");
}

impl Inner {
    async fn process_inbound_message(&self, value: Value) -> Result<(), Error> {
        let id = value.get("id").cloned();
        let method = value.get("method").and_then(Value::as_str);
        match (id, method) {
            (Some(id), Some(method)) => {
                self.handle_server_request(id, method).await
            }
            (Some(id), None) => {
                self.handle_response(id, value).await;
                Ok(())
            }
            (None, Some(method)) => {
                debug!(server = %self.server, method, "received notification");
                Ok(())
            }
            (None, None) => Ok(()),
        }
    }

    async fn handle_response(&self, id: Value, value: Value) {
        let key = match &id {
            Value::Number(num) => num.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        };
        let Some(key) = key else {
            debug!(server = %self.server, ?id, "response with unusable id");
            return;
        };
        let Some(responder) = self.pending.lock().await.remove(&key) else {
            debug!(server = %self.server, key, "response for unknown request");
            return;
        };

        let result = match value.get("error") {
            Some(error) => Err(Error::Rpc {
                server: self.server.clone(),
                code: error
                    .get("code")
                    .and_then(Value::as_i64)
                    .unwrap_or(-32000),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_owned(),
            }),
            None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
        };
        responder.send(result).ok();
    }

    async fn handle_server_request(
        &self,
        id: Value,
        method: &str,
    ) -> Result<(), Error> {
        if method == "ping" {
            return self
                .write_message(&json!({
                    "jsonrpc": JSONRPC_VERSION,
                    "id": id,
                    "result": {}
                }))
                .await;
        }
        warn!(server = %self.server, method, "server sent unsupported request");
        self.write_message(&json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "error": {
                "code": METHOD_NOT_FOUND,
                "message": format!("client does not implement method '{method}'"),
            }
        }))
        .await
    }

    async fn send_request(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Value, Error> {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        trace!(server = %self.server, id, method, "sending request");
        let payload = json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "method": method,
            "params": params
        });
        if let Err(err) = self.write_message(&payload).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Cancelled {
                server: self.server.clone(),
            }),
        }
    }

    async fn send_notification(
        &self,
        method: &str,
        params: Value,
    ) -> Result<(), Error> {
        self.write_message(&json!({
            "jsonrpc": JSONRPC_VERSION,
            "method": method,
            "params": params
        }))
        .await
    }

    async fn write_message(&self, message: &Value) -> Result<(), Error> {
        let mut encoded = serde_json::to_string(message).map_err(|source| {
            Error::InvalidJson {
                server: self.server.clone(),
                source,
            }
        })?;
        encoded.push('\n');

        let mut writer = self.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return Err(Error::Terminated {
                server: self.server.clone(),
            });
        };
        let transport_error = |err: std::io::Error| Error::Transport {
            server: self.server.clone(),
            message: err.to_string(),
        };
        stream
            .write_all(encoded.as_bytes())
            .await
            .map_err(transport_error)?;
        stream.flush().await.map_err(transport_error)
    }

    async fn fail_all_pending(&self) {
        let mut pending = self.pending.lock().await;
        for (_, responder) in pending.drain() {
            responder
                .send(Err(Error::Terminated {
                    server: self.server.clone(),
                }))
                .ok();
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(
        &self,
        value: Value,
    ) -> Result<T, Error> {
        serde_json::from_value(value).map_err(|source| Error::InvalidJson {
            server: self.server.clone(),
            source,
        })
    }
}
