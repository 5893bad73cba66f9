use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub(crate) const PROTOCOL_VERSION: &str = "2025-06-18";
pub(crate) const JSONRPC_VERSION: &str = "2.0";
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;

/// A tool advertised by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Unique name of the tool.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// JSON schema of the arguments.
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    let mut schema = Map::new();
    schema.insert("type".to_owned(), Value::String("object".to_owned()));
    Value::Object(schema)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Name and version the server reported during the handshake.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    #[serde(default)]
    pub name: String,
    /// Server version.
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InitializeResult {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// A content block of a tool result.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// A base64 encoded image.
    Image {
        /// Encoded image data.
        data: String,
        /// The MIME type of the image.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// An embedded resource.
    Resource {
        /// The resource object (`uri`, and `text` or `blob`).
        resource: Value,
    },
    /// Any block type this client doesn't know.
    #[serde(other)]
    Unknown,
}

/// The outcome of a `tools/call` request.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Content blocks returned by the tool.
    #[serde(default)]
    pub content: Vec<Content>,
    /// Whether the tool reported a failure.
    #[serde(default)]
    pub is_error: bool,
    /// Optional machine-readable result.
    #[serde(default)]
    pub structured_content: Option<Value>,
}

impl CallToolResult {
    /// Renders the result as text for a language model.
    pub fn text(&self) -> String {
        let parts: Vec<String> = self
            .content
            .iter()
            .filter_map(|content| match content {
                Content::Text { text } => Some(text.clone()),
                Content::Image { mime_type, .. } => {
                    Some(format!("[image: {mime_type}]"))
                }
                Content::Resource { resource } => {
                    let text = resource.get("text").and_then(Value::as_str);
                    let uri = resource
                        .get("uri")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    Some(match text {
                        Some(text) => text.to_owned(),
                        None => format!("[resource: {uri}]"),
                    })
                }
                Content::Unknown => None,
            })
            .collect();
        if parts.is_empty() {
            if let Some(structured) = &self.structured_content {
                return structured.to_string();
            }
        }
        parts.join("\n")
    }
}
