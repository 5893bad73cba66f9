use github_agent_core::tool::{Error as ToolError, Tool, ToolRegistry, ToolResult};
use github_agent_mcp::{McpClient, ToolDescriptor};
use serde_json::Value;

/// A tool served by an MCP server.
///
/// Calls are forwarded with their arguments untouched. A result the server
/// flags as an error becomes an execution error carrying the server's text.
pub struct McpTool {
    client: McpClient,
    name: String,
    description: String,
    parameter_schema: Value,
}

impl McpTool {
    /// Creates a tool from a descriptor returned by `tools/list`.
    pub fn new(client: McpClient, descriptor: ToolDescriptor) -> Self {
        Self {
            client,
            name: descriptor.name,
            description: descriptor.description.unwrap_or_default(),
            parameter_schema: descriptor.input_schema,
        }
    }

    /// Builds a registry holding every tool in `descriptors`.
    pub fn registry(
        client: &McpClient,
        descriptors: impl IntoIterator<Item = ToolDescriptor>,
    ) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for descriptor in descriptors {
            registry.register(Self::new(client.clone(), descriptor));
        }
        registry
    }
}

impl Tool for McpTool {
    type Input = Value;

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        let name = self.name.clone();
        async move {
            let result = client.call_tool(&name, input).await.map_err(|err| {
                ToolError::execution_error().with_reason(err.to_string())
            })?;
            let text = result.text();
            if result.is_error {
                return Err(ToolError::execution_error().with_reason(text));
            }
            Ok(text)
        }
    }
}
