use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::pin::Pin;

use futures_util::future::join_all;
use github_agent_model::{ModelTool, ToolCallRequest, ToolCallResult};
use tracing::Instrument;

use super::{AnyTool, Error, Tool, ToolObject, ToolResult};

/// A set of tools keyed by their unique names.
///
/// The registry is filled once when a session starts and only read
/// afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn ToolObject>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, replacing any tool with the same name.
    pub fn register<T: Tool>(&mut self, tool: T) {
        let name = tool.name().to_owned();
        if self.tools.contains_key(&name) {
            warn!("tool `{name}` registered twice, replacing the earlier one");
        }
        self.tools.insert(name, Box::new(AnyTool(tool)));
    }

    /// Registers a tool and returns the registry.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.register(tool);
        self
    }

    /// Returns the number of tools.
    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if there are no tools.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns `true` if a tool with the given name exists.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Returns descriptors of all tools, sorted by name.
    pub fn definitions(&self) -> Vec<ModelTool> {
        let mut definitions: Vec<_> = self
            .tools
            .values()
            .map(|tool| ModelTool {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameter_schema().clone(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Executes all requests concurrently.
    ///
    /// Exactly one result is returned per request, in request order. Failed
    /// or unknown tools produce error results instead of aborting the rest.
    pub async fn execute_all(
        &self,
        requests: &[ToolCallRequest],
    ) -> Vec<ToolCallResult> {
        let futures = requests.iter().map(|req| {
            let span = debug_span!("tool execute", id = %req.id, name = %req.name);
            self.dispatch(req).instrument(span)
        });
        let results = join_all(futures).await;

        requests
            .iter()
            .zip(results)
            .map(|(req, result)| match result {
                Ok(content) => ToolCallResult {
                    id: req.id.clone(),
                    content,
                    is_error: false,
                },
                Err(err) => {
                    warn!("tool `{}` ({}) failed: {err}", req.name, req.id);
                    ToolCallResult {
                        id: req.id.clone(),
                        content: format!("Error: {}", err.reason()),
                        is_error: true,
                    }
                }
            })
            .collect()
    }

    fn dispatch(
        &self,
        req: &ToolCallRequest,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>> {
        let Some(tool) = self.tools.get(&req.name) else {
            let err = Error::not_found()
                .with_reason(format!("no tool named `{}`", req.name));
            return Box::pin(std::future::ready(Err(err)));
        };
        trace!("calling {} ({}) with args: {:?}", req.name, req.id, req.arguments);
        tool.execute(req.arguments.clone())
    }
}

impl Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}
