//! Tools the model can call, and the registry that runs them.

mod error;
mod registry;

use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use error::{Error, ErrorKind};
pub use registry::ToolRegistry;

/// Text handed back to the model, or the reason the call failed.
pub type ToolResult = Result<String, Error>;

/// An operation the model may request, such as listing repositories or
/// opening an issue.
///
/// A tool holds no per-call state. Handles it needs while running, like
/// the connection to the MCP server, are cloned into the returned future.
pub trait Tool: Send + Sync + 'static {
    /// Arguments decoded from the JSON the model produced.
    type Input: DeserializeOwned;

    /// The name the model uses to call the tool. Unique within a registry.
    fn name(&self) -> &str;

    /// Tells the model what the tool does.
    fn description(&self) -> &str;

    /// JSON Schema of [`Tool::Input`], sent to the model as is.
    fn parameter_schema(&self) -> &Value;

    /// Runs the tool.
    ///
    /// The future must not borrow `self`. Several calls of one turn run
    /// concurrently.
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}

pub(crate) trait ToolObject: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameter_schema(&self) -> &Value;

    fn execute(
        &self,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>>;
}

pub(crate) struct AnyTool<T: Tool>(pub T);

impl<T: Tool> ToolObject for AnyTool<T> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    #[inline]
    fn parameter_schema(&self) -> &Value {
        self.0.parameter_schema()
    }

    #[inline]
    fn execute(
        &self,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>> {
        match serde_json::from_value::<T::Input>(arguments) {
            Ok(input) => Box::pin(self.0.execute(input)),
            Err(err) => {
                let err = Error::invalid_input().with_reason(err.to_string());
                Box::pin(std::future::ready(Err(err)))
            }
        }
    }
}
