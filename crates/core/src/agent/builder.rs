use github_agent_model::{ModelProvider, ToolCallRequest};

use super::{Agent, AgentMode, Observers, TranscriptSource};
use crate::config::AgentConfig;
use crate::model_client::ModelClient;
use crate::tool::{Tool, ToolRegistry};

/// [`Agent`] builder.
pub struct AgentBuilder {
    pub(crate) model_client: ModelClient,
    pub(crate) mode: AgentMode,
    pub(crate) config: AgentConfig,
    pub(crate) observers: Observers,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    ///
    /// Tools are enabled with an empty registry until some are added.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            mode: AgentMode::ToolsEnabled(ToolRegistry::new()),
            config: AgentConfig::default(),
            observers: Observers::default(),
        }
    }

    /// Replaces the whole configuration.
    #[inline]
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the system prompt for the agent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    /// Sets the maximum number of tool execution phases per turn.
    #[inline]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Registers a tool, enabling tools if the builder was tool-less.
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        match &mut self.mode {
            AgentMode::ToolsEnabled(registry) => registry.register(tool),
            AgentMode::ToolLess => {
                self.mode =
                    AgentMode::ToolsEnabled(ToolRegistry::new().with_tool(tool));
            }
        }
        self
    }

    /// Uses the given registry as the tool set.
    #[inline]
    pub fn with_tools(mut self, registry: ToolRegistry) -> Self {
        self.mode = AgentMode::ToolsEnabled(registry);
        self
    }

    /// Disables tools entirely.
    #[inline]
    pub fn tool_less(mut self) -> Self {
        self.mode = AgentMode::ToolLess;
        self
    }

    /// Sets the mode directly.
    #[inline]
    pub fn with_mode(mut self, mode: AgentMode) -> Self {
        self.mode = mode;
        self
    }

    /// Attaches a callback to be invoked when a message is appended to the
    /// conversation.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&str, TranscriptSource) + Send + Sync + 'static,
    ) -> Self {
        self.observers.on_transcript = Some(Box::new(on_transcript));
        self
    }

    /// Attaches a callback to be invoked right before a tool is called.
    #[inline]
    pub fn on_tool_call(
        mut self,
        on_tool_call: impl Fn(&ToolCallRequest) + Send + Sync + 'static,
    ) -> Self {
        self.observers.on_tool_call = Some(Box::new(on_tool_call));
        self
    }

    /// Attaches a callback receiving model text as it is streamed.
    #[inline]
    pub fn on_delta(
        mut self,
        on_delta: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.observers.on_delta = Some(std::sync::Arc::new(on_delta));
        self
    }

    /// Builds the agent.
    #[inline]
    pub fn build(self) -> Agent {
        Agent::from_builder(self)
    }
}
