mod builder;
mod state;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use github_agent_model::ToolCallRequest;

use crate::config::AgentConfig;
use crate::conversation::Conversation;
use crate::model_client::ModelClient;
use crate::tool::ToolRegistry;
pub use builder::AgentBuilder;

/// Whether the agent can offer tools to the model.
#[derive(Debug)]
pub enum AgentMode {
    /// Tools from the registry are advertised and executed.
    ToolsEnabled(ToolRegistry),
    /// No tools are advertised; the loop ends after every model response.
    ToolLess,
}

impl AgentMode {
    /// Returns the registry, if tools are enabled.
    #[inline]
    pub fn tools(&self) -> Option<&ToolRegistry> {
        match self {
            AgentMode::ToolsEnabled(registry) => Some(registry),
            AgentMode::ToolLess => None,
        }
    }

    /// Returns `true` in tool-less mode.
    #[inline]
    pub fn is_tool_less(&self) -> bool {
        matches!(self, AgentMode::ToolLess)
    }
}

/// Who produced a piece of transcript.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TranscriptSource {
    /// The user input.
    User,
    /// A message from the model.
    Assistant,
    /// A tool call result.
    Tool,
}

/// How a turn ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TurnStatus {
    /// The model produced a final answer.
    Completed,
    /// The iteration limit was reached while the model still asked for
    /// tools.
    Exhausted,
}

/// The result of [`Agent::run_turn`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Text of the last assistant message in the turn.
    pub reply: String,
    /// How the turn ended.
    pub status: TurnStatus,
    /// Number of tool execution phases in the turn.
    pub iterations: usize,
}

#[derive(Default)]
pub(crate) struct Observers {
    pub on_transcript: Option<Box<dyn Fn(&str, TranscriptSource) + Send + Sync>>,
    pub on_tool_call: Option<Box<dyn Fn(&ToolCallRequest) + Send + Sync>>,
    pub on_delta: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

/// An agent instance, which maintains a conversation, a model client, and
/// the tools it may call.
///
/// The agent runs one turn at a time. Each turn alternates between asking
/// the model and executing the tools it requested, until the model answers
/// without tool calls or the iteration limit is hit.
pub struct Agent {
    model_client: ModelClient,
    mode: AgentMode,
    config: AgentConfig,
    conversation: Conversation,
    observers: Observers,
}

impl Agent {
    fn from_builder(builder: AgentBuilder) -> Self {
        let AgentBuilder {
            model_client,
            mode,
            config,
            observers,
        } = builder;
        Self {
            model_client,
            mode,
            config,
            conversation: Default::default(),
            observers,
        }
    }

    /// Returns the conversation so far.
    #[inline]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Returns the mode the agent runs in.
    #[inline]
    pub fn mode(&self) -> &AgentMode {
        &self.mode
    }

    /// Returns the configuration.
    #[inline]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Discards the conversation, keeping tools and configuration.
    pub fn reset(&mut self) {
        debug!("conversation reset ({} items dropped)", self.conversation.len());
        self.conversation = Conversation::default();
    }
}
