use github_agent_anthropic_model::{AnthropicConfigBuilder, AnthropicProvider};
use github_agent_core::{
    Agent, AgentBuilder, AgentConfig, AgentMode, TranscriptSource, TurnOutcome,
};
use github_agent_mcp::McpClient;
use github_agent_model::{ModelProvider, ToolCallRequest};
use github_agent_openai_model::{OpenAIConfigBuilder, OpenAIProvider};

use crate::bootstrap::Toolset;
use crate::command::Command;
use crate::config::{ModelSettings, ProviderKind};

const GITHUB_AGENT_PROMPT: &str = include_str!("./prompts/github_agent.md");
const FALLBACK_PROMPT: &str = include_str!("./prompts/fallback.md");

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    agent_builder: AgentBuilder,
    config: AgentConfig,
    toolset: Option<Toolset>,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        let agent_builder = AgentBuilder::with_model_provider(provider);
        Self {
            agent_builder,
            config: AgentConfig::default(),
            toolset: None,
        }
    }

    /// Creates a session builder with the provider described by `settings`.
    pub fn with_model_settings(settings: &ModelSettings) -> Self {
        match settings.provider {
            ProviderKind::Anthropic => {
                let mut builder =
                    AnthropicConfigBuilder::with_api_key(&settings.api_key);
                if let Some(model) = &settings.model {
                    builder = builder.with_model(model);
                }
                if let Some(base_url) = &settings.base_url {
                    builder = builder.with_base_url(base_url);
                }
                if let Some(max_tokens) = settings.max_tokens {
                    builder = builder.with_max_tokens(max_tokens);
                }
                Self::with_model_provider(AnthropicProvider::new(builder.build()))
            }
            ProviderKind::OpenAI => {
                let mut builder =
                    OpenAIConfigBuilder::with_api_key(&settings.api_key);
                if let Some(model) = &settings.model {
                    builder = builder.with_model(model);
                }
                if let Some(base_url) = &settings.base_url {
                    builder = builder.with_base_url(base_url);
                }
                Self::with_model_provider(OpenAIProvider::new(builder.build()))
            }
        }
    }

    /// Sets the loop configuration.
    ///
    /// An empty system prompt selects the built-in prompt for the mode the
    /// session ends up in.
    #[inline]
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Gives the session tools. Without them the session is tool-less.
    ///
    /// Instructions sent by the tool server are appended to the system
    /// prompt.
    #[inline]
    pub fn with_toolset(mut self, toolset: Toolset) -> Self {
        self.toolset = Some(toolset);
        self
    }

    /// Attaches a callback to be invoked when a transcript is generated.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&str, TranscriptSource) + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_transcript(on_transcript);
        self
    }

    /// Attaches a callback to be invoked before a tool is called.
    #[inline]
    pub fn on_tool_call(
        mut self,
        on_tool_call: impl Fn(&ToolCallRequest) + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_tool_call(on_tool_call);
        self
    }

    /// Attaches a callback receiving model text as it is streamed.
    #[inline]
    pub fn on_delta(
        mut self,
        on_delta: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_delta(on_delta);
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session {
        let mut config = self.config;
        let (mode, client, instructions) = match self.toolset {
            Some(toolset) => (
                AgentMode::ToolsEnabled(toolset.registry),
                Some(toolset.client),
                toolset.instructions,
            ),
            None => (AgentMode::ToolLess, None, None),
        };
        if config.system_prompt.trim().is_empty() {
            config.system_prompt = if mode.is_tool_less() {
                FALLBACK_PROMPT
            } else {
                GITHUB_AGENT_PROMPT
            }
            .to_owned();
        }
        if let Some(instructions) = instructions {
            let len = config.system_prompt.trim_end().len();
            config.system_prompt.truncate(len);
            config.system_prompt.push_str("\n\n");
            config.system_prompt.push_str(&instructions);
        }

        let agent = self
            .agent_builder
            .with_config(config)
            .with_mode(mode)
            .build();
        Session { agent, client }
    }
}

/// What [`Session::handle_line`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// The user asked to leave.
    Exit,
    /// The line was blank.
    Ignored,
    /// A turn ran.
    Turn(TurnOutcome),
}

/// A chat session, owning one conversation and one tool registry.
///
/// The session holds a fully configured agent and the connection to the
/// tool server, if there is one.
pub struct Session {
    agent: Agent,
    client: Option<McpClient>,
}

impl Session {
    /// Interprets a line typed at the prompt.
    ///
    /// Exit words and blank lines never reach the conversation.
    pub async fn handle_line(&mut self, line: &str) -> Reply {
        match Command::parse(line) {
            Command::Exit => Reply::Exit,
            Command::Empty => Reply::Ignored,
            Command::Prompt(text) => Reply::Turn(self.send_message(text).await),
        }
    }

    /// Runs a turn with the message as user input.
    #[inline]
    pub async fn send_message(&mut self, message: &str) -> TurnOutcome {
        self.agent.run_turn(message).await
    }

    /// Returns the underlying agent.
    #[inline]
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Returns `true` if the session has no tools.
    #[inline]
    pub fn is_tool_less(&self) -> bool {
        self.agent.mode().is_tool_less()
    }

    /// Starts over with an empty conversation.
    #[inline]
    pub fn reset(&mut self) {
        self.agent.reset();
    }

    /// Ends the session, stopping the tool server.
    pub async fn shutdown(self) {
        if let Some(client) = self.client {
            client.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use github_agent_model::ModelMessage;
    use github_agent_test_model::{PresetResponse, TestModelProvider};

    use super::*;

    #[tokio::test]
    async fn test_exit_and_blank_lines() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_assistant_response_step(PresetResponse::with_text(
            "Hello! How can I help with GitHub?",
        ));
        let mut session =
            SessionBuilder::with_model_provider(model_provider.clone()).build();

        assert_eq!(session.handle_line("   \n").await, Reply::Ignored);
        assert_eq!(session.handle_line("EXIT\n").await, Reply::Exit);
        assert!(session.agent().conversation().is_empty());
        assert!(model_provider.requests().is_empty());

        let Reply::Turn(outcome) = session.handle_line("hi").await else {
            panic!("expected a turn");
        };
        assert_eq!(outcome.reply, "Hello! How can I help with GitHub?");
        assert_eq!(session.agent().conversation().len(), 2);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_tool_less_prompt() {
        let mut model_provider = TestModelProvider::default();
        model_provider
            .add_assistant_response_step(PresetResponse::with_text("Sure."));
        let mut session =
            SessionBuilder::with_model_provider(model_provider.clone()).build();
        assert!(session.is_tool_less());

        session.send_message("Help me with git").await;
        let requests = model_provider.requests();
        assert_eq!(
            requests[0].messages[0],
            ModelMessage::System(FALLBACK_PROMPT.to_owned())
        );
        assert!(requests[0].tools.is_empty());
    }

    #[tokio::test]
    async fn test_custom_prompt_kept() {
        let mut model_provider = TestModelProvider::default();
        model_provider
            .add_assistant_response_step(PresetResponse::with_text("Sure."));
        let mut session = SessionBuilder::with_model_provider(model_provider.clone())
            .with_config(AgentConfig {
                system_prompt: "Answer in French.".to_owned(),
                ..Default::default()
            })
            .build();

        session.send_message("Bonjour").await;
        assert_eq!(
            model_provider.requests()[0].messages[0],
            ModelMessage::System("Answer in French.".to_owned())
        );
    }
}
