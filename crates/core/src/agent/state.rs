use github_agent_model::{
    AssistantMessage, ModelFinishReason, ModelMessage, ModelRequest,
    ToolCallRequest, ToolCallResult,
};
use tracing::Instrument;

use super::{Agent, TranscriptSource, TurnOutcome, TurnStatus};

const NOT_EXECUTED: &str = "Error: not executed: iteration limit reached";
pub(super) const NO_TOOLS_REPLY: &str =
    "That needs live GitHub tools, which are not available in this session.";

#[derive(Debug)]
enum AgentStage {
    Reasoning,
    Acting(Vec<ToolCallRequest>),
    Done(TurnStatus),
}

impl Agent {
    /// Runs one turn for the given user input.
    ///
    /// The turn never fails. Model errors become an assistant message that
    /// describes the error, and tool errors become error results the model
    /// can see.
    pub async fn run_turn<S: Into<String>>(&mut self, input: S) -> TurnOutcome {
        let span = debug_span!(
            "agent turn",
            tool_less = self.mode.is_tool_less(),
            history = self.conversation.len()
        );
        self.drive_turn(input.into()).instrument(span).await
    }

    async fn drive_turn(&mut self, input: String) -> TurnOutcome {
        self.record_user(input);

        let mut iterations = 0;
        let mut stage = AgentStage::Reasoning;
        loop {
            trace!("entering stage: {stage:?}");
            stage = match stage {
                AgentStage::Reasoning => {
                    let msg = self.reason().await;
                    let calls = msg.tool_calls.clone();
                    self.record_assistant(msg);
                    if calls.is_empty() {
                        AgentStage::Done(TurnStatus::Completed)
                    } else if iterations >= self.config.max_iterations {
                        warn!(
                            "iteration limit ({}) reached, {} tool calls not executed",
                            self.config.max_iterations,
                            calls.len()
                        );
                        self.reject_calls(&calls);
                        AgentStage::Done(TurnStatus::Exhausted)
                    } else {
                        AgentStage::Acting(calls)
                    }
                }
                AgentStage::Acting(calls) => {
                    self.act(calls).await;
                    iterations += 1;
                    AgentStage::Reasoning
                }
                AgentStage::Done(status) => {
                    let reply = self
                        .conversation
                        .last_assistant()
                        .map(|msg| msg.content.clone())
                        .unwrap_or_default();
                    debug!(?status, iterations, "turn finished");
                    return TurnOutcome {
                        reply,
                        status,
                        iterations,
                    };
                }
            };
        }
    }

    /// Asks the model once. Always yields a message.
    async fn reason(&self) -> AssistantMessage {
        let req = self.build_model_request();
        let on_delta = self.observers.on_delta.clone();
        let result = self
            .model_client
            .send_request(req, move |delta| {
                if let Some(on_delta) = &on_delta {
                    on_delta(delta);
                }
            })
            .await;

        let resp = match result {
            Ok(resp) => resp,
            Err(err) => {
                error!("model request failed: {err}");
                return AssistantMessage::text(format!(
                    "Error processing request: {err}"
                ));
            }
        };
        if resp.finish_reason == Some(ModelFinishReason::Length) {
            warn!("model output was truncated by the token limit");
        }

        let mut msg = AssistantMessage {
            content: resp.content,
            tool_calls: resp.tool_calls,
        };
        if self.mode.is_tool_less() && msg.has_tool_calls() {
            warn!(
                "dropping {} tool calls requested in tool-less mode",
                msg.tool_calls.len()
            );
            msg.tool_calls.clear();
            if msg.content.trim().is_empty() {
                msg.content = NO_TOOLS_REPLY.to_owned();
            }
        }
        msg
    }

    async fn act(&mut self, calls: Vec<ToolCallRequest>) {
        if let Some(on_tool_call) = &self.observers.on_tool_call {
            for call in &calls {
                on_tool_call(call);
            }
        }
        let results = match self.mode.tools() {
            Some(registry) => registry.execute_all(&calls).await,
            None => not_executed(&calls),
        };
        for result in results {
            self.record_tool_result(result);
        }
    }

    fn build_model_request(&self) -> ModelRequest {
        let mut messages = Vec::with_capacity(self.conversation.len() + 1);
        if !self.config.system_prompt.is_empty() {
            messages
                .push(ModelMessage::System(self.config.system_prompt.clone()));
        }
        messages.extend(self.conversation.messages().cloned());
        ModelRequest {
            messages,
            tools: self
                .mode
                .tools()
                .map(|registry| registry.definitions())
                .unwrap_or_default(),
        }
    }

    fn reject_calls(&mut self, calls: &[ToolCallRequest]) {
        for result in not_executed(calls) {
            self.record_tool_result(result);
        }
    }

    fn record_user(&mut self, input: String) {
        let item = self.conversation.push_user(input);
        if let Some(on_transcript) = &self.observers.on_transcript {
            on_transcript(item.transcript(), TranscriptSource::User);
        }
    }

    fn record_assistant(&mut self, msg: AssistantMessage) {
        let item = self.conversation.push_assistant(msg);
        if let Some(on_transcript) = &self.observers.on_transcript {
            on_transcript(item.transcript(), TranscriptSource::Assistant);
        }
    }

    fn record_tool_result(&mut self, result: ToolCallResult) {
        let item = self.conversation.push_tool_result(result);
        if let Some(on_transcript) = &self.observers.on_transcript {
            on_transcript(item.transcript(), TranscriptSource::Tool);
        }
    }
}

fn not_executed(calls: &[ToolCallRequest]) -> Vec<ToolCallResult> {
    calls
        .iter()
        .map(|call| ToolCallResult {
            id: call.id.clone(),
            content: NOT_EXECUTED.to_owned(),
            is_error: true,
        })
        .collect()
}
