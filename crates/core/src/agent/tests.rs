use std::future::ready;
use std::sync::{Arc, Mutex};

use github_agent_model::{ModelMessage, ToolCallRequest};
use github_agent_test_model::{PresetEvent, PresetResponse, TestModelProvider};
use serde_json::{Value, json};

use super::state::NO_TOOLS_REPLY;
use crate::tool::{Error as ToolError, Tool, ToolResult};
use crate::{AgentBuilder, AgentConfig, TranscriptSource, TurnStatus};

static OBJECT_SCHEMA: &Value = &Value::Null;

struct ListReposTool;

impl Tool for ListReposTool {
    type Input = Value;

    fn name(&self) -> &str {
        "list_repos"
    }

    fn description(&self) -> &str {
        "Lists repositories of the authenticated user"
    }

    fn parameter_schema(&self) -> &Value {
        OBJECT_SCHEMA
    }

    fn execute(
        &self,
        _input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        ready(Ok("octocat/hello-world\noctocat/Spoon-Knife".to_owned()))
    }
}

struct BrokenTool;

impl Tool for BrokenTool {
    type Input = Value;

    fn name(&self) -> &str {
        "get_issue"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameter_schema(&self) -> &Value {
        OBJECT_SCHEMA
    }

    fn execute(
        &self,
        _input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        ready(Err(ToolError::execution_error().with_reason("404 Not Found")))
    }
}

fn call(id: &str, name: &str) -> PresetEvent {
    PresetEvent::ToolCall(ToolCallRequest {
        id: id.to_owned(),
        name: name.to_owned(),
        arguments: json!({}),
    })
}

#[tokio::test]
async fn test_list_repositories() {
    let mut model_provider = TestModelProvider::default();
    model_provider
        .add_assistant_response_step(PresetResponse::with_events([call(
            "call_1",
            "list_repos",
        )]));
    model_provider.add_assistant_response_step(PresetResponse::with_text(
        "You have 2 repositories: hello-world and Spoon-Knife.",
    ));

    let transcripts = Arc::new(Mutex::new(vec![]));
    let mut agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_system_prompt("You are a GitHub agent.")
        .with_tool(ListReposTool)
        .on_transcript({
            let transcripts = Arc::clone(&transcripts);
            move |_, source| transcripts.lock().unwrap().push(source)
        })
        .build();

    let outcome = agent.run_turn("List my repositories").await;
    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(
        outcome.reply,
        "You have 2 repositories: hello-world and Spoon-Knife."
    );

    let messages: Vec<_> = agent.conversation().messages().collect();
    assert_eq!(messages.len(), 4);
    assert_eq!(
        messages[0],
        &ModelMessage::User("List my repositories".to_owned())
    );
    let ModelMessage::Assistant(first) = messages[1] else {
        panic!("expected an assistant message, got {:?}", messages[1]);
    };
    assert_eq!(first.tool_calls[0].name, "list_repos");
    let ModelMessage::Tool(result) = messages[2] else {
        panic!("expected a tool result, got {:?}", messages[2]);
    };
    assert_eq!(result.id, "call_1");
    assert!(!result.is_error);
    assert!(result.content.contains("octocat/hello-world"));
    assert!(matches!(messages[3], ModelMessage::Assistant(msg) if !msg.has_tool_calls()));

    assert_eq!(
        *transcripts.lock().unwrap(),
        [
            TranscriptSource::User,
            TranscriptSource::Assistant,
            TranscriptSource::Tool,
            TranscriptSource::Assistant
        ]
    );

    // The system prompt leads every request but never enters the log.
    let requests = model_provider.requests();
    assert_eq!(requests.len(), 2);
    for req in &requests {
        assert_eq!(
            req.messages[0],
            ModelMessage::System("You are a GitHub agent.".to_owned())
        );
        assert_eq!(req.tools.len(), 1);
    }
    assert!(
        agent
            .conversation()
            .messages()
            .all(|msg| !matches!(msg, ModelMessage::System(_)))
    );
}

#[tokio::test]
async fn test_iteration_limit() {
    let mut model_provider = TestModelProvider::default();
    for idx in 0..4 {
        model_provider.add_assistant_response_step(
            PresetResponse::with_events([
                PresetEvent::MessageDelta(format!("Attempt {idx}")),
                call(&format!("call_{idx}"), "list_repos"),
            ]),
        );
    }

    let mut agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_config(AgentConfig {
            max_iterations: 2,
            ..Default::default()
        })
        .with_tool(ListReposTool)
        .build();

    let outcome = agent.run_turn("Keep going").await;
    assert_eq!(outcome.status, TurnStatus::Exhausted);
    assert_eq!(outcome.iterations, 2);
    assert_eq!(outcome.reply, "Attempt 2");
    assert_eq!(model_provider.requests().len(), 3);

    assert!(agent.conversation().unanswered_tool_calls().is_empty());
    let Some(ModelMessage::Tool(last)) = agent.conversation().messages().last()
    else {
        panic!("the turn should end with a tool result");
    };
    assert_eq!(last.id, "call_2");
    assert!(last.is_error);
    assert!(last.content.contains("iteration limit"));
}

#[tokio::test]
async fn test_zero_iterations() {
    let mut model_provider = TestModelProvider::default();
    model_provider
        .add_assistant_response_step(PresetResponse::with_events([call(
            "call_1",
            "list_repos",
        )]));

    let mut agent = AgentBuilder::with_model_provider(model_provider)
        .with_max_iterations(0)
        .with_tool(ListReposTool)
        .build();
    let outcome = agent.run_turn("List my repositories").await;
    assert_eq!(outcome.status, TurnStatus::Exhausted);
    assert_eq!(outcome.iterations, 0);
    assert!(agent.conversation().unanswered_tool_calls().is_empty());
}

#[tokio::test]
async fn test_model_failure() {
    let model_provider = TestModelProvider::default();
    let mut agent = AgentBuilder::with_model_provider(model_provider)
        .with_tool(ListReposTool)
        .build();

    let outcome = agent.run_turn("Hello").await;
    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(outcome.iterations, 0);
    assert!(outcome.reply.starts_with("Error processing request: "));
    assert_eq!(agent.conversation().len(), 2);
}

#[tokio::test]
async fn test_sibling_tool_failure() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        call("call_a", "get_issue"),
        call("call_b", "list_repos"),
        call("call_c", "delete_everything"),
    ]));
    model_provider
        .add_assistant_response_step(PresetResponse::with_text("Partial results."));

    let seen_calls = Arc::new(Mutex::new(vec![]));
    let mut agent = AgentBuilder::with_model_provider(model_provider)
        .with_tool(ListReposTool)
        .with_tool(BrokenTool)
        .on_tool_call({
            let seen_calls = Arc::clone(&seen_calls);
            move |req| seen_calls.lock().unwrap().push(req.id.clone())
        })
        .build();

    let outcome = agent.run_turn("Show issue 1 and my repos").await;
    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(outcome.reply, "Partial results.");
    assert_eq!(*seen_calls.lock().unwrap(), ["call_a", "call_b", "call_c"]);

    let results: Vec<_> = agent
        .conversation()
        .messages()
        .filter_map(|msg| match msg {
            ModelMessage::Tool(result) => Some(result),
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].id, "call_a");
    assert!(results[0].is_error);
    assert_eq!(results[0].content, "Error: 404 Not Found");
    assert_eq!(results[1].id, "call_b");
    assert!(!results[1].is_error);
    assert_eq!(results[2].id, "call_c");
    assert!(results[2].is_error);
}

#[tokio::test]
async fn test_tool_less_mode() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::MessageDelta("I can't reach GitHub right now.".to_owned()),
        call("call_1", "list_repos"),
    ]));
    model_provider.add_assistant_response_step(PresetResponse::with_text(
        "Try `gh repo list` in your terminal.",
    ));

    let mut agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_tool(ListReposTool)
        .tool_less()
        .build();

    let outcome = agent.run_turn("List my repositories").await;
    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(outcome.iterations, 0);
    assert_eq!(outcome.reply, "I can't reach GitHub right now.");

    let outcome = agent.run_turn("What else can I do?").await;
    assert_eq!(outcome.reply, "Try `gh repo list` in your terminal.");

    assert!(model_provider.requests().iter().all(|req| req.tools.is_empty()));
    assert!(agent.conversation().messages().all(|msg| match msg {
        ModelMessage::Assistant(msg) => !msg.has_tool_calls(),
        ModelMessage::Tool(_) => false,
        _ => true,
    }));
}

#[tokio::test]
async fn test_tool_less_mode_only_tool_calls() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        call("call_1", "list_repos"),
    ]));

    let mut agent = AgentBuilder::with_model_provider(model_provider)
        .tool_less()
        .build();

    let outcome = agent.run_turn("List my repositories").await;
    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(outcome.iterations, 0);
    assert_eq!(outcome.reply, NO_TOOLS_REPLY);
    assert!(agent.conversation().unanswered_tool_calls().is_empty());
    assert_eq!(agent.conversation().len(), 2);
}

#[tokio::test]
async fn test_history_and_reset() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_response_step(PresetResponse::with_text("Hi!"));
    model_provider
        .add_assistant_response_step(PresetResponse::with_text("Still here."));

    let deltas = Arc::new(Mutex::new(String::new()));
    let mut agent = AgentBuilder::with_model_provider(model_provider.clone())
        .on_delta({
            let deltas = Arc::clone(&deltas);
            move |delta| deltas.lock().unwrap().push_str(delta)
        })
        .build();

    agent.run_turn("Hello").await;
    let outcome = agent.run_turn("Are you there?").await;
    assert_eq!(outcome.reply, "Still here.");
    assert_eq!(agent.conversation().len(), 4);
    assert_eq!(*deltas.lock().unwrap(), "Hi!Still here.");

    // The second request carries the first turn.
    let requests = model_provider.requests();
    assert_eq!(requests[1].messages.len(), 3);

    agent.reset();
    assert!(agent.conversation().is_empty());
    let outcome = agent.run_turn("Hello again").await;
    assert_eq!(outcome.reply, "Hi!");
}
