use github_agent_model::{ModelMessage, ModelRequest, ModelTool};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AnthropicConfig;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        message: MessageStart,
    },
    ContentBlockStart {
        index: u32,
        content_block: StartBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: MessageDeltaBody,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MessageStart {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MessageDeltaBody {
    pub stop_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    pub r#type: String,
    pub message: String,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct Tool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    role: Role,
    content: Vec<ContentBlock>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    stream: bool,
}

impl MessagesRequest {
    #[inline]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

// -----------
// Conversions
// -----------

pub fn create_request(
    req: &ModelRequest,
    config: &AnthropicConfig,
) -> MessagesRequest {
    MessagesRequest {
        model: config.model.clone(),
        max_tokens: config.max_tokens,
        system: req.system_instructions(),
        messages: create_messages(&req.messages),
        tools: req.tools.iter().map(create_tool).collect(),
        stream: true,
    }
}

/// Converts the history into alternating user/assistant turns.
///
/// Tool results travel as `user` content, so a user text that follows tool
/// results (or several results in a row) is merged into one message.
fn create_messages(messages: &[ModelMessage]) -> Vec<Message> {
    let mut out: Vec<Message> = vec![];
    for msg in messages {
        let (role, blocks) = match msg {
            ModelMessage::System(_) => continue,
            ModelMessage::User(text) => {
                (Role::User, vec![ContentBlock::Text { text: text.clone() }])
            }
            ModelMessage::Assistant(msg) => {
                let mut blocks = vec![];
                if !msg.content.is_empty() {
                    blocks.push(ContentBlock::Text {
                        text: msg.content.clone(),
                    });
                }
                for call in &msg.tool_calls {
                    blocks.push(ContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments.clone(),
                    });
                }
                if blocks.is_empty() {
                    // Empty assistant turns are rejected by the API.
                    continue;
                }
                (Role::Assistant, blocks)
            }
            ModelMessage::Tool(result) => (
                Role::User,
                vec![ContentBlock::ToolResult {
                    tool_use_id: result.id.clone(),
                    content: result.content.clone(),
                    is_error: result.is_error,
                }],
            ),
        };
        match out.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => out.push(Message {
                role,
                content: blocks,
            }),
        }
    }
    out
}

#[inline]
fn create_tool(tool: &ModelTool) -> Tool {
    Tool {
        name: tool.name.clone(),
        description: tool.description.clone(),
        input_schema: tool.parameters.clone(),
    }
}

#[cfg(test)]
mod tests {
    use github_agent_model::{AssistantMessage, ToolCallRequest, ToolCallResult};
    use serde_json::json;

    use super::*;
    use crate::AnthropicConfigBuilder;

    #[test]
    fn test_create_request() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::System("You are a GitHub agent.".to_owned()),
                ModelMessage::User("List my repositories".to_owned()),
                ModelMessage::Assistant(AssistantMessage {
                    content: "Checking.".to_owned(),
                    tool_calls: vec![
                        ToolCallRequest {
                            id: "toolu_1".to_owned(),
                            name: "search_repositories".to_owned(),
                            arguments: json!({ "query": "user:octocat" }),
                        },
                        ToolCallRequest {
                            id: "toolu_2".to_owned(),
                            name: "get_me".to_owned(),
                            arguments: json!({}),
                        },
                    ],
                }),
                ModelMessage::Tool(ToolCallResult {
                    id: "toolu_1".to_owned(),
                    content: "octocat/hello-world".to_owned(),
                    is_error: false,
                }),
                ModelMessage::Tool(ToolCallResult {
                    id: "toolu_2".to_owned(),
                    content: "Error: bad credentials".to_owned(),
                    is_error: true,
                }),
            ],
            tools: vec![ModelTool {
                name: "get_me".to_owned(),
                description: "Returns the authenticated user.".to_owned(),
                parameters: json!({ "type": "object" }),
            }],
        };
        let config = AnthropicConfigBuilder::with_api_key("xxx").build();
        let value =
            serde_json::to_value(create_request(&request, &config)).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "claude-3-5-sonnet-20241022",
                "max_tokens": 4096,
                "system": "You are a GitHub agent.",
                "messages": [
                    {
                        "role": "user",
                        "content": [
                            { "type": "text", "text": "List my repositories" }
                        ]
                    },
                    {
                        "role": "assistant",
                        "content": [
                            { "type": "text", "text": "Checking." },
                            {
                                "type": "tool_use",
                                "id": "toolu_1",
                                "name": "search_repositories",
                                "input": { "query": "user:octocat" }
                            },
                            {
                                "type": "tool_use",
                                "id": "toolu_2",
                                "name": "get_me",
                                "input": {}
                            }
                        ]
                    },
                    {
                        "role": "user",
                        "content": [
                            {
                                "type": "tool_result",
                                "tool_use_id": "toolu_1",
                                "content": "octocat/hello-world"
                            },
                            {
                                "type": "tool_result",
                                "tool_use_id": "toolu_2",
                                "content": "Error: bad credentials",
                                "is_error": true
                            }
                        ]
                    }
                ],
                "tools": [
                    {
                        "name": "get_me",
                        "description": "Returns the authenticated user.",
                        "input_schema": { "type": "object" }
                    }
                ],
                "stream": true
            })
        );
    }

    #[test]
    fn test_skips_empty_assistant_turns() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::User("Hi".to_owned()),
                ModelMessage::assistant_text(""),
                ModelMessage::User("Are you there?".to_owned()),
            ],
            tools: vec![],
        };
        let config = AnthropicConfigBuilder::with_api_key("xxx").build();
        let messages = create_request(&request, &config).messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content.len(), 2);
    }

    #[test]
    fn test_parse_stream_events() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"q\""}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            StreamEvent::ContentBlockDelta {
                index: 1,
                delta: BlockDelta::InputJsonDelta {
                    partial_json: "{\"q\"".to_owned(),
                },
            }
        );

        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"brand_new_event","x":1}"#)
                .unwrap();
        assert_eq!(event, StreamEvent::Unknown);
    }
}
