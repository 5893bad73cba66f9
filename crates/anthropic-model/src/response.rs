use std::collections::BTreeMap;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use github_agent_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};
use github_agent_sse::Sse;
use pin_project_lite::pin_project;
use serde_json::{Map, Value};

use crate::Error;
use crate::proto::{BlockDelta, StartBlock, StreamEvent};

struct PartialToolUse {
    id: String,
    name: String,
    input_json: String,
}

struct PartialState {
    sse: Sse,
    id: Option<String>,
    // Tool use blocks being streamed, keyed by content block index. A block
    // is emitted as a tool call once its `content_block_stop` arrives.
    tool_uses: BTreeMap<u32, PartialToolUse>,
    finish_reason: Option<ModelFinishReason>,
    finished: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct AnthropicResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl AnthropicResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            id: None,
            tool_uses: Default::default(),
            finish_reason: None,
            finished: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for AnthropicResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(mut partial_state: PartialState) -> NextEvent {
    while !partial_state.finished {
        let data = match partial_state.sse.next_event().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                // The connection closed without `message_stop`.
                return Err(Error::new(
                    "event stream ended unexpectedly",
                    ErrorKind::InvalidResponse,
                ));
            }
            Err(err) => {
                return Err(Error::new(format!("{err}"), ErrorKind::Other));
            }
        };
        trace!("got sse event: {data}");

        let event = serde_json::from_str::<StreamEvent>(&data).map_err(
            |err| Error::new(format!("{err}"), ErrorKind::InvalidResponse),
        )?;

        let model_event = match event {
            StreamEvent::MessageStart { message } => {
                partial_state.id = Some(message.id);
                None
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                StartBlock::Text { text } if !text.is_empty() => {
                    Some(ModelResponseEvent::MessageDelta(text))
                }
                StartBlock::ToolUse { id, name } => {
                    partial_state.tool_uses.insert(
                        index,
                        PartialToolUse {
                            id,
                            name,
                            input_json: String::new(),
                        },
                    );
                    None
                }
                _ => None,
            },
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } if !text.is_empty() => {
                    Some(ModelResponseEvent::MessageDelta(text))
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(tool_use) =
                        partial_state.tool_uses.get_mut(&index)
                    {
                        tool_use.input_json.push_str(&partial_json);
                    }
                    None
                }
                _ => None,
            },
            StreamEvent::ContentBlockStop { index } => partial_state
                .tool_uses
                .remove(&index)
                .map(|tool_use| {
                    ModelResponseEvent::ToolCall(to_tool_call_request(tool_use))
                }),
            StreamEvent::MessageDelta { delta } => {
                if let Some(stop_reason) = delta.stop_reason {
                    partial_state.finish_reason =
                        Some(match stop_reason.as_str() {
                            "tool_use" => ModelFinishReason::ToolCalls,
                            "max_tokens" => ModelFinishReason::Length,
                            _ => ModelFinishReason::Stop,
                        });
                }
                None
            }
            StreamEvent::MessageStop => {
                partial_state.finished = true;
                debug!(id = ?partial_state.id, "message completed");
                let reason = partial_state
                    .finish_reason
                    .take()
                    .unwrap_or(ModelFinishReason::Stop);
                Some(ModelResponseEvent::Completed(reason))
            }
            StreamEvent::Error { error } => {
                let kind = match error.r#type.as_str() {
                    "authentication_error" | "permission_error" => {
                        ErrorKind::Unauthorized
                    }
                    "rate_limit_error" | "overloaded_error" => {
                        ErrorKind::RateLimitExceeded
                    }
                    _ => ErrorKind::Other,
                };
                return Err(Error::new(
                    format!("{}: {}", error.r#type, error.message),
                    kind,
                ));
            }
            StreamEvent::Ping | StreamEvent::Unknown => None,
        };

        if let Some(model_event) = model_event {
            return Ok((Some(model_event), partial_state));
        }
    }

    Ok((None, partial_state))
}

fn to_tool_call_request(tool_use: PartialToolUse) -> ToolCallRequest {
    let PartialToolUse {
        id,
        name,
        input_json,
    } = tool_use;
    let arguments = if input_json.trim().is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_str::<Value>(&input_json).unwrap_or_else(|err| {
            warn!("malformed input for tool use {id}: {err}");
            Value::Object(Map::new())
        })
    };
    ToolCallRequest {
        id,
        name,
        arguments,
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use github_agent_sse::Chunks;
    use serde_json::json;

    use super::*;

    async fn collect_events(
        fixture: &'static [u8],
    ) -> Result<Vec<ModelResponseEvent>, Error> {
        let chunks =
            Chunks::from_vec_deque(vec![Bytes::from_static(fixture)].into());
        let mut resp = pin!(AnthropicResponse::from_sse(Sse::new(chunks)));
        let mut events = vec![];
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await?
        {
            events.push(event);
        }
        Ok(events)
    }

    #[tokio::test]
    async fn test_tool_use_events() {
        let events =
            collect_events(include_bytes!("../fixtures/tool_use.txt"))
                .await
                .unwrap();
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::MessageDelta("I'll list ".to_owned()),
                ModelResponseEvent::MessageDelta(
                    "your repositories.".to_owned()
                ),
                ModelResponseEvent::ToolCall(ToolCallRequest {
                    id: "toolu_01".to_owned(),
                    name: "search_repositories".to_owned(),
                    arguments: json!({ "query": "user:octocat" }),
                }),
                ModelResponseEvent::Completed(ModelFinishReason::ToolCalls),
            ]
        );
    }

    #[tokio::test]
    async fn test_error_event() {
        let err = collect_events(
            b"event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimitExceeded);
        assert_eq!(err.message(), "overloaded_error: Overloaded");
    }

    #[tokio::test]
    async fn test_truncated_stream() {
        let err = collect_events(
            b"event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n",
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
    }
}
