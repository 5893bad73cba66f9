use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;

use github_agent_model::{
    ModelFinishReason, ModelProvider, ModelProviderError, ModelRequest,
    ModelResponse, ModelResponseEvent, ToolCallRequest,
};
use tracing::Instrument;

type SendRequestResult =
    Result<ModelClientResponse, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type DeltaFn = Box<dyn Fn(&str) + Send + 'static>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(ModelRequest, DeltaFn) -> BoxedSendRequestFuture + Send + Sync
>;

/// A wrapper around a model provider that provides a type-erased
/// interface for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // Erase `P` so the agent doesn't need a generic parameter.
        let handler_fn: HandlerFn = Arc::new(move |req, on_delta| {
            let fut = provider.send_request(&req);
            let span = debug_span!(
                "model request",
                messages = req.messages.len(),
                tools = req.tools.len()
            );
            Box::pin(
                async move {
                    trace!("sending request: {req:?}");
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err, on_delta).await
                }
                .instrument(span),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and returns the fully received response.
    ///
    /// `on_delta` receives text fragments as they are streamed.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    #[inline]
    pub async fn send_request(
        &self,
        req: ModelRequest,
        on_delta: impl Fn(&str) + Send + 'static,
    ) -> SendRequestResult {
        (self.handler_fn)(req, Box::new(on_delta)).await
    }
}

/// A completely received response from the model client.
#[derive(Clone, Debug, Default)]
pub struct ModelClientResponse {
    /// The text content.
    pub content: String,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCallRequest>,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    on_delta: DeltaFn,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            debug!("request failed: {err}");
            return Err(Box::new(err));
        }
    };

    let mut result = ModelClientResponse::default();
    let mut pinned_resp = pin!(resp);
    loop {
        let event =
            match poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await
            {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(err) => {
                    debug!("response stream failed: {err}");
                    return Err(Box::new(err));
                }
            };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(delta) => {
                on_delta(&delta);
                result.content.push_str(&delta);
            }
            ModelResponseEvent::ToolCall(req) => {
                result.tool_calls.push(req);
            }
            ModelResponseEvent::Completed(reason) => {
                result.finish_reason = Some(reason);
            }
        }
    }

    debug!(
        finish_reason = ?result.finish_reason,
        tool_calls = result.tool_calls.len(),
        "response received"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use github_agent_model::ModelMessage;
    use github_agent_test_model::{
        PresetEvent, PresetResponse, TestModelProvider,
    };
    use serde_json::json;

    use super::*;

    fn request() -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_assistant_response_step(
            PresetResponse::with_events([
                PresetEvent::MessageDelta("How ".to_owned()),
                PresetEvent::MessageDelta("are ".to_owned()),
                PresetEvent::MessageDelta("you?".to_owned()),
            ]),
        );
        let model_client = ModelClient::new(model_provider);

        // The same request always selects the same step.
        for _ in 0..3 {
            let deltas = Arc::new(Mutex::new(vec![]));
            let resp = model_client
                .send_request(request(), {
                    let deltas = Arc::clone(&deltas);
                    move |delta| {
                        deltas.lock().unwrap().push(delta.to_owned());
                    }
                })
                .await
                .unwrap();
            assert_eq!(resp.content, "How are you?");
            assert_eq!(resp.finish_reason, Some(ModelFinishReason::Stop));
            assert_eq!(*deltas.lock().unwrap(), ["How ", "are ", "you?"]);
        }
    }

    #[tokio::test]
    async fn test_tool_calls() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_assistant_response_step(
            PresetResponse::with_events([PresetEvent::ToolCall(
                ToolCallRequest {
                    id: "call_1".to_owned(),
                    name: "get_me".to_owned(),
                    arguments: json!({}),
                },
            )]),
        );
        let model_client = ModelClient::new(model_provider);
        let resp = model_client.send_request(request(), |_| {}).await.unwrap();
        assert!(resp.content.is_empty());
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.finish_reason, Some(ModelFinishReason::ToolCalls));
    }

    #[tokio::test]
    async fn test_error_handling() {
        let model_provider = TestModelProvider::default();
        let model_client = ModelClient::new(model_provider);
        let resp_or_err = model_client.send_request(request(), |_| {}).await;
        assert!(resp_or_err.is_err());
    }
}
