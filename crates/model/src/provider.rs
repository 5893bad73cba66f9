use std::error::Error;

use crate::error::ErrorKind;
use crate::request::ModelRequest;
use crate::response::ModelResponse;

/// An error raised by a [`ModelProvider`].
///
/// The agent turns these into an assistant message, so [`kind`] only needs
/// to be precise enough for logs.
///
/// [`kind`]: ModelProviderError::kind
pub trait ModelProviderError: Error + Send + Sync + 'static {
    /// Classifies the error.
    fn kind(&self) -> ErrorKind;
}

/// A hosted chat model that can be asked to continue a conversation.
///
/// Every call carries the whole history in [`ModelRequest`], so providers
/// keep no per-conversation state and one provider may serve several
/// sessions.
pub trait ModelProvider: Send + Sync {
    /// The error type of this provider.
    type Error: ModelProviderError;

    /// The streamed reply.
    type Response: ModelResponse<Error = Self::Error>;

    /// Starts a completion for `req`.
    ///
    /// The returned future owns everything it needs from `req`.
    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static;
}
