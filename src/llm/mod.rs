pub mod models;
pub mod openai;

pub use openai::OpenAiTransport;

use async_trait::async_trait;
use thiserror::Error;

use models::{ChatCompletion, ChatCompletionRequest, ImageGenerationRequest, ImageResponse, StreamChunk};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network Error: {0}")]
    Network(String),
    #[error("API Error: {0}")]
    Api(String),
    #[error("Rate Limited")]
    RateLimited,
    #[error("Invalid Response: {0}")]
    InvalidResponse(String),
    #[error("Transport has been closed")]
    Closed,
}

/// Client capability a session talks to the remote service through.
///
/// A session owns its transport exclusively and calls
/// [`close_idle_connections`](ChatTransport::close_idle_connections) exactly once,
/// when the session is closed.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn create_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletion, TransportError>;

    async fn create_chat_completion_stream(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<Box<dyn CompletionStream>, TransportError>;

    async fn create_image(
        &self,
        request: ImageGenerationRequest,
    ) -> Result<ImageResponse, TransportError>;

    fn close_idle_connections(&self);
}

/// A lazy, finite sequence of completion chunks.
///
/// `recv` yields `Ok(None)` once at end-of-stream. `close` must be safe to call
/// more than once.
#[async_trait]
pub trait CompletionStream: Send {
    async fn recv(&mut self) -> Result<Option<StreamChunk>, TransportError>;

    fn close(&mut self);
}
