use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::TransportConfig;
use crate::llm::{
    models::{ChatCompletion, ChatCompletionRequest, ImageGenerationRequest, ImageResponse, StreamChunk},
    ChatTransport, CompletionStream, TransportError,
};

/// OpenAI-compatible REST transport.
pub struct OpenAiTransport {
    // None once idle connections have been torn down.
    client: RwLock<Option<Client>>,
    api_key: String,
    base_url: String,
}

impl OpenAiTransport {
    pub fn new(
        api_key: String,
        base_url: String,
        timeout: Duration,
        proxy: Option<&str>,
    ) -> Result<Self, TransportError> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| TransportError::Network(format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            client: RwLock::new(Some(client)),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Builds a transport from config, letting a per-session token and timeout
    /// take precedence over the configured ones.
    pub fn from_config(
        config: &TransportConfig,
        token: Option<&str>,
        timeout_secs: Option<u64>,
    ) -> Result<Self, TransportError> {
        let api_key = token
            .filter(|t| !t.is_empty())
            .unwrap_or(&config.api_key)
            .to_string();
        let timeout = Duration::from_secs(timeout_secs.unwrap_or(config.timeout_secs));
        Self::new(api_key, config.api_base.clone(), timeout, config.proxy.as_deref())
    }

    fn client(&self) -> Result<Client, TransportError> {
        let guard = self.client.read().unwrap_or_else(|e| e.into_inner());
        guard.clone().ok_or(TransportError::Closed)
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, TransportError> {
        let response = self
            .client()?
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(TransportError::RateLimited);
            }
            return Err(TransportError::Api(format!("OpenAI Error {}: {}", status, text)));
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatTransport for OpenAiTransport {
    fn name(&self) -> &str {
        "openai"
    }

    async fn create_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletion, TransportError> {
        let response = self
            .post_json("/chat/completions", &to_wire(request))
            .await?;
        response
            .json::<ChatCompletion>()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }

    async fn create_chat_completion_stream(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<Box<dyn CompletionStream>, TransportError> {
        let request = ChatCompletionRequest {
            stream: true,
            ..to_wire(request)
        };
        let response = self.post_json("/chat/completions", &request).await?;
        Ok(Box::new(OpenAiCompletionStream::new(Box::pin(
            response.bytes_stream(),
        ))))
    }

    async fn create_image(
        &self,
        request: ImageGenerationRequest,
    ) -> Result<ImageResponse, TransportError> {
        let response = self.post_json("/images/generations", &request).await?;
        response
            .json::<ImageResponse>()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }

    fn close_idle_connections(&self) {
        let mut guard = self.client.write().unwrap_or_else(|e| e.into_inner());
        if guard.take().is_some() {
            info!("Released HTTP client for {}", self.base_url);
        }
    }
}

/// Maps session roles onto the ones the chat endpoint accepts. History keeps
/// the session's own role names; only the request body is rewritten.
fn wire_role(role: &str) -> Option<&'static str> {
    match role {
        "human" | "agent" => Some("user"),
        "ai" => Some("assistant"),
        _ => None,
    }
}

fn to_wire(mut request: ChatCompletionRequest) -> ChatCompletionRequest {
    for message in request.messages.iter_mut() {
        if let Some(role) = wire_role(&message.role) {
            message.role = role.to_string();
        }
    }
    request
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Server-sent-events reader over a chat completion response body.
pub struct OpenAiCompletionStream {
    body: Option<ByteStream>,
    buffer: Vec<u8>,
    pending: VecDeque<StreamChunk>,
    finished: bool,
}

impl OpenAiCompletionStream {
    fn new(body: ByteStream) -> Self {
        Self {
            body: Some(body),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn drain_lines(&mut self) -> Result<(), TransportError> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&line)?;
        }
        Ok(())
    }

    fn handle_line(&mut self, raw: &[u8]) -> Result<(), TransportError> {
        if self.finished {
            return Ok(());
        }
        let line = std::str::from_utf8(raw)
            .map_err(|e| TransportError::InvalidResponse(format!("non utf-8 stream line: {}", e)))?;
        match parse_sse_line(line)? {
            SseLine::Skip => {}
            SseLine::Done => self.finished = true,
            SseLine::Chunk(chunk) => self.pending.push_back(chunk),
        }
        Ok(())
    }
}

#[async_trait]
impl CompletionStream for OpenAiCompletionStream {
    async fn recv(&mut self) -> Result<Option<StreamChunk>, TransportError> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Ok(Some(chunk));
            }
            if self.finished {
                return Ok(None);
            }
            let body = self.body.as_mut().ok_or(TransportError::Closed)?;
            match body.next().await {
                Some(Ok(bytes)) => {
                    self.buffer.extend_from_slice(&bytes);
                    self.drain_lines()?;
                }
                Some(Err(e)) => return Err(TransportError::Network(e.to_string())),
                None => {
                    // Body ended without a trailing newline on the last event
                    let tail = std::mem::take(&mut self.buffer);
                    if !tail.is_empty() {
                        self.handle_line(&tail)?;
                    }
                    self.finished = true;
                }
            }
        }
    }

    fn close(&mut self) {
        if self.body.take().is_some() {
            debug!("Closed completion stream");
        }
        self.finished = true;
        self.buffer.clear();
        self.pending.clear();
    }
}

impl Drop for OpenAiCompletionStream {
    fn drop(&mut self) {
        self.close();
    }
}

#[derive(Debug)]
enum SseLine {
    Skip,
    Done,
    Chunk(StreamChunk),
}

fn parse_sse_line(line: &str) -> Result<SseLine, TransportError> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // Comments, event names and keep-alives
        return Ok(SseLine::Skip);
    };
    let data = data.trim_start();
    if data.is_empty() {
        return Ok(SseLine::Skip);
    }
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    serde_json::from_str::<StreamChunk>(data)
        .map(SseLine::Chunk)
        .map_err(|e| TransportError::InvalidResponse(format!("bad stream chunk: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::models::ChatMessage;
    use futures_util::stream;

    fn stream_of(parts: &[&'static str]) -> OpenAiCompletionStream {
        let items: Vec<reqwest::Result<Bytes>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
        OpenAiCompletionStream::new(Box::pin(stream::iter(items)))
    }

    #[test]
    fn parses_data_lines() {
        let line = r#"data: {"id":"c1","choices":[{"index":0,"delta":{"content":"Hel"}}]}"#;
        match parse_sse_line(line).unwrap() {
            SseLine::Chunk(chunk) => assert_eq!(chunk.content(), Some("Hel")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done));
        assert!(matches!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip));
        assert!(matches!(parse_sse_line("").unwrap(), SseLine::Skip));
        assert!(parse_sse_line("data: {not json").is_err());
    }

    #[test]
    fn request_body_uses_endpoint_roles() {
        let request = ChatCompletionRequest {
            model: "gpt-3.5-turbo".to_string(),
            messages: vec![
                ChatMessage::new("system", "be brief"),
                ChatMessage::new("human", "hi"),
                ChatMessage::new("ai", "earlier answer"),
                ChatMessage::new("agent", "status?"),
                ChatMessage::new("assistant", "ok"),
            ],
            stream: false,
        };

        let body = serde_json::to_value(to_wire(request)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "earlier answer"},
                    {"role": "user", "content": "status?"},
                    {"role": "assistant", "content": "ok"}
                ]
            })
        );
    }

    #[tokio::test]
    async fn reassembles_events_split_across_chunks() {
        let mut s = stream_of(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choi",
            "ces\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]);

        let first = s.recv().await.unwrap().unwrap();
        assert_eq!(first.content(), Some("Hel"));
        let second = s.recv().await.unwrap().unwrap();
        assert_eq!(second.content(), Some("lo"));
        assert!(s.recv().await.unwrap().is_none());
        // end-of-stream is sticky
        assert!(s.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn body_end_without_done_marker_is_end_of_stream() {
        let mut s = stream_of(&["data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}"]);
        assert_eq!(s.recv().await.unwrap().unwrap().content(), Some("x"));
        assert!(s.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn closed_stream_yields_nothing() {
        let mut s = stream_of(&["data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n"]);
        s.close();
        s.close();
        assert!(s.recv().await.unwrap().is_none());
    }
}
