#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};

use chatnet::llm::models::{
    ChatCompletion, ChatCompletionRequest, ChatMessage, CompletionChoice, ImageData,
    ImageGenerationRequest, ImageResponse, StreamChunk,
};
use chatnet::llm::{ChatTransport, CompletionStream, TransportError};
use chatnet::session::{
    ChatSession, ConnId, ConnectionRegistry, ImageSink, SceneDefaults, SceneDescriptor,
    SessionError, SessionOptions, User,
};

#[derive(Debug, Clone)]
pub enum StreamStep {
    Fragment(&'static str),
    Fail(&'static str),
    Hang,
}

/// Scripted transport that records every call it receives.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<Result<ChatCompletion, TransportError>>>,
    stream_steps: Mutex<Vec<StreamStep>>,
    image: Mutex<Option<ImageResponse>>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
    pub chat_requests: Mutex<Vec<ChatCompletionRequest>>,
    pub image_requests: Mutex<Vec<ImageGenerationRequest>>,
    pub stream_closed: Arc<AtomicBool>,
    pub stream_close_calls: Arc<AtomicUsize>,
    pub idle_closes: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, content: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(completion(content)));
        self
    }

    pub fn with_error(self, error: TransportError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn with_empty_completion(self) -> Self {
        self.replies.lock().unwrap().push_back(Ok(ChatCompletion {
            id: "empty".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            choices: vec![],
            usage: None,
        }));
        self
    }

    pub fn with_stream(self, steps: Vec<StreamStep>) -> Self {
        *self.stream_steps.lock().unwrap() = steps;
        self
    }

    pub fn with_image(self, data: Vec<ImageData>) -> Self {
        *self.image.lock().unwrap() = Some(ImageResponse { created: 0, data });
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn chat_requests(&self) -> Vec<ChatCompletionRequest> {
        self.chat_requests.lock().unwrap().clone()
    }

    pub fn image_requests(&self) -> Vec<ImageGenerationRequest> {
        self.image_requests.lock().unwrap().clone()
    }
}

pub fn completion(content: &str) -> ChatCompletion {
    ChatCompletion {
        id: "chatcmpl-test".to_string(),
        model: "gpt-3.5-turbo".to_string(),
        choices: vec![CompletionChoice {
            index: 0,
            message: ChatMessage::new("assistant", content),
            finish_reason: Some("stop".to_string()),
        }],
        usage: None,
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletion, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.chat_requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(completion("ok")))
    }

    async fn create_chat_completion_stream(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<Box<dyn CompletionStream>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.chat_requests.lock().unwrap().push(request);
        Ok(Box::new(MockStream {
            steps: self.stream_steps.lock().unwrap().clone().into(),
            closed: self.stream_closed.clone(),
            close_calls: self.stream_close_calls.clone(),
        }))
    }

    async fn create_image(
        &self,
        request: ImageGenerationRequest,
    ) -> Result<ImageResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.image_requests.lock().unwrap().push(request);
        self.image
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TransportError::Api("no image scripted".to_string()))
    }

    fn close_idle_connections(&self) {
        self.idle_closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockStream {
    steps: VecDeque<StreamStep>,
    closed: Arc<AtomicBool>,
    close_calls: Arc<AtomicUsize>,
}

#[async_trait]
impl CompletionStream for MockStream {
    async fn recv(&mut self) -> Result<Option<StreamChunk>, TransportError> {
        match self.steps.pop_front() {
            Some(StreamStep::Fragment(text)) => Ok(Some(StreamChunk::fragment(text))),
            Some(StreamStep::Fail(msg)) => Err(TransportError::Network(msg.to_string())),
            Some(StreamStep::Hang) => {
                std::future::pending::<()>().await;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Keeps written images in memory.
#[derive(Default)]
pub struct MemoryImageSink {
    pub writes: Mutex<Vec<Vec<u8>>>,
}

impl MemoryImageSink {
    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageSink for MemoryImageSink {
    async fn write_image(&self, png: &[u8]) -> std::io::Result<PathBuf> {
        self.writes.lock().unwrap().push(png.to_vec());
        Ok(PathBuf::from("memory://image.png"))
    }
}

pub fn owner() -> User {
    User {
        id: 42,
        name: "tester".to_string(),
    }
}

pub fn open_with(
    registry: &ConnectionRegistry,
    conn_id: ConnId,
    descriptor: SceneDescriptor,
    transport: Arc<MockTransport>,
    sink: Arc<dyn ImageSink>,
) -> Result<Arc<ChatSession>, SessionError> {
    ChatSession::open(
        registry,
        SessionOptions {
            conn_id,
            owner: owner(),
            descriptor,
            defaults: SceneDefaults::default(),
            transport,
            image_sink: sink,
        },
    )
}

pub fn open_session(
    registry: &ConnectionRegistry,
    conn_id: ConnId,
    descriptor: SceneDescriptor,
    transport: Arc<MockTransport>,
) -> Arc<ChatSession> {
    open_with(
        registry,
        conn_id,
        descriptor,
        transport,
        Arc::new(MemoryImageSink::default()),
    )
    .expect("session should open")
}

/// A 1x1 PNG, base64 encoded.
pub fn tiny_png_b64() -> String {
    let img = image::RgbaImage::from_pixel(1, 1, image::Rgba([255, 0, 0, 255]));
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    STANDARD.encode(buf.into_inner())
}
