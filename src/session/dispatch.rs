use std::path::PathBuf;

use tokio::sync::mpsc::Sender;
use tracing::{debug, info};

use crate::llm::{
    models::{ChatCompletion, ChatCompletionRequest, ChatMessage, ImageGenerationRequest, ROLE_ASSISTANT},
    CompletionStream, TransportError,
};
use crate::session::{
    image::reencode_png, ChatRole, ChatScene, ChatSession, ImageResponseFormat, ImageSize,
    PaintingScene, RequestContext, SceneDescriptor, SceneKind, SessionError,
};

/// Image parameters for one painting request. Unset fields take the
/// session's painting scene values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageRequest {
    pub prompt: String,
    pub size: Option<ImageSize>,
    pub n: Option<u32>,
    pub response_format: Option<ImageResponseFormat>,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_size(mut self, size: ImageSize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_n(mut self, n: u32) -> Self {
        self.n = Some(n);
        self
    }

    pub fn with_response_format(mut self, format: ImageResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }
}

/// A payload for `send_msg`, tagged with the scene it is meant for.
#[derive(Debug, Clone, PartialEq)]
pub enum SendRequest {
    Chat(Vec<ChatMessage>),
    Painting(ImageRequest),
}

impl SendRequest {
    pub fn kind(&self) -> SceneKind {
        match self {
            SendRequest::Chat(_) => SceneKind::Chat,
            SendRequest::Painting(_) => SceneKind::Painting,
        }
    }
}

impl TryFrom<&SceneDescriptor> for SendRequest {
    type Error = SessionError;

    fn try_from(descriptor: &SceneDescriptor) -> Result<Self, Self::Error> {
        match SceneKind::from_id(descriptor.scenes_id)? {
            SceneKind::Chat => {
                let chat = descriptor.chat_gpt.as_ref().ok_or_else(|| {
                    SessionError::InvalidScene("chat request requires a chatGPT payload".to_string())
                })?;
                Ok(SendRequest::Chat(chat.messages.clone()))
            }
            SceneKind::Painting => {
                let painting = descriptor.painting.as_ref().ok_or_else(|| {
                    SessionError::InvalidScene(
                        "painting request requires a painting payload".to_string(),
                    )
                })?;
                let size = non_empty(&painting.size)
                    .map(str::parse::<ImageSize>)
                    .transpose()?;
                let response_format = non_empty(&painting.response_format)
                    .map(str::parse::<ImageResponseFormat>)
                    .transpose()?;
                Ok(SendRequest::Painting(ImageRequest {
                    prompt: painting.prompt.clone(),
                    size,
                    // An omitted `n` deserializes as 0 and means "use the scene's"
                    n: (painting.n > 0).then_some(painting.n),
                    response_format,
                }))
            }
        }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// The raw completion; its reply has already been appended to history.
    Chat(ChatCompletion),
    ImageUrl(String),
    /// The re-encoded painting's location, plus the payload it came from.
    ImageFile { path: PathBuf, b64_json: String },
}

/// Gives every message without a role the session's configured one.
pub fn assign_default_role(messages: &mut [ChatMessage], role: ChatRole) {
    for message in messages.iter_mut().filter(|m| m.role.is_empty()) {
        message.role = role.as_str().to_string();
    }
}

// Closes the stream on every exit path, including a dropped future.
struct StreamGuard(Box<dyn CompletionStream>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

// The handlers below run with the session's send lock held.
impl ChatSession {
    pub(super) async fn send_chat(
        &self,
        ctx: &RequestContext,
        scene: ChatScene,
        mut messages: Vec<ChatMessage>,
    ) -> Result<ChatCompletion, SessionError> {
        assign_default_role(&mut messages, scene.role);

        let mut history = self.properties.history()?;
        history.extend(messages);

        let request = ChatCompletionRequest {
            model: scene.model.as_str().to_string(),
            messages: history.clone(),
            stream: false,
        };
        debug!(
            conn_id = self.conn_id,
            model = %request.model,
            context_len = history.len(),
            timeout = ?ctx.timeout(),
            "Sending chat completion"
        );

        let completion = ctx
            .run(self.transport.create_chat_completion(request))
            .await?;
        let reply = completion.reply().ok_or_else(|| {
            TransportError::InvalidResponse("completion has no choices".to_string())
        })?;

        history.push(reply);
        self.properties.set_history(history);
        Ok(completion)
    }

    pub(super) async fn send_painting(
        &self,
        ctx: &RequestContext,
        scene: PaintingScene,
        request: ImageRequest,
    ) -> Result<SendOutcome, SessionError> {
        let format = request.response_format.unwrap_or(scene.response_format);
        let n = request.n.unwrap_or(scene.n);
        if n == 0 {
            return Err(SessionError::InvalidScene(
                "image count must be positive".to_string(),
            ));
        }

        let wire = ImageGenerationRequest {
            prompt: request.prompt,
            n,
            size: request.size.unwrap_or(scene.size).as_str().to_string(),
            response_format: format.wire_value().to_string(),
        };
        debug!(conn_id = self.conn_id, size = %wire.size, n, "Sending image generation");

        let response = ctx.run(self.transport.create_image(wire)).await?;
        let first = response.data.into_iter().next().ok_or_else(|| {
            TransportError::InvalidResponse("image response has no data".to_string())
        })?;

        match format {
            ImageResponseFormat::Url => {
                let url = first.url.ok_or_else(|| {
                    TransportError::InvalidResponse("image result has no url".to_string())
                })?;
                info!(conn_id = self.conn_id, %url, "Generated image");
                Ok(SendOutcome::ImageUrl(url))
            }
            ImageResponseFormat::Base64 => {
                let b64_json = first.b64_json.ok_or_else(|| {
                    TransportError::InvalidResponse("image result has no b64_json".to_string())
                })?;
                let png = reencode_png(&b64_json)?;
                let path = self.image_sink.write_image(&png).await?;
                info!(
                    conn_id = self.conn_id,
                    path = %path.display(),
                    bytes = png.len(),
                    "Saved generated image"
                );
                Ok(SendOutcome::ImageFile { path, b64_json })
            }
        }
    }

    pub(super) async fn stream_chat(
        &self,
        ctx: &RequestContext,
        scene: ChatScene,
        mut messages: Vec<ChatMessage>,
        tx: &Sender<String>,
    ) -> Result<(), SessionError> {
        assign_default_role(&mut messages, scene.role);

        let mut history = self.properties.history()?;
        history.extend(messages);

        let request = ChatCompletionRequest {
            model: scene.model.as_str().to_string(),
            messages: history.clone(),
            stream: true,
        };

        let reply = ctx
            .run(async {
                let stream = self.transport.create_chat_completion_stream(request).await?;
                let mut stream = StreamGuard(stream);
                let mut reply = String::new();
                let mut fragments = 0usize;

                while let Some(chunk) = stream.0.recv().await? {
                    let Some(fragment) = chunk.content().filter(|c| !c.is_empty()) else {
                        continue;
                    };
                    reply.push_str(fragment);
                    fragments += 1;
                    // A departed observer doesn't stop the reply from being recorded
                    let _ = tx.send(fragment.to_string()).await;
                }

                debug!(conn_id = self.conn_id, fragments, "Stream finished");
                Ok::<_, SessionError>(reply)
            })
            .await?;

        history.push(ChatMessage::new(ROLE_ASSISTANT, reply));
        self.properties.set_history(history);
        Ok(())
    }
}
