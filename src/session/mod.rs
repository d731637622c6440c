pub mod context;
pub mod dispatch;
pub mod error;
pub mod image;
pub mod property;
pub mod registry;
pub mod scene;

pub use context::RequestContext;
pub use dispatch::{assign_default_role, ImageRequest, SendOutcome, SendRequest};
pub use error::SessionError;
pub use image::{FsImageSink, ImageSink};
pub use property::{PropertyStore, PropertyValue, HISTORY_MSG_TAG};
pub use registry::ConnectionRegistry;
pub use scene::{
    ChatModel, ChatRole, ChatScene, ImageResponseFormat, ImageSize, PaintingScene, Scene,
    SceneDefaults, SceneDescriptor, SceneKind, CHAT_SCENES, PAINTING_SCENES,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc::Sender, Mutex};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::llm::{models::ChatMessage, ChatTransport, OpenAiTransport};

pub type ConnId = u32;

/// The user a session belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
}

pub struct SessionOptions {
    pub conn_id: ConnId,
    pub owner: User,
    pub descriptor: SceneDescriptor,
    pub defaults: SceneDefaults,
    pub transport: Arc<dyn ChatTransport>,
    pub image_sink: Arc<dyn ImageSink>,
}

/// A logical connection to the generative service.
///
/// All sends, and scene changes, on one session are serialized by a per-session
/// lock held for the whole call, so the history read-modify-write never loses
/// an update. Different sessions never contend with each other.
pub struct ChatSession {
    conn_id: ConnId,
    owner: User,
    opened_at: DateTime<Utc>,
    transport: Arc<dyn ChatTransport>,
    image_sink: Arc<dyn ImageSink>,
    defaults: SceneDefaults,
    closed: AtomicBool,
    scene: RwLock<Scene>,
    properties: PropertyStore,
    send_lock: Mutex<()>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("conn_id", &self.conn_id)
            .field("owner", &self.owner)
            .field("transport", &self.transport.name())
            .field("closed", &self.is_closed())
            .field("scene", &self.scene())
            .finish()
    }
}

impl ChatSession {
    /// Builds a session and registers it under its connection id. No network
    /// I/O happens here.
    pub fn open(
        registry: &ConnectionRegistry,
        options: SessionOptions,
    ) -> Result<Arc<Self>, SessionError> {
        let scene = Scene::from_descriptor(&options.descriptor, &options.defaults)?;

        let properties = PropertyStore::new();
        properties.set_history(Vec::new());

        let session = Arc::new(Self {
            conn_id: options.conn_id,
            owner: options.owner,
            opened_at: Utc::now(),
            transport: options.transport,
            image_sink: options.image_sink,
            defaults: options.defaults,
            closed: AtomicBool::new(false),
            scene: RwLock::new(scene),
            properties,
            send_lock: Mutex::new(()),
        });
        registry.add(&session)?;

        info!(
            conn_id = session.conn_id,
            owner = %session.owner.name,
            scene = %scene.kind(),
            "Opened chat session"
        );
        Ok(session)
    }

    /// Opens a session against the configured OpenAI-compatible endpoint. The
    /// descriptor's token and timeout, when present, override the config.
    pub fn open_with_config(
        registry: &ConnectionRegistry,
        conn_id: ConnId,
        owner: User,
        descriptor: SceneDescriptor,
        config: &AppConfig,
    ) -> Result<Arc<Self>, SessionError> {
        let transport = OpenAiTransport::from_config(
            &config.transport,
            descriptor.token.as_deref(),
            descriptor.timeout,
        )?;
        let defaults = SceneDefaults::from_config(&config.chat)?;

        Self::open(
            registry,
            SessionOptions {
                conn_id,
                owner,
                descriptor,
                defaults,
                transport: Arc::new(transport),
                image_sink: Arc::new(FsImageSink::new(&config.painting.output_path)),
            },
        )
    }

    pub fn conn_id(&self) -> ConnId {
        self.conn_id
    }

    pub fn owner(&self) -> &User {
        &self.owner
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn transport(&self) -> &Arc<dyn ChatTransport> {
        &self.transport
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn scene(&self) -> Scene {
        *self.scene.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn scenes_id(&self) -> i32 {
        self.scene().scenes_id()
    }

    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    pub fn history(&self) -> Result<Vec<ChatMessage>, SessionError> {
        self.properties.history()
    }

    /// Replaces the scene wholesale. Waits for any in-flight send to finish.
    pub async fn set_scene(&self, descriptor: &SceneDescriptor) -> Result<(), SessionError> {
        let scene = Scene::from_descriptor(descriptor, &self.defaults)?;

        let _guard = self.send_lock.lock().await;
        *self.scene.write().unwrap_or_else(|e| e.into_inner()) = scene;
        debug!(conn_id = self.conn_id, scene = %scene.kind(), "Scene changed");
        Ok(())
    }

    /// Marks the session closed and releases the transport's idle connections.
    /// Only the first call has any effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.transport.close_idle_connections();
        info!(conn_id = self.conn_id, "Closed chat session");
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::ClosedConnection(self.conn_id));
        }
        Ok(())
    }

    fn ensure_scene(&self, requested: SceneKind) -> Result<Scene, SessionError> {
        let scene = self.scene();
        if scene.kind() != requested {
            return Err(SessionError::SceneMismatch {
                configured: scene.kind(),
                requested,
            });
        }
        Ok(scene)
    }

    /// Sends one request through the handler for the session's scene.
    pub async fn send_msg(
        &self,
        ctx: &RequestContext,
        request: SendRequest,
    ) -> Result<SendOutcome, SessionError> {
        self.ensure_open()?;
        let _guard = self.send_lock.lock().await;
        // May have been closed while waiting for the lock
        self.ensure_open()?;

        let scene = self.ensure_scene(request.kind())?;
        match (scene, request) {
            (Scene::Chat(chat), SendRequest::Chat(messages)) => self
                .send_chat(ctx, chat, messages)
                .await
                .map(SendOutcome::Chat),
            (Scene::Painting(painting), SendRequest::Painting(image)) => {
                self.send_painting(ctx, painting, image).await
            }
            (scene, _) => Err(SessionError::SceneNotFound(scene.kind().to_string())),
        }
    }

    /// Streams a chat reply, forwarding each text fragment to `tx` as it
    /// arrives. Returns once the stream ends; the inputs and the assembled
    /// reply are then appended to history.
    ///
    /// The session's send lock is held while fragments are forwarded, and a
    /// full `tx` makes the call wait. Drain the receiver on another task (as
    /// the CLI does) rather than after this call returns.
    pub async fn send_msg_to_chat_stream(
        &self,
        ctx: &RequestContext,
        messages: Vec<ChatMessage>,
        tx: Sender<String>,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        let _guard = self.send_lock.lock().await;
        self.ensure_open()?;

        let chat = match self.ensure_scene(SceneKind::Chat)? {
            Scene::Chat(chat) => chat,
            other => return Err(SessionError::SceneNotFound(other.kind().to_string())),
        };
        self.stream_chat(ctx, chat, messages, &tx).await
    }
}
