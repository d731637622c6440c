use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ChatConfig;
use crate::llm::models::ChatMessage;
use crate::session::SessionError;

/// Wire value of `scenesId` selecting the chat scene.
pub const CHAT_SCENES: i32 = 1;
/// Wire value of `scenesId` selecting the painting scene.
pub const PAINTING_SCENES: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneKind {
    Chat,
    Painting,
}

impl SceneKind {
    pub fn id(self) -> i32 {
        match self {
            SceneKind::Chat => CHAT_SCENES,
            SceneKind::Painting => PAINTING_SCENES,
        }
    }

    pub fn from_id(id: i32) -> Result<Self, SessionError> {
        match id {
            CHAT_SCENES => Ok(SceneKind::Chat),
            PAINTING_SCENES => Ok(SceneKind::Painting),
            other => Err(SessionError::SceneNotFound(format!("scenesId {}", other))),
        }
    }
}

impl fmt::Display for SceneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneKind::Chat => f.write_str("chat"),
            SceneKind::Painting => f.write_str("painting"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatModel {
    Gpt35Turbo,
    Gpt35Turbo16k,
    Gpt4,
    Gpt432k,
    Gpt4Turbo,
    Gpt4o,
    Gpt4oMini,
}

impl ChatModel {
    pub const ALL: [ChatModel; 7] = [
        ChatModel::Gpt35Turbo,
        ChatModel::Gpt35Turbo16k,
        ChatModel::Gpt4,
        ChatModel::Gpt432k,
        ChatModel::Gpt4Turbo,
        ChatModel::Gpt4o,
        ChatModel::Gpt4oMini,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChatModel::Gpt35Turbo => "gpt-3.5-turbo",
            ChatModel::Gpt35Turbo16k => "gpt-3.5-turbo-16k",
            ChatModel::Gpt4 => "gpt-4",
            ChatModel::Gpt432k => "gpt-4-32k",
            ChatModel::Gpt4Turbo => "gpt-4-turbo",
            ChatModel::Gpt4o => "gpt-4o",
            ChatModel::Gpt4oMini => "gpt-4o-mini",
        }
    }
}

impl FromStr for ChatModel {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChatModel::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SessionError::InvalidScene(format!("unsupported model '{}'", s)))
    }
}

/// Who the session is talking to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    Ai,
    Human,
    Agent,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::Ai => "ai",
            ChatRole::Human => "human",
            ChatRole::Agent => "agent",
        }
    }
}

impl FromStr for ChatRole {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ai" => Ok(ChatRole::Ai),
            "human" => Ok(ChatRole::Human),
            "agent" => Ok(ChatRole::Agent),
            _ => Err(SessionError::InvalidScene(format!("unsupported role '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSize {
    Small,
    Medium,
    Large,
}

impl ImageSize {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageSize::Small => "256x256",
            ImageSize::Medium => "512x512",
            ImageSize::Large => "1024x1024",
        }
    }
}

impl FromStr for ImageSize {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "256x256" => Ok(ImageSize::Small),
            "512x512" => Ok(ImageSize::Medium),
            "1024x1024" => Ok(ImageSize::Large),
            _ => Err(SessionError::InvalidScene(format!("unsupported image size '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageResponseFormat {
    Url,
    Base64,
}

impl ImageResponseFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageResponseFormat::Url => "url",
            ImageResponseFormat::Base64 => "base64",
        }
    }

    /// Value the image endpoint expects in `response_format`.
    pub fn wire_value(self) -> &'static str {
        match self {
            ImageResponseFormat::Url => "url",
            ImageResponseFormat::Base64 => "b64_json",
        }
    }
}

impl FromStr for ImageResponseFormat {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "url" => Ok(ImageResponseFormat::Url),
            "base64" | "b64_json" => Ok(ImageResponseFormat::Base64),
            _ => Err(SessionError::InvalidScene(format!(
                "unsupported response format '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatScene {
    pub model: ChatModel,
    pub role: ChatRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaintingScene {
    pub size: ImageSize,
    pub response_format: ImageResponseFormat,
    pub n: u32,
}

/// The active interaction mode of a session. Switching modes replaces the
/// whole value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scene {
    Chat(ChatScene),
    Painting(PaintingScene),
}

impl Scene {
    pub fn kind(&self) -> SceneKind {
        match self {
            Scene::Chat(_) => SceneKind::Chat,
            Scene::Painting(_) => SceneKind::Painting,
        }
    }

    pub fn scenes_id(&self) -> i32 {
        self.kind().id()
    }

    pub fn from_descriptor(
        descriptor: &SceneDescriptor,
        defaults: &SceneDefaults,
    ) -> Result<Self, SessionError> {
        match SceneKind::from_id(descriptor.scenes_id)? {
            SceneKind::Chat => {
                let chat = descriptor.chat_gpt.as_ref().ok_or_else(|| {
                    SessionError::InvalidScene("chat scene requires a chatGPT payload".to_string())
                })?;
                let model = if chat.model.trim().is_empty() {
                    defaults.model
                } else {
                    chat.model.parse()?
                };
                let role = if chat.role.trim().is_empty() {
                    defaults.role
                } else {
                    chat.role.parse()?
                };
                Ok(Scene::Chat(ChatScene { model, role }))
            }
            SceneKind::Painting => {
                let painting = descriptor.painting.as_ref().ok_or_else(|| {
                    SessionError::InvalidScene(
                        "painting scene requires a painting payload".to_string(),
                    )
                })?;
                if painting.n == 0 {
                    return Err(SessionError::InvalidScene(
                        "image count must be positive".to_string(),
                    ));
                }
                Ok(Scene::Painting(PaintingScene {
                    size: painting.size.parse()?,
                    response_format: painting.response_format.parse()?,
                    n: painting.n,
                }))
            }
        }
    }
}

/// Fallbacks for chat descriptors that leave model or role empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneDefaults {
    pub model: ChatModel,
    pub role: ChatRole,
}

impl Default for SceneDefaults {
    fn default() -> Self {
        Self {
            model: ChatModel::Gpt35Turbo,
            role: ChatRole::Human,
        }
    }
}

impl SceneDefaults {
    pub fn from_config(config: &ChatConfig) -> Result<Self, SessionError> {
        Ok(Self {
            model: config.default_model.parse()?,
            role: config.default_role.parse()?,
        })
    }
}

/// Caller-facing session descriptor. Only the payload selected by `scenes_id`
/// is consulted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDescriptor {
    pub scenes_id: i32,
    #[serde(rename = "chatGPT", default, skip_serializing_if = "Option::is_none")]
    pub chat_gpt: Option<ChatDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub painting: Option<PaintingDescriptor>,
    /// Per-session API token overriding the configured one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Per-session request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl SceneDescriptor {
    pub fn chat(model: &str, role: &str) -> Self {
        Self {
            scenes_id: CHAT_SCENES,
            chat_gpt: Some(ChatDescriptor {
                model: model.to_string(),
                role: role.to_string(),
                messages: Vec::new(),
            }),
            ..Default::default()
        }
    }

    pub fn painting(size: &str, response_format: &str, n: u32) -> Self {
        Self {
            scenes_id: PAINTING_SCENES,
            painting: Some(PaintingDescriptor {
                size: size.to_string(),
                response_format: response_format.to_string(),
                n,
                prompt: String::new(),
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDescriptor {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaintingDescriptor {
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub response_format: String,
    #[serde(default)]
    pub n: u32,
    #[serde(default)]
    pub prompt: String,
}
