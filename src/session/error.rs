use std::time::Duration;

use thiserror::Error;

use crate::llm::TransportError;
use crate::session::{ConnId, SceneKind};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Connection {0} is closed")]
    ClosedConnection(ConnId),
    #[error("Scene mismatch: session is configured for {configured}, request targets {requested}")]
    SceneMismatch {
        configured: SceneKind,
        requested: SceneKind,
    },
    #[error("Scene not found: {0}")]
    SceneNotFound(String),
    #[error("Invalid scene: {0}")]
    InvalidScene(String),
    #[error("Property '{0}' not found")]
    PropertyMissing(String),
    #[error("Property '{key}' holds a {found} value")]
    PropertyType { key: String, found: &'static str },
    #[error("Connection {0} is already registered")]
    DuplicateConnection(ConnId),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Decode Error: {0}")]
    Decode(String),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Request cancelled")]
    Cancelled,
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl From<base64::DecodeError> for SessionError {
    fn from(e: base64::DecodeError) -> Self {
        SessionError::Decode(format!("base64: {}", e))
    }
}

impl From<image::ImageError> for SessionError {
    fn from(e: image::ImageError) -> Self {
        SessionError::Decode(format!("image: {}", e))
    }
}
