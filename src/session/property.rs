use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::llm::models::ChatMessage;
use crate::session::SessionError;

/// Reserved key holding the ordered chat history.
pub const HISTORY_MSG_TAG: &str = "HistoryMsgTag";

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    History(Vec<ChatMessage>),
    Text(String),
    Json(serde_json::Value),
}

impl PropertyValue {
    fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::History(_) => "history",
            PropertyValue::Text(_) => "text",
            PropertyValue::Json(_) => "json",
        }
    }
}

/// Per-connection key/value store. Every access goes through one reader/writer
/// lock; values are cloned out so no guard outlives a call.
#[derive(Debug, Default)]
pub struct PropertyStore {
    entries: RwLock<HashMap<String, PropertyValue>>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Writers replace whole entries, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, PropertyValue>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, PropertyValue>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, key: impl Into<String>, value: PropertyValue) {
        self.write().insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<PropertyValue> {
        self.read().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<PropertyValue> {
        self.write().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// The chat history. A missing entry means the session was never seeded
    /// or the key was removed, and is reported rather than defaulted.
    pub fn history(&self) -> Result<Vec<ChatMessage>, SessionError> {
        match self.get(HISTORY_MSG_TAG) {
            Some(PropertyValue::History(messages)) => Ok(messages),
            Some(other) => Err(SessionError::PropertyType {
                key: HISTORY_MSG_TAG.to_string(),
                found: other.type_name(),
            }),
            None => Err(SessionError::PropertyMissing(HISTORY_MSG_TAG.to_string())),
        }
    }

    pub fn set_history(&self, messages: Vec<ChatMessage>) {
        self.set(HISTORY_MSG_TAG, PropertyValue::History(messages));
    }
}
