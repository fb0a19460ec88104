use serde::{Deserialize, Serialize};

use crate::core::message::Message;

pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// One independent conversation with its own history and model selection.
///
/// Field names are serialized in camelCase so persisted session lists stay
/// readable by earlier releases of the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub model_id: String,
    /// Unix timestamp in milliseconds. Only used for ordering.
    pub created_at: i64,
}

impl Session {
    pub fn new(id: impl Into<String>, model_id: impl Into<String>, created_at: i64) -> Self {
        Self {
            id: id.into(),
            title: DEFAULT_SESSION_TITLE.to_string(),
            messages: Vec::new(),
            model_id: model_id.into(),
            created_at,
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
