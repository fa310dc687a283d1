use file_patch::{ChangeOperation, FileStore};
use serde::{Deserialize, Serialize};
use stream_source::HistoryTurn;
use uuid::Uuid;

use crate::errors::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Machine-readable reason a message finished without a clean result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "error")]
pub enum FailureKind {
    Attachment,
    Transport(ErrorKind),
    Protocol,
    Cancelled,
    TimedOut,
}

impl FailureKind {
    /// True for user cancellation and timeouts.
    #[must_use]
    pub fn is_stopped(self) -> bool {
        matches!(self, Self::Cancelled | Self::TimedOut)
    }
}

/// One conversation entry.
///
/// Assistant messages are created as streaming placeholders and finalized
/// exactly once when their turn ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<ChangeOperation>>,
    /// Store state before this message's changes were applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<FileStore>,
    #[serde(default)]
    pub awaiting_changes: bool,
}

impl Message {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            is_streaming: false,
            error: None,
            failure: None,
            image_refs: Vec::new(),
            changes: None,
            checkpoint: None,
            awaiting_changes: false,
        }
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    #[must_use]
    pub fn streaming_placeholder() -> Self {
        Self {
            is_streaming: true,
            ..Self::new(Role::Assistant, "")
        }
    }

    #[must_use]
    pub fn with_image_refs(mut self, image_refs: Vec<String>) -> Self {
        self.image_refs = image_refs;
        self
    }

    #[must_use]
    pub fn with_failure(mut self, failure: FailureKind, error: impl Into<String>) -> Self {
        self.failure = Some(failure);
        self.error = Some(error.into());
        self
    }

    /// Finalized, error-free messages with text are replayed as history.
    #[must_use]
    pub fn contributes_to_history(&self) -> bool {
        !self.is_streaming && self.error.is_none() && !self.text.is_empty()
    }

    #[must_use]
    pub fn to_history_turn(&self) -> HistoryTurn {
        match self.role {
            Role::User => HistoryTurn::user(self.text.clone()),
            Role::Assistant => HistoryTurn::model(self.text.clone()),
        }
    }
}

/// Prior conversation replayed to the source.
#[must_use]
pub fn history_turns(messages: &[Message]) -> Vec<HistoryTurn> {
    messages
        .iter()
        .filter(|message| message.contributes_to_history())
        .map(Message::to_history_turn)
        .collect()
}
