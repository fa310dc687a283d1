//! Minimal provider-agnostic contract for the model backend text stream.
//!
//! This crate defines only what one turn needs from a backend: a request
//! carrying prior history, the prompt, and attached images, and a cancellable
//! stream of text chunks. Transport details and payload encoding belong to
//! implementations.

use std::fmt;

use futures_util::stream::BoxStream;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Identifier for one conversational turn.
pub type TurnId = u64;

/// Cooperative cancellation signal a source must observe.
pub type CancelSignal = CancellationToken;

/// Chunk stream returned by [`ChunkSource::open`].
pub type ChunkStream = BoxStream<'static, Result<String, SourceError>>;

/// Error returned while constructing a source before any turn starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInitError {
    message: String,
}

impl SourceInitError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for SourceInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SourceInitError {}

impl From<String> for SourceInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Raw transport failure as reported by a backend.
///
/// The shape is deliberately loose: backends report failures as HTTP statuses,
/// transport messages, or arbitrary text, and callers classify the rendered
/// text rather than rely on a contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{0}")]
    Transport(String),

    #[error("request was aborted")]
    Aborted,

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRole {
    User,
    Model,
}

/// One prior finalized message replayed to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTurn {
    pub role: HistoryRole,
    pub text: String,
}

impl HistoryTurn {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::User,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::Model,
            text: text.into(),
        }
    }
}

/// Inline image sent alongside the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    /// Base64 encoded image bytes.
    pub data: String,
}

/// Input required to open a turn stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    pub turn_id: TurnId,
    pub system_instructions: String,
    pub history: Vec<HistoryTurn>,
    pub prompt: String,
    pub images: Vec<ImagePayload>,
}

/// Immutable metadata describing a chunk source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceProfile {
    pub source_id: String,
    pub model_id: String,
}

/// Backend interface for streaming one turn.
pub trait ChunkSource: Send + Sync + 'static {
    /// Returns source/model identity metadata.
    fn profile(&self) -> SourceProfile;

    /// Opens the response stream for `request`.
    ///
    /// Chunks are yielded in arrival order. Implementations must stop yielding
    /// once `cancel` fires; an error item ends the turn.
    fn open(&self, request: SourceRequest, cancel: CancelSignal) -> ChunkStream;
}
