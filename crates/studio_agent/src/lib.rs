//! Turn controller for a streaming code-generation studio.
//!
//! One [`TurnController`] owns the conversation and the project file store.
//! Each turn sends the prompt, prior history, and the rendered file store to a
//! [`stream_source::ChunkSource`], shows change records as they stream in, and
//! applies the final change envelope to the store when the response ends.
//!
//! ## Configuration
//!
//! [`StudioConfig::from_env`] layers, in order:
//!
//! - built-in defaults (60 second turn timeout, built-in system instructions)
//! - an optional JSON file at `STUDIO_AGENT_CONFIG_PATH`:
//!
//! ```json
//! {
//!   "timeout_sec": 90,
//!   "system_instructions": "..."
//! }
//! ```
//!
//! - `STUDIO_AGENT_TIMEOUT_SEC` and `STUDIO_AGENT_SYSTEM_INSTRUCTIONS`
//!
//! Contract notes:
//! - `timeout_sec` must be > 0 when provided.
//! - Unknown JSON fields are rejected.
//! - Blank environment values are ignored.
//!
//! ## Turn outcomes
//!
//! Every accepted turn ends with a finalized assistant message and an idle
//! controller. Cancellation, timeouts, transport errors, and malformed change
//! envelopes leave the file store untouched; the message's `failure` records
//! which one happened.

use std::sync::{Mutex, MutexGuard};

pub mod attachments;
pub mod config;
pub mod context;
pub mod errors;
pub mod logging;
pub mod message;
pub mod restore;
pub mod turn;

pub use attachments::{
    AttachmentError, ImageAttachment, ImageSource, PreviewLedger, PreviewRefs,
};
pub use config::{ConfigError, StudioConfig};
pub use errors::{classify, ErrorKind};
pub use message::{FailureKind, Message, Role};
pub use restore::RestoreError;
pub use turn::{
    NoopObserver, SendError, TurnController, TurnEvent, TurnHandle, TurnInput, TurnObserver,
    TurnOutcome, TurnReport, TurnStatus,
};

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
