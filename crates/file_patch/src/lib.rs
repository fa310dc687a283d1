//! In-memory versioned file store and the patch applier that mutates it.
//!
//! A [`FileStore`] is an immutable value: [`apply_changes`] always returns a
//! new store and leaves its input untouched, so a snapshot taken before a turn
//! stays valid as that turn's checkpoint. Record payloads are reference
//! counted, which keeps snapshots cheap for stores with many unchanged files.

mod apply;
mod change;
mod error;
mod export;
mod record;

pub use apply::{apply_changes, ChangeReport, Disposition, PatchOutcome, RejectReason, SkipReason};
pub use change::{ChangeKind, ChangeOperation, PendingAsset, UPLOADED_IMAGE_SENTINEL};
pub use error::ExportError;
pub use export::ExportEntry;
pub use record::{type_tag_for_path, FileRecord, FileStore, DEFAULT_TYPE_TAG};
