use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use file_patch::PendingAsset;
use stream_source::ImagePayload;
use thiserror::Error;
use tracing::debug;

use crate::lock_unpoisoned;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// Image the user attached to a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub name: String,
    /// Empty when the type could not be inferred.
    pub mime_type: String,
    pub source: ImageSource,
}

impl ImageAttachment {
    /// Attachment read lazily from `path`, typed by its extension.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            name,
            mime_type: mime_type_for_path(&path).unwrap_or_default().to_string(),
            source: ImageSource::Path(path),
        }
    }

    #[must_use]
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            source: ImageSource::Bytes(bytes),
        }
    }

    /// Reads and base64 encodes the image.
    pub fn encode(&self) -> Result<ImagePayload, AttachmentError> {
        if self.mime_type.trim().is_empty() {
            return Err(AttachmentError::UnknownType {
                name: self.name.clone(),
            });
        }

        let data = match &self.source {
            ImageSource::Bytes(bytes) => STANDARD.encode(bytes),
            ImageSource::Path(path) => {
                let bytes = std::fs::read(path).map_err(|source| AttachmentError::Read {
                    name: self.name.clone(),
                    path: path.clone(),
                    source,
                })?;
                STANDARD.encode(bytes)
            }
        };

        if data.is_empty() {
            return Err(AttachmentError::Empty {
                name: self.name.clone(),
            });
        }

        Ok(ImagePayload {
            mime_type: self.mime_type.clone(),
            data,
        })
    }
}

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("failed to read image '{name}' at {path}: {source}")]
    Read {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image '{name}' is empty")]
    Empty { name: String },

    #[error("image '{name}' has an unrecognized type")]
    UnknownType { name: String },
}

/// Encodes all attachments, failing on the first unusable one.
pub fn encode_attachments(
    attachments: &[ImageAttachment],
) -> Result<Vec<ImagePayload>, AttachmentError> {
    attachments.iter().map(ImageAttachment::encode).collect()
}

/// The first image of a turn, available to sentinel substitutions.
#[must_use]
pub fn pending_asset(payloads: &[ImagePayload]) -> Option<PendingAsset> {
    payloads
        .first()
        .map(|payload| PendingAsset::new(payload.data.clone(), payload.mime_type.clone()))
}

fn mime_type_for_path(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        _ => return None,
    };
    Some(mime)
}

/// Transient preview handles shown next to a user message.
pub trait PreviewRefs: Send + Sync {
    fn create(&self, image: &ImageAttachment) -> String;
    fn release(&self, preview_ref: &str);
}

/// In-memory [`PreviewRefs`] that tracks live handles.
#[derive(Debug, Default)]
pub struct PreviewLedger {
    next_id: AtomicU64,
    released: AtomicUsize,
    live: Mutex<BTreeSet<String>>,
}

impl PreviewLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn live_refs(&self) -> Vec<String> {
        lock_unpoisoned(&self.live).iter().cloned().collect()
    }

    #[must_use]
    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl PreviewRefs for PreviewLedger {
    fn create(&self, image: &ImageAttachment) -> String {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let preview_ref = format!("preview:{id}:{}", image.name);
        lock_unpoisoned(&self.live).insert(preview_ref.clone());
        preview_ref
    }

    fn release(&self, preview_ref: &str) {
        if lock_unpoisoned(&self.live).remove(preview_ref) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Releases every created preview ref when dropped.
pub(crate) struct PreviewGuard {
    previews: Arc<dyn PreviewRefs>,
    refs: Vec<String>,
}

impl PreviewGuard {
    pub(crate) fn create(previews: Arc<dyn PreviewRefs>, images: &[ImageAttachment]) -> Self {
        let refs = images.iter().map(|image| previews.create(image)).collect();
        Self { previews, refs }
    }

    pub(crate) fn refs(&self) -> &[String] {
        &self.refs
    }
}

impl Drop for PreviewGuard {
    fn drop(&mut self) {
        debug!(count = self.refs.len(), "releasing image previews");
        for preview_ref in self.refs.drain(..) {
            self.previews.release(&preview_ref);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn bytes_are_base64_encoded() {
        let image = ImageAttachment::from_bytes("dot.png", "image/png", vec![0x89, b'P', b'N', b'G']);
        let payload = image.encode().expect("encode");

        assert_eq!(payload.mime_type, "image/png");
        assert_eq!(payload.data, "iVBORw==");
    }

    #[test]
    fn path_attachment_infers_type_from_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Photo.JPG");
        std::fs::write(&path, b"jpeg-bytes").expect("write");

        let image = ImageAttachment::from_path(&path);
        assert_eq!(image.name, "Photo.JPG");
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.encode().expect("encode").data, STANDARD.encode(b"jpeg-bytes"));
    }

    #[test]
    fn unreadable_empty_or_untyped_images_fail() {
        let dir = tempfile::tempdir().expect("tempdir");

        assert_matches!(
            ImageAttachment::from_path(dir.path().join("missing.png")).encode(),
            Err(AttachmentError::Read { .. })
        );
        assert_matches!(
            ImageAttachment::from_bytes("blank.png", "image/png", Vec::new()).encode(),
            Err(AttachmentError::Empty { .. })
        );
        assert_matches!(
            ImageAttachment::from_path(dir.path().join("notes.txt")).encode(),
            Err(AttachmentError::UnknownType { .. })
        );
    }

    #[test]
    fn first_payload_becomes_pending_asset() {
        let payloads = encode_attachments(&[
            ImageAttachment::from_bytes("a.png", "image/png", vec![1]),
            ImageAttachment::from_bytes("b.gif", "image/gif", vec![2]),
        ])
        .expect("encode");

        assert_eq!(
            pending_asset(&payloads),
            Some(PendingAsset::new(STANDARD.encode([1u8]), "image/png"))
        );
        assert_eq!(pending_asset(&[]), None);
    }

    #[test]
    fn guard_releases_every_ref_once() {
        let ledger = Arc::new(PreviewLedger::new());
        let images = [
            ImageAttachment::from_bytes("a.png", "image/png", vec![1]),
            ImageAttachment::from_bytes("b.png", "image/png", vec![2]),
        ];

        {
            let guard = PreviewGuard::create(Arc::clone(&ledger) as Arc<dyn PreviewRefs>, &images);
            assert_eq!(guard.refs().len(), 2);
            assert_eq!(ledger.live_refs().len(), 2);
        }

        assert!(ledger.live_refs().is_empty());
        assert_eq!(ledger.release_count(), 2);

        ledger.release("preview:0:a.png");
        assert_eq!(ledger.release_count(), 2);
    }
}
