use serde::{Deserialize, Serialize};

use crate::record::FileRecord;

/// Content value meaning "write the asset attached to this turn here".
pub const UPLOADED_IMAGE_SENTINEL: &str = "[USE_UPLOADED_IMAGE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// One file operation as carried by the change envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeOperation {
    #[serde(rename = "operation")]
    pub kind: ChangeKind,
    pub path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChangeOperation {
    #[must_use]
    pub fn create(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Create,
            path: path.into(),
            description: String::new(),
            content: Some(content.into()),
        }
    }

    #[must_use]
    pub fn update(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Update,
            ..Self::create(path, content)
        }
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Delete,
            path: path.into(),
            description: String::new(),
            content: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Returns true when the content asks for the pending attached asset.
    #[must_use]
    pub fn uses_uploaded_asset(&self) -> bool {
        self.content.as_deref() == Some(UPLOADED_IMAGE_SENTINEL)
    }
}

/// Binary asset attached to the current turn, awaiting sentinel substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAsset {
    pub data: String,
    pub mime_type: String,
}

impl PendingAsset {
    #[must_use]
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    #[must_use]
    pub fn to_record(&self) -> FileRecord {
        FileRecord::binary(self.data.as_str(), self.mime_type.clone())
    }
}
