use std::collections::btree_map;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Type tag used for text files whose path carries no extension.
pub const DEFAULT_TYPE_TAG: &str = "txt";

/// One file in the store.
///
/// Text records hold raw text and an extension-like tag. Binary records hold a
/// base64 payload and a MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    content: Arc<str>,
    #[serde(rename = "type")]
    type_tag: String,
    #[serde(default)]
    is_binary: bool,
}

impl FileRecord {
    #[must_use]
    pub fn text(content: impl Into<Arc<str>>, type_tag: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            type_tag: type_tag.into(),
            is_binary: false,
        }
    }

    /// Builds a text record tagged from the extension of `path`.
    #[must_use]
    pub fn text_for_path(path: &str, content: impl Into<Arc<str>>) -> Self {
        Self::text(content, type_tag_for_path(path))
    }

    #[must_use]
    pub fn binary(base64_data: impl Into<Arc<str>>, mime_type: impl Into<String>) -> Self {
        Self {
            content: base64_data.into(),
            type_tag: mime_type.into(),
            is_binary: true,
        }
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.is_binary
    }

    /// Returns true when both records share the same payload allocation.
    #[must_use]
    pub fn shares_content_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.content, &other.content)
    }
}

/// Path to record mapping. Iteration is path-sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileStore {
    files: BTreeMap<String, FileRecord>,
}

impl FileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(path)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, FileRecord> {
        self.files.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Returns a copy of this store with `record` written at `path`.
    #[must_use]
    pub fn with_record(mut self, path: impl Into<String>, record: FileRecord) -> Self {
        self.set(path.into(), record);
        self
    }

    pub(crate) fn set(&mut self, path: String, record: FileRecord) {
        self.files.insert(path, record);
    }

    pub(crate) fn delete(&mut self, path: &str) -> Option<FileRecord> {
        self.files.remove(path)
    }
}

impl FromIterator<(String, FileRecord)> for FileStore {
    fn from_iter<I: IntoIterator<Item = (String, FileRecord)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a FileStore {
    type Item = (&'a String, &'a FileRecord);
    type IntoIter = btree_map::Iter<'a, String, FileRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

/// Derives the text type tag from the trailing extension of the last path
/// segment, falling back to [`DEFAULT_TYPE_TAG`].
#[must_use]
pub fn type_tag_for_path(path: &str) -> String {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    match file_name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() && !extension.is_empty() => {
            extension.to_string()
        }
        _ => DEFAULT_TYPE_TAG.to_string(),
    }
}
