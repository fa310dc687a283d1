use std::fs;
use std::path::{Component, Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::ExportError;
use crate::record::FileStore;

/// Decoded file ready to hand to an archive writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    pub path: String,
    pub bytes: Vec<u8>,
    pub is_binary: bool,
}

impl FileStore {
    /// Returns every record with its raw bytes, decoding binary payloads.
    pub fn export_entries(&self) -> Result<Vec<ExportEntry>, ExportError> {
        self.iter()
            .map(|(path, record)| {
                let bytes = if record.is_binary() {
                    STANDARD.decode(record.content()).map_err(|source| {
                        ExportError::InvalidBase64 {
                            path: path.clone(),
                            source,
                        }
                    })?
                } else {
                    record.content().as_bytes().to_vec()
                };

                Ok(ExportEntry {
                    path: path.clone(),
                    bytes,
                    is_binary: record.is_binary(),
                })
            })
            .collect()
    }

    /// Writes the store as a directory tree under `root` and returns the
    /// number of files written. Nothing is written if any path is unsafe or
    /// any binary payload fails to decode.
    pub fn write_tree(&self, root: &Path) -> Result<usize, ExportError> {
        let entries = self.export_entries()?;
        let targets = entries
            .iter()
            .map(|entry| relative_target(&entry.path).map(|relative| root.join(relative)))
            .collect::<Result<Vec<_>, _>>()?;

        for (entry, target) in entries.iter().zip(&targets) {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .map_err(|source| ExportError::io("creating directory", parent, source))?;
            }
            fs::write(target, &entry.bytes)
                .map_err(|source| ExportError::io("writing file", target, source))?;
        }

        Ok(targets.len())
    }
}

fn relative_target(path: &str) -> Result<PathBuf, ExportError> {
    let mut relative = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExportError::UnsafePath {
                    path: path.to_string(),
                });
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(ExportError::UnsafePath {
            path: path.to_string(),
        });
    }

    Ok(relative)
}
