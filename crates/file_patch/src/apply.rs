use tracing::{debug, warn};

use crate::change::{ChangeKind, ChangeOperation, PendingAsset};
use crate::record::{FileRecord, FileStore};

/// Why an operation was left out without being malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The sentinel was used but no asset was (still) available.
    MissingAsset,
    /// A delete targeted a path that does not exist.
    MissingPath,
}

/// Why an operation was refused as malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingContent,
    EmptyPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    Skipped(SkipReason),
    Rejected(RejectReason),
}

/// Outcome of one operation, in batch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeReport {
    pub index: usize,
    pub kind: ChangeKind,
    pub path: String,
    pub disposition: Disposition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub store: FileStore,
    pub asset_consumed: bool,
    pub reports: Vec<ChangeReport>,
}

impl PatchOutcome {
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.reports
            .iter()
            .filter(|report| report.disposition == Disposition::Applied)
            .count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &ChangeReport> {
        self.reports
            .iter()
            .filter(|report| matches!(report.disposition, Disposition::Skipped(_)))
    }

    pub fn rejected(&self) -> impl Iterator<Item = &ChangeReport> {
        self.reports
            .iter()
            .filter(|report| matches!(report.disposition, Disposition::Rejected(_)))
    }
}

/// Applies `changes` in order on top of `store` and returns the new store.
///
/// Each operation either applies fully or not at all; a skipped or rejected
/// operation never voids the rest of the batch. The pending asset is
/// substituted at most once.
#[must_use]
pub fn apply_changes(
    changes: &[ChangeOperation],
    store: &FileStore,
    pending_asset: Option<&PendingAsset>,
) -> PatchOutcome {
    let mut next = store.clone();
    let mut asset = pending_asset;
    let mut asset_consumed = false;
    let mut reports = Vec::with_capacity(changes.len());

    for (index, change) in changes.iter().enumerate() {
        let disposition = apply_one(change, &mut next, &mut asset, &mut asset_consumed);
        match disposition {
            Disposition::Applied => {
                debug!(index, path = %change.path, kind = ?change.kind, "applied file change");
            }
            Disposition::Skipped(reason) => {
                warn!(index, path = %change.path, ?reason, "skipped file change");
            }
            Disposition::Rejected(reason) => {
                warn!(index, path = %change.path, ?reason, "rejected file change");
            }
        }

        reports.push(ChangeReport {
            index,
            kind: change.kind,
            path: change.path.clone(),
            disposition,
        });
    }

    PatchOutcome {
        store: next,
        asset_consumed,
        reports,
    }
}

fn apply_one(
    change: &ChangeOperation,
    store: &mut FileStore,
    asset: &mut Option<&PendingAsset>,
    asset_consumed: &mut bool,
) -> Disposition {
    if change.path.trim().is_empty() {
        return Disposition::Rejected(RejectReason::EmptyPath);
    }

    match change.kind {
        ChangeKind::Create | ChangeKind::Update => {
            let Some(content) = change.content.as_deref() else {
                return Disposition::Rejected(RejectReason::MissingContent);
            };

            let record = if change.uses_uploaded_asset() {
                let Some(pending) = asset.take() else {
                    return Disposition::Skipped(SkipReason::MissingAsset);
                };
                *asset_consumed = true;
                pending.to_record()
            } else {
                FileRecord::text_for_path(&change.path, content)
            };

            store.set(change.path.clone(), record);
            Disposition::Applied
        }
        ChangeKind::Delete => match store.delete(&change.path) {
            Some(_) => Disposition::Applied,
            None => Disposition::Skipped(SkipReason::MissingPath),
        },
    }
}
