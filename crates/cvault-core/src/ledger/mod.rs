//! Durable progress ledger (`{course}_progress.json`).
//!
//! Single owner of run-wide progress state. Loaded once at the start of a run,
//! checkpointed after every node and flushed temp-then-rename so the file is
//! always a complete document. It is the source of truth for resume
//! decisions; files on disk only confirm what it says.

mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ArchiveError;
use crate::model::{ArtifactKind, NodeKey, QuestionJob};
use crate::storage;

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub struct ProgressStore {
    path: PathBuf,
    file: LedgerFile,
}

impl ProgressStore {
    /// Loads the ledger at `path`, or starts an empty one when the file does not exist.
    ///
    /// An unreadable or unparsable file is a run-fatal [`ArchiveError::Ledger`];
    /// the file is left as it is.
    pub fn open(path: &Path, course: &str, root_url: &str) -> Result<Self, ArchiveError> {
        let file = match std::fs::read(path) {
            Ok(bytes) => {
                let mut file: LedgerFile =
                    serde_json::from_slice(&bytes).map_err(|e| ArchiveError::Ledger {
                        path: path.to_path_buf(),
                        reason: format!("cannot parse: {}", e),
                    })?;
                if file.version > LEDGER_VERSION {
                    tracing::warn!(
                        version = file.version,
                        "ledger written by a newer version; unknown fields are kept"
                    );
                }
                if file.course.is_empty() {
                    file.course = course.to_string();
                }
                file.root_url = root_url.to_string();
                tracing::info!(nodes = file.nodes.len(), path = %path.display(), "ledger loaded");
                file
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LedgerFile::new(course, root_url),
            Err(e) => {
                return Err(ArchiveError::Ledger {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Read-only load for inspection (`status`). Missing file is an error.
    pub fn load(path: &Path) -> Result<LedgerFile, ArchiveError> {
        let bytes = std::fs::read(path).map_err(|e| ArchiveError::Ledger {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| ArchiveError::Ledger {
            path: path.to_path_buf(),
            reason: format!("cannot parse: {}", e),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self) -> &LedgerFile {
        &self.file
    }

    pub fn node(&self, key: &NodeKey) -> Option<&NodeRecord> {
        self.file.nodes.get(key)
    }

    /// True when the node is `done` and every artifact file still matches its
    /// fingerprint under `root`.
    pub fn is_verified_done(&self, key: &NodeKey, root: &Path, full_hash: bool) -> bool {
        let Some(node) = self.node(key) else {
            return false;
        };
        if node.state != RecordState::Done {
            return false;
        }
        ArtifactKind::ALL.into_iter().all(|kind| {
            node.artifact(kind)
                .map(|a| artifact_matches(kind, a, root, full_hash))
                .unwrap_or(false)
        })
    }

    /// Marks the node `in-progress` before its fetch starts. Artifact records
    /// from earlier runs are kept so done artifacts can be skipped.
    /// Returns the prior record for the fetcher.
    pub fn begin(&mut self, job: &QuestionJob) -> NodeRecord {
        let node = self.file.nodes.entry(job.key.clone()).or_default();
        let prior = node.clone();
        node.state = RecordState::InProgress;
        node.path = rel_string(&job.rel_dir);
        node.title = job.question.title.clone();
        node.attempts += 1;
        node.updated_at = now_secs();
        prior
    }

    /// Merges the fetch outcome. The node becomes `done` only when all three
    /// artifacts are done; otherwise `failed`.
    pub fn commit(
        &mut self,
        key: &NodeKey,
        artifacts: BTreeMap<ArtifactKind, ArtifactRecord>,
    ) -> RecordState {
        let node = self.file.nodes.entry(key.clone()).or_default();
        for (kind, record) in artifacts {
            match node.artifacts.get_mut(&kind) {
                // Keep unknown fields of the previous record.
                Some(existing) => {
                    let extra = std::mem::take(&mut existing.extra);
                    *existing = ArtifactRecord { extra, ..record };
                }
                None => {
                    node.artifacts.insert(kind, record);
                }
            }
        }
        let all_done = ArtifactKind::ALL
            .into_iter()
            .all(|k| node.artifact(k).map(ArtifactRecord::is_done).unwrap_or(false));
        if all_done {
            node.state = RecordState::Done;
            node.last_error = None;
        } else {
            node.state = RecordState::Failed;
            node.last_error = ArtifactKind::ALL.into_iter().find_map(|k| {
                node.artifact(k)
                    .filter(|a| !a.is_done())
                    .map(|a| format!("{}: {}", k, a.error.as_deref().unwrap_or("not fetched")))
            });
        }
        node.updated_at = now_secs();
        node.state.clone()
    }

    /// Marks the node failed as a whole (e.g. its directory could not be created).
    pub fn fail(&mut self, key: &NodeKey, error: &str) {
        let node = self.file.nodes.entry(key.clone()).or_default();
        node.state = RecordState::Failed;
        node.last_error = Some(error.to_string());
        node.updated_at = now_secs();
    }

    /// Serializes and atomically replaces the ledger file.
    pub fn flush(&mut self) -> Result<(), ArchiveError> {
        self.file.updated_at = now_secs();
        let data = serde_json::to_vec_pretty(&self.file).map_err(|e| ArchiveError::Ledger {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        storage::write_atomic(&self.path, &data).map_err(|e| {
            if storage::is_disk_full(&e) {
                ArchiveError::DiskFull {
                    path: self.path.clone(),
                }
            } else {
                ArchiveError::Ledger {
                    path: self.path.clone(),
                    reason: e.to_string(),
                }
            }
        })
    }

    pub fn counts(&self) -> StateCounts {
        counts(&self.file)
    }
}

pub fn counts(file: &LedgerFile) -> StateCounts {
    let mut c = StateCounts::default();
    for node in file.nodes.values() {
        match node.state {
            RecordState::Pending | RecordState::Other(_) => c.pending += 1,
            RecordState::InProgress => c.in_progress += 1,
            RecordState::Done => c.done += 1,
            RecordState::Failed => c.failed += 1,
        }
    }
    c
}

/// True when a `done` artifact's file (for image sets, every image file) is
/// still on disk with the recorded fingerprint. An image set with no images
/// matches trivially.
pub fn artifact_matches(kind: ArtifactKind, a: &ArtifactRecord, root: &Path, full_hash: bool) -> bool {
    if !a.is_done() {
        return false;
    }
    match kind {
        ArtifactKind::Images => {
            let dir = root.join(&a.path);
            a.items.iter().all(|img| {
                img.state == RecordState::Done
                    && img
                        .fingerprint
                        .as_ref()
                        .map(|fp| fp.matches_file(&dir.join(&img.file), full_hash))
                        .unwrap_or(false)
            })
        }
        ArtifactKind::Html | ArtifactKind::Screenshot => a
            .fingerprint
            .as_ref()
            .map(|fp| fp.matches_file(&root.join(&a.path), full_hash))
            .unwrap_or(false),
    }
}

/// Relative path with `/` separators, as stored in the ledger.
pub fn rel_string(p: &Path) -> String {
    p.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
