//! Records stored in the progress ledger.
//!
//! Every level keeps fields it does not know about in `extra` and writes them
//! back unchanged, so files written by newer versions survive a rewrite.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::fingerprint::Fingerprint;
use crate::model::{ArtifactKind, NodeKey};

/// Current ledger format version.
pub const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecordState {
    #[default]
    Pending,
    InProgress,
    Done,
    Failed,
    /// Written by a newer version. Kept verbatim and treated as not done.
    Other(String),
}

impl RecordState {
    pub fn as_str(&self) -> &str {
        match self {
            RecordState::Pending => "pending",
            RecordState::InProgress => "in-progress",
            RecordState::Done => "done",
            RecordState::Failed => "failed",
            RecordState::Other(s) => s,
        }
    }
}

impl From<String> for RecordState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => RecordState::Pending,
            "in-progress" => RecordState::InProgress,
            "done" => RecordState::Done,
            "failed" => RecordState::Failed,
            _ => RecordState::Other(s),
        }
    }
}

impl From<RecordState> for String {
    fn from(state: RecordState) -> Self {
        match state {
            RecordState::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

/// One mirrored image of a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Absolute source URL.
    pub url: String,
    /// File name under `images/`.
    pub file: String,
    #[serde(default)]
    pub state: RecordState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ImageRecord {
    pub fn new(url: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            file: file.into(),
            state: RecordState::Pending,
            fingerprint: None,
            error: None,
            extra: Map::new(),
        }
    }
}

/// One (question, artifact kind) pair.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArtifactRecord {
    #[serde(default)]
    pub state: RecordState,
    /// Path relative to the archive root.
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-image records (image-set only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ImageRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ArtifactRecord {
    pub fn done(path: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            state: RecordState::Done,
            path: path.into(),
            fingerprint: Some(fingerprint),
            ..Default::default()
        }
    }

    pub fn failed(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            state: RecordState::Failed,
            path: path.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == RecordState::Done
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawNodeRecord", into = "RawNodeRecord")]
pub struct NodeRecord {
    pub state: RecordState,
    /// Question directory relative to the archive root.
    pub path: String,
    pub title: String,
    /// Number of fetch attempts across runs.
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Unix seconds.
    pub updated_at: u64,
    pub artifacts: BTreeMap<ArtifactKind, ArtifactRecord>,
    /// Artifact kinds this version does not produce, written back as found.
    pub other_artifacts: Map<String, Value>,
    pub extra: Map<String, Value>,
}

/// On-disk shape of [`NodeRecord`]; artifacts are keyed by plain strings.
#[derive(Clone, Serialize, Deserialize)]
#[doc(hidden)]
pub struct RawNodeRecord {
    #[serde(default)]
    state: RecordState,
    #[serde(default)]
    path: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
    #[serde(default)]
    updated_at: u64,
    #[serde(default)]
    artifacts: Map<String, Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TryFrom<RawNodeRecord> for NodeRecord {
    type Error = serde_json::Error;

    fn try_from(raw: RawNodeRecord) -> Result<Self, Self::Error> {
        let mut artifacts = BTreeMap::new();
        let mut other_artifacts = Map::new();
        for (name, value) in raw.artifacts {
            match ArtifactKind::parse(&name) {
                Some(kind) => {
                    artifacts.insert(kind, serde_json::from_value(value)?);
                }
                None => {
                    other_artifacts.insert(name, value);
                }
            }
        }
        Ok(NodeRecord {
            state: raw.state,
            path: raw.path,
            title: raw.title,
            attempts: raw.attempts,
            last_error: raw.last_error,
            updated_at: raw.updated_at,
            artifacts,
            other_artifacts,
            extra: raw.extra,
        })
    }
}

impl From<NodeRecord> for RawNodeRecord {
    fn from(node: NodeRecord) -> Self {
        let mut artifacts = node.other_artifacts;
        for (kind, record) in node.artifacts {
            // An ArtifactRecord always serializes to a JSON object.
            if let Ok(value) = serde_json::to_value(record) {
                artifacts.insert(kind.as_str().to_string(), value);
            }
        }
        RawNodeRecord {
            state: node.state,
            path: node.path,
            title: node.title,
            attempts: node.attempts,
            last_error: node.last_error,
            updated_at: node.updated_at,
            artifacts,
            extra: node.extra,
        }
    }
}

impl NodeRecord {
    pub fn artifact(&self, kind: ArtifactKind) -> Option<&ArtifactRecord> {
        self.artifacts.get(&kind)
    }

    /// Kinds whose record is not `done`, in fixed order.
    pub fn outstanding(&self) -> Vec<ArtifactKind> {
        ArtifactKind::ALL
            .into_iter()
            .filter(|k| !self.artifact(*k).map(ArtifactRecord::is_done).unwrap_or(false))
            .collect()
    }
}

/// Whole ledger file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerFile {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub course: String,
    #[serde(default)]
    pub root_url: String,
    #[serde(default)]
    pub updated_at: u64,
    #[serde(default)]
    pub nodes: BTreeMap<NodeKey, NodeRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_version() -> u32 {
    LEDGER_VERSION
}

impl LedgerFile {
    pub fn new(course: &str, root_url: &str) -> Self {
        Self {
            version: LEDGER_VERSION,
            course: course.to_string(),
            root_url: root_url.to_string(),
            updated_at: 0,
            nodes: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

/// Node counts per state, for `status` and the end-of-run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub done: usize,
    pub failed: usize,
}

impl StateCounts {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.done + self.failed
    }
}
