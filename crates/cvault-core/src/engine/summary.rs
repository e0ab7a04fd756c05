//! End-of-run summary.

use std::fmt;
use std::path::PathBuf;

use crate::model::{ArtifactKind, NodeKey};

/// A question that ended the run `failed-partial` (or failed as a whole).
#[derive(Debug, Clone)]
pub struct FailedNode {
    pub key: NodeKey,
    pub title: String,
    /// Artifacts that exhausted their retries (empty when the node failed before fetching).
    pub kinds: Vec<ArtifactKind>,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub course: String,
    pub archive_root: PathBuf,
    /// Fetched this run and now `done`.
    pub archived: usize,
    /// Already `done` with matching fingerprints; no fetch.
    pub skipped: usize,
    /// Group assessments excluded, by title.
    pub filtered: Vec<String>,
    /// Eligible assessments whose type was not selected.
    pub not_selected: usize,
    pub failed: Vec<FailedNode>,
    /// Nodes that could not be parsed, with reasons.
    pub unreadable: Vec<String>,
    /// Selected assessments whose page could not be fetched, with reasons.
    pub unreached: Vec<String>,
    pub cancelled: bool,
}

impl RunSummary {
    /// Every discovered, eligible, selected question is `done` and every
    /// selected assessment was walked.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.unreached.is_empty() && !self.cancelled
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Archive: {}", self.archive_root.display())?;
        writeln!(f, "  archived:      {}", self.archived)?;
        writeln!(f, "  skipped:       {} (already archived)", self.skipped)?;
        writeln!(f, "  filtered:      {} (group assessments)", self.filtered.len())?;
        if self.not_selected > 0 {
            writeln!(f, "  not selected:  {}", self.not_selected)?;
        }
        writeln!(f, "  failed:        {}", self.failed.len())?;
        for node in &self.failed {
            let kinds = if node.kinds.is_empty() {
                "node".to_string()
            } else {
                node.kinds
                    .iter()
                    .map(|k| k.as_str())
                    .collect::<Vec<_>>()
                    .join(",")
            };
            writeln!(f, "    {} [{}] {}: {}", node.key, kinds, node.title, node.reason)?;
        }
        if !self.unreached.is_empty() {
            writeln!(f, "  not reached:   {} (assessment pages failed)", self.unreached.len())?;
            for reason in &self.unreached {
                writeln!(f, "    {}", reason)?;
            }
        }
        if !self.unreadable.is_empty() {
            writeln!(f, "  unreadable:    {}", self.unreadable.len())?;
            for reason in &self.unreadable {
                writeln!(f, "    {}", reason)?;
            }
        }
        if self.cancelled {
            writeln!(f, "  run was cancelled; re-run to continue")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_unless_failed_or_cancelled() {
        let mut s = RunSummary::default();
        assert!(s.is_complete());
        s.unreadable.push("w1 row 3: no badge".into());
        assert!(s.is_complete());
        s.cancelled = true;
        assert!(!s.is_complete());
    }

    #[test]
    fn unreached_assessment_is_incomplete() {
        let s = RunSummary {
            unreached: vec!["w2/a201: render failed: HTTP 404".into()],
            ..Default::default()
        };
        assert!(!s.is_complete());
        assert!(s.to_string().contains("not reached:   1"));
    }

    #[test]
    fn display_lists_failed_keys_and_kinds() {
        let s = RunSummary {
            failed: vec![FailedNode {
                key: NodeKey::new(1, "10", "5"),
                title: "Loops".into(),
                kinds: vec![ArtifactKind::Images],
                reason: "1 of 2 images failed: HTTP 500".into(),
            }],
            ..Default::default()
        };
        let text = s.to_string();
        assert!(text.contains("w1/a10/q5 [images] Loops"));
        assert!(!s.is_complete());
    }
}
