//! Progress snapshots for the CLI.

/// Snapshot of run progress, sent after every node event.
#[derive(Debug, Clone, Default)]
pub struct ArchiveProgress {
    /// Question jobs received from the producer so far.
    pub discovered: usize,
    pub archived: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Questions currently being fetched.
    pub in_flight: usize,
    /// Key of the node this snapshot was taken for.
    pub current: Option<String>,
}

impl ArchiveProgress {
    /// Nodes that reached a terminal state this run.
    pub fn finished(&self) -> usize {
        self.archived + self.skipped + self.failed
    }

    /// Fraction of discovered questions finished, in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.discovered == 0 {
            return 0.0;
        }
        (self.finished() as f64 / self.discovered as f64).min(1.0)
    }
}
