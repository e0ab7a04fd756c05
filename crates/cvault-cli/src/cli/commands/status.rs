//! `cvault status` – summarize the ledger of an existing archive.

use anyhow::{bail, Context, Result};
use cvault_core::ledger::{self, LedgerFile, ProgressStore, RecordState};
use std::path::{Path, PathBuf};

use crate::cli::{EXIT_COMPLETE, EXIT_INCOMPLETE};

const LEDGER_SUFFIX: &str = "_progress.json";

/// The `{Course}_progress.json` inside `archive_dir`.
fn find_ledger(archive_dir: &Path) -> Result<PathBuf> {
    let entries = std::fs::read_dir(archive_dir)
        .with_context(|| format!("cannot read {}", archive_dir.display()))?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().ends_with(LEDGER_SUFFIX) && entry.path().is_file() {
            return Ok(entry.path());
        }
    }
    bail!("no *{} in {}", LEDGER_SUFFIX, archive_dir.display())
}

pub fn run_status(archive_dir: &Path) -> Result<i32> {
    let path = find_ledger(archive_dir)?;
    let file = ProgressStore::load(&path)?;
    print!("{}", render_status(&file));
    let counts = ledger::counts(&file);
    if counts.failed == 0 && counts.in_progress == 0 && counts.pending == 0 {
        Ok(EXIT_COMPLETE)
    } else {
        Ok(EXIT_INCOMPLETE)
    }
}

fn render_status(file: &LedgerFile) -> String {
    let counts = ledger::counts(file);
    let mut out = format!(
        "{} ({})\n  questions: {}  done: {}  failed: {}  in-progress: {}  pending: {}\n",
        file.course,
        file.root_url,
        counts.total(),
        counts.done,
        counts.failed,
        counts.in_progress,
        counts.pending
    );
    for (key, node) in &file.nodes {
        if node.state == RecordState::Done {
            continue;
        }
        let kinds: Vec<&str> = node
            .artifacts
            .iter()
            .filter(|(_, a)| !a.is_done())
            .map(|(k, _)| k.as_str())
            .collect();
        out.push_str(&format!(
            "  {:<11} {} [{}] {}",
            node.state.as_str(),
            key,
            kinds.join(","),
            node.path
        ));
        if let Some(err) = &node.last_error {
            out.push_str(&format!(": {}", err));
        }
        out.push('\n');
    }
    out
}
