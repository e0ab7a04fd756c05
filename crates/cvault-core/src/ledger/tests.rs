//! Tests for the progress ledger.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::*;
use crate::fingerprint::Fingerprint;
use crate::model::{Question, QuestionJob};

fn job(qid: &str) -> QuestionJob {
    QuestionJob {
        key: NodeKey::new(1, "10", qid),
        week: 1,
        assessment_title: "Homework 1".into(),
        question: Question {
            id: qid.into(),
            title: format!("Question {}", qid),
            url: format!("https://example.com/pl/instance_question/{}", qid),
            category: "General".into(),
        },
        rel_dir: PathBuf::from("Week_1/HW_1/General").join(format!("Q{}", qid)),
    }
}

/// Writes the three artifacts of `job` under `root` and returns their records.
fn write_artifacts(root: &Path, job: &QuestionJob) -> BTreeMap<ArtifactKind, ArtifactRecord> {
    let dir = root.join(&job.rel_dir);
    std::fs::create_dir_all(dir.join("images")).unwrap();
    std::fs::write(dir.join("index.html"), b"<html></html>").unwrap();
    std::fs::write(dir.join("render.png"), b"\x89PNG\r\n\x1a\nxxxx").unwrap();
    std::fs::write(dir.join("images/fig.png"), b"img").unwrap();
    let rel = rel_string(&job.rel_dir);
    let mut img = ImageRecord::new("https://example.com/fig.png", "fig.png");
    img.state = RecordState::Done;
    img.fingerprint = Some(Fingerprint::of_bytes(b"img"));
    let mut images = ArtifactRecord::done(format!("{}/images", rel), Fingerprint::of_bytes(b""));
    images.items = vec![img];
    let mut out = BTreeMap::new();
    out.insert(
        ArtifactKind::Html,
        ArtifactRecord::done(format!("{}/index.html", rel), Fingerprint::of_bytes(b"<html></html>")),
    );
    out.insert(
        ArtifactKind::Screenshot,
        ArtifactRecord::done(
            format!("{}/render.png", rel),
            Fingerprint::of_bytes(b"\x89PNG\r\n\x1a\nxxxx"),
        ),
    );
    out.insert(ArtifactKind::Images, images);
    out
}

#[test]
fn missing_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProgressStore::open(&dir.path().join("c_progress.json"), "c", "https://x").unwrap();
    assert!(store.file().nodes.is_empty());
    assert_eq!(store.file().version, LEDGER_VERSION);
}

#[test]
fn begin_commit_flush_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("c_progress.json");
    let j = job("1");
    {
        let mut store = ProgressStore::open(&path, "c", "https://x").unwrap();
        let prior = store.begin(&j);
        assert_eq!(prior.attempts, 0);
        store.flush().unwrap();
        assert_eq!(
            ProgressStore::load(&path).unwrap().nodes[&j.key].state,
            RecordState::InProgress
        );
        let state = store.commit(&j.key, write_artifacts(dir.path(), &j));
        assert_eq!(state, RecordState::Done);
        store.flush().unwrap();
    }
    let store = ProgressStore::open(&path, "c", "https://x").unwrap();
    let node = store.node(&j.key).unwrap();
    assert_eq!(node.state, RecordState::Done);
    assert_eq!(node.attempts, 1);
    assert_eq!(node.path, "Week_1/HW_1/General/Q1");
    assert!(store.is_verified_done(&j.key, dir.path(), true));
    assert!(!storage::temp_path(&path).exists());
}

#[test]
fn in_progress_node_is_not_done() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("c_progress.json");
    let j = job("1");
    let mut store = ProgressStore::open(&path, "c", "https://x").unwrap();
    store.begin(&j);
    // Crash before commit: artifacts are on disk but the ledger says in-progress.
    write_artifacts(dir.path(), &j);
    store.flush().unwrap();
    let store = ProgressStore::open(&path, "c", "https://x").unwrap();
    assert!(!store.is_verified_done(&j.key, dir.path(), false));
    assert_eq!(store.counts().in_progress, 1);
}

#[test]
fn partial_commit_is_failed_and_keeps_done_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let j = job("2");
    let mut store = ProgressStore::open(&dir.path().join("p.json"), "c", "https://x").unwrap();
    store.begin(&j);
    let mut arts = write_artifacts(dir.path(), &j);
    arts.insert(
        ArtifactKind::Screenshot,
        ArtifactRecord::failed("Week_1/HW_1/General/Q2/render.png", "capture failed: empty"),
    );
    assert_eq!(store.commit(&j.key, arts), RecordState::Failed);
    let node = store.node(&j.key).unwrap();
    assert!(node.last_error.as_deref().unwrap().starts_with("screenshot"));
    assert_eq!(node.outstanding(), vec![ArtifactKind::Screenshot]);

    // Next run: begin keeps the done artifacts, only the screenshot is retried.
    let prior = store.begin(&j);
    assert!(prior.artifact(ArtifactKind::Html).unwrap().is_done());
    let mut retry = BTreeMap::new();
    retry.insert(
        ArtifactKind::Screenshot,
        ArtifactRecord::done(
            "Week_1/HW_1/General/Q2/render.png",
            Fingerprint::of_bytes(b"\x89PNG\r\n\x1a\nxxxx"),
        ),
    );
    assert_eq!(store.commit(&j.key, retry), RecordState::Done);
    assert_eq!(store.node(&j.key).unwrap().attempts, 2);
}

#[test]
fn vanished_file_breaks_verification() {
    let dir = tempfile::tempdir().unwrap();
    let j = job("3");
    let mut store = ProgressStore::open(&dir.path().join("p.json"), "c", "https://x").unwrap();
    store.begin(&j);
    store.commit(&j.key, write_artifacts(dir.path(), &j));
    assert!(store.is_verified_done(&j.key, dir.path(), false));
    std::fs::remove_file(dir.path().join(&j.rel_dir).join("images/fig.png")).unwrap();
    assert!(!store.is_verified_done(&j.key, dir.path(), false));
}

#[test]
fn unknown_fields_survive_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("p.json");
    let raw = r#"{
        "version": 2,
        "course": "c",
        "root_url": "https://x",
        "viewer_hint": {"theme": "dark"},
        "nodes": {
            "w1/a10/q9": {
                "state": "done",
                "path": "Week_1/HW_1/General/Q9",
                "title": "Old",
                "reviewed": true,
                "artifacts": {
                    "html": {"state": "done", "path": "Week_1/HW_1/General/Q9/index.html", "note": "kept"}
                }
            }
        }
    }"#;
    std::fs::write(&path, raw).unwrap();
    let j = job("1");
    let mut store = ProgressStore::open(&path, "c", "https://x").unwrap();
    store.begin(&j);
    store.flush().unwrap();

    let v: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(v["version"], 2);
    assert_eq!(v["viewer_hint"]["theme"], "dark");
    assert_eq!(v["nodes"]["w1/a10/q9"]["reviewed"], true);
    assert_eq!(v["nodes"]["w1/a10/q9"]["artifacts"]["html"]["note"], "kept");
    assert_eq!(v["nodes"]["w1/a10/q1"]["state"], "in-progress");
}

#[test]
fn corrupt_file_is_fatal_and_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("p.json");
    std::fs::write(&path, b"{\"nodes\": {").unwrap();
    let err = ProgressStore::open(&path, "c", "https://x").err().unwrap();
    assert!(matches!(err, ArchiveError::Ledger { .. }));
    assert!(err.is_run_fatal());
    assert_eq!(std::fs::read(&path).unwrap(), b"{\"nodes\": {");
}

#[test]
fn fail_marks_node() {
    let dir = tempfile::tempdir().unwrap();
    let j = job("4");
    let mut store = ProgressStore::open(&dir.path().join("p.json"), "c", "https://x").unwrap();
    store.begin(&j);
    store.fail(&j.key, "filesystem error");
    let c = store.counts();
    assert_eq!(c.failed, 1);
    assert_eq!(c.total(), 1);
}

#[test]
fn newer_states_and_artifact_kinds_are_kept() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("p.json");
    let raw = r#"{
        "nodes": {
            "w1/a10/q9": {
                "state": "archived-remotely",
                "artifacts": {
                    "html": {"state": "verifying", "path": "Week_1/HW_1/General/Q9/index.html"},
                    "transcript": {"state": "done", "path": "Week_1/HW_1/General/Q9/t.txt"}
                }
            }
        }
    }"#;
    std::fs::write(&path, raw).unwrap();
    let key = NodeKey::new(1, "10", "9");
    let mut store = ProgressStore::open(&path, "c", "https://x").unwrap();
    let node = store.node(&key).unwrap();
    assert_eq!(node.state, RecordState::Other("archived-remotely".into()));
    assert!(!node.artifacts[&ArtifactKind::Html].is_done());
    assert!(!store.is_verified_done(&key, dir.path(), false));
    assert_eq!(store.counts().pending, 1);

    store.flush().unwrap();
    let v: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    let node = &v["nodes"]["w1/a10/q9"];
    assert_eq!(node["state"], "archived-remotely");
    assert_eq!(node["artifacts"]["html"]["state"], "verifying");
    assert_eq!(node["artifacts"]["transcript"]["path"], "Week_1/HW_1/General/Q9/t.txt");
}
