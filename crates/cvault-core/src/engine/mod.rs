//! ArchiveEngine: drives one archive run.
//!
//! Enumerator (single producer) → eligibility → ledger check → bounded pool of
//! fetch workers → ledger commit. The ledger is owned by the engine loop and
//! only ever written there, one node at a time, flushed after every commit.

mod progress;
mod summary;

pub use progress::ArchiveProgress;
pub use summary::{FailedNode, RunSummary};

use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use url::Url;

use crate::assets::{AbsoluteAssetRewriter, AssetRewriter};
use crate::config::ArchiveConfig;
use crate::control::RunControl;
use crate::eligibility::{TagCatalog, TagSelector};
use crate::enumerate::{Discovery, Enumerator};
use crate::error::ArchiveError;
use crate::fetcher::{ArtifactFetcher, FetchReport};
use crate::ledger::{NodeRecord, ProgressStore, RecordState};
use crate::model::{archive_dir_name, ledger_file_name, QuestionJob};
use crate::render::Renderer;
use crate::session::{AuthProvider, SessionGate};
use crate::storage;

/// Name of the debug copy of the course listing inside the archive root.
pub const LISTING_SNAPSHOT: &str = "_listing.html";

type WorkerOutcome = (QuestionJob, Result<FetchReport, ArchiveError>);

pub struct ArchiveEngine {
    config: Arc<ArchiveConfig>,
    renderer: Arc<dyn Renderer>,
    auth: Arc<dyn AuthProvider>,
    rewriter: Option<Arc<dyn AssetRewriter>>,
    control: RunControl,
    progress_tx: Option<mpsc::Sender<ArchiveProgress>>,
}

impl ArchiveEngine {
    pub fn new(config: ArchiveConfig, renderer: Arc<dyn Renderer>, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            config: Arc::new(config),
            renderer,
            auth,
            rewriter: None,
            control: RunControl::new(),
            progress_tx: None,
        }
    }

    /// Cancellation handle shared with the caller (Ctrl-C).
    pub fn with_control(mut self, control: RunControl) -> Self {
        self.control = control;
        self
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<ArchiveProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// Replaces the default origin-based asset rewriter.
    pub fn with_rewriter(mut self, rewriter: Arc<dyn AssetRewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    pub fn control(&self) -> &RunControl {
        &self.control
    }

    fn rewriter_for(&self, root_url: &Url) -> Result<Arc<dyn AssetRewriter>, ArchiveError> {
        if let Some(r) = &self.rewriter {
            return Ok(Arc::clone(r));
        }
        let origin = AbsoluteAssetRewriter::origin_of(root_url);
        let r = AbsoluteAssetRewriter::new(&origin, &self.config.asset_prefixes)
            .map_err(|e| ArchiveError::structural("asset_prefixes", e.to_string()))?;
        Ok(Arc::new(r))
    }

    fn report(&self, progress: &ArchiveProgress) {
        if let Some(tx) = &self.progress_tx {
            // Drop snapshots when the consumer lags behind.
            let _ = tx.try_send(progress.clone());
        }
    }

    /// Archives the course at `root_url` under `out_dir/{Course}_archive`.
    ///
    /// Node failures end up in the returned summary. `Err` means the run
    /// stopped early on a run-fatal condition; everything committed before
    /// that point is in the ledger.
    pub async fn run(
        &self,
        root_url: &str,
        out_dir: &Path,
        selector: &dyn TagSelector,
    ) -> Result<RunSummary, ArchiveError> {
        let root_url = Url::parse(root_url)
            .map_err(|e| ArchiveError::structural(format!("course url {}", root_url), e.to_string()))?;
        let gate = Arc::new(SessionGate::establish(Arc::clone(&self.auth), self.config.max_reauth).await?);
        let enumerator = Arc::new(Enumerator::new(
            Arc::clone(&self.config),
            Arc::clone(&self.renderer),
            Arc::clone(&gate),
        )?);
        let listing = enumerator.discover(&root_url).await?;

        let archive_root = out_dir.join(archive_dir_name(&listing.course));
        std::fs::create_dir_all(&archive_root).map_err(|e| ArchiveError::io(&archive_root, e))?;
        let snapshot = archive_root.join(LISTING_SNAPSHOT);
        if let Err(e) = storage::write_atomic(&snapshot, listing.listing_html.as_bytes()) {
            let err = ArchiveError::io(&snapshot, e);
            if err.is_run_fatal() {
                return Err(err);
            }
            tracing::warn!("listing snapshot not saved: {}", err);
        }

        let mut ledger = ProgressStore::open(
            &archive_root.join(ledger_file_name(&listing.course)),
            &listing.course,
            root_url.as_str(),
        )?;

        let catalog = TagCatalog::from_listing(&listing);
        let selection = selector.select(&catalog).await?;
        tracing::info!(
            course = %listing.course,
            types = ?selection.labels().collect::<Vec<_>>(),
            root = %archive_root.display(),
            "archive run starting"
        );

        let mut summary = RunSummary {
            course: listing.course.clone(),
            archive_root: archive_root.clone(),
            unreadable: listing.unreadable.iter().map(ToString::to_string).collect(),
            ..Default::default()
        };

        let fetcher = Arc::new(ArtifactFetcher::new(
            archive_root.clone(),
            Arc::clone(&self.config),
            Arc::clone(&self.renderer),
            self.rewriter_for(&root_url)?,
        ));
        let workers = self.config.workers.max(1);
        let (tx, rx) = mpsc::channel(workers * 2);
        let producer = Arc::clone(&enumerator).spawn_walk(
            Arc::new(listing),
            selection,
            self.control.clone(),
            tx,
        );

        let mut run = RunLoop {
            ledger: &mut ledger,
            root: &archive_root,
            full_hash: self.config.verify_checksums,
            summary: &mut summary,
            progress: ArchiveProgress::default(),
            fatal: None,
        };
        self.drive(&mut run, rx, workers, &fetcher, &gate).await;
        let fatal = run.fatal.take();
        producer.abort();

        let flushed = ledger.flush();
        if let Some(e) = fatal {
            tracing::error!("run stopped: {}", e);
            return Err(e);
        }
        flushed?;

        let counts = ledger.counts();
        tracing::info!(
            archived = summary.archived,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            filtered = summary.filtered.len(),
            ledger_done = counts.done,
            cancelled = summary.cancelled,
            "archive run finished"
        );
        Ok(summary)
    }

    /// Pulls discoveries, keeps up to `workers` fetches in flight and commits
    /// their outcomes until the producer is exhausted (or stopped) and every
    /// worker has finished.
    async fn drive(
        &self,
        run: &mut RunLoop<'_>,
        mut rx: mpsc::Receiver<Discovery>,
        workers: usize,
        fetcher: &Arc<ArtifactFetcher>,
        gate: &Arc<SessionGate>,
    ) {
        let mut pool: JoinSet<WorkerOutcome> = JoinSet::new();
        let mut producer_open = true;
        let mut cancel_seen = false;

        loop {
            if !producer_open && pool.is_empty() {
                break;
            }
            let can_take = producer_open && pool.len() < workers;
            tokio::select! {
                biased;
                _ = self.control.cancelled(), if !cancel_seen => {
                    cancel_seen = true;
                    run.summary.cancelled = true;
                    producer_open = false;
                    rx.close();
                    tracing::warn!(in_flight = pool.len(), "cancelled, finishing in-flight questions");
                }
                joined = pool.join_next(), if !pool.is_empty() => {
                    match joined {
                        Some(Ok((job, outcome))) => run.finish(job, outcome),
                        // Workers catch their fetch's panic; only an abort lands here.
                        Some(Err(e)) => tracing::error!("fetch worker lost: {}", e),
                        None => {}
                    }
                    run.progress.in_flight = pool.len();
                    self.report(&run.progress);
                    if run.fatal.is_some() && producer_open {
                        producer_open = false;
                        rx.close();
                    }
                }
                item = rx.recv(), if can_take => {
                    match item {
                        None => producer_open = false,
                        Some(item) => {
                            if let Some(job) = run.accept(item) {
                                let prior = run.ledger.begin(&job);
                                if let Err(e) = run.ledger.flush() {
                                    run.fatal = Some(e);
                                } else {
                                    run.progress.current = Some(job.key.to_string());
                                    spawn_worker(&mut pool, Arc::clone(fetcher), Arc::clone(gate), job, prior);
                                }
                            }
                            run.progress.in_flight = pool.len();
                            self.report(&run.progress);
                            if run.fatal.is_some() {
                                producer_open = false;
                                rx.close();
                            }
                        }
                    }
                }
                else => break,
            }
        }
    }
}

fn spawn_worker(
    pool: &mut JoinSet<WorkerOutcome>,
    fetcher: Arc<ArtifactFetcher>,
    gate: Arc<SessionGate>,
    job: QuestionJob,
    prior: NodeRecord,
) {
    pool.spawn(async move {
        // Inner task so a panic still hands the job back to the engine loop.
        let fetch_job = job.clone();
        let fetch = tokio::spawn(async move {
            fetch_with_session(&fetcher, &gate, &fetch_job, &prior).await
        });
        let outcome = match fetch.await {
            Ok(outcome) => outcome,
            Err(e) => Err(ArchiveError::Worker(e.to_string())),
        };
        (job, outcome)
    });
}

/// One question fetch under a session pass. On expiry the pass is released,
/// the gate refreshes (pausing every other worker) and the fetch restarts
/// against the prior record.
async fn fetch_with_session(
    fetcher: &ArtifactFetcher,
    gate: &SessionGate,
    job: &QuestionJob,
    prior: &NodeRecord,
) -> Result<FetchReport, ArchiveError> {
    loop {
        let pass = gate.enter().await;
        let seen = pass.generation();
        let res = fetcher.fetch(job, prior, pass.session()).await;
        drop(pass);
        match res {
            Err(ArchiveError::AuthExpired) => {
                tracing::info!(node = %job.key, generation = seen, "session expired during fetch");
                gate.refresh(seen).await?;
            }
            other => return other,
        }
    }
}

/// Mutable state of the engine loop.
struct RunLoop<'a> {
    ledger: &'a mut ProgressStore,
    root: &'a Path,
    full_hash: bool,
    summary: &'a mut RunSummary,
    progress: ArchiveProgress,
    fatal: Option<ArchiveError>,
}

impl RunLoop<'_> {
    /// Books a discovery; returns the job when it needs fetching.
    fn accept(&mut self, item: Discovery) -> Option<QuestionJob> {
        match item {
            Discovery::Question(job) => {
                self.progress.discovered += 1;
                if self.ledger.is_verified_done(&job.key, self.root, self.full_hash) {
                    tracing::debug!(node = %job.key, "already archived, skipping");
                    self.summary.skipped += 1;
                    self.progress.skipped += 1;
                    self.progress.current = Some(job.key.to_string());
                    return None;
                }
                Some(job)
            }
            Discovery::Filtered { week, assessment } => {
                tracing::info!(week, assessment = %assessment, "group assessment excluded");
                self.summary.filtered.push(assessment);
                None
            }
            Discovery::NotSelected { week, assessment } => {
                tracing::debug!(week, assessment = %assessment, "type not selected");
                self.summary.not_selected += 1;
                None
            }
            Discovery::Unreadable(e) => {
                self.summary.unreadable.push(e.to_string());
                None
            }
            Discovery::AssessmentFailed { week, assessment, reason } => {
                tracing::warn!(week, assessment = %assessment, "assessment not reached: {}", reason);
                self.summary.unreached.push(reason);
                None
            }
            Discovery::Fatal(e) => {
                self.fatal = Some(e);
                None
            }
        }
    }

    /// Commits one worker outcome and flushes the ledger.
    fn finish(&mut self, job: QuestionJob, outcome: Result<FetchReport, ArchiveError>) {
        let title = job.question.title.clone();
        match outcome {
            Ok(report) => {
                let kinds = report.failed_kinds();
                let state = self.ledger.commit(&job.key, report.artifacts);
                if state == RecordState::Done {
                    self.summary.archived += 1;
                    self.progress.archived += 1;
                } else {
                    let reason = self
                        .ledger
                        .node(&job.key)
                        .and_then(|n| n.last_error.clone())
                        .unwrap_or_else(|| "incomplete".to_string());
                    self.summary.failed.push(FailedNode {
                        key: job.key.clone(),
                        title,
                        kinds,
                        reason,
                    });
                    self.progress.failed += 1;
                }
            }
            Err(e) => {
                tracing::warn!(node = %job.key, "question failed: {}", e);
                self.ledger.fail(&job.key, &e.to_string());
                self.summary.failed.push(FailedNode {
                    key: job.key.clone(),
                    title,
                    kinds: Vec::new(),
                    reason: e.to_string(),
                });
                self.progress.failed += 1;
                if e.is_run_fatal() && self.fatal.is_none() {
                    self.fatal = Some(e);
                }
            }
        }
        if let Err(e) = self.ledger.flush() {
            if self.fatal.is_none() {
                self.fatal = Some(e);
            }
        }
    }
}
