//! ArtifactFetcher: HTML snapshot, full-page screenshot and image set for one
//! question.
//!
//! Works per artifact against the node's prior ledger record. Artifacts that
//! are `done` and still match their fingerprint are skipped without touching
//! the network. Artifact-level failures are recorded and returned; only
//! session expiry and filesystem failures leave this module as errors.

mod images;

pub use images::{rewrite_refs, scan_images, ImageRef, IMAGES_DIR};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use crate::assets::AssetRewriter;
use crate::config::ArchiveConfig;
use crate::error::ArchiveError;
use crate::fingerprint::Fingerprint;
use crate::http::{self, HttpOptions};
use crate::ledger::{artifact_matches, rel_string, ArtifactRecord, ImageRecord, NodeRecord, RecordState};
use crate::model::{ArtifactKind, QuestionJob};
use crate::render::{
    looks_like_document, looks_like_png, render_checked, render_page, RenderRequest, RenderedPage, Renderer,
};
use crate::retry::{RetryPolicy, TransferError};
use crate::sanitize::short_hash;
use crate::session::SessionHandle;
use crate::storage;

/// Artifact records produced by one fetch, plus how much network work it took.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Only the artifacts this fetch worked on; skipped ones are absent.
    pub artifacts: BTreeMap<ArtifactKind, ArtifactRecord>,
    pub renders: u32,
    pub downloads: u32,
}

impl FetchReport {
    pub fn failed_kinds(&self) -> Vec<ArtifactKind> {
        self.artifacts
            .iter()
            .filter(|(_, a)| !a.is_done())
            .map(|(k, _)| *k)
            .collect()
    }
}

pub struct ArtifactFetcher {
    root: PathBuf,
    config: Arc<ArchiveConfig>,
    renderer: Arc<dyn Renderer>,
    rewriter: Arc<dyn AssetRewriter>,
    policy: RetryPolicy,
}

/// Where each artifact of a question lives.
struct Layout {
    dir: PathBuf,
    rel: PathBuf,
}

impl Layout {
    fn abs(&self, kind: ArtifactKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    fn rel(&self, kind: ArtifactKind) -> String {
        rel_string(&self.rel.join(kind.file_name()))
    }
}

fn write_file(path: &Path, data: &[u8]) -> Result<(), ArchiveError> {
    storage::write_atomic(path, data).map_err(|e| ArchiveError::io(path, e))
}

impl ArtifactFetcher {
    pub fn new(
        root: PathBuf,
        config: Arc<ArchiveConfig>,
        renderer: Arc<dyn Renderer>,
        rewriter: Arc<dyn AssetRewriter>,
    ) -> Self {
        Self {
            policy: RetryPolicy::from_config(&config.retry),
            root,
            config,
            renderer,
            rewriter,
        }
    }

    fn is_current(&self, prior: &NodeRecord, kind: ArtifactKind) -> bool {
        prior
            .artifact(kind)
            .map(|a| artifact_matches(kind, a, &self.root, self.config.verify_checksums))
            .unwrap_or(false)
    }

    /// Fetches whatever `prior` does not already show as done and intact.
    pub async fn fetch(
        &self,
        job: &QuestionJob,
        prior: &NodeRecord,
        session: &SessionHandle,
    ) -> Result<FetchReport, ArchiveError> {
        let layout = Layout {
            dir: self.root.join(&job.rel_dir),
            rel: job.rel_dir.clone(),
        };
        let need_html = !self.is_current(prior, ArtifactKind::Html);
        let need_shot = !self.is_current(prior, ArtifactKind::Screenshot);
        let need_images = !self.is_current(prior, ArtifactKind::Images);
        let mut report = FetchReport::default();
        if !(need_html || need_shot || need_images) {
            tracing::debug!(node = %job.key, "all artifacts current");
            return Ok(report);
        }

        if let Some(max) = self.config.max_path_len {
            let longest = layout.abs(ArtifactKind::Html);
            if longest.as_os_str().len() > max {
                return Err(ArchiveError::Filesystem {
                    path: longest,
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("path exceeds {} bytes", max),
                    ),
                });
            }
        }
        std::fs::create_dir_all(&layout.dir).map_err(|e| ArchiveError::io(&layout.dir, e))?;

        let page_url = Url::parse(&job.question.url)
            .map_err(|e| ArchiveError::structural(job.key.to_string(), e.to_string()))?;

        // Prior image records that still need work, usable without a fresh render.
        let retry_items: Vec<ImageRecord> = prior
            .artifact(ArtifactKind::Images)
            .map(|a| a.items.clone())
            .unwrap_or_default();
        let html_from_render = need_html || (need_images && retry_items.is_empty());

        let mut page = None;
        let mut render_error = None;
        if html_from_render || need_shot {
            let req = RenderRequest {
                url: job.question.url.clone(),
                html: html_from_render,
                screenshot: need_shot,
                expand_labels: self.config.expand_labels.clone(),
            };
            report.renders += 1;
            match render_page(self.renderer.as_ref(), &req, session, &self.config, &self.policy).await {
                Ok(p) => page = Some(p),
                Err(ArchiveError::AuthExpired) => return Err(ArchiveError::AuthExpired),
                Err(e) => {
                    tracing::warn!(node = %job.key, url = %job.question.url, "render failed: {}", e);
                    render_error = Some(e.to_string());
                }
            }
        }

        // HTML document from the fresh render, validated.
        let fresh_html = match (&page, html_from_render) {
            (Some(p), true) => match p.html.as_deref() {
                Some(h) if looks_like_document(h) => Some(h.to_string()),
                _ => {
                    render_error.get_or_insert_with(|| {
                        ArchiveError::Capture("rendered document is empty or not HTML".into()).to_string()
                    });
                    None
                }
            },
            _ => None,
        };

        if need_shot {
            let shot = self
                .screenshot(job, page.as_ref(), render_error.as_deref(), session, &mut report)
                .await?;
            let path = layout.abs(ArtifactKind::Screenshot);
            let record = match shot {
                Ok(bytes) => {
                    write_file(&path, &bytes)?;
                    ArtifactRecord::done(layout.rel(ArtifactKind::Screenshot), Fingerprint::of_bytes(&bytes))
                }
                Err(e) => {
                    tracing::warn!(node = %job.key, "screenshot failed: {}", e);
                    ArtifactRecord::failed(layout.rel(ArtifactKind::Screenshot), e)
                }
            };
            report.artifacts.insert(ArtifactKind::Screenshot, record);
        }

        if need_html || need_images {
            self.html_and_images(
                job,
                &layout,
                &page_url,
                fresh_html,
                render_error.as_deref(),
                need_html,
                need_images,
                prior,
                retry_items,
                session,
                &mut report,
            )
            .await?;
        }

        let failed = report.failed_kinds();
        if failed.is_empty() {
            tracing::info!(node = %job.key, renders = report.renders, downloads = report.downloads, "question archived");
        } else {
            tracing::warn!(node = %job.key, ?failed, "question partially archived");
        }
        Ok(report)
    }

    /// Screenshot bytes from the combined render, or from screenshot-only
    /// re-renders when that capture was missing or corrupt.
    /// Outer error: session expiry. Inner error: artifact failure.
    async fn screenshot(
        &self,
        job: &QuestionJob,
        page: Option<&RenderedPage>,
        render_error: Option<&str>,
        session: &SessionHandle,
        report: &mut FetchReport,
    ) -> Result<Result<Vec<u8>, String>, ArchiveError> {
        let Some(page) = page else {
            return Ok(Err(render_error.unwrap_or("page not rendered").to_string()));
        };
        if let Some(bytes) = page.screenshot.as_ref().filter(|b| looks_like_png(b)) {
            return Ok(Ok(bytes.clone()));
        }
        tracing::debug!(node = %job.key, "capture empty or corrupt, retrying screenshot only");
        let req = RenderRequest {
            url: job.question.url.clone(),
            html: false,
            screenshot: true,
            expand_labels: self.config.expand_labels.clone(),
        };
        report.renders += 1;
        let res = render_checked(self.renderer.as_ref(), &req, session, &self.config, &self.policy, |p| {
            match p.screenshot.as_deref() {
                Some(b) if looks_like_png(b) => Ok(()),
                Some(b) if b.is_empty() => Err(ArchiveError::Capture("zero-byte screenshot".into())),
                Some(_) => Err(ArchiveError::Capture("screenshot is not a PNG".into())),
                None => Err(ArchiveError::Capture("no screenshot returned".into())),
            }
        })
        .await
        .map(|p| p.screenshot.unwrap_or_default());
        match res {
            Ok(b) => Ok(Ok(b)),
            Err(ArchiveError::AuthExpired) => Err(ArchiveError::AuthExpired),
            Err(e) => Ok(Err(e.to_string())),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn html_and_images(
        &self,
        job: &QuestionJob,
        layout: &Layout,
        page_url: &Url,
        fresh_html: Option<String>,
        render_error: Option<&str>,
        need_html: bool,
        need_images: bool,
        prior: &NodeRecord,
        retry_items: Vec<ImageRecord>,
        session: &SessionHandle,
        report: &mut FetchReport,
    ) -> Result<(), ArchiveError> {
        let html_path = layout.abs(ArtifactKind::Html);
        let images_rel = layout.rel(ArtifactKind::Images);
        let images_dir = layout.abs(ArtifactKind::Images);
        let full_hash = self.config.verify_checksums;
        let markers = &self.config.image_path_markers;

        // Document the image references come from and that gets rewritten.
        let (mut doc, refs, mut items) = match fresh_html {
            Some(html) => {
                let refs = scan_images(&html, page_url, markers);
                let mut items = unique_items(&refs);
                // Keep what earlier runs already mirrored.
                for item in items.iter_mut() {
                    if let Some(p) = retry_items.iter().find(|p| p.url == item.url) {
                        *item = p.clone();
                    }
                }
                (Some(html), refs, items)
            }
            None if !need_html => {
                // HTML is current: retry recorded images and anything the stored
                // document still references remotely.
                let stored = std::fs::read_to_string(&html_path).ok();
                let mut items = retry_items;
                let mut refs: Vec<ImageRef> = items
                    .iter()
                    .map(|i| ImageRef {
                        src: i.url.clone(),
                        url: i.url.clone(),
                        file: i.file.clone(),
                    })
                    .collect();
                if let Some(h) = &stored {
                    for mut r in scan_images(h, page_url, markers) {
                        if let Some(i) = items.iter().find(|i| i.url == r.url) {
                            r.file = i.file.clone();
                        } else {
                            if items.iter().any(|i| i.file == r.file) {
                                r.file = format!("{}_{}", short_hash(&r.url), r.file);
                            }
                            items.push(ImageRecord::new(&r.url, &r.file));
                        }
                        refs.push(r);
                    }
                }
                (stored, refs, items)
            }
            None => {
                let err = render_error.unwrap_or("page not rendered").to_string();
                report
                    .artifacts
                    .insert(ArtifactKind::Html, ArtifactRecord::failed(layout.rel(ArtifactKind::Html), &err));
                if need_images {
                    report
                        .artifacts
                        .insert(ArtifactKind::Images, ArtifactRecord::failed(images_rel, err));
                }
                return Ok(());
            }
        };

        // Download every image that is not already done and intact.
        let mut newly_local = Vec::new();
        if need_images {
            if !items.is_empty() {
                std::fs::create_dir_all(&images_dir).map_err(|e| ArchiveError::io(&images_dir, e))?;
            }
            let opts = HttpOptions::new(self.config.request_timeout(), session, &self.config.login_url_markers);
            for item in items.iter_mut() {
                let path = images_dir.join(&item.file);
                let intact = item.state == RecordState::Done
                    && item
                        .fingerprint
                        .as_ref()
                        .map(|fp| fp.matches_file(&path, full_hash))
                        .unwrap_or(false);
                if intact {
                    continue;
                }
                report.downloads += 1;
                match self.download(&item.url, &path, &opts).await {
                    Ok(fp) => {
                        item.state = RecordState::Done;
                        item.fingerprint = Some(fp);
                        item.error = None;
                        newly_local.push(item.url.clone());
                    }
                    Err(TransferError::Unauthorized) => return Err(ArchiveError::AuthExpired),
                    Err(TransferError::Storage(e)) => return Err(ArchiveError::io(&path, e)),
                    Err(e) => {
                        tracing::warn!(node = %job.key, url = %item.url, "image failed: {}", e);
                        item.state = RecordState::Failed;
                        item.error = Some(e.to_string());
                    }
                }
            }
        } else if let Some(prev) = prior.artifact(ArtifactKind::Images) {
            // Images current, HTML re-rendered: point at the files we already have.
            items = prev.items.clone();
        }

        // Rewrite references to images that are available locally, using the
        // file name on record.
        let local: Vec<ImageRef> = refs
            .iter()
            .filter_map(|r| {
                items
                    .iter()
                    .find(|i| i.url == r.url && i.state == RecordState::Done)
                    .map(|i| ImageRef {
                        file: i.file.clone(),
                        ..r.clone()
                    })
            })
            .collect();
        let html_changed = need_html || !newly_local.is_empty();
        if let Some(html) = doc.take() {
            if html_changed {
                let html = rewrite_refs(&html, &local);
                let html = if self.config.absolutize_assets {
                    self.rewriter.rewrite(&html)
                } else {
                    html
                };
                write_file(&html_path, html.as_bytes())?;
                report.artifacts.insert(
                    ArtifactKind::Html,
                    ArtifactRecord::done(layout.rel(ArtifactKind::Html), Fingerprint::of_bytes(html.as_bytes())),
                );
            }
        }

        if need_images {
            let failed: Vec<&ImageRecord> = items.iter().filter(|i| i.state != RecordState::Done).collect();
            let combined = Fingerprint::combine(items.iter().filter_map(|i| i.fingerprint.as_ref()));
            let mut record = if failed.is_empty() {
                ArtifactRecord::done(images_rel, combined)
            } else {
                let first = failed[0].error.as_deref().unwrap_or("not fetched");
                ArtifactRecord {
                    state: RecordState::Failed,
                    path: images_rel,
                    fingerprint: None,
                    error: Some(format!("{} of {} images failed: {}", failed.len(), items.len(), first)),
                    ..Default::default()
                }
            };
            record.items = items;
            report.artifacts.insert(ArtifactKind::Images, record);
        }
        Ok(())
    }

    /// One image through curl on the blocking pool, with retries.
    async fn download(&self, url: &str, path: &Path, opts: &HttpOptions) -> Result<Fingerprint, TransferError> {
        let (url_owned, path_owned, opts, policy) = (url.to_string(), path.to_path_buf(), opts.clone(), self.policy);
        let res = tokio::task::spawn_blocking(move || {
            http::fetch_to_file(&url_owned, &path_owned, &opts, &policy)?;
            Fingerprint::of_path(&path_owned).map_err(TransferError::Storage)
        })
        .await;
        match res {
            Ok(r) => r,
            Err(join) => Err(TransferError::Storage(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("image task failed: {}", join),
            ))),
        }
    }
}

/// One pending record per distinct image URL.
fn unique_items(refs: &[ImageRef]) -> Vec<ImageRecord> {
    let mut items: Vec<ImageRecord> = Vec::new();
    for r in refs {
        if !items.iter().any(|i| i.url == r.url) {
            items.push(ImageRecord::new(&r.url, &r.file));
        }
    }
    items
}
