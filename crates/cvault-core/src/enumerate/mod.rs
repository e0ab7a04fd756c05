//! Enumerator: walks Week → Assessment → Category → Question.
//!
//! The listing is rendered and parsed once ([`Enumerator::discover`]); the
//! walk over the selected assessments runs as the single producer task of a
//! run ([`Enumerator::spawn_walk`]) and feeds question jobs, in document
//! order, into a bounded channel. Nodes that cannot be parsed are reported
//! and skipped; their siblings continue.

mod parse;

pub use parse::{parse_assessment, parse_listing, ListingSelectors, ParsedListing, DEFAULT_CATEGORY};

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use crate::config::ArchiveConfig;
use crate::control::RunControl;
use crate::eligibility::{decide, Decision, TagSelection};
use crate::error::ArchiveError;
use crate::model::{Assessment, CourseListing, NodeKey, Question, QuestionJob, Week};
use crate::render::{looks_like_document, render_page, RenderRequest, Renderer};
use crate::retry::RetryPolicy;
use crate::sanitize::{question_dir_name, sanitize_segment, week_dir_name};
use crate::session::SessionGate;

/// Items sent by the producer.
#[derive(Debug)]
pub enum Discovery {
    Question(QuestionJob),
    /// Group assessment; its subtree is never visited.
    Filtered { week: u32, assessment: String },
    /// Eligible assessment whose type was not selected.
    NotSelected { week: u32, assessment: String },
    /// A node whose markup could not be parsed; siblings continue.
    Unreadable(ArchiveError),
    /// Selected assessment whose page could not be fetched. None of its
    /// questions were reached; a later run tries the page again.
    AssessmentFailed {
        week: u32,
        assessment: String,
        reason: String,
    },
    /// Run-fatal condition hit by the producer (e.g. re-authentication failed).
    Fatal(ArchiveError),
}

pub struct Enumerator {
    config: Arc<ArchiveConfig>,
    renderer: Arc<dyn Renderer>,
    gate: Arc<SessionGate>,
    policy: RetryPolicy,
    selectors: ListingSelectors,
}

impl Enumerator {
    pub fn new(
        config: Arc<ArchiveConfig>,
        renderer: Arc<dyn Renderer>,
        gate: Arc<SessionGate>,
    ) -> Result<Self, ArchiveError> {
        Ok(Self {
            policy: RetryPolicy::from_config(&config.retry),
            config,
            renderer,
            gate,
            selectors: ListingSelectors::new()?,
        })
    }

    /// Renders an HTML page, re-authenticating through the gate on expiry.
    async fn render_html(&self, url: &str) -> Result<String, ArchiveError> {
        let req = RenderRequest {
            url: url.to_string(),
            html: true,
            screenshot: false,
            expand_labels: Vec::new(),
        };
        loop {
            let pass = self.gate.enter().await;
            let seen = pass.generation();
            let res = render_page(
                self.renderer.as_ref(),
                &req,
                pass.session(),
                &self.config,
                &self.policy,
            )
            .await;
            drop(pass);
            match res {
                Err(ArchiveError::AuthExpired) => self.gate.refresh(seen).await?,
                Err(e) => return Err(e),
                Ok(page) => {
                    return page
                        .html
                        .filter(|h| looks_like_document(h))
                        .ok_or_else(|| ArchiveError::Capture(format!("{} returned no document", url)))
                }
            }
        }
    }

    /// Renders and parses the course listing.
    pub async fn discover(&self, root_url: &Url) -> Result<CourseListing, ArchiveError> {
        let html = self.render_html(root_url.as_str()).await?;
        let parsed = parse_listing(&html, root_url, &self.config, &self.selectors);
        let total: usize = parsed.weeks.iter().map(|w| w.assessments.len()).sum();
        tracing::info!(
            course = %parsed.course,
            weeks = parsed.weeks.len(),
            assessments = total,
            unreadable = parsed.unreadable.len(),
            "listing parsed"
        );
        for e in &parsed.unreadable {
            tracing::warn!("listing: {}", e);
        }
        Ok(CourseListing {
            course: parsed.course,
            weeks: parsed.weeks,
            unreadable: parsed.unreadable,
            listing_html: html,
        })
    }

    /// Questions of one assessment with their parse errors.
    async fn questions_of(
        &self,
        week: &Week,
        assessment: &Assessment,
    ) -> Result<(Vec<Question>, Vec<ArchiveError>), ArchiveError> {
        let url = Url::parse(&assessment.url).map_err(|e| {
            ArchiveError::structural(format!("assessment {}", assessment.id), e.to_string())
        })?;
        let html = self.render_html(url.as_str()).await?;
        let node = format!("w{}/a{}", week.number, assessment.id);
        Ok(parse_assessment(&html, &url, &node, &self.selectors))
    }

    /// Starts the producer. It ends when every selected assessment has been
    /// walked, the run is cancelled, or the receiver is dropped.
    pub fn spawn_walk(
        self: Arc<Self>,
        listing: Arc<CourseListing>,
        selection: TagSelection,
        control: RunControl,
        tx: mpsc::Sender<Discovery>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.walk(&listing, &selection, &control, &tx).await;
            tracing::debug!("producer finished");
        })
    }

    async fn walk(
        &self,
        listing: &CourseListing,
        selection: &TagSelection,
        control: &RunControl,
        tx: &mpsc::Sender<Discovery>,
    ) {
        for week in &listing.weeks {
            for assessment in &week.assessments {
                if control.is_cancelled() {
                    return;
                }
                let item = match decide(assessment, selection) {
                    Decision::Filtered => Some(Discovery::Filtered {
                        week: week.number,
                        assessment: assessment.title.clone(),
                    }),
                    Decision::NotSelected => Some(Discovery::NotSelected {
                        week: week.number,
                        assessment: assessment.title.clone(),
                    }),
                    Decision::Archive => None,
                };
                if let Some(item) = item {
                    if tx.send(item).await.is_err() {
                        return;
                    }
                    continue;
                }

                let (questions, errors) = match self.questions_of(week, assessment).await {
                    Ok(found) => found,
                    Err(e) if e.is_run_fatal() => {
                        let _ = tx.send(Discovery::Fatal(e)).await;
                        return;
                    }
                    Err(e @ ArchiveError::StructuralParse { .. }) => {
                        tracing::warn!(assessment = %assessment.title, "cannot parse assessment: {}", e);
                        if tx.send(Discovery::Unreadable(e)).await.is_err() {
                            return;
                        }
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(assessment = %assessment.title, "cannot fetch assessment: {}", e);
                        let item = Discovery::AssessmentFailed {
                            week: week.number,
                            assessment: assessment.title.clone(),
                            reason: format!("w{}/a{}: {}", week.number, assessment.id, e),
                        };
                        if tx.send(item).await.is_err() {
                            return;
                        }
                        continue;
                    }
                };
                tracing::info!(
                    week = week.number,
                    assessment = %assessment.title,
                    questions = questions.len(),
                    "assessment walked"
                );
                for e in errors {
                    if tx.send(Discovery::Unreadable(e)).await.is_err() {
                        return;
                    }
                }
                for question in questions {
                    if control.is_cancelled() {
                        return;
                    }
                    let job = question_job(week, assessment, question);
                    if tx.send(Discovery::Question(job)).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Resolves a question's ledger key and directory relative to the archive root:
/// `Week_{n}/{TypeTag}_{n}/{Category}/{Title}_{hash}`.
pub fn question_job(week: &Week, assessment: &Assessment, question: Question) -> QuestionJob {
    let rel_dir: PathBuf = [
        week_dir_name(week.number),
        assessment.dir_name.clone(),
        sanitize_segment(&question.category, &question.category),
        question_dir_name(&question.title, &question.id),
    ]
    .iter()
    .collect();
    QuestionJob {
        key: NodeKey::new(week.number, &assessment.id, &question.id),
        week: week.number,
        assessment_title: assessment.title.clone(),
        question,
        rel_dir,
    }
}
