//! Rendering collaborator: turns a URL into expanded DOM content and a
//! full-page screenshot.

mod driver;

pub use driver::{DriverAuthProvider, DriverRenderer};

use async_trait::async_trait;

use crate::config::ArchiveConfig;
use crate::error::ArchiveError;
use crate::retry::{run_with_retry_async, RetryPolicy};
use crate::session::SessionHandle;

/// PNG file signature.
pub const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub url: String,
    /// Return the document after answer panels are expanded.
    pub html: bool,
    /// Return a full-page (not viewport) PNG.
    pub screenshot: bool,
    /// Button labels to click before capturing (case-insensitive substring match).
    pub expand_labels: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RenderedPage {
    /// URL after redirects; a login URL means the session is gone.
    pub final_url: String,
    pub html: Option<String>,
    pub screenshot: Option<Vec<u8>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("session expired")]
    SessionExpired,
    #[error("page did not settle")]
    Timeout,
    #[error("driver: {0}")]
    Driver(String),
    #[error("transient: {0}")]
    Transient(String),
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        req: &RenderRequest,
        session: &SessionHandle,
    ) -> Result<RenderedPage, RenderError>;
}

/// Renders `req` with the configured bound and retry policy.
///
/// Maps collaborator failures onto [`ArchiveError`]; a final URL that looks
/// like a login page is reported as [`ArchiveError::AuthExpired`].
pub async fn render_page(
    renderer: &dyn Renderer,
    req: &RenderRequest,
    session: &SessionHandle,
    config: &ArchiveConfig,
    policy: &RetryPolicy,
) -> Result<RenderedPage, ArchiveError> {
    render_checked(renderer, req, session, config, policy, |_| Ok(())).await
}

/// Like [`render_page`], but a page rejected by `check` counts as a failed
/// attempt and is rendered again within the same retry budget.
pub async fn render_checked<F>(
    renderer: &dyn Renderer,
    req: &RenderRequest,
    session: &SessionHandle,
    config: &ArchiveConfig,
    policy: &RetryPolicy,
    check: F,
) -> Result<RenderedPage, ArchiveError>
where
    F: Fn(&RenderedPage) -> Result<(), ArchiveError> + Sync,
{
    let waited = config.render_timeout();
    let check = &check;
    run_with_retry_async(policy, ArchiveError::retry_kind, |attempt| async move {
        tracing::debug!(url = %req.url, attempt, "render");
        let page = match tokio::time::timeout(waited, renderer.render(req, session)).await {
            Err(_) | Ok(Err(RenderError::Timeout)) => {
                return Err(ArchiveError::RenderTimeout {
                    url: req.url.clone(),
                    waited,
                })
            }
            Ok(Err(RenderError::SessionExpired)) => return Err(ArchiveError::AuthExpired),
            Ok(Err(RenderError::Driver(m))) => return Err(ArchiveError::Render(m)),
            Ok(Err(RenderError::Transient(m))) => return Err(ArchiveError::NetworkTransient(m)),
            Ok(Ok(page)) => page,
        };
        if config.is_login_url(&page.final_url) {
            return Err(ArchiveError::AuthExpired);
        }
        check(&page)?;
        Ok(page)
    })
    .await
}

/// True when `html` looks like a complete document rather than an error fragment.
pub fn looks_like_document(html: &str) -> bool {
    let head: String = html.trim_start().chars().take(512).collect::<String>().to_ascii_lowercase();
    head.starts_with("<!doctype") || head.contains("<html")
}

/// True for a non-empty buffer carrying the PNG signature.
pub fn looks_like_png(data: &[u8]) -> bool {
    data.len() > PNG_SIGNATURE.len() && data.starts_with(PNG_SIGNATURE)
}
