//! Direct HTTP GET of embedded images (not through the renderer).
//!
//! Writes the response body sequentially to a `.part` file and renames it into
//! place only after a complete 2xx transfer.

use std::path::Path;
use std::str;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::retry::{run_with_retry, RetryPolicy, TransferError};
use crate::session::SessionHandle;
use crate::storage::{self, StorageWriter, StorageWriterBuilder};

/// Per-request settings derived from the config and the current session.
#[derive(Debug, Clone, Default)]
pub struct HttpOptions {
    pub timeout: Duration,
    pub cookie: Option<String>,
    pub user_agent: Option<String>,
    /// Effective URLs containing any of these mean the session was bounced to login.
    pub login_markers: Vec<String>,
}

impl HttpOptions {
    pub fn new(timeout: Duration, session: &SessionHandle, login_markers: &[String]) -> Self {
        Self {
            timeout,
            cookie: session.cookie_header(),
            user_agent: session.user_agent.clone(),
            login_markers: login_markers.to_vec(),
        }
    }

    fn is_login_url(&self, url: &str) -> bool {
        let lower = url.to_ascii_lowercase();
        self.login_markers
            .iter()
            .any(|m| !m.is_empty() && lower.contains(&m.to_ascii_lowercase()))
    }
}

/// Single GET of `url`, writing sequentially to `storage`.
/// Returns the number of bytes written.
pub fn get_to_storage(
    url: &str,
    opts: &HttpOptions,
    storage: &StorageWriter,
) -> Result<u64, TransferError> {
    let offset = Arc::new(AtomicU64::new(0));
    let offset_cb = Arc::clone(&offset);
    let write_failed = Arc::new(std::sync::Mutex::new(None::<std::io::Error>));
    let write_failed_cb = Arc::clone(&write_failed);
    let storage = storage.clone();

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(TransferError::Curl)?;
    easy.follow_location(true).map_err(TransferError::Curl)?;
    easy.max_redirections(10).map_err(TransferError::Curl)?;
    easy.connect_timeout(opts.timeout.min(Duration::from_secs(30)))
        .map_err(TransferError::Curl)?;
    easy.timeout(opts.timeout).map_err(TransferError::Curl)?;
    if let Some(ua) = &opts.user_agent {
        easy.useragent(ua).map_err(TransferError::Curl)?;
    }
    if let Some(cookie) = &opts.cookie {
        easy.cookie(cookie).map_err(TransferError::Curl)?;
    }

    let performed = {
        let mut transfer = easy.transfer();
        transfer
            .write_function(move |data| {
                let off = offset_cb.fetch_add(data.len() as u64, Ordering::Relaxed);
                match storage.write_at(off, data) {
                    Ok(()) => Ok(data.len()),
                    Err(e) => {
                        tracing::warn!("image write failed: {}", e);
                        if let Ok(mut slot) = write_failed_cb.lock() {
                            *slot = Some(e);
                        }
                        Ok(0) // abort transfer
                    }
                }
            })
            .map_err(TransferError::Curl)?;
        transfer.perform()
    };

    if let Some(e) = write_failed.lock().ok().and_then(|mut slot| slot.take()) {
        return Err(TransferError::Storage(e));
    }
    performed.map_err(TransferError::Curl)?;

    let code = easy.response_code().map_err(TransferError::Curl)?;
    if code == 401 {
        return Err(TransferError::Unauthorized);
    }
    if let Ok(Some(effective)) = easy.effective_url() {
        if effective != url && opts.is_login_url(effective) {
            return Err(TransferError::Unauthorized);
        }
    }
    if !(200..300).contains(&code) {
        return Err(TransferError::Http(code));
    }

    let written = offset.load(Ordering::Relaxed);
    if written == 0 {
        return Err(TransferError::Empty);
    }
    Ok(written)
}

/// GETs `url` into `final_path` with retries. Each attempt starts a fresh
/// `.part` file; a failed attempt leaves nothing behind and `final_path`
/// untouched. Blocking: call from `spawn_blocking`.
pub fn fetch_to_file(
    url: &str,
    final_path: &Path,
    opts: &HttpOptions,
    policy: &RetryPolicy,
) -> Result<u64, TransferError> {
    let temp = storage::temp_path(final_path);
    run_with_retry(policy, |attempt| {
        tracing::debug!(url, attempt, "GET image");
        let writer = StorageWriterBuilder::create(&temp)
            .map_err(TransferError::Storage)?
            .build();
        match get_to_storage(url, opts, &writer) {
            Ok(n) => {
                writer.sync().map_err(TransferError::Storage)?;
                writer.finalize(final_path).map_err(TransferError::Storage)?;
                Ok(n)
            }
            Err(e) => {
                writer.discard();
                Err(e)
            }
        }
    })
}
