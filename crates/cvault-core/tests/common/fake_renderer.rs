//! In-memory renderer and auth provider.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use cvault_core::error::ArchiveError;
use cvault_core::render::{RenderError, RenderRequest, RenderedPage, Renderer, PNG_SIGNATURE};
use cvault_core::session::{AuthProvider, Cookie, SessionHandle};

pub const SESSION_COOKIE: &str = "pl_authn";

/// A valid-looking PNG for `url`.
pub fn png_for(url: &str) -> Vec<u8> {
    let mut png = PNG_SIGNATURE.to_vec();
    png.extend_from_slice(url.as_bytes());
    png
}

#[derive(Debug, Clone)]
pub struct RenderCall {
    pub url: String,
    pub html: bool,
    pub screenshot: bool,
    pub cookie: Option<String>,
}

/// URL → HTML map. Screenshots are synthesized per URL.
#[derive(Default)]
pub struct FakeRenderer {
    pages: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<RenderCall>>,
    /// Cookie values the "server" no longer accepts.
    revoked: Mutex<Vec<String>>,
    /// Revoke the presented cookie once this many renders have happened.
    expire_at: Mutex<Option<usize>>,
    /// URLs whose screenshot comes back empty this many times.
    blank_shots: Mutex<HashMap<String, u32>>,
    /// URLs that fail as if the page were gone.
    broken: Mutex<HashSet<String>>,
    /// URL whose render panics.
    panic_on: Mutex<Option<String>>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self, url: &str, html: impl Into<String>) {
        self.pages.lock().unwrap().insert(url.to_string(), html.into());
    }

    pub fn expire_session_at(&self, render_count: usize) {
        *self.expire_at.lock().unwrap() = Some(render_count);
    }

    pub fn blank_screenshot(&self, url: &str, times: u32) {
        self.blank_shots.lock().unwrap().insert(url.to_string(), times);
    }

    pub fn break_page(&self, url: &str) {
        self.broken.lock().unwrap().insert(url.to_string());
    }

    pub fn heal_page(&self, url: &str) {
        self.broken.lock().unwrap().remove(url);
    }

    pub fn panic_on(&self, url: &str) {
        *self.panic_on.lock().unwrap() = Some(url.to_string());
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Renders of URLs containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.url.contains(needle)).count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(
        &self,
        req: &RenderRequest,
        session: &SessionHandle,
    ) -> Result<RenderedPage, RenderError> {
        let cookie = session
            .cookies
            .iter()
            .find(|c| c.name == SESSION_COOKIE)
            .map(|c| c.value.clone());
        let made = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(RenderCall {
                url: req.url.clone(),
                html: req.html,
                screenshot: req.screenshot,
                cookie: cookie.clone(),
            });
            calls.len()
        };
        {
            let mut expire_at = self.expire_at.lock().unwrap();
            if expire_at.is_some_and(|n| made >= n) {
                *expire_at = None;
                if let Some(c) = &cookie {
                    self.revoked.lock().unwrap().push(c.clone());
                }
            }
        }
        let revoked = match &cookie {
            Some(c) => self.revoked.lock().unwrap().contains(c),
            None => true,
        };
        if revoked {
            return Err(RenderError::SessionExpired);
        }

        let boom = self.panic_on.lock().unwrap().as_deref() == Some(req.url.as_str());
        if boom {
            panic!("renderer crashed on {}", req.url);
        }
        let html = if self.broken.lock().unwrap().contains(&req.url) {
            None
        } else {
            self.pages.lock().unwrap().get(&req.url).cloned()
        };
        let Some(html) = html else {
            return Err(RenderError::Driver(format!("404 {}", req.url)));
        };
        let screenshot = if req.screenshot {
            let mut blanks = self.blank_shots.lock().unwrap();
            match blanks.get_mut(&req.url) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    Some(Vec::new())
                }
                _ => Some(png_for(&req.url)),
            }
        } else {
            None
        };
        Ok(RenderedPage {
            final_url: req.url.clone(),
            html: req.html.then_some(html),
            screenshot,
        })
    }
}

/// Issues `pl_authn=s1`, `s2`, ... Fails once `limit` sessions were handed out.
pub struct CountingAuth {
    calls: AtomicU32,
    limit: Option<u32>,
}

impl CountingAuth {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            limit: None,
        }
    }

    pub fn with_limit(limit: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            limit: Some(limit),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for CountingAuth {
    async fn obtain_session(&self) -> Result<SessionHandle, ArchiveError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.limit.is_some_and(|l| n > l) {
            return Err(ArchiveError::AuthUnavailable("login window closed".into()));
        }
        Ok(SessionHandle::new(
            vec![Cookie {
                name: SESSION_COOKIE.into(),
                value: format!("s{}", n),
                domain: None,
            }],
            Some("cvault-test".into()),
        ))
    }
}
