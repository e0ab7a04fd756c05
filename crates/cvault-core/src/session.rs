//! Authenticated session shared by all workers.
//!
//! The session is read-only for workers. Expiry is escalated to the
//! [`SessionGate`], which pauses everyone, asks the [`AuthProvider`] for a new
//! session once, and lets the workers resume.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::error::ArchiveError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    pub cookies: Vec<Cookie>,
    pub user_agent: Option<String>,
    /// Bumped on every refresh; workers report the generation they saw expire.
    pub generation: u64,
}

impl SessionHandle {
    pub fn new(cookies: Vec<Cookie>, user_agent: Option<String>) -> Self {
        Self {
            cookies,
            user_agent,
            generation: 0,
        }
    }

    /// `Cookie:` header value, or None when there are no cookies.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// External login capability (a human completes SSO in a browser, a cookie file, ...).
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn obtain_session(&self) -> Result<SessionHandle, ArchiveError>;
}

struct GateState {
    session: Arc<SessionHandle>,
    refreshes: u32,
    failed: Option<String>,
}

/// Sole owner of the current session.
///
/// Fetches run while holding a [`SessionPass`] (the shared side of a
/// read/write lock). [`SessionGate::refresh`] takes the exclusive side, so it
/// waits for in-flight fetches to finish and blocks new ones until the new
/// session is installed.
pub struct SessionGate {
    auth: Arc<dyn AuthProvider>,
    state: RwLock<GateState>,
    max_reauth: u32,
}

/// Shared guard held for the duration of one fetch.
pub struct SessionPass<'a> {
    guard: RwLockReadGuard<'a, GateState>,
}

impl SessionPass<'_> {
    pub fn session(&self) -> &SessionHandle {
        &self.guard.session
    }

    pub fn generation(&self) -> u64 {
        self.guard.session.generation
    }
}

impl SessionGate {
    /// Obtains the initial session (generation 1).
    pub async fn establish(
        auth: Arc<dyn AuthProvider>,
        max_reauth: u32,
    ) -> Result<Self, ArchiveError> {
        let mut session = auth.obtain_session().await.map_err(|e| match e {
            ArchiveError::AuthUnavailable(m) => ArchiveError::AuthUnavailable(m),
            other => ArchiveError::AuthUnavailable(other.to_string()),
        })?;
        session.generation = 1;
        tracing::info!(cookies = session.cookies.len(), "session established");
        Ok(Self {
            auth,
            state: RwLock::new(GateState {
                session: Arc::new(session),
                refreshes: 0,
                failed: None,
            }),
            max_reauth,
        })
    }

    /// Waits until no refresh is in progress and returns a pass for one fetch.
    pub async fn enter(&self) -> SessionPass<'_> {
        SessionPass {
            guard: self.state.read().await,
        }
    }

    /// Snapshot of the current session.
    pub async fn current(&self) -> Arc<SessionHandle> {
        Arc::clone(&self.state.read().await.session)
    }

    /// Replaces the session that expired at generation `seen`.
    ///
    /// The caller must have dropped its [`SessionPass`]. When another worker
    /// already refreshed past `seen` this returns immediately.
    pub async fn refresh(&self, seen: u64) -> Result<(), ArchiveError> {
        let mut state = self.state.write().await;
        if let Some(reason) = &state.failed {
            return Err(ArchiveError::AuthUnavailable(reason.clone()));
        }
        if state.session.generation != seen {
            return Ok(());
        }
        if state.refreshes >= self.max_reauth {
            let reason = format!("session expired {} times", state.refreshes + 1);
            state.failed = Some(reason.clone());
            return Err(ArchiveError::AuthUnavailable(reason));
        }
        state.refreshes += 1;
        tracing::warn!(generation = seen, "session expired, pausing workers to re-authenticate");
        match self.auth.obtain_session().await {
            Ok(mut fresh) => {
                fresh.generation = seen + 1;
                state.session = Arc::new(fresh);
                tracing::info!(generation = seen + 1, "session refreshed, resuming");
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                state.failed = Some(reason.clone());
                Err(ArchiveError::AuthUnavailable(reason))
            }
        }
    }

    pub async fn refreshes(&self) -> u32 {
        self.state.read().await.refreshes
    }
}
