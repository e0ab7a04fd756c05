//! Session cookies from a file.
//!
//! Accepted formats:
//! - JSON: `[{"name": "...", "value": "..."}]` or
//!   `{"cookies": [...], "user_agent": "..."}`
//! - a `Cookie:` header value: `name=value; other=value`
//!
//! The file is re-read on every request for a session, so an expired session
//! can be fixed by exporting fresh cookies while the run waits.

use async_trait::async_trait;
use cvault_core::error::ArchiveError;
use cvault_core::session::{AuthProvider, Cookie, SessionHandle};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CookieFile {
    List(Vec<Cookie>),
    Session {
        cookies: Vec<Cookie>,
        #[serde(default)]
        user_agent: Option<String>,
    },
}

pub struct CookieFileAuth {
    path: PathBuf,
}

impl CookieFileAuth {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

fn parse_header(text: &str) -> Vec<Cookie> {
    text.trim()
        .trim_start_matches("Cookie:")
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(Cookie {
                name: name.to_string(),
                value: value.trim().to_string(),
                domain: None,
            })
        })
        .collect()
}

pub fn parse_cookie_file(text: &str) -> Result<SessionHandle, String> {
    let trimmed = text.trim_start();
    let (cookies, user_agent) = if trimmed.starts_with('[') || trimmed.starts_with('{') {
        match serde_json::from_str::<CookieFile>(trimmed).map_err(|e| e.to_string())? {
            CookieFile::List(cookies) => (cookies, None),
            CookieFile::Session { cookies, user_agent } => (cookies, user_agent),
        }
    } else {
        (parse_header(text), None)
    };
    if cookies.is_empty() {
        return Err("no cookies found".into());
    }
    Ok(SessionHandle::new(cookies, user_agent))
}

#[async_trait]
impl AuthProvider for CookieFileAuth {
    async fn obtain_session(&self) -> Result<SessionHandle, ArchiveError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ArchiveError::AuthUnavailable(format!("{}: {}", self.path.display(), e)))?;
        let session = parse_cookie_file(&text)
            .map_err(|e| ArchiveError::AuthUnavailable(format!("{}: {}", self.path.display(), e)))?;
        tracing::info!(path = %self.path.display(), cookies = session.cookies.len(), "session cookies loaded");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_format() {
        let s = parse_cookie_file("Cookie: pl_authn=abc; pl_csrf = x=y ;").unwrap();
        assert_eq!(s.cookies.len(), 2);
        assert_eq!(s.cookies[1].name, "pl_csrf");
        assert_eq!(s.cookies[1].value, "x=y");
        assert_eq!(s.cookie_header().as_deref(), Some("pl_authn=abc; pl_csrf=x=y"));
    }

    #[test]
    fn json_formats() {
        let list = parse_cookie_file(r#"[{"name":"a","value":"1","domain":".example.com"}]"#).unwrap();
        assert_eq!(list.cookies[0].domain.as_deref(), Some(".example.com"));
        let session = parse_cookie_file(r#"{"cookies":[{"name":"a","value":"1"}],"user_agent":"UA"}"#).unwrap();
        assert_eq!(session.user_agent.as_deref(), Some("UA"));
    }

    #[test]
    fn empty_file_is_rejected() {
        assert!(parse_cookie_file("  \n").is_err());
        assert!(parse_cookie_file("[]").is_err());
    }

    #[tokio::test]
    async fn unreadable_file_is_auth_unavailable() {
        let auth = CookieFileAuth::new(PathBuf::from("/nonexistent/cvault/cookies.txt"));
        let err = auth.obtain_session().await.unwrap_err();
        assert!(err.is_run_fatal());
    }
}
