//! Rendering and login through an external driver program.
//!
//! The driver owns the browser. Each call spawns the configured command,
//! writes one JSON request to its stdin and reads one JSON response from its
//! stdout:
//!
//! ```text
//! -> {"op":"render","url":"…","html":true,"screenshot":true,"expand":["solution"],"cookies":[…]}
//! <- {"final_url":"…","html":"<html>…","screenshot_b64":"iVBORw0…"}
//! -> {"op":"login","url":"…"}
//! <- {"cookies":[{"name":"…","value":"…"}],"user_agent":"…"}
//! <- {"error":{"kind":"session_expired|timeout|transient|fatal","message":"…"}}
//! ```

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{RenderError, RenderRequest, RenderedPage, Renderer};
use crate::config::DriverConfig;
use crate::error::ArchiveError;
use crate::session::{AuthProvider, Cookie, SessionHandle};

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum DriverRequest<'a> {
    Render {
        url: &'a str,
        html: bool,
        screenshot: bool,
        expand: &'a [String],
        cookies: &'a [Cookie],
        #[serde(skip_serializing_if = "Option::is_none")]
        user_agent: Option<&'a str>,
    },
    Login {
        url: &'a str,
    },
}

#[derive(Debug, Deserialize)]
struct DriverFailure {
    kind: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct DriverResponse {
    #[serde(default)]
    final_url: Option<String>,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    screenshot_b64: Option<String>,
    #[serde(default)]
    cookies: Vec<Cookie>,
    #[serde(default)]
    user_agent: Option<String>,
    #[serde(default)]
    error: Option<DriverFailure>,
}

/// Resolved driver command.
#[derive(Debug, Clone)]
struct DriverCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl DriverCommand {
    fn from_config(cfg: &DriverConfig) -> Result<Self, ArchiveError> {
        let (program, args) = cfg
            .command
            .split_first()
            .ok_or_else(|| ArchiveError::Render("driver command is empty".into()))?;
        let program = which::which(program)
            .map_err(|e| ArchiveError::Render(format!("driver {}: {}", program, e)))?;
        Ok(Self {
            program,
            args: args.to_vec(),
        })
    }

    async fn call(&self, req: &DriverRequest<'_>) -> Result<DriverResponse, RenderError> {
        let body = serde_json::to_vec(req).map_err(|e| RenderError::Driver(e.to_string()))?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RenderError::Driver(format!("spawn {}: {}", self.program.display(), e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&body)
                .await
                .map_err(|e| RenderError::Transient(format!("driver stdin: {}", e)))?;
            // Closing stdin tells the driver the request is complete.
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| RenderError::Transient(format!("driver wait: {}", e)))?;
        if output.stdout.is_empty() {
            return Err(RenderError::Transient(format!(
                "driver exited with {} and no response",
                output.status
            )));
        }
        let resp: DriverResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| RenderError::Driver(format!("bad driver response: {}", e)))?;
        match resp.error {
            None => Ok(resp),
            Some(f) => Err(match f.kind.as_str() {
                "session_expired" => RenderError::SessionExpired,
                "timeout" => RenderError::Timeout,
                "transient" => RenderError::Transient(f.message),
                _ => RenderError::Driver(f.message),
            }),
        }
    }
}

/// [`Renderer`] backed by the driver program.
#[derive(Debug, Clone)]
pub struct DriverRenderer {
    cmd: DriverCommand,
}

impl DriverRenderer {
    pub fn new(cfg: &DriverConfig) -> Result<Self, ArchiveError> {
        Ok(Self {
            cmd: DriverCommand::from_config(cfg)?,
        })
    }
}

#[async_trait]
impl Renderer for DriverRenderer {
    async fn render(
        &self,
        req: &RenderRequest,
        session: &SessionHandle,
    ) -> Result<RenderedPage, RenderError> {
        let resp = self
            .cmd
            .call(&DriverRequest::Render {
                url: &req.url,
                html: req.html,
                screenshot: req.screenshot,
                expand: &req.expand_labels,
                cookies: &session.cookies,
                user_agent: session.user_agent.as_deref(),
            })
            .await?;
        let screenshot = match resp.screenshot_b64 {
            Some(b64) => Some(
                base64::engine::general_purpose::STANDARD
                    .decode(b64.trim())
                    .map_err(|e| RenderError::Driver(format!("screenshot base64: {}", e)))?,
            ),
            None => None,
        };
        Ok(RenderedPage {
            final_url: resp.final_url.unwrap_or_else(|| req.url.clone()),
            html: resp.html,
            screenshot,
        })
    }
}

/// [`AuthProvider`] that asks the driver to run the interactive login and
/// return the resulting cookies.
#[derive(Debug, Clone)]
pub struct DriverAuthProvider {
    cmd: DriverCommand,
    login_url: String,
}

impl DriverAuthProvider {
    pub fn new(cfg: &DriverConfig, login_url: impl Into<String>) -> Result<Self, ArchiveError> {
        Ok(Self {
            cmd: DriverCommand::from_config(cfg)?,
            login_url: login_url.into(),
        })
    }
}

#[async_trait]
impl AuthProvider for DriverAuthProvider {
    async fn obtain_session(&self) -> Result<SessionHandle, ArchiveError> {
        tracing::info!(url = %self.login_url, "waiting for interactive login in driver");
        let resp = self
            .cmd
            .call(&DriverRequest::Login {
                url: &self.login_url,
            })
            .await
            .map_err(|e| ArchiveError::AuthUnavailable(e.to_string()))?;
        if resp.cookies.is_empty() {
            return Err(ArchiveError::AuthUnavailable(
                "driver returned no session cookies".into(),
            ));
        }
        Ok(SessionHandle::new(resp.cookies, resp.user_agent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_request_wire_format() {
        let cookies = vec![Cookie {
            name: "s".into(),
            value: "1".into(),
            domain: None,
        }];
        let expand = vec!["solution".to_string()];
        let req = DriverRequest::Render {
            url: "https://example.com/q/1",
            html: true,
            screenshot: false,
            expand: &expand,
            cookies: &cookies,
            user_agent: None,
        };
        let v: serde_json::Value = serde_json::to_value(&req).unwrap();
        assert_eq!(v["op"], "render");
        assert_eq!(v["expand"][0], "solution");
        assert_eq!(v["cookies"][0]["name"], "s");
        assert!(v.get("user_agent").is_none());
    }

    #[test]
    fn error_response_parses() {
        let resp: DriverResponse =
            serde_json::from_str(r#"{"error":{"kind":"session_expired"}}"#).unwrap();
        assert_eq!(resp.error.unwrap().kind, "session_expired");
    }

    #[test]
    fn empty_command_is_rejected() {
        let cfg = DriverConfig { command: Vec::new() };
        assert!(DriverRenderer::new(&cfg).is_err());
    }

    #[test]
    fn missing_program_is_rejected() {
        let cfg = DriverConfig {
            command: vec!["nonexistent-cvault-driver-xyz".into()],
        };
        assert!(matches!(
            DriverRenderer::new(&cfg),
            Err(ArchiveError::Render(_))
        ));
    }
}
