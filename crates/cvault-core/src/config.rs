use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per artifact (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 1.0,
            max_delay_secs: 8,
        }
    }
}

/// External rendering driver (see `render::driver`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Program and arguments; the program is resolved on PATH when not absolute.
    pub command: Vec<String>,
}

/// Global configuration loaded from `~/.config/cvault/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Questions fetched concurrently. Bounded to spare the source server.
    pub workers: usize,
    /// Retry policy for renders and image transfers.
    pub retry: RetryConfig,
    /// Bounded wait for a page to render and its answer panels to settle.
    pub render_timeout_secs: u64,
    /// Total timeout for a single image transfer.
    pub request_timeout_secs: u64,
    /// Highest week number considered part of the course.
    pub max_week: u32,
    /// Assessment type tags accepted without confirmation.
    pub known_tags: Vec<String>,
    /// Button labels the renderer clicks to reveal answers before capture.
    pub expand_labels: Vec<String>,
    /// Only images whose URL path contains one of these are mirrored (empty = all same-host images).
    pub image_path_markers: Vec<String>,
    /// A final URL containing any of these means the session was bounced to login.
    pub login_url_markers: Vec<String>,
    /// Root-relative asset prefixes rewritten to absolute URLs in stored HTML.
    pub asset_prefixes: Vec<String>,
    /// Apply the asset rewrite pass to stored HTML.
    pub absolutize_assets: bool,
    /// Re-hash files on resume instead of comparing lengths only.
    pub verify_checksums: bool,
    /// Re-authentication attempts allowed per run.
    pub max_reauth: u32,
    /// Reject node paths longer than this many bytes (None = leave it to the OS).
    pub max_path_len: Option<usize>,
    /// Optional external rendering driver.
    pub driver: Option<DriverConfig>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            retry: RetryConfig::default(),
            render_timeout_secs: 30,
            request_timeout_secs: 15,
            max_week: 14,
            known_tags: ["PRE", "HW", "PQ", "GA", "LAB", "QUIZ", "EXAM"]
                .into_iter()
                .map(String::from)
                .collect(),
            expand_labels: ["correct answer", "solution", "submission"]
                .into_iter()
                .map(String::from)
                .collect(),
            image_path_markers: ["clientFilesCourse", "clientFilesQuestion"]
                .into_iter()
                .map(String::from)
                .collect(),
            login_url_markers: ["login", "signin", "sign_in", "sign-in"]
                .into_iter()
                .map(String::from)
                .collect(),
            asset_prefixes: ["/assets/", "/pl/"].into_iter().map(String::from).collect(),
            absolutize_assets: true,
            verify_checksums: false,
            max_reauth: 3,
            max_path_len: None,
            driver: None,
        }
    }
}

impl ArchiveConfig {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// True when `url` looks like the identity provider's login page.
    pub fn is_login_url(&self, url: &str) -> bool {
        let lower = url.to_ascii_lowercase();
        self.login_url_markers
            .iter()
            .any(|m| !m.is_empty() && lower.contains(&m.to_ascii_lowercase()))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("cvault")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ArchiveConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = ArchiveConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: ArchiveConfig = toml::from_str(&data)?;
    Ok(cfg)
}
