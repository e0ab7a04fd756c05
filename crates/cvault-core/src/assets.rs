//! Asset path rewriting for stored HTML.
//!
//! Root-relative stylesheet/script URLs (`/assets/…`, `/pl/…`) break when the
//! snapshot is opened from disk; they are pointed back at the course origin.

use regex::Regex;

pub trait AssetRewriter: Send + Sync {
    /// Rewrites `html` for offline viewing. Returns the input unchanged when
    /// nothing matches.
    fn rewrite(&self, html: &str) -> String;
}

/// Turns `src="/prefix…"` and `href="/prefix…"` into absolute URLs on `origin`.
#[derive(Debug, Clone)]
pub struct AbsoluteAssetRewriter {
    pattern: Option<Regex>,
    origin: String,
}

impl AbsoluteAssetRewriter {
    /// `origin` is scheme + host (+ port), e.g. `https://us.example.com`.
    pub fn new(origin: &str, prefixes: &[String]) -> Result<Self, regex::Error> {
        let alternatives: Vec<String> = prefixes
            .iter()
            .filter(|p| p.starts_with('/'))
            .map(|p| regex::escape(p))
            .collect();
        let pattern = if alternatives.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(
                r#"(src|href)="((?:{})[^"]*)""#,
                alternatives.join("|")
            ))?)
        };
        Ok(Self {
            pattern,
            origin: origin.trim_end_matches('/').to_string(),
        })
    }

    /// Origin of `page_url` (`scheme://host[:port]`).
    pub fn origin_of(page_url: &url::Url) -> String {
        page_url.origin().ascii_serialization()
    }
}

impl AssetRewriter for AbsoluteAssetRewriter {
    fn rewrite(&self, html: &str) -> String {
        match &self.pattern {
            Some(re) => re
                .replace_all(html, |caps: &regex::Captures<'_>| {
                    format!("{}=\"{}{}\"", &caps[1], self.origin, &caps[2])
                })
                .into_owned(),
            None => html.to_string(),
        }
    }
}
