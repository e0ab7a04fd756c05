//! Embedded image discovery and reference rewriting.

use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

use crate::sanitize::{image_file_name, short_hash};

/// Local directory (relative to the question directory) for mirrored images.
pub const IMAGES_DIR: &str = "images";

/// One image reference found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// `src` attribute value as it appears (entity-decoded).
    pub src: String,
    /// Absolute URL.
    pub url: String,
    /// File name under `images/`, unique within the question.
    pub file: String,
}

impl ImageRef {
    pub fn local_src(&self) -> String {
        format!("{}/{}", IMAGES_DIR, self.file)
    }
}

/// Image references worth mirroring: same host as the page and, when
/// `markers` is non-empty, a path containing one of them. Inline `data:`
/// images and references already pointing at `images/` are ignored.
pub fn scan_images(html: &str, page_url: &Url, markers: &[String]) -> Vec<ImageRef> {
    let Ok(img_sel) = Selector::parse("img[src]") else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);
    let mut seen_urls = HashSet::new();
    let mut used_files = HashSet::new();
    let mut out: Vec<ImageRef> = Vec::new();

    for img in doc.select(&img_sel) {
        let Some(src) = img.value().attr("src").map(str::trim) else {
            continue;
        };
        if src.is_empty()
            || src.starts_with("data:")
            || src.starts_with(&format!("{}/", IMAGES_DIR))
        {
            continue;
        }
        let Ok(abs) = page_url.join(src) else {
            continue;
        };
        if abs.host_str() != page_url.host_str() || abs.port_or_known_default() != page_url.port_or_known_default() {
            continue;
        }
        if !markers.is_empty() && !markers.iter().any(|m| abs.path().contains(m.as_str())) {
            continue;
        }
        let url = abs.to_string();
        if !seen_urls.insert(url.clone()) {
            // Same image referenced twice; one download, every reference rewritten.
            let already = out.iter().any(|o| o.url == url && o.src == src);
            let prev_file = out.iter().find(|o| o.url == url).map(|o| o.file.clone());
            if let (false, Some(file)) = (already, prev_file) {
                out.push(ImageRef {
                    src: src.to_string(),
                    url: url.clone(),
                    file,
                });
            }
            continue;
        }
        let mut file = image_file_name(&url);
        if !used_files.insert(file.clone()) {
            file = format!("{}_{}", short_hash(&url), file);
            used_files.insert(file.clone());
        }
        out.push(ImageRef {
            src: src.to_string(),
            url,
            file,
        });
    }
    out
}

/// Points every `src` of `refs` at its local copy. Handles both quote styles
/// and `&amp;`-escaped attribute values.
pub fn rewrite_refs<'a>(html: &str, refs: impl IntoIterator<Item = &'a ImageRef>) -> String {
    let mut out = html.to_string();
    for r in refs {
        let local = r.local_src();
        let mut variants = vec![r.src.clone()];
        let escaped = r.src.replace('&', "&amp;");
        if escaped != r.src {
            variants.push(escaped);
        }
        for v in variants {
            for q in ['"', '\''] {
                let from = format!("src={q}{v}{q}");
                let to = format!("src={q}{local}{q}");
                out = out.replace(&from, &to);
            }
        }
    }
    out
}
