//! File names for mirrored images, derived from their URL.

use super::segment::{sanitize_segment, short_hash};

/// Sanitized last path segment of `url`, or `image_{hash}.png` when the URL
/// has no usable path segment. The URL is the discriminator for long names.
pub fn image_file_name(url: &str) -> String {
    let segment = url::Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segs| segs.rfind(|s| !s.is_empty()).map(str::to_string))
    });
    let decoded = segment.map(|s| {
        url::form_urlencoded::parse(s.as_bytes())
            .map(|(k, v)| if v.is_empty() { k.into_owned() } else { format!("{}={}", k, v) })
            .collect::<Vec<_>>()
            .join("&")
    });
    match decoded {
        Some(s) if s != "." && s != ".." => {
            let name = sanitize_segment(&s, url);
            if name == short_hash(url) {
                format!("image_{}.png", name)
            } else {
                name
            }
        }
        _ => format!("image_{}.png", short_hash(url)),
    }
}
