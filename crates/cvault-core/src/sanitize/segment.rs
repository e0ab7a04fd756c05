//! Cross-platform path segment sanitization.

use sha2::{Digest, Sha256};

/// Longest segment produced by [`sanitize_segment`], in characters.
pub const MAX_SEGMENT_CHARS: usize = 80;
/// Byte ceiling so multi-byte titles stay well under NAME_MAX (255).
const MAX_SEGMENT_BYTES: usize = 240;
const HASH_LEN: usize = 8;
/// Prefix kept when truncating: `{prefix}_{hash}` is exactly MAX_SEGMENT_CHARS.
const PREFIX_CHARS: usize = MAX_SEGMENT_CHARS - HASH_LEN - 1;

const ILLEGAL: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

const RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// First 8 hex chars of SHA-256 over `s`.
pub fn short_hash(s: &str) -> String {
    let digest = Sha256::digest(s.as_bytes());
    let mut h = hex::encode(digest);
    h.truncate(HASH_LEN);
    h
}

/// Maps an arbitrary title to a directory/file name that is legal on Linux,
/// macOS and Windows.
///
/// - Drops `\ / : * ? " < > |` and control characters
/// - Turns whitespace into `_` and collapses consecutive underscores
/// - Trims leading/trailing dots, spaces and underscores
/// - Prefixes Windows device names (`CON`, `com1.txt`, ...) with `_`
/// - Over 80 chars (or 240 bytes): 71-char prefix + `_` + hash of `discriminator`
/// - Empty result: the hash of `discriminator` alone
pub fn sanitize_segment(title: &str, discriminator: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut prev_underscore = false;

    for c in title.chars() {
        if ILLEGAL.contains(&c) || c.is_control() && !c.is_whitespace() {
            continue;
        }
        let c = if c.is_whitespace() { '_' } else { c };
        if c == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == ' ' || c == '.' || c == '_');
    if trimmed.is_empty() {
        return short_hash(discriminator);
    }

    let mut name = if is_reserved(trimmed) {
        format!("_{}", trimmed)
    } else {
        trimmed.to_string()
    };

    if name.chars().count() > MAX_SEGMENT_CHARS || name.len() > MAX_SEGMENT_BYTES {
        let mut prefix = String::new();
        for c in name.chars().take(PREFIX_CHARS) {
            if prefix.len() + c.len_utf8() > MAX_SEGMENT_BYTES - HASH_LEN - 1 {
                break;
            }
            prefix.push(c);
        }
        let prefix = prefix.trim_end_matches(|c| c == ' ' || c == '.' || c == '_');
        name = format!("{}_{}", prefix, short_hash(discriminator));
    }
    name
}

fn is_reserved(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name);
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(stem))
}
