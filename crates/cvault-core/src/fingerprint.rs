//! Content fingerprints used to decide "already downloaded, unchanged".
//!
//! A fingerprint is the byte length plus the SHA-256 of the content. Resume
//! checks compare the length (a stat call); full re-hashing is opt-in through
//! `verify_checksums`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub len: u64,
    pub sha256: String,
}

impl Fingerprint {
    pub fn of_bytes(data: &[u8]) -> Self {
        Self {
            len: data.len() as u64,
            sha256: hex::encode(Sha256::digest(data)),
        }
    }

    /// Fingerprint of a file on disk. Reads in chunks to keep memory bounded.
    pub fn of_path(path: &Path) -> io::Result<Self> {
        let mut f = File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; BUF_SIZE];
        let mut len = 0u64;
        loop {
            let n = f.read(&mut buf)?;
            if n == 0 {
                break;
            }
            len += n as u64;
            hasher.update(&buf[..n]);
        }
        Ok(Self {
            len,
            sha256: hex::encode(hasher.finalize()),
        })
    }

    /// Combined fingerprint over a set of parts (used for the image set).
    pub fn combine<'a>(parts: impl IntoIterator<Item = &'a Fingerprint>) -> Self {
        let mut hasher = Sha256::new();
        let mut len = 0u64;
        for p in parts {
            len += p.len;
            hasher.update(p.sha256.as_bytes());
        }
        Self {
            len,
            sha256: hex::encode(hasher.finalize()),
        }
    }

    /// True when the file at `path` still carries this fingerprint.
    /// Missing files never match.
    pub fn matches_file(&self, path: &Path, full_hash: bool) -> bool {
        match std::fs::metadata(path) {
            Ok(m) if m.is_file() && m.len() == self.len => {}
            _ => return false,
        }
        if !full_hash {
            return true;
        }
        Fingerprint::of_path(path).map(|fp| fp == *self).unwrap_or(false)
    }
}
