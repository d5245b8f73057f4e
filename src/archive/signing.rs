//! Time-limited archive retrieval URLs
//!
//! A reference has the form
//! `{base}/{key}?expires={unix}&signature={hex}` where the signature is
//! the SHA-256 of the secret, the key and the expiry joined by newlines.

use crate::config::ArchiveConfig;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Signs and verifies retrieval URLs for stored archives
#[derive(Debug, Clone)]
pub struct UrlSigner {
    base_url: String,
    secret: String,
    ttl_secs: u64,
}

impl UrlSigner {
    pub fn new(config: &ArchiveConfig) -> Self {
        Self {
            base_url: config.public_base_url.trim_end_matches('/').to_string(),
            secret: config.signing_secret.clone(),
            ttl_secs: config.url_ttl_secs,
        }
    }

    pub fn signature(&self, key: &str, expires: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b"\n");
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Builds a URL for `key` valid until `now + ttl`
    ///
    /// # Returns
    ///
    /// The URL and its unix expiry
    pub fn sign(&self, key: &str, now: u64) -> (String, u64) {
        let expires = now + self.ttl_secs;
        let url = format!(
            "{}/{}?expires={}&signature={}",
            self.base_url,
            key,
            expires,
            self.signature(key, expires)
        );
        (url, expires)
    }

    /// Checks a presented signature and expiry for `key`
    pub fn verify(&self, key: &str, expires: u64, signature: &str, now: u64) -> bool {
        if now > expires {
            return false;
        }
        constant_time_eq(self.signature(key, expires).as_bytes(), signature.as_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
