//! Artifact text template and key sanitizing

use crate::worker::extract::{MixRecord, Track};
use sha2::{Digest, Sha256};

/// Longest artifact key, in bytes
const MAX_KEY_BYTES: usize = 255;

const KEY_EXTENSION: &str = ".txt";

/// Serializes a mix and its tracks as plain text
///
/// ```text
/// <name>
/// by <owner>
/// tags: <tag>, <tag>
///
/// <notes>
///
/// 1. <track> by <performer>
/// ```
pub fn render_text(record: &MixRecord, tracks: &[Track]) -> String {
    let mut out = format!(
        "{}\nby {}\ntags: {}\n\n{}\n\n",
        record.name,
        record.owner,
        record.tags.join(", "),
        record.notes
    );

    for (index, track) in tracks.iter().enumerate() {
        out.push_str(&format!(
            "{}. {} by {}\n",
            index + 1,
            track.name.as_deref().unwrap_or_default(),
            track.performer.as_deref().unwrap_or_default()
        ));
    }

    out
}

/// Builds the artifact key for a mix: `<owner>-<name>.txt`, sanitized
///
/// Falls back to a digest of the item URL when the page yielded neither
/// an owner nor a name.
pub fn artifact_key(record: &MixRecord, item_url: &str) -> String {
    if record.owner.trim().is_empty() && record.name.trim().is_empty() {
        return format!("mix-{}{}", url_digest(item_url), KEY_EXTENSION);
    }
    let stem = sanitize_key(
        &format!("{}-{}", record.owner, record.name),
        MAX_KEY_BYTES - KEY_EXTENSION.len(),
    );
    format!("{}{}", stem, KEY_EXTENSION)
}

/// Short, stable digest of an item URL (16 hex characters)
pub fn url_digest(item_url: &str) -> String {
    let digest = hex::encode(Sha256::digest(item_url.as_bytes()));
    digest[..16].to_string()
}

/// Replaces characters that are unsafe in file names and archive entries,
/// capping the result at `max_bytes` on a char boundary
pub fn sanitize_key(raw: &str, max_bytes: usize) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '/' | '\\' | '?' | '<' | '>' | ':' | '*' | '|' | '"' => out.push('_'),
            c if c.is_control() => out.push('_'),
            c => out.push(c),
        }
    }

    let mut out = out.trim().trim_start_matches('.').to_string();
    if out.len() > max_bytes {
        let mut cut = max_bytes;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
    }
    out
}
