//! Item page extraction
//!
//! Static fields are read once with direct DOM queries and default to empty
//! when absent. The track list is filled in by client-side script some time
//! after load, so it is read with a bounded polling loop.

use crate::config::ExtractionConfig;
use crate::worker::render::RenderedPage;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

pub const NAME_SELECTOR: &str = "#mix_name";
pub const OWNER_SELECTOR: &str = "#user_byline .propername";
pub const TAGS_SELECTOR: &str = "#mix_tags_display .tag";
pub const NOTES_SELECTOR: &str = "#description_html";

/// Text after this marker in the description is page chrome, not notes
pub const NOTES_CUTOFF: &str = "Download Tracklist";

/// Resolves to the track attributes once the mix view has loaded them,
/// or to `undefined` while it has not
pub const TRACKS_SCRIPT: &str = r#"
    new Promise((resolve) => {
        const views = window.App && window.App.views;
        const view = views && views.mixView;
        if (view && view.mix && typeof view.mix.withInternationalTracks === 'function') {
            view.mix.withInternationalTracks(() => {
                resolve(view.mix.tracks.models.map((model) => model.attributes));
            });
        }
        resolve(undefined);
    })
"#;

/// Static fields of one mix
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixRecord {
    pub name: String,
    pub owner: String,
    pub tags: Vec<String>,
    pub notes: String,
}

/// One entry of a mix's track list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub performer: Option<String>,
}

/// Bounded retry schedule for asynchronously populated data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl From<&ExtractionConfig> for PollPolicy {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_millis(config.attempt_delay_ms),
        }
    }
}

/// Runs `attempt` until it yields a value or the attempts run out
///
/// The first attempt runs immediately and `policy.delay` separates
/// consecutive attempts, so a success on attempt `n` waits `(n - 1) * delay`.
///
/// # Returns
///
/// The value and the 1-based attempt that produced it, or None once
/// `policy.max_attempts` attempts have all come back empty
pub async fn poll_until_defined<T, F, Fut>(policy: PollPolicy, mut attempt: F) -> Option<(T, u32)>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for n in 1..=policy.max_attempts {
        if n > 1 {
            tokio::time::sleep(policy.delay).await;
        }
        if let Some(value) = attempt(n).await {
            return Some((value, n));
        }
        tracing::debug!("Attempt {} of {} produced no data", n, policy.max_attempts);
    }
    None
}

/// Reads the static fields of a mix page
pub async fn extract_record(page: &dyn RenderedPage) -> MixRecord {
    let notes = page.text(NOTES_SELECTOR).await.unwrap_or_default();

    MixRecord {
        name: page.text(NAME_SELECTOR).await.unwrap_or_default(),
        owner: page.text(OWNER_SELECTOR).await.unwrap_or_default(),
        tags: page.texts(TAGS_SELECTOR).await,
        notes: trim_notes(&notes),
    }
}

/// Polls the page for its track list
///
/// # Returns
///
/// The tracks, or None if every attempt came back undefined
pub async fn extract_tracks(page: &dyn RenderedPage, policy: PollPolicy) -> Option<Vec<Track>> {
    poll_until_defined(policy, |n| async move {
        match page.evaluate(TRACKS_SCRIPT).await {
            Ok(Some(value)) => match serde_json::from_value::<Vec<Track>>(value) {
                Ok(tracks) => Some(tracks),
                Err(e) => {
                    tracing::debug!("Attempt {} returned malformed tracks: {}", n, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::debug!("Attempt {} failed to evaluate: {}", n, e);
                None
            }
        }
    })
    .await
    .map(|(tracks, _)| tracks)
}

/// Cuts the description before the tracklist marker and trims it
pub fn trim_notes(description: &str) -> String {
    let notes = match description.find(NOTES_CUTOFF) {
        Some(index) => &description[..index],
        None => description,
    };
    notes.trim().to_string()
}
