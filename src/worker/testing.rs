//! In-memory renderer for unit tests

use crate::worker::extract::{
    Track, NAME_SELECTOR, NOTES_SELECTOR, OWNER_SELECTOR, TAGS_SELECTOR, TRACKS_SCRIPT,
};
use crate::worker::render::{RenderError, RenderedPage, Renderer};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Canned content for one item page
#[derive(Debug, Clone, Default)]
pub struct FakeMix {
    pub name: String,
    pub owner: String,
    pub tags: Vec<String>,
    pub description: String,
    /// None means the track list never appears
    pub tracks: Option<Vec<Track>>,
    /// Attempt on which the track list first appears
    pub tracks_on_attempt: u32,
}

impl FakeMix {
    pub fn new(owner: &str, name: &str, tracks: usize) -> Self {
        Self {
            name: name.to_string(),
            owner: owner.to_string(),
            tags: vec!["indie".to_string()],
            description: "Notes Download Tracklist".to_string(),
            tracks: Some(
                (1..=tracks)
                    .map(|i| Track {
                        name: Some(format!("Song {}", i)),
                        performer: Some(format!("Artist {}", i)),
                    })
                    .collect(),
            ),
            tracks_on_attempt: 1,
        }
    }
}

#[derive(Default)]
pub struct FakeRenderer {
    pub pages: HashMap<String, FakeMix>,
    pub opened: AtomicUsize,
    pub evaluations: Arc<AtomicU32>,
}

impl FakeRenderer {
    pub fn with_pages(pages: Vec<(&str, FakeMix)>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(url, mix)| (url.to_string(), mix))
                .collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn open(&self, url: &str) -> Result<Box<dyn RenderedPage>, RenderError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(url) {
            Some(mix) => Ok(Box::new(FakePage {
                mix: mix.clone(),
                attempts: AtomicU32::new(0),
                evaluations: Arc::clone(&self.evaluations),
            })),
            None => Err(RenderError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            }),
        }
    }
}

struct FakePage {
    mix: FakeMix,
    attempts: AtomicU32,
    evaluations: Arc<AtomicU32>,
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[async_trait]
impl RenderedPage for FakePage {
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), RenderError> {
        if selector == NAME_SELECTOR && self.mix.name.is_empty() {
            return Err(RenderError::Timeout {
                what: format!("selector {}", selector),
                millis: timeout.as_millis() as u64,
            });
        }
        Ok(())
    }

    async fn text(&self, selector: &str) -> Option<String> {
        match selector {
            NAME_SELECTOR => non_empty(&self.mix.name),
            OWNER_SELECTOR => non_empty(&self.mix.owner),
            NOTES_SELECTOR => non_empty(&self.mix.description),
            _ => None,
        }
    }

    async fn texts(&self, selector: &str) -> Vec<String> {
        match selector {
            TAGS_SELECTOR => self.mix.tags.clone(),
            _ => Vec::new(),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<Option<serde_json::Value>, RenderError> {
        if script != TRACKS_SCRIPT {
            return Ok(None);
        }
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        match &self.mix.tracks {
            Some(tracks) if attempt >= self.mix.tracks_on_attempt => {
                let value = serde_json::to_value(tracks)
                    .map_err(|e| RenderError::Evaluation(e.to_string()))?;
                Ok(Some(value))
            }
            _ => Ok(None),
        }
    }

    async fn close(&self) {}
}
