//! Integration tests for the crawl-and-archive pipeline
//!
//! These tests use wiremock to serve paginated listing pages and an
//! in-memory renderer for item pages, then run the whole pipeline through
//! the in-process task queue.

use async_trait::async_trait;
use mixtape_archiver::api::ApiError;
use mixtape_archiver::archive::{archive_key, FAILURE_MANIFEST};
use mixtape_archiver::config::{parse_config, Config};
use mixtape_archiver::crawler::PageLinkExtractor;
use mixtape_archiver::pipeline::Components;
use mixtape_archiver::storage::{ArtifactStore, RequestStore};
use mixtape_archiver::tasks::TaskReceiver;
use mixtape_archiver::worker::extract::{
    NAME_SELECTOR, NOTES_SELECTOR, OWNER_SELECTOR, TAGS_SELECTOR, TRACKS_SCRIPT,
};
use mixtape_archiver::worker::{RenderError, RenderedPage, Renderer};
use mixtape_archiver::RequestStatus;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::ZipArchive;

/// Creates a test configuration storing everything under `dir`
fn create_test_config(dir: &TempDir) -> Config {
    let root = dir.path().display();
    parse_config(&format!(
        r#"
[crawler]
concurrency-limit = 4
page-timeout-ms = 2000
selector-timeout-ms = 100

[extraction]
max-attempts = 3
attempt-delay-ms = 10

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"

[storage]
database-path = '{root}/archiver.db'
artifact-dir = '{root}/artifacts'

[archive]
public-base-url = "http://127.0.0.1:8080"
signing-secret = "integration-secret"
"#
    ))
    .expect("test config should be valid")
}

fn listing_html(links: &[&str]) -> String {
    let covers: String = links
        .iter()
        .map(|href| {
            format!(
                r#"<div class="cover"><a class="mix_url" href="{}">mix</a></div>"#,
                href
            )
        })
        .collect();
    format!("<html><body>{}</body></html>", covers)
}

async fn mount_page(server: &MockServer, route: &str, links: &[&str]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_html(links))
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

/// Item page content keyed by URL
#[derive(Clone)]
struct Mix {
    owner: String,
    name: String,
    tracks: Vec<(String, String)>,
}

#[derive(Default)]
struct StaticRenderer {
    mixes: HashMap<String, Mix>,
}

impl StaticRenderer {
    fn add(&mut self, url: String, owner: &str, name: &str, tracks: usize) {
        self.mixes.insert(
            url,
            Mix {
                owner: owner.to_string(),
                name: name.to_string(),
                tracks: (1..=tracks)
                    .map(|i| (format!("Track {}", i), format!("Artist {}", i)))
                    .collect(),
            },
        );
    }
}

#[async_trait]
impl Renderer for StaticRenderer {
    async fn open(&self, url: &str) -> Result<Box<dyn RenderedPage>, RenderError> {
        match self.mixes.get(url) {
            Some(mix) => Ok(Box::new(StaticPage { mix: mix.clone() })),
            None => Err(RenderError::Navigation {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

struct StaticPage {
    mix: Mix,
}

#[async_trait]
impl RenderedPage for StaticPage {
    async fn wait_for(&self, _selector: &str, _timeout: Duration) -> Result<(), RenderError> {
        Ok(())
    }

    async fn text(&self, selector: &str) -> Option<String> {
        match selector {
            NAME_SELECTOR => Some(self.mix.name.clone()),
            OWNER_SELECTOR => Some(self.mix.owner.clone()),
            NOTES_SELECTOR => Some("Liner notes Download Tracklist".to_string()),
            _ => None,
        }
    }

    async fn texts(&self, selector: &str) -> Vec<String> {
        match selector {
            TAGS_SELECTOR => vec!["ambient".to_string(), "night".to_string()],
            _ => Vec::new(),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<Option<serde_json::Value>, RenderError> {
        if script != TRACKS_SCRIPT {
            return Ok(None);
        }
        let tracks: Vec<serde_json::Value> = self
            .mix
            .tracks
            .iter()
            .map(|(name, performer)| serde_json::json!({ "name": name, "performer": performer }))
            .collect();
        Ok(Some(serde_json::Value::Array(tracks)))
    }

    async fn close(&self) {}
}

fn build(config: &Config, renderer: StaticRenderer) -> (Components, TaskReceiver) {
    let extractor = PageLinkExtractor::new(config).expect("Failed to build extractor");
    Components::build(config, "test-hash", Arc::new(extractor), Arc::new(renderer))
        .expect("Failed to build pipeline")
}

fn zip_entries(bytes: Vec<u8>) -> HashMap<String, String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("archive should be a zip");
    let mut entries = HashMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        entries.insert(file.name().to_string(), content);
    }
    entries
}

#[tokio::test]
async fn test_full_pipeline_archives_every_item() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/dj/history/1", &["/dj/first", "/dj/second"]).await;
    mount_page(&mock_server, "/dj/history/2", &["/dj/third", "/dj/broken"]).await;
    mount_page(&mock_server, "/dj/history/3", &[]).await;

    let mut renderer = StaticRenderer::default();
    renderer.add(format!("{}/dj/first", base_url), "dj", "First Light", 2);
    renderer.add(format!("{}/dj/second", base_url), "dj", "Second Wind", 1);
    renderer.add(format!("{}/dj/third", base_url), "dj", "Third Rail", 3);

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let (components, mut receiver) = build(&config, renderer);

    let id = components
        .api
        .request_archive(&format!("{}/dj/history", base_url), "history")
        .await
        .expect("intake should succeed")
        .id;

    // 3 page tasks and 4 item tasks
    let processed = components.pool.run_until_idle(&mut receiver).await;
    assert_eq!(processed, 7);

    let status = components.api.download_status(&id).await.unwrap();
    assert!(status.ready);
    assert_eq!(status.total, 4);
    assert_eq!(status.count, 4);
    assert!(!status.truncated);
    assert!(status
        .url
        .unwrap()
        .contains(&format!("/archives/{}.zip?expires=", id)));

    let bytes = components
        .artifacts
        .get(&archive_key(&id))
        .await
        .unwrap()
        .expect("archive should be stored");
    let entries = zip_entries(bytes);

    assert_eq!(entries.len(), 4);
    let first = &entries["dj-First Light.txt"];
    assert!(first.starts_with("First Light\nby dj\ntags: ambient, night\n\nLiner notes\n\n"));
    assert!(first.contains("1. Track 1 by Artist 1\n"));
    assert!(entries.contains_key("dj-Second Wind.txt"));
    assert!(entries.contains_key("dj-Third Rail.txt"));
    assert_eq!(
        entries[FAILURE_MANIFEST],
        format!("{}/dj/broken\n", base_url)
    );

    let request = components
        .storage
        .lock()
        .unwrap()
        .get_request(&id)
        .unwrap()
        .unwrap();
    assert_eq!(request.status, RequestStatus::Archived);
    assert_eq!(request.config_hash, "test-hash");
}

#[tokio::test]
async fn test_repeated_links_are_archived_once() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/dj/collection/1", &["/dj/loop", "/dj/loop"]).await;
    mount_page(&mock_server, "/dj/collection/2", &["/dj/loop", "/dj/other"]).await;
    mount_page(&mock_server, "/dj/collection/3", &[]).await;

    let mut renderer = StaticRenderer::default();
    renderer.add(format!("{}/dj/loop", base_url), "dj", "Loop", 1);
    renderer.add(format!("{}/dj/other", base_url), "dj", "Other", 1);

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let (components, mut receiver) = build(&config, renderer);

    let id = components
        .api
        .request_archive(&format!("{}/dj/collection", base_url), "collection")
        .await
        .unwrap()
        .id;
    components.pool.run_until_idle(&mut receiver).await;

    let status = components.api.download_status(&id).await.unwrap();
    assert!(status.ready);
    assert_eq!((status.total, status.count), (2, 2));
}

#[tokio::test]
async fn test_failed_page_truncates_request() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/dj/history/1", &["/dj/only"]).await;
    Mock::given(method("GET"))
        .and(path("/dj/history/2"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let mut renderer = StaticRenderer::default();
    renderer.add(format!("{}/dj/only", base_url), "dj", "Only", 1);

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let (components, mut receiver) = build(&config, renderer);

    let id = components
        .api
        .request_archive(&format!("{}/dj/history", base_url), "history")
        .await
        .unwrap()
        .id;
    components.pool.run_until_idle(&mut receiver).await;

    let status = components.api.download_status(&id).await.unwrap();
    assert!(status.ready);
    assert!(status.truncated);
    assert_eq!((status.total, status.count), (1, 1));
}

#[tokio::test]
async fn test_unknown_request_is_not_found() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let (components, _receiver) = build(&config, StaticRenderer::default());

    let result = components.api.download_status("does-not-exist").await;

    match result {
        Err(ApiError::NotFound(message)) => assert!(message.contains("does-not-exist")),
        other => panic!("expected not found, got {:?}", other),
    }
}
