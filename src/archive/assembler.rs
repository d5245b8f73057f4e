//! Archive assembly
//!
//! Once a request is ready, every recorded outcome is gathered into one zip
//! bundle: one entry per stored artifact, plus a manifest of failed items
//! when there are any. The bundle is stored under a key derived from the
//! request id, so re-running assembly after a failed attempt simply
//! overwrites it.

use crate::archive::signing::{unix_now, UrlSigner};
use crate::archive::tracker::CompletionTracker;
use crate::storage::{lock_storage, ArtifactStore, RequestStore, SharedStorage};
use crate::worker::item_blob_key;
use crate::{ArchiverError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Name of the bundle entry listing failed items
pub const FAILURE_MANIFEST: &str = "failed-items.txt";

/// Blob store key of the bundle for a request
pub fn archive_key(request_id: &str) -> String {
    format!("archives/{}.zip", request_id)
}

/// Retrievable reference to an uploaded bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveReference {
    pub key: String,
    pub url: String,
    pub expires_at: u64,
    /// Number of artifact entries in the bundle
    pub entries: usize,
    /// Item URLs listed in the failure manifest
    pub failed: Vec<String>,
}

/// Builds and uploads the archive for a completed request
pub struct ArchiveAssembler {
    storage: SharedStorage,
    artifacts: Arc<dyn ArtifactStore>,
    tracker: CompletionTracker,
    signer: UrlSigner,
}

impl ArchiveAssembler {
    pub fn new(storage: SharedStorage, artifacts: Arc<dyn ArtifactStore>, signer: UrlSigner) -> Self {
        Self {
            tracker: CompletionTracker::new(storage.clone()),
            storage,
            artifacts,
            signer,
        }
    }

    /// Assembles, uploads and signs the bundle for `request_id`
    ///
    /// # Returns
    ///
    /// * `Ok(ArchiveReference)` - The bundle was uploaded
    /// * `Err(ArchiverError::NotReady)` - Work is still outstanding; try later
    /// * `Err(ArchiverError::Storage)` - Reading artifacts or uploading failed;
    ///   the assembly itself may be retried
    pub async fn assemble(&self, request_id: &str) -> Result<ArchiveReference> {
        let readiness = self.tracker.check_ready(request_id)?;
        if !readiness.ready {
            return Err(ArchiverError::NotReady {
                id: request_id.to_string(),
                total: readiness.total_discovered,
                count: readiness.completed_count,
            });
        }

        let records = {
            let storage = lock_storage(&self.storage)?;
            let discovered: HashSet<String> =
                storage.get_discovered_links(request_id)?.into_iter().collect();
            storage
                .get_artifacts(request_id)?
                .into_iter()
                .filter(|record| discovered.contains(&record.item_url))
                .collect::<Vec<_>>()
        };

        let mut entries = Vec::new();
        let mut failed = Vec::new();
        for record in records {
            if record.is_error() {
                failed.push(record.item_url);
                continue;
            }

            let blob_key = item_blob_key(request_id, &record.item_url, &record.artifact_key);
            match self.artifacts.get(&blob_key).await? {
                Some(bytes) => entries.push((record.artifact_key, bytes)),
                None => {
                    tracing::warn!("Artifact {} for {} is missing", blob_key, record.item_url);
                    failed.push(record.item_url);
                }
            }
        }
        failed.sort();

        let bundle = build_bundle(&entries, &failed)?;
        let key = archive_key(request_id);
        let size = bundle.len();
        if let Err(e) = self.artifacts.put(&key, bundle).await {
            tracing::error!("Failed to upload archive {}: {}", key, e);
            return Err(e.into());
        }

        lock_storage(&self.storage)?.mark_archived(request_id)?;

        let (url, expires_at) = self.signer.sign(&key, unix_now());
        tracing::info!(
            "Archived {}: {} entries, {} failed, {} bytes",
            request_id,
            entries.len(),
            failed.len(),
            size
        );

        Ok(ArchiveReference {
            key,
            url,
            expires_at,
            entries: entries.len(),
            failed,
        })
    }
}

/// Encodes artifact entries and the failure manifest as a zip bundle
///
/// Entry names that collide get a ` (n)` suffix before the extension.
pub fn build_bundle(
    entries: &[(String, Vec<u8>)],
    failed: &[String],
) -> std::result::Result<Vec<u8>, zip::result::ZipError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut names = HashSet::new();
    if !failed.is_empty() {
        names.insert(FAILURE_MANIFEST.to_string());
    }

    for (name, bytes) in entries {
        let name = unique_name(name, &mut names);
        writer.start_file(name, options)?;
        writer.write_all(bytes)?;
    }

    if !failed.is_empty() {
        writer.start_file(FAILURE_MANIFEST, options)?;
        for url in failed {
            writeln!(writer, "{}", url)?;
        }
    }

    Ok(writer.finish()?.into_inner())
}

fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{} ({}){}", stem, n, ext);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::state::{RequestKind, RequestStatus};
    use crate::storage::{
        FsArtifactStore, NewRequest, SqliteStorage, StorageError, StorageResult, ERROR_SENTINEL,
    };
    use crate::tasks::ItemTask;
    use crate::worker::testing::{FakeMix, FakeRenderer};
    use crate::worker::ItemWorker;
    use async_trait::async_trait;
    use std::io::Read;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn item(i: usize) -> String {
        format!("https://example.com/dj/mix-{}", i)
    }

    fn storage_with(discovered: usize) -> SharedStorage {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .create_request(&NewRequest {
                id: "req-1".to_string(),
                source_url: "https://example.com/dj/history".to_string(),
                kind: RequestKind::History,
                config_hash: "hash".to_string(),
            })
            .unwrap();
        let links: Vec<String> = (0..discovered).map(item).collect();
        storage.add_discovered_links("req-1", 1, &links).unwrap();
        Arc::new(Mutex::new(storage))
    }

    fn signer() -> UrlSigner {
        UrlSigner::new(&test_config().archive)
    }

    /// Stores 3 good artifacts and 1 error sentinel, then finalizes
    async fn three_ok_one_failed(storage: &SharedStorage, blobs: &dyn ArtifactStore) {
        for i in 0..3 {
            let key = format!("dj-mix {}.txt", i);
            blobs
                .put(
                    &item_blob_key("req-1", &item(i), &key),
                    format!("mix {}", i).into_bytes(),
                )
                .await
                .unwrap();
            storage
                .lock()
                .unwrap()
                .record_artifact("req-1", &item(i), &key)
                .unwrap();
        }
        let mut storage = storage.lock().unwrap();
        storage
            .record_artifact("req-1", &item(3), ERROR_SENTINEL)
            .unwrap();
        storage
            .finalize_total("req-1", RequestStatus::Discovered)
            .unwrap();
    }

    fn entry_names(bytes: &[u8]) -> Vec<String> {
        let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_three_entries_plus_manifest() {
        let dir = TempDir::new().unwrap();
        let blobs = Arc::new(FsArtifactStore::new(dir.path()));
        let storage = storage_with(4);
        three_ok_one_failed(&storage, blobs.as_ref()).await;

        let assembler = ArchiveAssembler::new(storage.clone(), blobs.clone(), signer());
        let reference = assembler.assemble("req-1").await.unwrap();

        assert_eq!(reference.key, "archives/req-1.zip");
        assert_eq!(reference.entries, 3);
        assert_eq!(reference.failed, vec![item(3)]);
        assert!(reference
            .url
            .starts_with("http://127.0.0.1:8080/archives/req-1.zip?expires="));

        let bytes = blobs.get("archives/req-1.zip").await.unwrap().unwrap();
        assert_eq!(
            entry_names(&bytes),
            vec![
                "dj-mix 0.txt",
                "dj-mix 1.txt",
                "dj-mix 2.txt",
                FAILURE_MANIFEST
            ]
        );

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut manifest = String::new();
        archive
            .by_name(FAILURE_MANIFEST)
            .unwrap()
            .read_to_string(&mut manifest)
            .unwrap();
        assert_eq!(manifest, format!("{}\n", item(3)));

        assert_eq!(
            storage.lock().unwrap().get_request("req-1").unwrap().unwrap().status,
            RequestStatus::Archived
        );
    }

    #[tokio::test]
    async fn test_not_ready_is_distinct() {
        let dir = TempDir::new().unwrap();
        let blobs = Arc::new(FsArtifactStore::new(dir.path()));
        let storage = storage_with(2);

        let assembler = ArchiveAssembler::new(storage, blobs, signer());
        let result = assembler.assemble("req-1").await;

        assert!(matches!(
            result,
            Err(ArchiverError::NotReady { total: 2, count: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_blob_goes_to_manifest() {
        let dir = TempDir::new().unwrap();
        let blobs = Arc::new(FsArtifactStore::new(dir.path()));
        let storage = storage_with(1);
        {
            let mut storage = storage.lock().unwrap();
            storage
                .record_artifact("req-1", &item(0), "gone.txt")
                .unwrap();
            storage
                .finalize_total("req-1", RequestStatus::Discovered)
                .unwrap();
        }

        let assembler = ArchiveAssembler::new(storage, blobs.clone(), signer());
        let reference = assembler.assemble("req-1").await.unwrap();

        assert_eq!(reference.entries, 0);
        assert_eq!(reference.failed, vec![item(0)]);
    }

    #[tokio::test]
    async fn test_empty_request_produces_empty_bundle() {
        let dir = TempDir::new().unwrap();
        let blobs = Arc::new(FsArtifactStore::new(dir.path()));
        let storage = storage_with(0);
        storage
            .lock()
            .unwrap()
            .finalize_total("req-1", RequestStatus::Discovered)
            .unwrap();

        let assembler = ArchiveAssembler::new(storage, blobs.clone(), signer());
        assembler.assemble("req-1").await.unwrap();

        let bytes = blobs.get("archives/req-1.zip").await.unwrap().unwrap();
        assert!(entry_names(&bytes).is_empty());
    }

    /// Delegates to a real store but can refuse archive uploads
    struct FlakyUpload {
        inner: FsArtifactStore,
        fail_archives: AtomicBool,
    }

    #[async_trait]
    impl ArtifactStore for FlakyUpload {
        async fn put(&self, key: &str, bytes: Vec<u8>) -> StorageResult<()> {
            if key.starts_with("archives/") && self.fail_archives.load(Ordering::SeqCst) {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "upload refused",
                )));
            }
            self.inner.put(key, bytes).await
        }

        async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
            self.inner.get(key).await
        }
    }

    #[tokio::test]
    async fn test_upload_failure_is_retryable() {
        let dir = TempDir::new().unwrap();
        let blobs = Arc::new(FlakyUpload {
            inner: FsArtifactStore::new(dir.path()),
            fail_archives: AtomicBool::new(true),
        });
        let storage = storage_with(4);
        three_ok_one_failed(&storage, blobs.as_ref()).await;

        let assembler = ArchiveAssembler::new(storage.clone(), blobs.clone(), signer());

        let first = assembler.assemble("req-1").await;
        assert!(matches!(first, Err(ArchiverError::Storage(_))));
        assert_eq!(
            storage.lock().unwrap().get_request("req-1").unwrap().unwrap().status,
            RequestStatus::Discovered
        );

        blobs.fail_archives.store(false, Ordering::SeqCst);
        let second = assembler.assemble("req-1").await.unwrap();
        assert_eq!(second.entries, 3);

        // Assembling again after success is harmless
        let third = assembler.assemble("req-1").await.unwrap();
        assert_eq!(third.entries, 3);
    }

    #[tokio::test]
    async fn test_same_titled_mixes_keep_their_own_content() {
        let dir = TempDir::new().unwrap();
        let blobs = Arc::new(FsArtifactStore::new(dir.path()));
        let storage = storage_with(0);
        let mix_a = "https://example.com/dj/mix-a";
        let mix_b = "https://example.com/dj/mix-b";
        storage
            .lock()
            .unwrap()
            .add_discovered_links("req-1", 1, &[mix_a.to_string(), mix_b.to_string()])
            .unwrap();

        let renderer = Arc::new(FakeRenderer::with_pages(vec![
            (mix_a, FakeMix::new("dj", "Untitled", 1)),
            (mix_b, FakeMix::new("dj", "Untitled", 3)),
        ]));
        let worker = ItemWorker::new(storage.clone(), blobs.clone(), renderer, &test_config());
        for (count, url) in [mix_a, mix_b].into_iter().enumerate() {
            worker
                .process(&ItemTask {
                    url: url.to_string(),
                    id: "req-1".to_string(),
                    count: count as u64 + 1,
                    total: 2,
                })
                .await
                .unwrap();
        }
        storage
            .lock()
            .unwrap()
            .finalize_total("req-1", RequestStatus::Discovered)
            .unwrap();

        let assembler = ArchiveAssembler::new(storage, blobs.clone(), signer());
        let reference = assembler.assemble("req-1").await.unwrap();
        assert_eq!(reference.entries, 2);
        assert!(reference.failed.is_empty());

        let bytes = blobs.get("archives/req-1.zip").await.unwrap().unwrap();
        assert_eq!(
            entry_names(&bytes),
            vec!["dj-Untitled (2).txt", "dj-Untitled.txt"]
        );

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut track_counts = Vec::new();
        for name in ["dj-Untitled.txt", "dj-Untitled (2).txt"] {
            let mut text = String::new();
            archive
                .by_name(name)
                .unwrap()
                .read_to_string(&mut text)
                .unwrap();
            track_counts.push(text.lines().filter(|l| l.contains(" by Artist ")).count());
        }
        track_counts.sort();
        assert_eq!(track_counts, vec![1, 3]);
    }

    #[test]
    fn test_colliding_names_are_suffixed() {
        let entries = vec![
            ("dj-mix.txt".to_string(), b"a".to_vec()),
            ("dj-mix.txt".to_string(), b"b".to_vec()),
            (FAILURE_MANIFEST.to_string(), b"c".to_vec()),
        ];
        let bytes = build_bundle(&entries, &["https://example.com/x".to_string()]).unwrap();

        assert_eq!(
            entry_names(&bytes),
            vec![
                "dj-mix (2).txt",
                "dj-mix.txt",
                "failed-items (2).txt",
                FAILURE_MANIFEST
            ]
        );
    }
}
