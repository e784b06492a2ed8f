//! End-to-end discovery through the real `Scanner` -> `Classifier` -> `Store`
//! stack, as opposed to the per-module unit tests already embedded in each
//! of those files.

use reencode_core::bus::EventBus;
use reencode_core::classifier::Classifier;
use reencode_core::exclusion::ExclusionEvaluator;
use reencode_core::probe::Prober;
use reencode_core::scanner::Scanner;
use reencode_core::settings::{EncodingSettings, Settings};
use reencode_core::store::Store;
use std::sync::Arc;

async fn wire(dir: &std::path::Path) -> (Scanner, Arc<Store>, i64) {
    let store = Arc::new(Store::open_in_memory().await.unwrap());
    let prober = Arc::new(Prober::new("ffprobe"));
    let exclusion = Arc::new(ExclusionEvaluator::new(store.clone()));
    let classifier = Arc::new(Classifier::new(store.clone(), prober, exclusion));
    let bus = Arc::new(EventBus::new());
    let scanner = Scanner::new(store.clone(), classifier, bus);

    // Drop the size floor so small fixture files reach the classifier's
    // probe step instead of being skipped outright.
    Settings::new(&store)
        .update_encoding(EncodingSettings { min_file_size_mb: 0, ..Default::default() })
        .await
        .unwrap();

    let lib = store.create_library("Movies", dir.to_str().unwrap(), true, true).await.unwrap();
    (scanner, store, lib.id)
}

#[tokio::test]
async fn scan_discovers_nested_video_files_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("Season 1")).unwrap();
    std::fs::write(dir.path().join("Season 1/e01.mkv"), b"not a real container").unwrap();
    std::fs::write(dir.path().join("poster.jpg"), b"not a video").unwrap();

    let (scanner, store, lib_id) = wire(dir.path()).await;
    scanner.scan_library(lib_id).await.unwrap();

    let files = store.list_files(Some(lib_id)).await.unwrap();
    assert_eq!(files.len(), 1, "only the .mkv should be recorded, the .jpg must be ignored");
    assert!(files[0].file_path.ends_with("e01.mkv"));
}

#[tokio::test]
async fn repeated_scans_are_idempotent_per_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("movie.mkv"), b"not a real container").unwrap();

    let (scanner, store, lib_id) = wire(dir.path()).await;

    scanner.scan_library(lib_id).await.unwrap();
    let first_pass = store.list_files(Some(lib_id)).await.unwrap();
    assert_eq!(first_pass.len(), 1);
    let first = first_pass.into_iter().next().unwrap();

    scanner.scan_library(lib_id).await.unwrap();
    let second_pass = store.list_files(Some(lib_id)).await.unwrap();
    assert_eq!(second_pass.len(), 1, "a second scan must not insert a duplicate row");
    let second = second_pass.into_iter().next().unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.status, second.status);
    assert_eq!(first.updated_at, second.updated_at, "a known path is a no-op on rediscovery");
}
