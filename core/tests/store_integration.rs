//! Cross-cutting store invariants that don't belong to any single module's
//! unit tests: unique file identity, additive stats accounting, and crash
//! recovery.

use reencode_core::store::Store;
use reencode_core::types::{FileStatus, FileUpsert, StatsDelta};

async fn open() -> Store {
    Store::open_in_memory().await.unwrap()
}

#[tokio::test]
async fn upsert_by_path_is_identity_stable_across_repeats() {
    let store = open().await;
    let lib = store.create_library("Movies", "/media/movies", true, true).await.unwrap();

    let first = store
        .upsert_file_by_path(
            lib.id,
            "/media/movies/a.mkv",
            FileUpsert {
                file_name: "a.mkv".into(),
                original_size: Some(1_000_000),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let second = store
        .upsert_file_by_path(
            lib.id,
            "/media/movies/a.mkv",
            FileUpsert {
                file_name: "a.mkv".into(),
                original_size: Some(2_000_000),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.original_size, Some(2_000_000));

    let all = store.list_files(Some(lib.id)).await.unwrap();
    assert_eq!(all.len(), 1, "second upsert must update the existing row, not insert a new one");
}

#[tokio::test]
async fn upsert_preserves_status_unless_explicitly_set() {
    let store = open().await;
    let lib = store.create_library("Movies", "/media/movies", true, true).await.unwrap();

    let file = store
        .upsert_file_by_path(
            lib.id,
            "/media/movies/a.mkv",
            FileUpsert {
                file_name: "a.mkv".into(),
                status: Some(FileStatus::Queued),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    store
        .transition_status(file.id, FileStatus::Encoding, None, None, None, false, true, false)
        .await
        .unwrap();

    // Re-discovery upsert with no explicit status must not clobber `encoding`.
    let updated = store
        .upsert_file_by_path(
            lib.id,
            "/media/movies/a.mkv",
            FileUpsert {
                file_name: "a.mkv".into(),
                original_codec: Some("h264".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.status, FileStatus::Encoding);
    assert_eq!(updated.original_codec.as_deref(), Some("h264"));
}

#[tokio::test]
async fn stats_deltas_accumulate_additively() {
    let store = open().await;

    store
        .apply_stats_delta(StatsDelta {
            total_files_processed: 1,
            files_finished: 1,
            total_space_saved: 1_000,
            ..Default::default()
        })
        .await
        .unwrap();

    store
        .apply_stats_delta(StatsDelta {
            total_files_processed: 1,
            files_errored: 1,
            total_space_saved: 500,
            ..Default::default()
        })
        .await
        .unwrap();

    let today = chrono::Utc::now().date_naive();
    let daily = store.get_stats_daily(today).await.unwrap().expect("today's row must exist");

    assert_eq!(daily.total_files_processed, 2);
    assert_eq!(daily.files_finished, 1);
    assert_eq!(daily.files_errored, 1);
    assert_eq!(daily.total_space_saved, 1_500);

    let hourly = store.list_stats_hourly(1).await.unwrap();
    assert_eq!(hourly.len(), 1);
    assert_eq!(hourly[0].total_files_processed, 2);
}

#[tokio::test]
async fn reset_encoding_recovers_stuck_rows_after_a_crash() {
    let store = open().await;
    let lib = store.create_library("Movies", "/media/movies", true, true).await.unwrap();

    let file = store
        .upsert_file_by_path(
            lib.id,
            "/media/movies/a.mkv",
            FileUpsert {
                file_name: "a.mkv".into(),
                status: Some(FileStatus::Queued),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    store
        .transition_status(file.id, FileStatus::Encoding, None, None, None, false, true, false)
        .await
        .unwrap();

    let stuck = store.get_file(file.id).await.unwrap();
    assert_eq!(stuck.status, FileStatus::Encoding);
    assert!(stuck.started_at.is_some());

    let recovered = store.reset_encoding().await.unwrap();
    assert_eq!(recovered, 1);

    let after = store.get_file(file.id).await.unwrap();
    assert_eq!(after.status, FileStatus::Queued);
    assert!(after.started_at.is_none());
}
