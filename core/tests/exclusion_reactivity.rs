//! Exercises exclusion-rule create/delete reactivity across the full
//! `ExclusionEvaluator` + `Classifier` + `Store` stack (spec §4.3), rather
//! than the evaluator's own pattern-matching unit tests.

use reencode_core::classifier::Classifier;
use reencode_core::exclusion::ExclusionEvaluator;
use reencode_core::probe::Prober;
use reencode_core::store::Store;
use reencode_core::types::{ExclusionType, FileStatus, FileUpsert};
use std::sync::Arc;

async fn setup() -> (Arc<Store>, ExclusionEvaluator, Classifier) {
    let store = Arc::new(Store::open_in_memory().await.unwrap());
    let prober = Arc::new(Prober::new("ffprobe"));
    let exclusion_for_classifier = Arc::new(ExclusionEvaluator::new(store.clone()));
    let classifier = Classifier::new(store.clone(), prober, exclusion_for_classifier);
    let exclusion = ExclusionEvaluator::new(store.clone());
    (store, exclusion, classifier)
}

#[tokio::test]
async fn creating_rule_bulk_excludes_only_matching_queued_files() {
    let (store, exclusion, _classifier) = setup().await;
    let lib = store.create_library("Movies", "/media/movies", true, true).await.unwrap();

    let matching = store
        .upsert_file_by_path(
            lib.id,
            "/media/movies/Sample/clip.mkv",
            FileUpsert {
                file_name: "clip.mkv".into(),
                status: Some(FileStatus::Queued),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let unrelated = store
        .upsert_file_by_path(
            lib.id,
            "/media/movies/Feature/main.mkv",
            FileUpsert {
                file_name: "main.mkv".into(),
                status: Some(FileStatus::Queued),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    exclusion
        .create_rule(None, "**/Sample/**", ExclusionType::Pattern, Some("sample clips"))
        .await
        .unwrap();

    let matching_after = store.get_file(matching.id).await.unwrap();
    let unrelated_after = store.get_file(unrelated.id).await.unwrap();

    assert_eq!(matching_after.status, FileStatus::Excluded);
    assert_eq!(matching_after.skip_reason.as_deref(), Some("sample clips"));
    assert_eq!(unrelated_after.status, FileStatus::Queued);
}

#[tokio::test]
async fn deleting_rule_requeues_and_reclassifies_files_it_no_longer_matches() {
    let (store, exclusion, classifier) = setup().await;
    let lib = store.create_library("Movies", "/media/movies", true, true).await.unwrap();

    let file = store
        .upsert_file_by_path(
            lib.id,
            "/media/movies/Sample/clip.mkv",
            FileUpsert {
                file_name: "clip.mkv".into(),
                status: Some(FileStatus::Queued),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let rule = exclusion
        .create_rule(None, "**/Sample/**", ExclusionType::Pattern, Some("sample clips"))
        .await
        .unwrap();
    assert_eq!(store.get_file(file.id).await.unwrap().status, FileStatus::Excluded);

    exclusion.delete_rule(rule.id, &classifier).await.unwrap();

    let after = store.get_file(file.id).await.unwrap();
    // The row must leave `excluded` once its only matching rule is gone. The
    // actual terminal status then depends on the Classifier's probe step
    // (which this test environment has no real ffprobe/video file for), but
    // it must no longer be stuck in `excluded` with the stale skip reason.
    assert_ne!(after.status, FileStatus::Excluded);
}

#[tokio::test]
async fn deleting_rule_leaves_other_matching_files_excluded() {
    let (store, exclusion, classifier) = setup().await;
    let lib = store.create_library("Movies", "/media/movies", true, true).await.unwrap();

    let sample = store
        .upsert_file_by_path(
            lib.id,
            "/media/movies/Sample/clip.mkv",
            FileUpsert {
                file_name: "clip.mkv".into(),
                status: Some(FileStatus::Queued),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let broad_rule = exclusion
        .create_rule(None, "**/Sample/**", ExclusionType::Pattern, Some("sample clips"))
        .await
        .unwrap();
    let narrow_rule = exclusion
        .create_rule(None, "/media/movies/Sample/clip.mkv", ExclusionType::Pattern, Some("named directly"))
        .await
        .unwrap();

    exclusion.delete_rule(broad_rule.id, &classifier).await.unwrap();

    // `narrow_rule` still matches, so the file must remain excluded under it.
    let after = store.get_file(sample.id).await.unwrap();
    assert_eq!(after.status, FileStatus::Excluded);

    exclusion.delete_rule(narrow_rule.id, &classifier).await.unwrap();
    let final_state = store.get_file(sample.id).await.unwrap();
    assert_ne!(final_state.status, FileStatus::Excluded);
}
