//! The pure-ish function from `(path, library, state)` to initial status,
//! spec §4.4. "Pure" modulo its dependencies (store, probe, exclusion
//! evaluator) being injected rather than global.

use crate::error::Result;
use crate::exclusion::ExclusionEvaluator;
use crate::probe::Prober;
use crate::settings::Settings;
use crate::store::Store;
use crate::types::{FileStatus, FileUpsert};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// What classification did to a path, for callers (the Scanner's progress
/// counters in particular) that need to distinguish a newly queued file from
/// one that was skipped, excluded, errored, or left untouched because it was
/// already known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Added,
    Skipped,
    Errored,
    Unchanged,
}

pub struct Classifier {
    store: Arc<Store>,
    prober: Arc<Prober>,
    exclusion: Arc<ExclusionEvaluator>,
}

impl Classifier {
    pub fn new(store: Arc<Store>, prober: Arc<Prober>, exclusion: Arc<ExclusionEvaluator>) -> Self {
        Self {
            store,
            prober,
            exclusion,
        }
    }

    /// Normal discovery path used by the Scanner and Watcher: a no-op if the
    /// path is already known.
    pub async fn classify(&self, path: &str, library_id: i64) -> Result<Disposition> {
        if self.store.get_file_by_path(path).await?.is_some() {
            debug!(path, "classifier: already known, no-op");
            return Ok(Disposition::Unchanged);
        }
        self.classify_inner(path, library_id, true).await
    }

    /// Reactive path used when an exclusion rule is deleted (spec §4.3): the
    /// row already exists and is `queued`; re-run size/probe/HEVC checks
    /// without re-checking exclusion (the caller already determined no rule
    /// matches).
    pub async fn reclassify(&self, path: &str, library_id: i64) -> Result<Disposition> {
        self.classify_inner(path, library_id, false).await
    }

    async fn classify_inner(&self, path: &str, library_id: i64, check_exclusion: bool) -> Result<Disposition> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) if m.is_file() => m,
            _ => {
                debug!(path, "classifier: not a readable regular file, skipping");
                return Ok(Disposition::Unchanged);
            }
        };

        let settings = Settings::new(&self.store);
        let encoding = settings.get_encoding().await?;
        let min_bytes = encoding.min_file_size_mb * 1024 * 1024;
        let size = metadata.len();

        if size < min_bytes {
            self.persist(
                path,
                library_id,
                FileUpsert {
                    file_name: file_name_of(path),
                    original_size: Some(size as i64),
                    status: Some(FileStatus::Skipped),
                    skip_reason: Some(format!("File under {}mb minimum", encoding.min_file_size_mb)),
                    ..Default::default()
                },
            )
            .await?;
            return Ok(Disposition::Skipped);
        }

        if check_exclusion {
            let eval = self.exclusion.evaluate(path, library_id).await?;
            if eval.excluded {
                self.persist(
                    path,
                    library_id,
                    FileUpsert {
                        file_name: file_name_of(path),
                        original_size: Some(size as i64),
                        status: Some(FileStatus::Excluded),
                        skip_reason: eval.reason,
                        ..Default::default()
                    },
                )
                .await?;
                return Ok(Disposition::Skipped);
            }
        }

        let probe = match self.prober.probe(Path::new(path)).await {
            Ok(p) => p,
            Err(e) => {
                warn!(path, error = %e, "probe failed during classification");
                self.persist(
                    path,
                    library_id,
                    FileUpsert {
                        file_name: file_name_of(path),
                        original_size: Some(size as i64),
                        status: Some(FileStatus::Errored),
                        error_message: Some(e.to_string()),
                        ..Default::default()
                    },
                )
                .await?;
                return Ok(Disposition::Errored);
            }
        };

        let base = FileUpsert {
            file_name: file_name_of(path),
            original_codec: probe.codec.clone(),
            original_bitrate: probe.bitrate,
            original_size: Some(size as i64),
            original_width: probe.width,
            original_height: probe.height,
            is_hdr: probe.is_hdr,
            ..Default::default()
        };

        if probe.is_hevc {
            self.persist(
                path,
                library_id,
                FileUpsert {
                    status: Some(FileStatus::Skipped),
                    skip_reason: Some("Already HEVC".to_string()),
                    ..base
                },
            )
            .await?;
            return Ok(Disposition::Skipped);
        }

        self.persist(
            path,
            library_id,
            FileUpsert {
                status: Some(FileStatus::Queued),
                ..base
            },
        )
        .await?;

        Ok(Disposition::Added)
    }

    async fn persist(&self, path: &str, library_id: i64, upsert: FileUpsert) -> Result<()> {
        self.store.upsert_file_by_path(library_id, path, upsert).await?;
        Ok(())
    }
}

fn file_name_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn make_classifier() -> (Classifier, Arc<Store>, tempfile::TempDir) {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let prober = Arc::new(Prober::new("ffprobe"));
        let exclusion = Arc::new(ExclusionEvaluator::new(store.clone()));
        let classifier = Classifier::new(store.clone(), prober, exclusion);
        let dir = tempfile::tempdir().unwrap();
        (classifier, store, dir)
    }

    #[tokio::test]
    async fn skips_files_under_size_floor() {
        let (classifier, store, dir) = make_classifier().await;
        let lib = store.create_library("Movies", dir.path().to_str().unwrap(), true, true).await.unwrap();
        let file_path = dir.path().join("small.mkv");
        let mut f = std::fs::File::create(&file_path).unwrap();
        f.write_all(&vec![0u8; 1024]).unwrap();

        classifier.classify(file_path.to_str().unwrap(), lib.id).await.unwrap();

        let row = store.get_file_by_path(file_path.to_str().unwrap()).await.unwrap().unwrap();
        assert_eq!(row.status, FileStatus::Skipped);
        assert_eq!(row.skip_reason.as_deref(), Some("File under 500mb minimum"));
    }

    #[tokio::test]
    async fn idempotent_on_second_run() {
        let (classifier, store, dir) = make_classifier().await;
        let lib = store.create_library("Movies", dir.path().to_str().unwrap(), true, true).await.unwrap();
        let file_path = dir.path().join("small.mkv");
        std::fs::write(&file_path, vec![0u8; 1024]).unwrap();

        classifier.classify(file_path.to_str().unwrap(), lib.id).await.unwrap();
        let first = store.get_file_by_path(file_path.to_str().unwrap()).await.unwrap().unwrap();

        classifier.classify(file_path.to_str().unwrap(), lib.id).await.unwrap();
        let second = store.get_file_by_path(file_path.to_str().unwrap()).await.unwrap().unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.status, second.status);
        assert_eq!(first.updated_at, second.updated_at);
    }
}
