//! Recursive library walk, spec §4.8. One global run at a time; reentry is
//! refused rather than queued.

use crate::bus::{Event, EventBus};
use crate::classifier::{Classifier, Disposition};
use crate::error::{ReencodeError, Result};
use crate::store::Store;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "ts", "m2ts",
];

pub fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_dotfile(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default)]
pub struct ScanCounters {
    pub processed: u64,
    pub added: u64,
    pub skipped: u64,
    pub errored: u64,
}

pub struct Scanner {
    store: Arc<Store>,
    classifier: Arc<Classifier>,
    bus: Arc<EventBus>,
    running: AtomicBool,
    stop_requested: AtomicBool,
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}

impl Scanner {
    pub fn new(store: Arc<Store>, classifier: Arc<Classifier>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            classifier,
            bus,
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Single global slot: refuses to start a second scan concurrently.
    fn acquire(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ReencodeError::Conflict("a scan is already in progress".into()));
        }
        self.stop_requested.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Cooperative stop: the current file finishes, then the loop returns.
    pub fn stop_scan(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub async fn scan_all(&self) -> Result<()> {
        self.acquire()?;
        let result = self.scan_all_inner().await;
        self.release();
        result
    }

    async fn scan_all_inner(&self) -> Result<()> {
        let libraries = self.store.list_libraries().await?;
        for library in libraries.into_iter().filter(|l| l.enabled) {
            if self.stop_requested.load(Ordering::SeqCst) {
                break;
            }
            self.run_one(library.id, &library.path).await?;
        }
        Ok(())
    }

    pub async fn scan_library(&self, library_id: i64) -> Result<()> {
        self.acquire()?;
        let result = async {
            let library = self.store.get_library(library_id).await?;
            self.run_one(library.id, &library.path).await
        }
        .await;
        self.release();
        result
    }

    async fn run_one(&self, library_id: i64, root: &str) -> Result<()> {
        info!(library_id, root, "scan starting");
        self.bus.publish(Event::ScanProgress {
            library_id,
            total: None,
            processed: 0,
            added: 0,
            skipped: 0,
            errored: 0,
            current_file: None,
            last_error: None,
        });

        let mut counters = ScanCounters::default();
        let mut queue = VecDeque::new();
        queue.push_back(PathBuf::from(root));
        let mut last_error: Option<String> = None;

        'walk: while let Some(dir) = queue.pop_front() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "scan: cannot read directory");
                    counters.errored += 1;
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            loop {
                if self.stop_requested.load(Ordering::SeqCst) {
                    break 'walk;
                }

                let entry = match entries.next_entry().await {
                    Ok(Some(e)) => e,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(dir = %dir.display(), error = %e, "scan: directory iteration error");
                        counters.errored += 1;
                        last_error = Some(e.to_string());
                        break;
                    }
                };

                let path = entry.path();
                if is_dotfile(&path) {
                    continue;
                }

                let file_type = match entry.file_type().await {
                    Ok(ft) => ft,
                    Err(_) => continue,
                };

                if file_type.is_dir() {
                    queue.push_back(path);
                    continue;
                }

                if !file_type.is_file() || !has_video_extension(&path) {
                    continue;
                }

                let path_str = path.to_string_lossy().to_string();
                counters.processed += 1;
                match self.classifier.classify(&path_str, library_id).await {
                    Ok(Disposition::Added) => counters.added += 1,
                    Ok(Disposition::Skipped) => counters.skipped += 1,
                    Ok(Disposition::Errored) => {
                        counters.errored += 1;
                    }
                    Ok(Disposition::Unchanged) => {}
                    Err(e) => {
                        error!(path = %path_str, error = %e, "scan: classification failed");
                        counters.errored += 1;
                        last_error = Some(e.to_string());
                    }
                }

                self.bus.publish(Event::ScanProgress {
                    library_id,
                    total: None,
                    processed: counters.processed,
                    added: counters.added,
                    skipped: counters.skipped,
                    errored: counters.errored,
                    current_file: Some(path_str),
                    last_error: last_error.clone(),
                });
            }
        }

        info!(library_id, processed = counters.processed, added = counters.added,
              skipped = counters.skipped, errored = counters.errored, "scan finished");
        self.bus.publish(Event::ScanComplete {
            library_id,
            processed: counters.processed,
            added: counters.added,
            skipped: counters.skipped,
            errored: counters.errored,
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclusion::ExclusionEvaluator;
    use crate::probe::Prober;

    async fn make_scanner() -> (Scanner, Arc<Store>, tempfile::TempDir) {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let prober = Arc::new(Prober::new("ffprobe"));
        let exclusion = Arc::new(ExclusionEvaluator::new(store.clone()));
        let classifier = Arc::new(Classifier::new(store.clone(), prober, exclusion));
        let bus = Arc::new(EventBus::new());
        let scanner = Scanner::new(store.clone(), classifier, bus);
        let dir = tempfile::tempdir().unwrap();
        (scanner, store, dir)
    }

    #[tokio::test]
    async fn skips_dotfiles_and_non_video_extensions() {
        let (scanner, store, dir) = make_scanner().await;
        let lib = store.create_library("Movies", dir.path().to_str().unwrap(), true, true).await.unwrap();

        std::fs::write(dir.path().join(".hidden.mkv"), vec![0u8; 600 * 1024 * 1024]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("movie.mkv"), vec![0u8; 600 * 1024 * 1024]).unwrap();

        scanner.scan_library(lib.id).await.unwrap();

        let files = store.list_files(Some(lib.id)).await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].file_path.ends_with("movie.mkv"));
    }

    #[tokio::test]
    async fn refuses_concurrent_scans() {
        let (scanner, store, dir) = make_scanner().await;
        let lib = store.create_library("Movies", dir.path().to_str().unwrap(), true, true).await.unwrap();
        let scanner = Arc::new(scanner);

        scanner.acquire().unwrap();
        let err = scanner.scan_library(lib.id).await.unwrap_err();
        assert!(matches!(err, ReencodeError::Conflict(_)));
        scanner.release();
    }
}
