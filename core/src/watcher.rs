//! Per-library filesystem watch with a size-stability debounce, spec §4.9.
//! Errors from the underlying `notify` backend are logged, never fatal.

use crate::classifier::Classifier;
use crate::error::Result;
use crate::scanner::has_video_extension;
use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const DEBOUNCE_WINDOW: Duration = Duration::from_secs(5);
const DEBOUNCE_POLL_INTERVAL: Duration = Duration::from_millis(500);

struct Subscription {
    watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

/// Tracks one long-lived `notify` subscription per watched library.
pub struct Watcher {
    classifier: Arc<Classifier>,
    subscriptions: Mutex<HashMap<i64, Subscription>>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher").finish()
    }
}

impl Watcher {
    pub fn new(classifier: Arc<Classifier>) -> Self {
        Self {
            classifier,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Idempotent: a no-op if the library is already being watched.
    pub async fn start(&self, library_id: i64, root: &str) -> Result<()> {
        let mut subs = self.subscriptions.lock().await;
        if subs.contains_key(&library_id) {
            debug!(library_id, "watcher: already watching, no-op");
            return Ok(());
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<NotifyEvent>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<NotifyEvent>| match res {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(e) => warn!(error = %e, "watcher: backend error"),
        })
        .map_err(|e| crate::error::ReencodeError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        watcher
            .watch(Path::new(root), RecursiveMode::Recursive)
            .map_err(|e| crate::error::ReencodeError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        let classifier = self.classifier.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    continue;
                }
                for path in event.paths {
                    if is_dotfile(&path) || !has_video_extension(&path) {
                        continue;
                    }
                    let classifier = classifier.clone();
                    tokio::spawn(debounce_then_classify(path, library_id, classifier));
                }
            }
        });

        subs.insert(library_id, Subscription { watcher, task });
        info!(library_id, root, "watcher started");
        Ok(())
    }

    /// Waits for the subscription's background task to close.
    pub async fn stop(&self, library_id: i64) -> Result<()> {
        let mut subs = self.subscriptions.lock().await;
        if let Some(sub) = subs.remove(&library_id) {
            drop(sub.watcher);
            let _ = sub.task.await;
            info!(library_id, "watcher stopped");
        }
        Ok(())
    }

    pub async fn restart(&self, library_id: i64, root: &str, enabled: bool) -> Result<()> {
        self.stop(library_id).await?;
        if enabled {
            self.start(library_id, root).await?;
        }
        Ok(())
    }

    pub async fn is_watching(&self, library_id: i64) -> bool {
        self.subscriptions.lock().await.contains_key(&library_id)
    }
}

fn is_dotfile(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Poll the file's size until it stops changing for `DEBOUNCE_WINDOW`, then
/// hand off to the classifier. A file that disappears mid-debounce (rename,
/// delete) is simply abandoned.
async fn debounce_then_classify(path: PathBuf, library_id: i64, classifier: Arc<Classifier>) {
    let mut last_size = match tokio::fs::metadata(&path).await {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    let mut quiet_since = tokio::time::Instant::now();

    loop {
        tokio::time::sleep(DEBOUNCE_POLL_INTERVAL).await;
        let size = match tokio::fs::metadata(&path).await {
            Ok(m) => m.len(),
            Err(_) => return,
        };
        let now = tokio::time::Instant::now();
        if size != last_size {
            last_size = size;
            quiet_since = now;
            continue;
        }
        if now.duration_since(quiet_since) >= DEBOUNCE_WINDOW {
            break;
        }
    }

    let path_str = path.to_string_lossy().to_string();
    if let Err(e) = classifier.classify(&path_str, library_id).await {
        error!(path = %path_str, error = %e, "watcher: classification failed");
    }
}
