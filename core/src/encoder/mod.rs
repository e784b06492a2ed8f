//! Encoder worker, spec §4.5: single long-lived task that picks one queued
//! file at a time, runs it through the transcode pipeline, and performs the
//! safe file replace. Scheduling state (`running`, `paused`, the currently
//! encoding file) is a process-wide singleton owned by this struct.

pub mod hardware;
pub mod plan;

use crate::bus::{Event, EventBus};
use crate::error::{ReencodeError, Result};
use crate::probe::Prober;
use crate::settings::Settings;
use crate::store::Store;
use crate::types::{FileStatus, StatsDelta};
use plan::{build_plan, PlanConfig};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::{watch, Mutex};
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

const PAUSE_RETRY_INTERVAL: Duration = Duration::from_secs(1);
const IDLE_RETRY_INTERVAL: Duration = Duration::from_secs(10);
const LOOP_SETTLE_INTERVAL: Duration = Duration::from_secs(1);
const ERRORED_MESSAGE: &str = "FFmpeg encoding failed";
const DIAGNOSTIC_TAIL_BYTES: usize = 4096;

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub transcoder_binary: String,
    pub probe_binary: String,
    pub scratch_dir: PathBuf,
    pub plan: PlanConfig,
    /// Unix file mode applied to the replacement file before it takes the
    /// original's place (spec §4.5 safe replace step 2). `None` leaves
    /// whatever `umask` produced on copy.
    pub target_mode: Option<u32>,
}

struct CurrentFile {
    file_id: i64,
    cancel_tx: watch::Sender<bool>,
}

/// Single-slot, long-lived. See module docs.
pub struct Encoder {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    config: EncoderConfig,
    running: AtomicBool,
    paused: AtomicBool,
    current: Mutex<Option<CurrentFile>>,
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("running", &self.running.load(Ordering::SeqCst))
            .field("paused", &self.paused.load(Ordering::SeqCst))
            .finish()
    }
}

impl Encoder {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>, config: EncoderConfig) -> Self {
        Self {
            store,
            bus,
            config,
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            current: Mutex::new(None),
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn stop_worker(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Returns true iff a transcoder process was actually running.
    pub async fn cancel_current(&self) -> bool {
        let current = self.current.lock().await;
        match current.as_ref() {
            Some(cf) => {
                let _ = cf.cancel_tx.send(true);
                true
            }
            None => false,
        }
    }

    /// Runs the scheduling loop until `stop_worker()` is called. Intended to
    /// be spawned as a single background task.
    pub async fn run(self: Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        info!("encoder worker starting");

        while self.running.load(Ordering::SeqCst) {
            if self.paused.load(Ordering::SeqCst) {
                sleep(PAUSE_RETRY_INTERVAL).await;
                continue;
            }

            let settings = Settings::new(&self.store);
            let ordering = match settings.get_queue_ordering().await {
                Ok(o) => o,
                Err(e) => {
                    error!(error = %e, "encoder: failed to read queue ordering settings");
                    sleep(IDLE_RETRY_INTERVAL).await;
                    continue;
                }
            };

            let pick = match self.store.pick_queued(ordering.file_sort, ordering.library_priority).await {
                Ok(p) => p,
                Err(e) => {
                    error!(error = %e, "encoder: failed to pick next file");
                    sleep(IDLE_RETRY_INTERVAL).await;
                    continue;
                }
            };

            let Some(pick) = pick else {
                sleep(IDLE_RETRY_INTERVAL).await;
                continue;
            };

            if let Err(e) = self.process_one(pick.file.id, pick.file.library_id).await {
                error!(file_id = pick.file.id, error = %e, "encoder: pipeline error outside terminal handling");
                // Never leave a file stuck mid-pipeline after an unexpected
                // failure (e.g. a DB error between transitions); force it to
                // `errored` so it doesn't sit unqueued until the next
                // `reset_encoding` crash-recovery pass.
                if let Err(e2) = self
                    .store
                    .transition_status(pick.file.id, FileStatus::Errored, None, Some(&e.to_string()), None, false, false, true)
                    .await
                {
                    error!(file_id = pick.file.id, error = %e2, "encoder: failed to force file to errored after pipeline failure");
                }
            }

            sleep(LOOP_SETTLE_INTERVAL).await;
        }

        info!("encoder worker stopped");
    }

    async fn process_one(&self, file_id: i64, library_id: i64) -> Result<()> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        {
            let mut current = self.current.lock().await;
            *current = Some(CurrentFile { file_id, cancel_tx });
        }

        if let Err(e) = self
            .store
            .transition_status(file_id, FileStatus::Encoding, None, None, None, true, true, false)
            .await
        {
            let mut current = self.current.lock().await;
            *current = None;
            return Err(e);
        }
        self.bus.publish(Event::EncodingProgress {
            file_id,
            percent: None,
            time: None,
        });

        let outcome = self.run_pipeline(file_id, cancel_rx).await;

        {
            let mut current = self.current.lock().await;
            *current = None;
        }

        let outcome_label = match &outcome {
            Ok(status) => status.as_str().to_string(),
            Err(_) => "errored".to_string(),
        };
        self.bus.publish(Event::EncodingComplete {
            file_id,
            outcome: outcome_label,
        });

        // The round-robin cursor only advances once the file has truly
        // reached a terminal status (spec §4.6).
        if let Err(e) = self.store.record_library_served(library_id).await {
            warn!(library_id, error = %e, "encoder: failed to record library served");
        }

        outcome.map(|_| ())
    }

    async fn run_pipeline(&self, file_id: i64, mut cancel_rx: watch::Receiver<bool>) -> Result<FileStatus> {
        let file = self.store.get_file(file_id).await?;
        let scratch_input = self.config.scratch_dir.join(format!("{file_id}.src{}", extension_of(&file.file_path)));
        let scratch_output = self.config.scratch_dir.join(format!("{file_id}.out.mkv"));

        tokio::fs::create_dir_all(&self.config.scratch_dir).await.map_err(ReencodeError::Io)?;

        // a. copy source into scratch; fail-fast.
        if let Err(e) = tokio::fs::copy(&file.file_path, &scratch_input).await {
            return self.finish_errored(file_id, format!("scratch copy failed: {e}")).await;
        }

        // b. re-probe the scratch copy.
        let prober = Prober::new(&self.config.probe_binary);
        let probe = match prober.probe(Path::new(&scratch_input)).await {
            Ok(p) => p,
            Err(e) => {
                let _ = tokio::fs::remove_file(&scratch_input).await;
                return self.finish_errored(file_id, e.to_string()).await;
            }
        };

        let settings = Settings::new(&self.store).get_encoding().await?;

        // c/d. attempt with hw decode, retry once without on non-cancelled failure.
        let scratch_input_str = scratch_input.to_string_lossy().to_string();
        let scratch_output_str = scratch_output.to_string_lossy().to_string();

        let first = self
            .run_transcode_attempt(file_id, &scratch_input_str, &scratch_output_str, &probe, &settings, true, &mut cancel_rx)
            .await;

        let attempt_result = match first {
            AttemptOutcome::Cancelled => {
                let _ = tokio::fs::remove_file(&scratch_input).await;
                let _ = tokio::fs::remove_file(&scratch_output).await;
                self.store
                    .transition_status(file_id, FileStatus::Cancelled, None, None, None, false, false, true)
                    .await?;
                return Ok(FileStatus::Cancelled);
            }
            AttemptOutcome::Success => AttemptOutcome::Success,
            AttemptOutcome::Failed(first_err) => {
                self.store.append_log(file_id, "ffmpeg_command", Some(&first_err)).await.ok();
                self.store.append_log(file_id, "fallback_cpu_decode", None).await.ok();
                self
                    .run_transcode_attempt(file_id, &scratch_input_str, &scratch_output_str, &probe, &settings, false, &mut cancel_rx)
                    .await
            }
        };

        match attempt_result {
            AttemptOutcome::Cancelled => {
                let _ = tokio::fs::remove_file(&scratch_input).await;
                let _ = tokio::fs::remove_file(&scratch_output).await;
                self.store
                    .transition_status(file_id, FileStatus::Cancelled, None, None, None, false, false, true)
                    .await?;
                Ok(FileStatus::Cancelled)
            }
            AttemptOutcome::Failed(last_err) => {
                let _ = tokio::fs::remove_file(&scratch_input).await;
                let _ = tokio::fs::remove_file(&scratch_output).await;
                let tail: String = last_err.chars().rev().take(DIAGNOSTIC_TAIL_BYTES).collect::<String>().chars().rev().collect();
                self.store.append_log(file_id, "error", Some(&tail)).await.ok();
                self.store
                    .transition_status(file_id, FileStatus::Errored, None, Some(ERRORED_MESSAGE), None, false, false, true)
                    .await?;
                self.store
                    .apply_stats_delta(StatsDelta {
                        total_files_processed: 1,
                        files_errored: 1,
                        ..Default::default()
                    })
                    .await?;
                Ok(FileStatus::Errored)
            }
            AttemptOutcome::Success => {
                let original_size = file.original_size.unwrap_or(0);
                let output_size = tokio::fs::metadata(&scratch_output)
                    .await
                    .map(|m| m.len() as i64)
                    .unwrap_or(i64::MAX);

                if output_size >= original_size {
                    let _ = tokio::fs::remove_file(&scratch_input).await;
                    let _ = tokio::fs::remove_file(&scratch_output).await;
                    self.store
                        .transition_status(file_id, FileStatus::Rejected, None, None, Some(output_size), false, false, true)
                        .await?;
                    self.store
                        .apply_stats_delta(StatsDelta {
                            total_files_processed: 1,
                            files_rejected: 1,
                            ..Default::default()
                        })
                        .await?;
                    return Ok(FileStatus::Rejected);
                }

                match safe_replace(Path::new(&file.file_path), &scratch_output, self.config.target_mode).await {
                    Ok(()) => {
                        let _ = tokio::fs::remove_file(&scratch_input).await;
                        let _ = tokio::fs::remove_file(&scratch_output).await;
                        self.store.append_log(file_id, "safe_replace", None).await.ok();
                        self.store
                            .transition_status(file_id, FileStatus::Finished, None, None, Some(output_size), false, false, true)
                            .await?;
                        self.store
                            .apply_stats_delta(StatsDelta {
                                total_files_processed: 1,
                                files_finished: 1,
                                total_space_saved: original_size - output_size,
                                ..Default::default()
                            })
                            .await?;
                        Ok(FileStatus::Finished)
                    }
                    Err(e) => {
                        error!(file_id, error = %e, "encoder: safe replace failed");
                        let _ = tokio::fs::remove_file(&scratch_input).await;
                        let _ = tokio::fs::remove_file(&scratch_output).await;
                        self.store.append_log(file_id, "error", Some(&e.to_string())).await.ok();
                        self.store
                            .transition_status(file_id, FileStatus::Errored, None, Some(&e.to_string()), None, false, false, true)
                            .await?;
                        self.store
                            .apply_stats_delta(StatsDelta {
                                total_files_processed: 1,
                                files_errored: 1,
                                ..Default::default()
                            })
                            .await?;
                        Ok(FileStatus::Errored)
                    }
                }
            }
        }
    }

    async fn finish_errored(&self, file_id: i64, message: String) -> Result<FileStatus> {
        self.store.append_log(file_id, "error", Some(&message)).await.ok();
        self.store
            .transition_status(file_id, FileStatus::Errored, None, Some(&message), None, false, false, true)
            .await?;
        self.store
            .apply_stats_delta(StatsDelta {
                total_files_processed: 1,
                files_errored: 1,
                ..Default::default()
            })
            .await?;
        Ok(FileStatus::Errored)
    }

    async fn run_transcode_attempt(
        &self,
        file_id: i64,
        input: &str,
        output: &str,
        probe: &crate::probe::ProbeResult,
        settings: &crate::settings::EncodingSettings,
        hw_decode: bool,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> AttemptOutcome {
        let plan = build_plan(input, output, probe, settings, &self.config.plan, hw_decode);
        self.store
            .append_log(file_id, "ffmpeg_command", Some(&format!("{} {}", self.config.transcoder_binary, plan.args.join(" "))))
            .await
            .ok();

        let mut child = match Command::new(&self.config.transcoder_binary)
            .args(&plan.args)
            .stderr(std::process::Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => return AttemptOutcome::Failed(e.to_string()),
        };

        let stderr = child.stderr.take();
        let time_re = Regex::new(r"time=(\d{2}):(\d{2}):(\d{2}\.\d+)").unwrap();
        let duration = probe.duration;

        let mut reader_lines = stderr.map(|s| {
            use tokio::io::AsyncBufReadExt;
            tokio::io::BufReader::new(s).lines()
        });
        let mut last_line = String::new();

        loop {
            tokio::select! {
                changed = cancel_rx.changed() => {
                    if changed.is_ok() && *cancel_rx.borrow() {
                        let _ = child.kill().await;
                        return AttemptOutcome::Cancelled;
                    }
                }
                line = async {
                    match reader_lines.as_mut() {
                        Some(lines) => lines.next_line().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match line {
                        Ok(Some(text)) => {
                            last_line = text.clone();
                            if let Some(caps) = time_re.captures(&text) {
                                let h: f64 = caps[1].parse().unwrap_or(0.0);
                                let m: f64 = caps[2].parse().unwrap_or(0.0);
                                let s: f64 = caps[3].parse().unwrap_or(0.0);
                                let current = h * 3600.0 + m * 60.0 + s;
                                let percent = duration
                                    .filter(|d| *d > 0.0)
                                    .map(|d| (current / d * 100.0).min(100.0));
                                self.bus.publish(Event::EncodingProgress {
                                    file_id,
                                    percent,
                                    time: Some(text),
                                });
                            }
                        }
                        Ok(None) => break,
                        Err(_) => break,
                    }
                }
            }
        }

        let status = match child.wait().await {
            Ok(s) => s,
            Err(e) => return AttemptOutcome::Failed(e.to_string()),
        };

        if *cancel_rx.borrow() {
            return AttemptOutcome::Cancelled;
        }

        if status.success() {
            AttemptOutcome::Success
        } else {
            AttemptOutcome::Failed(last_line)
        }
    }
}

enum AttemptOutcome {
    Success,
    Failed(String),
    Cancelled,
}

fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}

/// Copy-delete-rename replace of the original with the transcoded output,
/// spec §4.5 "Safe replace". Attempts best-effort cleanup of the temp file
/// if anything fails after the original has already been deleted.
async fn safe_replace(original_path: &Path, scratch_output: &Path, target_mode: Option<u32>) -> std::io::Result<()> {
    let dir = original_path.parent().unwrap_or_else(|| Path::new("."));
    let stem = original_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let temp_path = dir.join(format!("{stem}.temp.mkv"));
    let final_path = dir.join(format!("{stem}.mkv"));

    tokio::fs::copy(scratch_output, &temp_path).await?;

    #[cfg(unix)]
    if let Some(mode) = target_mode {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(mode);
        tokio::fs::set_permissions(&temp_path, perms).await?;
    }
    #[cfg(not(unix))]
    let _ = target_mode;

    if let Err(e) = tokio::fs::remove_file(original_path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn safe_replace_moves_output_into_place_and_removes_original() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("movie.mp4");
        let scratch_output = dir.path().join("scratch_out.mkv");
        std::fs::write(&original, b"old").unwrap();
        std::fs::write(&scratch_output, b"new").unwrap();

        safe_replace(&original, &scratch_output, None).await.unwrap();

        assert!(!original.exists());
        let final_path = dir.path().join("movie.mkv");
        assert!(final_path.exists());
        assert_eq!(std::fs::read(&final_path).unwrap(), b"new");
    }

    #[tokio::test]
    async fn cancel_current_is_false_when_nothing_running() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let bus = Arc::new(EventBus::new());
        let config = EncoderConfig {
            transcoder_binary: "ffmpeg".to_string(),
            probe_binary: "ffprobe".to_string(),
            scratch_dir: std::env::temp_dir(),
            plan: PlanConfig::default(),
            target_mode: None,
        };
        let encoder = Encoder::new(store, bus, config);
        assert!(!encoder.cancel_current().await);
    }
}
