//! The HTTP/JSON control surface is out of scope as an implementation (spec
//! §1, §6): this trait documents the seam without a router, wire format, or
//! auth layer behind it. A future binding (axum, or anything else) would
//! implement this trait over the core types directly.

use async_trait::async_trait;
use reencode_core::error::Result;
use reencode_core::settings::{EncodingSettings, QueueOrderingSettings};
use reencode_core::types::{Exclusion, ExclusionType, Library, MediaFile};

#[async_trait]
pub trait ControlSurface: Send + Sync {
    async fn list_libraries(&self) -> Result<Vec<Library>>;
    async fn create_library(&self, name: &str, path: &str, enabled: bool, watch_enabled: bool) -> Result<Library>;
    async fn update_library(&self, id: i64, name: &str, enabled: bool, watch_enabled: bool) -> Result<Library>;
    async fn delete_library(&self, id: i64) -> Result<()>;

    async fn list_exclusions(&self) -> Result<Vec<Exclusion>>;
    async fn create_exclusion(
        &self,
        library_id: Option<i64>,
        pattern: &str,
        exclusion_type: ExclusionType,
        reason: Option<&str>,
    ) -> Result<Exclusion>;
    async fn delete_exclusion(&self, id: i64) -> Result<Exclusion>;

    async fn list_files(&self, library_id: Option<i64>) -> Result<Vec<MediaFile>>;
    async fn retry_file(&self, id: i64) -> Result<MediaFile>;
    async fn skip_file(&self, id: i64, reason: &str) -> Result<MediaFile>;
    async fn exclude_file(&self, id: i64, reason: &str) -> Result<MediaFile>;

    async fn get_encoding_settings(&self) -> Result<EncodingSettings>;
    async fn update_encoding_settings(&self, settings: EncodingSettings) -> Result<()>;
    async fn get_queue_ordering_settings(&self) -> Result<QueueOrderingSettings>;
    async fn update_queue_ordering_settings(&self, settings: QueueOrderingSettings) -> Result<()>;

    async fn start_scan(&self, library_id: Option<i64>) -> Result<()>;
    async fn stop_scan(&self) -> Result<()>;

    async fn pause_worker(&self) -> Result<()>;
    async fn resume_worker(&self) -> Result<()>;
    async fn cancel_current_encode(&self) -> Result<bool>;

    /// Spec §6 "Test encode": produce-output only, never touching the
    /// original file, the Store, or stats.
    async fn test_encode(&self, file_id: i64, output_dir: &str) -> Result<TestEncodeReport>;
}

#[derive(Debug, Clone)]
pub struct TestEncodeReport {
    pub success: bool,
    pub original_size: i64,
    pub output_size: i64,
    pub savings_percent: f64,
}
