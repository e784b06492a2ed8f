//! Persistence-neutral domain types. See spec §3.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub enabled: bool,
    pub watch_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum ExclusionType {
    Folder,
    Pattern,
}

impl ExclusionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Pattern => "pattern",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "folder" => Some(Self::Folder),
            "pattern" => Some(Self::Pattern),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exclusion {
    pub id: i64,
    pub library_id: Option<i64>,
    pub pattern: String,
    pub exclusion_type: ExclusionType,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Closed status enum, see spec §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Queued,
    Encoding,
    Finished,
    Skipped,
    Excluded,
    Rejected,
    Errored,
    Cancelled,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Encoding => "encoding",
            Self::Finished => "finished",
            Self::Skipped => "skipped",
            Self::Excluded => "excluded",
            Self::Rejected => "rejected",
            Self::Errored => "errored",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "queued" => Self::Queued,
            "encoding" => Self::Encoding,
            "finished" => Self::Finished,
            "skipped" => Self::Skipped,
            "excluded" => Self::Excluded,
            "rejected" => Self::Rejected,
            "errored" => Self::Errored,
            "cancelled" => Self::Cancelled,
            _ => return None,
        })
    }

    /// Valid `source -> target` transitions, spec §4.7. Used by the store to
    /// reject anything not on this list when a caller requests a transition
    /// explicitly (as opposed to the terminal-pipeline writes, which always
    /// originate from `Encoding`).
    pub fn valid_transition(from: Self, to: Self) -> bool {
        use FileStatus::*;
        matches!(
            (from, to),
            (Queued, Encoding)
                | (Queued, Excluded)
                | (Queued, Skipped)
                | (Excluded, Queued)
                | (Encoding, Finished)
                | (Encoding, Rejected)
                | (Encoding, Errored)
                | (Encoding, Cancelled)
                | (Errored, Queued)
                | (Rejected, Queued)
                | (Encoding, Queued)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    pub id: i64,
    pub library_id: i64,
    pub file_path: String,
    pub file_name: String,
    pub original_codec: Option<String>,
    pub original_bitrate: Option<i64>,
    pub original_size: Option<i64>,
    pub original_width: Option<i32>,
    pub original_height: Option<i32>,
    pub is_hdr: bool,
    pub new_size: Option<i64>,
    pub status: FileStatus,
    pub skip_reason: Option<String>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields the Classifier/Encoder may set on upsert; everything else
/// (`id`, `created_at`, `status` unless explicit) is preserved by the store.
#[derive(Debug, Clone, Default)]
pub struct FileUpsert {
    pub file_name: String,
    pub original_codec: Option<String>,
    pub original_bitrate: Option<i64>,
    pub original_size: Option<i64>,
    pub original_width: Option<i32>,
    pub original_height: Option<i32>,
    pub is_hdr: bool,
    pub status: Option<FileStatus>,
    pub skip_reason: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsDaily {
    pub date: chrono::NaiveDate,
    pub total_files_processed: i64,
    pub total_space_saved: i64,
    pub files_finished: i64,
    pub files_skipped: i64,
    pub files_rejected: i64,
    pub files_errored: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsHourly {
    pub hour_utc: DateTime<Utc>,
    pub total_files_processed: i64,
    pub total_space_saved: i64,
    pub files_finished: i64,
    pub files_skipped: i64,
    pub files_rejected: i64,
    pub files_errored: i64,
}

/// Additive deltas applied to both `stats_daily` and `stats_hourly` for a
/// single terminal outcome. Never an absolute total (spec §4.1).
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsDelta {
    pub total_files_processed: i64,
    pub total_space_saved: i64,
    pub files_finished: i64,
    pub files_skipped: i64,
    pub files_rejected: i64,
    pub files_errored: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingLog {
    pub id: i64,
    pub file_id: i64,
    pub event: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}
