//! Typed accessor for the `Setting` entity (spec §4.5 table + §4.6). All
//! mutation goes through here so bounds are validated in one place.

use crate::error::{ReencodeError, Result};
use crate::queue_order::{FileSort, LibraryPriority};
use crate::store::Store;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EncodingSettings {
    pub scale_4k_to_1080p: bool,
    pub bitrate_factor: f64,
    pub bitrate_cap_1080p: f64,
    pub bitrate_cap_720p: f64,
    pub bitrate_cap_other: f64,
    pub min_file_size_mb: u64,
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            scale_4k_to_1080p: true,
            bitrate_factor: 0.5,
            bitrate_cap_1080p: 6.0,
            bitrate_cap_720p: 3.0,
            bitrate_cap_other: 3.0,
            min_file_size_mb: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueueOrderingSettings {
    pub file_sort: FileSort,
    pub library_priority: LibraryPriority,
}

impl Default for QueueOrderingSettings {
    fn default() -> Self {
        Self {
            file_sort: FileSort::Alphabetical,
            library_priority: LibraryPriority::AlphabeticalAsc,
        }
    }
}

const KEY_SCALE_4K: &str = "scale_4k_to_1080p";
const KEY_BITRATE_FACTOR: &str = "bitrate_factor";
const KEY_CAP_1080P: &str = "bitrate_cap_1080p";
const KEY_CAP_720P: &str = "bitrate_cap_720p";
const KEY_CAP_OTHER: &str = "bitrate_cap_other";
const KEY_MIN_SIZE: &str = "min_file_size_mb";
const KEY_FILE_SORT: &str = "file_sort";
const KEY_LIBRARY_PRIORITY: &str = "library_priority";

pub struct Settings<'a> {
    store: &'a Store,
}

impl<'a> Settings<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub async fn get_encoding(&self) -> Result<EncodingSettings> {
        let mut s = EncodingSettings::default();
        if let Some(v) = self.store.get_raw(KEY_SCALE_4K).await? {
            s.scale_4k_to_1080p = v == "true";
        }
        if let Some(v) = self.store.get_raw(KEY_BITRATE_FACTOR).await? {
            s.bitrate_factor = v.parse().unwrap_or(s.bitrate_factor);
        }
        if let Some(v) = self.store.get_raw(KEY_CAP_1080P).await? {
            s.bitrate_cap_1080p = v.parse().unwrap_or(s.bitrate_cap_1080p);
        }
        if let Some(v) = self.store.get_raw(KEY_CAP_720P).await? {
            s.bitrate_cap_720p = v.parse().unwrap_or(s.bitrate_cap_720p);
        }
        if let Some(v) = self.store.get_raw(KEY_CAP_OTHER).await? {
            s.bitrate_cap_other = v.parse().unwrap_or(s.bitrate_cap_other);
        }
        if let Some(v) = self.store.get_raw(KEY_MIN_SIZE).await? {
            s.min_file_size_mb = v.parse().unwrap_or(s.min_file_size_mb);
        }
        Ok(s)
    }

    pub async fn update_encoding(&self, s: EncodingSettings) -> Result<()> {
        validate_bound("bitrate_factor", s.bitrate_factor, 0.0001, 1.0)?;
        validate_bound("bitrate_cap_1080p", s.bitrate_cap_1080p, 0.0001, 100.0)?;
        validate_bound("bitrate_cap_720p", s.bitrate_cap_720p, 0.0001, 100.0)?;
        validate_bound("bitrate_cap_other", s.bitrate_cap_other, 0.0001, 100.0)?;
        if s.min_file_size_mb > 100_000 {
            return Err(ReencodeError::validation(
                "min_file_size_mb",
                "must be between 0 and 100000",
            ));
        }

        self.store.set_raw(KEY_SCALE_4K, if s.scale_4k_to_1080p { "true" } else { "false" }).await?;
        self.store.set_raw(KEY_BITRATE_FACTOR, &s.bitrate_factor.to_string()).await?;
        self.store.set_raw(KEY_CAP_1080P, &s.bitrate_cap_1080p.to_string()).await?;
        self.store.set_raw(KEY_CAP_720P, &s.bitrate_cap_720p.to_string()).await?;
        self.store.set_raw(KEY_CAP_OTHER, &s.bitrate_cap_other.to_string()).await?;
        self.store.set_raw(KEY_MIN_SIZE, &s.min_file_size_mb.to_string()).await?;
        Ok(())
    }

    pub async fn get_queue_ordering(&self) -> Result<QueueOrderingSettings> {
        let mut s = QueueOrderingSettings::default();
        if let Some(v) = self.store.get_raw(KEY_FILE_SORT).await? {
            if let Some(parsed) = FileSort::parse(&v) {
                s.file_sort = parsed;
            }
        }
        if let Some(v) = self.store.get_raw(KEY_LIBRARY_PRIORITY).await? {
            if let Some(parsed) = LibraryPriority::parse(&v) {
                s.library_priority = parsed;
            }
        }
        Ok(s)
    }

    pub async fn update_queue_ordering(&self, s: QueueOrderingSettings) -> Result<()> {
        self.store.set_raw(KEY_FILE_SORT, s.file_sort.as_str()).await?;
        self.store.set_raw(KEY_LIBRARY_PRIORITY, s.library_priority.as_str()).await?;
        Ok(())
    }
}

fn validate_bound(field: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if value <= min || value > max {
        return Err(ReencodeError::validation(
            field,
            format!("must be in ({min}, {max}]"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_round_trip() {
        let store = Store::open_in_memory().await.unwrap();
        let settings = Settings::new(&store);
        let enc = settings.get_encoding().await.unwrap();
        assert_eq!(enc.min_file_size_mb, 500);
        assert!((enc.bitrate_factor - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn rejects_out_of_bounds_factor() {
        let store = Store::open_in_memory().await.unwrap();
        let settings = Settings::new(&store);
        let mut bad = EncodingSettings::default();
        bad.bitrate_factor = 1.5;
        let err = settings.update_encoding(bad).await.unwrap_err();
        assert!(matches!(err, ReencodeError::Validation { .. }));
    }
}
