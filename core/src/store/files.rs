use super::Store;
use crate::error::{ReencodeError, Result};
use crate::queue_order::{FileSort, LibraryPriority};
use crate::types::{FileStatus, FileUpsert, MediaFile};
use chrono::{DateTime, Utc};

const LAST_LIBRARY_KEY: &str = "queue_last_library_id";

/// A file picked off the queue, paired with whether this pick advanced the
/// round-robin cursor (informational; the cursor is only committed once the
/// file reaches a terminal status via `record_library_served`).
#[derive(Debug, Clone)]
pub struct QueuePick {
    pub file: MediaFile,
}

impl Store {
    /// Create-or-update by `file_path`. Preserves `id`, `created_at`, and
    /// `status` unless `upsert.status` is explicitly `Some` (spec §4.1).
    pub async fn upsert_file_by_path(
        &self,
        library_id: i64,
        file_path: &str,
        upsert: FileUpsert,
    ) -> Result<MediaFile> {
        let default_status = upsert.status.unwrap_or(FileStatus::Queued);

        let rec = sqlx::query_as::<_, FileRow>(
            r#"insert into files (
                 library_id, file_path, file_name, original_codec, original_bitrate,
                 original_size, original_width, original_height, is_hdr, status,
                 skip_reason, error_message
               ) values (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               on conflict(file_path) do update set
                 file_name = excluded.file_name,
                 original_codec = excluded.original_codec,
                 original_bitrate = excluded.original_bitrate,
                 original_size = excluded.original_size,
                 original_width = excluded.original_width,
                 original_height = excluded.original_height,
                 is_hdr = excluded.is_hdr,
                 status = case when ? then excluded.status else files.status end,
                 skip_reason = excluded.skip_reason,
                 error_message = excluded.error_message,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
               returning id, library_id, file_path, file_name, original_codec, original_bitrate,
                 original_size, original_width, original_height, is_hdr, new_size, status,
                 skip_reason, error_message, started_at, completed_at, created_at, updated_at"#,
        )
        .bind(library_id)
        .bind(file_path)
        .bind(&upsert.file_name)
        .bind(&upsert.original_codec)
        .bind(upsert.original_bitrate)
        .bind(upsert.original_size)
        .bind(upsert.original_width)
        .bind(upsert.original_height)
        .bind(upsert.is_hdr)
        .bind(default_status.as_str())
        .bind(&upsert.skip_reason)
        .bind(&upsert.error_message)
        .bind(upsert.status.is_some())
        .fetch_one(self.pool())
        .await?;

        Ok(rec.into())
    }

    pub async fn get_file(&self, id: i64) -> Result<MediaFile> {
        let rec = sqlx::query_as::<_, FileRow>(&format!("{SELECT_FILE} where id = ?"))
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| ReencodeError::NotFound(format!("file {id}")))?;
        Ok(rec.into())
    }

    pub async fn get_file_by_path(&self, file_path: &str) -> Result<Option<MediaFile>> {
        let rec = sqlx::query_as::<_, FileRow>(&format!("{SELECT_FILE} where file_path = ?"))
            .bind(file_path)
            .fetch_optional(self.pool())
            .await?;
        Ok(rec.map(Into::into))
    }

    pub async fn list_files(&self, library_id: Option<i64>) -> Result<Vec<MediaFile>> {
        let rows = match library_id {
            Some(id) => {
                sqlx::query_as::<_, FileRow>(&format!("{SELECT_FILE} where library_id = ? order by file_path"))
                    .bind(id)
                    .fetch_all(self.pool())
                    .await?
            }
            None => {
                sqlx::query_as::<_, FileRow>(&format!("{SELECT_FILE} order by file_path"))
                    .fetch_all(self.pool())
                    .await?
            }
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn list_files_by_status(&self, status: FileStatus) -> Result<Vec<MediaFile>> {
        let rows = sqlx::query_as::<_, FileRow>(&format!("{SELECT_FILE} where status = ? order by file_path"))
            .bind(status.as_str())
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Validated status transition plus any of the terminal-outcome fields
    /// the caller supplies. Rejects transitions not in spec §4.7.
    pub async fn transition_status(
        &self,
        id: i64,
        to: FileStatus,
        skip_reason: Option<&str>,
        error_message: Option<&str>,
        new_size: Option<i64>,
        clear_started_completed: bool,
        set_started_now: bool,
        set_completed_now: bool,
    ) -> Result<MediaFile> {
        let current = self.get_file(id).await?;
        if !FileStatus::valid_transition(current.status, to) {
            return Err(ReencodeError::Validation {
                field: "status".into(),
                message: format!("{:?} -> {:?} is not a valid transition", current.status, to),
            });
        }

        let rec = sqlx::query_as::<_, FileRow>(&format!(
            r#"update files set
                 status = ?,
                 skip_reason = coalesce(?, skip_reason),
                 error_message = coalesce(?, error_message),
                 new_size = coalesce(?, new_size),
                 started_at = case when ? then null when ? then strftime('%Y-%m-%dT%H:%M:%fZ', 'now') else started_at end,
                 completed_at = case when ? then null when ? then strftime('%Y-%m-%dT%H:%M:%fZ', 'now') else completed_at end,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
               where id = ?
               {RETURNING_FILE}"#
        ))
        .bind(to.as_str())
        .bind(skip_reason)
        .bind(error_message)
        .bind(new_size)
        .bind(clear_started_completed)
        .bind(set_started_now)
        .bind(clear_started_completed)
        .bind(set_completed_now)
        .bind(id)
        .fetch_one(self.pool())
        .await?;

        Ok(rec.into())
    }

    /// Bulk `queued -> excluded` for exclusion-rule creation (spec §4.3).
    pub async fn bulk_exclude(&self, ids: &[i64], reason: &str) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut affected = 0u64;
        for id in ids {
            let result = sqlx::query(
                "update files set status = 'excluded', skip_reason = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 where id = ? and status = 'queued'",
            )
            .bind(reason)
            .bind(id)
            .execute(self.pool())
            .await?;
            affected += result.rows_affected();
        }
        Ok(affected)
    }

    /// Bulk `excluded -> queued` for exclusion-rule deletion (spec §4.3). The
    /// caller (exclusion evaluator) re-runs the Classifier on each returned id
    /// so size/HEVC checks still apply before the file is truly queued.
    pub async fn bulk_unexclude(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut affected = 0u64;
        for id in ids {
            let result = sqlx::query(
                "update files set status = 'queued', skip_reason = null, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 where id = ? and status = 'excluded'",
            )
            .bind(id)
            .execute(self.pool())
            .await?;
            affected += result.rows_affected();
        }
        Ok(affected)
    }

    /// Pick at most one `queued` file per the ordering policy, spec §4.6.
    pub async fn pick_queued(
        &self,
        sort: FileSort,
        priority: LibraryPriority,
    ) -> Result<Option<QueuePick>> {
        let file = match priority {
            LibraryPriority::RoundRobin => self.pick_round_robin(sort).await?,
            _ => {
                let lib_order = match priority {
                    LibraryPriority::AlphabeticalAsc => "l.name asc",
                    LibraryPriority::AlphabeticalDesc => "l.name desc",
                    LibraryPriority::RoundRobin => unreachable!(),
                };
                let sql = format!(
                    "select f.id, f.library_id, f.file_path, f.file_name, f.original_codec,
                            f.original_bitrate, f.original_size, f.original_width, f.original_height,
                            f.is_hdr, f.new_size, f.status, f.skip_reason, f.error_message,
                            f.started_at, f.completed_at, f.created_at, f.updated_at
                     from files f join libraries l on l.id = f.library_id
                     where f.status = 'queued'
                     order by {lib_order}, {}
                     limit 1",
                    sort.order_by_sql().replace("original_bitrate", "f.original_bitrate").replace("file_path", "f.file_path")
                );
                sqlx::query_as::<_, FileRow>(&sql).fetch_optional(self.pool()).await?
            }
        };

        Ok(file.map(|f| QueuePick { file: f.into() }))
    }

    async fn pick_round_robin(&self, sort: FileSort) -> Result<Option<FileRow>> {
        let candidates: Vec<(i64, String)> = sqlx::query_as(
            "select distinct l.id, l.name from libraries l
             join files f on f.library_id = l.id
             where f.status = 'queued'
             order by l.name asc",
        )
        .fetch_all(self.pool())
        .await?;

        if candidates.is_empty() {
            return Ok(None);
        }

        let last_library_id: Option<i64> =
            self.get_raw(LAST_LIBRARY_KEY).await?.and_then(|v| v.parse().ok());

        let start_index = match last_library_id {
            Some(id) => candidates.iter().position(|(lid, _)| *lid == id).map(|i| (i + 1) % candidates.len()).unwrap_or(0),
            None => 0,
        };

        let (library_id, _) = candidates[start_index];

        let sql = format!(
            "select id, library_id, file_path, file_name, original_codec, original_bitrate,
                    original_size, original_width, original_height, is_hdr, new_size, status,
                    skip_reason, error_message, started_at, completed_at, created_at, updated_at
             from files where library_id = ? and status = 'queued'
             order by {}
             limit 1",
            sort.order_by_sql()
        );
        let row = sqlx::query_as::<_, FileRow>(&sql).bind(library_id).fetch_optional(self.pool()).await?;
        Ok(row)
    }

    /// Advance the round-robin cursor once the served file reaches a
    /// terminal status (spec §4.6: "After the worker finishes that file").
    pub async fn record_library_served(&self, library_id: i64) -> Result<()> {
        self.set_raw(LAST_LIBRARY_KEY, &library_id.to_string()).await
    }
}

const SELECT_FILE: &str = "select id, library_id, file_path, file_name, original_codec, original_bitrate, \
    original_size, original_width, original_height, is_hdr, new_size, status, skip_reason, \
    error_message, started_at, completed_at, created_at, updated_at from files";

const RETURNING_FILE: &str = "returning id, library_id, file_path, file_name, original_codec, original_bitrate, \
    original_size, original_width, original_height, is_hdr, new_size, status, skip_reason, \
    error_message, started_at, completed_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct FileRow {
    id: i64,
    library_id: i64,
    file_path: String,
    file_name: String,
    original_codec: Option<String>,
    original_bitrate: Option<i64>,
    original_size: Option<i64>,
    original_width: Option<i32>,
    original_height: Option<i32>,
    is_hdr: bool,
    new_size: Option<i64>,
    status: String,
    skip_reason: Option<String>,
    error_message: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<FileRow> for MediaFile {
    fn from(r: FileRow) -> Self {
        MediaFile {
            id: r.id,
            library_id: r.library_id,
            file_path: r.file_path,
            file_name: r.file_name,
            original_codec: r.original_codec,
            original_bitrate: r.original_bitrate,
            original_size: r.original_size,
            original_width: r.original_width,
            original_height: r.original_height,
            is_hdr: r.is_hdr,
            new_size: r.new_size,
            status: FileStatus::parse(&r.status).unwrap_or(FileStatus::Errored),
            skip_reason: r.skip_reason,
            error_message: r.error_message,
            started_at: r.started_at,
            completed_at: r.completed_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}
