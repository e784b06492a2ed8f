use super::Store;
use crate::error::Result;
use crate::types::{StatsDaily, StatsDelta, StatsHourly};
use chrono::Utc;

/// Additive counter updates on `stats_daily`/`stats_hourly` (spec §4.1):
/// callers never compute absolute totals, only deltas for one terminal
/// outcome.
impl Store {
    pub async fn apply_stats_delta(&self, delta: StatsDelta) -> Result<()> {
        let now = Utc::now();
        let date = now.date_naive().to_string();
        let hour = now
            .date_naive()
            .and_hms_opt(now.time().hour(), 0, 0)
            .unwrap()
            .and_utc();

        sqlx::query(
            r#"insert into stats_daily (date, total_files_processed, total_space_saved,
                 files_finished, files_skipped, files_rejected, files_errored)
               values (?, ?, ?, ?, ?, ?, ?)
               on conflict(date) do update set
                 total_files_processed = total_files_processed + excluded.total_files_processed,
                 total_space_saved = total_space_saved + excluded.total_space_saved,
                 files_finished = files_finished + excluded.files_finished,
                 files_skipped = files_skipped + excluded.files_skipped,
                 files_rejected = files_rejected + excluded.files_rejected,
                 files_errored = files_errored + excluded.files_errored"#,
        )
        .bind(&date)
        .bind(delta.total_files_processed)
        .bind(delta.total_space_saved)
        .bind(delta.files_finished)
        .bind(delta.files_skipped)
        .bind(delta.files_rejected)
        .bind(delta.files_errored)
        .execute(self.pool())
        .await?;

        sqlx::query(
            r#"insert into stats_hourly (hour_utc, total_files_processed, total_space_saved,
                 files_finished, files_skipped, files_rejected, files_errored)
               values (?, ?, ?, ?, ?, ?, ?)
               on conflict(hour_utc) do update set
                 total_files_processed = total_files_processed + excluded.total_files_processed,
                 total_space_saved = total_space_saved + excluded.total_space_saved,
                 files_finished = files_finished + excluded.files_finished,
                 files_skipped = files_skipped + excluded.files_skipped,
                 files_rejected = files_rejected + excluded.files_rejected,
                 files_errored = files_errored + excluded.files_errored"#,
        )
        .bind(hour)
        .bind(delta.total_files_processed)
        .bind(delta.total_space_saved)
        .bind(delta.files_finished)
        .bind(delta.files_skipped)
        .bind(delta.files_rejected)
        .bind(delta.files_errored)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn get_stats_daily(&self, date: chrono::NaiveDate) -> Result<Option<StatsDaily>> {
        let row = sqlx::query_as::<_, StatsDailyRow>(
            "select date, total_files_processed, total_space_saved, files_finished,
                    files_skipped, files_rejected, files_errored
             from stats_daily where date = ?",
        )
        .bind(date.to_string())
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn list_stats_hourly(&self, limit: i64) -> Result<Vec<StatsHourly>> {
        let rows = sqlx::query_as::<_, StatsHourlyRow>(
            "select hour_utc, total_files_processed, total_space_saved, files_finished,
                    files_skipped, files_rejected, files_errored
             from stats_hourly order by hour_utc desc limit ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

use chrono::Timelike;

#[derive(sqlx::FromRow)]
struct StatsDailyRow {
    date: String,
    total_files_processed: i64,
    total_space_saved: i64,
    files_finished: i64,
    files_skipped: i64,
    files_rejected: i64,
    files_errored: i64,
}

impl From<StatsDailyRow> for StatsDaily {
    fn from(r: StatsDailyRow) -> Self {
        StatsDaily {
            date: r.date.parse().unwrap_or_default(),
            total_files_processed: r.total_files_processed,
            total_space_saved: r.total_space_saved,
            files_finished: r.files_finished,
            files_skipped: r.files_skipped,
            files_rejected: r.files_rejected,
            files_errored: r.files_errored,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StatsHourlyRow {
    hour_utc: chrono::DateTime<Utc>,
    total_files_processed: i64,
    total_space_saved: i64,
    files_finished: i64,
    files_skipped: i64,
    files_rejected: i64,
    files_errored: i64,
}

impl From<StatsHourlyRow> for StatsHourly {
    fn from(r: StatsHourlyRow) -> Self {
        StatsHourly {
            hour_utc: r.hour_utc,
            total_files_processed: r.total_files_processed,
            total_space_saved: r.total_space_saved,
            files_finished: r.files_finished,
            files_skipped: r.files_skipped,
            files_rejected: r.files_rejected,
            files_errored: r.files_errored,
        }
    }
}
