use super::Store;
use crate::error::Result;
use crate::types::EncodingLog;

impl Store {
    pub async fn append_log(&self, file_id: i64, event: &str, details: Option<&str>) -> Result<()> {
        sqlx::query("insert into encoding_log (file_id, event, details) values (?, ?, ?)")
            .bind(file_id)
            .bind(event)
            .bind(details)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_log(&self, file_id: i64) -> Result<Vec<EncodingLog>> {
        let rows = sqlx::query_as::<_, EncodingLogRow>(
            "select id, file_id, event, details, created_at from encoding_log where file_id = ? order by id",
        )
        .bind(file_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(sqlx::FromRow)]
struct EncodingLogRow {
    id: i64,
    file_id: i64,
    event: String,
    details: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<EncodingLogRow> for EncodingLog {
    fn from(r: EncodingLogRow) -> Self {
        EncodingLog {
            id: r.id,
            file_id: r.file_id,
            event: r.event,
            details: r.details,
            created_at: r.created_at,
        }
    }
}
