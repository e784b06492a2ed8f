use super::Store;
use crate::error::{ReencodeError, Result};
use crate::types::Library;

impl Store {
    pub async fn create_library(
        &self,
        name: &str,
        path: &str,
        enabled: bool,
        watch_enabled: bool,
    ) -> Result<Library> {
        let rec = sqlx::query_as::<_, LibraryRow>(
            r#"insert into libraries (name, path, enabled, watch_enabled)
               values (?, ?, ?, ?)
               returning id, name, path, enabled, watch_enabled, created_at, updated_at"#,
        )
        .bind(name)
        .bind(path)
        .bind(enabled)
        .bind(watch_enabled)
        .fetch_one(self.pool())
        .await
        .map_err(map_conflict)?;

        Ok(rec.into())
    }

    pub async fn update_library(
        &self,
        id: i64,
        name: &str,
        enabled: bool,
        watch_enabled: bool,
    ) -> Result<Library> {
        let rec = sqlx::query_as::<_, LibraryRow>(
            r#"update libraries set name = ?, enabled = ?, watch_enabled = ?,
               updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
               where id = ?
               returning id, name, path, enabled, watch_enabled, created_at, updated_at"#,
        )
        .bind(name)
        .bind(enabled)
        .bind(watch_enabled)
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| ReencodeError::NotFound(format!("library {id}")))?;

        // Disabling a library drops its queued files (spec §3 "Lifecycle").
        if !enabled {
            sqlx::query("update files set status = 'skipped', skip_reason = 'Library disabled' where library_id = ? and status = 'queued'")
                .bind(id)
                .execute(self.pool())
                .await?;
        }

        Ok(rec.into())
    }

    pub async fn delete_library(&self, id: i64) -> Result<()> {
        let result = sqlx::query("delete from libraries where id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(ReencodeError::NotFound(format!("library {id}")));
        }
        Ok(())
    }

    pub async fn get_library(&self, id: i64) -> Result<Library> {
        let rec = sqlx::query_as::<_, LibraryRow>(
            "select id, name, path, enabled, watch_enabled, created_at, updated_at from libraries where id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| ReencodeError::NotFound(format!("library {id}")))?;
        Ok(rec.into())
    }

    pub async fn list_libraries(&self) -> Result<Vec<Library>> {
        let rows = sqlx::query_as::<_, LibraryRow>(
            "select id, name, path, enabled, watch_enabled, created_at, updated_at from libraries order by name",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

fn map_conflict(e: sqlx::Error) -> ReencodeError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return ReencodeError::Conflict("library path already exists".into());
        }
    }
    ReencodeError::Storage(e)
}

#[derive(sqlx::FromRow)]
struct LibraryRow {
    id: i64,
    name: String,
    path: String,
    enabled: bool,
    watch_enabled: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<LibraryRow> for Library {
    fn from(r: LibraryRow) -> Self {
        Library {
            id: r.id,
            name: r.name,
            path: r.path,
            enabled: r.enabled,
            watch_enabled: r.watch_enabled,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}
