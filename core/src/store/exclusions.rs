use super::Store;
use crate::error::{ReencodeError, Result};
use crate::types::{Exclusion, ExclusionType};

impl Store {
    pub async fn create_exclusion(
        &self,
        library_id: Option<i64>,
        pattern: &str,
        exclusion_type: ExclusionType,
        reason: Option<&str>,
    ) -> Result<Exclusion> {
        let rec = sqlx::query_as::<_, ExclusionRow>(
            r#"insert into exclusions (library_id, pattern, exclusion_type, reason)
               values (?, ?, ?, ?)
               returning id, library_id, pattern, exclusion_type, reason, created_at"#,
        )
        .bind(library_id)
        .bind(pattern)
        .bind(exclusion_type.as_str())
        .bind(reason)
        .fetch_one(self.pool())
        .await?;
        Ok(rec.into())
    }

    pub async fn delete_exclusion(&self, id: i64) -> Result<Exclusion> {
        let rec = sqlx::query_as::<_, ExclusionRow>(
            "delete from exclusions where id = ? returning id, library_id, pattern, exclusion_type, reason, created_at",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| ReencodeError::NotFound(format!("exclusion {id}")))?;
        Ok(rec.into())
    }

    /// All rules, ordered `(library_id NULLS FIRST, pattern)` as spec §4.3
    /// requires for deterministic first-match evaluation. SQLite predates
    /// `NULLS FIRST` support in its general grammar, so the boolean-cast idiom
    /// (`library_id is not null` sorts false-before-true) stands in for it.
    pub async fn list_exclusions_ordered(&self) -> Result<Vec<Exclusion>> {
        let rows = sqlx::query_as::<_, ExclusionRow>(
            "select id, library_id, pattern, exclusion_type, reason, created_at from exclusions
             order by (library_id is not null), library_id, pattern",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn list_exclusions(&self) -> Result<Vec<Exclusion>> {
        self.list_exclusions_ordered().await
    }
}

#[derive(sqlx::FromRow)]
struct ExclusionRow {
    id: i64,
    library_id: Option<i64>,
    pattern: String,
    exclusion_type: String,
    reason: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ExclusionRow> for Exclusion {
    fn from(r: ExclusionRow) -> Self {
        Exclusion {
            id: r.id,
            library_id: r.library_id,
            pattern: r.pattern,
            exclusion_type: ExclusionType::parse(&r.exclusion_type).unwrap_or(ExclusionType::Folder),
            reason: r.reason,
            created_at: r.created_at,
        }
    }
}
