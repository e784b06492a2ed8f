use super::Store;
use crate::error::Result;

/// Raw key/value access backing the `Setting` entity (spec §3). Typed
/// validation lives in `crate::settings`; this layer only persists strings.
impl Store {
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("select value from settings where key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(|(v,)| v))
    }

    pub async fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "insert into settings (key, value) values (?, ?)
             on conflict(key) do update set value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn list_raw(&self) -> Result<Vec<(String, String)>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("select key, value from settings").fetch_all(self.pool()).await?;
        Ok(rows)
    }
}
