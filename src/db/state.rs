//! Runtime state tracking: clean shutdown detection.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Check if the last shutdown was unclean
    ///
    /// Returns true if the previous process never called
    /// [`set_clean_shutdown`](Self::set_clean_shutdown), i.e. it crashed or was killed.
    pub async fn was_unclean_shutdown(&self) -> Result<bool> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM runtime_state WHERE key = 'clean_shutdown'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to check shutdown state: {}",
                        e
                    )))
                })?;

        // A fresh database has never run, so it did not crash either
        Ok(value.is_some_and(|v| v != "true"))
    }

    /// Mark that the application has started
    pub async fn set_clean_start(&self) -> Result<()> {
        self.set_clean_shutdown_flag(false).await
    }

    /// Mark that the application is shutting down cleanly
    pub async fn set_clean_shutdown(&self) -> Result<()> {
        self.set_clean_shutdown_flag(true).await
    }

    async fn set_clean_shutdown_flag(&self, clean: bool) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let value = if clean { "true" } else { "false" };
        sqlx::query(
            r#"
            INSERT INTO runtime_state (key, value, updated_at)
            VALUES ('clean_shutdown', ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record shutdown state: {}",
                e
            )))
        })?;

        Ok(())
    }
}
