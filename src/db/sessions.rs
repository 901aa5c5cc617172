//! Provider sessions handed over by the login collaborator.

use crate::error::DatabaseError;
use crate::types::UserId;
use crate::{Error, Result};

use super::{Database, SessionRow};

impl Database {
    /// Insert or replace a user's provider session
    pub async fn upsert_session(
        &self,
        user_id: UserId,
        access_token: &str,
        activation_bytes: Option<&str>,
        expires_at: Option<i64>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO sessions (user_id, access_token, activation_bytes, expires_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                access_token = excluded.access_token,
                activation_bytes = excluded.activation_bytes,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(access_token)
        .bind(activation_bytes)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to store session: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get a user's provider session
    pub async fn get_session(&self, user_id: UserId) -> Result<Option<SessionRow>> {
        sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT user_id, access_token, activation_bytes, expires_at, updated_at
            FROM sessions
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get session: {}",
                e
            )))
        })
    }

    /// Remove a user's provider session
    pub async fn delete_session(&self, user_id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete session: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }
}
