//! Per-user provider sessions
//!
//! The login exchange with the content provider happens outside this crate.
//! Whatever performs it hands the resulting token (and, for legacy containers,
//! the account activation bytes) over through [`Database::upsert_session`];
//! workers only ever read it through a [`SessionProvider`].

use crate::db::{Database, SessionRow};
use crate::error::{Error, Result};
use crate::types::UserId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Authenticated provider session for one user (read-only to workers)
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderSession {
    /// Owning user
    pub user_id: UserId,
    /// Bearer token for the provider API
    pub access_token: String,
    /// Account activation bytes (hex), needed for legacy containers
    pub activation_bytes: Option<String>,
}

impl std::fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSession")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .field(
                "activation_bytes",
                &self.activation_bytes.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Session hand-off payload from the login collaborator
#[derive(Clone, Deserialize, Serialize, ToSchema)]
pub struct SessionUpdate {
    /// Bearer token for the provider API
    pub access_token: String,
    /// Account activation bytes (8 hex digits)
    #[serde(default)]
    pub activation_bytes: Option<String>,
    /// Unix timestamp after which the token is invalid
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl SessionUpdate {
    /// Reject obviously malformed hand-offs before they reach the store
    pub fn validate(&self) -> Result<()> {
        if self.access_token.trim().is_empty() {
            return Err(Error::Config {
                message: "access_token must not be empty".to_string(),
                key: Some("access_token".to_string()),
            });
        }
        if let Some(bytes) = &self.activation_bytes
            && (bytes.len() != 8 || !bytes.chars().all(|c| c.is_ascii_hexdigit()))
        {
            return Err(Error::Config {
                message: "activation_bytes must be 8 hex digits".to_string(),
                key: Some("activation_bytes".to_string()),
            });
        }
        Ok(())
    }
}

/// Source of provider sessions for workers
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Current session for `user_id`.
    ///
    /// Fails with [`Error::Auth`] when there is no usable session, which fails
    /// the job without retrying.
    async fn session(&self, user_id: UserId) -> Result<ProviderSession>;
}

/// [`SessionProvider`] backed by the `sessions` table
pub struct DatabaseSessions {
    db: Arc<Database>,
}

impl DatabaseSessions {
    /// Read sessions from `db`
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn usable(row: SessionRow, now: i64) -> Result<ProviderSession> {
    if row.expires_at.is_some_and(|expires| expires <= now) {
        return Err(Error::Auth(format!(
            "provider session for user {} expired; log in again",
            row.user_id
        )));
    }
    Ok(ProviderSession {
        user_id: UserId(row.user_id),
        access_token: row.access_token,
        activation_bytes: row.activation_bytes,
    })
}

#[async_trait]
impl SessionProvider for DatabaseSessions {
    async fn session(&self, user_id: UserId) -> Result<ProviderSession> {
        let row = self.db.get_session(user_id).await?.ok_or_else(|| {
            Error::Auth(format!(
                "no provider session for user {}; log in first",
                user_id
            ))
        })?;
        usable(row, chrono::Utc::now().timestamp())
    }
}
