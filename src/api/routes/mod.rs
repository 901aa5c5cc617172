//! Route handlers for the REST API
//!
//! Handlers are organized by resource:
//! - [`jobs`] - Job submission, listing, lookup and deletion
//! - [`books`] - Completed books and archive retrieval
//! - [`session`] - Provider session hand-off
//! - [`system`] - Health, capabilities, events, OpenAPI

use serde::{Deserialize, Serialize};

mod books;
mod jobs;
mod session;
mod system;

pub use books::*;
pub use jobs::*;
pub use session::*;
pub use system::*;

/// Request body for POST /users/:user_id/jobs
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SubmitJobsRequest {
    /// Books to enqueue, in submission order
    pub books: Vec<crate::types::BookRequest>,
}

/// Query parameters for GET /events
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
pub struct EventsQuery {
    /// Only stream events of this user (process-wide events are always sent)
    pub user_id: Option<i64>,
}
