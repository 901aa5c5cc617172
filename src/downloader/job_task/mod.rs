//! Job task execution -- one job's pipeline from download to registered book.
//!
//! Split into focused submodules:
//! - [`context`] - Shared per-job state, stage transitions, failure recording
//! - [`orchestration`] - Top-level job lifecycle (download → plan → convert → package)
//! - [`progress`] - Maps stage-local progress into the job's 0–100 scale

mod context;
mod orchestration;
mod progress;

pub(crate) use context::JobTaskContext;
pub(crate) use orchestration::run_job_task;
