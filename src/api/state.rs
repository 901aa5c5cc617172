//! Application state for the API server

use crate::{AudiobookDownloader, Config};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
#[derive(Clone)]
pub struct AppState {
    /// The job pipeline all handlers act on
    pub downloader: Arc<AudiobookDownloader>,

    /// Configuration the router was built with
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(downloader: Arc<AudiobookDownloader>, config: Arc<Config>) -> Self {
        Self { downloader, config }
    }
}
