use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::redirect::Resolver;
use crate::service::ShortenerService;
use crate::store::RecordStore;
use crate::sync::SyncStatus;

/// Application state shared across all request handlers
///
/// Handlers only ever touch the record store through the services here;
/// the synchronizer is visible solely through its status.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub shortener: ShortenerService,
    pub resolver: Resolver,
    /// `None` when the mirror is disabled
    pub sync_status: Option<Arc<SyncStatus>>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, base_url: impl Into<String>) -> Self {
        Self {
            shortener: ShortenerService::new(Arc::clone(&store), base_url),
            resolver: Resolver::new(Arc::clone(&store)),
            store,
            sync_status: None,
            started_at: Utc::now(),
        }
    }

    pub fn with_sync_status(mut self, status: Arc<SyncStatus>) -> Self {
        self.sync_status = Some(status);
        self
    }
}
