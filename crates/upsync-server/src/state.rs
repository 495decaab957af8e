//! Shared application state for request handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use upsync_catalog::{Approvals, CatalogGuard, SyncEngine};
use upsync_core::ContentSource;

use crate::routes::content::ContentMap;

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The sync decision engine.
    pub engine: Arc<SyncEngine>,
    /// The catalog guard, shared with the engine.
    pub guard: Arc<CatalogGuard>,
    /// Approval sets, shared with the engine.
    pub approvals: Arc<Approvals>,
    /// The content store, when one is configured.
    pub content: Option<Arc<dyn ContentSource>>,
    /// Content URL key map, built at startup from the installed catalog.
    pub content_map: Arc<ContentMap>,
    /// `GetConfig` property pass-through document.
    pub properties: Arc<serde_json::Value>,
    /// Server start time, reported as the config `LastChange`.
    pub started_at: DateTime<Utc>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("content", &self.content.is_some())
            .field("content_map", &self.content_map.len())
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Creates application state over the given guard and stores.
    ///
    /// The content key map is derived from the catalog installed at this
    /// point; later catalog swaps do not rebuild it.
    #[must_use]
    pub fn new(
        guard: Arc<CatalogGuard>,
        approvals: Arc<Approvals>,
        content: Option<Arc<dyn ContentSource>>,
        content_http_root: Option<String>,
        properties: serde_json::Value,
    ) -> Self {
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&guard),
            Arc::clone(&approvals),
            content_http_root,
        ));
        let content_map = Arc::new(
            guard
                .current()
                .map(|catalog| ContentMap::from_catalog(&catalog))
                .unwrap_or_default(),
        );
        Self {
            engine,
            guard,
            approvals,
            content,
            content_map,
            properties: Arc::new(properties),
            started_at: Utc::now(),
        }
    }
}
