//! Shared agent state. Constructed once in `main` and passed to the router,
//! the sampler, and the WebSocket handlers; there are no process globals.

use std::sync::Arc;

use crate::cache::SnapshotCache;
use crate::hub::BroadcastHub;
use crate::provider::MetricsProvider;

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn MetricsProvider>,
    pub cache: SnapshotCache,
    pub hub: Arc<BroadcastHub>,
}

impl AppState {
    pub fn new(provider: Arc<dyn MetricsProvider>) -> Self {
        Self {
            provider,
            cache: SnapshotCache::new(),
            hub: Arc::new(BroadcastHub::new()),
        }
    }
}
