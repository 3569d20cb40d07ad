//! Latest-snapshot cache: one writer (the sampler), any number of readers.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::snapshot::SystemSnapshot;

/// A latest-value cell, not a queue. Overwriting the previous snapshot is the
/// intended behavior; readers always see a whole snapshot or none at all.
#[derive(Clone, Default)]
pub struct SnapshotCache {
    inner: Arc<RwLock<Option<SystemSnapshot>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn store(&self, snapshot: SystemSnapshot) {
        *self.inner.write().await = Some(snapshot);
    }

    /// None until the first successful sample lands.
    pub async fn latest(&self) -> Option<SystemSnapshot> {
        self.inner.read().await.clone()
    }
}
