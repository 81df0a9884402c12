use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::dataset::Dataset;

/// In-memory datasets keyed by id. Clones share the same map.
///
/// Nothing is persisted: datasets live until they are replaced, removed or
/// the process exits.
#[derive(Debug, Clone, Default)]
pub struct DatasetStore {
    inner: Arc<RwLock<HashMap<String, Arc<Dataset>>>>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a dataset, replacing any previous one with the same id.
    pub async fn put(&self, id: impl Into<String>, dataset: Dataset) {
        let id = id.into();
        log::debug!("storing dataset {} ({} rows)", id, dataset.rows.len());
        self.inner.write().await.insert(id, Arc::new(dataset));
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Dataset>> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<Dataset>> {
        self.inner.write().await.remove(id)
    }

    /// Ids of all stored datasets, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
