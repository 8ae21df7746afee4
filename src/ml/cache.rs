use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::store::{FileStamp, ModelArtifact, ModelStore};
use crate::error::{ForecastError, Result};

struct CachedModel {
    stamp: FileStamp,
    artifact: Arc<ModelArtifact>,
}

/// Loaded models keyed by symbol. Entries are revalidated against the file
/// on every lookup, so a retrained model is picked up without a restart.
pub struct ModelCache {
    store: ModelStore,
    entries: DashMap<String, CachedModel>,
    enabled: bool,
}

impl ModelCache {
    pub fn new(store: ModelStore, enabled: bool) -> Self {
        Self {
            store,
            entries: DashMap::new(),
            enabled,
        }
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub async fn get(&self, symbol: &str) -> Result<Arc<ModelArtifact>> {
        let Some(stamp) = self.store.stamp(symbol).await? else {
            self.entries.remove(symbol);
            return Err(ForecastError::ModelNotFound {
                symbol: symbol.to_string(),
            });
        };

        if !self.enabled {
            return Ok(Arc::new(self.store.load(symbol).await?));
        }

        if let Some(entry) = self.entries.get(symbol) {
            if entry.stamp == stamp {
                return Ok(entry.artifact.clone());
            }
        }

        debug!("Loading model for {} into cache", symbol);
        let artifact = Arc::new(self.store.load(symbol).await?);
        self.entries.insert(
            symbol.to_string(),
            CachedModel {
                stamp,
                artifact: artifact.clone(),
            },
        );
        Ok(artifact)
    }

    pub fn invalidate(&self, symbol: &str) {
        if self.entries.remove(symbol).is_some() {
            debug!("Invalidated cached model for {}", symbol);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::models::LstmNetwork;
    use crate::ml::scaler::MinMaxScaler;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn artifact(symbol: &str, seed: u64) -> ModelArtifact {
        let mut rng = StdRng::seed_from_u64(seed);
        let network = LstmNetwork::new(4, 2, 3, &mut rng);
        ModelArtifact::new(symbol, network, MinMaxScaler { min: 1.0, max: 2.0 })
    }

    #[tokio::test]
    async fn repeated_lookups_share_one_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(ModelStore::new(dir.path()), true);
        cache.store().save(&artifact("AAPL", 1)).await.unwrap();

        let first = cache.get("AAPL").await.unwrap();
        let second = cache.get("AAPL").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn rewritten_file_is_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(ModelStore::new(dir.path()), true);
        cache.store().save(&artifact("AAPL", 1)).await.unwrap();
        let first = cache.get("AAPL").await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let retrained = artifact("AAPL", 2).with_loss(0.5);
        cache.store().save(&retrained).await.unwrap();

        let second = cache.get("AAPL").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.final_loss, Some(0.5));
    }

    #[tokio::test]
    async fn deleted_file_evicts_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(ModelStore::new(dir.path()), true);
        cache.store().save(&artifact("AAPL", 1)).await.unwrap();
        cache.get("AAPL").await.unwrap();

        std::fs::remove_file(cache.store().path_for("AAPL")).unwrap();
        let err = cache.get("AAPL").await.unwrap_err();
        assert!(matches!(err, ForecastError::ModelNotFound { .. }));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn disabled_cache_loads_every_time() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(ModelStore::new(dir.path()), false);
        cache.store().save(&artifact("AAPL", 1)).await.unwrap();

        let first = cache.get("AAPL").await.unwrap();
        let second = cache.get("AAPL").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(cache.is_empty());
    }
}
