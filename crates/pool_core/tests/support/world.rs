use std::sync::Arc;

use pool_core::cache::KvCache;
use pool_core::coordinator::{Coordinator, CoordinatorConfig};
use pool_core::domain::Request;
use pool_core::matching::{MatchingConfig, MatchingEngine};
use pool_core::pricing::PricingConfig;
use pool_core::store::Store;
use pool_core::test_helpers::{MemoryCache, MemoryStore, RequestBuilder};

/// One wired-up coordinator over in-memory collaborators, with direct
/// handles on the doubles for seeding and inspection.
pub struct TestWorld {
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub coordinator: Coordinator,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::with_config(CoordinatorConfig::default())
    }

    pub fn with_config(config: CoordinatorConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let engine = MatchingEngine::new(MatchingConfig::default(), PricingConfig::default());
        let coordinator = Coordinator::new(
            store.clone() as Arc<dyn Store>,
            cache.clone() as Arc<dyn KvCache>,
            engine,
            config,
        );
        Self {
            store,
            cache,
            coordinator,
        }
    }

    /// Submit a request built from the given fixture through the full
    /// validation + store path.
    pub async fn submit(&self, builder: RequestBuilder) -> Request {
        self.coordinator
            .submit_request(builder.build_new())
            .await
            .expect("request submission")
    }
}
