use crate::applications::Application;
use crate::cache::KVCache;
use faststr::FastStr;
use moka::future::Cache;
use std::{sync::Arc, time::Duration};

/// Applications keyed by name. Chat traffic resolves its target on every
/// request, so hits here skip the database entirely.
#[derive(Clone)]
pub struct AppCache(Arc<Cache<FastStr, Application>>);

impl Default for AppCache {
    fn default() -> Self {
        Self::new()
    }
}

impl AppCache {
    pub fn new() -> Self {
        Self(Arc::new(
            Cache::builder()
                .max_capacity(500)
                .time_to_live(Duration::from_secs(7200))
                .build(),
        ))
    }
}

impl KVCache<Application> for AppCache {
    fn init() -> Self {
        Self::new()
    }

    async fn get(&self, k: &str) -> Option<Application> {
        self.0.get(k).await
    }

    async fn invalidate(&self, k: &str) {
        self.0.invalidate(k).await;
    }

    async fn set(&self, key: &str, value: Application) {
        self.0.insert(key.to_owned().into(), value).await;
    }
}
