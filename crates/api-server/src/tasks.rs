use common::proxy::ProxyTarget;
use faststr::FastStr;
use moka::future::Cache;
use std::{sync::Arc, time::Duration};

const TASK_TTL_SECS: u64 = 3600;

/// Everything a later stop call needs to address the upstream job that
/// produced a task id.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub target: ProxyTarget,
    pub user:   FastStr,
}

/// Task ids observed mid-stream, kept just long enough for a follow-up stop
/// call. Stale entries expire on their own instead of being purged.
#[derive(Clone)]
pub struct TaskRegistry(Arc<Cache<FastStr, TaskHandle>>);

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self(Arc::new(
            Cache::builder()
                .max_capacity(10_000)
                .time_to_live(Duration::from_secs(TASK_TTL_SECS))
                .build(),
        ))
    }

    pub async fn record(&self, task_id: &str, handle: TaskHandle) {
        self.0.insert(task_id.to_owned().into(), handle).await;
    }

    pub async fn lookup(&self, task_id: &str) -> Option<TaskHandle> {
        self.0.get(task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::proxy::AppVariant;

    fn handle(user: &str) -> TaskHandle {
        TaskHandle {
            target: ProxyTarget {
                api_base: "http://dify.local/v1".into(),
                api_key:  "app-key".into(),
                variant:  AppVariant::Agent,
            },
            user:   user.to_owned().into(),
        }
    }

    #[tokio::test]
    async fn test_lookup_before_record() {
        let registry = TaskRegistry::new();
        assert!(registry.lookup("t-1").await.is_none());
    }

    #[tokio::test]
    async fn test_lookup_is_repeatable() {
        let registry = TaskRegistry::new();
        registry.record("t-1", handle("alice")).await;

        // the handle stays addressable; stopping twice reaches the same job
        let first = registry.lookup("t-1").await.unwrap();
        let second = registry.lookup("t-1").await.unwrap();
        assert_eq!(first.user, "alice");
        assert_eq!(second.user, "alice");
    }

    #[tokio::test]
    async fn test_record_overwrites() {
        let registry = TaskRegistry::new();
        registry.record("t-1", handle("alice")).await;
        registry.record("t-1", handle("bob")).await;
        assert_eq!(registry.lookup("t-1").await.unwrap().user, "bob");
    }
}
