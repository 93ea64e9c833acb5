use faststr::FastStr;
use moka::future::Cache;
use rand::Rng;
use rand::distr::Alphanumeric;
use std::{sync::Arc, time::Duration};

const TOKEN_LEN: usize = 48;
const SESSION_TTL_SECS: u64 = 8 * 3600;

#[derive(Debug, Clone)]
pub struct Session {
    pub username:     FastStr,
    pub is_superuser: bool,
}

/// Opaque bearer tokens mapped to logged-in members. Tokens expire on their
/// own; logout just invalidates early.
#[derive(Clone)]
pub struct SessionStore(Arc<Cache<FastStr, Session>>);

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self(Arc::new(
            Cache::builder()
                .max_capacity(10_000)
                .time_to_live(Duration::from_secs(SESSION_TTL_SECS))
                .build(),
        ))
    }

    pub async fn issue(&self, username: FastStr, is_superuser: bool) -> FastStr {
        let token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();
        let token = FastStr::from(token);
        self.0.insert(
            token.clone(),
            Session {
                username,
                is_superuser,
            },
        )
        .await;
        token
    }

    pub async fn get(&self, token: &str) -> Option<Session> {
        self.0.get(token).await
    }

    pub async fn revoke(&self, token: &str) {
        self.0.invalidate(token).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_issue_and_revoke() {
        let store = SessionStore::new();
        let token = store.issue("alice".into(), false).await;
        assert_eq!(token.len(), TOKEN_LEN);

        let session = store.get(&token).await.unwrap();
        assert_eq!(session.username, "alice");
        assert!(!session.is_superuser);

        store.revoke(&token).await;
        assert!(store.get(&token).await.is_none());
    }

    #[tokio::test]
    async fn test_tokens_are_unique() {
        let store = SessionStore::new();
        let a = store.issue("alice".into(), false).await;
        let b = store.issue("alice".into(), false).await;
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let store = SessionStore::new();
        assert!(store.get("nope").await.is_none());
    }
}
