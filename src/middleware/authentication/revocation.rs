use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

const KEY_PREFIX: &str = "blacklist:";

/// Tokens invalidated before their natural expiry. Entries carry a TTL, so
/// the set only ever holds tokens that would otherwise still be valid.
#[async_trait]
pub trait RevocationSet: Send + Sync {
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), String>;
    async fn is_revoked(&self, token: &str) -> Result<bool, String>;
}

#[derive(Clone)]
pub struct RedisRevocationSet {
    connection: Arc<Mutex<ConnectionManager>>,
}

impl RedisRevocationSet {
    pub async fn new(redis_url: &str) -> Result<Self, String> {
        let client = redis::Client::open(redis_url)
            .map_err(|err| format!("Invalid Redis URL for revocation set: {}", err))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|err| format!("Redis unavailable: {}", err))?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }
}

#[async_trait]
impl RevocationSet for RedisRevocationSet {
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), String> {
        let key = format!("{KEY_PREFIX}{token}");
        let mut conn = self.connection.lock().await;
        let (): () = conn
            .set_ex(key, "revoked", ttl.as_secs().max(1))
            .await
            .map_err(|err| {
                tracing::error!("Redis SET failed: {:?}", err);
                format!("Redis SET failed: {}", err)
            })?;
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool, String> {
        let key = format!("{KEY_PREFIX}{token}");
        let mut conn = self.connection.lock().await;
        conn.exists(key).await.map_err(|err| {
            tracing::error!("Redis EXISTS failed: {:?}", err);
            format!("Redis EXISTS failed: {}", err)
        })
    }
}

/// Process-local fallback used when no Redis is configured.
#[derive(Default)]
pub struct InMemoryRevocationSet {
    entries: RwLock<HashMap<String, Instant>>,
}

impl InMemoryRevocationSet {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevocationSet for InMemoryRevocationSet {
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), String> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, expires_at| *expires_at > now);
        entries.insert(token.to_string(), now + ttl.max(Duration::from_secs(1)));
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool, String> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(token)
            .map_or(false, |expires_at| *expires_at > Instant::now()))
    }
}
