use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::Client;

use crate::{error::AppResult, models::ActorType, services::stores::RateLimitStore};

/// Keys outlive their window slightly so a late reader still sees the final count
const EXPIRY_GRACE_SECS: i64 = 60;

/// Rate-limit counters in Redis
///
/// `INCR` and `EXPIREAT` run in one `MULTI` block. `INCR` on a missing key
/// creates it at 1, which gives the increment-or-create semantics, and the
/// expiry means old windows clean themselves up.
#[derive(Clone)]
pub struct RedisRateLimitStore {
    conn: ConnectionManager,
}

impl RedisRateLimitStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Opens the managed connection every increment is multiplexed over
    pub async fn connect(redis_client: Client) -> AppResult<Self> {
        Ok(Self::new(ConnectionManager::new(redis_client).await?))
    }
}

fn window_key(
    bucket: &str,
    actor_type: ActorType,
    actor_id: &str,
    window_start: DateTime<Utc>,
) -> String {
    format!(
        "rl:{}:{}:{}:{}",
        bucket,
        actor_type,
        actor_id,
        window_start.timestamp()
    )
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn increment_and_get(
        &self,
        bucket: &str,
        actor_type: ActorType,
        actor_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> AppResult<u64> {
        let key = window_key(bucket, actor_type, actor_id, window_start);
        let mut conn = self.conn.clone();

        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(&key, 1u64)
            .expire_at(&key, window_end.timestamp() + EXPIRY_GRACE_SECS)
            .ignore()
            .query_async(&mut conn)
            .await?;

        tracing::debug!(key = %key, count = count, "Rate limit counter incremented");

        Ok(count)
    }

    async fn purge_expired(&self, _before: DateTime<Utc>) -> AppResult<u64> {
        // Keys carry their own EXPIREAT
        Ok(0)
    }
}
