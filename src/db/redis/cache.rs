use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{
    error::{AppError, AppResult},
    models::{GenreId, TmdbId},
};

/// Keys of catalog metadata cached in Redis
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    MovieGenres(TmdbId),
    GenreName(GenreId),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::MovieGenres(tmdb_id) => write!(f, "catalog:genres:{}", tmdb_id),
            CacheKey::GenreName(genre_id) => write!(f, "catalog:genre_name:{}", genre_id),
        }
    }
}

/// Opens (but does not connect) a Redis client from a URL
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    Ok(Client::open(redis_url)?)
}

/// A serialized entry waiting to be written
struct PendingWrite {
    key: String,
    json: String,
    ttl_secs: u64,
}

/// Scoped TTL cache for catalog metadata
///
/// Every entry carries its own TTL and is only invalidated by expiry. Nothing
/// request-specific (profiles, candidate pools, counters) goes through here.
/// Reads hit Redis directly; writes are queued and flushed by a writer task
/// so a slow Redis never holds up a response.
#[derive(Clone)]
pub struct Cache {
    conn: ConnectionManager,
    pending: mpsc::UnboundedSender<PendingWrite>,
}

/// Stops the writer task once queued writes are flushed
pub struct CacheWriterHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl CacheWriterHandle {
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Cache writer task panicked");
        }
    }
}

impl Cache {
    /// Connects to Redis and starts the writer task
    pub async fn connect(client: Client) -> AppResult<(Self, CacheWriterHandle)> {
        let conn = ConnectionManager::new(client).await?;
        let (pending, queue) = mpsc::unbounded_channel();
        let (stop, stopped) = oneshot::channel();

        let writer = CacheWriter {
            conn: conn.clone(),
            failed: 0,
        };
        let task = tokio::spawn(writer.run(queue, stopped));

        Ok((Self { conn, pending }, CacheWriterHandle { stop, task }))
    }

    /// Reads and deserializes an entry, `None` on a miss
    pub async fn get_from_cache<T: DeserializeOwned>(&self, key: &CacheKey) -> AppResult<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key.to_string()).await?;

        decode_entry(key, raw)
    }

    /// Queues an entry for writing and returns immediately
    ///
    /// Serialization or queueing failures are logged; the caller already has
    /// the value and loses nothing but a future cache hit.
    pub fn set_in_background<T: Serialize>(&self, key: &CacheKey, value: &T, ttl_secs: u64) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Could not serialize cache entry");
                return;
            }
        };

        let write = PendingWrite {
            key: key.to_string(),
            json,
            ttl_secs,
        };
        if self.pending.send(write).is_err() {
            tracing::warn!(key = %key, "Cache writer stopped, dropping write");
        }
    }
}

/// Outer `None` is a missing key. A stored JSON `null` decodes to a hit
/// holding `T`'s own empty value, so `Option` results are cached too.
fn decode_entry<T: DeserializeOwned>(key: &CacheKey, raw: Option<String>) -> AppResult<Option<T>> {
    raw.map(|json| {
        serde_json::from_str(&json)
            .map_err(|e| AppError::Internal(format!("Corrupt cache entry at {}: {}", key, e)))
    })
    .transpose()
}

struct CacheWriter {
    conn: ConnectionManager,
    failed: u64,
}

impl CacheWriter {
    async fn run(
        mut self,
        mut queue: mpsc::UnboundedReceiver<PendingWrite>,
        mut stopped: oneshot::Receiver<()>,
    ) {
        tracing::info!("Cache writer started");

        loop {
            tokio::select! {
                biased;
                _ = &mut stopped => break,
                next = queue.recv() => match next {
                    Some(write) => self.write(write).await,
                    None => break,
                },
            }
        }

        // Only what is already queued; live senders must not keep us waiting
        while let Ok(write) = queue.try_recv() {
            self.write(write).await;
        }

        tracing::info!(failed_writes = self.failed, "Cache writer stopped");
    }

    async fn write(&mut self, write: PendingWrite) {
        let result: redis::RedisResult<()> = self
            .conn
            .set_ex(&write.key, write.json, write.ttl_secs)
            .await;

        if let Err(e) = result {
            self.failed += 1;
            tracing::error!(
                key = %write.key,
                failed_writes = self.failed,
                error = %e,
                "Cache write failed"
            );
        }
    }
}
