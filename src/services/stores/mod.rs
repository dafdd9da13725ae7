//! Collaborator abstractions for the Smart Picks core
//!
//! The core never touches a database directly. History, catalog, entitlement
//! and rate-limit counters are reached through these traits so each backend
//! (Postgres, Redis, in-memory) can be swapped without touching the ranking
//! or quota logic.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::{
    error::AppResult,
    models::{ActorType, Candidate, GenreId, TmdbId},
};

pub mod cached_catalog;
pub mod memory;
pub mod postgres;
pub mod redis_store;

pub use cached_catalog::CachedCatalog;
pub use memory::{
    InMemoryCatalog, InMemoryHistoryStore, InMemoryPlanGateway, InMemoryRateLimitStore,
};
pub use postgres::{PgCatalogGateway, PgHistoryStore, PgPlanGateway, PgRateLimitStore};
pub use redis_store::RedisRateLimitStore;

/// Read-only access to what a user has watched and collected
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    /// Most recently watched movies first, at most `capacity` entries
    async fn get_watched_tmdb_ids(&self, user_id: &str, capacity: usize)
        -> AppResult<Vec<TmdbId>>;

    /// Every movie across all of the user's collections
    async fn get_collection_tmdb_ids(&self, user_id: &str) -> AppResult<HashSet<TmdbId>>;
}

/// Read-only access to catalog metadata
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogGateway: Send + Sync {
    async fn get_genres(&self, tmdb_id: TmdbId) -> AppResult<HashSet<GenreId>>;

    /// Display name for a genre, `None` when the catalog has no such genre
    async fn get_genre_name(&self, genre_id: GenreId) -> AppResult<Option<String>>;

    /// Candidates ordered by popularity descending, never containing `excluding`
    async fn get_popular_candidates(
        &self,
        excluding: &HashSet<TmdbId>,
        pool_size: usize,
    ) -> AppResult<Vec<Candidate>>;
}

/// Durable rate-limit counters shared by every service instance
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically increments the window's counter, creating it at 1 when
    /// absent, and returns the post-increment value
    async fn increment_and_get(
        &self,
        bucket: &str,
        actor_type: ActorType,
        actor_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Drops windows that ended before `before`, returning how many were removed
    async fn purge_expired(&self, before: DateTime<Utc>) -> AppResult<u64>;
}

/// Entitlement lookup owned by the billing side of the system
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PlanGateway: Send + Sync {
    async fn has_smart_picks(&self, user_id: &str) -> AppResult<bool>;
}
