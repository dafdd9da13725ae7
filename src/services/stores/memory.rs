//! In-process implementations of the collaborator traits
//!
//! Used by the test suites and for running the API locally without a
//! database. The rate-limit store here is only consistent within one
//! process; deployments with more than one instance use Postgres or Redis.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::{
    error::{AppError, AppResult},
    models::{ActorType, Candidate, GenreId, TmdbId},
    services::stores::{CatalogGateway, HistoryStore, PlanGateway, RateLimitStore},
};

#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    /// Most recent first
    watched: HashMap<String, Vec<TmdbId>>,
    collections: HashMap<String, HashSet<TmdbId>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_watched(mut self, user_id: &str, tmdb_ids: Vec<TmdbId>) -> Self {
        self.watched.insert(user_id.to_string(), tmdb_ids);
        self
    }

    pub fn with_collection(mut self, user_id: &str, tmdb_ids: &[TmdbId]) -> Self {
        self.collections
            .entry(user_id.to_string())
            .or_default()
            .extend(tmdb_ids.iter().copied());
        self
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn get_watched_tmdb_ids(
        &self,
        user_id: &str,
        capacity: usize,
    ) -> AppResult<Vec<TmdbId>> {
        Ok(self
            .watched
            .get(user_id)
            .map(|ids| ids.iter().take(capacity).copied().collect())
            .unwrap_or_default())
    }

    async fn get_collection_tmdb_ids(&self, user_id: &str) -> AppResult<HashSet<TmdbId>> {
        Ok(self.collections.get(user_id).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    movies: HashMap<TmdbId, Candidate>,
    genre_names: HashMap<GenreId, String>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_genre(mut self, genre_id: GenreId, name: &str) -> Self {
        self.genre_names.insert(genre_id, name.to_string());
        self
    }

    pub fn with_movie(mut self, tmdb_id: TmdbId, genres: &[GenreId], popularity: f64) -> Self {
        self.movies.insert(
            tmdb_id,
            Candidate {
                tmdb_id,
                genres: genres.iter().copied().collect(),
                popularity,
                release_year: None,
            },
        );
        self
    }
}

#[async_trait]
impl CatalogGateway for InMemoryCatalog {
    async fn get_genres(&self, tmdb_id: TmdbId) -> AppResult<HashSet<GenreId>> {
        Ok(self
            .movies
            .get(&tmdb_id)
            .map(|m| m.genres.clone())
            .unwrap_or_default())
    }

    async fn get_genre_name(&self, genre_id: GenreId) -> AppResult<Option<String>> {
        Ok(self.genre_names.get(&genre_id).cloned())
    }

    async fn get_popular_candidates(
        &self,
        excluding: &HashSet<TmdbId>,
        pool_size: usize,
    ) -> AppResult<Vec<Candidate>> {
        let mut pool: Vec<Candidate> = self
            .movies
            .values()
            .filter(|m| !excluding.contains(&m.tmdb_id))
            .cloned()
            .collect();

        pool.sort_by(|a, b| {
            b.popularity
                .total_cmp(&a.popularity)
                .then_with(|| a.tmdb_id.cmp(&b.tmdb_id))
        });
        pool.truncate(pool_size);

        Ok(pool)
    }
}

type WindowKey = (String, ActorType, String, DateTime<Utc>);

#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    /// Key → (count, window end)
    windows: Mutex<HashMap<WindowKey, (u64, DateTime<Utc>)>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count of a window, zero when it was never charged
    pub fn count(
        &self,
        bucket: &str,
        actor_type: ActorType,
        actor_id: &str,
        window_start: DateTime<Utc>,
    ) -> u64 {
        let windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows
            .get(&(
                bucket.to_string(),
                actor_type,
                actor_id.to_string(),
                window_start,
            ))
            .map(|(count, _)| *count)
            .unwrap_or(0)
    }

    pub fn window_count(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn increment_and_get(
        &self,
        bucket: &str,
        actor_type: ActorType,
        actor_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|e| AppError::Internal(format!("Rate limit store poisoned: {}", e)))?;

        let entry = windows
            .entry((
                bucket.to_string(),
                actor_type,
                actor_id.to_string(),
                window_start,
            ))
            .or_insert((0, window_end));
        entry.0 += 1;

        Ok(entry.0)
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|e| AppError::Internal(format!("Rate limit store poisoned: {}", e)))?;

        let initial = windows.len();
        windows.retain(|_, (_, window_end)| *window_end >= before);

        Ok((initial - windows.len()) as u64)
    }
}

/// Entitlements held in memory
#[derive(Debug, Default)]
pub struct InMemoryPlanGateway {
    entitled: HashSet<String>,
}

impl InMemoryPlanGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entitled(mut self, user_id: &str) -> Self {
        self.entitled.insert(user_id.to_string());
        self
    }
}

#[async_trait]
impl PlanGateway for InMemoryPlanGateway {
    async fn has_smart_picks(&self, user_id: &str) -> AppResult<bool> {
        Ok(self.entitled.contains(user_id))
    }
}
