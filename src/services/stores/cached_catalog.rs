use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::AppResult,
    models::{Candidate, GenreId, TmdbId},
    services::stores::CatalogGateway,
};

/// Catalog decorator that caches genre metadata in Redis
///
/// Genre tags and genre names change rarely and are looked up once per
/// history item, so they go through the TTL cache. Candidate pools depend on
/// the caller's exclusions and are always read from the inner gateway.
#[derive(Clone)]
pub struct CachedCatalog {
    inner: Arc<dyn CatalogGateway>,
    cache: Cache,
    ttl_secs: u64,
}

impl CachedCatalog {
    pub fn new(inner: Arc<dyn CatalogGateway>, cache: Cache, ttl_secs: u64) -> Self {
        Self {
            inner,
            cache,
            ttl_secs,
        }
    }
}

#[async_trait]
impl CatalogGateway for CachedCatalog {
    async fn get_genres(&self, tmdb_id: TmdbId) -> AppResult<HashSet<GenreId>> {
        let key = CacheKey::MovieGenres(tmdb_id);
        cached!(self.cache, key, self.ttl_secs, self.inner.get_genres(tmdb_id))
    }

    async fn get_genre_name(&self, genre_id: GenreId) -> AppResult<Option<String>> {
        let key = CacheKey::GenreName(genre_id);
        cached!(
            self.cache,
            key,
            self.ttl_secs,
            self.inner.get_genre_name(genre_id)
        )
    }

    async fn get_popular_candidates(
        &self,
        excluding: &HashSet<TmdbId>,
        pool_size: usize,
    ) -> AppResult<Vec<Candidate>> {
        self.inner.get_popular_candidates(excluding, pool_size).await
    }
}
