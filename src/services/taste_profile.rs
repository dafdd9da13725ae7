use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::{
    error::{AppError, AppResult},
    models::{GenreId, GenreWeight, HistoryItem, HistoryOrigin, TasteProfile, TmdbId},
    services::{
        is_upstream_failure,
        stores::{CatalogGateway, HistoryStore},
        with_timeout,
    },
};

/// How many watched-log entries feed a profile
pub const WATCHED_HISTORY_CAP: usize = 300;

/// How many genres a profile keeps
pub const TOP_GENRES: usize = 8;

/// Genre-tag lookups in flight at once for one profile
///
/// Keeps a long history from taking over the shared database pool.
pub const GENRE_LOOKUP_CONCURRENCY: usize = 8;

/// A profile together with what was needed to compute it
#[derive(Debug, Clone, Default)]
pub struct TasteSignal {
    pub profile: TasteProfile,
    /// Every movie the user has watched or collected
    pub seen: HashSet<TmdbId>,
    /// History or genre data was unavailable and the profile is empty because of it
    pub degraded: bool,
}

/// Turns a user's watch log and collections into a ranked genre signal
#[derive(Clone)]
pub struct TasteProfileBuilder {
    history: Arc<dyn HistoryStore>,
    catalog: Arc<dyn CatalogGateway>,
    timeout: Duration,
}

impl TasteProfileBuilder {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        catalog: Arc<dyn CatalogGateway>,
        timeout: Duration,
    ) -> Self {
        Self {
            history,
            catalog,
            timeout,
        }
    }

    pub async fn build(&self, user_id: &str) -> AppResult<TasteProfile> {
        Ok(self.build_signal(user_id).await?.profile)
    }

    /// Builds the profile and returns the user's seen set alongside it
    ///
    /// Upstream failures and timeouts produce an empty, degraded profile rather
    /// than a partial one. Anything else aborts.
    pub async fn build_signal(&self, user_id: &str) -> AppResult<TasteSignal> {
        let items = match self.load_history(user_id).await {
            Ok(items) => items,
            Err(e) if is_upstream_failure(&e) => {
                tracing::warn!(user_id = %user_id, error = %e, "History unavailable, using cold start");
                return Ok(TasteSignal {
                    degraded: true,
                    ..TasteSignal::default()
                });
            }
            Err(e) => return Err(e),
        };

        let seen: HashSet<TmdbId> = items.iter().map(|item| item.tmdb_id).collect();
        let profile = rank_genres(&items, seen.len());

        tracing::debug!(
            user_id = %user_id,
            sample_size = profile.sample_size,
            top_genres = profile.top_genres.len(),
            "Taste profile built"
        );

        Ok(TasteSignal {
            profile,
            seen,
            degraded: false,
        })
    }

    /// One item per distinct movie per origin, with genre tags attached
    async fn load_history(&self, user_id: &str) -> AppResult<Vec<HistoryItem>> {
        let watched = with_timeout(
            self.timeout,
            "watched history",
            self.history.get_watched_tmdb_ids(user_id, WATCHED_HISTORY_CAP),
        )
        .await?;
        let collected = with_timeout(
            self.timeout,
            "collections",
            self.history.get_collection_tmdb_ids(user_id),
        )
        .await?;

        let mut watched_distinct = Vec::with_capacity(watched.len());
        let mut watched_seen = HashSet::new();
        for tmdb_id in watched {
            if watched_seen.insert(tmdb_id) {
                watched_distinct.push(tmdb_id);
            }
        }

        let mut collected: Vec<TmdbId> = collected.into_iter().collect();
        collected.sort_unstable();

        let mut lookup: Vec<TmdbId> = watched_distinct.iter().chain(&collected).copied().collect();
        lookup.sort_unstable();
        lookup.dedup();

        if lookup.is_empty() {
            return Ok(Vec::new());
        }

        let genres = with_timeout(self.timeout, "genre tags", self.fetch_genres(lookup)).await?;
        let item = |tmdb_id: TmdbId, origin: HistoryOrigin| HistoryItem {
            tmdb_id,
            genres: genres.get(&tmdb_id).cloned().unwrap_or_default(),
            origin,
        };

        let items = watched_distinct
            .into_iter()
            .map(|tmdb_id| item(tmdb_id, HistoryOrigin::Watched))
            .chain(
                collected
                    .into_iter()
                    .map(|tmdb_id| item(tmdb_id, HistoryOrigin::Collected)),
            )
            .collect();

        Ok(items)
    }

    /// Looks up genre tags for each movie once, at most
    /// [`GENRE_LOOKUP_CONCURRENCY`] at a time
    async fn fetch_genres(
        &self,
        tmdb_ids: Vec<TmdbId>,
    ) -> AppResult<HashMap<TmdbId, HashSet<GenreId>>> {
        let permits = Arc::new(Semaphore::new(GENRE_LOOKUP_CONCURRENCY));
        let mut tasks = JoinSet::new();

        for tmdb_id in tmdb_ids {
            let catalog = self.catalog.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| AppError::Internal(e.to_string()))?;
                let genres = catalog.get_genres(tmdb_id).await?;
                Ok::<_, AppError>((tmdb_id, genres))
            });
        }

        let mut genres = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (tmdb_id, tags) = joined.map_err(|e| AppError::Internal(e.to_string()))??;
            genres.insert(tmdb_id, tags);
        }

        Ok(genres)
    }
}

/// Counts one vote per item per genre and keeps the strongest genres
///
/// Ties go to the lower genre id.
fn rank_genres(items: &[HistoryItem], sample_size: usize) -> TasteProfile {
    let mut votes: HashMap<GenreId, u32> = HashMap::new();
    for item in items {
        for genre_id in &item.genres {
            *votes.entry(*genre_id).or_insert(0) += 1;
        }
    }

    let mut top_genres: Vec<GenreWeight> = votes
        .into_iter()
        .map(|(genre_id, weight)| GenreWeight { genre_id, weight })
        .collect();
    top_genres.sort_by(|a, b| {
        b.weight
            .cmp(&a.weight)
            .then_with(|| a.genre_id.cmp(&b.genre_id))
    });
    top_genres.truncate(TOP_GENRES);

    TasteProfile {
        top_genres,
        sample_size,
    }
}
