use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::AppResult,
    models::{Candidate, TasteProfile, TmdbId},
    services::{stores::CatalogGateway, with_timeout},
};

/// How many candidates to fetch per requested pick
const POOL_MULTIPLIER: usize = 5;

/// Smallest candidate pool ever requested
const MIN_POOL_SIZE: usize = 40;

/// A candidate with its affinity score, before rationale is attached
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: u32,
}

/// Scores catalog candidates against a taste profile
#[derive(Clone)]
pub struct CandidateRanker {
    catalog: Arc<dyn CatalogGateway>,
    timeout: Duration,
}

impl CandidateRanker {
    pub fn new(catalog: Arc<dyn CatalogGateway>, timeout: Duration) -> Self {
        Self { catalog, timeout }
    }

    pub fn pool_size(limit: usize) -> usize {
        limit.saturating_mul(POOL_MULTIPLIER).max(MIN_POOL_SIZE)
    }

    /// Fetches a popularity-ordered pool and returns at most `limit` picks
    pub async fn rank(
        &self,
        profile: &TasteProfile,
        exclude: &HashSet<TmdbId>,
        limit: usize,
    ) -> AppResult<Vec<ScoredCandidate>> {
        let pool = with_timeout(
            self.timeout,
            "candidate pool",
            self.catalog
                .get_popular_candidates(exclude, Self::pool_size(limit)),
        )
        .await?;

        Ok(rank_candidates(profile, pool, exclude, limit))
    }
}

/// Orders a pool by score, then popularity, then tmdb id
///
/// With an empty profile every score is zero and the result is plain
/// popularity order.
pub fn rank_candidates(
    profile: &TasteProfile,
    pool: Vec<Candidate>,
    exclude: &HashSet<TmdbId>,
    limit: usize,
) -> Vec<ScoredCandidate> {
    let mut unique = HashSet::new();

    let mut scored: Vec<ScoredCandidate> = pool
        .into_iter()
        .filter(|c| !exclude.contains(&c.tmdb_id))
        .filter(|c| unique.insert(c.tmdb_id))
        .map(|candidate| ScoredCandidate {
            score: score(profile, &candidate),
            candidate,
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.candidate.popularity.total_cmp(&a.candidate.popularity))
            .then_with(|| a.candidate.tmdb_id.cmp(&b.candidate.tmdb_id))
    });
    scored.truncate(limit);

    scored
}

/// Sum of profile weights for the genres the candidate shares with it
pub fn score(profile: &TasteProfile, candidate: &Candidate) -> u32 {
    candidate
        .genres
        .iter()
        .map(|genre_id| profile.weight_of(*genre_id))
        .sum()
}
