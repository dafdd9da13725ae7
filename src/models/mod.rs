use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub mod rate_limit;
pub mod taste;

pub use rate_limit::{ActorType, RateLimitActor, RateLimitDecision, RateLimitWindow};
pub use taste::{GenreWeight, HistoryItem, HistoryOrigin, TasteProfile};

/// TMDB movie identifier
pub type TmdbId = i64;

/// TMDB genre identifier
pub type GenreId = i32;

/// A catalog item eligible for recommendation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub tmdb_id: TmdbId,
    pub genres: HashSet<GenreId>,
    pub popularity: f64,
    pub release_year: Option<i32>,
}

/// A ranked recommendation with its explanation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedPick {
    pub tmdb_id: TmdbId,
    pub score: u32,
    pub rationale: Vec<String>,
}

/// Options accepted by the Smart Picks endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmartPicksOptions {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub exclude_tmdb_ids: HashSet<TmdbId>,
}

/// Smart Picks result returned to the client
#[derive(Debug, Clone, Serialize)]
pub struct SmartPicksResponse {
    pub picks: Vec<RankedPick>,
    pub profile: TasteProfile,
    /// True when history or catalog data could not be loaded and the picks
    /// were computed from a reduced signal
    pub degraded: bool,
}
