use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{GenreId, TmdbId};

/// Where a history item came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOrigin {
    Watched,
    Collected,
}

/// One movie contributing to a taste profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryItem {
    pub tmdb_id: TmdbId,
    pub genres: HashSet<GenreId>,
    pub origin: HistoryOrigin,
}

/// A genre and how many history items voted for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreWeight {
    pub genre_id: GenreId,
    pub weight: u32,
}

/// Ranked genre-affinity signal, most significant genre first
///
/// An empty profile is the cold-start state, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TasteProfile {
    pub top_genres: Vec<GenreWeight>,
    pub sample_size: usize,
}

impl TasteProfile {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.top_genres.is_empty()
    }

    /// Weight of a genre, zero when absent
    pub fn weight_of(&self, genre_id: GenreId) -> u32 {
        self.top_genres
            .iter()
            .find(|g| g.genre_id == genre_id)
            .map(|g| g.weight)
            .unwrap_or(0)
    }

    pub fn genre_ids(&self) -> impl Iterator<Item = GenreId> + '_ {
        self.top_genres.iter().map(|g| g.genre_id)
    }
}
