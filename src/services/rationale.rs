use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::{
    models::{Candidate, GenreId, TasteProfile},
    services::stores::CatalogGateway,
};

/// Shown when there is no taste signal to point at
pub const GENERIC_RATIONALE: &str = "Trending with the community";

/// At most this many "Because you love" lines per pick
const MAX_REASONS: usize = 2;

/// Genre id → display name, resolved once per request
pub type GenreNames = HashMap<GenreId, String>;

/// Explains why a candidate was picked
#[derive(Clone)]
pub struct RationaleGenerator {
    catalog: Arc<dyn CatalogGateway>,
    timeout: Duration,
}

impl RationaleGenerator {
    pub fn new(catalog: Arc<dyn CatalogGateway>, timeout: Duration) -> Self {
        Self { catalog, timeout }
    }

    /// Resolves display names for the profile's genres
    ///
    /// All lookups share one deadline. Names resolved before it passes are
    /// kept; lookups that fail, come back empty or miss the deadline are left
    /// out and picks that need them fall back to the generic line.
    pub async fn genre_names(&self, profile: &TasteProfile) -> GenreNames {
        let deadline = Instant::now() + self.timeout;
        let mut names = GenreNames::new();

        for genre_id in profile.genre_ids() {
            let lookup = tokio::time::timeout_at(deadline, self.catalog.get_genre_name(genre_id));
            match lookup.await {
                Ok(Ok(Some(name))) => {
                    names.insert(genre_id, name);
                }
                Ok(Ok(None)) => {
                    tracing::warn!(genre_id, "Genre missing from catalog");
                }
                Ok(Err(e)) => {
                    tracing::warn!(genre_id, error = %e, "Genre name lookup failed");
                }
                Err(_) => {
                    tracing::warn!(
                        resolved = names.len(),
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Genre name lookups timed out"
                    );
                    break;
                }
            }
        }

        names
    }

    /// Zero to two human-readable reasons, deterministic for a given input
    pub fn explain(
        profile: &TasteProfile,
        candidate: &Candidate,
        names: &GenreNames,
    ) -> Vec<String> {
        if profile.is_empty() {
            return vec![GENERIC_RATIONALE.to_string()];
        }

        let shared: Vec<GenreId> = profile
            .genre_ids()
            .filter(|genre_id| candidate.genres.contains(genre_id))
            .take(MAX_REASONS)
            .collect();

        let reasons: Vec<String> = if shared.is_empty() {
            profile
                .genre_ids()
                .next()
                .and_then(|genre_id| names.get(&genre_id))
                .map(|name| vec![format!("Because you're into {}", name)])
                .unwrap_or_default()
        } else {
            shared
                .iter()
                .filter_map(|genre_id| names.get(genre_id))
                .map(|name| format!("Because you love {}", name))
                .collect()
        };

        if reasons.is_empty() {
            vec![GENERIC_RATIONALE.to_string()]
        } else {
            reasons
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};
    use crate::models::{GenreWeight, TmdbId};
    use crate::services::stores::{InMemoryCatalog, MockCatalogGateway};
    use std::collections::HashSet;

    fn candidate(tmdb_id: TmdbId, genres: &[GenreId]) -> Candidate {
        Candidate {
            tmdb_id,
            genres: genres.iter().copied().collect(),
            popularity: 10.0,
            release_year: None,
        }
    }

    fn profile(genres: &[GenreId]) -> TasteProfile {
        TasteProfile {
            top_genres: genres
                .iter()
                .enumerate()
                .map(|(i, &genre_id)| GenreWeight {
                    genre_id,
                    weight: (genres.len() - i) as u32,
                })
                .collect(),
            sample_size: 4,
        }
    }

    fn names() -> GenreNames {
        [
            (878, "Science Fiction".to_string()),
            (18, "Drama".to_string()),
            (35, "Comedy".to_string()),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_top_two_shared_genres_in_profile_order() {
        let p = profile(&[878, 18, 35]);
        let reasons = RationaleGenerator::explain(&p, &candidate(1, &[35, 18, 878]), &names());

        assert_eq!(
            reasons,
            vec![
                "Because you love Science Fiction".to_string(),
                "Because you love Drama".to_string()
            ]
        );
    }

    #[test]
    fn test_single_shared_genre() {
        let p = profile(&[878, 18]);
        let reasons = RationaleGenerator::explain(&p, &candidate(1, &[18, 27]), &names());
        assert_eq!(reasons, vec!["Because you love Drama".to_string()]);
    }

    #[test]
    fn test_no_overlap_uses_softer_top_genre_claim() {
        let p = profile(&[35, 18]);
        let reasons = RationaleGenerator::explain(&p, &candidate(1, &[27]), &names());
        assert_eq!(reasons, vec!["Because you're into Comedy".to_string()]);
    }

    #[test]
    fn test_empty_profile_gets_generic_line() {
        let reasons =
            RationaleGenerator::explain(&TasteProfile::empty(), &candidate(1, &[878]), &names());
        assert_eq!(reasons, vec![GENERIC_RATIONALE.to_string()]);
    }

    #[test]
    fn test_missing_names_fall_back_to_generic() {
        let p = profile(&[878, 18]);
        let reasons = RationaleGenerator::explain(&p, &candidate(1, &[878]), &GenreNames::new());
        assert_eq!(reasons, vec![GENERIC_RATIONALE.to_string()]);
    }

    #[test]
    fn test_explain_is_deterministic() {
        let p = profile(&[878, 18, 35]);
        let c = candidate(9, &[18, 35, 878, 12]);

        let first = RationaleGenerator::explain(&p, &c, &names());
        for _ in 0..10 {
            assert_eq!(RationaleGenerator::explain(&p, &c, &names()), first);
        }
    }

    #[tokio::test]
    async fn test_genre_names_skips_failed_lookups() {
        let mut catalog = MockCatalogGateway::new();
        catalog.expect_get_genre_name().returning(|genre_id| match genre_id {
            878 => Ok(Some("Science Fiction".to_string())),
            18 => Err(AppError::UpstreamUnavailable("catalog down".to_string())),
            _ => Ok(None),
        });

        let generator = RationaleGenerator::new(Arc::new(catalog), Duration::from_secs(1));
        let resolved = generator.genre_names(&profile(&[878, 18, 99])).await;

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved.get(&878).map(String::as_str), Some("Science Fiction"));
    }

    #[tokio::test]
    async fn test_genre_names_from_catalog() {
        let catalog = InMemoryCatalog::new().with_genre(18, "Drama");
        let generator = RationaleGenerator::new(Arc::new(catalog), Duration::from_secs(1));

        let resolved = generator.genre_names(&profile(&[18])).await;
        assert_eq!(resolved.get(&18).map(String::as_str), Some("Drama"));
    }

    /// Names 878 at once and stalls on everything else
    struct StallingCatalog;

    #[async_trait::async_trait]
    impl CatalogGateway for StallingCatalog {
        async fn get_genres(&self, _: TmdbId) -> AppResult<HashSet<GenreId>> {
            Ok(HashSet::new())
        }

        async fn get_genre_name(&self, genre_id: GenreId) -> AppResult<Option<String>> {
            if genre_id != 878 {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Ok(Some("Science Fiction".to_string()))
        }

        async fn get_popular_candidates(
            &self,
            _: &HashSet<TmdbId>,
            _: usize,
        ) -> AppResult<Vec<Candidate>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_genre_names_keeps_names_resolved_before_timeout() {
        let generator = RationaleGenerator::new(Arc::new(StallingCatalog), Duration::from_millis(50));
        let p = profile(&[878, 18]);

        let resolved = generator.genre_names(&p).await;

        assert_eq!(resolved.len(), 1);
        assert_eq!(
            RationaleGenerator::explain(&p, &candidate(1, &[878, 18]), &resolved),
            vec!["Because you love Science Fiction".to_string()]
        );
    }
}
