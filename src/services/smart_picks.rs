use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{RankedPick, RateLimitActor, SmartPicksOptions, SmartPicksResponse, TmdbId},
    services::{
        is_upstream_failure,
        ranker::CandidateRanker,
        rate_limiter::{RateLimiter, RECOMMENDATIONS_BUCKET},
        rationale::RationaleGenerator,
        stores::PlanGateway,
        taste_profile::TasteProfileBuilder,
    },
};

pub const DEFAULT_LIMIT: usize = 6;
pub const MAX_LIMIT: usize = 24;

/// Who is asking, as established by the HTTP layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Option<String>,
    pub ip: String,
}

/// Per-window quotas for one bucket, per actor type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorQuota {
    pub per_user: u32,
    pub per_ip: u32,
}

/// Orchestrates entitlement → quota → profile → ranking → rationale
#[derive(Clone)]
pub struct SmartPicksService {
    plans: Arc<dyn PlanGateway>,
    limiter: RateLimiter,
    profiles: TasteProfileBuilder,
    ranker: CandidateRanker,
    rationale: RationaleGenerator,
    quota: ActorQuota,
}

impl SmartPicksService {
    pub fn new(
        plans: Arc<dyn PlanGateway>,
        limiter: RateLimiter,
        profiles: TasteProfileBuilder,
        ranker: CandidateRanker,
        rationale: RationaleGenerator,
        quota: ActorQuota,
    ) -> Self {
        Self {
            plans,
            limiter,
            profiles,
            ranker,
            rationale,
            quota,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Quota actors for a caller, user first
    pub fn actors(&self, user_id: &str, ip: &str) -> Vec<RateLimitActor> {
        vec![
            RateLimitActor::user(user_id, self.quota.per_user),
            RateLimitActor::ip(ip, self.quota.per_ip),
        ]
    }

    pub async fn get_smart_picks(
        &self,
        caller: &Caller,
        options: SmartPicksOptions,
    ) -> AppResult<SmartPicksResponse> {
        let user_id = caller
            .user_id
            .as_deref()
            .ok_or(AppError::NotAuthenticated)?;

        if !self.plans.has_smart_picks(user_id).await? {
            tracing::info!(user_id = %user_id, "Smart Picks requested without eligible plan");
            return Err(AppError::PlanNotEligible);
        }

        // Nothing downstream runs until the quota is settled
        self.limiter
            .enforce(RECOMMENDATIONS_BUCKET, &self.actors(user_id, &caller.ip))
            .await?;

        let limit = options.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let signal = self.profiles.build_signal(user_id).await?;

        let exclude: HashSet<TmdbId> = options
            .exclude_tmdb_ids
            .union(&signal.seen)
            .copied()
            .collect();

        let ranked = match self.ranker.rank(&signal.profile, &exclude, limit).await {
            Ok(ranked) => ranked,
            Err(e) if is_upstream_failure(&e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Candidate pool unavailable");
                return Err(AppError::UpstreamUnavailable(format!(
                    "no candidates available: {}",
                    e
                )));
            }
            Err(e) => return Err(e),
        };

        let names = if signal.profile.is_empty() {
            Default::default()
        } else {
            self.rationale.genre_names(&signal.profile).await
        };

        let picks: Vec<RankedPick> = ranked
            .into_iter()
            .map(|scored| RankedPick {
                tmdb_id: scored.candidate.tmdb_id,
                score: scored.score,
                rationale: RationaleGenerator::explain(&signal.profile, &scored.candidate, &names),
            })
            .collect();

        tracing::info!(
            user_id = %user_id,
            picks = picks.len(),
            limit,
            sample_size = signal.profile.sample_size,
            degraded = signal.degraded,
            "Smart Picks served"
        );

        Ok(SmartPicksResponse {
            picks,
            profile: signal.profile,
            degraded: signal.degraded,
        })
    }
}
