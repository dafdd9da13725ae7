use std::collections::HashMap;
use std::sync::Arc;

use crate::services::{ActorQuota, RateLimiter, SmartPicksService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub smart_picks: Arc<SmartPicksService>,
    /// Quotas for buckets other services gate through `/rate-limits`
    pub metered_buckets: Arc<HashMap<String, ActorQuota>>,
}

impl AppState {
    pub fn new(smart_picks: SmartPicksService) -> Self {
        Self {
            smart_picks: Arc::new(smart_picks),
            metered_buckets: Arc::new(HashMap::new()),
        }
    }

    /// Exposes a limiter bucket to other metered features
    pub fn with_metered_bucket(mut self, bucket: &str, quota: ActorQuota) -> Self {
        Arc::make_mut(&mut self.metered_buckets).insert(bucket.to_string(), quota);
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        self.smart_picks.limiter()
    }
}
