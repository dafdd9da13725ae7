use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Identity dimension a quota is enforced against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    User,
    Ip,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::User => "user",
            ActorType::Ip => "ip",
        }
    }
}

impl Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One actor to charge, with its own quota for the bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitActor {
    pub actor_id: String,
    pub actor_type: ActorType,
    pub limit: u32,
}

impl RateLimitActor {
    pub fn user(actor_id: impl Into<String>, limit: u32) -> Self {
        Self {
            actor_id: actor_id.into(),
            actor_type: ActorType::User,
            limit,
        }
    }

    pub fn ip(actor_id: impl Into<String>, limit: u32) -> Self {
        Self {
            actor_id: actor_id.into(),
            actor_type: ActorType::Ip,
            limit,
        }
    }
}

/// Counter row for one (bucket, actor, window)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub bucket: String,
    pub actor_type: ActorType,
    pub actor_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub count: u64,
    pub limit: u32,
}

impl RateLimitWindow {
    pub fn is_exceeded(&self) -> bool {
        self.count > u64::from(self.limit)
    }
}

/// Outcome of a rate-limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Pass,
    Reject {
        retry_after_seconds: u64,
        /// The window of the first actor that went over its limit
        window: RateLimitWindow,
    },
}

impl RateLimitDecision {
    pub fn is_pass(&self) -> bool {
        matches!(self, RateLimitDecision::Pass)
    }
}
