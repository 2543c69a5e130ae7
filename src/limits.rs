//! Named token-bucket admission control.
//!
//! Five independently configured buckets guard the inbound SMS path:
//! a per-user spam bucket, per-user and global SMS budgets, a global
//! LLM-call quota, and a per-user assessment-frequency bucket. Tokens
//! refill continuously at each bucket's rate and are capped at the
//! bucket capacity, `rate + burst`, which is also the starting balance
//! for a fresh key. Admission consumes one token or rejects; nothing
//! queues.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;

/// Key used for buckets that are not scoped to a single user.
pub const GLOBAL_KEY: &str = "global";

// ============================================================================
// Bucket catalog
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// Rapid-burst abuse detection, per user. Rejection is a silent drop.
    Spam,
    /// Daily per-user SMS budget.
    SmsPerUser,
    /// Account-wide hourly SMS budget.
    SmsGlobal,
    /// Account-wide LLM request quota.
    LlmCalls,
    /// Per-user assessment-start frequency. Soft: rejection never aborts
    /// the conversation, it only blocks starting a new assessment.
    Assessment,
}

impl Bucket {
    pub fn name(self) -> &'static str {
        match self {
            Bucket::Spam => "spam",
            Bucket::SmsPerUser => "sms-per-user",
            Bucket::SmsGlobal => "sms-global",
            Bucket::LlmCalls => "llm-calls",
            Bucket::Assessment => "assessment",
        }
    }

    pub fn config(self) -> BucketConfig {
        match self {
            Bucket::Spam => BucketConfig {
                rate: 20.0,
                period: Duration::hours(1),
                burst: 5,
                max_reserved: 50,
                reply: "",
            },
            Bucket::SmsPerUser => BucketConfig {
                rate: 10.0,
                period: Duration::days(1),
                burst: 3,
                max_reserved: 100,
                reply: "You've sent quite a few messages today. Let's take a \
                        break and reconnect tomorrow. For urgent support, call \
                        988 \u{1f499}",
            },
            Bucket::SmsGlobal => BucketConfig {
                rate: 1000.0,
                period: Duration::hours(1),
                burst: 50,
                max_reserved: 500,
                reply: "I'm supporting a lot of caregivers right now. For \
                        crisis support, call 988 \u{1f499}",
            },
            Bucket::LlmCalls => BucketConfig {
                rate: 100.0,
                period: Duration::minutes(1),
                burst: 20,
                max_reserved: 200,
                reply: "I'm with a lot of caregivers right now. Can you give \
                        me a moment and try again? For urgent support, call \
                        988 \u{1f499}",
            },
            Bucket::Assessment => BucketConfig {
                rate: 3.0,
                period: Duration::days(1),
                burst: 1,
                max_reserved: 10,
                reply: "You've completed your check-ins for today. Taking \
                        breaks helps get a clearer picture. Let's try again \
                        tomorrow. For urgent support, call 988 \u{1f499}",
            },
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct BucketConfig {
    /// Tokens added per `period`.
    pub rate: f64,
    pub period: Duration,
    /// Headroom above `rate`; see [`capacity`](Self::capacity).
    pub burst: u32,
    /// Upper bound on tokens reservable across all keys. Carried from the
    /// deployment config; the in-process limiter has no reservation path.
    pub max_reserved: u32,
    /// User-facing copy on rejection. Empty means drop silently.
    pub reply: &'static str,
}

impl BucketConfig {
    /// Bucket capacity and the starting balance for a fresh key: one
    /// full period's worth of tokens plus the burst headroom.
    pub fn capacity(&self) -> f64 {
        self.rate + f64::from(self.burst)
    }
}

// ============================================================================
// Limiter
// ============================================================================

struct BucketState {
    tokens: f64,
    refilled_at: DateTime<Utc>,
}

/// Outcome of the full inbound-message admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// All hard buckets admitted. `assessment_limited` is set when the
    /// assessment bucket rejected; the conversation continues but a new
    /// assessment must not start this turn.
    Allowed { assessment_limited: bool },
    /// Spam bucket rejected. No reply is sent at all.
    SilentDrop,
    /// A hard bucket rejected; reply with its copy and stop.
    Denied { bucket: Bucket, reply: &'static str },
}

/// In-process token-bucket limiter. One instance is shared across all
/// concurrent pipeline runs; bucket state lives behind a single lock so
/// check-and-decrement is atomic per key.
pub struct RateLimiter {
    state: Mutex<HashMap<(Bucket, String), BucketState>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Consume one token from `bucket` for `key`, refilling first.
    /// Returns whether the request is admitted.
    pub async fn admit(&self, bucket: Bucket, key: &str) -> bool {
        self.admit_at(bucket, key, Utc::now()).await
    }

    /// Clock-injected variant of [`admit`](Self::admit).
    pub async fn admit_at(&self, bucket: Bucket, key: &str, now: DateTime<Utc>) -> bool {
        let cfg = bucket.config();
        let mut state = self.state.lock().await;
        let entry = state
            .entry((bucket, key.to_string()))
            .or_insert_with(|| BucketState {
                tokens: cfg.capacity(),
                refilled_at: now,
            });

        let elapsed_ms = (now - entry.refilled_at).num_milliseconds().max(0) as f64;
        let refill = cfg.rate * elapsed_ms / cfg.period.num_milliseconds() as f64;
        entry.tokens = (entry.tokens + refill).min(cfg.capacity());
        entry.refilled_at = now;

        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            true
        } else {
            debug!(bucket = %bucket, key, "Rate limit rejected");
            false
        }
    }

    /// Run all five bucket checks for one inbound message. The checks are
    /// issued concurrently (disjoint keyspaces) and then applied in fixed
    /// priority order: spam, per-user SMS, global SMS, LLM quota. The
    /// assessment bucket never aborts; it is threaded through as a flag.
    pub async fn check_inbound(&self, user_key: &str) -> Admission {
        self.check_inbound_at(user_key, Utc::now()).await
    }

    pub async fn check_inbound_at(&self, user_key: &str, now: DateTime<Utc>) -> Admission {
        let (spam, per_user, global, llm, assessment) = tokio::join!(
            self.admit_at(Bucket::Spam, user_key, now),
            self.admit_at(Bucket::SmsPerUser, user_key, now),
            self.admit_at(Bucket::SmsGlobal, GLOBAL_KEY, now),
            self.admit_at(Bucket::LlmCalls, GLOBAL_KEY, now),
            self.admit_at(Bucket::Assessment, user_key, now),
        );

        if !spam {
            return Admission::SilentDrop;
        }
        for (admitted, bucket) in [
            (per_user, Bucket::SmsPerUser),
            (global, Bucket::SmsGlobal),
            (llm, Bucket::LlmCalls),
        ] {
            if !admitted {
                return Admission::Denied {
                    bucket,
                    reply: bucket.config().reply,
                };
            }
        }
        Admission::Allowed {
            assessment_limited: !assessment,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
