//! Per-turn conversation context.
//!
//! The pipeline builds one `ConversationContext` per inbound message from
//! durable state, snapshots it, and hands the working copy to the delegated
//! agent. Persistence is driven by diffing the pristine snapshot against the
//! returned copy, so the snapshot must never be mutated in place.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assessment::AssessmentType;
use crate::burnout::{BurnoutBand, PressureZone};

/// Where a user is in their journey with the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyPhase {
    Onboarding,
    Active,
    Crisis,
    Recovery,
    Maintenance,
    Churned,
}

impl std::fmt::Display for JourneyPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JourneyPhase::Onboarding => "onboarding",
            JourneyPhase::Active => "active",
            JourneyPhase::Crisis => "crisis",
            JourneyPhase::Recovery => "recovery",
            JourneyPhase::Maintenance => "maintenance",
            JourneyPhase::Churned => "churned",
        };
        write!(f, "{s}")
    }
}

impl FromStr for JourneyPhase {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "onboarding" => Ok(JourneyPhase::Onboarding),
            "active" => Ok(JourneyPhase::Active),
            "crisis" => Ok(JourneyPhase::Crisis),
            "recovery" => Ok(JourneyPhase::Recovery),
            "maintenance" => Ok(JourneyPhase::Maintenance),
            "churned" => Ok(JourneyPhase::Churned),
            other => Err(format!("unknown journey phase: {other}")),
        }
    }
}

/// Billing status as reported by the payment collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    None,
}

impl SubscriptionStatus {
    /// Active and trialing users get full access.
    pub fn is_subscribed(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        )
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::None => "none",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            "none" => Ok(SubscriptionStatus::None),
            other => Err(format!("unknown subscription status: {other}")),
        }
    }
}

/// One recent message carried into the agent turn for conversational memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Ephemeral per-turn context — one per pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    // Identity
    pub user_id: Uuid,
    pub phone: String,

    // Profile (onboarding)
    pub first_name: Option<String>,
    pub relationship: Option<String>,
    pub care_recipient_name: Option<String>,
    pub zip_code: Option<String>,

    // Journey state
    pub journey_phase: JourneyPhase,

    // Assessment sub-state
    pub assessment_in_progress: bool,
    pub assessment_type: Option<AssessmentType>,
    pub assessment_current_question: usize,
    pub assessment_session_id: Option<Uuid>,
    /// Raw answers keyed by question id, accumulated over the session.
    pub assessment_responses: BTreeMap<String, String>,
    /// Soft flag from admission control: assessment starts are blocked
    /// but the conversation continues.
    pub assessment_rate_limited: bool,

    // Wellness sub-state
    pub burnout_score: Option<f64>,
    pub burnout_confidence: Option<f64>,
    pub burnout_band: Option<BurnoutBand>,
    pub pressure_zones: Vec<PressureZone>,
    pub pressure_zone_scores: BTreeMap<PressureZone, f64>,

    // Trauma-informed onboarding tracking
    pub onboarding_attempts: BTreeMap<String, u32>,
    pub onboarding_cooldown_until: Option<DateTime<Utc>>,

    // Compliance
    pub consent_at: Option<DateTime<Utc>>,
    pub language_preference: String,

    // Conversation memory
    pub recent_messages: Vec<ContextMessage>,
    pub historical_summary: String,
}

impl ConversationContext {
    /// Create a fresh context with defaults for a user.
    pub fn new(user_id: Uuid, phone: impl Into<String>) -> Self {
        Self {
            user_id,
            phone: phone.into(),
            first_name: None,
            relationship: None,
            care_recipient_name: None,
            zip_code: None,
            journey_phase: JourneyPhase::Onboarding,
            assessment_in_progress: false,
            assessment_type: None,
            assessment_current_question: 0,
            assessment_session_id: None,
            assessment_responses: BTreeMap::new(),
            assessment_rate_limited: false,
            burnout_score: None,
            burnout_confidence: None,
            burnout_band: None,
            pressure_zones: Vec::new(),
            pressure_zone_scores: BTreeMap::new(),
            onboarding_attempts: BTreeMap::new(),
            onboarding_cooldown_until: None,
            consent_at: None,
            language_preference: "en".to_string(),
            recent_messages: Vec::new(),
            historical_summary: String::new(),
        }
    }

    /// True once every required profile field has been collected.
    pub fn profile_complete(&self) -> bool {
        self.first_name.is_some()
            && self.relationship.is_some()
            && self.care_recipient_name.is_some()
            && self.zip_code.is_some()
    }

    /// Required profile fields still missing, in prompt order.
    pub fn missing_profile_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.first_name.is_none() {
            missing.push("first_name");
        }
        if self.relationship.is_none() {
            missing.push("relationship");
        }
        if self.care_recipient_name.is_none() {
            missing.push("care_recipient_name");
        }
        if self.zip_code.is_none() {
            missing.push("zip_code");
        }
        missing
    }

    /// Whether we may still ask for a profile field — two attempts max,
    /// then back off (trauma-informed onboarding rule).
    pub fn can_ask_for_field(&self, field: &str) -> bool {
        self.onboarding_attempts.get(field).copied().unwrap_or(0) < 2
    }

    /// Record an attempt to collect a profile field.
    pub fn record_field_attempt(&mut self, field: &str) {
        *self
            .onboarding_attempts
            .entry(field.to_string())
            .or_insert(0) += 1;
    }
}
