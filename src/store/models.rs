//! Persisted record shapes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::assessment::AssessmentType;
use crate::burnout::{BurnoutBand, PressureZone, WellnessScore};
use crate::context::{JourneyPhase, SubscriptionStatus};

/// Durable user record. Hydrated into a `ConversationContext` at
/// pipeline start and written back from the context diff.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub phone: String,
    pub first_name: Option<String>,
    pub relationship: Option<String>,
    pub care_recipient_name: Option<String>,
    pub zip_code: Option<String>,
    pub journey_phase: JourneyPhase,
    pub subscription_status: SubscriptionStatus,
    pub burnout_score: Option<f64>,
    pub burnout_confidence: Option<f64>,
    pub burnout_band: Option<BurnoutBand>,
    pub pressure_zones: Vec<PressureZone>,
    pub pressure_zone_scores: BTreeMap<PressureZone, f64>,
    pub onboarding_attempts: BTreeMap<String, u32>,
    pub onboarding_cooldown_until: Option<DateTime<Utc>>,
    pub consent_at: Option<DateTime<Utc>>,
    pub language_preference: String,
    pub historical_summary: String,
    pub last_contact_at: Option<DateTime<Utc>>,
    pub last_proactive_message_at: Option<DateTime<Utc>>,
    pub last_crisis_event_at: Option<DateTime<Utc>>,
    pub crisis_followup_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Fresh user as created on first contact.
    pub fn new(phone: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            phone: phone.into(),
            first_name: None,
            relationship: None,
            care_recipient_name: None,
            zip_code: None,
            journey_phase: JourneyPhase::Onboarding,
            subscription_status: SubscriptionStatus::None,
            burnout_score: None,
            burnout_confidence: None,
            burnout_band: None,
            pressure_zones: Vec::new(),
            pressure_zone_scores: BTreeMap::new(),
            onboarding_attempts: BTreeMap::new(),
            onboarding_cooldown_until: None,
            consent_at: None,
            language_preference: "en".to_string(),
            historical_summary: String::new(),
            last_contact_at: None,
            last_proactive_message_at: None,
            last_crisis_event_at: None,
            crisis_followup_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    InProgress,
    Complete,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Complete => "complete",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(SessionStatus::InProgress),
            "complete" => Ok(SessionStatus::Complete),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// One assessment session. Completed exactly once, when the question
/// index reaches the question count.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub assessment: AssessmentType,
    pub total_questions: usize,
    pub current_index: usize,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One answered question. `score` is `None` for skipped or unscorable
/// answers and is never coerced to 0.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentResponse {
    pub id: Uuid,
    pub session_id: Uuid,
    pub question_id: String,
    pub raw_value: String,
    pub score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Append-only composite score record for the per-user time series.
#[derive(Debug, Clone)]
pub struct WellnessScoreRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub score: WellnessScore,
    pub created_at: DateTime<Utc>,
}

/// Recurring proactive trigger. Disabled rather than deleted; at most
/// one enabled trigger per `(user_id, trigger_type)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub id: Uuid,
    pub user_id: Uuid,
    pub trigger_type: String,
    pub rrule: String,
    pub timezone: String,
    pub message: String,
    pub enabled: bool,
    pub next_occurrence: DateTime<Utc>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One-shot scheduled message, used for crisis follow-up cadences and
/// onboarding nudges.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledMessage {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Grouping key, e.g. `crisis_followup` or `onboarding_nudge`.
    /// Pending messages can be canceled as a group by this key.
    pub kind: String,
    pub message: String,
    pub send_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub canceled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

impl MessageDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageDirection::Inbound => "inbound",
            MessageDirection::Outbound => "outbound",
        }
    }
}

impl fmt::Display for MessageDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the conversation log.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedMessage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub direction: MessageDirection,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
