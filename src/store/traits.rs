//! Unified `Database` trait covering users, assessments, wellness
//! scores, triggers, scheduled messages, and the conversation log.
//!
//! The underlying store is assumed to expose indexed CRUD only; any
//! cross-record invariant (one enabled trigger per user and type,
//! sessions completed once) is enforced by the methods here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::models::{
    AssessmentResponse, AssessmentSession, LoggedMessage, MessageDirection, ScheduledMessage,
    Trigger, User, WellnessScoreRow,
};

#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;

    async fn get_user_by_phone(&self, phone: &str) -> Result<Option<User>, DatabaseError>;

    /// Insert a fresh user for a phone number.
    async fn create_user(&self, user: &User) -> Result<(), DatabaseError>;

    /// Write back all mutable user fields.
    async fn update_user(&self, user: &User) -> Result<(), DatabaseError>;

    /// Advisory engagement marker; last-writer-wins is acceptable.
    async fn touch_last_contact(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    async fn touch_last_proactive(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    // ── Assessment sessions ─────────────────────────────────────────

    async fn create_assessment_session(
        &self,
        session: &AssessmentSession,
    ) -> Result<(), DatabaseError>;

    async fn get_assessment_session(
        &self,
        id: Uuid,
    ) -> Result<Option<AssessmentSession>, DatabaseError>;

    /// The user's most recent in-progress session, if any.
    async fn get_open_session(
        &self,
        user_id: Uuid,
    ) -> Result<Option<AssessmentSession>, DatabaseError>;

    async fn update_session_progress(
        &self,
        id: Uuid,
        current_index: usize,
    ) -> Result<(), DatabaseError>;

    async fn complete_assessment_session(
        &self,
        id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    async fn insert_assessment_response(
        &self,
        response: &AssessmentResponse,
    ) -> Result<(), DatabaseError>;

    async fn list_session_responses(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<AssessmentResponse>, DatabaseError>;

    // ── Wellness scores ─────────────────────────────────────────────

    /// Append to the per-user score time series. Rows are never mutated.
    async fn insert_wellness_score(&self, row: &WellnessScoreRow) -> Result<(), DatabaseError>;

    /// Most recent first.
    async fn list_wellness_scores(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<WellnessScoreRow>, DatabaseError>;

    // ── Triggers ────────────────────────────────────────────────────

    /// Create or update the enabled trigger for `(user_id, trigger_type)`.
    /// Returns the trigger id (existing on update, new on insert).
    async fn upsert_trigger(&self, trigger: &Trigger) -> Result<Uuid, DatabaseError>;

    async fn get_trigger(&self, id: Uuid) -> Result<Option<Trigger>, DatabaseError>;

    async fn get_enabled_trigger(
        &self,
        user_id: Uuid,
        trigger_type: &str,
    ) -> Result<Option<Trigger>, DatabaseError>;

    /// Enabled triggers with `next_occurrence <= now`.
    async fn list_due_triggers(&self, now: DateTime<Utc>) -> Result<Vec<Trigger>, DatabaseError>;

    /// Advance a trigger's schedule. `last_triggered_at` is stamped
    /// only when provided.
    async fn update_trigger_schedule(
        &self,
        id: Uuid,
        next_occurrence: DateTime<Utc>,
        last_triggered_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError>;

    /// Toggle a trigger; re-enabling supplies a recomputed occurrence.
    async fn set_trigger_enabled(
        &self,
        id: Uuid,
        enabled: bool,
        next_occurrence: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError>;

    // ── Scheduled messages ──────────────────────────────────────────

    async fn insert_scheduled_message(&self, msg: &ScheduledMessage) -> Result<(), DatabaseError>;

    /// Unsent, uncanceled messages with `send_at <= now`.
    async fn list_due_scheduled_messages(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledMessage>, DatabaseError>;

    async fn mark_scheduled_message_sent(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// Cancel all pending messages of one kind for a user. Returns the
    /// number canceled.
    async fn cancel_scheduled_messages(
        &self,
        user_id: Uuid,
        kind: &str,
    ) -> Result<usize, DatabaseError>;

    // ── Conversation log ────────────────────────────────────────────

    async fn log_message(
        &self,
        user_id: Uuid,
        direction: MessageDirection,
        content: &str,
    ) -> Result<(), DatabaseError>;

    /// Log an inbound message and its reply as one batched write.
    async fn log_turn(
        &self,
        user_id: Uuid,
        inbound: &str,
        outbound: &str,
    ) -> Result<(), DatabaseError>;

    /// Most recent first.
    async fn recent_messages(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<LoggedMessage>, DatabaseError>;
}
