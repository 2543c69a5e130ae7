//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Timestamps are stored
//! as RFC 3339 text; structured fields (zones, attempt counters, score
//! detail) are stored as JSON columns.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::{JourneyPhase, SubscriptionStatus};
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::models::{
    AssessmentResponse, AssessmentSession, LoggedMessage, MessageDirection, ScheduledMessage,
    SessionStatus, Trigger, User, WellnessScoreRow,
};
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(value: Option<String>) -> libsql::Value {
    match value {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn opt_real(value: Option<f64>) -> libsql::Value {
    match value {
        Some(x) => libsql::Value::Real(x),
        None => libsql::Value::Null,
    }
}

fn opt_datetime(value: Option<DateTime<Utc>>) -> libsql::Value {
    opt_text(value.map(|dt| dt.to_rfc3339()))
}

fn get_text(row: &libsql::Row, idx: i32) -> Result<String, DatabaseError> {
    row.get(idx)
        .map_err(|e| DatabaseError::Query(format!("column {idx}: {e}")))
}

fn get_opt_text(row: &libsql::Row, idx: i32) -> Option<String> {
    row.get(idx).ok()
}

fn get_opt_datetime(row: &libsql::Row, idx: i32) -> Option<DateTime<Utc>> {
    get_opt_text(row, idx).map(|s| parse_datetime(&s))
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

// ── Row mappers ─────────────────────────────────────────────────────

const USER_COLUMNS: &str = "id, phone, first_name, relationship, care_recipient_name, zip_code, \
     journey_phase, subscription_status, burnout_score, burnout_confidence, burnout_band, \
     pressure_zones, pressure_zone_scores, onboarding_attempts, onboarding_cooldown_until, \
     consent_at, language_preference, historical_summary, last_contact_at, \
     last_proactive_message_at, last_crisis_event_at, crisis_followup_count, created_at, \
     updated_at";

fn row_to_user(row: &libsql::Row) -> Result<User, DatabaseError> {
    let journey_phase: String = get_text(row, 6)?;
    let subscription_status: String = get_text(row, 7)?;
    let pressure_zones: String = get_text(row, 11)?;
    let pressure_zone_scores: String = get_text(row, 12)?;
    let onboarding_attempts: String = get_text(row, 13)?;

    Ok(User {
        id: parse_uuid(&get_text(row, 0)?),
        phone: get_text(row, 1)?,
        first_name: get_opt_text(row, 2),
        relationship: get_opt_text(row, 3),
        care_recipient_name: get_opt_text(row, 4),
        zip_code: get_opt_text(row, 5),
        journey_phase: journey_phase.parse().unwrap_or(JourneyPhase::Onboarding),
        subscription_status: subscription_status
            .parse()
            .unwrap_or(SubscriptionStatus::None),
        burnout_score: row.get(8).ok(),
        burnout_confidence: row.get(9).ok(),
        burnout_band: get_opt_text(row, 10).and_then(|s| s.parse().ok()),
        pressure_zones: serde_json::from_str(&pressure_zones).unwrap_or_default(),
        pressure_zone_scores: serde_json::from_str(&pressure_zone_scores).unwrap_or_default(),
        onboarding_attempts: serde_json::from_str(&onboarding_attempts).unwrap_or_default(),
        onboarding_cooldown_until: get_opt_datetime(row, 14),
        consent_at: get_opt_datetime(row, 15),
        language_preference: get_text(row, 16)?,
        historical_summary: get_text(row, 17)?,
        last_contact_at: get_opt_datetime(row, 18),
        last_proactive_message_at: get_opt_datetime(row, 19),
        last_crisis_event_at: get_opt_datetime(row, 20),
        crisis_followup_count: row.get::<i64>(21).unwrap_or(0) as u32,
        created_at: parse_datetime(&get_text(row, 22)?),
        updated_at: parse_datetime(&get_text(row, 23)?),
    })
}

const SESSION_COLUMNS: &str =
    "id, user_id, assessment_type, total_questions, current_index, status, started_at, \
     completed_at";

fn row_to_session(row: &libsql::Row) -> Result<AssessmentSession, DatabaseError> {
    let assessment: String = get_text(row, 2)?;
    let status: String = get_text(row, 5)?;
    Ok(AssessmentSession {
        id: parse_uuid(&get_text(row, 0)?),
        user_id: parse_uuid(&get_text(row, 1)?),
        assessment: assessment
            .parse()
            .map_err(|e: String| DatabaseError::Serialization(e))?,
        total_questions: row.get::<i64>(3).unwrap_or(0) as usize,
        current_index: row.get::<i64>(4).unwrap_or(0) as usize,
        status: status.parse().unwrap_or(SessionStatus::InProgress),
        started_at: parse_datetime(&get_text(row, 6)?),
        completed_at: get_opt_datetime(row, 7),
    })
}

fn row_to_response(row: &libsql::Row) -> Result<AssessmentResponse, DatabaseError> {
    Ok(AssessmentResponse {
        id: parse_uuid(&get_text(row, 0)?),
        session_id: parse_uuid(&get_text(row, 1)?),
        question_id: get_text(row, 2)?,
        raw_value: get_text(row, 3)?,
        score: row.get(4).ok(),
        created_at: parse_datetime(&get_text(row, 5)?),
    })
}

fn row_to_wellness(row: &libsql::Row) -> Result<WellnessScoreRow, DatabaseError> {
    let detail: String = get_text(row, 2)?;
    Ok(WellnessScoreRow {
        id: parse_uuid(&get_text(row, 0)?),
        user_id: parse_uuid(&get_text(row, 1)?),
        score: serde_json::from_str(&detail)
            .map_err(|e| DatabaseError::Serialization(format!("wellness detail: {e}")))?,
        created_at: parse_datetime(&get_text(row, 3)?),
    })
}

const TRIGGER_COLUMNS: &str = "id, user_id, trigger_type, rrule, timezone, message, enabled, \
     next_occurrence, last_triggered_at, created_at, updated_at";

fn row_to_trigger(row: &libsql::Row) -> Result<Trigger, DatabaseError> {
    Ok(Trigger {
        id: parse_uuid(&get_text(row, 0)?),
        user_id: parse_uuid(&get_text(row, 1)?),
        trigger_type: get_text(row, 2)?,
        rrule: get_text(row, 3)?,
        timezone: get_text(row, 4)?,
        message: get_text(row, 5)?,
        enabled: row.get::<i64>(6).unwrap_or(0) != 0,
        next_occurrence: parse_datetime(&get_text(row, 7)?),
        last_triggered_at: get_opt_datetime(row, 8),
        created_at: parse_datetime(&get_text(row, 9)?),
        updated_at: parse_datetime(&get_text(row, 10)?),
    })
}

fn row_to_scheduled(row: &libsql::Row) -> Result<ScheduledMessage, DatabaseError> {
    Ok(ScheduledMessage {
        id: parse_uuid(&get_text(row, 0)?),
        user_id: parse_uuid(&get_text(row, 1)?),
        kind: get_text(row, 2)?,
        message: get_text(row, 3)?,
        send_at: parse_datetime(&get_text(row, 4)?),
        sent_at: get_opt_datetime(row, 5),
        canceled: row.get::<i64>(6).unwrap_or(0) != 0,
        created_at: parse_datetime(&get_text(row, 7)?),
    })
}

fn row_to_logged(row: &libsql::Row) -> Result<LoggedMessage, DatabaseError> {
    let direction: String = get_text(row, 2)?;
    Ok(LoggedMessage {
        id: parse_uuid(&get_text(row, 0)?),
        user_id: parse_uuid(&get_text(row, 1)?),
        direction: if direction == "outbound" {
            MessageDirection::Outbound
        } else {
            MessageDirection::Inbound
        },
        content: get_text(row, 3)?,
        created_at: parse_datetime(&get_text(row, 4)?),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user: {e}"))),
        }
    }

    async fn get_user_by_phone(&self, phone: &str) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE phone = ?1"),
                params![phone],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user_by_phone: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user_by_phone: {e}"))),
        }
    }

    async fn create_user(&self, user: &User) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, \
                     ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)"
                ),
                params![
                    user.id.to_string(),
                    user.phone.clone(),
                    opt_text(user.first_name.clone()),
                    opt_text(user.relationship.clone()),
                    opt_text(user.care_recipient_name.clone()),
                    opt_text(user.zip_code.clone()),
                    user.journey_phase.to_string(),
                    user.subscription_status.to_string(),
                    opt_real(user.burnout_score),
                    opt_real(user.burnout_confidence),
                    opt_text(user.burnout_band.map(|b| b.to_string())),
                    serde_json::to_string(&user.pressure_zones)
                        .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
                    serde_json::to_string(&user.pressure_zone_scores)
                        .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
                    serde_json::to_string(&user.onboarding_attempts)
                        .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
                    opt_datetime(user.onboarding_cooldown_until),
                    opt_datetime(user.consent_at),
                    user.language_preference.clone(),
                    user.historical_summary.clone(),
                    opt_datetime(user.last_contact_at),
                    opt_datetime(user.last_proactive_message_at),
                    opt_datetime(user.last_crisis_event_at),
                    user.crisis_followup_count as i64,
                    user.created_at.to_rfc3339(),
                    user.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_user: {e}")))?;

        debug!(user_id = %user.id, "User created");
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE users SET first_name = ?1, relationship = ?2, care_recipient_name = ?3, \
                 zip_code = ?4, journey_phase = ?5, subscription_status = ?6, burnout_score = ?7, \
                 burnout_confidence = ?8, burnout_band = ?9, pressure_zones = ?10, \
                 pressure_zone_scores = ?11, onboarding_attempts = ?12, \
                 onboarding_cooldown_until = ?13, consent_at = ?14, language_preference = ?15, \
                 historical_summary = ?16, last_crisis_event_at = ?17, \
                 crisis_followup_count = ?18, updated_at = ?19 WHERE id = ?20",
                params![
                    opt_text(user.first_name.clone()),
                    opt_text(user.relationship.clone()),
                    opt_text(user.care_recipient_name.clone()),
                    opt_text(user.zip_code.clone()),
                    user.journey_phase.to_string(),
                    user.subscription_status.to_string(),
                    opt_real(user.burnout_score),
                    opt_real(user.burnout_confidence),
                    opt_text(user.burnout_band.map(|b| b.to_string())),
                    serde_json::to_string(&user.pressure_zones)
                        .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
                    serde_json::to_string(&user.pressure_zone_scores)
                        .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
                    serde_json::to_string(&user.onboarding_attempts)
                        .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
                    opt_datetime(user.onboarding_cooldown_until),
                    opt_datetime(user.consent_at),
                    user.language_preference.clone(),
                    user.historical_summary.clone(),
                    opt_datetime(user.last_crisis_event_at),
                    user.crisis_followup_count as i64,
                    Utc::now().to_rfc3339(),
                    user.id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_user: {e}")))?;
        Ok(())
    }

    async fn touch_last_contact(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE users SET last_contact_at = ?1, updated_at = ?1 WHERE id = ?2",
                params![at.to_rfc3339(), user_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("touch_last_contact: {e}")))?;
        Ok(())
    }

    async fn touch_last_proactive(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE users SET last_proactive_message_at = ?1, updated_at = ?1 WHERE id = ?2",
                params![at.to_rfc3339(), user_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("touch_last_proactive: {e}")))?;
        Ok(())
    }

    async fn create_assessment_session(
        &self,
        session: &AssessmentSession,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO assessment_sessions ({SESSION_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params![
                    session.id.to_string(),
                    session.user_id.to_string(),
                    session.assessment.to_string(),
                    session.total_questions as i64,
                    session.current_index as i64,
                    session.status.to_string(),
                    session.started_at.to_rfc3339(),
                    opt_datetime(session.completed_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_assessment_session: {e}")))?;

        debug!(session_id = %session.id, assessment = %session.assessment, "Assessment session created");
        Ok(())
    }

    async fn get_assessment_session(
        &self,
        id: Uuid,
    ) -> Result<Option<AssessmentSession>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM assessment_sessions WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_assessment_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_session(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_assessment_session: {e}"))),
        }
    }

    async fn get_open_session(
        &self,
        user_id: Uuid,
    ) -> Result<Option<AssessmentSession>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM assessment_sessions \
                     WHERE user_id = ?1 AND status = 'in_progress' \
                     ORDER BY started_at DESC LIMIT 1"
                ),
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_open_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_session(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_open_session: {e}"))),
        }
    }

    async fn update_session_progress(
        &self,
        id: Uuid,
        current_index: usize,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE assessment_sessions SET current_index = ?1 WHERE id = ?2",
                params![current_index as i64, id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_session_progress: {e}")))?;
        Ok(())
    }

    async fn complete_assessment_session(
        &self,
        id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE assessment_sessions SET status = 'complete', completed_at = ?1 \
                 WHERE id = ?2 AND status = 'in_progress'",
                params![completed_at.to_rfc3339(), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("complete_assessment_session: {e}")))?;
        Ok(())
    }

    async fn insert_assessment_response(
        &self,
        response: &AssessmentResponse,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO assessment_responses \
                 (id, session_id, question_id, raw_value, score, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    response.id.to_string(),
                    response.session_id.to_string(),
                    response.question_id.clone(),
                    response.raw_value.clone(),
                    opt_real(response.score),
                    response.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_assessment_response: {e}")))?;
        Ok(())
    }

    async fn list_session_responses(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<AssessmentResponse>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, session_id, question_id, raw_value, score, created_at \
                 FROM assessment_responses WHERE session_id = ?1 ORDER BY created_at ASC",
                params![session_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_session_responses: {e}")))?;

        let mut responses = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            responses.push(row_to_response(&row)?);
        }
        Ok(responses)
    }

    async fn insert_wellness_score(&self, row: &WellnessScoreRow) -> Result<(), DatabaseError> {
        let detail = serde_json::to_string(&row.score)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO wellness_scores (id, user_id, overall, band, confidence, detail, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    row.id.to_string(),
                    row.user_id.to_string(),
                    row.score.overall,
                    row.score.band.to_string(),
                    row.score.confidence,
                    detail,
                    row.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_wellness_score: {e}")))?;
        Ok(())
    }

    async fn list_wellness_scores(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<WellnessScoreRow>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, user_id, detail, created_at FROM wellness_scores \
                 WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
                params![user_id.to_string(), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_wellness_scores: {e}")))?;

        let mut scores = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            scores.push(row_to_wellness(&row)?);
        }
        Ok(scores)
    }

    async fn upsert_trigger(&self, trigger: &Trigger) -> Result<Uuid, DatabaseError> {
        // At most one enabled trigger per (user, type): update in place
        // when one exists instead of creating a duplicate
        let existing = self
            .get_enabled_trigger(trigger.user_id, &trigger.trigger_type)
            .await?;

        if let Some(existing) = existing {
            self.conn()
                .execute(
                    "UPDATE triggers SET rrule = ?1, timezone = ?2, message = ?3, \
                     next_occurrence = ?4, updated_at = ?5 WHERE id = ?6",
                    params![
                        trigger.rrule.clone(),
                        trigger.timezone.clone(),
                        trigger.message.clone(),
                        trigger.next_occurrence.to_rfc3339(),
                        Utc::now().to_rfc3339(),
                        existing.id.to_string(),
                    ],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("upsert_trigger update: {e}")))?;
            debug!(trigger_id = %existing.id, trigger_type = %trigger.trigger_type, "Trigger updated");
            return Ok(existing.id);
        }

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO triggers ({TRIGGER_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    trigger.id.to_string(),
                    trigger.user_id.to_string(),
                    trigger.trigger_type.clone(),
                    trigger.rrule.clone(),
                    trigger.timezone.clone(),
                    trigger.message.clone(),
                    trigger.enabled as i64,
                    trigger.next_occurrence.to_rfc3339(),
                    opt_datetime(trigger.last_triggered_at),
                    trigger.created_at.to_rfc3339(),
                    trigger.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_trigger insert: {e}")))?;
        debug!(trigger_id = %trigger.id, trigger_type = %trigger.trigger_type, "Trigger created");
        Ok(trigger.id)
    }

    async fn get_trigger(&self, id: Uuid) -> Result<Option<Trigger>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TRIGGER_COLUMNS} FROM triggers WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_trigger: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_trigger(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_trigger: {e}"))),
        }
    }

    async fn get_enabled_trigger(
        &self,
        user_id: Uuid,
        trigger_type: &str,
    ) -> Result<Option<Trigger>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TRIGGER_COLUMNS} FROM triggers \
                     WHERE user_id = ?1 AND trigger_type = ?2 AND enabled = 1"
                ),
                params![user_id.to_string(), trigger_type],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_enabled_trigger: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_trigger(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_enabled_trigger: {e}"))),
        }
    }

    async fn list_due_triggers(&self, now: DateTime<Utc>) -> Result<Vec<Trigger>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TRIGGER_COLUMNS} FROM triggers \
                     WHERE enabled = 1 AND next_occurrence <= ?1 ORDER BY next_occurrence ASC"
                ),
                params![now.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_due_triggers: {e}")))?;

        let mut triggers = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            triggers.push(row_to_trigger(&row)?);
        }
        Ok(triggers)
    }

    async fn update_trigger_schedule(
        &self,
        id: Uuid,
        next_occurrence: DateTime<Utc>,
        last_triggered_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        match last_triggered_at {
            Some(at) => self
                .conn()
                .execute(
                    "UPDATE triggers SET next_occurrence = ?1, last_triggered_at = ?2, \
                     updated_at = ?3 WHERE id = ?4",
                    params![
                        next_occurrence.to_rfc3339(),
                        at.to_rfc3339(),
                        now,
                        id.to_string()
                    ],
                )
                .await,
            None => self
                .conn()
                .execute(
                    "UPDATE triggers SET next_occurrence = ?1, updated_at = ?2 WHERE id = ?3",
                    params![next_occurrence.to_rfc3339(), now, id.to_string()],
                )
                .await,
        }
        .map_err(|e| DatabaseError::Query(format!("update_trigger_schedule: {e}")))?;
        Ok(())
    }

    async fn set_trigger_enabled(
        &self,
        id: Uuid,
        enabled: bool,
        next_occurrence: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        match next_occurrence {
            Some(next) => self
                .conn()
                .execute(
                    "UPDATE triggers SET enabled = ?1, next_occurrence = ?2, updated_at = ?3 \
                     WHERE id = ?4",
                    params![enabled as i64, next.to_rfc3339(), now, id.to_string()],
                )
                .await,
            None => self
                .conn()
                .execute(
                    "UPDATE triggers SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
                    params![enabled as i64, now, id.to_string()],
                )
                .await,
        }
        .map_err(|e| DatabaseError::Query(format!("set_trigger_enabled: {e}")))?;
        Ok(())
    }

    async fn insert_scheduled_message(&self, msg: &ScheduledMessage) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO scheduled_messages \
                 (id, user_id, kind, message, send_at, sent_at, canceled, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    msg.id.to_string(),
                    msg.user_id.to_string(),
                    msg.kind.clone(),
                    msg.message.clone(),
                    msg.send_at.to_rfc3339(),
                    opt_datetime(msg.sent_at),
                    msg.canceled as i64,
                    msg.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_scheduled_message: {e}")))?;
        Ok(())
    }

    async fn list_due_scheduled_messages(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, user_id, kind, message, send_at, sent_at, canceled, created_at \
                 FROM scheduled_messages \
                 WHERE canceled = 0 AND sent_at IS NULL AND send_at <= ?1 \
                 ORDER BY send_at ASC",
                params![now.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_due_scheduled_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            messages.push(row_to_scheduled(&row)?);
        }
        Ok(messages)
    }

    async fn mark_scheduled_message_sent(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE scheduled_messages SET sent_at = ?1 WHERE id = ?2",
                params![at.to_rfc3339(), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_scheduled_message_sent: {e}")))?;
        Ok(())
    }

    async fn cancel_scheduled_messages(
        &self,
        user_id: Uuid,
        kind: &str,
    ) -> Result<usize, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE scheduled_messages SET canceled = 1 \
                 WHERE user_id = ?1 AND kind = ?2 AND sent_at IS NULL AND canceled = 0",
                params![user_id.to_string(), kind],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("cancel_scheduled_messages: {e}")))?;
        Ok(changed as usize)
    }

    async fn log_message(
        &self,
        user_id: Uuid,
        direction: MessageDirection,
        content: &str,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO conversation_log (id, user_id, direction, content, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    Uuid::new_v4().to_string(),
                    user_id.to_string(),
                    direction.as_str(),
                    content,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("log_message: {e}")))?;
        Ok(())
    }

    async fn log_turn(
        &self,
        user_id: Uuid,
        inbound: &str,
        outbound: &str,
    ) -> Result<(), DatabaseError> {
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("log_turn begin: {e}")))?;

        let now = Utc::now();
        tx.execute(
            "INSERT INTO conversation_log (id, user_id, direction, content, created_at) \
             VALUES (?1, ?2, 'inbound', ?3, ?4)",
            params![
                Uuid::new_v4().to_string(),
                user_id.to_string(),
                inbound,
                now.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("log_turn inbound: {e}")))?;

        // The reply sorts after the inbound message at equal wall-clock time
        tx.execute(
            "INSERT INTO conversation_log (id, user_id, direction, content, created_at) \
             VALUES (?1, ?2, 'outbound', ?3, ?4)",
            params![
                Uuid::new_v4().to_string(),
                user_id.to_string(),
                outbound,
                (now + chrono::Duration::milliseconds(1)).to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("log_turn outbound: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("log_turn commit: {e}")))?;
        Ok(())
    }

    async fn recent_messages(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<LoggedMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, user_id, direction, content, created_at FROM conversation_log \
                 WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
                params![user_id.to_string(), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            messages.push(row_to_logged(&row)?);
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::burnout::BurnoutBand;
    use crate::store::models::SessionStatus;

    async fn backend() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn local_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("givecare.db");

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.create_user(&User::new("+15551230000")).await.unwrap();
        }

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(
            db.get_user_by_phone("+15551230000")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn user_round_trip() {
        let db = backend().await;
        let mut user = User::new("+15551230001");
        db.create_user(&user).await.unwrap();

        let loaded = db.get_user_by_phone("+15551230001").await.unwrap().unwrap();
        assert_eq!(loaded.id, user.id);
        assert_eq!(loaded.journey_phase, JourneyPhase::Onboarding);
        assert!(loaded.first_name.is_none());

        user.first_name = Some("Maria".to_string());
        user.journey_phase = JourneyPhase::Active;
        user.burnout_score = Some(42.5);
        user.burnout_band = Some(BurnoutBand::Moderate);
        db.update_user(&user).await.unwrap();

        let loaded = db.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(loaded.first_name.as_deref(), Some("Maria"));
        assert_eq!(loaded.journey_phase, JourneyPhase::Active);
        assert_eq!(loaded.burnout_score, Some(42.5));
        assert_eq!(loaded.burnout_band, Some(BurnoutBand::Moderate));
    }

    #[tokio::test]
    async fn duplicate_phone_is_a_constraint_error() {
        let db = backend().await;
        db.create_user(&User::new("+15551230002")).await.unwrap();
        assert!(db.create_user(&User::new("+15551230002")).await.is_err());
    }

    #[tokio::test]
    async fn session_and_responses() {
        let db = backend().await;
        let user = User::new("+15551230003");
        db.create_user(&user).await.unwrap();

        let session = AssessmentSession {
            id: Uuid::new_v4(),
            user_id: user.id,
            assessment: crate::assessment::AssessmentType::Ema,
            total_questions: 3,
            current_index: 0,
            status: SessionStatus::InProgress,
            started_at: Utc::now(),
            completed_at: None,
        };
        db.create_assessment_session(&session).await.unwrap();

        for (i, (qid, raw, score)) in [
            ("ema_1", "4", Some(75.0)),
            ("ema_2", "", None),
            ("ema_3", "2", Some(75.0)),
        ]
        .iter()
        .enumerate()
        {
            db.insert_assessment_response(&AssessmentResponse {
                id: Uuid::new_v4(),
                session_id: session.id,
                question_id: qid.to_string(),
                raw_value: raw.to_string(),
                score: *score,
                created_at: Utc::now() + chrono::Duration::milliseconds(i as i64),
            })
            .await
            .unwrap();
        }

        db.complete_assessment_session(session.id, Utc::now())
            .await
            .unwrap();

        let loaded = db.get_assessment_session(session.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Complete);
        assert!(loaded.completed_at.is_some());

        let responses = db.list_session_responses(session.id).await.unwrap();
        assert_eq!(responses.len(), 3);
        // Null scores stay null through storage
        assert_eq!(responses[1].score, None);
    }

    #[tokio::test]
    async fn wellness_scores_list_most_recent_first() {
        let db = backend().await;
        let user = User::new("+15551230004");
        db.create_user(&user).await.unwrap();

        for (overall, days_ago) in [(50.0, 5), (60.0, 1)] {
            let mut score = crate::burnout::composite_at(
                &std::collections::BTreeMap::new(),
                &[],
                Utc::now(),
            );
            score.overall = overall;
            db.insert_wellness_score(&WellnessScoreRow {
                id: Uuid::new_v4(),
                user_id: user.id,
                score,
                created_at: Utc::now() - chrono::Duration::days(days_ago),
            })
            .await
            .unwrap();
        }

        let scores = db.list_wellness_scores(user.id, 10).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].score.overall, 60.0);
    }

    #[tokio::test]
    async fn trigger_upsert_updates_in_place() {
        let db = backend().await;
        let user = User::new("+15551230005");
        db.create_user(&user).await.unwrap();

        let mut trigger = test_trigger(user.id);
        let first_id = db.upsert_trigger(&trigger).await.unwrap();

        trigger.id = Uuid::new_v4();
        trigger.message = "updated reminder".to_string();
        let second_id = db.upsert_trigger(&trigger).await.unwrap();
        assert_eq!(first_id, second_id);

        let loaded = db.get_trigger(first_id).await.unwrap().unwrap();
        assert_eq!(loaded.message, "updated reminder");
    }

    #[tokio::test]
    async fn due_triggers_respect_enabled_and_time() {
        let db = backend().await;
        let user = User::new("+15551230006");
        db.create_user(&user).await.unwrap();

        let mut due = test_trigger(user.id);
        due.next_occurrence = Utc::now() - chrono::Duration::hours(1);
        let due_id = db.upsert_trigger(&due).await.unwrap();

        let mut future = test_trigger(user.id);
        future.trigger_type = "evening_checkin".to_string();
        future.next_occurrence = Utc::now() + chrono::Duration::hours(1);
        db.upsert_trigger(&future).await.unwrap();

        let found = db.list_due_triggers(Utc::now()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due_id);

        db.set_trigger_enabled(due_id, false, None).await.unwrap();
        assert!(db.list_due_triggers(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scheduled_messages_due_and_cancel() {
        let db = backend().await;
        let user = User::new("+15551230007");
        db.create_user(&user).await.unwrap();

        let msg = ScheduledMessage {
            id: Uuid::new_v4(),
            user_id: user.id,
            kind: "crisis_followup".to_string(),
            message: "Checking in on you today".to_string(),
            send_at: Utc::now() - chrono::Duration::minutes(5),
            sent_at: None,
            canceled: false,
            created_at: Utc::now(),
        };
        db.insert_scheduled_message(&msg).await.unwrap();

        let due = db.list_due_scheduled_messages(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);

        db.mark_scheduled_message_sent(msg.id, Utc::now())
            .await
            .unwrap();
        assert!(
            db.list_due_scheduled_messages(Utc::now())
                .await
                .unwrap()
                .is_empty()
        );

        // Cancel only touches pending rows
        let canceled = db
            .cancel_scheduled_messages(user.id, "crisis_followup")
            .await
            .unwrap();
        assert_eq!(canceled, 0);
    }

    #[tokio::test]
    async fn log_turn_writes_both_rows_in_order() {
        let db = backend().await;
        let user = User::new("+15551230008");
        db.create_user(&user).await.unwrap();

        db.log_turn(user.id, "hi there", "hello! how are you?")
            .await
            .unwrap();

        let messages = db.recent_messages(user.id, 10).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].direction, MessageDirection::Outbound);
        assert_eq!(messages[1].direction, MessageDirection::Inbound);
        assert_eq!(messages[1].content, "hi there");
    }

    fn test_trigger(user_id: Uuid) -> Trigger {
        Trigger {
            id: Uuid::new_v4(),
            user_id,
            trigger_type: "daily_checkin".to_string(),
            rrule: "FREQ=DAILY;BYHOUR=9;BYMINUTE=0".to_string(),
            timezone: "America/New_York".to_string(),
            message: "Good morning! How are you feeling today?".to_string(),
            enabled: true,
            next_occurrence: Utc::now() + chrono::Duration::hours(12),
            last_triggered_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
