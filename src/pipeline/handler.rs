//! Pipeline handler — runs the fixed stage order for one inbound SMS.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::agent::AgentRuntime;
use crate::assessment::{AssessmentType, definition, score_answer, score_assessment};
use crate::background::BackgroundWriter;
use crate::burnout::{self, BurnoutBand, InstrumentScore, PriorScore};
use crate::config::ServiceConfig;
use crate::context::{ContextMessage, ConversationContext, JourneyPhase};
use crate::error::Error;
use crate::limits::{Admission, RateLimiter};
use crate::pipeline::types::PipelineReply;
use crate::schedule::{schedule_crisis_followups, schedule_onboarding_nudges};
use crate::sms::{InboundSms, SignatureValidator, truncate_body};
use crate::store::{
    AssessmentResponse, AssessmentSession, Database, MessageDirection, SessionStatus, User,
    WellnessScoreRow,
};

/// Sent when anything in stages 3-8 fails.
const FALLBACK_REPLY: &str = "Sorry, I'm having trouble right now. Please try again in a moment.";

/// How many recent log entries are carried into the agent turn.
const RECENT_MESSAGE_WINDOW: usize = 10;

/// How many prior composites feed trend computation.
const PRIOR_SCORE_WINDOW: usize = 30;

/// Orchestrates one inbound message through validation, admission,
/// delegation, and persistence.
pub struct MessagePipeline {
    config: ServiceConfig,
    store: Arc<dyn Database>,
    limiter: Arc<RateLimiter>,
    agent: Arc<dyn AgentRuntime>,
    validator: Arc<dyn SignatureValidator>,
    background: BackgroundWriter,
}

impl MessagePipeline {
    pub fn new(
        config: ServiceConfig,
        store: Arc<dyn Database>,
        limiter: Arc<RateLimiter>,
        agent: Arc<dyn AgentRuntime>,
        validator: Arc<dyn SignatureValidator>,
    ) -> Self {
        Self {
            config,
            store,
            limiter,
            agent,
            validator,
            background: BackgroundWriter::new(),
        }
    }

    /// Test-facing handle on the fire-and-forget writer, for flushing.
    pub fn background(&self) -> &BackgroundWriter {
        &self.background
    }

    /// Run one inbound message through the pipeline.
    ///
    /// A signature failure is the only error that propagates: the
    /// transport must reject the whole request before any side effect.
    /// Everything downstream is caught and converted into the generic
    /// fallback reply.
    pub async fn handle(&self, inbound: &InboundSms) -> Result<PipelineReply, Error> {
        let started = Instant::now();

        // Stage 1: signature validation
        if self.config.skip_signature_validation {
            warn!("Signature validation bypassed by configuration");
        } else {
            self.validator
                .validate(&inbound.signature, &inbound.request_url, &inbound.raw_params)?;
        }

        match self.run_stages(inbound).await {
            Ok(reply) => Ok(PipelineReply {
                message: reply,
                latency_ms: started.elapsed().as_millis() as u64,
                error: None,
            }),
            Err(e) => {
                error!(from = %inbound.from, error = %e, "Pipeline run failed");
                Ok(PipelineReply {
                    message: Some(FALLBACK_REPLY.to_string()),
                    latency_ms: started.elapsed().as_millis() as u64,
                    error: Some(e.to_string()),
                })
            }
        }
    }

    async fn run_stages(&self, inbound: &InboundSms) -> Result<Option<String>, Error> {
        // Stage 2: admission control
        let assessment_limited = match self.limiter.check_inbound(&inbound.from).await {
            Admission::SilentDrop => {
                info!(from = %inbound.from, "Spam bucket exhausted, dropping silently");
                return Ok(None);
            }
            Admission::Denied { bucket, reply } => {
                info!(from = %inbound.from, bucket = %bucket, "Admission denied");
                // Log the denial turn when the sender is a known user
                if let Some(user) = self.store.get_user_by_phone(&inbound.from).await? {
                    self.store.log_turn(user.id, &inbound.body, reply).await?;
                }
                return Ok(Some(reply.to_string()));
            }
            Admission::Allowed { assessment_limited } => assessment_limited,
        };

        // Stage 3: resolve or create the user
        let user = match self.store.get_user_by_phone(&inbound.from).await? {
            Some(user) => user,
            None => {
                let user = User::new(&inbound.from);
                self.store.create_user(&user).await?;
                info!(user_id = %user.id, "New user created from inbound message");
                user
            }
        };

        // Stage 4: subscription gate
        if !user.subscription_status.is_subscribed() {
            let reply = format!(
                "Hi! To access GiveCare, please subscribe at:\n\n{}\n\n\
                 Questions about our service? Visit givecareapp.com or text 'info' for details.",
                self.config.signup_url
            );
            self.store.log_turn(user.id, &inbound.body, &reply).await?;
            debug!(user_id = %user.id, status = %user.subscription_status, "Subscription gate");
            return Ok(Some(reply));
        }

        // Stage 5: hydrate context and snapshot it
        let context = self.build_context(&user, assessment_limited).await?;
        let snapshot = context.clone();

        // Stage 6: delegated agent turn
        let turn = self.agent.run_turn(&inbound.body, context).await?;
        let updated = turn.context;
        let reply = truncate_body(&turn.message).to_string();
        debug!(
            user_id = %user.id,
            agent = %turn.agent_name,
            tool_calls = turn.tool_calls.len(),
            "Agent turn complete"
        );

        // Stage 7: persist the snapshot/updated diff
        let new_band = self
            .persist_turn(&user, &snapshot, &updated, &inbound.body, &reply)
            .await?;

        // Stage 8: follow-ups on band and phase transitions
        self.schedule_followups(&user, &snapshot, &updated, new_band)
            .await?;

        Ok(Some(reply))
    }

    async fn build_context(
        &self,
        user: &User,
        assessment_limited: bool,
    ) -> Result<ConversationContext, Error> {
        let mut context = ConversationContext::new(user.id, &user.phone);
        context.first_name = user.first_name.clone();
        context.relationship = user.relationship.clone();
        context.care_recipient_name = user.care_recipient_name.clone();
        context.zip_code = user.zip_code.clone();
        context.journey_phase = user.journey_phase;
        context.burnout_score = user.burnout_score;
        context.burnout_confidence = user.burnout_confidence;
        context.burnout_band = user.burnout_band;
        context.pressure_zones = user.pressure_zones.clone();
        context.pressure_zone_scores = user.pressure_zone_scores.clone();
        context.onboarding_attempts = user.onboarding_attempts.clone();
        context.onboarding_cooldown_until = user.onboarding_cooldown_until;
        context.consent_at = user.consent_at;
        context.language_preference = user.language_preference.clone();
        context.historical_summary = user.historical_summary.clone();
        context.assessment_rate_limited = assessment_limited;

        let mut recent = self
            .store
            .recent_messages(user.id, RECENT_MESSAGE_WINDOW)
            .await?;
        recent.reverse(); // oldest first for the agent
        context.recent_messages = recent
            .into_iter()
            .map(|m| ContextMessage {
                role: match m.direction {
                    MessageDirection::Inbound => "user".to_string(),
                    MessageDirection::Outbound => "assistant".to_string(),
                },
                content: m.content,
                timestamp: m.created_at,
            })
            .collect();

        // An open session means mid-assessment: carry the full answer
        // history so the agent sees where the conversation stands
        if let Some(session) = self.store.get_open_session(user.id).await? {
            context.assessment_in_progress = true;
            context.assessment_type = Some(session.assessment);
            context.assessment_current_question = session.current_index;
            context.assessment_session_id = Some(session.id);
            for response in self.store.list_session_responses(session.id).await? {
                context
                    .assessment_responses
                    .insert(response.question_id, response.raw_value);
            }
        }

        Ok(context)
    }

    /// Returns the user's effective band after this turn, for the
    /// follow-up stage.
    async fn persist_turn(
        &self,
        user: &User,
        snapshot: &ConversationContext,
        updated: &ConversationContext,
        inbound_body: &str,
        reply: &str,
    ) -> Result<Option<BurnoutBand>, Error> {
        let now = Utc::now();

        // New session started this turn
        if let Some(session_id) = updated.assessment_session_id
            && snapshot.assessment_session_id != Some(session_id)
            && let Some(assessment) = updated.assessment_type
        {
            self.store
                .create_assessment_session(&AssessmentSession {
                    id: session_id,
                    user_id: user.id,
                    assessment,
                    total_questions: definition(assessment).questions.len(),
                    current_index: updated.assessment_current_question,
                    status: SessionStatus::InProgress,
                    started_at: now,
                    completed_at: None,
                })
                .await?;
        }

        // New answers, keyed by question id. Persisted unconditionally:
        // the final answer flips the in-progress flag off in the same
        // turn it must still be written.
        if let Some(session_id) = updated.assessment_session_id {
            let assessment = updated.assessment_type;
            for (question_id, raw) in &updated.assessment_responses {
                if snapshot.assessment_responses.contains_key(question_id) {
                    continue;
                }
                let score = assessment.and_then(|a| {
                    definition(a)
                        .questions
                        .iter()
                        .find(|q| q.id == question_id.as_str())
                        .and_then(|q| score_answer(q, raw))
                });
                self.store
                    .insert_assessment_response(&AssessmentResponse {
                        id: Uuid::new_v4(),
                        session_id,
                        question_id: question_id.clone(),
                        raw_value: raw.clone(),
                        score,
                        created_at: now,
                    })
                    .await?;
            }
            if updated.assessment_current_question != snapshot.assessment_current_question {
                self.store
                    .update_session_progress(session_id, updated.assessment_current_question)
                    .await?;
            }
        }

        // In-progress -> done: close the session and compute the composite
        let mut finalized = None;
        if snapshot.assessment_in_progress
            && !updated.assessment_in_progress
            && let Some(session_id) = updated.assessment_session_id
            && let Some(assessment) = updated.assessment_type
        {
            self.store
                .complete_assessment_session(session_id, now)
                .await?;
            finalized = self.finalize_assessment(user, assessment, updated).await?;
            info!(user_id = %user.id, session_id = %session_id, "Assessment session finalized");
        }

        // Inbound and outbound log rows, one batched write
        self.store.log_turn(user.id, inbound_body, reply).await?;

        // Fire-and-forget: durable context fields, wellness score row,
        // last-contact stamp. None of these block the reply.
        let mut record = user.clone();
        apply_context(&mut record, updated);
        if let Some(score) = &finalized {
            record.burnout_score = Some(score.score.overall);
            record.burnout_confidence = Some(score.score.confidence);
            record.burnout_band = Some(score.score.band);
            record.pressure_zones = score.score.pressure_zones.clone();
            record.pressure_zone_scores = score.score.pressure_zone_scores.clone();
        }
        let new_band = record.burnout_band;

        // Crisis stamps ride along on the same record so the detached
        // write cannot clobber them
        if snapshot.burnout_band != Some(BurnoutBand::Crisis) && new_band == Some(BurnoutBand::Crisis)
        {
            record.last_crisis_event_at = Some(now);
            record.crisis_followup_count = 0;
        }

        let store = self.store.clone();
        self.background.spawn("update-user-context", async move {
            store.update_user(&record).await
        });

        if let Some(row) = finalized {
            let store = self.store.clone();
            self.background
                .spawn("save-wellness-score", async move {
                    store.insert_wellness_score(&row).await
                });
        }

        let store = self.store.clone();
        let user_id = user.id;
        self.background.spawn("touch-last-contact", async move {
            store.touch_last_contact(user_id, now).await
        });

        Ok(new_band)
    }

    /// Score the finished instrument and fold it into the composite.
    /// Returns `None` when the session had no scorable answers.
    async fn finalize_assessment(
        &self,
        user: &User,
        assessment: AssessmentType,
        updated: &ConversationContext,
    ) -> Result<Option<WellnessScoreRow>, Error> {
        let scored = score_assessment(assessment, &updated.assessment_responses);
        let Some(overall) = scored.overall else {
            debug!(user_id = %user.id, "Session had no scorable answers, skipping composite");
            return Ok(None);
        };

        let now = Utc::now();
        let mut scores = BTreeMap::new();
        scores.insert(
            assessment,
            InstrumentScore {
                overall: Some(overall),
                subscales: scored.subscores.clone(),
                completed_at: now,
            },
        );

        let prior: Vec<PriorScore> = self
            .store
            .list_wellness_scores(user.id, PRIOR_SCORE_WINDOW)
            .await?
            .into_iter()
            .map(|row| PriorScore {
                overall: row.score.overall,
                calculated_at: row.created_at,
            })
            .collect();

        let composite = burnout::composite_at(&scores, &prior, now);
        Ok(Some(WellnessScoreRow {
            id: Uuid::new_v4(),
            user_id: user.id,
            score: composite,
            created_at: now,
        }))
    }

    async fn schedule_followups(
        &self,
        user: &User,
        snapshot: &ConversationContext,
        updated: &ConversationContext,
        new_band: Option<BurnoutBand>,
    ) -> Result<(), Error> {
        let now = Utc::now();

        let was_crisis = snapshot.burnout_band == Some(BurnoutBand::Crisis);
        let now_crisis = new_band == Some(BurnoutBand::Crisis);
        if !was_crisis && now_crisis {
            info!(user_id = %user.id, "User entered crisis band, scheduling follow-ups");
            schedule_crisis_followups(&self.store, user, now).await?;
        }

        let was_onboarding = snapshot.journey_phase == JourneyPhase::Onboarding;
        let now_active = updated.journey_phase == JourneyPhase::Active;
        if was_onboarding && now_active {
            info!(user_id = %user.id, "Onboarding complete, scheduling nudges");
            schedule_onboarding_nudges(&self.store, user, now).await?;
        }

        Ok(())
    }
}

/// Copy agent-writable context fields back onto the durable record.
fn apply_context(record: &mut User, context: &ConversationContext) {
    record.first_name = context.first_name.clone();
    record.relationship = context.relationship.clone();
    record.care_recipient_name = context.care_recipient_name.clone();
    record.zip_code = context.zip_code.clone();
    record.journey_phase = context.journey_phase;
    record.burnout_score = context.burnout_score;
    record.burnout_confidence = context.burnout_confidence;
    record.burnout_band = context.burnout_band;
    record.pressure_zones = context.pressure_zones.clone();
    record.pressure_zone_scores = context.pressure_zone_scores.clone();
    record.onboarding_attempts = context.onboarding_attempts.clone();
    record.onboarding_cooldown_until = context.onboarding_cooldown_until;
    record.consent_at = context.consent_at;
    record.language_preference = context.language_preference.clone();
    record.historical_summary = context.historical_summary.clone();
}
