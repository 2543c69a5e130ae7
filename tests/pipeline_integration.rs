//! End-to-end pipeline tests against an in-memory database.
//!
//! Each test wires the real pipeline to a scripted agent and a recording
//! transport, then drives it with inbound messages.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use givecare::agent::{AgentRuntime, AgentTurn};
use givecare::assessment::{AnswerOutcome, AssessmentEngine, AssessmentType, StartOutcome};
use givecare::burnout::BurnoutBand;
use givecare::config::ServiceConfig;
use givecare::context::{ConversationContext, JourneyPhase, SubscriptionStatus};
use givecare::error::{AgentError, ValidationError};
use givecare::limits::{Bucket, RateLimiter};
use givecare::pipeline::MessagePipeline;
use givecare::sms::{InboundSms, SignatureValidator};
use givecare::store::{Database, LibSqlBackend, SessionStatus, User};

// ── Test doubles ────────────────────────────────────────────────────

struct AllowAll;

impl SignatureValidator for AllowAll {
    fn validate(
        &self,
        _signature: &str,
        _url: &str,
        _params: &HashMap<String, String>,
    ) -> Result<(), ValidationError> {
        Ok(())
    }
}

struct RejectAll;

impl SignatureValidator for RejectAll {
    fn validate(
        &self,
        _signature: &str,
        url: &str,
        _params: &HashMap<String, String>,
    ) -> Result<(), ValidationError> {
        Err(ValidationError::InvalidSignature {
            url: url.to_string(),
        })
    }
}

enum Script {
    /// Reply "ok" and change nothing.
    Echo,
    /// Drive the assessment engine: "check in" starts an EMA session,
    /// anything else is recorded as an answer.
    Assessment,
    /// Push the user into the crisis band.
    Crisis,
    /// Always fail.
    Fail,
}

struct ScriptedAgent {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedAgent {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentRuntime for ScriptedAgent {
    async fn run_turn(
        &self,
        message: &str,
        mut context: ConversationContext,
    ) -> Result<AgentTurn, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let reply = match self.script {
            Script::Echo => "ok".to_string(),
            Script::Assessment => {
                if context.assessment_in_progress {
                    match AssessmentEngine::record_answer(&mut context, message)
                        .map_err(|e| AgentError::Execution(e.to_string()))?
                    {
                        AnswerOutcome::NextPrompt { prompt } => prompt,
                        AnswerOutcome::Complete { .. } => "Thanks for checking in \u{1f499}".to_string(),
                        AnswerOutcome::InsufficientData { message } => message,
                    }
                } else {
                    match AssessmentEngine::start(&mut context, AssessmentType::Ema) {
                        StartOutcome::Started { prompt, .. } => prompt,
                        StartOutcome::RateLimited { message } => message,
                    }
                }
            }
            Script::Crisis => {
                context.burnout_score = Some(15.0);
                context.burnout_band = Some(BurnoutBand::Crisis);
                "I'm here with you \u{1f499}".to_string()
            }
            Script::Fail => return Err(AgentError::Execution("backend unavailable".to_string())),
        };

        Ok(AgentTurn {
            message: reply,
            context,
            agent_name: "main".to_string(),
            tool_calls: Vec::new(),
            token_usage: None,
        })
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    store: Arc<dyn Database>,
    agent: Arc<ScriptedAgent>,
    pipeline: MessagePipeline,
}

async fn harness(script: Script) -> Harness {
    let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let agent = ScriptedAgent::new(script);
    let pipeline = MessagePipeline::new(
        ServiceConfig::default(),
        store.clone(),
        Arc::new(RateLimiter::new()),
        agent.clone(),
        Arc::new(AllowAll),
    );
    Harness {
        store,
        agent,
        pipeline,
    }
}

fn inbound(from: &str, body: &str) -> InboundSms {
    InboundSms {
        from: from.to_string(),
        body: body.to_string(),
        message_sid: "SM0001".to_string(),
        signature: "sig".to_string(),
        request_url: "https://example.test/sms".to_string(),
        raw_params: HashMap::new(),
    }
}

async fn subscribed_user(store: &Arc<dyn Database>, phone: &str) -> User {
    let mut user = User::new(phone);
    user.subscription_status = SubscriptionStatus::Active;
    user.journey_phase = JourneyPhase::Active;
    store.create_user(&user).await.unwrap();
    user
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_sender_is_created_and_gated_to_signup() {
    let h = harness(Script::Echo).await;

    let reply = h.pipeline.handle(&inbound("+15552000001", "hi")).await.unwrap();
    let body = reply.message.unwrap();
    assert!(body.contains("https://www.givecareapp.com/signup"));

    let user = h
        .store
        .get_user_by_phone("+15552000001")
        .await
        .unwrap()
        .expect("user row created");

    // The gated turn is still logged, both directions
    let log = h.store.recent_messages(user.id, 10).await.unwrap();
    assert_eq!(log.len(), 2);

    // The agent was never consulted
    assert_eq!(h.agent.call_count(), 0);
}

#[tokio::test]
async fn subscribed_user_reaches_the_agent() {
    let h = harness(Script::Echo).await;
    let user = subscribed_user(&h.store, "+15552000002").await;

    let reply = h
        .pipeline
        .handle(&inbound("+15552000002", "hello"))
        .await
        .unwrap();
    assert_eq!(reply.message.as_deref(), Some("ok"));
    assert_eq!(h.agent.call_count(), 1);
    assert!(reply.error.is_none());

    h.pipeline.background().flush().await;
    let stamped = h.store.get_user(user.id).await.unwrap().unwrap();
    assert!(stamped.last_contact_at.is_some());
}

#[tokio::test]
async fn daily_sms_budget_denies_without_delegation_once_spent() {
    let h = harness(Script::Echo).await;
    subscribed_user(&h.store, "+15552000003").await;

    // sms-per-user holds 13 tokens (rate 10/day + burst 3) for a fresh key
    for i in 0..13 {
        let reply = h
            .pipeline
            .handle(&inbound("+15552000003", "hello"))
            .await
            .unwrap();
        assert_eq!(reply.message.as_deref(), Some("ok"), "message {i}");
    }

    let denied = h
        .pipeline
        .handle(&inbound("+15552000003", "hello again"))
        .await
        .unwrap();
    assert_eq!(
        denied.message.as_deref(),
        Some(Bucket::SmsPerUser.config().reply)
    );
    assert_eq!(h.agent.call_count(), 13);
}

#[tokio::test]
async fn spam_exhaustion_drops_with_no_reply_at_all() {
    let h = harness(Script::Echo).await;
    subscribed_user(&h.store, "+15552000004").await;

    // Every check consumes a spam token (capacity 25), including the
    // turns the per-user SMS budget already denies
    for _ in 0..25 {
        h.pipeline
            .handle(&inbound("+15552000004", "hello"))
            .await
            .unwrap();
    }

    let dropped = h
        .pipeline
        .handle(&inbound("+15552000004", "hello"))
        .await
        .unwrap();
    assert_eq!(dropped.message, None);
}

#[tokio::test]
async fn assessment_runs_end_to_end_through_the_pipeline() {
    let h = harness(Script::Assessment).await;
    let user = subscribed_user(&h.store, "+15552000005").await;

    let first = h
        .pipeline
        .handle(&inbound("+15552000005", "check in"))
        .await
        .unwrap();
    assert!(first.message.unwrap().starts_with("(1/3)"));

    let session = h
        .store
        .get_open_session(user.id)
        .await
        .unwrap()
        .expect("session row created");
    assert_eq!(session.assessment, AssessmentType::Ema);

    let second = h
        .pipeline
        .handle(&inbound("+15552000005", "5"))
        .await
        .unwrap();
    assert!(second.message.unwrap().starts_with("(2/3)"));

    let third = h
        .pipeline
        .handle(&inbound("+15552000005", "2"))
        .await
        .unwrap();
    assert!(third.message.unwrap().starts_with("(3/3)"));

    let last = h
        .pipeline
        .handle(&inbound("+15552000005", "4"))
        .await
        .unwrap();
    assert!(last.message.unwrap().contains("Thanks for checking in"));
    h.pipeline.background().flush().await;

    // Session closed exactly once, one row per question
    let closed = h
        .store
        .get_assessment_session(session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(closed.status, SessionStatus::Complete);
    assert!(h.store.get_open_session(user.id).await.unwrap().is_none());

    let responses = h.store.list_session_responses(session.id).await.unwrap();
    assert_eq!(responses.len(), 3);
    assert!(responses.iter().all(|r| r.score.is_some()));

    // Exactly one composite landed in the time series
    let scores = h.store.list_wellness_scores(user.id, 10).await.unwrap();
    assert_eq!(scores.len(), 1);
    let composite = &scores[0].score;
    assert!((0.0..=100.0).contains(&composite.overall));
    assert!((0.0..=1.0).contains(&composite.confidence));

    // Durable record carries the new wellness state
    let stamped = h.store.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(stamped.burnout_score, Some(composite.overall));
    assert_eq!(stamped.burnout_band, Some(composite.band));
}

#[tokio::test]
async fn mid_assessment_state_survives_across_turns() {
    let h = harness(Script::Assessment).await;
    let user = subscribed_user(&h.store, "+15552000006").await;

    h.pipeline
        .handle(&inbound("+15552000006", "check in"))
        .await
        .unwrap();
    h.pipeline
        .handle(&inbound("+15552000006", "3"))
        .await
        .unwrap();

    // The open session carries the answered question
    let session = h.store.get_open_session(user.id).await.unwrap().unwrap();
    assert_eq!(session.current_index, 1);
    let responses = h.store.list_session_responses(session.id).await.unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].question_id, "ema_1");
    assert_eq!(responses[0].raw_value, "3");
}

#[tokio::test]
async fn agent_failure_becomes_the_fallback_reply() {
    let h = harness(Script::Fail).await;
    subscribed_user(&h.store, "+15552000007").await;

    let reply = h
        .pipeline
        .handle(&inbound("+15552000007", "hello"))
        .await
        .unwrap();
    assert_eq!(
        reply.message.as_deref(),
        Some("Sorry, I'm having trouble right now. Please try again in a moment.")
    );
    assert!(reply.error.is_some());
}

#[tokio::test]
async fn entering_crisis_band_schedules_the_followup_cascade() {
    let h = harness(Script::Crisis).await;
    let user = subscribed_user(&h.store, "+15552000008").await;

    h.pipeline
        .handle(&inbound("+15552000008", "I can't do this anymore"))
        .await
        .unwrap();
    h.pipeline.background().flush().await;

    let pending = h
        .store
        .list_due_scheduled_messages(Utc::now() + Duration::days(40))
        .await
        .unwrap();
    assert_eq!(pending.len(), 7);
    assert!(pending.iter().all(|m| m.kind == "crisis_followup"));

    let stamped = h.store.get_user(user.id).await.unwrap().unwrap();
    assert!(stamped.last_crisis_event_at.is_some());
    assert_eq!(stamped.crisis_followup_count, 0);
    assert_eq!(stamped.burnout_band, Some(BurnoutBand::Crisis));
}

#[tokio::test]
async fn bad_signature_rejects_the_request_outright() {
    let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let agent = ScriptedAgent::new(Script::Echo);
    let pipeline = MessagePipeline::new(
        ServiceConfig::default(),
        store.clone(),
        Arc::new(RateLimiter::new()),
        agent.clone(),
        Arc::new(RejectAll),
    );

    let result = pipeline.handle(&inbound("+15552000009", "hello")).await;
    assert!(result.is_err());
    assert_eq!(agent.call_count(), 0);

    // No side effects before validation
    assert!(
        store
            .get_user_by_phone("+15552000009")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn band_table_matches_the_fixed_cutoffs() {
    for (score, band) in [
        (15.0, BurnoutBand::Crisis),
        (25.0, BurnoutBand::High),
        (45.0, BurnoutBand::Moderate),
        (65.0, BurnoutBand::Mild),
        (85.0, BurnoutBand::Thriving),
    ] {
        assert_eq!(BurnoutBand::from_score(score), band, "score {score}");
    }
}
