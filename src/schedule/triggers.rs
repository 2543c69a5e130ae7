//! Recurring-trigger scheduler.
//!
//! Triggers are per-user persisted schedules driving proactive check-ins.
//! A periodic batch job selects everything due and processes each trigger
//! independently; one bad trigger never aborts the batch. Every branch
//! advances `next_occurrence`, so an occurrence is never processed twice
//! even when a later step fails (at-most-once send, at-least-once
//! reschedule).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::schedule::proactive::{
    CRISIS_FOLLOWUP_KIND, ONBOARDING_NUDGE_KIND, proactive_send_allowed,
};
use crate::schedule::recurrence;
use crate::sms::{SmsSender, truncate_body};
use crate::store::{Database, MessageDirection, ScheduledMessage, Trigger};

/// A trigger this much past due is considered missed (e.g. downtime);
/// it is advanced without sending to avoid flooding stale reminders.
const MISSED_CUTOFF_HOURS: i64 = 24;

/// Outcome counters for one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Schedules and fires recurring triggers.
pub struct TriggerScheduler {
    store: Arc<dyn Database>,
    sms: Arc<dyn SmsSender>,
    // Guards against overlapping batch ticks; an overlapping run is
    // skipped rather than queued
    run_lock: Mutex<()>,
}

enum ItemOutcome {
    Sent,
    Skipped,
}

impl TriggerScheduler {
    pub fn new(store: Arc<dyn Database>, sms: Arc<dyn SmsSender>) -> Self {
        Self {
            store,
            sms,
            run_lock: Mutex::new(()),
        }
    }

    /// Create a trigger, or update the user's existing enabled trigger of
    /// the same type in place. The rule and timezone are validated before
    /// anything is persisted.
    pub async fn create_or_update(
        &self,
        user_id: Uuid,
        rule: &str,
        trigger_type: &str,
        message: &str,
        timezone: &str,
    ) -> Result<Uuid, Error> {
        let now = Utc::now();
        let next = recurrence::next_occurrence(rule, timezone, now)?;

        let id = self
            .store
            .upsert_trigger(&Trigger {
                id: Uuid::new_v4(),
                user_id,
                trigger_type: trigger_type.to_string(),
                rrule: rule.to_string(),
                timezone: timezone.to_string(),
                message: message.to_string(),
                enabled: true,
                next_occurrence: next,
                last_triggered_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!(
            trigger_id = %id,
            user_id = %user_id,
            trigger_type,
            next_occurrence = %next,
            "Trigger scheduled"
        );
        Ok(id)
    }

    /// Disable a trigger. Occurrences that elapse while disabled are
    /// discarded, not replayed.
    pub async fn disable(&self, trigger_id: Uuid) -> Result<(), Error> {
        self.store
            .set_trigger_enabled(trigger_id, false, None)
            .await?;
        debug!(trigger_id = %trigger_id, "Trigger disabled");
        Ok(())
    }

    /// Re-enable a trigger, recomputing `next_occurrence` from now.
    pub async fn enable(&self, trigger_id: Uuid) -> Result<(), Error> {
        let trigger = self
            .store
            .get_trigger(trigger_id)
            .await?
            .ok_or_else(|| crate::error::DatabaseError::NotFound {
                entity: "trigger".to_string(),
                id: trigger_id.to_string(),
            })?;

        let next = recurrence::next_occurrence(&trigger.rrule, &trigger.timezone, Utc::now())?;
        self.store
            .set_trigger_enabled(trigger_id, true, Some(next))
            .await?;
        debug!(trigger_id = %trigger_id, next_occurrence = %next, "Trigger enabled");
        Ok(())
    }

    /// Process every due trigger. Invoked from the periodic batch tick.
    pub async fn process_due(&self) -> BatchStats {
        self.process_due_at(Utc::now()).await
    }

    /// Clock-injected variant of [`process_due`].
    pub async fn process_due_at(&self, now: DateTime<Utc>) -> BatchStats {
        let Ok(_guard) = self.run_lock.try_lock() else {
            debug!("Trigger batch already running, skipping tick");
            return BatchStats::default();
        };

        let due = match self.store.list_due_triggers(now).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Failed to load due triggers");
                return BatchStats {
                    errors: 1,
                    ..BatchStats::default()
                };
            }
        };

        let mut stats = BatchStats {
            total: due.len(),
            ..BatchStats::default()
        };

        for trigger in due {
            match self.process_one(&trigger, now).await {
                Ok(ItemOutcome::Sent) => stats.processed += 1,
                Ok(ItemOutcome::Skipped) => stats.skipped += 1,
                Err(e) => {
                    warn!(
                        trigger_id = %trigger.id,
                        user_id = %trigger.user_id,
                        error = %e,
                        "Trigger processing failed"
                    );
                    stats.errors += 1;
                }
            }
        }

        if stats.total > 0 {
            info!(
                total = stats.total,
                sent = stats.processed,
                skipped = stats.skipped,
                errors = stats.errors,
                "Trigger batch complete"
            );
        }
        stats
    }

    /// Dispatch due one-shot scheduled messages (crisis follow-ups,
    /// onboarding nudges). Every due row is consumed whether or not a
    /// send happens, so a blocked send is dropped rather than retried
    /// into staleness.
    pub async fn process_due_messages(&self) -> BatchStats {
        self.process_due_messages_at(Utc::now()).await
    }

    pub async fn process_due_messages_at(&self, now: DateTime<Utc>) -> BatchStats {
        let due = match self.store.list_due_scheduled_messages(now).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Failed to load due scheduled messages");
                return BatchStats {
                    errors: 1,
                    ..BatchStats::default()
                };
            }
        };

        let mut stats = BatchStats {
            total: due.len(),
            ..BatchStats::default()
        };

        for msg in due {
            match self.dispatch_one(&msg, now).await {
                Ok(ItemOutcome::Sent) => stats.processed += 1,
                Ok(ItemOutcome::Skipped) => stats.skipped += 1,
                Err(e) => {
                    warn!(
                        message_id = %msg.id,
                        user_id = %msg.user_id,
                        kind = %msg.kind,
                        error = %e,
                        "Scheduled message dispatch failed"
                    );
                    stats.errors += 1;
                }
            }
        }

        if stats.total > 0 {
            info!(
                total = stats.total,
                sent = stats.processed,
                skipped = stats.skipped,
                errors = stats.errors,
                "Scheduled message batch complete"
            );
        }
        stats
    }

    async fn dispatch_one(
        &self,
        msg: &ScheduledMessage,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, Error> {
        let user = self
            .store
            .get_user(msg.user_id)
            .await?
            .ok_or_else(|| crate::error::DatabaseError::NotFound {
                entity: "user".to_string(),
                id: msg.user_id.to_string(),
            })?;

        // A completed profile makes the remaining nudges pointless
        if msg.kind == ONBOARDING_NUDGE_KIND
            && user.first_name.is_some()
            && user.relationship.is_some()
            && user.care_recipient_name.is_some()
            && user.zip_code.is_some()
        {
            self.store
                .cancel_scheduled_messages(user.id, ONBOARDING_NUDGE_KIND)
                .await?;
            debug!(user_id = %user.id, "Profile complete, nudges canceled");
            return Ok(ItemOutcome::Skipped);
        }

        if !user.subscription_status.is_subscribed() || !proactive_send_allowed(&user, now) {
            self.store.mark_scheduled_message_sent(msg.id, now).await?;
            debug!(message_id = %msg.id, "Scheduled send suppressed");
            return Ok(ItemOutcome::Skipped);
        }

        // Consume before dispatch, same at-most-once stance as triggers
        self.store.mark_scheduled_message_sent(msg.id, now).await?;
        self.sms
            .send(&user.phone, truncate_body(&msg.message))
            .await?;
        self.store
            .log_message(user.id, MessageDirection::Outbound, &msg.message)
            .await?;
        self.store.touch_last_proactive(user.id, now).await?;

        if msg.kind == CRISIS_FOLLOWUP_KIND {
            let mut record = user;
            record.crisis_followup_count += 1;
            self.store.update_user(&record).await?;
        }

        Ok(ItemOutcome::Sent)
    }

    async fn process_one(&self, trigger: &Trigger, now: DateTime<Utc>) -> Result<ItemOutcome, Error> {
        let next = recurrence::next_occurrence(&trigger.rrule, &trigger.timezone, now)?;

        // Long-missed occurrence (downtime recovery): advance without
        // sending so the user isn't flooded with stale reminders
        if now - trigger.next_occurrence > Duration::hours(MISSED_CUTOFF_HOURS) {
            self.store
                .update_trigger_schedule(trigger.id, next, None)
                .await?;
            debug!(trigger_id = %trigger.id, "Missed occurrence skipped");
            return Ok(ItemOutcome::Skipped);
        }

        let user = self
            .store
            .get_user(trigger.user_id)
            .await?
            .ok_or_else(|| crate::error::DatabaseError::NotFound {
                entity: "user".to_string(),
                id: trigger.user_id.to_string(),
            })?;

        if !user.subscription_status.is_subscribed() {
            self.store
                .update_trigger_schedule(trigger.id, next, Some(now))
                .await?;
            debug!(trigger_id = %trigger.id, "Subscription inactive, send skipped");
            return Ok(ItemOutcome::Skipped);
        }

        if !proactive_send_allowed(&user, now) {
            self.store
                .update_trigger_schedule(trigger.id, next, None)
                .await?;
            debug!(trigger_id = %trigger.id, "Proactive dedup blocked send");
            return Ok(ItemOutcome::Skipped);
        }

        // Advance before dispatch: a send failure must not cause a
        // duplicate send on the next tick
        self.store
            .update_trigger_schedule(trigger.id, next, Some(now))
            .await?;

        self.sms
            .send(&user.phone, truncate_body(&trigger.message))
            .await?;
        self.store
            .log_message(user.id, MessageDirection::Outbound, &trigger.message)
            .await?;
        self.store.touch_last_proactive(user.id, now).await?;

        debug!(
            trigger_id = %trigger.id,
            user_id = %user.id,
            next_occurrence = %next,
            "Trigger fired"
        );
        Ok(ItemOutcome::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SubscriptionStatus;
    use crate::error::SmsError;
    use crate::store::{LibSqlBackend, User};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct RecordingSender {
        sent: StdMutex<Vec<(String, String)>>,
    }

    impl RecordingSender {
        fn new() -> Self {
            Self {
                sent: StdMutex::new(Vec::new()),
            }
        }

        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SmsSender for RecordingSender {
        async fn send(&self, to: &str, body: &str) -> Result<(), SmsError> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), body.to_string()));
            Ok(())
        }
    }

    async fn scenario() -> (Arc<dyn Database>, Arc<RecordingSender>, TriggerScheduler) {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let sender = Arc::new(RecordingSender::new());
        let scheduler = TriggerScheduler::new(store.clone(), sender.clone());
        (store, sender, scheduler)
    }

    async fn subscribed_user(store: &Arc<dyn Database>, phone: &str) -> User {
        let mut user = User::new(phone);
        user.subscription_status = SubscriptionStatus::Active;
        store.create_user(&user).await.unwrap();
        user
    }

    #[tokio::test]
    async fn due_trigger_sends_and_advances() {
        let (store, sender, scheduler) = scenario().await;
        let user = subscribed_user(&store, "+15550100001").await;

        let id = scheduler
            .create_or_update(
                user.id,
                "FREQ=DAILY;BYHOUR=9;BYMINUTE=0",
                "daily_checkin",
                "Morning check-in: how are you feeling?",
                "America/New_York",
            )
            .await
            .unwrap();

        let trigger = store.get_trigger(id).await.unwrap().unwrap();
        let now = trigger.next_occurrence + Duration::minutes(5);

        let stats = scheduler.process_due_at(now).await;
        assert_eq!(stats.processed, 1);
        assert_eq!(sender.count(), 1);

        let advanced = store.get_trigger(id).await.unwrap().unwrap();
        assert!(advanced.next_occurrence > now);
        assert_eq!(advanced.last_triggered_at, Some(now));

        // Conversation log carries the outbound message
        let log = store.recent_messages(user.id, 5).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].direction, MessageDirection::Outbound);
    }

    #[tokio::test]
    async fn long_missed_trigger_advances_without_sending() {
        let (store, sender, scheduler) = scenario().await;
        let user = subscribed_user(&store, "+15550100002").await;

        let id = scheduler
            .create_or_update(
                user.id,
                "FREQ=DAILY;BYHOUR=9;BYMINUTE=0",
                "daily_checkin",
                "Morning check-in",
                "America/New_York",
            )
            .await
            .unwrap();

        let trigger = store.get_trigger(id).await.unwrap().unwrap();
        let now = trigger.next_occurrence + Duration::hours(30);

        let stats = scheduler.process_due_at(now).await;
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.processed, 0);
        assert_eq!(sender.count(), 0);

        let advanced = store.get_trigger(id).await.unwrap().unwrap();
        assert!(advanced.next_occurrence > now);
        assert_eq!(advanced.last_triggered_at, None);
    }

    #[tokio::test]
    async fn inactive_subscription_skips_send_but_advances() {
        let (store, sender, scheduler) = scenario().await;
        let user = User::new("+15550100003");
        store.create_user(&user).await.unwrap();

        let id = scheduler
            .create_or_update(
                user.id,
                "FREQ=DAILY;BYHOUR=9;BYMINUTE=0",
                "daily_checkin",
                "Morning check-in",
                "America/New_York",
            )
            .await
            .unwrap();

        let trigger = store.get_trigger(id).await.unwrap().unwrap();
        let now = trigger.next_occurrence + Duration::minutes(5);

        let stats = scheduler.process_due_at(now).await;
        assert_eq!(stats.skipped, 1);
        assert_eq!(sender.count(), 0);

        let advanced = store.get_trigger(id).await.unwrap().unwrap();
        assert!(advanced.next_occurrence > now);
        assert_eq!(advanced.last_triggered_at, Some(now));
    }

    #[tokio::test]
    async fn processing_twice_does_not_double_send() {
        let (store, sender, scheduler) = scenario().await;
        let user = subscribed_user(&store, "+15550100004").await;

        let id = scheduler
            .create_or_update(
                user.id,
                "FREQ=DAILY;BYHOUR=9;BYMINUTE=0",
                "daily_checkin",
                "Morning check-in",
                "America/New_York",
            )
            .await
            .unwrap();

        let trigger = store.get_trigger(id).await.unwrap().unwrap();
        let now = trigger.next_occurrence + Duration::minutes(5);

        let first = scheduler.process_due_at(now).await;
        let second = scheduler.process_due_at(now).await;

        assert_eq!(first.processed, 1);
        assert_eq!(second.total, 0);
        assert_eq!(sender.count(), 1);
    }

    #[tokio::test]
    async fn recent_contact_blocks_the_send() {
        let (store, sender, scheduler) = scenario().await;
        let mut user = User::new("+15550100005");
        user.subscription_status = SubscriptionStatus::Trialing;
        store.create_user(&user).await.unwrap();

        let id = scheduler
            .create_or_update(
                user.id,
                "FREQ=DAILY;BYHOUR=9;BYMINUTE=0",
                "daily_checkin",
                "Morning check-in",
                "America/New_York",
            )
            .await
            .unwrap();

        let trigger = store.get_trigger(id).await.unwrap().unwrap();
        let now = trigger.next_occurrence + Duration::minutes(5);
        store
            .touch_last_contact(user.id, now - Duration::hours(2))
            .await
            .unwrap();

        let stats = scheduler.process_due_at(now).await;
        assert_eq!(stats.skipped, 1);
        assert_eq!(sender.count(), 0);
    }

    #[tokio::test]
    async fn bad_rule_is_rejected_before_persisting() {
        let (store, _sender, scheduler) = scenario().await;
        let user = subscribed_user(&store, "+15550100006").await;

        let result = scheduler
            .create_or_update(
                user.id,
                "FREQ=SOMETIMES",
                "daily_checkin",
                "Morning check-in",
                "America/New_York",
            )
            .await;
        assert!(result.is_err());
        assert!(
            store
                .get_enabled_trigger(user.id, "daily_checkin")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn due_crisis_followup_sends_and_bumps_the_counter() {
        let (store, sender, scheduler) = scenario().await;
        let user = subscribed_user(&store, "+15550100008").await;

        let past = Utc::now() - Duration::days(2);
        crate::schedule::proactive::schedule_crisis_followups(&store, &user, past)
            .await
            .unwrap();

        // Only the day-1 stage is due
        let stats = scheduler.process_due_messages_at(Utc::now()).await;
        assert_eq!(stats.total, 1);
        assert_eq!(stats.processed, 1);
        assert_eq!(sender.count(), 1);

        let stamped = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(stamped.crisis_followup_count, 1);
        assert!(stamped.last_proactive_message_at.is_some());

        // Consumed: a second pass finds nothing
        let again = scheduler.process_due_messages_at(Utc::now()).await;
        assert_eq!(again.total, 0);
        assert_eq!(sender.count(), 1);
    }

    #[tokio::test]
    async fn completed_profile_cancels_remaining_nudges() {
        let (store, sender, scheduler) = scenario().await;
        let mut user = User::new("+15550100009");
        user.subscription_status = SubscriptionStatus::Active;
        user.first_name = Some("Maria".to_string());
        user.relationship = Some("daughter".to_string());
        user.care_recipient_name = Some("Mom".to_string());
        user.zip_code = Some("94110".to_string());
        store.create_user(&user).await.unwrap();

        let past = Utc::now() - Duration::days(6);
        crate::schedule::proactive::schedule_onboarding_nudges(&store, &user, past)
            .await
            .unwrap();

        let stats = scheduler.process_due_messages_at(Utc::now()).await;
        assert_eq!(stats.skipped, stats.total);
        assert_eq!(sender.count(), 0);

        // Both nudges are gone, not just the due ones
        let remaining = store
            .list_due_scheduled_messages(Utc::now() + Duration::days(30))
            .await
            .unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn reenable_recomputes_next_occurrence() {
        let (store, _sender, scheduler) = scenario().await;
        let user = subscribed_user(&store, "+15550100007").await;

        let id = scheduler
            .create_or_update(
                user.id,
                "FREQ=DAILY;BYHOUR=9;BYMINUTE=0",
                "daily_checkin",
                "Morning check-in",
                "America/New_York",
            )
            .await
            .unwrap();

        scheduler.disable(id).await.unwrap();
        assert!(
            store
                .get_enabled_trigger(user.id, "daily_checkin")
                .await
                .unwrap()
                .is_none()
        );

        scheduler.enable(id).await.unwrap();
        let trigger = store.get_trigger(id).await.unwrap().unwrap();
        assert!(trigger.enabled);
        assert!(trigger.next_occurrence > Utc::now());
    }
}
