//! Proactive-send dedup and staged follow-up sequences.
//!
//! Every system-initiated send path consults [`proactive_send_allowed`]
//! before dispatching. Crisis and onboarding follow-ups are persisted as
//! scheduled-message rows so they survive restarts and can be canceled
//! as a group.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::{Database, ScheduledMessage, User};

/// Dedup window for proactive sends.
const DEDUP_WINDOW_HOURS: i64 = 24;

/// Scheduled-message kind for the crisis cascade.
pub const CRISIS_FOLLOWUP_KIND: &str = "crisis_followup";

/// Scheduled-message kind for onboarding nudges.
pub const ONBOARDING_NUDGE_KIND: &str = "onboarding_nudge";

/// Whether a proactive message may be sent to this user right now.
///
/// Rejected when a proactive message already went out within the last
/// 24 hours, or when the user has contacted us within the last 24 hours.
/// An active conversation is enough engagement; don't pile on.
pub fn proactive_send_allowed(user: &User, now: DateTime<Utc>) -> bool {
    let window_start = now - Duration::hours(DEDUP_WINDOW_HOURS);

    if let Some(last_proactive) = user.last_proactive_message_at
        && last_proactive > window_start
    {
        return false;
    }

    if let Some(last_contact) = user.last_contact_at
        && last_contact > window_start
    {
        return false;
    }

    true
}

/// Crisis follow-up cadence: (days after the crisis event, message body).
/// Personalized with the user's first name at schedule time when known.
pub const CRISIS_FOLLOWUP_STAGES: [(i64, &str); 7] = [
    (
        1,
        "Checking in after yesterday{name}. How are you doing today? I'm here if you need support \u{1f499}",
    ),
    (3, "Hi{name}, thinking of you. How have the past few days been?"),
    (
        7,
        "It's been a week{name}. How are you feeling? I'm here anytime \u{1f499}",
    ),
    (14, "Checking in this week{name}. How are things?"),
    (21, "Hi{name}, how's this week treating you? \u{1f499}"),
    (28, "Checking in{name}. How are you doing?"),
    (35, "Hi{name}, how are things going this week?"),
];

/// Onboarding nudge cadence: (hours after completion, message body).
pub const ONBOARDING_NUDGE_STAGES: [(i64, &str); 2] = [
    (
        48,
        "Hey! Have a moment to finish setting up your profile? It helps me support you better \u{1f499}",
    ),
    (
        120,
        "Just checking in - we'd love to support you. Finishing your profile takes 2 minutes \u{1f499}",
    ),
];

fn personalize(template: &str, first_name: Option<&str>) -> String {
    match first_name {
        Some(name) => template.replace("{name}", &format!(", {name}")),
        None => template.replace("{name}", ""),
    }
}

/// Schedule the 7-stage crisis follow-up cascade for a user who just
/// entered the crisis band. Any pending cascade from an earlier event is
/// canceled first so the user never receives interleaved sequences.
pub async fn schedule_crisis_followups(
    store: &Arc<dyn Database>,
    user: &User,
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let canceled = store
        .cancel_scheduled_messages(user.id, CRISIS_FOLLOWUP_KIND)
        .await?;

    for (days, template) in CRISIS_FOLLOWUP_STAGES {
        store
            .insert_scheduled_message(&ScheduledMessage {
                id: Uuid::new_v4(),
                user_id: user.id,
                kind: CRISIS_FOLLOWUP_KIND.to_string(),
                message: personalize(template, user.first_name.as_deref()),
                send_at: now + Duration::days(days),
                sent_at: None,
                canceled: false,
                created_at: now,
            })
            .await?;
    }

    info!(
        user_id = %user.id,
        stages = CRISIS_FOLLOWUP_STAGES.len(),
        replaced = canceled,
        "Crisis follow-up cascade scheduled"
    );
    Ok(CRISIS_FOLLOWUP_STAGES.len())
}

/// Schedule the profile-completion nudge sequence after onboarding
/// finishes. The batch job re-checks profile completeness and the dedup
/// policy at send time, so scheduling is unconditional here.
pub async fn schedule_onboarding_nudges(
    store: &Arc<dyn Database>,
    user: &User,
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    store
        .cancel_scheduled_messages(user.id, ONBOARDING_NUDGE_KIND)
        .await?;

    for (hours, message) in ONBOARDING_NUDGE_STAGES {
        store
            .insert_scheduled_message(&ScheduledMessage {
                id: Uuid::new_v4(),
                user_id: user.id,
                kind: ONBOARDING_NUDGE_KIND.to_string(),
                message: message.to_string(),
                send_at: now + Duration::hours(hours),
                sent_at: None,
                canceled: false,
                created_at: now,
            })
            .await?;
    }

    info!(user_id = %user.id, "Onboarding nudge sequence scheduled");
    Ok(ONBOARDING_NUDGE_STAGES.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    fn user_with(
        last_proactive_hours_ago: Option<i64>,
        last_contact_hours_ago: Option<i64>,
        now: DateTime<Utc>,
    ) -> User {
        let mut user = User::new("+15550001111");
        user.last_proactive_message_at = last_proactive_hours_ago.map(|h| now - Duration::hours(h));
        user.last_contact_at = last_contact_hours_ago.map(|h| now - Duration::hours(h));
        user
    }

    #[test]
    fn recent_proactive_send_blocks() {
        let now = Utc::now();
        assert!(!proactive_send_allowed(&user_with(Some(2), None, now), now));
    }

    #[test]
    fn stale_proactive_send_allows() {
        let now = Utc::now();
        assert!(proactive_send_allowed(&user_with(Some(25), None, now), now));
    }

    #[test]
    fn active_conversation_blocks() {
        let now = Utc::now();
        assert!(!proactive_send_allowed(
            &user_with(Some(25), Some(1), now),
            now
        ));
    }

    #[test]
    fn quiet_user_allows() {
        let now = Utc::now();
        assert!(proactive_send_allowed(&user_with(None, None, now), now));
    }

    #[test]
    fn personalization_inserts_name_with_comma() {
        assert_eq!(
            personalize("Hi{name}, thinking of you.", Some("Maria")),
            "Hi, Maria, thinking of you."
        );
        assert_eq!(
            personalize("Hi{name}, thinking of you.", None),
            "Hi, thinking of you."
        );
    }

    #[tokio::test]
    async fn crisis_cascade_replaces_pending_stages() {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let user = User::new("+15550002222");
        store.create_user(&user).await.unwrap();

        let now = Utc::now();
        schedule_crisis_followups(&store, &user, now).await.unwrap();
        schedule_crisis_followups(&store, &user, now).await.unwrap();

        // Only the second cascade remains pending
        let due = store
            .list_due_scheduled_messages(now + Duration::days(40))
            .await
            .unwrap();
        assert_eq!(due.len(), CRISIS_FOLLOWUP_STAGES.len());
        assert!(due.iter().all(|m| m.kind == CRISIS_FOLLOWUP_KIND));
    }

    #[tokio::test]
    async fn cascade_stage_offsets_match_the_cadence() {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let mut user = User::new("+15550003333");
        user.first_name = Some("Ana".to_string());
        store.create_user(&user).await.unwrap();

        let now = Utc::now();
        schedule_crisis_followups(&store, &user, now).await.unwrap();

        let mut due = store
            .list_due_scheduled_messages(now + Duration::days(40))
            .await
            .unwrap();
        due.sort_by_key(|m| m.send_at);

        for ((days, _), msg) in CRISIS_FOLLOWUP_STAGES.iter().zip(&due) {
            assert_eq!(msg.send_at, now + Duration::days(*days));
            assert!(msg.message.contains("Ana"));
        }
    }
}
