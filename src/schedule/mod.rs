//! Proactive messaging: recurrence math, the trigger scheduler batch
//! job, and staged follow-up sequences.

pub mod proactive;
pub mod recurrence;
pub mod triggers;

pub use proactive::{
    CRISIS_FOLLOWUP_STAGES, ONBOARDING_NUDGE_STAGES, proactive_send_allowed,
    schedule_crisis_followups, schedule_onboarding_nudges,
};
pub use recurrence::next_occurrence;
pub use triggers::{BatchStats, TriggerScheduler};
