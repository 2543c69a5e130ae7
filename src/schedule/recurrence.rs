//! RFC 5545 recurrence evaluation.
//!
//! Trigger rules are stored as bare RRULE bodies (`FREQ=DAILY;BYHOUR=9`)
//! defined in the user's local wall clock. Evaluation anchors the rule in
//! the user's IANA timezone so a "9am daily" rule tracks DST instead of
//! drifting by an hour twice a year.

use chrono::{DateTime, Duration, Utc};
use rrule::RRuleSet;

use crate::error::RecurrenceError;

/// How many candidate occurrences to pull when looking for the next one.
/// More than one is needed because the iterator start is inclusive.
const CANDIDATE_WINDOW: u16 = 8;

/// Compute the first occurrence of `rule` strictly after `after`.
///
/// The rule's wall-clock times are interpreted in `timezone` and the
/// result is returned as an absolute UTC instant. A rule with no future
/// occurrence (e.g. a finished COUNT rule) falls back to one year out
/// so the trigger parks far in the future instead of erroring.
pub fn next_occurrence(
    rule: &str,
    timezone: &str,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>, RecurrenceError> {
    let tz: chrono_tz::Tz = timezone
        .parse()
        .map_err(|_| RecurrenceError::UnknownTimezone(timezone.to_string()))?;

    // Anchor DTSTART at `after` expressed in the rule's local wall clock
    let local_after = after.with_timezone(&tz);
    let source = format!(
        "DTSTART;TZID={timezone}:{}\nRRULE:{rule}",
        local_after.format("%Y%m%dT%H%M%S")
    );

    let set = source
        .parse::<RRuleSet>()
        .map_err(|e| RecurrenceError::InvalidRule {
            rule: rule.to_string(),
            reason: e.to_string(),
        })?;

    let result = set
        .after(after.with_timezone(&rrule::Tz::UTC))
        .all(CANDIDATE_WINDOW);

    let next = result
        .dates
        .into_iter()
        .map(|occurrence| occurrence.with_timezone(&Utc))
        .find(|occurrence| *occurrence > after);

    Ok(next.unwrap_or(after + Duration::days(365)))
}
