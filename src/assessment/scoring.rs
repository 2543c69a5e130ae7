//! Raw answer scoring.
//!
//! Every item scores onto 0-100 where higher always means healthier.
//! An answer that cannot be scored resolves to `None` and is excluded
//! from every average downstream. Blank input in particular must never
//! reach numeric coercion: an empty string coerced to 0 on a
//! reverse-scored item produces a score above 100.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::catalog::{AssessmentQuestion, QuestionKind, definition};
use super::AssessmentType;
use crate::burnout::BurnoutBand;

/// Sentinel stored when the user explicitly declined a question.
pub const SKIPPED: &str = "SKIPPED";

/// One instrument's scored result. `overall` is `None` when no answer
/// could be scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredAssessment {
    pub overall: Option<f64>,
    pub subscores: BTreeMap<String, f64>,
    pub band: Option<BurnoutBand>,
}

/// Score a single raw answer against its question, or `None` if the
/// answer is blank, declined, or unparseable.
pub fn score_answer(question: &AssessmentQuestion, raw: &str) -> Option<f64> {
    let raw = raw.trim();
    // Blank input is "no answer", checked before any numeric coercion
    if raw.is_empty() || raw == SKIPPED {
        return None;
    }

    match question.kind {
        QuestionKind::Likert { scale } => {
            let mut value: f64 = raw.parse().ok()?;
            // A numeric answer off the scale is "no answer", same as blank
            if !(1.0..=f64::from(scale)).contains(&value) {
                return None;
            }
            if question.reverse {
                value = f64::from(scale) + 1.0 - value;
            }
            Some(((value - 1.0) / (f64::from(scale) - 1.0)) * 100.0)
        }
        QuestionKind::Boolean => {
            let truthy = matches!(raw.to_ascii_lowercase().as_str(), "true" | "yes" | "1");
            let mut score = if truthy { 100.0 } else { 0.0 };
            if question.reverse {
                score = 100.0 - score;
            }
            Some(score)
        }
        // Choice answers carry no numeric score of their own
        QuestionKind::MultipleChoice { .. } => None,
    }
}

/// Score a full response set for one instrument: per-subscale averages
/// of the scorable answers, and an overall score that is the mean of
/// the subscale averages, rounded to one decimal.
pub fn score_assessment(
    assessment: AssessmentType,
    responses: &BTreeMap<String, String>,
) -> ScoredAssessment {
    let def = definition(assessment);

    let mut sums: BTreeMap<&str, (f64, u32)> = BTreeMap::new();
    for question in def.questions {
        let Some(raw) = responses.get(question.id) else {
            continue;
        };
        let Some(score) = score_answer(question, raw) else {
            continue;
        };
        let entry = sums.entry(question.subscale).or_insert((0.0, 0));
        entry.0 += score;
        entry.1 += 1;
    }

    let subscores: BTreeMap<String, f64> = sums
        .into_iter()
        .map(|(subscale, (sum, count))| (subscale.to_string(), sum / f64::from(count)))
        .collect();

    if subscores.is_empty() {
        return ScoredAssessment {
            overall: None,
            subscores,
            band: None,
        };
    }

    let overall = subscores.values().sum::<f64>() / subscores.len() as f64;
    let overall = (overall * 10.0).round() / 10.0;
    ScoredAssessment {
        overall: Some(overall),
        subscores,
        band: Some(BurnoutBand::from_score(overall)),
    }
}
