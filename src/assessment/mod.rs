//! Clinical assessment instruments, scoring, and session state machine.
//!
//! Four validated instruments are delivered one question per
//! conversational turn: a daily pulse check (EMA), the Caregiver
//! Well-Being Scale (CWBS), a stress and coping assessment (REACH-II),
//! and a social-determinants screening (SDOH). The catalog defines the
//! questions, scoring turns raw answers into 0-100 item and subscale
//! scores, and the engine drives a session from start to completion.

mod catalog;
mod engine;
mod scoring;

pub use catalog::{AssessmentDefinition, AssessmentQuestion, QuestionKind, definition};
pub use engine::{AnswerOutcome, AssessmentEngine, StartOutcome};
pub use scoring::{ScoredAssessment, score_answer, score_assessment};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentType {
    Ema,
    Cwbs,
    ReachII,
    Sdoh,
}

impl AssessmentType {
    pub const ALL: &'static [AssessmentType] = &[
        AssessmentType::Ema,
        AssessmentType::Cwbs,
        AssessmentType::ReachII,
        AssessmentType::Sdoh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentType::Ema => "ema",
            AssessmentType::Cwbs => "cwbs",
            AssessmentType::ReachII => "reach_ii",
            AssessmentType::Sdoh => "sdoh",
        }
    }

    /// Weight of this instrument in the composite wellness score.
    /// Weights sum to 1.0 across the full set.
    pub fn base_weight(&self) -> f64 {
        match self {
            AssessmentType::Ema => 0.40,
            AssessmentType::Cwbs => 0.30,
            AssessmentType::ReachII => 0.20,
            AssessmentType::Sdoh => 0.10,
        }
    }
}

impl fmt::Display for AssessmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssessmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ema" => Ok(AssessmentType::Ema),
            "cwbs" => Ok(AssessmentType::Cwbs),
            "reach_ii" => Ok(AssessmentType::ReachII),
            "sdoh" => Ok(AssessmentType::Sdoh),
            _ => Err(format!("unknown assessment type: {s}")),
        }
    }
}
