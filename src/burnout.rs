//! Composite wellness scoring.
//!
//! Fuses whatever assessment results a user has into a single 0-100
//! wellness score with a confidence, a band, and a pressure-zone
//! breakdown. Higher score means healthier; lower score means more
//! distress. Recent results count more than stale ones via exponential
//! decay, and instruments with no usable score drop out entirely
//! instead of dragging the composite toward zero.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assessment::AssessmentType;

/// Age at which an assessment's weight has decayed to 1/e.
const DECAY_DAYS: f64 = 10.0;

/// Zones must average strictly above this pressure to be reported.
const ZONE_PRESSURE_THRESHOLD: f64 = 50.0;

// ============================================================================
// Bands
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BurnoutBand {
    Crisis,
    High,
    Moderate,
    Mild,
    Thriving,
}

impl BurnoutBand {
    /// Band boundaries are inclusive on the low side of the next band:
    /// 19.9 is crisis, 20.0 is high.
    pub fn from_score(score: f64) -> Self {
        if score < 20.0 {
            BurnoutBand::Crisis
        } else if score < 40.0 {
            BurnoutBand::High
        } else if score < 60.0 {
            BurnoutBand::Moderate
        } else if score < 80.0 {
            BurnoutBand::Mild
        } else {
            BurnoutBand::Thriving
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BurnoutBand::Crisis => "crisis",
            BurnoutBand::High => "high",
            BurnoutBand::Moderate => "moderate",
            BurnoutBand::Mild => "mild",
            BurnoutBand::Thriving => "thriving",
        }
    }
}

impl fmt::Display for BurnoutBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BurnoutBand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crisis" => Ok(BurnoutBand::Crisis),
            "high" => Ok(BurnoutBand::High),
            "moderate" => Ok(BurnoutBand::Moderate),
            "mild" => Ok(BurnoutBand::Mild),
            "thriving" => Ok(BurnoutBand::Thriving),
            _ => Err(format!("unknown burnout band: {s}")),
        }
    }
}

// ============================================================================
// Pressure zones
// ============================================================================

/// The five canonical pressure zones. Every known subscale maps to
/// exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureZone {
    EmotionalWellbeing,
    PhysicalHealth,
    SocialSupport,
    FinancialConcerns,
    TimeManagement,
}

impl PressureZone {
    pub fn as_str(&self) -> &'static str {
        match self {
            PressureZone::EmotionalWellbeing => "emotional_wellbeing",
            PressureZone::PhysicalHealth => "physical_health",
            PressureZone::SocialSupport => "social_support",
            PressureZone::FinancialConcerns => "financial_concerns",
            PressureZone::TimeManagement => "time_management",
        }
    }

    /// Human-readable label, e.g. "Emotional Well-being".
    pub fn label(&self) -> &'static str {
        match self {
            PressureZone::EmotionalWellbeing => "Emotional Well-being",
            PressureZone::PhysicalHealth => "Physical Health",
            PressureZone::SocialSupport => "Social Support",
            PressureZone::FinancialConcerns => "Financial Concerns",
            PressureZone::TimeManagement => "Time Management",
        }
    }

    /// Short contextual description used in conversational copy.
    pub fn description(&self) -> &'static str {
        match self {
            PressureZone::EmotionalWellbeing => "Emotional Burden",
            PressureZone::PhysicalHealth => "Physical Exhaustion",
            PressureZone::SocialSupport => "Feeling Isolated",
            PressureZone::FinancialConcerns => "Financial Stress",
            PressureZone::TimeManagement => "Caregiving Demands",
        }
    }

    /// Map a subscale name to its zone. Unknown subscales return `None`
    /// and are ignored by the scorer, never an error.
    pub fn for_subscale(subscale: &str) -> Option<Self> {
        let zone = match subscale {
            "mood" | "stress" | "efficacy" | "emotional" | "emotional_exhaustion" | "guilt"
            | "coping" => PressureZone::EmotionalWellbeing,
            "self_care" | "physical" | "healthcare" | "physical_exhaustion"
            | "life_satisfaction" => PressureZone::PhysicalHealth,
            "support" | "social" | "technology" | "social_isolation" | "social_needs"
            | "safety" => PressureZone::SocialSupport,
            "financial" | "housing" | "transportation" | "food" | "legal"
            | "financial_strain" => PressureZone::FinancialConcerns,
            "burden" | "activities" | "needs" | "behavior_problems" => {
                PressureZone::TimeManagement
            }
            _ => return None,
        };
        Some(zone)
    }
}

impl fmt::Display for PressureZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PressureZone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emotional_wellbeing" => Ok(PressureZone::EmotionalWellbeing),
            "physical_health" => Ok(PressureZone::PhysicalHealth),
            "social_support" => Ok(PressureZone::SocialSupport),
            "financial_concerns" => Ok(PressureZone::FinancialConcerns),
            "time_management" => Ok(PressureZone::TimeManagement),
            _ => Err(format!("unknown pressure zone: {s}")),
        }
    }
}

// ============================================================================
// Inputs and output
// ============================================================================

/// One instrument's result as handed to the scorer. `overall` is `None`
/// when the session completed with no scorable answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentScore {
    pub overall: Option<f64>,
    pub subscales: BTreeMap<String, f64>,
    pub completed_at: DateTime<Utc>,
}

/// A previously computed composite, most recent first in trend inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorScore {
    pub overall: f64,
    pub calculated_at: DateTime<Utc>,
}

/// Composite wellness result. Appended to the per-user time series,
/// never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellnessScore {
    pub overall: f64,
    pub band: BurnoutBand,
    /// 0-1, how much of the full instrument set backs this score.
    pub confidence: f64,
    /// Weighted contribution of each instrument that was counted.
    pub contributions: BTreeMap<AssessmentType, f64>,
    /// Zones whose averaged pressure exceeds the reporting threshold,
    /// highest pressure first.
    pub pressure_zones: Vec<PressureZone>,
    /// Averaged pressure per zone, for every zone that had any input.
    pub pressure_zone_scores: BTreeMap<PressureZone, f64>,
    pub previous_score: Option<f64>,
    pub score_delta: Option<f64>,
    pub trend_7day: Vec<f64>,
    pub trend_30day: Vec<f64>,
}

// ============================================================================
// Scoring
// ============================================================================

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Compute the composite wellness score from the given instrument
/// results and prior composites.
pub fn composite(
    scores: &BTreeMap<AssessmentType, InstrumentScore>,
    prior: &[PriorScore],
) -> WellnessScore {
    composite_at(scores, prior, Utc::now())
}

/// Clock-injected variant of [`composite`].
pub fn composite_at(
    scores: &BTreeMap<AssessmentType, InstrumentScore>,
    prior: &[PriorScore],
    now: DateTime<Utc>,
) -> WellnessScore {
    let mut contributions = BTreeMap::new();
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    for (&assessment, data) in scores {
        // No usable answers means the instrument drops out entirely
        let Some(score) = data.overall else { continue };

        let age_days = (now - data.completed_at).num_days().max(0) as f64;
        let effective_weight = assessment.base_weight() * (-age_days / DECAY_DAYS).exp();

        let contribution = score * effective_weight;
        contributions.insert(assessment, contribution);
        weighted_sum += contribution;
        total_weight += effective_weight;
    }

    // Neutral midpoint when nothing contributes
    let overall = if total_weight > 0.0 {
        weighted_sum / total_weight
    } else {
        50.0
    };

    let total_possible: f64 = AssessmentType::ALL.iter().map(|a| a.base_weight()).sum();
    let confidence = total_weight / total_possible;

    let (pressure_zones, pressure_zone_scores) = identify_pressure_zones(scores);

    let previous_score = prior.first().map(|p| p.overall);
    let score_delta = previous_score.map(|p| round1(overall - p));
    let mut trend_7day = Vec::new();
    let mut trend_30day = Vec::new();
    for p in prior {
        let age_days = (now - p.calculated_at).num_days();
        if age_days <= 7 {
            trend_7day.push(p.overall);
        }
        if age_days <= 30 {
            trend_30day.push(p.overall);
        }
    }

    WellnessScore {
        overall: round1(overall),
        band: BurnoutBand::from_score(overall),
        confidence: round2(confidence),
        contributions,
        pressure_zones,
        pressure_zone_scores,
        previous_score,
        score_delta,
        trend_7day,
        trend_30day,
    }
}

/// Aggregate subscale scores into zone pressures. Pressure is the
/// inverse of the subscale score; a zone is reported only when its
/// average pressure strictly exceeds the threshold.
fn identify_pressure_zones(
    scores: &BTreeMap<AssessmentType, InstrumentScore>,
) -> (Vec<PressureZone>, BTreeMap<PressureZone, f64>) {
    let mut samples: BTreeMap<PressureZone, Vec<f64>> = BTreeMap::new();

    for data in scores.values() {
        for (subscale, &score) in &data.subscales {
            if let Some(zone) = PressureZone::for_subscale(subscale) {
                samples.entry(zone).or_default().push(100.0 - score);
            }
        }
    }

    let averages: BTreeMap<PressureZone, f64> = samples
        .into_iter()
        .map(|(zone, pressures)| {
            let avg = pressures.iter().sum::<f64>() / pressures.len() as f64;
            (zone, avg)
        })
        .collect();

    let mut reported: Vec<(PressureZone, f64)> = averages
        .iter()
        .filter(|&(_, &p)| p > ZONE_PRESSURE_THRESHOLD)
        .map(|(&z, &p)| (z, p))
        .collect();
    reported.sort_by(|a, b| b.1.total_cmp(&a.1));

    (reported.into_iter().map(|(z, _)| z).collect(), averages)
}
