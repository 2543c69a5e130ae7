//! Static instrument definitions.
//!
//! Question wording and subscale assignments come from the validated
//! instruments and must not drift casually: subscale names feed the
//! pressure-zone lookup, and reverse-score flags change item scoring.

use super::AssessmentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    /// 1..=scale rating, normalized onto 0-100.
    Likert { scale: u8 },
    /// Yes/no, scored 100 or 0.
    Boolean,
    /// Fixed set of options; the prompt lists them verbatim.
    MultipleChoice { options: &'static [&'static str] },
}

#[derive(Debug, Clone, Copy)]
pub struct AssessmentQuestion {
    pub id: &'static str,
    pub text: &'static str,
    pub kind: QuestionKind,
    pub subscale: &'static str,
    /// Reverse-scored items flip the scale so higher always means
    /// healthier after scoring.
    pub reverse: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct AssessmentDefinition {
    pub assessment: AssessmentType,
    pub name: &'static str,
    pub description: &'static str,
    pub questions: &'static [AssessmentQuestion],
    pub duration_minutes: u32,
}

const fn likert(id: &'static str, text: &'static str, subscale: &'static str) -> AssessmentQuestion {
    AssessmentQuestion {
        id,
        text,
        kind: QuestionKind::Likert { scale: 5 },
        subscale,
        reverse: false,
    }
}

const fn likert_rev(
    id: &'static str,
    text: &'static str,
    subscale: &'static str,
) -> AssessmentQuestion {
    AssessmentQuestion {
        id,
        text,
        kind: QuestionKind::Likert { scale: 5 },
        subscale,
        reverse: true,
    }
}

const fn boolean(
    id: &'static str,
    text: &'static str,
    subscale: &'static str,
) -> AssessmentQuestion {
    AssessmentQuestion {
        id,
        text,
        kind: QuestionKind::Boolean,
        subscale,
        reverse: false,
    }
}

const fn boolean_rev(
    id: &'static str,
    text: &'static str,
    subscale: &'static str,
) -> AssessmentQuestion {
    AssessmentQuestion {
        id,
        text,
        kind: QuestionKind::Boolean,
        subscale,
        reverse: true,
    }
}

// ============================================================================
// EMA - daily pulse, trimmed to 3 questions for completion rate
// ============================================================================

static EMA: AssessmentDefinition = AssessmentDefinition {
    assessment: AssessmentType::Ema,
    name: "Daily Check-In",
    description: "Quick 3-question daily pulse check",
    duration_minutes: 1,
    questions: &[
        likert(
            "ema_1",
            "How are you feeling right now? (1=very low, 5=great)",
            "mood",
        ),
        likert_rev(
            "ema_2",
            "How overwhelming does caregiving feel today? (1=not at all, 5=extremely)",
            "burden",
        ),
        likert_rev(
            "ema_3",
            "How stressed do you feel right now? (1=not at all, 5=extremely)",
            "stress",
        ),
    ],
};

// ============================================================================
// CWBS - Caregiver Well-Being Scale (Tebb, Berg-Weger & Rubio)
// ============================================================================

static CWBS: AssessmentDefinition = AssessmentDefinition {
    assessment: AssessmentType::Cwbs,
    name: "Caregiver Well-Being Scale",
    description: "Assessment of caregiver activities and needs over the past three months",
    duration_minutes: 3,
    questions: &[
        // Part I: activities
        likert("cwbs_1", "Buying food (1=rarely, 5=usually)", "activities"),
        likert(
            "cwbs_2",
            "Taking care of personal daily activities (meals, hygiene, laundry) (1=rarely, 5=usually)",
            "activities",
        ),
        likert(
            "cwbs_3",
            "Making sure medications are taken (1=rarely, 5=usually)",
            "activities",
        ),
        likert(
            "cwbs_4",
            "Managing financial affairs (1=rarely, 5=usually)",
            "activities",
        ),
        likert(
            "cwbs_5",
            "Arranging for services or medical appointments (1=rarely, 5=usually)",
            "activities",
        ),
        likert(
            "cwbs_6",
            "Checking in and making sure they are ok (1=rarely, 5=usually)",
            "activities",
        ),
        likert(
            "cwbs_7",
            "Providing transportation (1=rarely, 5=usually)",
            "activities",
        ),
        likert(
            "cwbs_8",
            "Assisting with bathing and dressing (1=rarely, 5=usually)",
            "activities",
        ),
        // Part II: needs
        likert_rev(
            "cwbs_9",
            "I need a break from caregiving (1=rarely, 5=usually)",
            "needs",
        ),
        likert_rev(
            "cwbs_10",
            "I need help managing daily caregiving responsibilities (1=rarely, 5=usually)",
            "needs",
        ),
        likert_rev(
            "cwbs_11",
            "I need help coordinating all aspects of care (1=rarely, 5=usually)",
            "needs",
        ),
        likert_rev(
            "cwbs_12",
            "I need information about caregiving and available resources (1=rarely, 5=usually)",
            "needs",
        ),
    ],
};

// ============================================================================
// REACH-II - stress and coping
// ============================================================================

static REACH_II: AssessmentDefinition = AssessmentDefinition {
    assessment: AssessmentType::ReachII,
    name: "Stress & Coping Assessment",
    description: "Evidence-based assessment of caregiver stress and coping",
    duration_minutes: 3,
    questions: &[
        likert_rev(
            "reach_1",
            "In the past week, how often have you felt overwhelmed? (1=never, 5=always)",
            "stress",
        ),
        likert(
            "reach_2",
            "How often do you feel you have enough time for yourself? (1=never, 5=always)",
            "self_care",
        ),
        likert_rev(
            "reach_3",
            "How often do you feel isolated or alone? (1=never, 5=always)",
            "social",
        ),
        likert(
            "reach_4",
            "How confident are you in managing daily caregiving tasks? (1=not confident, 5=very confident)",
            "efficacy",
        ),
        likert_rev(
            "reach_5",
            "How often do you feel frustrated or angry about caregiving? (1=never, 5=always)",
            "emotional",
        ),
        likert_rev(
            "reach_6",
            "How often do you feel physically exhausted? (1=never, 5=always)",
            "physical",
        ),
        likert(
            "reach_7",
            "How satisfied are you with your support network? (1=very dissatisfied, 5=very satisfied)",
            "support",
        ),
        likert_rev(
            "reach_8",
            "How often do you feel guilty about needing help? (1=never, 5=always)",
            "emotional",
        ),
        likert(
            "reach_9",
            "How often do you engage in activities you enjoy? (1=never, 5=always)",
            "self_care",
        ),
        likert(
            "reach_10",
            "How well are you managing your own health needs? (1=very poorly, 5=very well)",
            "self_care",
        ),
    ],
};

// ============================================================================
// SDOH - 28-item social determinants screening
// ============================================================================

static SDOH: AssessmentDefinition = AssessmentDefinition {
    assessment: AssessmentType::Sdoh,
    name: "Needs Screening",
    description: "Comprehensive screening for social support needs",
    duration_minutes: 5,
    questions: &[
        // Financial
        boolean(
            "sdoh_1",
            "In the past year, have you worried about having enough money for food, housing, or utilities?",
            "financial",
        ),
        boolean(
            "sdoh_2",
            "Do you currently have financial stress related to caregiving costs?",
            "financial",
        ),
        boolean(
            "sdoh_3",
            "Have you had to reduce work hours or leave employment due to caregiving?",
            "financial",
        ),
        boolean(
            "sdoh_4",
            "Do you have difficulty affording medications or medical care?",
            "financial",
        ),
        boolean(
            "sdoh_5",
            "Are you worried about your long-term financial security?",
            "financial",
        ),
        // Housing
        boolean_rev(
            "sdoh_6",
            "Is your current housing safe and adequate for caregiving needs?",
            "housing",
        ),
        boolean(
            "sdoh_7",
            "Have you considered moving due to caregiving demands?",
            "housing",
        ),
        boolean(
            "sdoh_8",
            "Do you have accessibility concerns in your home (stairs, bathroom, etc.)?",
            "housing",
        ),
        // Transportation
        boolean_rev(
            "sdoh_9",
            "Do you have reliable transportation to medical appointments?",
            "transportation",
        ),
        boolean(
            "sdoh_10",
            "Is transportation cost a barrier to accessing services?",
            "transportation",
        ),
        boolean(
            "sdoh_11",
            "Do you have difficulty arranging transportation for your care recipient?",
            "transportation",
        ),
        // Social support
        boolean_rev(
            "sdoh_12",
            "Do you have someone you can ask for help with caregiving?",
            "social",
        ),
        boolean(
            "sdoh_13",
            "Do you feel isolated from friends and family?",
            "social",
        ),
        boolean_rev(
            "sdoh_14",
            "Are you part of a caregiver support group or community?",
            "social",
        ),
        boolean(
            "sdoh_15",
            "Do you have trouble maintaining relationships due to caregiving?",
            "social",
        ),
        boolean(
            "sdoh_16",
            "Do you wish you had more emotional support?",
            "social",
        ),
        // Healthcare access
        boolean_rev(
            "sdoh_17",
            "Do you have health insurance for yourself?",
            "healthcare",
        ),
        boolean(
            "sdoh_18",
            "Have you delayed your own medical care due to caregiving?",
            "healthcare",
        ),
        boolean_rev(
            "sdoh_19",
            "Do you have a regular doctor or healthcare provider?",
            "healthcare",
        ),
        boolean_rev(
            "sdoh_20",
            "Are you satisfied with the healthcare your care recipient receives?",
            "healthcare",
        ),
        // Food security
        boolean(
            "sdoh_21",
            "In the past month, did you worry about running out of food?",
            "food",
        ),
        boolean(
            "sdoh_22",
            "Have you had to skip meals due to lack of money?",
            "food",
        ),
        boolean_rev(
            "sdoh_23",
            "Do you have access to healthy, nutritious food?",
            "food",
        ),
        // Legal and administrative
        boolean_rev(
            "sdoh_24",
            "Do you have legal documents in place (POA, advance directives)?",
            "legal",
        ),
        boolean(
            "sdoh_25",
            "Do you need help navigating insurance or benefits?",
            "legal",
        ),
        boolean(
            "sdoh_26",
            "Are you concerned about future care planning?",
            "legal",
        ),
        // Technology access
        boolean_rev(
            "sdoh_27",
            "Do you have reliable internet access?",
            "technology",
        ),
        boolean_rev(
            "sdoh_28",
            "Are you comfortable using technology for healthcare or support services?",
            "technology",
        ),
    ],
};

/// Look up the definition for an instrument. Total: every enum variant
/// has a definition, so this never fails.
pub fn definition(assessment: AssessmentType) -> &'static AssessmentDefinition {
    match assessment {
        AssessmentType::Ema => &EMA,
        AssessmentType::Cwbs => &CWBS,
        AssessmentType::ReachII => &REACH_II,
        AssessmentType::Sdoh => &SDOH,
    }
}
