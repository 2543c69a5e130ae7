//! Assessment session state machine.
//!
//! One question is delivered per conversational turn. The engine
//! mutates the working [`ConversationContext`] only; durable rows are
//! written later when the pipeline diffs the context against its
//! pristine snapshot.

use uuid::Uuid;

use super::catalog::{AssessmentDefinition, QuestionKind, definition};
use super::scoring::{ScoredAssessment, score_assessment};
use super::AssessmentType;
use crate::context::ConversationContext;
use crate::error::AssessmentError;
use crate::limits::Bucket;

pub struct AssessmentEngine;

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started {
        session_id: Uuid,
        total: usize,
        prompt: String,
    },
    /// The assessment bucket rejected this turn. The conversation
    /// continues; starting is deferred with an in-band message.
    RateLimited { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    NextPrompt { prompt: String },
    /// Final answer recorded and the instrument produced a score.
    Complete { scored: ScoredAssessment },
    /// Final answer recorded but nothing was scorable; no result is
    /// recorded and no composite is computed.
    InsufficientData { message: String },
}

impl AssessmentEngine {
    /// Begin a session, resetting any in-flight assessment state.
    pub fn start(context: &mut ConversationContext, assessment: AssessmentType) -> StartOutcome {
        if context.assessment_rate_limited {
            return StartOutcome::RateLimited {
                message: Bucket::Assessment.config().reply.to_string(),
            };
        }

        let def = definition(assessment);
        let session_id = Uuid::new_v4();

        context.assessment_in_progress = true;
        context.assessment_type = Some(assessment);
        context.assessment_current_question = 0;
        context.assessment_session_id = Some(session_id);
        context.assessment_responses.clear();

        StartOutcome::Started {
            session_id,
            total: def.questions.len(),
            prompt: render_prompt(def, 0),
        }
    }

    /// Record a raw answer to the current question and advance. The
    /// question index only ever increases.
    pub fn record_answer(
        context: &mut ConversationContext,
        raw: &str,
    ) -> Result<AnswerOutcome, AssessmentError> {
        if !context.assessment_in_progress {
            return Err(AssessmentError::NoActiveSession);
        }
        let assessment = context
            .assessment_type
            .ok_or(AssessmentError::NoActiveSession)?;
        let def = definition(assessment);
        let total = def.questions.len();
        let index = context.assessment_current_question;

        if index >= total {
            // A completed session should have cleared the in-progress flag
            return match context.assessment_session_id {
                Some(id) => Err(AssessmentError::SessionComplete(id)),
                None => Err(AssessmentError::NoActiveSession),
            };
        }
        let question = &def.questions[index];

        context
            .assessment_responses
            .insert(question.id.to_string(), raw.to_string());
        context.assessment_current_question = index + 1;

        if index + 1 < total {
            return Ok(AnswerOutcome::NextPrompt {
                prompt: render_prompt(def, index + 1),
            });
        }

        // Final answer: close out the working state this same turn so
        // the persistence diff sees the transition
        context.assessment_in_progress = false;
        let scored = score_assessment(assessment, &context.assessment_responses);
        if scored.overall.is_none() {
            return Ok(AnswerOutcome::InsufficientData {
                message: "Thanks for sticking with me. I couldn't score this \
                          check-in from those answers, so I won't record a \
                          result. We can try again whenever you're ready \u{1f499}"
                    .to_string(),
            });
        }
        Ok(AnswerOutcome::Complete { scored })
    }
}

fn render_prompt(def: &AssessmentDefinition, index: usize) -> String {
    let question = &def.questions[index];
    let mut prompt = format!("({}/{}) {}", index + 1, def.questions.len(), question.text);
    if let QuestionKind::MultipleChoice { options } = question.kind {
        for (i, option) in options.iter().enumerate() {
            prompt.push_str(&format!("\n{}. {}", i + 1, option));
        }
    }
    prompt
}
