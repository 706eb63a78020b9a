use std::sync::Arc;

use crate::metrics::FEEDBACK_REQUESTS_TOTAL;
use crate::models::QuizQuestion;

use super::feedback_service::{parse_feedback_reply, FeedbackGenerator, FeedbackRequest};

/// Shown when the feedback collaborator fails or replies off script.
pub const FALLBACK_FEEDBACK: &str = "We had trouble generating feedback. Try again later.";

/// Scores above this count as correct in delegated mode. Fixed, not
/// user-configurable.
const CORRECT_SCORE_THRESHOLD: f64 = 0.8;

/// Outcome of grading one answer.
///
/// `is_correct` and `score` stay `None` when grading was impossible
/// (delegated mode without a parseable score) — unknown, not wrong.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub is_correct: Option<bool>,
    pub score: Option<f64>,
    pub correct_answer: Option<String>,
    pub feedback_text: Option<String>,
}

pub struct ScoringService {
    feedback: Arc<dyn FeedbackGenerator>,
}

impl ScoringService {
    pub fn new(feedback: Arc<dyn FeedbackGenerator>) -> Self {
        Self { feedback }
    }

    /// Grade one answer. Never fails: delegated-feedback trouble degrades to
    /// an ungraded evaluation with the fallback feedback text.
    pub async fn evaluate(&self, question: &QuizQuestion, answer: &str) -> Evaluation {
        if question.ai_feedback {
            self.evaluate_delegated(question, answer).await
        } else {
            Self::evaluate_exact(question, answer)
        }
    }

    fn evaluate_exact(question: &QuizQuestion, answer: &str) -> Evaluation {
        let is_correct = normalize(answer) == normalize(&question.correct_answer);
        Evaluation {
            is_correct: Some(is_correct),
            score: Some(if is_correct { 1.0 } else { 0.0 }),
            correct_answer: Some(question.correct_answer.clone()),
            feedback_text: None,
        }
    }

    async fn evaluate_delegated(&self, question: &QuizQuestion, answer: &str) -> Evaluation {
        let request = FeedbackRequest {
            question: question.question.clone(),
            supporting_text: question.text.clone(),
            learner_answer: answer.to_string(),
            reference_answer: question.correct_answer.clone(),
            instructions: question.feedback_prompt.clone(),
        };

        match self.feedback.generate(&request).await {
            Ok(reply) if !reply.trim().is_empty() => {
                FEEDBACK_REQUESTS_TOTAL.with_label_values(&["ok"]).inc();
                let parsed = parse_feedback_reply(&reply);
                let feedback_text = if parsed.feedback.is_empty() {
                    FALLBACK_FEEDBACK.to_string()
                } else {
                    parsed.feedback
                };
                Evaluation {
                    is_correct: parsed.score.map(|score| score > CORRECT_SCORE_THRESHOLD),
                    score: parsed.score,
                    correct_answer: None,
                    feedback_text: Some(feedback_text),
                }
            }
            Ok(_) => {
                tracing::warn!(
                    "Feedback service returned an empty reply for item {}",
                    question.item_id
                );
                FEEDBACK_REQUESTS_TOTAL
                    .with_label_values(&["fallback"])
                    .inc();
                Self::ungraded()
            }
            Err(e) => {
                tracing::warn!(
                    "Feedback service failed for item {}: {:#}",
                    question.item_id,
                    e
                );
                FEEDBACK_REQUESTS_TOTAL
                    .with_label_values(&["fallback"])
                    .inc();
                Self::ungraded()
            }
        }
    }

    fn ungraded() -> Evaluation {
        Evaluation {
            is_correct: None,
            score: None,
            correct_answer: None,
            feedback_text: Some(FALLBACK_FEEDBACK.to_string()),
        }
    }
}

fn normalize(answer: &str) -> String {
    answer.trim().to_lowercase()
}
