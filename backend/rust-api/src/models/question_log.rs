use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attempt::Attempt;

/// One attempt as captured in a durable log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedAttempt {
    pub n: u32,
    pub answer: String,
    pub feedback: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub score: f64,
    pub submitted_at: DateTime<Utc>,
}

impl From<&Attempt> for LoggedAttempt {
    fn from(attempt: &Attempt) -> Self {
        Self {
            n: attempt.n,
            answer: attempt.answer.clone(),
            feedback: attempt.feedback.clone(),
            correct_answer: attempt.correct_answer.clone(),
            is_correct: attempt.is_correct,
            score: attempt.score,
            submitted_at: attempt.submitted_at,
        }
    }
}

/// Durable record of one (run, item) visit — written exactly once when the
/// learner advances past the item, immutable afterwards.
///
/// Grouping labels and the question content are denormalized so the record
/// stays meaningful if the catalog question is later edited or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionLogRecord {
    pub id: String,
    pub session_id: String,
    pub run_id: String,
    pub item_id: String,

    pub subject: String,
    pub course: String,
    pub concept: String,

    pub title: String,
    pub text: String,
    pub image: Option<String>,
    pub question: String,
    pub correct_answer: String,
    pub ai_feedback: bool,
    pub feedback_prompt: String,

    pub started_at: Option<DateTime<Utc>>,
    pub attempts: Vec<LoggedAttempt>,
    pub item_rating: Option<u8>,
    pub created_at: DateTime<Utc>,
}

/// Denormalized metadata handed to the log writer on flush.
#[derive(Debug, Clone)]
pub struct LogMeta {
    pub session_id: String,
    pub subject: String,
    pub course: String,
    pub concept: String,
    pub title: String,
    pub text: String,
    pub image: Option<String>,
    pub question: String,
    pub correct_answer: String,
    pub ai_feedback: bool,
    pub feedback_prompt: String,
}
