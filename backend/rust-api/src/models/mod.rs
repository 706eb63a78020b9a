use serde::{Deserialize, Serialize};
use validator::Validate;

pub mod attempt;
pub mod question;
pub mod question_log;
pub mod quiz_state;

pub use attempt::{Attempt, AttemptBuffer};
pub use question::{QuestionView, QuizQuestion, Selection};
pub use question_log::{LogMeta, LoggedAttempt, QuestionLogRecord};
pub use quiz_state::{QuizSessionState, RunProgress, RunSummary};

/// Request to pick the grouping for a new quiz run.
#[derive(Debug, Deserialize, Validate)]
pub struct SelectCourseRequest {
    #[validate(length(min = 1, max = 200, message = "Subject must not be empty"))]
    pub subject: String,

    #[validate(length(min = 1, max = 200, message = "Course must not be empty"))]
    pub course: String,

    #[validate(length(min = 1, max = 200, message = "Concept must not be empty"))]
    pub concept: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SelectCourseResponse {
    pub subject: String,
    pub course: String,
    pub concept: Option<String>,
    pub run_id: String,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub answer: String,
}

/// The "next" form post. The rating arrives as whatever the client sent —
/// number, digit string, junk — and is coerced server-side, never rejected.
#[derive(Debug, Default, Deserialize)]
pub struct AdvanceRequest {
    #[serde(default)]
    pub rating: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizViewState {
    Question,
    AwaitingRating,
    Complete,
}

/// Feedback shown to the learner after a submission. In delegated mode
/// correctness and the reference answer are withheld; in exact mode the
/// feedback text is absent.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackView {
    pub is_correct: Option<bool>,
    pub score: Option<f64>,
    pub correct_answer: Option<String>,
    pub feedback_text: Option<String>,
}

/// What the learner sees: the current question (1-based position), or the
/// completion marker once the run is exhausted.
#[derive(Debug, Serialize)]
pub struct QuizViewResponse {
    pub state: QuizViewState,
    pub question: Option<QuestionView>,
    pub index: usize,
    pub total: usize,
    pub attempts_made: usize,
    pub ask_rating: bool,
    pub feedback: Option<FeedbackView>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub correct: u32,
    pub total: usize,
    pub subject: String,
    pub course: String,
    pub concept: Option<String>,
    pub score_sum: f64,
    pub avg_score: f64,
}
