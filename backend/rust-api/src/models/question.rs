use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalog question. Managed by the admin side; the quiz core only ever
/// reads active questions filtered by the learner's selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    #[serde(rename = "_id")]
    pub item_id: String,
    pub title: String,
    pub subject: String,
    pub course: String,
    pub concept: String,
    pub text: String,
    pub image: Option<String>,
    pub question: String,
    pub correct_answer: String,
    /// Delegated feedback: score via the external feedback service instead
    /// of exact string match.
    pub ai_feedback: bool,
    pub feedback_prompt: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// The learner's grouping choice: subject + course, optionally narrowed to
/// a single concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub subject: String,
    pub course: String,
    pub concept: Option<String>,
}

impl Selection {
    pub fn matches(&self, question: &QuizQuestion) -> bool {
        if question.subject != self.subject || question.course != self.course {
            return false;
        }
        match &self.concept {
            Some(concept) => &question.concept == concept,
            None => true,
        }
    }
}

/// Learner-facing projection of a question. The correct answer and the
/// feedback instructions never leave the server.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub item_id: String,
    pub title: String,
    pub text: String,
    pub image: Option<String>,
    pub question: String,
    pub ai_feedback: bool,
}

impl From<&QuizQuestion> for QuestionView {
    fn from(question: &QuizQuestion) -> Self {
        Self {
            item_id: question.item_id.clone(),
            title: question.title.clone(),
            text: question.text.clone(),
            image: question.image.clone(),
            question: question.question.clone(),
            ai_feedback: question.ai_feedback,
        }
    }
}
