use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Request-level failures of the quiz flow. Every variant maps to a defined
/// JSON response; nothing in this subsystem surfaces as an unhandled fault.
#[derive(Debug, Error)]
pub enum QuizApiError {
    /// The selected grouping has no active questions.
    #[error("No active questions found for the selected course")]
    NoActiveQuestions,

    /// A quiz action arrived without a prior course selection.
    #[error("Select a course before starting the quiz")]
    SelectionRequired,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for QuizApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            QuizApiError::NoActiveQuestions => StatusCode::NOT_FOUND,
            QuizApiError::SelectionRequired => StatusCode::CONFLICT,
            QuizApiError::Validation(_) => StatusCode::BAD_REQUEST,
            QuizApiError::Internal(e) => {
                tracing::error!("Internal error while handling quiz request: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let mut body = json!({
            "message": self.to_string(),
            "status": status.as_u16(),
        });
        if matches!(self, QuizApiError::SelectionRequired) {
            body["redirect"] = json!("/api/v1/quiz/selection");
        }

        (status, Json(body)).into_response()
    }
}
