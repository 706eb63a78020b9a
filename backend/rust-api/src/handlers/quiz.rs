use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::QuizApiError,
    extractors::AppJson,
    models::{AdvanceRequest, SelectCourseRequest, SubmitAnswerRequest},
    services::{quiz_service::QuizService, AppState},
};

const VISITOR_COOKIE: &str = "sid";

/// Read the visitor id from the session cookie, minting a fresh one (and the
/// cookie carrying it) on first contact.
fn visitor(jar: CookieJar) -> (String, CookieJar) {
    if let Some(cookie) = jar.get(VISITOR_COOKIE) {
        return (cookie.value().to_string(), jar);
    }

    let visitor_id = Uuid::new_v4().simple().to_string();
    let cookie = Cookie::build((VISITOR_COOKIE, visitor_id.clone()))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::days(30))
        .build();
    (visitor_id, jar.add(cookie))
}

/// POST /api/v1/quiz/selection - pick a grouping and start a fresh run
pub async fn select_course(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(req): AppJson<SelectCourseRequest>,
) -> Result<impl IntoResponse, QuizApiError> {
    // Validate request
    if let Err(e) = req.validate() {
        return Err(QuizApiError::Validation(e.to_string()));
    }

    let (visitor_id, jar) = visitor(jar);
    tracing::info!(
        "Course selection: visitor={}, subject={}, course={}",
        visitor_id,
        req.subject,
        req.course
    );

    let service = QuizService::new(&state);
    let response = service.select(&visitor_id, req).await?;

    Ok((StatusCode::CREATED, jar, Json(response)))
}

/// GET /api/v1/quiz - current question (or completion marker)
pub async fn quiz_view(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, QuizApiError> {
    let (visitor_id, jar) = visitor(jar);

    let service = QuizService::new(&state);
    let response = service.current(&visitor_id).await?;

    Ok((jar, Json(response)))
}

/// POST /api/v1/quiz/answer - grade and buffer one answer
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(req): AppJson<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, QuizApiError> {
    let (visitor_id, jar) = visitor(jar);
    tracing::info!("Answer submitted: visitor={}", visitor_id);

    let service = QuizService::new(&state);
    let response = service.submit(&visitor_id, req).await?;

    Ok((jar, Json(response)))
}

/// POST /api/v1/quiz/next - flush the current item and advance
pub async fn advance(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(req): AppJson<AdvanceRequest>,
) -> Result<impl IntoResponse, QuizApiError> {
    let (visitor_id, jar) = visitor(jar);
    tracing::info!("Advance requested: visitor={}", visitor_id);

    let service = QuizService::new(&state);
    let response = service.advance(&visitor_id, req).await?;

    Ok((jar, Json(response)))
}

/// POST /api/v1/quiz/summary - run summary, resetting counters for a rerun
pub async fn quiz_summary(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, QuizApiError> {
    let (visitor_id, jar) = visitor(jar);

    let service = QuizService::new(&state);
    let response = service.summary(&visitor_id).await?;

    Ok((jar, Json(response)))
}
