use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::{error::QuizApiError, services::AppState};

#[derive(Debug, Deserialize)]
pub struct CoursesQuery {
    pub subject: String,
}

#[derive(Debug, Deserialize)]
pub struct ConceptsQuery {
    pub subject: String,
    pub course: String,
}

/// GET /api/v1/catalog/subjects
pub async fn list_subjects(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, QuizApiError> {
    let subjects = state.catalog.subjects().await?;
    Ok(Json(json!({ "subjects": subjects })))
}

/// GET /api/v1/catalog/courses?subject=S
pub async fn list_courses(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CoursesQuery>,
) -> Result<impl IntoResponse, QuizApiError> {
    let courses = state.catalog.courses(&query.subject).await?;
    Ok(Json(json!({ "courses": courses })))
}

/// GET /api/v1/catalog/concepts?subject=S&course=C
pub async fn list_concepts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConceptsQuery>,
) -> Result<impl IntoResponse, QuizApiError> {
    let concepts = state
        .catalog
        .concepts(&query.subject, &query.course)
        .await?;
    Ok(Json(json!({ "concepts": concepts })))
}
