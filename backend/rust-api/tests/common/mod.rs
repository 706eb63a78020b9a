#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use std::sync::Arc;
use tower::ServiceExt;

use studyquiz_api::{
    config::Config,
    create_router,
    models::QuizQuestion,
    services::{
        catalog_service::InMemoryQuestionCatalog,
        feedback_service::{FeedbackGenerator, StaticFeedback},
        log_service::InMemoryQuestionLogStore,
        session_store::InMemorySessionStore,
        AppState,
    },
};

/// Handles on the in-memory backends so tests can seed the catalog and
/// assert on exactly what was persisted.
pub struct TestBackends {
    pub catalog: Arc<InMemoryQuestionCatalog>,
    pub sessions: Arc<InMemorySessionStore>,
    pub logs: Arc<InMemoryQuestionLogStore>,
}

pub fn test_config() -> Config {
    Config {
        mongo_uri: "mongodb://localhost:27017/studyquiz-test".to_string(),
        redis_uri: "redis://127.0.0.1:6379/1".to_string(),
        mongo_database: "studyquiz-test".to_string(),
        feedback_api_url: "http://localhost:8000".to_string(),
        session_ttl_seconds: 3600,
    }
}

pub fn create_test_app() -> (Router, TestBackends) {
    create_test_app_with_feedback(Arc::new(StaticFeedback::failing()))
}

pub fn create_test_app_with_feedback(
    feedback: Arc<dyn FeedbackGenerator>,
) -> (Router, TestBackends) {
    // Initialize tracing for tests
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let catalog = Arc::new(InMemoryQuestionCatalog::new());
    let sessions = Arc::new(InMemorySessionStore::new());
    let logs = Arc::new(InMemoryQuestionLogStore::new());

    let app_state = Arc::new(AppState::with_backends(
        test_config(),
        catalog.clone(),
        sessions.clone(),
        logs.clone(),
        feedback,
    ));

    (
        create_router(app_state),
        TestBackends {
            catalog,
            sessions,
            logs,
        },
    )
}

/// Question builder with sensible defaults for the Algebra/Linear fixtures.
pub fn question(item_id: &str) -> QuizQuestion {
    QuizQuestion {
        item_id: item_id.to_string(),
        title: "Linear equations".to_string(),
        subject: "Algebra".to_string(),
        course: "Linear".to_string(),
        concept: "Equations".to_string(),
        text: "Solve for x.".to_string(),
        image: None,
        question: "Solve x+1=2".to_string(),
        correct_answer: "1".to_string(),
        ai_feedback: false,
        feedback_prompt: String::new(),
        active: true,
        created_at: Utc::now(),
    }
}

/// Drives the app the way a browser would: requests run through `oneshot`
/// and the session cookie is carried between them.
pub struct TestClient {
    app: Router,
    cookie: Option<String>,
}

impl TestClient {
    pub fn new(app: Router) -> Self {
        Self { app, cookie: None }
    }

    pub async fn get(&mut self, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = self.request("GET", uri, None);
        self.send(request).await
    }

    pub async fn post(
        &mut self,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let request = self.request("POST", uri, Some(body));
        self.send(request).await
    }

    fn request(&self, method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            builder = builder.header("cookie", format!("sid={}", cookie));
        }
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(&mut self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();

        if let Some(sid) = response
            .headers()
            .get_all("set-cookie")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|header| header.starts_with("sid="))
            .and_then(|header| header.split(';').next())
            .and_then(|pair| pair.split('=').nth(1))
        {
            self.cookie = Some(sid.to_string());
        }

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };

        (status, json)
    }
}
