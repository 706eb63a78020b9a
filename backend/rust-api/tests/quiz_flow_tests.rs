use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;

use studyquiz_api::services::feedback_service::StaticFeedback;

mod common;

use common::{create_test_app, create_test_app_with_feedback, question, TestClient};

fn select_body() -> serde_json::Value {
    json!({ "subject": "Algebra", "course": "Linear" })
}

#[tokio::test]
async fn test_full_exact_match_run_logs_every_attempt() {
    let (app, backends) = create_test_app();
    backends.catalog.seed(question("alg-1"));
    let mut client = TestClient::new(app);

    let (status, body) = client.post("/api/v1/quiz/selection", select_body()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["total"], 1);
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let (status, body) = client.get("/api/v1/quiz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "question");
    assert_eq!(body["question"]["question"], "Solve x+1=2");
    assert_eq!(body["index"], 1);

    // First attempt: wrong answer, buffered, not logged yet.
    let (status, body) = client
        .post("/api/v1/quiz/answer", json!({ "answer": "2" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["feedback"]["is_correct"], false);
    assert_eq!(body["feedback"]["score"], 0.0);
    assert_eq!(body["feedback"]["correct_answer"], "1");
    assert_eq!(body["attempts_made"], 1);
    assert!(backends.logs.records().is_empty());

    // Second attempt: correct.
    let (status, body) = client
        .post("/api/v1/quiz/answer", json!({ "answer": "1" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["feedback"]["is_correct"], true);
    assert_eq!(body["attempts_made"], 2);

    // Advance with a rating flushes both attempts into one record.
    let (status, body) = client
        .post("/api/v1/quiz/next", json!({ "rating": 4 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "complete");

    let records = backends.logs.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.run_id, run_id);
    assert_eq!(record.item_id, "alg-1");
    assert_eq!(record.subject, "Algebra");
    assert_eq!(record.course, "Linear");
    assert_eq!(record.question, "Solve x+1=2");
    assert_eq!(record.attempts.len(), 2);
    assert_eq!(record.attempts[0].n, 1);
    assert_eq!(record.attempts[0].answer, "2");
    assert!(!record.attempts[0].is_correct);
    assert_eq!(record.attempts[1].n, 2);
    assert_eq!(record.attempts[1].answer, "1");
    assert!(record.attempts[1].is_correct);
    assert_eq!(record.item_rating, Some(4));
    assert!(record.started_at.is_some());

    // Summary: one correct item, average over the last attempt's score.
    let (status, body) = client.post("/api/v1/quiz/summary", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["correct"], 1);
    assert_eq!(body["total"], 1);
    assert_eq!(body["avg_score"], 1.0);
}

#[tokio::test]
async fn test_two_question_run_reaches_complete_and_stays_there() {
    let (app, backends) = create_test_app();
    backends.catalog.seed(question("alg-1"));
    let mut second = question("alg-2");
    second.question = "Solve x-1=1".to_string();
    second.correct_answer = "2".to_string();
    backends.catalog.seed(second);
    let mut client = TestClient::new(app);

    client.post("/api/v1/quiz/selection", select_body()).await;

    for (answer, expected_index) in [("1", 1), ("2", 2)] {
        let (_, body) = client.get("/api/v1/quiz").await;
        assert_eq!(body["state"], "question");
        assert_eq!(body["index"], expected_index);

        let (_, body) = client
            .post("/api/v1/quiz/answer", json!({ "answer": answer }))
            .await;
        assert_eq!(body["feedback"]["is_correct"], true);

        let (status, _) = client
            .post("/api/v1/quiz/next", json!({ "rating": 5 }))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    // Run is complete and stays complete on repeated views.
    let (_, body) = client.get("/api/v1/quiz").await;
    assert_eq!(body["state"], "complete");
    let (_, body) = client.get("/api/v1/quiz").await;
    assert_eq!(body["state"], "complete");

    assert_eq!(backends.logs.records().len(), 2);
}

#[tokio::test]
async fn test_skip_without_submission_writes_minimal_record() {
    let (app, backends) = create_test_app();
    backends.catalog.seed(question("alg-1"));
    backends.catalog.seed(question("alg-2"));
    let mut client = TestClient::new(app);

    client.post("/api/v1/quiz/selection", select_body()).await;
    client.get("/api/v1/quiz").await;

    // "Next" with no prior submission: no rating prompt, still one record.
    let (status, body) = client.post("/api/v1/quiz/next", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "question");
    assert_eq!(body["index"], 2);

    let records = backends.logs.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].attempts.is_empty());
    assert_eq!(records[0].item_rating, None);
    // The item was displayed, so the start time made it into the record.
    assert!(records[0].started_at.is_some());
}

#[tokio::test]
async fn test_skipped_items_do_not_dilute_the_average() {
    let (app, backends) = create_test_app();
    backends.catalog.seed(question("alg-1"));
    backends.catalog.seed(question("alg-2"));
    let mut client = TestClient::new(app);

    client.post("/api/v1/quiz/selection", select_body()).await;

    // Answer the first correctly, skip the second.
    client
        .post("/api/v1/quiz/answer", json!({ "answer": "1" }))
        .await;
    client
        .post("/api/v1/quiz/next", json!({ "rating": 3 }))
        .await;
    client.post("/api/v1/quiz/next", json!({})).await;

    let (_, body) = client.post("/api/v1/quiz/summary", json!({})).await;
    // One scored item at 1.0; the skip neither counts nor divides.
    assert_eq!(body["avg_score"], 1.0);
    assert_eq!(body["correct"], 1);
}

#[tokio::test]
async fn test_rating_gate_blocks_advance_until_rated() {
    let (app, backends) = create_test_app();
    backends.catalog.seed(question("alg-1"));
    let mut client = TestClient::new(app);

    client.post("/api/v1/quiz/selection", select_body()).await;
    client
        .post("/api/v1/quiz/answer", json!({ "answer": "2" }))
        .await;

    // Advance without a rating: re-prompt, nothing flushed, index unchanged.
    let (status, body) = client.post("/api/v1/quiz/next", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "awaiting_rating");
    assert_eq!(body["ask_rating"], true);
    assert_eq!(body["index"], 1);
    assert!(backends.logs.records().is_empty());

    // Junk ratings count as absent and keep the gate closed.
    let (_, body) = client
        .post("/api/v1/quiz/next", json!({ "rating": "great" }))
        .await;
    assert_eq!(body["state"], "awaiting_rating");
    assert!(backends.logs.records().is_empty());

    // A digit rating opens the gate.
    let (_, body) = client
        .post("/api/v1/quiz/next", json!({ "rating": "2" }))
        .await;
    assert_eq!(body["state"], "complete");

    let records = backends.logs.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].item_rating, Some(2));
}

#[tokio::test]
async fn test_out_of_range_rating_advances_but_logs_null() {
    let (app, backends) = create_test_app();
    backends.catalog.seed(question("alg-1"));
    let mut client = TestClient::new(app);

    client.post("/api/v1/quiz/selection", select_body()).await;
    client
        .post("/api/v1/quiz/answer", json!({ "answer": "1" }))
        .await;

    let (_, body) = client
        .post("/api/v1/quiz/next", json!({ "rating": 9 }))
        .await;
    assert_eq!(body["state"], "complete");

    let records = backends.logs.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].item_rating, None);
}

#[tokio::test]
async fn test_delegated_feedback_failure_degrades_to_fallback() {
    let (app, backends) =
        create_test_app_with_feedback(Arc::new(StaticFeedback::failing()));
    let mut delegated = question("ai-1");
    delegated.ai_feedback = true;
    backends.catalog.seed(delegated);
    let mut client = TestClient::new(app);

    client.post("/api/v1/quiz/selection", select_body()).await;

    let (status, body) = client
        .post("/api/v1/quiz/answer", json!({ "answer": "something" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    // Ungraded, not wrong: correctness unknown, no reference answer leaked.
    assert_eq!(body["feedback"]["is_correct"], serde_json::Value::Null);
    assert_eq!(body["feedback"]["score"], serde_json::Value::Null);
    assert_eq!(
        body["feedback"]["feedback_text"],
        "We had trouble generating feedback. Try again later."
    );

    // The attempt still buffered, so the rating gate applies.
    let (_, body) = client.post("/api/v1/quiz/next", json!({})).await;
    assert_eq!(body["state"], "awaiting_rating");

    let (_, body) = client
        .post("/api/v1/quiz/next", json!({ "rating": 1 }))
        .await;
    assert_eq!(body["state"], "complete");

    let records = backends.logs.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].attempts.len(), 1);
    assert_eq!(records[0].attempts[0].score, 0.0);
}

#[tokio::test]
async fn test_delegated_feedback_score_drives_correctness() {
    let (app, backends) = create_test_app_with_feedback(Arc::new(StaticFeedback::replying(
        "FEEDBACK: Well reasoned.\nSCORE: 0,9",
    )));
    let mut delegated = question("ai-1");
    delegated.ai_feedback = true;
    backends.catalog.seed(delegated);
    let mut client = TestClient::new(app);

    client.post("/api/v1/quiz/selection", select_body()).await;

    let (_, body) = client
        .post("/api/v1/quiz/answer", json!({ "answer": "x = 1" }))
        .await;
    assert_eq!(body["feedback"]["is_correct"], true);
    assert_eq!(body["feedback"]["score"], 0.9);
    assert_eq!(body["feedback"]["feedback_text"], "Well reasoned.");

    client
        .post("/api/v1/quiz/next", json!({ "rating": 5 }))
        .await;

    let (_, body) = client.post("/api/v1/quiz/summary", json!({})).await;
    assert_eq!(body["correct"], 1);
    assert_eq!(body["avg_score"], 0.9);
}

#[tokio::test]
async fn test_stale_replay_after_completion_is_harmless() {
    let (app, backends) = create_test_app();
    backends.catalog.seed(question("alg-1"));
    let mut client = TestClient::new(app);

    client.post("/api/v1/quiz/selection", select_body()).await;
    client
        .post("/api/v1/quiz/answer", json!({ "answer": "1" }))
        .await;
    client
        .post("/api/v1/quiz/next", json!({ "rating": 4 }))
        .await;
    assert_eq!(backends.logs.records().len(), 1);

    // Browser-back replays against the finished run: no crash, no extra log.
    let (status, body) = client
        .post("/api/v1/quiz/answer", json!({ "answer": "1" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "complete");

    let (status, body) = client
        .post("/api/v1/quiz/next", json!({ "rating": 4 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "complete");

    assert_eq!(backends.logs.records().len(), 1);
}

#[tokio::test]
async fn test_summary_resets_for_a_fresh_run_of_the_same_selection() {
    let (app, backends) = create_test_app();
    backends.catalog.seed(question("alg-1"));
    let mut client = TestClient::new(app);

    let (_, body) = client.post("/api/v1/quiz/selection", select_body()).await;
    let first_run = body["run_id"].as_str().unwrap().to_string();

    client
        .post("/api/v1/quiz/answer", json!({ "answer": "1" }))
        .await;
    client
        .post("/api/v1/quiz/next", json!({ "rating": 4 }))
        .await;
    client.post("/api/v1/quiz/summary", json!({})).await;

    // The selection persists and the quiz restarts at the first question.
    let (status, body) = client.get("/api/v1/quiz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "question");
    assert_eq!(body["index"], 1);
    assert_eq!(body["attempts_made"], 0);

    // The rerun flushes under a different run id.
    client
        .post("/api/v1/quiz/answer", json!({ "answer": "1" }))
        .await;
    client
        .post("/api/v1/quiz/next", json!({ "rating": 3 }))
        .await;
    let records = backends.logs.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].run_id, first_run);
    assert_ne!(records[1].run_id, first_run);
}

#[tokio::test]
async fn test_switching_selection_discards_buffered_attempts() {
    let (app, backends) = create_test_app();
    backends.catalog.seed(question("alg-1"));
    let mut geometry = question("geo-1");
    geometry.course = "Geometry".to_string();
    geometry.question = "How many sides has a triangle?".to_string();
    geometry.correct_answer = "3".to_string();
    backends.catalog.seed(geometry);
    let mut client = TestClient::new(app);

    client.post("/api/v1/quiz/selection", select_body()).await;
    client
        .post("/api/v1/quiz/answer", json!({ "answer": "2" }))
        .await;

    let (status, _) = client
        .post(
            "/api/v1/quiz/selection",
            json!({ "subject": "Algebra", "course": "Geometry" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // The unflushed attempt from the abandoned run is gone for good.
    let (_, body) = client.get("/api/v1/quiz").await;
    assert_eq!(body["question"]["item_id"], "geo-1");
    assert_eq!(body["attempts_made"], 0);
    assert!(backends.logs.records().is_empty());
}

#[tokio::test]
async fn test_quiz_actions_without_selection_redirect_to_entry() {
    let (app, _backends) = create_test_app();
    let mut client = TestClient::new(app);

    let (status, body) = client.get("/api/v1/quiz").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["redirect"], "/api/v1/quiz/selection");

    let (status, _) = client
        .post("/api/v1/quiz/answer", json!({ "answer": "1" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_selection_without_active_questions_is_rejected() {
    let (app, backends) = create_test_app();
    let mut inactive = question("alg-1");
    inactive.active = false;
    backends.catalog.seed(inactive);
    let mut client = TestClient::new(app);

    let (status, body) = client.post("/api/v1/quiz/selection", select_body()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("No active questions"));
}

#[tokio::test]
async fn test_selection_validation_rejects_blank_fields() {
    let (app, _backends) = create_test_app();
    let mut client = TestClient::new(app);

    let (status, _) = client
        .post(
            "/api/v1/quiz/selection",
            json!({ "subject": "", "course": "Linear" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
