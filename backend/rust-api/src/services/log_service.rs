use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use mongodb::Database;
use uuid::Uuid;

use crate::metrics::{track_db_operation, QUESTION_LOGS_WRITTEN_TOTAL};
use crate::models::{LogMeta, LoggedAttempt, QuestionLogRecord, QuizSessionState};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

/// Durable, append-only store of question log records. The quiz core only
/// ever creates records; nothing updates or deletes them.
#[async_trait]
pub trait QuestionLogStore: Send + Sync {
    async fn insert(&self, record: &QuestionLogRecord) -> Result<()>;

    async fn healthy(&self) -> Result<()>;
}

pub struct MongoQuestionLogStore {
    mongo: Database,
}

impl MongoQuestionLogStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }
}

#[async_trait]
impl QuestionLogStore for MongoQuestionLogStore {
    async fn insert(&self, record: &QuestionLogRecord) -> Result<()> {
        let collection: mongodb::Collection<QuestionLogRecord> =
            self.mongo.collection("question_logs");

        track_db_operation("insert", "question_logs", async {
            collection
                .insert_one(record)
                .await
                .map(|_| ())
                .context("Failed to save question log record to MongoDB")
        })
        .await
    }

    async fn healthy(&self) -> Result<()> {
        self.mongo
            .run_command(mongodb::bson::doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        Ok(())
    }
}

/// In-memory log store for tests. Records are retained so tests can assert
/// on exactly what would have been persisted.
#[derive(Default)]
pub struct InMemoryQuestionLogStore {
    records: Mutex<Vec<QuestionLogRecord>>,
}

impl InMemoryQuestionLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<QuestionLogRecord> {
        self.records
            .lock()
            .expect("log store lock poisoned")
            .clone()
    }
}

#[async_trait]
impl QuestionLogStore for InMemoryQuestionLogStore {
    async fn insert(&self, record: &QuestionLogRecord) -> Result<()> {
        self.records
            .lock()
            .expect("log store lock poisoned")
            .push(record.clone());
        Ok(())
    }

    async fn healthy(&self) -> Result<()> {
        Ok(())
    }
}

/// Reconciles one attempt buffer into exactly one durable log record.
pub struct LogWriter {
    store: Arc<dyn QuestionLogStore>,
}

impl LogWriter {
    pub fn new(store: Arc<dyn QuestionLogStore>) -> Self {
        Self { store }
    }

    /// Persist the buffered attempts for (run, item) as one record and clear
    /// the buffer.
    ///
    /// The start timestamp is popped first, before the emptiness check, so a
    /// stale stamp can never leak into a later visit of the same item. An
    /// empty buffer still produces a minimal record — pressing "next"
    /// without submitting is an auditable event, not a silent skip.
    pub async fn flush(
        &self,
        state: &mut QuizSessionState,
        run_id: &str,
        item_id: &str,
        meta: LogMeta,
    ) -> Result<QuestionLogRecord> {
        let started_at = state.pop_started(run_id, item_id);
        let attempts = state.drain_attempts(run_id, item_id);

        let item_rating = attempts.last().and_then(|attempt| attempt.rating);
        let kind = if attempts.is_empty() { "minimal" } else { "full" };

        let record = QuestionLogRecord {
            id: Uuid::new_v4().to_string(),
            session_id: meta.session_id,
            run_id: run_id.to_string(),
            item_id: item_id.to_string(),
            subject: meta.subject,
            course: meta.course,
            concept: meta.concept,
            title: meta.title,
            text: meta.text,
            image: meta.image,
            question: meta.question,
            correct_answer: meta.correct_answer,
            ai_feedback: meta.ai_feedback,
            feedback_prompt: meta.feedback_prompt,
            started_at,
            attempts: attempts.iter().map(LoggedAttempt::from).collect(),
            item_rating,
            created_at: Utc::now(),
        };

        retry_async_with_config(RetryConfig::aggressive(), || async {
            self.store.insert(&record).await
        })
        .await?;

        QUESTION_LOGS_WRITTEN_TOTAL.with_label_values(&[kind]).inc();

        tracing::info!(
            "Question log written: run={}, item={}, attempts={}, rating={:?}",
            run_id,
            item_id,
            record.attempts.len(),
            record.item_rating
        );

        Ok(record)
    }
}
