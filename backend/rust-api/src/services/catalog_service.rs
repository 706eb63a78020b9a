use std::collections::BTreeSet;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::FindOptions;
use mongodb::Database;

use crate::metrics::track_db_operation;
use crate::models::{QuizQuestion, Selection};

/// Read-only view of the question catalog. The quiz core never writes here.
#[async_trait]
pub trait QuestionCatalog: Send + Sync {
    /// Active questions for a selection, ordered ascending by item id so a
    /// run always walks the same stable sequence.
    async fn active_questions(&self, selection: &Selection) -> Result<Vec<QuizQuestion>>;

    async fn has_active_questions(&self, selection: &Selection) -> Result<bool>;

    async fn subjects(&self) -> Result<Vec<String>>;

    async fn courses(&self, subject: &str) -> Result<Vec<String>>;

    async fn concepts(&self, subject: &str, course: &str) -> Result<Vec<String>>;

    async fn healthy(&self) -> Result<()>;
}

pub struct MongoQuestionCatalog {
    mongo: Database,
}

impl MongoQuestionCatalog {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn collection(&self) -> mongodb::Collection<QuizQuestion> {
        self.mongo.collection("questions")
    }

    fn selection_filter(selection: &Selection) -> Document {
        let mut filter = doc! {
            "active": true,
            "subject": &selection.subject,
            "course": &selection.course,
        };
        if let Some(concept) = &selection.concept {
            filter.insert("concept", concept);
        }
        filter
    }

    async fn distinct_strings(&self, field: &str, filter: Document) -> Result<Vec<String>> {
        let values = track_db_operation("distinct", "questions", async {
            self.collection()
                .distinct(field, filter)
                .await
                .context("Failed to query distinct catalog values")
        })
        .await?;

        let mut strings: Vec<String> = values
            .into_iter()
            .filter_map(|value| match value {
                Bson::String(s) => Some(s),
                _ => None,
            })
            .collect();
        strings.sort();
        Ok(strings)
    }
}

#[async_trait]
impl QuestionCatalog for MongoQuestionCatalog {
    async fn active_questions(&self, selection: &Selection) -> Result<Vec<QuizQuestion>> {
        let filter = Self::selection_filter(selection);
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();

        track_db_operation("find", "questions", async {
            let mut cursor = self
                .collection()
                .find(filter)
                .with_options(options)
                .await
                .context("Failed to query questions")?;

            let mut questions = Vec::new();
            while let Some(question) = cursor
                .try_next()
                .await
                .context("Failed to iterate questions")?
            {
                questions.push(question);
            }
            Ok(questions)
        })
        .await
    }

    async fn has_active_questions(&self, selection: &Selection) -> Result<bool> {
        let filter = Self::selection_filter(selection);
        let found = track_db_operation("find_one", "questions", async {
            self.collection()
                .find_one(filter)
                .await
                .context("Failed to probe questions")
        })
        .await?;
        Ok(found.is_some())
    }

    async fn subjects(&self) -> Result<Vec<String>> {
        self.distinct_strings("subject", doc! { "active": true })
            .await
    }

    async fn courses(&self, subject: &str) -> Result<Vec<String>> {
        self.distinct_strings("course", doc! { "active": true, "subject": subject })
            .await
    }

    async fn concepts(&self, subject: &str, course: &str) -> Result<Vec<String>> {
        self.distinct_strings(
            "concept",
            doc! { "active": true, "subject": subject, "course": course },
        )
        .await
    }

    async fn healthy(&self) -> Result<()> {
        self.mongo
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        Ok(())
    }
}

/// In-memory catalog for tests and local prototyping. Questions keep their
/// insertion identity; ordering follows ascending item id like the MongoDB
/// backend.
#[derive(Default)]
pub struct InMemoryQuestionCatalog {
    questions: Mutex<Vec<QuizQuestion>>,
}

impl InMemoryQuestionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, question: QuizQuestion) {
        self.questions
            .lock()
            .expect("catalog lock poisoned")
            .push(question);
    }

    fn matching(&self, selection: &Selection) -> Vec<QuizQuestion> {
        let mut questions: Vec<QuizQuestion> = self
            .questions
            .lock()
            .expect("catalog lock poisoned")
            .iter()
            .filter(|q| q.active && selection.matches(q))
            .cloned()
            .collect();
        questions.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        questions
    }

    fn distinct<F>(&self, filter: F, field: fn(&QuizQuestion) -> &str) -> Vec<String>
    where
        F: Fn(&QuizQuestion) -> bool,
    {
        let questions = self.questions.lock().expect("catalog lock poisoned");
        let values: BTreeSet<String> = questions
            .iter()
            .filter(|q| q.active && filter(q))
            .map(|q| field(q).to_string())
            .collect();
        values.into_iter().collect()
    }
}

#[async_trait]
impl QuestionCatalog for InMemoryQuestionCatalog {
    async fn active_questions(&self, selection: &Selection) -> Result<Vec<QuizQuestion>> {
        Ok(self.matching(selection))
    }

    async fn has_active_questions(&self, selection: &Selection) -> Result<bool> {
        Ok(!self.matching(selection).is_empty())
    }

    async fn subjects(&self) -> Result<Vec<String>> {
        Ok(self.distinct(|_| true, |q| q.subject.as_str()))
    }

    async fn courses(&self, subject: &str) -> Result<Vec<String>> {
        Ok(self.distinct(|q| q.subject == subject, |q| q.course.as_str()))
    }

    async fn concepts(&self, subject: &str, course: &str) -> Result<Vec<String>> {
        Ok(self.distinct(
            |q| q.subject == subject && q.course == course,
            |q| q.concept.as_str(),
        ))
    }

    async fn healthy(&self) -> Result<()> {
        Ok(())
    }
}
