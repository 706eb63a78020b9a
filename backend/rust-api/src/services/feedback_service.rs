use anyhow::{Context, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;

/// Context shipped to the external feedback service for one submission.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackRequest {
    pub question: String,
    pub supporting_text: String,
    pub learner_answer: String,
    pub reference_answer: String,
    pub instructions: String,
}

/// External collaborator that turns a submission into free-text feedback.
///
/// The reply is expected to contain `FEEDBACK: <text>` and `SCORE: <0-1>`
/// lines, but callers must treat it as untrusted free text — see
/// [`parse_feedback_reply`].
#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    async fn generate(&self, request: &FeedbackRequest) -> Result<String>;
}

pub struct HttpFeedbackClient {
    http_client: Client,
    feedback_api_url: String,
}

impl HttpFeedbackClient {
    pub fn new(feedback_api_url: String) -> Self {
        Self {
            http_client: Client::new(),
            feedback_api_url,
        }
    }
}

#[async_trait]
impl FeedbackGenerator for HttpFeedbackClient {
    async fn generate(&self, request: &FeedbackRequest) -> Result<String> {
        let url = format!("{}/v1/feedback", self.feedback_api_url);

        tracing::debug!("Calling feedback service: {}", url);

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .context("Failed to call feedback service")?;

        if !response.status().is_success() {
            anyhow::bail!("Feedback service returned status: {}", response.status());
        }

        let reply = response
            .text()
            .await
            .context("Failed to read feedback service reply")?;

        if reply.trim().is_empty() {
            anyhow::bail!("Feedback service returned an empty reply");
        }

        Ok(reply)
    }
}

/// Canned feedback generator for tests and local development.
pub struct StaticFeedback {
    reply: Option<String>,
}

impl StaticFeedback {
    /// Always answers with the given reply.
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
        }
    }

    /// Always fails, as an unreachable collaborator would.
    pub fn failing() -> Self {
        Self { reply: None }
    }
}

#[async_trait]
impl FeedbackGenerator for StaticFeedback {
    async fn generate(&self, _request: &FeedbackRequest) -> Result<String> {
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => anyhow::bail!("feedback service unavailable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeedback {
    pub feedback: String,
    pub score: Option<f64>,
}

lazy_static! {
    static ref FEEDBACK_LINE: Regex = Regex::new(r"(?im)^.*?FEEDBACK:\s*(.+)$").unwrap();
    static ref SCORE_LINE: Regex = Regex::new(r"(?im)^.*?SCORE:\s*([0-9]+(?:[.,][0-9]+)?)").unwrap();
}

/// Pull the feedback text and score out of a free-text service reply.
///
/// Tolerates surrounding prose and a comma decimal separator. A missing
/// feedback line yields an empty string; a missing or unparseable score
/// yields `None`. Out-of-range scores are clamped to [0, 1]. Never fails.
pub fn parse_feedback_reply(reply: &str) -> ParsedFeedback {
    let feedback = FEEDBACK_LINE
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let score = SCORE_LINE
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
        .map(|value| value.clamp(0.0, 1.0));

    ParsedFeedback { feedback, score }
}
