use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One graded submission for a question within a run.
///
/// Attempts are numbered 1, 2, 3, … within their buffer. Only the last
/// attempt of a buffer may ever carry a rating, and only once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub n: u32,
    pub answer: String,
    pub feedback: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub score: f64,
    pub rating: Option<u8>,
    pub submitted_at: DateTime<Utc>,
}

/// Ephemeral per-(run, item) holding area for attempts prior to flush.
///
/// Lives inside the visitor's session blob. The started-at timestamp is
/// stamped once on first display and consumed exactly once during flush.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttemptBuffer {
    pub started_at: Option<DateTime<Utc>>,
    pub attempts: Vec<Attempt>,
}

impl AttemptBuffer {
    /// Stamp the start time if and only if none exists yet.
    ///
    /// Safe to call on every display: self-heals a missing timestamp but
    /// never overwrites one.
    pub fn start_once(&mut self, now: DateTime<Utc>) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    /// Append a new attempt, assigning the next sequence number and the
    /// submission timestamp. The rating is left unset.
    pub fn append(
        &mut self,
        answer: String,
        feedback: String,
        correct_answer: String,
        is_correct: bool,
        score: f64,
        now: DateTime<Utc>,
    ) {
        let n = self.attempts.len() as u32 + 1;
        self.attempts.push(Attempt {
            n,
            answer,
            feedback,
            correct_answer,
            is_correct,
            score,
            rating: None,
            submitted_at: now,
        });
    }

    /// Set the rating on the last attempt.
    ///
    /// No-op when the buffer is empty, when a rating is already present,
    /// or when the value is outside [1, 5].
    pub fn set_rating_on_last(&mut self, rating: i64) {
        if !(1..=5).contains(&rating) {
            return;
        }
        if let Some(last) = self.attempts.last_mut() {
            if last.rating.is_none() {
                last.rating = Some(rating as u8);
            }
        }
    }

    /// Read and remove the start timestamp. Used exactly once during flush;
    /// returns `None` if the item was never displayed.
    pub fn pop_started(&mut self) -> Option<DateTime<Utc>> {
        self.started_at.take()
    }

    /// Return and clear the buffered attempts, preserving order.
    pub fn drain(&mut self) -> Vec<Attempt> {
        std::mem::take(&mut self.attempts)
    }

    pub fn last(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }
}
