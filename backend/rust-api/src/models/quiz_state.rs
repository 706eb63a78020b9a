use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attempt::{Attempt, AttemptBuffer};
use super::question::Selection;

/// Position and counters for one quiz run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunProgress {
    pub run_id: String,
    pub index: usize,
    pub correct_count: u32,
    pub score_sum: f64,
    pub items_scored: u32,
}

impl RunProgress {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().simple().to_string(),
            index: 0,
            correct_count: 0,
            score_sum: 0.0,
            items_scored: 0,
        }
    }

    pub fn advance(&mut self) {
        self.index += 1;
    }

    pub fn record_correct(&mut self) {
        self.correct_count += 1;
    }

    /// Add one scored item to the running aggregate. Called once per item on
    /// advance, and only when at least one attempt was made — pure skips do
    /// not dilute the average.
    pub fn record_scored(&mut self, score: f64) {
        self.score_sum += score;
        self.items_scored += 1;
    }

    /// Zero the counters and mint a fresh run id. The learner's selection is
    /// kept elsewhere, so the next display starts a new run of the same
    /// grouping.
    pub fn reset(&mut self) {
        *self = RunProgress::new();
    }

    pub fn summary(&self, total: usize) -> RunSummary {
        let avg_score = if self.items_scored > 0 {
            self.score_sum / self.items_scored as f64
        } else {
            0.0
        };
        RunSummary {
            correct: self.correct_count,
            total,
            score_sum: self.score_sum,
            avg_score,
        }
    }
}

impl Default for RunProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub correct: u32,
    pub total: usize,
    pub score_sum: f64,
    pub avg_score: f64,
}

/// The complete per-visitor quiz state, serialized into the session store as
/// one blob at request boundaries.
///
/// This replaces the free-form string-keyed session dict of older designs
/// with explicit fields: the current selection, the run progress, and the
/// attempt buffers keyed by (run, item).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuizSessionState {
    pub selection: Option<Selection>,
    pub progress: Option<RunProgress>,
    #[serde(default)]
    pub buffers: HashMap<String, AttemptBuffer>,
}

fn buffer_key(run_id: &str, item_id: &str) -> String {
    format!("{}:{}", run_id, item_id)
}

impl QuizSessionState {
    /// Replace the selection and drop all run state. Used on course switch
    /// and on entry, so a new run never sees another run's buffers.
    pub fn reset_for_selection(&mut self, selection: Selection) {
        self.selection = Some(selection);
        self.progress = Some(RunProgress::new());
        self.buffers.clear();
    }

    /// The active run, created lazily on first display.
    pub fn progress_mut(&mut self) -> &mut RunProgress {
        self.progress.get_or_insert_with(RunProgress::new)
    }

    pub fn buffer(&self, run_id: &str, item_id: &str) -> Option<&AttemptBuffer> {
        self.buffers.get(&buffer_key(run_id, item_id))
    }

    fn buffer_mut(&mut self, run_id: &str, item_id: &str) -> &mut AttemptBuffer {
        self.buffers.entry(buffer_key(run_id, item_id)).or_default()
    }

    pub fn start_once(&mut self, run_id: &str, item_id: &str, now: DateTime<Utc>) {
        self.buffer_mut(run_id, item_id).start_once(now);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn append_attempt(
        &mut self,
        run_id: &str,
        item_id: &str,
        answer: String,
        feedback: String,
        correct_answer: String,
        is_correct: bool,
        score: f64,
        now: DateTime<Utc>,
    ) {
        self.buffer_mut(run_id, item_id)
            .append(answer, feedback, correct_answer, is_correct, score, now);
    }

    pub fn set_rating_on_last(&mut self, run_id: &str, item_id: &str, rating: i64) {
        if let Some(buffer) = self.buffers.get_mut(&buffer_key(run_id, item_id)) {
            buffer.set_rating_on_last(rating);
        }
    }

    pub fn last_attempt(&self, run_id: &str, item_id: &str) -> Option<&Attempt> {
        self.buffer(run_id, item_id).and_then(AttemptBuffer::last)
    }

    /// Pop the started timestamp for (run, item), removing the stamp even
    /// when no attempt was ever buffered so it cannot leak into a later
    /// visit of the same item.
    pub fn pop_started(&mut self, run_id: &str, item_id: &str) -> Option<DateTime<Utc>> {
        self.buffers
            .get_mut(&buffer_key(run_id, item_id))
            .and_then(AttemptBuffer::pop_started)
    }

    /// Drain the buffered attempts for (run, item) and remove the buffer
    /// entry entirely.
    pub fn drain_attempts(&mut self, run_id: &str, item_id: &str) -> Vec<Attempt> {
        match self.buffers.remove(&buffer_key(run_id, item_id)) {
            Some(mut buffer) => buffer.drain(),
            None => Vec::new(),
        }
    }
}
