use std::sync::Arc;

use chrono::Utc;

use crate::error::QuizApiError;
use crate::metrics::{ANSWERS_SUBMITTED_TOTAL, QUIZ_RUNS_ACTIVE, QUIZ_RUNS_TOTAL};
use crate::models::{
    AdvanceRequest, FeedbackView, LogMeta, QuizQuestion, QuizSessionState, QuizViewResponse,
    QuizViewState, RunSummary, SelectCourseRequest, SelectCourseResponse, Selection,
    SubmitAnswerRequest, SummaryResponse,
};
use crate::services::catalog_service::QuestionCatalog;
use crate::services::log_service::LogWriter;
use crate::services::scoring_service::ScoringService;
use crate::services::session_store::SessionStore;
use crate::services::AppState;

/// Drives one learner through a quiz run:
/// select → display → submit* → (rating) → advance → … → complete.
///
/// All per-visitor state lives in the session store blob; every public
/// method loads it, applies one transition and saves it back, so each HTTP
/// request observes and produces a consistent snapshot.
pub struct QuizService {
    catalog: Arc<dyn QuestionCatalog>,
    sessions: Arc<dyn SessionStore>,
    scoring: ScoringService,
    log_writer: LogWriter,
}

struct LoadedRun {
    state: QuizSessionState,
    selection: Selection,
    questions: Vec<QuizQuestion>,
}

impl QuizService {
    pub fn new(state: &AppState) -> Self {
        Self {
            catalog: state.catalog.clone(),
            sessions: state.sessions.clone(),
            scoring: ScoringService::new(state.feedback.clone()),
            log_writer: LogWriter::new(state.logs.clone()),
        }
    }

    /// Entry: validate the grouping, throw away any previous run state and
    /// start a fresh run.
    pub async fn select(
        &self,
        visitor_id: &str,
        req: SelectCourseRequest,
    ) -> Result<SelectCourseResponse, QuizApiError> {
        let selection = Selection {
            subject: req.subject,
            course: req.course,
            concept: req.concept,
        };

        if !self.catalog.has_active_questions(&selection).await? {
            tracing::info!(
                "Rejected selection without active questions: {}/{}",
                selection.subject,
                selection.course
            );
            return Err(QuizApiError::NoActiveQuestions);
        }

        let total = self.catalog.active_questions(&selection).await?.len();

        let mut state = self.sessions.load(visitor_id).await?.unwrap_or_default();
        state.reset_for_selection(selection.clone());
        let run_id = state
            .progress
            .as_ref()
            .map(|p| p.run_id.clone())
            .unwrap_or_default();
        self.sessions.save(visitor_id, &state).await?;

        QUIZ_RUNS_TOTAL.with_label_values(&["started"]).inc();
        QUIZ_RUNS_ACTIVE.inc();

        tracing::info!(
            "Quiz run {} started: visitor={}, selection={}/{}, questions={}",
            run_id,
            visitor_id,
            selection.subject,
            selection.course,
            total
        );

        Ok(SelectCourseResponse {
            subject: selection.subject,
            course: selection.course,
            concept: selection.concept,
            run_id,
            total,
        })
    }

    /// Display: the current question, or the completion marker once the run
    /// is exhausted. Stamps the item's start time on every display.
    pub async fn current(&self, visitor_id: &str) -> Result<QuizViewResponse, QuizApiError> {
        let LoadedRun {
            mut state,
            questions,
            ..
        } = self.load_run(visitor_id).await?;

        let progress = state.progress_mut();
        let run_id = progress.run_id.clone();
        let index = progress.index;
        let total = questions.len();

        if index >= total {
            return Ok(Self::complete_view(total));
        }

        let question = &questions[index];
        state.start_once(&run_id, &question.item_id, Utc::now());
        let attempts_made = state
            .buffer(&run_id, &question.item_id)
            .map_or(0, |b| b.len());
        self.sessions.save(visitor_id, &state).await?;

        Ok(QuizViewResponse {
            state: QuizViewState::Question,
            question: Some(question.into()),
            index: index + 1,
            total,
            attempts_made,
            ask_rating: false,
            feedback: None,
        })
    }

    /// Submit: grade the answer, buffer it as a new attempt and re-display
    /// the same question with feedback. The index never moves here.
    pub async fn submit(
        &self,
        visitor_id: &str,
        req: SubmitAnswerRequest,
    ) -> Result<QuizViewResponse, QuizApiError> {
        let LoadedRun {
            mut state,
            questions,
            ..
        } = self.load_run(visitor_id).await?;

        let progress = state.progress_mut();
        let run_id = progress.run_id.clone();
        let index = progress.index;
        let total = questions.len();

        if index >= total {
            // Stale form replay after the run finished: re-derive rather
            // than crash.
            tracing::warn!(
                "Answer submitted past the end of run {}; returning completion",
                run_id
            );
            return Ok(Self::complete_view(total));
        }

        let question = questions[index].clone();
        let answer = req.answer.trim().to_string();

        let evaluation = self.scoring.evaluate(&question, &answer).await;

        let correct_label = match evaluation.is_correct {
            Some(true) => "true",
            Some(false) => "false",
            None => "unknown",
        };
        ANSWERS_SUBMITTED_TOTAL
            .with_label_values(&[correct_label])
            .inc();

        let now = Utc::now();
        state.start_once(&run_id, &question.item_id, now);
        state.append_attempt(
            &run_id,
            &question.item_id,
            answer,
            evaluation.feedback_text.clone().unwrap_or_default(),
            evaluation.correct_answer.clone().unwrap_or_default(),
            evaluation.is_correct.unwrap_or(false),
            evaluation.score.unwrap_or(0.0),
            now,
        );

        if evaluation.is_correct == Some(true) {
            state.progress_mut().record_correct();
        }

        let attempts_made = state
            .buffer(&run_id, &question.item_id)
            .map_or(0, |b| b.len());
        self.sessions.save(visitor_id, &state).await?;

        Ok(QuizViewResponse {
            state: QuizViewState::Question,
            question: Some((&question).into()),
            index: index + 1,
            total,
            attempts_made,
            ask_rating: false,
            feedback: Some(FeedbackView {
                is_correct: evaluation.is_correct,
                score: evaluation.score,
                correct_answer: evaluation.correct_answer,
                feedback_text: evaluation.feedback_text,
            }),
        })
    }

    /// Advance: enforce the rating gate, aggregate the last attempt's score,
    /// flush the buffer into a durable log record and move to the next item.
    pub async fn advance(
        &self,
        visitor_id: &str,
        req: AdvanceRequest,
    ) -> Result<QuizViewResponse, QuizApiError> {
        let LoadedRun {
            mut state,
            selection,
            questions,
        } = self.load_run(visitor_id).await?;

        let progress = state.progress_mut();
        let run_id = progress.run_id.clone();
        let index = progress.index;
        let total = questions.len();

        if index >= total {
            tracing::warn!(
                "Advance requested past the end of run {}; returning completion",
                run_id
            );
            return Ok(Self::complete_view(total));
        }

        let question = questions[index].clone();
        let rating = coerce_rating_input(req.rating.as_ref());

        let needs_rating = state
            .last_attempt(&run_id, &question.item_id)
            .is_some_and(|attempt| attempt.rating.is_none());

        // Rating gate: an attempted item may not be left until it is rated.
        // Pure skips (no attempts) pass straight through.
        if needs_rating && rating.is_none() {
            let attempts_made = state
                .buffer(&run_id, &question.item_id)
                .map_or(0, |b| b.len());
            return Ok(QuizViewResponse {
                state: QuizViewState::AwaitingRating,
                question: Some((&question).into()),
                index: index + 1,
                total,
                attempts_made,
                ask_rating: true,
                feedback: None,
            });
        }

        if needs_rating {
            if let Some(rating) = rating {
                state.set_rating_on_last(&run_id, &question.item_id, rating);
            }
        }

        // Only the final attempt's score counts toward the run average, and
        // only when the learner actually attempted the item.
        let last_score = state
            .last_attempt(&run_id, &question.item_id)
            .map(|attempt| attempt.score);
        if let Some(score) = last_score {
            state.progress_mut().record_scored(score);
        }

        let meta = LogMeta {
            session_id: visitor_id.to_string(),
            subject: selection.subject.clone(),
            course: selection.course.clone(),
            concept: question.concept.clone(),
            title: question.title.clone(),
            text: question.text.clone(),
            image: question.image.clone(),
            question: question.question.clone(),
            correct_answer: question.correct_answer.clone(),
            ai_feedback: question.ai_feedback,
            feedback_prompt: question.feedback_prompt.clone(),
        };
        self.log_writer
            .flush(&mut state, &run_id, &question.item_id, meta)
            .await?;

        state.progress_mut().advance();
        let next_index = state.progress_mut().index;

        if next_index >= total {
            self.sessions.save(visitor_id, &state).await?;
            return Ok(Self::complete_view(total));
        }

        let next_question = &questions[next_index];
        state.start_once(&run_id, &next_question.item_id, Utc::now());
        self.sessions.save(visitor_id, &state).await?;

        Ok(QuizViewResponse {
            state: QuizViewState::Question,
            question: Some(next_question.into()),
            index: next_index + 1,
            total,
            attempts_made: 0,
            ask_rating: false,
            feedback: None,
        })
    }

    /// Complete: report the run summary and reset the counters so the same
    /// selection can be run again.
    pub async fn summary(&self, visitor_id: &str) -> Result<SummaryResponse, QuizApiError> {
        let LoadedRun {
            mut state,
            selection,
            questions,
        } = self.load_run(visitor_id).await?;

        let total = questions.len();
        let summary = state
            .progress
            .as_ref()
            .map(|p| p.summary(total))
            .unwrap_or(RunSummary {
                correct: 0,
                total,
                score_sum: 0.0,
                avg_score: 0.0,
            });

        // Counters reset for a fresh run; the selection persists so the
        // learner can immediately run the same grouping again.
        state.progress_mut().reset();
        state.buffers.clear();
        self.sessions.save(visitor_id, &state).await?;

        QUIZ_RUNS_TOTAL.with_label_values(&["completed"]).inc();
        QUIZ_RUNS_ACTIVE.dec();

        tracing::info!(
            "Quiz run completed: visitor={}, correct={}/{}, avg_score={:.3}",
            visitor_id,
            summary.correct,
            total,
            summary.avg_score
        );

        Ok(SummaryResponse {
            correct: summary.correct,
            total,
            subject: selection.subject,
            course: selection.course,
            concept: selection.concept,
            score_sum: round3(summary.score_sum),
            avg_score: round3(summary.avg_score),
        })
    }

    async fn load_run(&self, visitor_id: &str) -> Result<LoadedRun, QuizApiError> {
        let state = self.sessions.load(visitor_id).await?.unwrap_or_default();
        let selection = state
            .selection
            .clone()
            .ok_or(QuizApiError::SelectionRequired)?;

        let questions = self.catalog.active_questions(&selection).await?;
        if questions.is_empty() {
            // The catalog can shrink mid-run (questions deactivated); the
            // learner is sent back to selection rather than served a crash.
            return Err(QuizApiError::NoActiveQuestions);
        }

        Ok(LoadedRun {
            state,
            selection,
            questions,
        })
    }

    fn complete_view(total: usize) -> QuizViewResponse {
        QuizViewResponse {
            state: QuizViewState::Complete,
            question: None,
            index: total,
            total,
            attempts_made: 0,
            ask_rating: false,
            feedback: None,
        }
    }
}

/// Coerce whatever arrived in the "rating" field to an integer.
///
/// Digit strings and integral numbers pass through; everything else counts
/// as "no rating supplied". Range is enforced where the rating is stored,
/// so an out-of-range value satisfies the gate but is logged as null.
fn coerce_rating_input(value: Option<&serde_json::Value>) -> Option<i64> {
    match value? {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
                trimmed.parse().ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
