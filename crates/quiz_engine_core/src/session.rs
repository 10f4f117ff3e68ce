//! crates/quiz_engine_core/src/session.rs
//!
//! In-memory state of one learner's active quiz, plus the pausable clock that
//! times each question. Persistence of answers happens outside, driven by the
//! `AnswerOutcome` values this machine hands back.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use thiserror::Error;
use uuid::Uuid;

use crate::domain::{BloomLevel, GeneratedQuestion, QuizResults, ResponseType, StoredQuestion, UsageType, OPTION_COUNT};
use crate::scoring::{calculate_test_results, TestResultSummary};

//=========================================================================================
// Session clock
//=========================================================================================

/// Stopwatch that only accumulates while running. Callers pass `now` so
/// tests can drive time explicitly.
#[derive(Debug, Clone, Default)]
pub struct SessionClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears any accumulated time and starts running.
    pub fn start(&mut self, now: Instant) {
        self.start_with(now, Duration::ZERO);
    }

    /// Starts running on top of time already spent earlier.
    pub fn start_with(&mut self, now: Instant, spent: Duration) {
        self.accumulated = spent;
        self.running_since = Some(now);
    }

    pub fn pause(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    pub fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
        self.running_since = None;
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + now.saturating_duration_since(since),
            None => self.accumulated,
        }
    }
}

//=========================================================================================
// Session types
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    InProgress,
    Answered,
    Completed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("No quiz is in progress")]
    NotInProgress,
    #[error("The current question has already been answered")]
    AlreadyAnswered,
    #[error("Option {0} does not exist")]
    InvalidOption(usize),
    #[error("The current question has not been answered yet")]
    NotAnswered,
    #[error("There is no earlier question to review")]
    NoHistory,
}

/// One answered question as kept in the session history.
#[derive(Debug, Clone, PartialEq)]
pub struct AnsweredItem {
    pub question: StoredQuestion,
    pub selected: Option<usize>,
    pub response: ResponseType,
    pub time_spent_ms: u64,
}

/// What the caller needs to persist after an answer.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    pub question_id: Uuid,
    pub chunk_id: Uuid,
    pub usage_type: UsageType,
    pub bloom_level: BloomLevel,
    pub response: ResponseType,
    pub selected: Option<usize>,
    pub time_spent_ms: u64,
}

impl AnswerOutcome {
    pub fn is_correct(&self) -> bool {
        self.response == ResponseType::Correct
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// A new question is on screen.
    Question,
    /// A new question is on screen and it opens batch `n` (zero based).
    NewBatch(usize),
    /// Revisiting an already-answered question.
    Review,
    Completed(TestResultSummary),
}

pub const PLACEHOLDER_TEXT: &str =
    "No questions are available for this section yet. New questions are being prepared; please check back shortly.";

/// Stand-in question shown when a quiz starts with an empty pool.
pub fn placeholder_question() -> StoredQuestion {
    StoredQuestion {
        id: Uuid::nil(),
        chunk_id: Uuid::nil(),
        course_id: Uuid::nil(),
        usage_type: UsageType::Antrenman,
        question: GeneratedQuestion {
            text: PLACEHOLDER_TEXT.to_string(),
            options: vec!["Continue".to_string(); OPTION_COUNT],
            correct_index: 0,
            explanation: String::new(),
            evidence: String::new(),
            bloom_level: BloomLevel::Knowledge,
            concept: String::new(),
            image_index: None,
            diagnosis: None,
            insight: None,
        },
        parent_question_id: None,
    }
}

//=========================================================================================
// Quiz session
//=========================================================================================

#[derive(Debug, Clone)]
pub struct QuizSession {
    state: SessionState,
    current: Option<StoredQuestion>,
    queue: VecDeque<StoredQuestion>,
    history: Vec<AnsweredItem>,
    results: QuizResults,
    /// Planned size of each batch; follow-ups grow the batch they land in.
    batch_sizes: Vec<usize>,
    /// How many questions have been taken off the queue so far.
    served: usize,
    /// Index into `history` while rewinding.
    review_index: Option<usize>,
    placeholder: bool,
    clock: SessionClock,
    /// Time spent on a question that was put back unanswered by `previous`.
    carried: Option<(Uuid, Duration)>,
    summary: Option<TestResultSummary>,
}

impl Default for QuizSession {
    fn default() -> Self {
        Self::new()
    }
}

impl QuizSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::NotStarted,
            current: None,
            queue: VecDeque::new(),
            history: Vec::new(),
            results: QuizResults::default(),
            batch_sizes: Vec::new(),
            served: 0,
            review_index: None,
            placeholder: false,
            clock: SessionClock::new(),
            carried: None,
            summary: None,
        }
    }

    /// Loads a single-batch quiz and starts timing the first question.
    pub fn start(&mut self, questions: Vec<StoredQuestion>, now: Instant) {
        self.start_batched(vec![questions], now);
    }

    /// Loads a quiz split into batches. Empty batches are dropped.
    pub fn start_batched(&mut self, batches: Vec<Vec<StoredQuestion>>, now: Instant) {
        *self = Self::new();
        for batch in batches.into_iter().filter(|b| !b.is_empty()) {
            self.batch_sizes.push(batch.len());
            self.queue.extend(batch);
        }

        self.state = SessionState::InProgress;
        match self.queue.pop_front() {
            Some(first) => {
                self.current = Some(first);
                self.served = 1;
            }
            None => {
                self.current = Some(placeholder_question());
                self.placeholder = true;
            }
        }
        self.clock.start(now);
    }

    /// Records an answer for the current question. `None` is a blank.
    /// Returns `None` for the placeholder, which records nothing.
    pub fn submit_answer(&mut self, selected: Option<usize>, now: Instant) -> Result<Option<AnswerOutcome>, SessionError> {
        match self.state {
            SessionState::InProgress => {}
            SessionState::Answered => return Err(SessionError::AlreadyAnswered),
            SessionState::NotStarted | SessionState::Completed => return Err(SessionError::NotInProgress),
        }
        let current = self.current.as_ref().ok_or(SessionError::NotInProgress)?;
        if let Some(index) = selected {
            if index >= OPTION_COUNT {
                return Err(SessionError::InvalidOption(index));
            }
        }

        self.clock.pause(now);
        self.state = SessionState::Answered;
        if self.placeholder {
            return Ok(None);
        }

        let time_spent_ms = self.clock.elapsed(now).as_millis() as u64;
        let response = match selected {
            None => ResponseType::Blank,
            Some(index) if index == current.question.correct_index => ResponseType::Correct,
            Some(_) => ResponseType::Incorrect,
        };
        self.results.record(response, time_spent_ms);

        let outcome = AnswerOutcome {
            question_id: current.id,
            chunk_id: current.chunk_id,
            usage_type: current.usage_type,
            bloom_level: current.question.bloom_level,
            response,
            selected,
            time_spent_ms,
        };
        self.history.push(AnsweredItem {
            question: current.clone(),
            selected,
            response,
            time_spent_ms,
        });
        Ok(Some(outcome))
    }

    /// Moves forward. Out of review this requires the current question to be answered.
    pub fn next(&mut self, now: Instant) -> Result<Advance, SessionError> {
        match self.state {
            SessionState::Answered => {}
            SessionState::InProgress => return Err(SessionError::NotAnswered),
            SessionState::NotStarted | SessionState::Completed => return Err(SessionError::NotInProgress),
        }

        if let Some(index) = self.review_index {
            if index + 1 < self.history.len() {
                self.review_index = Some(index + 1);
                self.current = Some(self.history[index + 1].question.clone());
                return Ok(Advance::Review);
            }
            self.review_index = None;
        }

        let Some(question) = self.queue.pop_front() else {
            return Ok(Advance::Completed(self.complete()));
        };

        let spent = self
            .carried
            .take()
            .filter(|(id, _)| *id == question.id)
            .map_or(Duration::ZERO, |(_, spent)| spent);

        let previous_batch = self.batch_index();
        self.served += 1;
        self.current = Some(question);
        self.state = SessionState::InProgress;
        self.clock.start_with(now, spent);

        let batch = self.batch_index();
        Ok(if batch > previous_batch { Advance::NewBatch(batch) } else { Advance::Question })
    }

    /// Rewinds one answered question for read-only review. Results stay as recorded.
    pub fn previous(&mut self, now: Instant) -> Result<&AnsweredItem, SessionError> {
        let target = match (self.state, self.review_index) {
            (SessionState::Answered, Some(index)) => index.checked_sub(1),
            (SessionState::Answered, None) => {
                // The answered current question is already the last history entry,
                // except for the placeholder which never enters history.
                let skip = usize::from(!self.placeholder);
                self.history.len().checked_sub(1 + skip)
            }
            (SessionState::InProgress, _) => self.history.len().checked_sub(1),
            _ => return Err(SessionError::NotInProgress),
        }
        .ok_or(SessionError::NoHistory)?;

        if self.state == SessionState::InProgress {
            self.clock.pause(now);
            if let Some(unanswered) = self.current.take() {
                if !self.placeholder {
                    self.carried = Some((unanswered.id, self.clock.elapsed(now)));
                    self.queue.push_front(unanswered);
                    self.served -= 1;
                }
            }
            self.state = SessionState::Answered;
        }

        self.review_index = Some(target);
        self.current = Some(self.history[target].question.clone());
        Ok(&self.history[target])
    }

    /// Queues a follow-up right after the current question, inside the current batch.
    pub fn inject_follow_up(&mut self, question: StoredQuestion) {
        if matches!(self.state, SessionState::NotStarted | SessionState::Completed) {
            return;
        }
        let batch = self.batch_index();
        if let Some(size) = self.batch_sizes.get_mut(batch) {
            *size += 1;
        } else {
            self.batch_sizes.push(1);
        }
        self.queue.push_front(question);
    }

    /// Suspends timing, e.g. while the quiz is not visible.
    pub fn pause(&mut self, now: Instant) {
        if self.state == SessionState::InProgress {
            self.clock.pause(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if self.state == SessionState::InProgress {
            self.clock.resume(now);
        }
    }

    /// Ends the quiz early with what has been answered so far.
    pub fn finish(&mut self) -> Result<TestResultSummary, SessionError> {
        match self.state {
            SessionState::InProgress | SessionState::Answered => Ok(self.complete()),
            _ => Err(SessionError::NotInProgress),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn complete(&mut self) -> TestResultSummary {
        let r = self.results;
        let summary = calculate_test_results(r.correct, r.incorrect, r.blank, r.total_time_ms);
        self.state = SessionState::Completed;
        self.current = None;
        self.review_index = None;
        self.clock.reset();
        self.summary = Some(summary.clone());
        summary
    }

    //-----------------------------------------------------------------------------------
    // Accessors
    //-----------------------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current(&self) -> Option<&StoredQuestion> {
        self.current.as_ref()
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn is_reviewing(&self) -> bool {
        self.review_index.is_some()
    }

    /// The recorded answer for the question on screen, if it has one.
    pub fn current_answer(&self) -> Option<&AnsweredItem> {
        match self.review_index {
            Some(index) => self.history.get(index),
            None if self.state == SessionState::Answered && !self.placeholder => self.history.last(),
            None => None,
        }
    }

    pub fn results(&self) -> QuizResults {
        self.results
    }

    pub fn history(&self) -> &[AnsweredItem] {
        &self.history
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn total_batches(&self) -> usize {
        self.batch_sizes.len().max(1)
    }

    /// Batch the most recently served question belongs to.
    pub fn batch_index(&self) -> usize {
        let position = self.served.saturating_sub(1);
        let mut cumulative = 0;
        for (index, size) in self.batch_sizes.iter().enumerate() {
            cumulative += size;
            if position < cumulative {
                return index;
            }
        }
        self.batch_sizes.len().saturating_sub(1)
    }

    pub fn summary(&self) -> Option<&TestResultSummary> {
        self.summary.as_ref()
    }

    pub fn question_elapsed(&self, now: Instant) -> Duration {
        self.clock.elapsed(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(correct_index: usize) -> StoredQuestion {
        let mut q = placeholder_question();
        q.id = Uuid::new_v4();
        q.chunk_id = Uuid::new_v4();
        q.question.text = "Which statement is supported by the text?".into();
        q.question.correct_index = correct_index;
        q
    }

    fn secs(base: Instant, s: u64) -> Instant {
        base + Duration::from_secs(s)
    }

    #[test]
    fn clock_accumulates_only_while_running() {
        let t0 = Instant::now();
        let mut clock = SessionClock::new();
        clock.start(t0);
        clock.pause(secs(t0, 5));
        assert_eq!(clock.elapsed(secs(t0, 100)), Duration::from_secs(5));
        clock.resume(secs(t0, 100));
        assert_eq!(clock.elapsed(secs(t0, 103)), Duration::from_secs(8));
        clock.resume(secs(t0, 104));
        assert_eq!(clock.elapsed(secs(t0, 105)), Duration::from_secs(10));
    }

    #[test]
    fn full_run_produces_summary() {
        let t0 = Instant::now();
        let mut session = QuizSession::new();
        session.start(vec![question(1), question(2), question(3)], t0);
        assert_eq!(session.state(), SessionState::InProgress);

        let first = session.submit_answer(Some(1), secs(t0, 10)).unwrap().unwrap();
        assert!(first.is_correct());
        assert_eq!(first.time_spent_ms, 10_000);
        assert_eq!(session.submit_answer(Some(1), secs(t0, 11)), Err(SessionError::AlreadyAnswered));

        assert_eq!(session.next(secs(t0, 12)).unwrap(), Advance::Question);
        let second = session.submit_answer(Some(0), secs(t0, 20)).unwrap().unwrap();
        assert_eq!(second.response, ResponseType::Incorrect);

        session.next(secs(t0, 20)).unwrap();
        session.submit_answer(None, secs(t0, 25)).unwrap();

        match session.next(secs(t0, 26)).unwrap() {
            Advance::Completed(summary) => {
                assert_eq!(summary.percentage, 33);
                assert_eq!(summary.pending_review, 2);
                assert_eq!(summary.total_time_formatted, "00:00:23");
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.next(secs(t0, 27)), Err(SessionError::NotInProgress));
    }

    #[test]
    fn next_requires_an_answer() {
        let t0 = Instant::now();
        let mut session = QuizSession::new();
        session.start(vec![question(0)], t0);
        assert_eq!(session.next(t0), Err(SessionError::NotAnswered));
        assert_eq!(session.submit_answer(Some(7), t0), Err(SessionError::InvalidOption(7)));
    }

    #[test]
    fn paused_time_is_not_counted() {
        let t0 = Instant::now();
        let mut session = QuizSession::new();
        session.start(vec![question(0)], t0);
        session.pause(secs(t0, 4));
        session.resume(secs(t0, 60));
        let outcome = session.submit_answer(Some(0), secs(t0, 62)).unwrap().unwrap();
        assert_eq!(outcome.time_spent_ms, 6_000);
    }

    #[test]
    fn previous_is_a_read_only_rewind() {
        let t0 = Instant::now();
        let (a, b, c) = (question(0), question(0), question(0));
        let mut session = QuizSession::new();
        session.start(vec![a.clone(), b.clone(), c.clone()], t0);

        session.submit_answer(Some(0), t0).unwrap();
        session.next(t0).unwrap();
        session.submit_answer(Some(1), t0).unwrap();
        session.next(t0).unwrap();
        assert_eq!(session.current().unwrap().id, c.id);

        let reviewed = session.previous(t0).unwrap();
        assert_eq!(reviewed.question.id, b.id);
        assert_eq!(reviewed.selected, Some(1));
        assert!(session.is_reviewing());
        assert_eq!(session.submit_answer(Some(0), t0), Err(SessionError::AlreadyAnswered));

        assert_eq!(session.previous(t0).unwrap().question.id, a.id);
        assert_eq!(session.previous(t0), Err(SessionError::NoHistory));
        assert_eq!(session.results().answered(), 2);

        assert_eq!(session.next(t0).unwrap(), Advance::Review);
        assert_eq!(session.current().unwrap().id, b.id);
        assert_eq!(session.next(t0).unwrap(), Advance::Question);
        assert_eq!(session.current().unwrap().id, c.id);
        assert_eq!(session.state(), SessionState::InProgress);
    }

    #[test]
    fn rewinding_keeps_time_spent_on_the_open_question() {
        let t0 = Instant::now();
        let (a, b) = (question(0), question(0));
        let mut session = QuizSession::new();
        session.start(vec![a, b.clone()], t0);

        session.submit_answer(Some(0), secs(t0, 2)).unwrap();
        session.next(secs(t0, 2)).unwrap();
        // Four seconds on b, then a look back and a return.
        session.previous(secs(t0, 6)).unwrap();
        assert_eq!(session.next(secs(t0, 30)).unwrap(), Advance::Question);
        assert_eq!(session.current().unwrap().id, b.id);

        let outcome = session.submit_answer(Some(0), secs(t0, 33)).unwrap().unwrap();
        assert_eq!(outcome.time_spent_ms, 7_000);
    }

    #[test]
    fn empty_pool_shows_placeholder_that_records_nothing() {
        let t0 = Instant::now();
        let mut session = QuizSession::new();
        session.start(Vec::new(), t0);
        assert!(session.is_placeholder());
        assert_eq!(session.current().unwrap().question.text, PLACEHOLDER_TEXT);

        assert_eq!(session.submit_answer(Some(0), t0).unwrap(), None);
        match session.next(t0).unwrap() {
            Advance::Completed(summary) => assert_eq!(summary.percentage, 0),
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(session.results(), QuizResults::default());
    }

    #[test]
    fn batches_and_follow_ups() {
        let t0 = Instant::now();
        let mut session = QuizSession::new();
        session.start_batched(vec![vec![question(0), question(0)], vec![question(0)]], t0);
        assert_eq!(session.total_batches(), 2);

        session.submit_answer(Some(3), t0).unwrap();
        let follow_up = question(2);
        session.inject_follow_up(follow_up.clone());

        assert_eq!(session.next(t0).unwrap(), Advance::Question);
        assert_eq!(session.current().unwrap().id, follow_up.id);
        session.submit_answer(Some(2), t0).unwrap();

        assert_eq!(session.next(t0).unwrap(), Advance::Question);
        assert_eq!(session.batch_index(), 0);
        session.submit_answer(Some(0), t0).unwrap();

        assert_eq!(session.next(t0).unwrap(), Advance::NewBatch(1));
    }
}
