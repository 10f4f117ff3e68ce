mod common;

use std::time::Instant;

use common::{chunk, orchestrator, stored, InMemoryStore, ScriptedLlm};
use quiz_engine_core::domain::{QuotaSet, ResponseType, ShelfStatus, UsageType, UserQuestionStatus};
use quiz_engine_core::session::{Advance, SessionState};
use quiz_worker_lib::pipeline::{QuizRunner, RunnerError};
use quiz_engine_core::session::SessionError;
use uuid::Uuid;

#[tokio::test]
async fn correct_answer_persists_status_and_mastery() {
    let c = chunk(&["Photosynthesis"]);
    let chunk_id = c.id;
    let store = InMemoryStore::with_chunk(c.clone());
    let (q1, q2) = (stored(&c, UsageType::Antrenman), stored(&c, UsageType::Antrenman));
    store.insert_question(q1.clone());
    store.insert_question(q2.clone());
    let user = Uuid::new_v4();
    let mut runner = QuizRunner::new(orchestrator(store.clone(), ScriptedLlm::new()), user, 1);

    let now = Instant::now();
    assert_eq!(runner.start(chunk_id, 10, now).await.unwrap(), 2);
    let result = runner.submit(Some(1), now).await.unwrap().unwrap();

    assert!(result.is_correct);
    assert_eq!(result.score_delta, 10);

    let status = store.status(user, q1.id).unwrap();
    assert_eq!(status.status, ShelfStatus::PendingFollowup);
    assert_eq!(status.consecutive_success, 1.0);
    assert_eq!(status.next_review_session, Some(2));

    let mastery = store.mastery_of(user, chunk_id).unwrap();
    assert_eq!(mastery.running_score, 10);
    // Half the pool covered (30) plus 40% of the running score (4).
    assert_eq!(mastery.mastery_score, 34);
    assert_eq!(mastery.total_questions_seen, 1);

    let attempts = store.attempts.lock().unwrap().clone();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].response, ResponseType::Correct);
    assert_eq!(attempts[0].diagnosis, None);
}

#[tokio::test]
async fn answering_twice_is_rejected() {
    let c = chunk(&["Photosynthesis"]);
    let store = InMemoryStore::with_chunk(c.clone());
    store.insert_question(stored(&c, UsageType::Antrenman));
    let mut runner = QuizRunner::new(orchestrator(store.clone(), ScriptedLlm::new()), Uuid::new_v4(), 1);

    let now = Instant::now();
    runner.start(c.id, 10, now).await.unwrap();
    runner.submit(Some(1), now).await.unwrap();
    let err = runner.submit(Some(0), now).await.unwrap_err();

    assert!(matches!(err, RunnerError::Session(SessionError::AlreadyAnswered)));
    assert_eq!(store.attempts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn wrong_answer_injects_a_follow_up() {
    let c = chunk(&["Photosynthesis"]);
    let store = InMemoryStore::with_chunk(c.clone());
    let (q1, q2) = (stored(&c, UsageType::Antrenman), stored(&c, UsageType::Antrenman));
    store.insert_question(q1.clone());
    store.insert_question(q2.clone());
    let user = Uuid::new_v4();
    let mut runner = QuizRunner::new(orchestrator(store.clone(), ScriptedLlm::new()), user, 1);

    let now = Instant::now();
    runner.start(c.id, 10, now).await.unwrap();
    let result = runner.submit(Some(3), now).await.unwrap().unwrap();
    assert!(!result.is_correct);
    assert_eq!(result.new_status, ShelfStatus::PendingFollowup);
    assert_eq!(store.status(user, q1.id).unwrap().consecutive_fails, 1);

    let attempts = store.attempts.lock().unwrap().clone();
    assert_eq!(attempts[0].diagnosis.as_deref(), Some("Mixes up storage and release."));

    runner.wait_for_background().await;
    assert_eq!(runner.next(now).unwrap(), Advance::Question);

    let current = runner.session().current().unwrap().clone();
    assert_eq!(current.parent_question_id, Some(q1.id));
    assert_eq!(current.usage_type, UsageType::Antrenman);
    assert_eq!(runner.session().remaining(), 1);

    let owners = store.questions.lock().unwrap().clone();
    let (_, created_by) = owners.iter().find(|(q, _)| q.id == current.id).unwrap();
    assert_eq!(*created_by, Some(user));
}

#[tokio::test]
async fn exam_answers_do_not_move_the_schedule() {
    let c = chunk(&["Photosynthesis"]);
    let store = InMemoryStore::with_chunk(c.clone());
    let exam = stored(&c, UsageType::Deneme);
    store.insert_question(exam.clone());
    store.insert_question(stored(&c, UsageType::Antrenman));
    let user = Uuid::new_v4();
    let mut runner = QuizRunner::new(orchestrator(store.clone(), ScriptedLlm::new()), user, 1);

    let now = Instant::now();
    assert_eq!(runner.start_exam(c.id, 10, now).await.unwrap(), 1);
    let result = runner.submit(Some(0), now).await.unwrap().unwrap();

    assert_eq!(result.score_delta, 0);
    assert_eq!(result.next_review_session, None);
    assert!(store.status(user, exam.id).is_none());
    assert_eq!(store.mastery_of(user, c.id).unwrap().running_score, 0);

    runner.wait_for_background().await;
    assert_eq!(store.saved().len(), 2);
}

#[tokio::test]
async fn review_queue_puts_due_follow_ups_first() {
    let c = chunk(&["Photosynthesis"]);
    let store = InMemoryStore::with_chunk(c.clone());
    let fresh = stored(&c, UsageType::Antrenman);
    let due = stored(&c, UsageType::Antrenman);
    let later = stored(&c, UsageType::Antrenman);
    for q in [&fresh, &due, &later] {
        store.insert_question(q.clone());
    }
    let user = Uuid::new_v4();
    let pending = |question_id, next| UserQuestionStatus {
        user_id: user,
        question_id,
        status: ShelfStatus::PendingFollowup,
        consecutive_success: 1.0,
        consecutive_fails: 0,
        next_review_session: Some(next),
    };
    store.set_status(pending(due.id, 3));
    store.set_status(pending(later.id, 9));
    let mut runner = QuizRunner::new(orchestrator(store.clone(), ScriptedLlm::new()), user, 3);

    let now = Instant::now();
    assert_eq!(runner.start(c.id, 10, now).await.unwrap(), 2);
    assert_eq!(runner.session().current().unwrap().id, due.id);

    runner.submit(Some(1), now).await.unwrap();
    runner.next(now).unwrap();
    assert_eq!(runner.session().current().unwrap().id, fresh.id);
}

#[tokio::test]
async fn empty_pool_shows_the_placeholder() {
    let c = chunk(&["Photosynthesis"]);
    let store = InMemoryStore::with_chunk(c.clone());
    let mut runner = QuizRunner::new(orchestrator(store.clone(), ScriptedLlm::new()), Uuid::new_v4(), 1);

    let now = Instant::now();
    assert_eq!(runner.start(c.id, 10, now).await.unwrap(), 0);
    assert!(runner.session().is_placeholder());
    assert_eq!(runner.submit(Some(0), now).await.unwrap(), None);
    assert!(store.attempts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn completing_a_quiz_refills_the_training_pool() {
    let mut c = chunk(&["Photosynthesis", "Respiration"]);
    c.quotas = Some(QuotaSet { antrenman: 3, arsiv: 1, deneme: 1 });
    let store = InMemoryStore::with_chunk(c.clone());
    store.insert_question(stored(&c, UsageType::Antrenman));
    let mut runner = QuizRunner::new(orchestrator(store.clone(), ScriptedLlm::new()), Uuid::new_v4(), 1);

    let now = Instant::now();
    runner.start(c.id, 10, now).await.unwrap();
    runner.submit(Some(1), now).await.unwrap();
    let advance = runner.next(now).unwrap();

    match advance {
        Advance::Completed(summary) => assert_eq!(summary.percentage, 100),
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(runner.session().state(), SessionState::Completed);

    runner.wait_for_background().await;
    let training = store.saved().into_iter().filter(|q| q.usage_type == UsageType::Antrenman).count();
    assert_eq!(training, 3);
}

#[tokio::test]
async fn previous_rewinds_without_undoing() {
    let c = chunk(&["Photosynthesis"]);
    let store = InMemoryStore::with_chunk(c.clone());
    let (q1, q2) = (stored(&c, UsageType::Antrenman), stored(&c, UsageType::Antrenman));
    store.insert_question(q1.clone());
    store.insert_question(q2.clone());
    let mut runner = QuizRunner::new(orchestrator(store.clone(), ScriptedLlm::new()), Uuid::new_v4(), 1);

    let now = Instant::now();
    runner.start(c.id, 10, now).await.unwrap();
    runner.submit(Some(1), now).await.unwrap();
    runner.next(now).unwrap();

    let item = runner.previous(now).unwrap();
    assert_eq!(item.question.id, q1.id);
    assert_eq!(item.response, ResponseType::Correct);
    assert_eq!(runner.session().results().correct, 1);
    assert_eq!(store.attempts.lock().unwrap().len(), 1);
}
