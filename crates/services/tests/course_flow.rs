use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use services::backend::BackendCall;
use services::{
    BackendError, Clock, CoursePlayer, EngineConfig, Hydration, InMemoryBackend, LessonView,
    PlayerDeps, PlayerError, StaticIdentity,
};
use storage::{CacheKey, Storage};
use zenith_core::gating::Denial;
use zenith_core::model::{
    CourseState, GlobalId, LearnerProfile, Lesson, LessonKey, QuizQuestion, Roadmap, VideoRef,
    Week,
};
use zenith_core::quiz::{QuizBlocked, QuizError, QuizPhase, Verdict};
use zenith_core::time::fixed_clock;
use zenith_core::{Error, ProgressSnapshot};

const COURSE: &str = "Rust Basics";

fn video(week: usize, lesson: usize) -> String {
    format!("https://www.youtube.com/watch?v={week}{lesson}")
}

fn course(shape: &[usize]) -> CourseState {
    let weeks = shape
        .iter()
        .enumerate()
        .map(|(w, &count)| Week {
            label: format!("Week {}", w + 1),
            lessons: (0..count)
                .map(|l| Lesson {
                    topic: format!("Topic {w}-{l}"),
                    video: VideoRef::from_raw(&video(w, l)),
                })
                .collect(),
        })
        .collect();
    CourseState::new(
        Value::Null,
        Roadmap::new(weeks),
        LearnerProfile::for_subject("Rust"),
    )
}

/// Backend holding `shape` with a two-question quiz per lesson; "a" is
/// always the right answer.
fn backend_with(shape: &[usize]) -> InMemoryBackend {
    let backend = InMemoryBackend::new();
    backend.insert_course(COURSE, course(shape));
    for (w, &count) in shape.iter().enumerate() {
        for l in 0..count {
            let question = |n: usize| QuizQuestion {
                question: format!("Q{n} for {w}-{l}"),
                options: vec!["a".into(), "b".into()],
            };
            backend.insert_quiz(
                &video(w, l),
                vec![question(1), question(2)],
                vec!["a".into(), "a".into()],
            );
        }
    }
    backend
}

fn deps(backend: &InMemoryBackend, storage: &Storage) -> PlayerDeps {
    PlayerDeps {
        backend: Arc::new(backend.clone()),
        storage: storage.clone(),
        user_id: Some("learner-1".into()),
        config: EngineConfig::default(),
        clock: fixed_clock(),
    }
}

async fn open(backend: &InMemoryBackend, storage: &Storage) -> CoursePlayer {
    CoursePlayer::open(deps(backend, storage), COURSE)
        .await
        .unwrap()
}

async fn take_quiz(player: &mut CoursePlayer, answer: &str) -> services::SubmitReport {
    player.load_quiz().await.unwrap();
    player.answer(0, answer).unwrap();
    player.answer(1, answer).unwrap();
    player.submit_quiz().await.unwrap()
}

fn snapshot(highest: u32, passed: &[&str]) -> ProgressSnapshot {
    ProgressSnapshot {
        highest_unlocked_id: highest,
        quiz_passed_map: passed.iter().map(|k| ((*k).to_owned(), true)).collect(),
        ..ProgressSnapshot::default()
    }
}

#[tokio::test]
async fn passing_first_lesson_unlocks_second() {
    let backend = backend_with(&[3]);
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;

    let report = take_quiz(&mut player, "a").await;

    assert_eq!(report.verdict, Verdict::Passed);
    assert_eq!(report.unlocked, Some(GlobalId::new(2)));
    assert_eq!(
        report.message,
        "✅ Passed! Video ID 1 completed. Unlocked Video ID 2."
    );
    assert_eq!(player.notice(), Some(report.message.as_str()));

    let saved = player.snapshot();
    assert_eq!(saved.quiz_passed_map.get("0-0"), Some(&true));
    assert_eq!(saved.highest_unlocked_id, 2);
    assert!(player.progress().is_unlocked(player.index(), LessonKey::new(0, 1)));

    // written through before submit returned
    assert_eq!(backend.progress(COURSE), Some(saved));
    assert!(
        backend
            .calls()
            .contains(&BackendCall::MarkCompleted(VideoRef::from_raw(&video(0, 0))))
    );
}

#[tokio::test]
async fn failing_keeps_next_lesson_locked() {
    let backend = backend_with(&[3]);
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;

    let report = take_quiz(&mut player, "b").await;

    assert_eq!(report.verdict, Verdict::Failed);
    assert_eq!(report.grade.score, 0);
    assert_eq!(report.required, 1);
    assert_eq!(
        report.message,
        "❌ Not passed (need ≥40%). You can reattempt until you pass."
    );
    let saved = player.snapshot();
    assert_eq!(saved.quiz_passed_map.get("0-0"), Some(&false));
    assert_eq!(saved.highest_unlocked_id, 1);
    assert!(!player.progress().is_unlocked(player.index(), LessonKey::new(0, 1)));
    assert_eq!(backend.progress(COURSE), Some(saved));
    assert!(
        !backend
            .calls()
            .iter()
            .any(|call| matches!(call, BackendCall::MarkCompleted(_)))
    );
}

#[tokio::test]
async fn passing_last_lesson_does_not_overflow() {
    let backend = backend_with(&[3]);
    backend.insert_progress(COURSE, snapshot(3, &["0-0", "0-1"]));
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;
    assert_eq!(player.current_id(), GlobalId::new(3));

    let report = take_quiz(&mut player, "a").await;

    assert_eq!(report.verdict, Verdict::Passed);
    assert_eq!(report.unlocked, None);
    assert_eq!(player.progress().highest_unlocked(), GlobalId::new(3));
    assert_eq!(player.snapshot().current_global_id, 3);
}

#[tokio::test]
async fn selecting_locked_lesson_changes_nothing() {
    let backend = backend_with(&[3]);
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;
    backend.clear_calls();

    let denial = player.select(LessonKey::new(0, 2)).await.unwrap_err();

    assert_eq!(
        denial,
        Denial::Locked {
            target: GlobalId::new(3)
        }
    );
    assert_eq!(player.current_key(), LessonKey::new(0, 0));
    assert_eq!(
        player.notice(),
        Some("Complete quiz for Video ID 2 (pass ≥40%) to unlock Video ID 3.")
    );
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn next_and_previous_follow_unlock_frontier() {
    let backend = backend_with(&[2, 1]);
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;

    assert_eq!(
        player.previous().await.unwrap_err(),
        Denial::StartOfCourse
    );
    assert_eq!(
        player.next().await.unwrap_err(),
        Denial::NextLocked {
            current: GlobalId::FIRST
        }
    );

    take_quiz(&mut player, "a").await;
    assert!(player.has_next());
    assert_eq!(player.next().await.unwrap(), GlobalId::new(2));
    assert_eq!(player.quiz().phase(), QuizPhase::NotStarted);

    assert_eq!(player.previous().await.unwrap(), GlobalId::FIRST);
    assert_eq!(player.current_key(), LessonKey::new(0, 0));
}

#[tokio::test]
async fn unanswered_quiz_is_rejected_locally() {
    let backend = backend_with(&[1]);
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;
    player.load_quiz().await.unwrap();
    player.answer(0, "a").unwrap();
    backend.clear_calls();

    let err = player.submit_quiz().await.unwrap_err();

    assert!(matches!(
        err,
        PlayerError::Domain(Error::Quiz(QuizError::Unanswered { ref missing })) if missing == &vec![1]
    ));
    assert_eq!(err.to_string(), "Please answer all questions before submitting.");
    assert!(backend.calls().is_empty());
    assert_eq!(player.quiz().phase(), QuizPhase::Ready);
}

#[tokio::test]
async fn expired_quiz_id_is_recovered_once() {
    let backend = backend_with(&[2]);
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;
    player.load_quiz().await.unwrap();
    let first_id = player.quiz().quiz_id().cloned().unwrap();
    player.answer(0, "a").unwrap();
    player.answer(1, "a").unwrap();
    backend.expire_quiz_ids();

    let report = player.submit_quiz().await.unwrap();

    assert_eq!(report.verdict, Verdict::Passed);
    let current_id = player.quiz().quiz_id().cloned().unwrap();
    assert_ne!(current_id, first_id);
    let submits = backend
        .calls()
        .into_iter()
        .filter(|call| matches!(call, BackendCall::SubmitQuiz(_)))
        .count();
    assert_eq!(submits, 2);
}

#[tokio::test]
async fn failed_submit_leaves_progress_untouched() {
    let backend = backend_with(&[2]);
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;
    player.load_quiz().await.unwrap();
    player.answer(0, "a").unwrap();
    player.answer(1, "a").unwrap();
    let before = player.snapshot();
    backend.set_offline(true);

    let err = player.submit_quiz().await.unwrap_err();

    assert!(matches!(
        err,
        PlayerError::Backend(BackendError::Unavailable { .. })
    ));
    assert_eq!(player.snapshot(), before);
    assert_eq!(player.quiz().phase(), QuizPhase::Ready);
}

#[tokio::test]
async fn reattempt_clears_answers_and_submission() {
    let backend = backend_with(&[2]);
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;
    take_quiz(&mut player, "b").await;
    assert!(player.progress().is_submitted(LessonKey::new(0, 0)));

    player.reattempt().await.unwrap();

    assert_eq!(player.quiz().phase(), QuizPhase::Ready);
    assert_eq!(player.quiz().answer(0), None);
    assert!(!player.progress().is_submitted(LessonKey::new(0, 0)));

    player.answer(0, "a").unwrap();
    player.answer(1, "a").unwrap();
    let report = player.submit_quiz().await.unwrap();
    assert_eq!(report.verdict, Verdict::Passed);
}

#[tokio::test]
async fn passed_quiz_cannot_be_restarted() {
    let backend = backend_with(&[2]);
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;
    take_quiz(&mut player, "a").await;

    let err = player.load_quiz().await.unwrap_err();
    assert!(matches!(
        err,
        PlayerError::Domain(Error::QuizBlocked(QuizBlocked::AlreadyPassed))
    ));
    assert_eq!(player.notice(), Some(err.to_string().as_str()));
}

#[tokio::test]
async fn quiz_generation_is_throttled() {
    let backend = backend_with(&[2]);
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;
    player.load_quiz().await.unwrap();

    player.clock_mut().advance(chrono::Duration::seconds(10));
    let err = player.load_quiz().await.unwrap_err();
    assert_eq!(err.to_string(), "Please wait 5s before trying again.");
    assert_eq!(player.notice(), Some("Please wait 5s before trying again."));

    player.clock_mut().advance(chrono::Duration::seconds(5));
    player.load_quiz().await.unwrap();
}

#[tokio::test]
async fn cached_quiz_survives_failed_regeneration() {
    let backend = backend_with(&[2]);
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;
    player.load_quiz().await.unwrap();
    let shown = player.quiz().content().cloned().unwrap();
    player.close().await;

    // a later session on the same device, with the backend unreachable
    backend.set_offline(true);
    let mut player = CoursePlayer::start(deps(&backend, &storage), COURSE, course(&[2])).await;
    assert_eq!(player.quiz().phase(), QuizPhase::NotStarted);
    player.load_quiz().await.unwrap();

    assert_eq!(player.quiz().content(), Some(&shown));
    assert_eq!(player.quiz().phase(), QuizPhase::Ready);
}

#[tokio::test]
async fn generation_failure_without_cache_is_surfaced() {
    let backend = backend_with(&[2]);
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;
    backend.set_offline(true);

    let err = player.load_quiz().await.unwrap_err();

    assert!(matches!(err, PlayerError::Backend(_)));
    assert_eq!(player.quiz().phase(), QuizPhase::NotStarted);
}

#[tokio::test(start_paused = true)]
async fn cached_quiz_is_shown_before_slow_generation_finishes() {
    let backend = backend_with(&[2]);
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;
    player.load_quiz().await.unwrap();
    let cached = player.quiz().content().cloned().unwrap();
    player.close().await;

    backend.set_generation_delay(Duration::from_secs(3));
    let mut player = CoursePlayer::start(deps(&backend, &storage), COURSE, course(&[2])).await;
    let started = tokio::time::Instant::now();
    let refresh = player.start_quiz().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(player.quiz().content(), Some(&cached));
    assert_eq!(player.quiz().phase(), QuizPhase::Ready);
    player.answer(0, "a").unwrap();

    let reply = player.quizzes().refresh(refresh).await;
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert!(player.apply_quiz(reply).await.unwrap());
    let fresh = player.quiz().content().cloned().unwrap();
    assert_ne!(fresh.quiz_id, cached.quiz_id);
    assert_eq!(player.quiz().answer(0), None);
}

#[tokio::test]
async fn quiz_refresh_for_a_left_lesson_is_dropped() {
    let backend = backend_with(&[2]);
    backend.insert_progress(COURSE, snapshot(2, &[]));
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;

    let refresh = player.start_quiz().await.unwrap();
    player.select(LessonKey::new(0, 1)).await.unwrap();
    let reply = player.quizzes().refresh(refresh).await;

    assert!(!player.apply_quiz(reply).await.unwrap());
    assert_eq!(player.quiz().phase(), QuizPhase::NotStarted);
    assert_eq!(player.quiz().content(), None);
}

#[tokio::test]
async fn fresh_quiz_does_not_replace_a_graded_attempt() {
    let backend = backend_with(&[2]);
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;
    player.load_quiz().await.unwrap();
    player.close().await;

    let mut player = CoursePlayer::start(deps(&backend, &storage), COURSE, course(&[2])).await;
    let refresh = player.start_quiz().await.unwrap();
    player.answer(0, "b").unwrap();
    player.answer(1, "b").unwrap();
    let report = player.submit_quiz().await.unwrap();
    assert_eq!(report.verdict, Verdict::Failed);

    let reply = player.quizzes().refresh(refresh).await;
    assert!(!player.apply_quiz(reply).await.unwrap());
    assert_eq!(player.quiz().phase(), QuizPhase::Submitted(Verdict::Failed));
}

#[tokio::test]
async fn reselecting_current_lesson_starts_it_over() {
    let backend = backend_with(&[2]);
    backend.insert_transcript(
        &video(0, 0),
        services::TranscriptReply::Ready("first lesson".into()),
    );
    let mut player = open(&backend, &Storage::in_memory()).await;
    player.load_transcript().await.unwrap();
    player.load_quiz().await.unwrap();

    player.select(LessonKey::new(0, 0)).await.unwrap();

    assert_eq!(player.view(), &LessonView::default());
    assert_eq!(player.quiz().phase(), QuizPhase::NotStarted);
    assert_eq!(player.current_key(), LessonKey::new(0, 0));
}

#[tokio::test]
async fn remote_progress_overrides_local_cache() {
    let backend = backend_with(&[2, 2]);
    backend.insert_progress(COURSE, snapshot(3, &["0-0", "0-1"]));
    let storage = Storage::in_memory();
    let key = CacheKey::new(Some("learner-1"), COURSE);
    storage
        .progress
        .put_progress(&key, &snapshot(1, &[]))
        .await
        .unwrap();

    let player = open(&backend, &storage).await;

    assert!(matches!(player.hydration(), Some(Hydration::Remote(_))));
    assert_eq!(player.current_key(), LessonKey::new(1, 0));
    assert_eq!(player.progress().highest_unlocked(), GlobalId::new(3));
    assert_eq!(
        storage.progress.get_progress(&key).await.unwrap(),
        Some(snapshot(3, &["0-0", "0-1"]))
    );
}

#[tokio::test]
async fn offline_hydration_keeps_local_progress() {
    let backend = backend_with(&[3]);
    let storage = Storage::in_memory();
    let key = CacheKey::new(Some("learner-1"), COURSE);
    storage
        .progress
        .put_progress(&key, &snapshot(2, &["0-0"]))
        .await
        .unwrap();

    let state = course(&[3]);
    backend.set_offline(true);
    let mut player = CoursePlayer::start(deps(&backend, &storage), COURSE, state).await;

    assert_eq!(player.hydration(), Some(&Hydration::Failed));
    assert!(player.is_hydrated());
    assert_eq!(player.current_key(), LessonKey::new(0, 1));
    assert_eq!(player.progress().highest_unlocked(), GlobalId::new(2));

    // still usable offline: navigation saves land locally
    player.previous().await.unwrap();
    assert_eq!(
        storage.progress.get_progress(&key).await.unwrap(),
        Some(player.snapshot())
    );
}

#[tokio::test]
async fn rehydrating_same_snapshot_is_idempotent() {
    let backend = backend_with(&[2, 3]);
    backend.insert_progress(COURSE, snapshot(4, &["0-0", "0-1", "1-0"]));

    let first = open(&backend, &Storage::in_memory()).await;
    let second = open(&backend, &Storage::in_memory()).await;

    assert_eq!(first.snapshot(), second.snapshot());
    assert_eq!(first.current_key(), second.current_key());
    assert_eq!(first.lessons(), second.lessons());
}

#[tokio::test]
async fn hydrated_highest_is_clamped_to_course_size() {
    let backend = backend_with(&[2]);
    backend.insert_progress(COURSE, snapshot(40, &[]));
    let player = open(&backend, &Storage::in_memory()).await;

    assert_eq!(player.progress().highest_unlocked(), GlobalId::new(2));
}

#[tokio::test]
async fn signed_out_learner_is_asked_to_login() {
    let backend = InMemoryBackend::with_identity(Arc::new(StaticIdentity::signed_out()));
    let result = CoursePlayer::open(deps(&backend, &Storage::in_memory()), COURSE).await;

    let Err(err) = result else {
        panic!("signed-out open should fail");
    };
    assert_eq!(err.to_string(), "Please login to continue.");
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn unknown_course_is_reported() {
    let backend = InMemoryBackend::new();
    let result = CoursePlayer::open(deps(&backend, &Storage::in_memory()), "Nope").await;
    assert!(matches!(result, Err(PlayerError::CourseNotFound(title)) if title == "Nope"));
}

#[tokio::test]
async fn stale_content_is_discarded_after_navigation() {
    let backend = backend_with(&[2]);
    backend.insert_transcript(
        &video(0, 0),
        services::TranscriptReply::Ready("first lesson".into()),
    );
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;
    take_quiz(&mut player, "a").await;

    let lesson = player.lesson_context();
    player.next().await.unwrap();
    let reply = player.content().transcript(&lesson).await.unwrap();

    assert!(!player.apply_transcript(reply));
    assert_eq!(player.view().transcript, None);
    assert_eq!(player.current_key(), LessonKey::new(0, 1));
}

#[tokio::test]
async fn study_material_for_current_lesson() {
    let backend = backend_with(&[1]);
    backend.insert_transcript(
        &video(0, 0),
        services::TranscriptReply::Ready("borrowing rules explained".into()),
    );
    let mut player = open(&backend, &Storage::in_memory()).await;

    assert!(matches!(
        player.summarize().await,
        Err(PlayerError::TranscriptMissing)
    ));

    player.load_transcript().await.unwrap();
    let summary = player.summarize().await.unwrap();
    assert_eq!(summary, "Paragraph summary of 3 words");

    let tree = player.mindmap(false).await.unwrap();
    assert_eq!(tree["name"], "Topic 0-0");
    assert_eq!(player.view().mindmap.as_ref(), Some(&tree));
}

#[tokio::test]
async fn processing_transcript_sets_status() {
    let backend = backend_with(&[1]);
    backend.insert_transcript(&video(0, 0), services::TranscriptReply::Processing);
    let mut player = open(&backend, &Storage::in_memory()).await;

    player.load_transcript().await.unwrap();

    assert_eq!(player.view().transcript, None);
    assert_eq!(
        player.view().transcript_status.as_deref(),
        Some("Transcript is being processed. Please try again in a moment.")
    );
}

#[tokio::test(start_paused = true)]
async fn navigation_saves_are_debounced() {
    let backend = backend_with(&[3]);
    backend.insert_progress(COURSE, snapshot(3, &[]));
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;
    backend.clear_calls();

    player.select(LessonKey::new(0, 1)).await.unwrap();
    player.select(LessonKey::new(0, 2)).await.unwrap();
    player.previous().await.unwrap();
    assert!(backend.saved_snapshots().is_empty());

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(backend.saved_snapshots().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn quiz_result_flushes_pending_debounce() {
    let backend = backend_with(&[3]);
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;
    backend.clear_calls();

    // load_quiz schedules a debounced save; submit must supersede it
    let report = take_quiz(&mut player, "a").await;
    assert_eq!(backend.saved_snapshots(), vec![player.snapshot()]);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(backend.saved_snapshots().len(), 1);
    assert_eq!(report.verdict, Verdict::Passed);
}

#[tokio::test(start_paused = true)]
async fn close_sends_pending_save() {
    let backend = backend_with(&[3]);
    backend.insert_progress(COURSE, snapshot(3, &[]));
    let storage = Storage::in_memory();
    let mut player = open(&backend, &storage).await;
    backend.clear_calls();

    player.select(LessonKey::new(0, 2)).await.unwrap();
    player.close().await;

    assert_eq!(backend.saved_snapshots().len(), 1);
}

#[tokio::test]
async fn guest_progress_uses_shared_slot() {
    let backend = backend_with(&[2]);
    let storage = Storage::in_memory();
    let guest = PlayerDeps {
        user_id: None,
        clock: Clock::fixed(zenith_core::time::fixed_now()),
        ..deps(&backend, &storage)
    };
    let mut player = CoursePlayer::open(guest, COURSE).await.unwrap();
    take_quiz(&mut player, "a").await;

    let key = CacheKey::new(None, COURSE);
    assert_eq!(key.user_id(), "guest");
    assert_eq!(
        storage.progress.get_progress(&key).await.unwrap(),
        Some(player.snapshot())
    );
}
