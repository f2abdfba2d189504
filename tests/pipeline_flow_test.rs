use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use recruitment_pipeline::{
    database::memory::MemoryStore,
    error::{ClosedReason, Error},
    models::{
        application::{
            AdministrationStatus, AssessmentOutcome, AssessmentStatus, InterviewStatus, StageResult,
        },
        assessment_session::{Navigation, SessionState},
        candidate::CandidateProfile,
        question::{Question, QuestionOption, QuestionPack},
        stage_event::{DeliveryStatus, StageEventKind},
        vacancy::Vacancy,
    },
    utils::time::ManualClock,
    AppSettings, AppState,
};
use uuid::Uuid;

const DURATION: i64 = 1800;

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

fn likert(id: i32) -> Question {
    Question {
        id,
        prompt: format!("Statement {}", id),
        options: vec![
            QuestionOption { key: "A".into(), text: "Strongly agree".into() },
            QuestionOption { key: "B".into(), text: "Agree".into() },
            QuestionOption { key: "C".into(), text: "Disagree".into() },
        ],
    }
}

fn pack(id: Uuid, ids: &[i32]) -> QuestionPack {
    QuestionPack {
        id,
        title: "Work attitude".into(),
        questions: ids.iter().copied().map(likert).collect(),
        updated_at: start_time(),
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    state: AppState,
    period_id: Uuid,
    pack_id: Uuid,
}

impl Fixture {
    async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let state = AppState::with_store(
            store.clone(),
            clock.clone(),
            AppSettings {
                jwt_secret: "test_secret_key".into(),
                webhook_secret: String::new(),
                notification_webhook_url: None,
                assessment_duration_seconds: DURATION,
            },
        );
        let pack_id = Uuid::new_v4();
        store.put_question_pack(pack(pack_id, &[1, 2, 3])).await;
        Self {
            store,
            clock,
            state,
            period_id: Uuid::new_v4(),
            pack_id,
        }
    }

    async fn candidate(&self, major: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .put_candidate(CandidateProfile {
                id,
                name: "Dewi".into(),
                education_major: major.map(str::to_string),
            })
            .await;
        id
    }

    async fn vacancy(&self, required_major: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .put_vacancy(Vacancy {
                id,
                period_id: self.period_id,
                title: "Analyst".into(),
                required_major: required_major.map(str::to_string),
                published_at: start_time() - Duration::days(1),
            })
            .await;
        id
    }

    /// Candidate whose application has passed administration.
    async fn scheduled_application(&self) -> Uuid {
        let candidate = self.candidate(Some("Informatika")).await;
        let vacancy = self.vacancy(Some("informatika")).await;
        let application = self
            .state
            .pipeline_service
            .apply_to_vacancy(candidate, vacancy)
            .await
            .expect("apply");
        self.state
            .pipeline_service
            .set_administration_result(application.id, StageResult::Passed)
            .await
            .expect("administration");
        application.id
    }
}

#[tokio::test]
async fn happy_path_reaches_interview_decision() {
    let fx = Fixture::new().await;
    let pipeline = &fx.state.pipeline_service;
    let sessions = &fx.state.session_service;

    let candidate = fx.candidate(Some("Informatika")).await;
    let vacancy = fx.vacancy(Some("Informatika")).await;
    let application = pipeline.apply_to_vacancy(candidate, vacancy).await.expect("apply");
    assert_eq!(application.stages.administration, AdministrationStatus::Pending);
    assert_eq!(application.stages.assessment, AssessmentStatus::NotApplicable);

    let application = pipeline
        .set_administration_result(application.id, StageResult::Passed)
        .await
        .expect("administration");
    assert_eq!(application.stages.assessment, AssessmentStatus::Scheduled);
    assert_eq!(application.stages.interview, InterviewStatus::NotApplicable);

    let session = sessions
        .start_session(application.id, fx.pack_id, DURATION)
        .await
        .expect("start");
    assert_eq!(session.deadline_at, start_time() + Duration::seconds(DURATION));
    let current = pipeline.get_application(application.id).await.unwrap();
    assert_eq!(current.stages.assessment, AssessmentStatus::InProgress);

    for question_id in [1, 2, 3] {
        fx.clock.advance(Duration::seconds(60));
        sessions
            .submit_answer(session.id, question_id, "A")
            .await
            .expect("answer");
    }
    let progress = sessions.progress(session.id).await.unwrap();
    assert_eq!((progress.answered, progress.total), (3, 3));

    let finished = sessions.finish_session(session.id).await.expect("finish");
    assert_eq!(finished.state, SessionState::Completed);
    assert_eq!(finished.concluded_at, Some(start_time() + Duration::seconds(180)));

    let current = pipeline.get_application(application.id).await.unwrap();
    assert_eq!(current.stages.assessment, AssessmentStatus::Completed);
    assert_eq!(current.stages.interview, InterviewStatus::Scheduled);

    let decided = pipeline
        .set_interview_result(application.id, StageResult::Passed)
        .await
        .expect("interview");
    assert_eq!(decided.stages.interview, InterviewStatus::Completed);
    assert_eq!(decided.stages.interview_result, Some(StageResult::Passed));

    let kinds: Vec<StageEventKind> = pipeline
        .history(application.id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            StageEventKind::ApplicationSubmitted,
            StageEventKind::AdministrationDecided,
            StageEventKind::AssessmentStarted,
            StageEventKind::AssessmentConcluded,
            StageEventKind::InterviewDecided,
        ]
    );
}

#[tokio::test]
async fn failed_administration_closes_later_stages() {
    let fx = Fixture::new().await;
    let pipeline = &fx.state.pipeline_service;

    let candidate = fx.candidate(Some("Akuntansi")).await;
    let vacancy = fx.vacancy(None).await;
    let application = pipeline.apply_to_vacancy(candidate, vacancy).await.unwrap();
    let application = pipeline
        .set_administration_result(application.id, StageResult::Failed)
        .await
        .unwrap();
    assert_eq!(application.stages.administration, AdministrationStatus::Failed);
    assert_eq!(application.stages.assessment, AssessmentStatus::NotApplicable);
    assert_eq!(application.stages.interview, InterviewStatus::NotApplicable);

    let err = fx
        .state
        .session_service
        .start_session(application.id, fx.pack_id, DURATION)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    let err = pipeline
        .set_interview_result(application.id, StageResult::Passed)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition(_)));

    let err = pipeline
        .set_administration_result(application.id, StageResult::Passed)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition(_)));
}

#[tokio::test]
async fn late_answer_times_out_and_keeps_earlier_answers() {
    let fx = Fixture::new().await;
    let sessions = &fx.state.session_service;
    let application_id = fx.scheduled_application().await;

    let session = sessions
        .start_session(application_id, fx.pack_id, DURATION)
        .await
        .unwrap();
    sessions.submit_answer(session.id, 1, "Agree").await.unwrap();

    fx.clock.advance(Duration::seconds(DURATION + 1));
    let err = sessions.submit_answer(session.id, 2, "A").await.unwrap_err();
    assert!(matches!(err, Error::SessionClosed(ClosedReason::TimeExpired)));

    let stored = sessions.get_session(session.id).await.unwrap();
    assert_eq!(stored.state, SessionState::TimedOut);
    assert_eq!(stored.concluded_at, Some(stored.deadline_at));

    let answers = sessions.answers(session.id).await.unwrap();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].question_id, 1);
    assert_eq!(answers[0].value, "B");

    let application = fx
        .state
        .pipeline_service
        .get_application(application_id)
        .await
        .unwrap();
    assert_eq!(application.stages.assessment, AssessmentStatus::TimedOut);
    assert_eq!(application.stages.interview, InterviewStatus::Scheduled);
}

#[tokio::test]
async fn answer_at_exact_deadline_is_refused() {
    let fx = Fixture::new().await;
    let sessions = &fx.state.session_service;
    let application_id = fx.scheduled_application().await;
    let session = sessions
        .start_session(application_id, fx.pack_id, DURATION)
        .await
        .unwrap();

    fx.clock.set(session.deadline_at);
    let err = sessions.submit_answer(session.id, 1, "A").await.unwrap_err();
    assert!(matches!(err, Error::SessionClosed(ClosedReason::TimeExpired)));
}

#[tokio::test]
async fn major_mismatch_creates_nothing() {
    let fx = Fixture::new().await;
    let candidate = fx.candidate(Some("Akuntansi")).await;
    let vacancy = fx.vacancy(Some("Teknik Elektro")).await;

    let err = fx
        .state
        .pipeline_service
        .apply_to_vacancy(candidate, vacancy)
        .await
        .unwrap_err();
    match err {
        Error::MajorMismatch { candidate_major, required_major } => {
            assert_eq!(candidate_major, "Akuntansi");
            assert_eq!(required_major, "Teknik Elektro");
        }
        other => panic!("expected major mismatch, got {:?}", other),
    }
    assert!(fx
        .state
        .pipeline_service
        .list_for_candidate(candidate)
        .await
        .unwrap()
        .is_empty());
    assert!(fx.store.events().await.is_empty());
}

#[tokio::test]
async fn missing_major_is_incomplete_profile() {
    let fx = Fixture::new().await;
    let candidate = fx.candidate(Some("   ")).await;
    let vacancy = fx.vacancy(None).await;
    let err = fx
        .state
        .pipeline_service
        .apply_to_vacancy(candidate, vacancy)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IncompleteProfile));
}

#[tokio::test]
async fn one_application_per_candidate_and_period() {
    let fx = Fixture::new().await;
    let pipeline = &fx.state.pipeline_service;
    let candidate = fx.candidate(Some("Hukum")).await;
    let first = fx.vacancy(Some("Hukum")).await;
    let second = fx.vacancy(None).await;

    pipeline.apply_to_vacancy(candidate, first).await.unwrap();
    let again = pipeline.apply_to_vacancy(candidate, first).await.unwrap_err();
    assert!(matches!(again, Error::DuplicateApplication));
    let same_period = pipeline.apply_to_vacancy(candidate, second).await.unwrap_err();
    assert!(matches!(same_period, Error::DuplicateApplication));
}

#[tokio::test]
async fn unknown_candidate_or_vacancy_is_not_found() {
    let fx = Fixture::new().await;
    let pipeline = &fx.state.pipeline_service;
    let vacancy = fx.vacancy(None).await;
    let err = pipeline
        .apply_to_vacancy(Uuid::new_v4(), vacancy)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let candidate = fx.candidate(Some("Hukum")).await;
    let err = pipeline
        .apply_to_vacancy(candidate, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn expiry_is_idempotent_and_first_outcome_wins() {
    let fx = Fixture::new().await;
    let sessions = &fx.state.session_service;
    let pipeline = &fx.state.pipeline_service;
    let application_id = fx.scheduled_application().await;
    let session = sessions
        .start_session(application_id, fx.pack_id, DURATION)
        .await
        .unwrap();

    let early = sessions.expire_session(session.id).await.unwrap_err();
    assert!(matches!(early, Error::InvalidTransition(_)));

    fx.clock.advance(Duration::seconds(DURATION));
    let first = sessions.expire_session(session.id).await.unwrap();
    let second = sessions.expire_session(session.id).await.unwrap();
    assert_eq!(first.state, SessionState::TimedOut);
    assert_eq!(second.state, SessionState::TimedOut);
    assert_eq!(first.concluded_at, second.concluded_at);

    // a stray completion signal does not overwrite the timeout
    let application = pipeline
        .on_assessment_concluded(application_id, AssessmentOutcome::Completed)
        .await
        .unwrap();
    assert_eq!(application.stages.assessment, AssessmentStatus::TimedOut);

    let concluded = pipeline
        .history(application_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == StageEventKind::AssessmentConcluded)
        .count();
    assert_eq!(concluded, 1);
}

#[tokio::test]
async fn finishing_after_the_deadline_expires_instead() {
    let fx = Fixture::new().await;
    let sessions = &fx.state.session_service;
    let application_id = fx.scheduled_application().await;
    let session = sessions
        .start_session(application_id, fx.pack_id, DURATION)
        .await
        .unwrap();

    fx.clock.advance(Duration::seconds(DURATION + 30));
    let err = sessions.finish_session(session.id).await.unwrap_err();
    assert!(matches!(err, Error::SessionClosed(ClosedReason::TimeExpired)));
    let application = fx
        .state
        .pipeline_service
        .get_application(application_id)
        .await
        .unwrap();
    assert_eq!(application.stages.assessment, AssessmentStatus::TimedOut);

    let err = sessions.finish_session(session.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition(_)));
}

#[tokio::test]
async fn submitted_session_refuses_writes() {
    let fx = Fixture::new().await;
    let sessions = &fx.state.session_service;
    let application_id = fx.scheduled_application().await;
    let session = sessions
        .start_session(application_id, fx.pack_id, DURATION)
        .await
        .unwrap();
    sessions.finish_session(session.id).await.unwrap();

    let err = sessions.submit_answer(session.id, 1, "A").await.unwrap_err();
    assert!(matches!(err, Error::SessionClosed(ClosedReason::Submitted)));
    let err = sessions.mark_question(session.id, 0, true).await.unwrap_err();
    assert!(matches!(err, Error::SessionClosed(ClosedReason::Submitted)));
    let err = sessions.finish_session(session.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition(_)));

    // expiring a completed session changes nothing
    fx.clock.advance(Duration::seconds(DURATION * 2));
    let after = sessions.expire_session(session.id).await.unwrap();
    assert_eq!(after.state, SessionState::Completed);
}

#[tokio::test]
async fn second_session_for_an_application_is_rejected() {
    let fx = Fixture::new().await;
    let sessions = &fx.state.session_service;
    let application_id = fx.scheduled_application().await;
    sessions
        .start_session(application_id, fx.pack_id, DURATION)
        .await
        .unwrap();
    let err = sessions
        .start_session(application_id, fx.pack_id, DURATION)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn answers_upsert_and_resolve_option_text() {
    let fx = Fixture::new().await;
    let sessions = &fx.state.session_service;
    let application_id = fx.scheduled_application().await;
    let session = sessions
        .start_session(application_id, fx.pack_id, DURATION)
        .await
        .unwrap();

    let first = sessions.submit_answer(session.id, 2, "Disagree").await.unwrap();
    assert_eq!(first.value, "C");

    fx.clock.advance(Duration::seconds(10));
    let repeat = sessions.submit_answer(session.id, 2, "C").await.unwrap();
    assert_eq!(repeat.answered_at, first.answered_at);

    let changed = sessions.submit_answer(session.id, 2, " A ").await.unwrap();
    assert_eq!(changed.value, "A");
    assert_eq!(sessions.answers(session.id).await.unwrap().len(), 1);

    let err = sessions.submit_answer(session.id, 2, "Maybe").await.unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
    let err = sessions.submit_answer(session.id, 99, "A").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn question_set_is_frozen_at_start() {
    let fx = Fixture::new().await;
    let sessions = &fx.state.session_service;
    let application_id = fx.scheduled_application().await;
    let session = sessions
        .start_session(application_id, fx.pack_id, DURATION)
        .await
        .unwrap();

    fx.store.put_question_pack(pack(fx.pack_id, &[7, 8])).await;

    let questions = sessions.questions(session.id).await.unwrap();
    let ids: Vec<i32> = questions.iter().map(|q| q.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(sessions.submit_answer(session.id, 3, "B").await.is_ok());
    let err = sessions.submit_answer(session.id, 7, "B").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn marks_and_navigation_move_the_cursor() {
    let fx = Fixture::new().await;
    let sessions = &fx.state.session_service;
    let application_id = fx.scheduled_application().await;
    let session = sessions
        .start_session(application_id, fx.pack_id, DURATION)
        .await
        .unwrap();

    let cursor = sessions.mark_question(session.id, 2, true).await.unwrap();
    assert!(cursor.marked.contains(&2));
    let cursor = sessions.navigate(session.id, Navigation::Next).await.unwrap();
    assert_eq!(cursor.current_index, 1);
    let cursor = sessions.navigate(session.id, Navigation::Jump(2)).await.unwrap();
    assert_eq!(cursor.current_index, 2);
    assert!(cursor.marked.contains(&2));
    let cursor = sessions.navigate(session.id, Navigation::Next).await.unwrap();
    assert_eq!(cursor.current_index, 2);

    let stored = sessions.get_session(session.id).await.unwrap();
    assert_eq!(stored.cursor.current_index, 2);

    fx.clock.advance(Duration::seconds(DURATION));
    let err = sessions.navigate(session.id, Navigation::Previous).await.unwrap_err();
    assert!(matches!(err, Error::SessionClosed(ClosedReason::TimeExpired)));
}

#[tokio::test]
async fn sweep_expires_only_overdue_sessions() {
    let fx = Fixture::new().await;
    let sessions = &fx.state.session_service;

    let short = fx.scheduled_application().await;
    let long = fx.scheduled_application().await;
    let short_session = sessions.start_session(short, fx.pack_id, 60).await.unwrap();
    let long_session = sessions.start_session(long, fx.pack_id, 3600).await.unwrap();

    fx.clock.advance(Duration::seconds(120));
    assert_eq!(sessions.expire_overdue(100).await.unwrap(), 1);
    assert_eq!(sessions.expire_overdue(100).await.unwrap(), 0);

    assert_eq!(
        sessions.get_session(short_session.id).await.unwrap().state,
        SessionState::TimedOut
    );
    assert_eq!(
        sessions.get_session(long_session.id).await.unwrap().state,
        SessionState::Active
    );
}

#[tokio::test]
async fn reading_an_application_reconciles_its_deadline() {
    let fx = Fixture::new().await;
    let sessions = &fx.state.session_service;
    let application_id = fx.scheduled_application().await;
    sessions
        .start_session(application_id, fx.pack_id, DURATION)
        .await
        .unwrap();
    fx.clock.advance(Duration::hours(3));

    let reconciled = sessions
        .reconcile_application(application_id)
        .await
        .unwrap()
        .expect("session");
    assert_eq!(reconciled.state, SessionState::TimedOut);
    let application = fx
        .state
        .pipeline_service
        .get_application(application_id)
        .await
        .unwrap();
    assert_eq!(application.stages.assessment, AssessmentStatus::TimedOut);
    assert_eq!(application.stages.interview, InterviewStatus::Scheduled);
}

#[tokio::test]
async fn listing_applications_reconciles_expired_sessions() {
    let fx = Fixture::new().await;
    let sessions = &fx.state.session_service;
    let application_id = fx.scheduled_application().await;
    let application = fx
        .state
        .pipeline_service
        .get_application(application_id)
        .await
        .unwrap();
    sessions
        .start_session(application_id, fx.pack_id, DURATION)
        .await
        .unwrap();
    fx.clock.advance(Duration::seconds(DURATION + 60));

    let own = sessions
        .list_for_candidate(application.candidate_id)
        .await
        .unwrap();
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].stages.assessment, AssessmentStatus::TimedOut);
    assert_eq!(own[0].stages.interview, InterviewStatus::Scheduled);

    let for_vacancy = sessions.list_for_vacancy(application.vacancy_id).await.unwrap();
    assert_eq!(for_vacancy.len(), 1);
    assert_eq!(for_vacancy[0].stages.assessment, AssessmentStatus::TimedOut);
    assert_eq!(for_vacancy[0].stages.interview, InterviewStatus::Scheduled);
}

#[tokio::test]
async fn finishing_with_unanswered_questions_completes_the_assessment() {
    let fx = Fixture::new().await;
    let sessions = &fx.state.session_service;
    let pack_id = Uuid::new_v4();
    let ids: Vec<i32> = (1..=20).collect();
    fx.store.put_question_pack(pack(pack_id, &ids)).await;
    let application_id = fx.scheduled_application().await;

    let session = sessions
        .start_session(application_id, pack_id, DURATION)
        .await
        .unwrap();
    for question_id in 1..=15 {
        fx.clock.advance(Duration::seconds(30));
        sessions
            .submit_answer(session.id, question_id, "B")
            .await
            .expect("answer");
    }

    let finished = sessions.finish_session(session.id).await.expect("finish");
    assert_eq!(finished.state, SessionState::Completed);
    assert_eq!(finished.concluded_at, Some(start_time() + Duration::seconds(450)));

    let progress = sessions.progress(session.id).await.unwrap();
    assert_eq!((progress.answered, progress.total), (15, 20));
    assert_eq!(progress.state, SessionState::Completed);

    let application = fx
        .state
        .pipeline_service
        .get_application(application_id)
        .await
        .unwrap();
    assert_eq!(application.stages.assessment, AssessmentStatus::Completed);
    assert_eq!(application.stages.interview, InterviewStatus::Scheduled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_conclusions_record_a_single_outcome() {
    let fx = Fixture::new().await;
    let application_id = fx.scheduled_application().await;
    fx.state
        .pipeline_service
        .mark_assessment_started(application_id)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let pipeline = fx.state.pipeline_service.clone();
        let outcome = if i % 2 == 0 {
            AssessmentOutcome::Completed
        } else {
            AssessmentOutcome::TimedOut
        };
        handles.push(tokio::spawn(async move {
            pipeline.on_assessment_concluded(application_id, outcome).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().expect("conclusion signal");
    }

    let application = fx
        .state
        .pipeline_service
        .get_application(application_id)
        .await
        .unwrap();
    assert!(application.stages.assessment.is_concluded());
    assert_eq!(application.stages.interview, InterviewStatus::Scheduled);
    let concluded = fx
        .store
        .events()
        .await
        .into_iter()
        .filter(|e| e.application_id == application_id && e.kind == StageEventKind::AssessmentConcluded)
        .count();
    assert_eq!(concluded, 1);
}

#[tokio::test]
async fn events_without_a_target_are_skipped() {
    let fx = Fixture::new().await;
    fx.scheduled_application().await;
    let events = fx.store.events().await;
    assert!(!events.is_empty());
    assert!(events.iter().all(|e| e.status == DeliveryStatus::Skipped));
    assert!(!fx.state.notification_service.run_once().await.unwrap());
}

#[tokio::test]
async fn recommendations_follow_major_eligibility() {
    let fx = Fixture::new().await;
    let candidate = fx.candidate(Some("Informatika")).await;
    let matching = fx.vacancy(Some(" INFORMATIKA ")).await;
    let open = fx.vacancy(None).await;
    let other = fx.vacancy(Some("Farmasi")).await;

    let recommended: Vec<Uuid> = fx
        .state
        .matching_service
        .recommend_for_candidate(candidate)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.vacancy_id)
        .collect();
    assert!(recommended.contains(&matching));
    assert!(recommended.contains(&open));
    assert!(!recommended.contains(&other));
}
