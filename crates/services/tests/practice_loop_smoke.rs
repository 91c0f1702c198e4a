use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::TransitionReason;
use quiz_core::model::{Difficulty, QuestionDraft, QuestionSequence, SessionId};
use quiz_core::navigation::NavigationError;
use quiz_core::time::fixed_clock;
use services::{
    GradeOutcome, HttpStackClient, PracticeError, PracticeService, QuestionSource, SessionContext,
    TrackingService,
};
use storage::repository::{
    InputRepository, LearningSession, LearningSessionRepository, NewSession, Storage, StorageError,
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn topical_sequence() -> QuestionSequence {
    QuestionSequence::from_drafts([
        QuestionDraft::new("Factorise quadratics", "algebra.xml")
            .topic("algebra")
            .difficulty(Difficulty::Intermediate),
        QuestionDraft::new("Matrix product", "matrices.xml").topic("matrices"),
        QuestionDraft::new("Expand brackets", "algebra.xml")
            .named("Expand")
            .topic("algebra")
            .difficulty(Difficulty::Basic),
    ])
    .unwrap()
}

#[tokio::test]
async fn manual_outcomes_drive_remediation_and_tracking() {
    let storage = Storage::in_memory();
    let tracking = TrackingService::new(fixed_clock(), &storage);
    let practice = PracticeService::new(tracking.clone());

    let mut session = practice
        .start(topical_sequence(), SessionContext::default())
        .await
        .unwrap();
    assert!(session.learning_session().anonymous_id.starts_with("anon_"));

    let err = practice.forward(&mut session).unwrap_err();
    assert!(matches!(
        err,
        PracticeError::Navigation(NavigationError::NotYetAttempted { index: 0 })
    ));

    let result = practice
        .record_outcome(
            &mut session,
            GradeOutcome::manual(false, 0.0, 1.0),
            BTreeMap::new(),
        )
        .await
        .unwrap();
    assert!(!result.entry.passed);
    assert_eq!(result.attempt.as_ref().unwrap().attempt_number, 1);

    let event = practice.forward(&mut session).unwrap().unwrap();
    assert_eq!(event.index, 2);
    assert_eq!(event.reason, TransitionReason::Remediation);
    assert!(session.view().adaptive);

    let event = practice.backward(&mut session).unwrap().unwrap();
    assert_eq!(event.index, 1);
    assert!(!session.view().adaptive);

    let attempts = tracking.attempts(session.session_id()).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].question_file, "algebra.xml");

    practice.finish(&mut session).await.unwrap();
    assert!(matches!(
        practice.forward(&mut session).unwrap_err(),
        PracticeError::Finished
    ));
}

const QUESTION_XML: &str = r#"<quiz>
  <question type="stack">
    <name><text>Expand</text></name>
    <deployedseed>42</deployedseed>
  </question>
</quiz>"#;

#[tokio::test]
async fn stack_round_trip_renders_grades_and_logs_answers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/render"))
        .and(body_partial_json(serde_json::json!({
            "seed": 42,
            "renderInputs": "q1_stackapi_input_",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "questionrender": "<p>Expand \\((x+1)^2\\). [[input:ans1]]</p>",
            "questioninputs": {"ans1": {"render": "<input type=\"text\">"}},
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/grade"))
        .and(body_partial_json(serde_json::json!({"answers": {"ans1": "x^2+2*x+1"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "isgradable": true,
            "score": 1.0,
            "scoreweights": {"total": 3.0},
            "responsesummary": "Seed: 42; ans1: x^2+2*x+1 [score]",
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("algebra.xml"), QUESTION_XML)
        .await
        .unwrap();

    let storage = Storage::in_memory();
    let practice = PracticeService::new(TrackingService::new(fixed_clock(), &storage))
        .with_question_source(QuestionSource::new(dir.path()))
        .with_stack(Arc::new(HttpStackClient::new(server.uri()).unwrap()));
    let sequence = QuestionSequence::from_drafts([
        QuestionDraft::new("Expand brackets", "algebra.xml").named("Expand"),
        QuestionDraft::new("Next one", "algebra.xml"),
    ])
    .unwrap();

    let mut session = practice
        .start(sequence, SessionContext::default())
        .await
        .unwrap();

    let err = practice
        .submit_answers(&mut session, BTreeMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PracticeError::NotRendered));

    let current = practice.open_current(&mut session).await.unwrap();
    assert_eq!(current.seed, Some(42));
    assert!(current.render.is_some());

    let answers = BTreeMap::from([("ans1".to_string(), "x^2+2*x+1".to_string())]);
    let result = practice
        .submit_answers(&mut session, answers)
        .await
        .unwrap();
    assert!(result.outcome.passed);
    assert_eq!(result.entry.score, 3.0);
    assert!(!result.all_attempted);

    let attempt = result.attempt.unwrap();
    assert_eq!(attempt.seed, Some(42));
    assert_eq!(attempt.max_score, Some(3.0));
    let inputs = storage.inputs.list_inputs(attempt.id).await.unwrap();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].input_type, "final_submission");

    let event = practice.forward(&mut session).unwrap().unwrap();
    assert_eq!(event.reason, TransitionReason::Forward);
    assert!(session.current_question().is_none());
}

#[tokio::test]
async fn shared_session_serializes_transitions() {
    let practice = Arc::new(PracticeService::new(TrackingService::in_memory(
        fixed_clock(),
    )));
    let shared = practice
        .start(topical_sequence(), SessionContext::default())
        .await
        .unwrap()
        .into_shared();

    let mut handles = Vec::new();
    for _ in 0..3 {
        let practice = Arc::clone(&practice);
        let shared = Arc::clone(&shared);
        handles.push(tokio::spawn(async move {
            let mut session = shared.lock().await;
            practice
                .record_outcome(
                    &mut session,
                    GradeOutcome::manual(true, 1.0, 1.0),
                    BTreeMap::new(),
                )
                .await
                .unwrap();
            practice.forward(&mut session).unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let session = shared.lock().await;
    let view = session.view();
    assert_eq!(view.current_index, 2);
    assert_eq!(view.attempted, 3);
    assert!(session.controller().progress().is_all_attempted());
}

#[tokio::test]
async fn validate_input_checks_the_opened_question() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/render"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "questionrender": "<p>[[input:ans1]]</p>",
            "questioninputs": {"ans1": {"render": "<input type=\"text\">"}},
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/validate"))
        .and(body_partial_json(serde_json::json!({
            "inputName": "ans1",
            "seed": 42,
            "answers": {"ans1": "x^2+"},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "validation": "This answer is invalid.",
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("algebra.xml"), QUESTION_XML)
        .await
        .unwrap();
    let practice = PracticeService::new(TrackingService::in_memory(fixed_clock()))
        .with_question_source(QuestionSource::new(dir.path()))
        .with_stack(Arc::new(HttpStackClient::new(server.uri()).unwrap()));
    let sequence = QuestionSequence::from_drafts([
        QuestionDraft::new("Expand brackets", "algebra.xml").named("Expand"),
    ])
    .unwrap();
    let mut session = practice
        .start(sequence, SessionContext::default())
        .await
        .unwrap();

    let err = practice
        .validate_input(&session, "ans1", "x^2+")
        .await
        .unwrap_err();
    assert!(matches!(err, PracticeError::NotRendered));

    practice.open_current(&mut session).await.unwrap();
    let validation = practice
        .validate_input(&session, "ans1", "x^2+")
        .await
        .unwrap();
    assert_eq!(validation.validation, "This answer is invalid.");
    assert_eq!(session.view().attempted, 0);
}

#[tokio::test]
async fn open_without_question_dir_reports_missing_source() {
    let practice = PracticeService::new(TrackingService::in_memory(fixed_clock()));
    let mut session = practice
        .start(topical_sequence(), SessionContext::default())
        .await
        .unwrap();
    let err = practice.open_current(&mut session).await.unwrap_err();
    assert!(matches!(err, PracticeError::SourceDisabled));
}

#[tokio::test]
async fn feedback_is_rejected_after_finish() {
    let practice = PracticeService::new(TrackingService::in_memory(fixed_clock()));
    let mut session = practice
        .start(topical_sequence(), SessionContext::default())
        .await
        .unwrap();
    practice
        .record_outcome(
            &mut session,
            GradeOutcome::manual(true, 1.0, 1.0),
            BTreeMap::new(),
        )
        .await
        .unwrap();
    practice.finish(&mut session).await.unwrap();

    let err = practice.feedback(&session).await.unwrap_err();
    assert!(matches!(err, PracticeError::Finished));
}

/// Session store whose first `end_session` call fails.
struct FlakySessions {
    inner: Arc<dyn LearningSessionRepository>,
    fail_next_end: AtomicBool,
}

#[async_trait]
impl LearningSessionRepository for FlakySessions {
    async fn start_session(&self, session: NewSession) -> Result<LearningSession, StorageError> {
        self.inner.start_session(session).await
    }

    async fn end_session(
        &self,
        id: SessionId,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        if self.fail_next_end.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Connection("db busy".into()));
        }
        self.inner.end_session(id, ended_at).await
    }

    async fn get_session(&self, id: SessionId) -> Result<LearningSession, StorageError> {
        self.inner.get_session(id).await
    }
}

#[tokio::test]
async fn failed_finish_can_be_retried() {
    let memory = Storage::in_memory();
    let storage = Storage {
        sessions: Arc::new(FlakySessions {
            inner: Arc::clone(&memory.sessions),
            fail_next_end: AtomicBool::new(true),
        }),
        attempts: Arc::clone(&memory.attempts),
        inputs: Arc::clone(&memory.inputs),
    };
    let practice = PracticeService::new(TrackingService::new(fixed_clock(), &storage));
    let mut session = practice
        .start(topical_sequence(), SessionContext::default())
        .await
        .unwrap();

    let err = practice.finish(&mut session).await.unwrap_err();
    assert!(matches!(err, PracticeError::Tracking(_)));
    assert!(!session.is_finished());
    assert!(practice.backward(&mut session).is_ok());

    practice.finish(&mut session).await.unwrap();
    assert!(session.is_finished());
    let stored = memory.sessions.get_session(session.session_id()).await.unwrap();
    assert!(stored.ended_at.is_some());
}
