use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use quiz_core::model::{AttemptId, QuestionDescriptor, SessionId};
use storage::repository::{
    AttemptRepository, AttemptSubmission, InputRecord, InputRepository, LearningSession,
    LearningSessionRepository, NewAttempt, NewInput, NewSession, QuestionAttempt, Storage,
};

use crate::Clock;
use crate::error::TrackingError;
use crate::stack::GradeOutcome;

/// `input_name` under which the full answer set of a submission is logged.
pub const FINAL_ANSWERS_INPUT: &str = "final_answers";
/// `input_type` for final answer rows.
pub const FINAL_SUBMISSION_TYPE: &str = "final_submission";

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Pseudonymous learner identifier, `anon_<unix millis>_<9 base36 chars>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnonymousId(String);

impl AnonymousId {
    #[must_use]
    pub fn generate(now: DateTime<Utc>) -> Self {
        let mut rng = rand::rng();
        let suffix: String = (0..9)
            .map(|_| char::from(BASE36[rng.random_range(0..BASE36.len())]))
            .collect();
        Self(format!("anon_{}_{suffix}", now.timestamp_millis()))
    }

    /// Reuse an identifier kept by the caller across visits.
    #[must_use]
    pub fn from_existing(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnonymousId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a practice session was opened from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub anonymous_id: Option<AnonymousId>,
    pub page_url: Option<String>,
    pub user_agent: Option<String>,
}

/// Writes learning sessions, attempts and final answers to storage.
#[derive(Clone)]
pub struct TrackingService {
    clock: Clock,
    sessions: Arc<dyn LearningSessionRepository>,
    attempts: Arc<dyn AttemptRepository>,
    inputs: Arc<dyn InputRepository>,
}

impl TrackingService {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage) -> Self {
        Self {
            clock,
            sessions: Arc::clone(&storage.sessions),
            attempts: Arc::clone(&storage.attempts),
            inputs: Arc::clone(&storage.inputs),
        }
    }

    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::new(clock, &Storage::in_memory())
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Open a learning session, generating an anonymous id when none is supplied.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::Storage` if the session cannot be stored.
    pub async fn start_session(
        &self,
        context: SessionContext,
    ) -> Result<LearningSession, TrackingError> {
        let now = self.clock.now();
        let anonymous_id = context
            .anonymous_id
            .unwrap_or_else(|| AnonymousId::generate(now));
        let session = self
            .sessions
            .start_session(NewSession {
                anonymous_id: anonymous_id.0,
                page_url: context.page_url,
                user_agent: context.user_agent,
                started_at: now,
            })
            .await?;
        tracing::info!(session = %session.id, anonymous_id = %session.anonymous_id, "learning session started");
        Ok(session)
    }

    /// Create the next numbered attempt for `question_prefix` and write its grade.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::Storage` if the session is unknown or the write fails.
    pub async fn record_submission(
        &self,
        session_id: SessionId,
        question: &QuestionDescriptor,
        question_prefix: &str,
        seed: Option<i64>,
        outcome: &GradeOutcome,
    ) -> Result<QuestionAttempt, TrackingError> {
        let now = self.clock.now();
        let attempt = self
            .attempts
            .create_attempt(NewAttempt {
                session_id,
                question_file: question.file_reference().to_string(),
                question_name: question.question_name().map(str::to_string),
                question_prefix: question_prefix.to_string(),
                seed,
                started_at: now,
            })
            .await?;
        let attempt = self
            .attempts
            .submit_attempt(attempt.id, AttemptSubmission {
                submitted_at: now,
                score: outcome.score,
                max_score: outcome.max_score,
                is_correct: outcome.passed,
            })
            .await?;
        tracing::debug!(
            session = %session_id,
            attempt = %attempt.id,
            number = attempt.attempt_number,
            passed = outcome.passed,
            "attempt recorded"
        );
        Ok(attempt)
    }

    /// Log the answer set of a submission as a single final-answer input.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::Encode` if the answers cannot be serialized and
    /// `TrackingError::Storage` if the attempt is unknown.
    pub async fn track_final_answers(
        &self,
        attempt: &QuestionAttempt,
        answers: &BTreeMap<String, String>,
        validation: Option<&serde_json::Value>,
    ) -> Result<InputRecord, TrackingError> {
        let record = self
            .inputs
            .track_input(NewInput {
                attempt_id: attempt.id,
                session_id: attempt.session_id,
                input_name: FINAL_ANSWERS_INPUT.to_string(),
                input_value: serde_json::to_string(answers)?,
                input_type: FINAL_SUBMISSION_TYPE.to_string(),
                is_final_answer: true,
                validation_result: validation.map(serde_json::to_string).transpose()?,
                recorded_at: self.clock.now(),
            })
            .await?;
        Ok(record)
    }

    /// Stamp the end of a learning session.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::Storage` if the session is unknown or already ended.
    pub async fn end_session(&self, session_id: SessionId) -> Result<(), TrackingError> {
        self.sessions
            .end_session(session_id, self.clock.now())
            .await?;
        tracing::info!(session = %session_id, "learning session ended");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `TrackingError::Storage` on read failures.
    pub async fn attempts(&self, session_id: SessionId) -> Result<Vec<QuestionAttempt>, TrackingError> {
        Ok(self.attempts.list_attempts(session_id).await?)
    }

    /// # Errors
    ///
    /// Returns `TrackingError::Storage` on read failures.
    pub async fn inputs(&self, attempt_id: AttemptId) -> Result<Vec<InputRecord>, TrackingError> {
        Ok(self.inputs.list_inputs(attempt_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::QuestionDraft;
    use quiz_core::time::{fixed_clock, fixed_now};

    #[test]
    fn anonymous_id_format() {
        let id = AnonymousId::generate(fixed_now());
        let parts: Vec<&str> = id.as_str().split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "anon");
        assert_eq!(parts[1], fixed_now().timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].bytes().all(|b| BASE36.contains(&b)));
    }

    #[tokio::test]
    async fn submissions_are_numbered_and_answers_logged() {
        let tracking = TrackingService::in_memory(fixed_clock());
        let session = tracking
            .start_session(SessionContext {
                anonymous_id: Some(AnonymousId::from_existing("anon_1_abc")),
                ..SessionContext::default()
            })
            .await
            .unwrap();
        assert_eq!(session.anonymous_id, "anon_1_abc");

        let question = QuestionDraft::new("Simple question", "questions/simple.xml")
            .validate()
            .unwrap();
        let failed = GradeOutcome::manual(false, 0.0, 1.0);
        let passed = GradeOutcome::manual(true, 1.0, 1.0);

        let first = tracking
            .record_submission(session.id, &question, "q1_", Some(7), &failed)
            .await
            .unwrap();
        let second = tracking
            .record_submission(session.id, &question, "q1_", Some(7), &passed)
            .await
            .unwrap();
        assert_eq!(first.attempt_number, 1);
        assert_eq!(second.attempt_number, 2);
        assert_eq!(second.is_correct, Some(true));

        let answers = BTreeMap::from([("ans1".to_string(), "x^2".to_string())]);
        let input = tracking
            .track_final_answers(&second, &answers, None)
            .await
            .unwrap();
        assert_eq!(input.input_name, FINAL_ANSWERS_INPUT);
        assert_eq!(input.input_value, r#"{"ans1":"x^2"}"#);
        assert!(input.is_final_answer);

        tracking.end_session(session.id).await.unwrap();
        let err = tracking.end_session(session.id).await.unwrap_err();
        assert!(matches!(err, TrackingError::Storage(_)));
    }
}
