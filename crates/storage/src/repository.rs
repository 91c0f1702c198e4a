use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::{AttemptId, InputId, SessionId};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Fields supplied when a learner opens the practice page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub anonymous_id: String,
    pub page_url: Option<String>,
    pub user_agent: Option<String>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearningSession {
    pub id: SessionId,
    pub anonymous_id: String,
    pub page_url: Option<String>,
    pub user_agent: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// A rendered question instance about to be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttempt {
    pub session_id: SessionId,
    pub question_file: String,
    pub question_name: Option<String>,
    pub question_prefix: String,
    pub seed: Option<i64>,
    pub started_at: DateTime<Utc>,
}

/// Persisted attempt; `attempt_number` counts attempts per prefix within a session.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionAttempt {
    pub id: AttemptId,
    pub session_id: SessionId,
    pub question_file: String,
    pub question_name: Option<String>,
    pub question_prefix: String,
    pub seed: Option<i64>,
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub score: Option<f64>,
    pub max_score: Option<f64>,
    pub is_correct: Option<bool>,
}

impl QuestionAttempt {
    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.submitted_at.is_some()
    }
}

/// Grading result written onto an attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttemptSubmission {
    pub submitted_at: DateTime<Utc>,
    pub score: f64,
    pub max_score: f64,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInput {
    pub attempt_id: AttemptId,
    pub session_id: SessionId,
    pub input_name: String,
    pub input_value: String,
    pub input_type: String,
    pub is_final_answer: bool,
    pub validation_result: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRecord {
    pub id: InputId,
    pub attempt_id: AttemptId,
    pub session_id: SessionId,
    pub input_name: String,
    pub input_value: String,
    pub input_type: String,
    pub is_final_answer: bool,
    pub validation_result: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait LearningSessionRepository: Send + Sync {
    /// Persist a new learning session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be stored.
    async fn start_session(&self, session: NewSession) -> Result<LearningSession, StorageError>;

    /// Stamp the end time on a session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, `StorageError::Conflict` if already ended.
    async fn end_session(&self, id: SessionId, ended_at: DateTime<Utc>)
    -> Result<(), StorageError>;

    /// Fetch a session by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_session(&self, id: SessionId) -> Result<LearningSession, StorageError>;
}

#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Create an attempt, numbering it after earlier attempts on the same prefix.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session does not exist.
    async fn create_attempt(&self, attempt: NewAttempt) -> Result<QuestionAttempt, StorageError>;

    /// Write grading results onto an attempt. Resubmission overwrites.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the attempt does not exist.
    async fn submit_attempt(
        &self,
        id: AttemptId,
        submission: AttemptSubmission,
    ) -> Result<QuestionAttempt, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the attempt does not exist.
    async fn get_attempt(&self, id: AttemptId) -> Result<QuestionAttempt, StorageError>;

    /// All attempts for a session in creation order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn list_attempts(&self, session_id: SessionId)
    -> Result<Vec<QuestionAttempt>, StorageError>;

    /// Most recent attempt for a prefix within a session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn latest_attempt(
        &self,
        session_id: SessionId,
        question_prefix: &str,
    ) -> Result<Option<QuestionAttempt>, StorageError>;
}

#[async_trait]
pub trait InputRepository: Send + Sync {
    /// Log one input interaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the attempt does not exist.
    async fn track_input(&self, input: NewInput) -> Result<InputRecord, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn list_inputs(&self, attempt_id: AttemptId) -> Result<Vec<InputRecord>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    sessions: Vec<LearningSession>,
    attempts: Vec<QuestionAttempt>,
    inputs: Vec<InputRecord>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

fn next_id(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX).saturating_add(1)
}

#[async_trait]
impl LearningSessionRepository for InMemoryRepository {
    async fn start_session(&self, session: NewSession) -> Result<LearningSession, StorageError> {
        let mut guard = self.lock()?;
        let stored = LearningSession {
            id: SessionId::new(next_id(guard.sessions.len())),
            anonymous_id: session.anonymous_id,
            page_url: session.page_url,
            user_agent: session.user_agent,
            started_at: session.started_at,
            ended_at: None,
        };
        guard.sessions.push(stored.clone());
        Ok(stored)
    }

    async fn end_session(
        &self,
        id: SessionId,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let session = guard
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StorageError::NotFound)?;
        if session.ended_at.is_some() {
            return Err(StorageError::Conflict);
        }
        session.ended_at = Some(ended_at);
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<LearningSession, StorageError> {
        let guard = self.lock()?;
        guard
            .sessions
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn create_attempt(&self, attempt: NewAttempt) -> Result<QuestionAttempt, StorageError> {
        let mut guard = self.lock()?;
        if !guard.sessions.iter().any(|s| s.id == attempt.session_id) {
            return Err(StorageError::NotFound);
        }

        let previous = guard
            .attempts
            .iter()
            .filter(|a| {
                a.session_id == attempt.session_id && a.question_prefix == attempt.question_prefix
            })
            .map(|a| a.attempt_number)
            .max()
            .unwrap_or(0);

        let stored = QuestionAttempt {
            id: AttemptId::new(next_id(guard.attempts.len())),
            session_id: attempt.session_id,
            question_file: attempt.question_file,
            question_name: attempt.question_name,
            question_prefix: attempt.question_prefix,
            seed: attempt.seed,
            attempt_number: previous + 1,
            started_at: attempt.started_at,
            submitted_at: None,
            score: None,
            max_score: None,
            is_correct: None,
        };
        guard.attempts.push(stored.clone());
        Ok(stored)
    }

    async fn submit_attempt(
        &self,
        id: AttemptId,
        submission: AttemptSubmission,
    ) -> Result<QuestionAttempt, StorageError> {
        let mut guard = self.lock()?;
        let attempt = guard
            .attempts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StorageError::NotFound)?;
        attempt.submitted_at = Some(submission.submitted_at);
        attempt.score = Some(submission.score);
        attempt.max_score = Some(submission.max_score);
        attempt.is_correct = Some(submission.is_correct);
        Ok(attempt.clone())
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<QuestionAttempt, StorageError> {
        let guard = self.lock()?;
        guard
            .attempts
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn list_attempts(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<QuestionAttempt>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .attempts
            .iter()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn latest_attempt(
        &self,
        session_id: SessionId,
        question_prefix: &str,
    ) -> Result<Option<QuestionAttempt>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .attempts
            .iter()
            .filter(|a| a.session_id == session_id && a.question_prefix == question_prefix)
            .max_by_key(|a| a.attempt_number)
            .cloned())
    }
}

#[async_trait]
impl InputRepository for InMemoryRepository {
    async fn track_input(&self, input: NewInput) -> Result<InputRecord, StorageError> {
        let mut guard = self.lock()?;
        let owner = guard
            .attempts
            .iter()
            .find(|a| a.id == input.attempt_id)
            .ok_or(StorageError::NotFound)?;
        if owner.session_id != input.session_id {
            return Err(StorageError::Conflict);
        }

        let stored = InputRecord {
            id: InputId::new(next_id(guard.inputs.len())),
            attempt_id: input.attempt_id,
            session_id: input.session_id,
            input_name: input.input_name,
            input_value: input.input_value,
            input_type: input.input_type,
            is_final_answer: input.is_final_answer,
            validation_result: input.validation_result,
            recorded_at: input.recorded_at,
        };
        guard.inputs.push(stored.clone());
        Ok(stored)
    }

    async fn list_inputs(&self, attempt_id: AttemptId) -> Result<Vec<InputRecord>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .inputs
            .iter()
            .filter(|i| i.attempt_id == attempt_id)
            .cloned()
            .collect())
    }
}

/// Aggregates tracking repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn LearningSessionRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub inputs: Arc<dyn InputRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            sessions: Arc::new(repo.clone()),
            attempts: Arc::new(repo.clone()),
            inputs: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::time::fixed_now;

    fn new_session() -> NewSession {
        NewSession {
            anonymous_id: "anon_1_abc".into(),
            page_url: Some("http://localhost/practice".into()),
            user_agent: None,
            started_at: fixed_now(),
        }
    }

    fn new_attempt(session_id: SessionId, prefix: &str) -> NewAttempt {
        NewAttempt {
            session_id,
            question_file: "questions/q.xml".into(),
            question_name: None,
            question_prefix: prefix.into(),
            seed: Some(17),
            started_at: fixed_now(),
        }
    }

    #[tokio::test]
    async fn attempt_numbers_increment_per_prefix() {
        let repo = InMemoryRepository::new();
        let session = repo.start_session(new_session()).await.unwrap();

        let first = repo.create_attempt(new_attempt(session.id, "q1_")).await.unwrap();
        let second = repo.create_attempt(new_attempt(session.id, "q1_")).await.unwrap();
        let other = repo.create_attempt(new_attempt(session.id, "q2_")).await.unwrap();

        assert_eq!(first.attempt_number, 1);
        assert_eq!(second.attempt_number, 2);
        assert_eq!(other.attempt_number, 1);

        let latest = repo.latest_attempt(session.id, "q1_").await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }

    #[tokio::test]
    async fn attempt_requires_existing_session() {
        let repo = InMemoryRepository::new();
        let err = repo
            .create_attempt(new_attempt(SessionId::new(99), "q1_"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn submit_overwrites_results() {
        let repo = InMemoryRepository::new();
        let session = repo.start_session(new_session()).await.unwrap();
        let attempt = repo.create_attempt(new_attempt(session.id, "q1_")).await.unwrap();
        assert!(!attempt.is_submitted());

        let submission = AttemptSubmission {
            submitted_at: fixed_now(),
            score: 0.5,
            max_score: 1.0,
            is_correct: false,
        };
        repo.submit_attempt(attempt.id, submission).await.unwrap();
        let updated = repo
            .submit_attempt(
                attempt.id,
                AttemptSubmission {
                    score: 1.0,
                    is_correct: true,
                    ..submission
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.score, Some(1.0));
        assert_eq!(updated.is_correct, Some(true));
        assert!(updated.is_submitted());
    }

    #[tokio::test]
    async fn ending_twice_conflicts() {
        let repo = InMemoryRepository::new();
        let session = repo.start_session(new_session()).await.unwrap();
        repo.end_session(session.id, fixed_now()).await.unwrap();

        let err = repo.end_session(session.id, fixed_now()).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
        assert!(repo.get_session(session.id).await.unwrap().ended_at.is_some());
    }

    #[tokio::test]
    async fn inputs_are_scoped_to_attempts() {
        let repo = InMemoryRepository::new();
        let session = repo.start_session(new_session()).await.unwrap();
        let attempt = repo.create_attempt(new_attempt(session.id, "q1_")).await.unwrap();

        repo.track_input(NewInput {
            attempt_id: attempt.id,
            session_id: session.id,
            input_name: "ans1".into(),
            input_value: "x^2".into(),
            input_type: "text".into(),
            is_final_answer: true,
            validation_result: None,
            recorded_at: fixed_now(),
        })
        .await
        .unwrap();

        let inputs = repo.list_inputs(attempt.id).await.unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].input_value, "x^2");
        assert!(repo.list_inputs(AttemptId::new(42)).await.unwrap().is_empty());
    }
}
