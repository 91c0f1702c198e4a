use std::path::{Path, PathBuf};
use std::sync::Arc;

use quiz_core::model::{QuestionDraft, QuestionSequence};
use storage::repository::Storage;

use crate::Clock;
use crate::error::AppServicesError;
use crate::feedback_service::FeedbackService;
use crate::practice::PracticeService;
use crate::question_source::QuestionSource;
use crate::stack::HttpStackClient;
use crate::tracking_service::TrackingService;

/// Optional collaborators of the practice loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PracticeConfig {
    /// Directory that question `file_reference`s are resolved against.
    pub question_dir: Option<PathBuf>,
    /// Base URL of a STACK API server.
    pub stack_url: Option<String>,
}

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    tracking: Arc<TrackingService>,
    practice: Arc<PracticeService>,
    feedback: Arc<FeedbackService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization or HTTP client setup fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: &PracticeConfig,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::from_storage(&storage, clock, config)
    }

    /// Build services over in-memory storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Stack` if the STACK client cannot be built.
    pub fn in_memory(clock: Clock, config: &PracticeConfig) -> Result<Self, AppServicesError> {
        Self::from_storage(&Storage::in_memory(), clock, config)
    }

    fn from_storage(
        storage: &Storage,
        clock: Clock,
        config: &PracticeConfig,
    ) -> Result<Self, AppServicesError> {
        let tracking = TrackingService::new(clock, storage);
        let feedback = Arc::new(FeedbackService::from_env());

        let mut practice = PracticeService::new(tracking.clone()).with_feedback(Arc::clone(&feedback));
        if let Some(dir) = &config.question_dir {
            practice = practice.with_question_source(QuestionSource::new(dir));
        }
        if let Some(url) = &config.stack_url {
            practice = practice.with_stack(Arc::new(HttpStackClient::new(url.clone())?));
        }
        tracing::debug!(
            grading = practice.grading_enabled(),
            feedback = feedback.enabled(),
            "practice services assembled"
        );

        Ok(Self {
            tracking: Arc::new(tracking),
            practice: Arc::new(practice),
            feedback,
        })
    }

    #[must_use]
    pub fn tracking(&self) -> Arc<TrackingService> {
        Arc::clone(&self.tracking)
    }

    #[must_use]
    pub fn practice(&self) -> Arc<PracticeService> {
        Arc::clone(&self.practice)
    }

    #[must_use]
    pub fn feedback(&self) -> Arc<FeedbackService> {
        Arc::clone(&self.feedback)
    }
}

/// Read a question sequence from a JSON array of question entries.
///
/// # Errors
///
/// Returns `AppServicesError` if the file cannot be read, is not valid JSON,
/// or contains an invalid or empty question list.
pub async fn load_sequence(path: &Path) -> Result<QuestionSequence, AppServicesError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| AppServicesError::SequenceIo {
            path: path.to_path_buf(),
            source,
        })?;
    let drafts: Vec<QuestionDraft> =
        serde_json::from_str(&raw).map_err(|source| AppServicesError::SequenceFormat {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(QuestionSequence::from_drafts(drafts)?)
}
