//! Shared error types for the services crate.

use std::path::PathBuf;

use thiserror::Error;

use quiz_core::model::QuestionError;
use quiz_core::navigation::NavigationError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `FeedbackService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FeedbackError {
    #[error("AI feedback is not configured")]
    Disabled,
    #[error("AI feedback returned an empty response")]
    EmptyResponse,
    #[error("AI feedback request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted by the STACK rendering/grading client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StackError {
    /// The API answered with a `message` instead of a result.
    #[error("STACK API error: {0}")]
    Api(String),
    #[error("STACK API request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("unexpected STACK API response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted while loading STACK question XML.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuestionSourceError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no STACK question {} in {file}", .name.as_deref().unwrap_or("(first)"))]
    NotFound { file: String, name: Option<String> },
}

/// Errors emitted by `TrackingService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrackingError {
    #[error("failed to encode tracked answers: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by the practice loop.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PracticeError {
    #[error("practice session already finished")]
    Finished,
    #[error("no question has been rendered for the current index")]
    NotRendered,
    #[error("STACK rendering is not configured")]
    StackDisabled,
    #[error("no question directory is configured")]
    SourceDisabled,
    #[error("submission is not gradable: {0}")]
    NotGradable(String),
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error(transparent)]
    Source(#[from] QuestionSourceError),
    #[error(transparent)]
    Tracking(#[from] TrackingError),
    #[error(transparent)]
    Feedback(#[from] FeedbackError),
}

impl From<StorageError> for PracticeError {
    fn from(err: StorageError) -> Self {
        Self::Tracking(TrackingError::Storage(err))
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error("failed to read question sequence {}: {source}", .path.display())]
    SequenceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid question sequence {}: {source}", .path.display())]
    SequenceFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
