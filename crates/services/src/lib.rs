#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod feedback_service;
pub mod practice;
pub mod question_source;
pub mod stack;
pub mod tracking_service;

pub use quiz_core::Clock;

pub use app_services::{AppServices, PracticeConfig, load_sequence};
pub use error::{
    AppServicesError, FeedbackError, PracticeError, QuestionSourceError, StackError, TrackingError,
};
pub use feedback_service::{FeedbackConfig, FeedbackRequest, FeedbackService};
pub use practice::{
    CurrentQuestion, PracticeService, PracticeSession, PracticeView, QUESTION_PREFIX,
    SharedPractice, SubmitResult,
};
pub use question_source::{LoadedQuestion, QuestionSource};
pub use stack::{
    GradeOutcome, HttpStackClient, StackClient, StackRequest, ValidationResponse,
};
pub use tracking_service::{AnonymousId, SessionContext, TrackingService};
