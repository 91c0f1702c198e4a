use thiserror::Error;

use crate::model::QuestionError;
use crate::navigation::NavigationError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Navigation(#[from] NavigationError),
}
