mod ids;
mod progress;
mod question;

pub use ids::{AttemptId, InputId, ParseIdError, SessionId};
pub use progress::{ProgressEntry, ProgressTracker};
pub use question::{
    Difficulty, ParseDifficultyError, QuestionDescriptor, QuestionDraft, QuestionError,
    QuestionSequence,
};
