mod service;
mod session;
mod view;

pub use service::{PracticeService, QUESTION_PREFIX};
pub use session::{CurrentQuestion, PracticeSession, SharedPractice, SubmitResult};
pub use view::PracticeView;
