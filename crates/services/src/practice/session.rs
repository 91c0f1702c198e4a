use std::collections::BTreeMap;
use std::sync::Arc;

use quiz_core::model::{ProgressEntry, QuestionSequence, SessionId};
use quiz_core::NavigationController;
use storage::repository::{LearningSession, QuestionAttempt};
use tokio::sync::Mutex;

use super::view::PracticeView;
use crate::question_source::LoadedQuestion;
use crate::stack::{GradeOutcome, GradeResponse, RenderResponse};

/// Question instance currently on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentQuestion {
    pub index: usize,
    pub loaded: LoadedQuestion,
    pub seed: Option<i64>,
    pub render: Option<RenderResponse>,
}

/// Everything produced by one graded submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitResult {
    pub entry: ProgressEntry,
    /// Persisted attempt; `None` when tracking storage was unavailable.
    pub attempt: Option<QuestionAttempt>,
    pub outcome: GradeOutcome,
    pub all_attempted: bool,
    pub answers: BTreeMap<String, String>,
    pub grade: Option<GradeResponse>,
}

/// One learner's walk through a question sequence.
#[derive(Debug)]
pub struct PracticeSession {
    controller: NavigationController,
    session: LearningSession,
    current: Option<CurrentQuestion>,
    last_result: Option<SubmitResult>,
    finished: bool,
}

/// A practice session shared between tasks; transitions happen under the lock.
pub type SharedPractice = Arc<Mutex<PracticeSession>>;

impl PracticeSession {
    pub(crate) fn new(sequence: QuestionSequence, session: LearningSession) -> Self {
        Self {
            controller: NavigationController::new(sequence),
            session,
            current: None,
            last_result: None,
            finished: false,
        }
    }

    #[must_use]
    pub fn into_shared(self) -> SharedPractice {
        Arc::new(Mutex::new(self))
    }

    #[must_use]
    pub fn controller(&self) -> &NavigationController {
        &self.controller
    }

    pub(crate) fn controller_mut(&mut self) -> &mut NavigationController {
        &mut self.controller
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session.id
    }

    #[must_use]
    pub fn learning_session(&self) -> &LearningSession {
        &self.session
    }

    /// Loaded question for the current index, if it has been opened.
    #[must_use]
    pub fn current_question(&self) -> Option<&CurrentQuestion> {
        self.current
            .as_ref()
            .filter(|q| q.index == self.controller.current_index())
    }

    pub(crate) fn set_current(&mut self, current: CurrentQuestion) {
        self.current = Some(current);
    }

    pub(crate) fn clear_current(&mut self) {
        self.current = None;
        self.last_result = None;
    }

    #[must_use]
    pub fn last_result(&self) -> Option<&SubmitResult> {
        self.last_result.as_ref()
    }

    pub(crate) fn set_last_result(&mut self, result: SubmitResult) {
        self.last_result = Some(result);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn mark_finished(&mut self) {
        self.finished = true;
    }

    #[must_use]
    pub fn view(&self) -> PracticeView {
        PracticeView::from_controller(&self.controller)
    }
}
