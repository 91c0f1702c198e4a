use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{ProgressEntry, ProgressTracker, QuestionDescriptor, QuestionSequence};
use crate::remediation::select_next;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NavigationError {
    /// An index outside `[0, len)` reached a lookup; the sequence is closed, so
    /// this is a caller bug.
    #[error("question index {index} is out of range (sequence has {len} questions)")]
    IndexOutOfRange { index: usize, len: usize },

    /// Forward movement was requested before the current question was submitted.
    #[error("question at index {index} must be attempted before moving on")]
    NotYetAttempted { index: usize },
}

//
// ─── EVENTS ────────────────────────────────────────────────────────────────────
//

/// Why the current question changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    Initial,
    Forward,
    Backward,
    Jump,
    /// Forward movement redirected to an easier same-topic question.
    Remediation,
    /// Forward movement fell back to a fresh instance of the failed question.
    Repeat,
}

/// Notification handed to the renderer after every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEvent {
    pub index: usize,
    pub title: String,
    pub file_reference: String,
    pub question_name: Option<String>,
    pub reason: TransitionReason,
}

impl NavigationEvent {
    fn new(index: usize, descriptor: &QuestionDescriptor, reason: TransitionReason) -> Self {
        Self {
            index,
            title: descriptor.title().to_owned(),
            file_reference: descriptor.file_reference().to_owned(),
            question_name: descriptor.question_name().map(str::to_owned),
            reason,
        }
    }
}

/// Snapshot of the controller's session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationState {
    pub current_index: usize,
    pub all_attempted: bool,
    pub adaptive_mode_active: bool,
}

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

/// Question-sequencing state machine for one practice run.
///
/// Backward movement is never gated. Forward movement requires the current
/// question to have been attempted (or every question to have been attempted)
/// and its destination comes from [`select_next`]. `jump_to` is an ungated
/// direct load.
#[derive(Debug, Clone)]
pub struct NavigationController {
    sequence: QuestionSequence,
    progress: ProgressTracker,
    current_index: usize,
    adaptive_mode_active: bool,
}

impl NavigationController {
    #[must_use]
    pub fn new(sequence: QuestionSequence) -> Self {
        let progress = ProgressTracker::new(sequence.len());
        Self {
            sequence,
            progress,
            current_index: 0,
            adaptive_mode_active: false,
        }
    }

    #[must_use]
    pub fn sequence(&self) -> &QuestionSequence {
        &self.sequence
    }

    #[must_use]
    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn state(&self) -> NavigationState {
        NavigationState {
            current_index: self.current_index,
            all_attempted: self.progress.is_all_attempted(),
            adaptive_mode_active: self.adaptive_mode_active,
        }
    }

    #[must_use]
    pub fn is_adaptive(&self) -> bool {
        self.adaptive_mode_active
    }

    /// Descriptor at the current index.
    ///
    /// # Errors
    ///
    /// Only fails if the controller invariant was broken.
    pub fn current(&self) -> Result<&QuestionDescriptor, NavigationError> {
        self.sequence.get(self.current_index)
    }

    /// Event describing the initial load of question 0.
    ///
    /// # Errors
    ///
    /// Only fails if the controller invariant was broken.
    pub fn initial_event(&self) -> Result<NavigationEvent, NavigationError> {
        Ok(NavigationEvent::new(
            self.current_index,
            self.current()?,
            TransitionReason::Initial,
        ))
    }

    /// Record a graded submission for the current question.
    ///
    /// # Errors
    ///
    /// Only fails if the controller invariant was broken.
    pub fn record_attempt(
        &mut self,
        passed: bool,
        score: f64,
        at: DateTime<Utc>,
    ) -> Result<&ProgressEntry, NavigationError> {
        self.progress
            .record_attempt(self.current_index, passed, score, at)
    }

    /// Record a graded submission for an explicit index.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::IndexOutOfRange` for unknown indices.
    pub fn record_attempt_at(
        &mut self,
        index: usize,
        passed: bool,
        score: f64,
        at: DateTime<Utc>,
    ) -> Result<&ProgressEntry, NavigationError> {
        self.progress.record_attempt(index, passed, score, at)
    }

    fn gate_open(&self) -> bool {
        self.progress.is_all_attempted() || self.progress.has_attempted(self.current_index)
    }

    /// Move one question back. Returns `None` at the first question.
    pub fn backward(&mut self) -> Option<NavigationEvent> {
        if self.current_index == 0 {
            return None;
        }
        self.move_to(self.current_index - 1, TransitionReason::Backward, false)
            .ok()
    }

    /// Move forward to the question chosen by remediation or plain progression.
    ///
    /// Returns `Ok(None)` when plain progression would run past the last question.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::NotYetAttempted` while the current question is
    /// unsubmitted and not every question has been attempted.
    pub fn forward(&mut self) -> Result<Option<NavigationEvent>, NavigationError> {
        if !self.gate_open() {
            return Err(NavigationError::NotYetAttempted {
                index: self.current_index,
            });
        }

        let next = select_next(&self.sequence, &self.progress, self.current_index);
        if next.index >= self.sequence.len() {
            return Ok(None);
        }

        let reason = if next.is_repeat_of(self.current_index) {
            TransitionReason::Repeat
        } else if next.adaptive {
            TransitionReason::Remediation
        } else {
            TransitionReason::Forward
        };
        self.move_to(next.index, reason, next.adaptive).map(Some)
    }

    /// Load the question at `index` directly, without gating.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::IndexOutOfRange` for unknown indices.
    pub fn jump_to(&mut self, index: usize) -> Result<NavigationEvent, NavigationError> {
        self.move_to(index, TransitionReason::Jump, false)
    }

    fn move_to(
        &mut self,
        index: usize,
        reason: TransitionReason,
        adaptive: bool,
    ) -> Result<NavigationEvent, NavigationError> {
        let descriptor = self.sequence.get(index)?;
        let event = NavigationEvent::new(index, descriptor, reason);
        self.current_index = index;
        self.adaptive_mode_active = adaptive;
        Ok(event)
    }

    /// Whether a `forward()` call would currently move somewhere.
    #[must_use]
    pub fn is_forward_allowed(&self) -> bool {
        self.gate_open()
            && select_next(&self.sequence, &self.progress, self.current_index).index
                < self.sequence.len()
    }

    #[must_use]
    pub fn is_backward_allowed(&self) -> bool {
        self.current_index > 0
    }

    /// Title of the question before the current one, if any.
    #[must_use]
    pub fn previous_title(&self) -> Option<&str> {
        let index = self.current_index.checked_sub(1)?;
        self.sequence.get(index).ok().map(QuestionDescriptor::title)
    }

    /// Title of the question `forward()` would load, remediation included.
    #[must_use]
    pub fn next_title(&self) -> Option<&str> {
        let next = select_next(&self.sequence, &self.progress, self.current_index);
        self.sequence.get(next.index).ok().map(QuestionDescriptor::title)
    }

    /// Whether `forward()` would pick a remediation or repeat target.
    #[must_use]
    pub fn is_next_adaptive(&self) -> bool {
        select_next(&self.sequence, &self.progress, self.current_index).adaptive
    }
}
