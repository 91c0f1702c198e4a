//! Next-question selection after a submission.
//!
//! A passed (or unsubmitted) question advances to the next index. A failed
//! question looks for an unattempted question on the same topic, preferring
//! `basic` difficulty, and falls back to repeating the failed question.

use crate::model::{Difficulty, ProgressTracker, QuestionSequence};

/// Destination chosen by [`select_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextQuestion {
    pub index: usize,
    /// True when the choice came from remediation rather than plain progression.
    pub adaptive: bool,
}

impl NextQuestion {
    fn sequential(current: usize) -> Self {
        Self {
            index: current + 1,
            adaptive: false,
        }
    }

    fn remediation(index: usize) -> Self {
        Self {
            index,
            adaptive: true,
        }
    }

    /// True when remediation fell back to the current question.
    #[must_use]
    pub fn is_repeat_of(&self, current: usize) -> bool {
        self.adaptive && self.index == current
    }
}

/// Pick the index to show after `current`.
///
/// The returned index may equal `sequence.len()` for plain progression from
/// the last question; callers treat that as "no forward destination".
/// Ties always resolve to the earliest index in sequence order.
#[must_use]
pub fn select_next(
    sequence: &QuestionSequence,
    progress: &ProgressTracker,
    current: usize,
) -> NextQuestion {
    let failed = progress.result(current).is_some_and(|entry| !entry.passed);
    if !failed {
        return NextQuestion::sequential(current);
    }

    let Ok(descriptor) = sequence.get(current) else {
        return NextQuestion::sequential(current);
    };

    let candidates: Vec<(usize, Option<Difficulty>)> = sequence
        .iter()
        .enumerate()
        .filter(|(index, other)| {
            *index != current
                && !progress.has_attempted(*index)
                && descriptor.shares_topic_with(other)
        })
        .map(|(index, other)| (index, other.difficulty()))
        .collect();

    let basic = candidates
        .iter()
        .find(|(_, difficulty)| *difficulty == Some(Difficulty::Basic));

    match basic.or_else(|| candidates.first()) {
        Some((index, _)) => NextQuestion::remediation(*index),
        None => NextQuestion::remediation(current),
    }
}
