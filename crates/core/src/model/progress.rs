use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::navigation::NavigationError;

/// Latest graded submission for one question index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEntry {
    pub question_index: usize,
    pub attempted: bool,
    pub passed: bool,
    pub score: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Per-index attempt bookkeeping for one practice run.
///
/// Entries are created on first submission and overwritten by later ones;
/// nothing is ever removed. Once every index has an entry the
/// `all_attempted` flag is raised and stays raised.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    entries: Vec<Option<ProgressEntry>>,
    all_attempted: bool,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            entries: vec![None; len],
            all_attempted: false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Upsert the entry for `index` from a graded submission.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::IndexOutOfRange` if `index` is not tracked.
    pub fn record_attempt(
        &mut self,
        index: usize,
        passed: bool,
        score: f64,
        recorded_at: DateTime<Utc>,
    ) -> Result<&ProgressEntry, NavigationError> {
        let len = self.entries.len();
        if index >= len {
            return Err(NavigationError::IndexOutOfRange { index, len });
        }

        self.entries[index] = Some(ProgressEntry {
            question_index: index,
            attempted: true,
            passed,
            score,
            recorded_at,
        });

        if !self.all_attempted && self.entries.iter().all(Option::is_some) {
            self.all_attempted = true;
        }

        self.entries[index]
            .as_ref()
            .ok_or(NavigationError::IndexOutOfRange { index, len })
    }

    #[must_use]
    pub fn has_attempted(&self, index: usize) -> bool {
        self.entries
            .get(index)
            .is_some_and(|slot| slot.as_ref().is_some_and(|e| e.attempted))
    }

    #[must_use]
    pub fn is_all_attempted(&self) -> bool {
        self.all_attempted
    }

    #[must_use]
    pub fn result(&self, index: usize) -> Option<&ProgressEntry> {
        self.entries.get(index).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn attempted_count(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.entries.iter().flatten().filter(|e| e.passed).count()
    }
}
