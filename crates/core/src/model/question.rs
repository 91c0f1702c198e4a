use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::navigation::NavigationError;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question title cannot be empty")]
    EmptyTitle,

    #[error("question file reference cannot be empty (title: {title})")]
    EmptyFileReference { title: String },

    #[error("question sequence must contain at least one question")]
    EmptySequence,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid difficulty: {0}")]
pub struct ParseDifficultyError(String);

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

/// Coarse difficulty label used by remediation to prefer easier questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Basic,
    Intermediate,
    Advanced,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Basic => "basic",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = ParseDifficultyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Difficulty::Basic),
            "intermediate" => Ok(Difficulty::Intermediate),
            "advanced" => Ok(Difficulty::Advanced),
            _ => Err(ParseDifficultyError(s.to_owned())),
        }
    }
}

//
// ─── DESCRIPTOR ────────────────────────────────────────────────────────────────
//

/// Unvalidated question entry as it appears in a sequence configuration file.
///
/// Accepts the `qfile` / `qname` keys used by existing STACK sequence lists.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub title: String,
    #[serde(alias = "qfile", alias = "file")]
    pub file_reference: String,
    #[serde(default, alias = "qname", alias = "name")]
    pub question_name: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

impl QuestionDraft {
    #[must_use]
    pub fn new(title: impl Into<String>, file_reference: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            file_reference: file_reference.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn named(mut self, question_name: impl Into<String>) -> Self {
        self.question_name = Some(question_name.into());
        self
    }

    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    #[must_use]
    pub fn difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    /// Validate the draft into an immutable descriptor.
    ///
    /// Blank `question_name` and `topic` values are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyTitle` or `QuestionError::EmptyFileReference`.
    pub fn validate(self) -> Result<QuestionDescriptor, QuestionError> {
        let title = self.title.trim().to_owned();
        if title.is_empty() {
            return Err(QuestionError::EmptyTitle);
        }
        let file_reference = self.file_reference.trim().to_owned();
        if file_reference.is_empty() {
            return Err(QuestionError::EmptyFileReference { title });
        }

        Ok(QuestionDescriptor {
            title,
            file_reference,
            question_name: non_blank(self.question_name),
            topic: non_blank(self.topic),
            difficulty: self.difficulty,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Static metadata for one question in the sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionDescriptor {
    title: String,
    file_reference: String,
    question_name: Option<String>,
    topic: Option<String>,
    difficulty: Option<Difficulty>,
}

impl QuestionDescriptor {
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Path of the STACK XML file holding the question.
    #[must_use]
    pub fn file_reference(&self) -> &str {
        &self.file_reference
    }

    /// Name of the question inside the file; `None` selects the first one.
    #[must_use]
    pub fn question_name(&self) -> Option<&str> {
        self.question_name.as_deref()
    }

    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    #[must_use]
    pub fn difficulty(&self) -> Option<Difficulty> {
        self.difficulty
    }

    /// True when both descriptors carry the same, present topic.
    #[must_use]
    pub fn shares_topic_with(&self, other: &QuestionDescriptor) -> bool {
        matches!((self.topic(), other.topic()), (Some(a), Some(b)) if a == b)
    }
}

//
// ─── SEQUENCE ──────────────────────────────────────────────────────────────────
//

/// Ordered, read-only list of questions a learner steps through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSequence {
    questions: Vec<QuestionDescriptor>,
}

impl QuestionSequence {
    /// Build a sequence from already validated descriptors.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptySequence` when `questions` is empty.
    pub fn new(questions: Vec<QuestionDescriptor>) -> Result<Self, QuestionError> {
        if questions.is_empty() {
            return Err(QuestionError::EmptySequence);
        }
        Ok(Self { questions })
    }

    /// Validate every draft and build a sequence, preserving order.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure, or `QuestionError::EmptySequence`.
    pub fn from_drafts(
        drafts: impl IntoIterator<Item = QuestionDraft>,
    ) -> Result<Self, QuestionError> {
        let questions = drafts
            .into_iter()
            .map(QuestionDraft::validate)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(questions)
    }

    /// The STACK sample questions shipped with the practice page.
    #[must_use]
    pub fn builtin() -> Self {
        let questions = builtin_drafts()
            .into_iter()
            .filter_map(|draft| draft.validate().ok())
            .collect();
        Self { questions }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Fetch the descriptor at `index`.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::IndexOutOfRange` when `index >= len()`.
    pub fn get(&self, index: usize) -> Result<&QuestionDescriptor, NavigationError> {
        self.questions
            .get(index)
            .ok_or(NavigationError::IndexOutOfRange {
                index,
                len: self.questions.len(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuestionDescriptor> {
        self.questions.iter()
    }
}

fn builtin_drafts() -> Vec<QuestionDraft> {
    vec![
        QuestionDraft::new(
            "Simple question",
            "questions/Partial fraction decomposition.xml",
        ),
        QuestionDraft::new("Matrix input", "questions/input-sample-questions.xml")
            .named("Matrix"),
        QuestionDraft::new("Radio input", "questions/input-sample-questions.xml").named("Radio"),
        QuestionDraft::new("Reveal block", "questions/Reveal_block_example.xml"),
        QuestionDraft::new("Plot", "questions/Graphs of many to one functions.xml"),
        QuestionDraft::new("JSXGraph", "questions/JSXGraph-behat.xml"),
        QuestionDraft::new("Parsons", "questions/Parsons-examples.xml")
            .named("irrational-power-irrational (illustrates re-use of strings)"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_normalizes_blank_name_and_topic() {
        let q = QuestionDraft::new("Plot", "questions/plot.xml")
            .named("  ")
            .topic("")
            .validate()
            .unwrap();
        assert_eq!(q.question_name(), None);
        assert_eq!(q.topic(), None);
    }

    #[test]
    fn draft_rejects_missing_fields() {
        assert_eq!(
            QuestionDraft::new(" ", "q.xml").validate().unwrap_err(),
            QuestionError::EmptyTitle
        );
        assert!(matches!(
            QuestionDraft::new("T", "").validate().unwrap_err(),
            QuestionError::EmptyFileReference { .. }
        ));
    }

    #[test]
    fn sequence_get_out_of_range() {
        let seq = QuestionSequence::from_drafts([QuestionDraft::new("A", "a.xml")]).unwrap();
        assert_eq!(seq.len(), 1);
        assert_eq!(seq.get(0).unwrap().title(), "A");
        assert_eq!(
            seq.get(1).unwrap_err(),
            NavigationError::IndexOutOfRange { index: 1, len: 1 }
        );
    }

    #[test]
    fn empty_sequence_is_rejected() {
        let err = QuestionSequence::from_drafts(Vec::new()).unwrap_err();
        assert_eq!(err, QuestionError::EmptySequence);
    }

    #[test]
    fn builtin_sequence_has_seven_questions() {
        let seq = QuestionSequence::builtin();
        assert_eq!(seq.len(), 7);
        assert_eq!(seq.get(1).unwrap().question_name(), Some("Matrix"));
        assert_eq!(seq.get(0).unwrap().question_name(), None);
    }

    #[test]
    fn drafts_deserialize_with_source_keys() {
        let raw = r#"[
            {"title": "Limits", "qfile": "questions/limits.xml", "qname": "",
             "topic": "calculus", "difficulty": "basic"},
            {"title": "Series", "file_reference": "questions/series.xml",
             "difficulty": "advanced"}
        ]"#;
        let drafts: Vec<QuestionDraft> = serde_json::from_str(raw).unwrap();
        let seq = QuestionSequence::from_drafts(drafts).unwrap();

        let first = seq.get(0).unwrap();
        assert_eq!(first.file_reference(), "questions/limits.xml");
        assert_eq!(first.question_name(), None);
        assert_eq!(first.difficulty(), Some(Difficulty::Basic));
        assert_eq!(seq.get(1).unwrap().topic(), None);
    }

    #[test]
    fn missing_topics_never_match() {
        let a = QuestionDraft::new("A", "a.xml").validate().unwrap();
        let b = QuestionDraft::new("B", "b.xml").validate().unwrap();
        assert!(!a.shares_topic_with(&b));
    }

    #[test]
    fn difficulty_parses_case_insensitively() {
        assert_eq!("Basic".parse::<Difficulty>().unwrap(), Difficulty::Basic);
        assert!("expert".parse::<Difficulty>().is_err());
    }
}
