//! Boundary to the STACK question rendering/grading API.

mod http;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{PracticeError, StackError};

pub use http::HttpStackClient;

/// Name prefix for rendered inputs, per question block.
pub const INPUT_PREFIX: &str = "stackapi_input_";

/// Request body shared by `/render`, `/grade` and `/validate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackRequest {
    pub question_definition: String,
    pub answers: BTreeMap<String, String>,
    pub seed: Option<i64>,
    pub render_inputs: String,
    pub read_only: bool,
}

impl StackRequest {
    #[must_use]
    pub fn new(question_definition: String, seed: Option<i64>, question_prefix: &str) -> Self {
        Self {
            question_definition,
            answers: BTreeMap::new(),
            seed,
            render_inputs: format!("{question_prefix}{INPUT_PREFIX}"),
            read_only: false,
        }
    }

    #[must_use]
    pub fn with_answers(mut self, answers: BTreeMap<String, String>) -> Self {
        self.answers = answers;
        self
    }
}

/// PHP encodes an empty associative array as `[]`; accept that as an empty map.
fn lenient_map<'de, D, V>(deserializer: D) -> Result<BTreeMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MapOrList<V> {
        Map(BTreeMap<String, V>),
        List(Vec<V>),
    }

    Ok(match MapOrList::deserialize(deserializer)? {
        MapOrList::Map(map) => map,
        MapOrList::List(list) => list
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
    })
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RenderedInput {
    #[serde(default)]
    pub render: String,
    #[serde(default, deserialize_with = "lenient_map")]
    pub samplesolution: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub samplesolutionrender: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RenderResponse {
    pub questionrender: String,
    #[serde(default, deserialize_with = "lenient_map")]
    pub questioninputs: BTreeMap<String, RenderedInput>,
    #[serde(default)]
    pub questionsamplesolutiontext: Option<String>,
    #[serde(default, deserialize_with = "lenient_map")]
    pub questionassets: BTreeMap<String, String>,
}

impl RenderResponse {
    /// Question HTML with `[[input:name]]` placeholders replaced by rendered inputs.
    #[must_use]
    pub fn html_with_inputs(&self) -> String {
        let mut html = self.questionrender.clone();
        for (name, input) in &self.questioninputs {
            html = html.replacen(&format!("[[input:{name}]]"), &input.render, 1);
            html = html.replacen(&format!("[[validation:{name}]]"), "", 1);
        }
        html
    }
}

/// Question weight plus the relative weight of each potential response tree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoreWeights {
    #[serde(default = "one")]
    pub total: f64,
    #[serde(flatten)]
    pub prts: BTreeMap<String, f64>,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            total: one(),
            prts: BTreeMap::new(),
        }
    }
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GradeResponse {
    #[serde(default)]
    pub isgradable: bool,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub scoreweights: ScoreWeights,
    #[serde(default)]
    pub responsesummary: Option<String>,
    #[serde(default)]
    pub specificfeedback: Option<String>,
    #[serde(default)]
    pub generalfeedback: Option<String>,
    #[serde(default)]
    pub formatcorrectresponse: Option<String>,
    #[serde(default, deserialize_with = "lenient_map")]
    pub prts: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "lenient_map")]
    pub scores: BTreeMap<String, f64>,
}

impl GradeResponse {
    /// Marks awarded and available for one response tree, scaled to the question weight.
    #[must_use]
    pub fn prt_marks(&self, prt: &str) -> Option<(f64, f64)> {
        let score = self.scores.get(prt)?;
        let weight = self.scoreweights.prts.get(prt)? * self.scoreweights.total;
        Some((score * weight, weight))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValidationResponse {
    #[serde(default)]
    pub validation: String,
}

/// Pass/fail verdict derived from a STACK grade response.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeOutcome {
    /// Weighted score, `score * scoreweights.total`.
    pub score: f64,
    pub max_score: f64,
    pub passed: bool,
    pub response_summary: Option<String>,
}

impl GradeOutcome {
    /// A manually supplied result, for graders other than STACK.
    #[must_use]
    pub fn manual(passed: bool, score: f64, max_score: f64) -> Self {
        Self {
            score,
            max_score,
            passed,
            response_summary: None,
        }
    }

    /// Interpret a grade response. Full marks (`score >= 1.0`) count as passed.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::NotGradable` when STACK could not grade the answers
    /// (typically invalid or missing inputs); that is not an attempt.
    pub fn from_response(response: &GradeResponse) -> Result<Self, PracticeError> {
        if !response.isgradable {
            return Err(PracticeError::NotGradable(
                "Please enter valid answers for all parts of the question.".into(),
            ));
        }
        let total = response.scoreweights.total;
        Ok(Self {
            score: response.score * total,
            max_score: total,
            passed: response.score >= 1.0,
            response_summary: response.responsesummary.clone(),
        })
    }
}

/// Contract for the external rendering/grading collaborator.
#[async_trait]
pub trait StackClient: Send + Sync {
    /// Render a question instance.
    ///
    /// # Errors
    ///
    /// Returns `StackError` for transport failures or API-reported errors.
    async fn render(&self, request: &StackRequest) -> Result<RenderResponse, StackError>;

    /// Grade the answers in `request`.
    ///
    /// # Errors
    ///
    /// Returns `StackError` for transport failures or API-reported errors.
    async fn grade(&self, request: &StackRequest) -> Result<GradeResponse, StackError>;

    /// Validate a single input of `request`.
    ///
    /// # Errors
    ///
    /// Returns `StackError` for transport failures or API-reported errors.
    async fn validate(
        &self,
        request: &StackRequest,
        input_name: &str,
    ) -> Result<ValidationResponse, StackError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grade(score: f64, total: f64, gradable: bool) -> GradeResponse {
        serde_json::from_value(serde_json::json!({
            "isgradable": gradable,
            "score": score,
            "scoreweights": {"total": total},
            "responsesummary": "Seed: 1; ans1: x;",
        }))
        .unwrap()
    }

    #[test]
    fn full_marks_pass_and_scale_by_weight() {
        let outcome = GradeOutcome::from_response(&grade(1.0, 4.0, true)).unwrap();
        assert!(outcome.passed);
        assert_eq!(outcome.score, 4.0);
        assert_eq!(outcome.max_score, 4.0);
    }

    #[test]
    fn partial_marks_fail() {
        let outcome = GradeOutcome::from_response(&grade(0.5, 2.0, true)).unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 1.0);
    }

    #[test]
    fn missing_weights_default_to_one() {
        let response: GradeResponse =
            serde_json::from_value(serde_json::json!({"isgradable": true, "score": 1.0})).unwrap();
        let outcome = GradeOutcome::from_response(&response).unwrap();
        assert_eq!(outcome.max_score, 1.0);
        assert_eq!(outcome.score, 1.0);
    }

    #[test]
    fn prt_marks_scale_by_weights() {
        let response: GradeResponse = serde_json::from_value(serde_json::json!({
            "isgradable": true,
            "score": 0.5,
            "scores": {"prt1": 1.0, "prt2": 0.0},
            "scoreweights": {"total": 2.0, "prt1": 0.5, "prt2": 0.5},
        }))
        .unwrap();
        assert_eq!(response.prt_marks("prt1"), Some((1.0, 1.0)));
        assert_eq!(response.prt_marks("prt2"), Some((0.0, 1.0)));
        assert_eq!(response.prt_marks("prt3"), None);
    }

    #[test]
    fn ungradable_is_not_an_attempt() {
        let err = GradeOutcome::from_response(&grade(0.0, 1.0, false)).unwrap_err();
        assert!(matches!(err, PracticeError::NotGradable(_)));
    }

    #[test]
    fn request_serializes_camel_case() {
        let request = StackRequest::new("<quiz/>".into(), Some(5), "q1_");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["questionDefinition"], "<quiz/>");
        assert_eq!(json["renderInputs"], "q1_stackapi_input_");
        assert_eq!(json["readOnly"], false);
    }

    #[test]
    fn empty_php_arrays_decode_as_empty_maps() {
        let response: RenderResponse = serde_json::from_value(serde_json::json!({
            "questionrender": "<p>No inputs</p>",
            "questioninputs": [],
            "questionassets": [],
        }))
        .unwrap();
        assert!(response.questioninputs.is_empty());
        assert!(response.questionassets.is_empty());
    }

    #[test]
    fn inputs_are_spliced_into_question_html() {
        let response: RenderResponse = serde_json::from_value(serde_json::json!({
            "questionrender": "<p>Find [[input:ans1]] [[validation:ans1]]</p>",
            "questioninputs": {"ans1": {"render": "<input name='ans1'>"}},
        }))
        .unwrap();
        assert_eq!(response.html_with_inputs(), "<p>Find <input name='ans1'> </p>");
    }
}
