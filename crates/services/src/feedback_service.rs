use std::collections::BTreeMap;
use std::env;
use std::fmt::Write as _;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::FeedbackError;

#[derive(Clone, Debug)]
pub struct FeedbackConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl FeedbackConfig {
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("QUIZ_AI_API_KEY").ok()?;
        if api_key.trim().is_empty() {
            return None;
        }
        let base_url =
            env::var("QUIZ_AI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
        let model = env::var("QUIZ_AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
        Some(Self {
            base_url,
            api_key,
            model,
        })
    }
}

/// Everything the tutor sees about one graded submission.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub user_answers: BTreeMap<String, String>,
    pub correct_answer: String,
    pub general_feedback: Option<String>,
    pub question_name: String,
    pub question_text: String,
    pub question_type: String,
    pub additional_context: String,
    pub score: f64,
    pub max_score: f64,
    pub is_correct: bool,
}

impl FeedbackRequest {
    /// Chat prompt asking for short, encouraging feedback on this submission.
    #[must_use]
    pub fn prompt(&self) -> String {
        let mut prompt = String::from(
            "You are a patient mathematics tutor. A student has just submitted an answer \
             to an online practice question. Give brief feedback (at most 150 words). \
             Do not simply reveal the full solution; point out the mistake and the next step.\n\n",
        );
        let _ = writeln!(prompt, "Question: {}", self.question_name);
        let _ = writeln!(prompt, "Question text: {}", self.question_text);
        let _ = writeln!(prompt, "Question type: {}", self.question_type);
        if !self.additional_context.trim().is_empty() {
            let _ = writeln!(prompt, "Context: {}", self.additional_context.trim());
        }
        prompt.push_str("Student answers:\n");
        for (name, value) in &self.user_answers {
            let _ = writeln!(prompt, "- {name}: {value}");
        }
        let _ = writeln!(prompt, "Correct answer: {}", self.correct_answer);
        if let Some(general) = self.general_feedback.as_deref().filter(|g| !g.trim().is_empty()) {
            let _ = writeln!(prompt, "Worked solution: {general}");
        }
        let _ = writeln!(
            prompt,
            "Score: {}/{} ({})",
            self.score,
            self.max_score,
            if self.is_correct { "correct" } else { "not yet correct" }
        );
        prompt
    }
}

/// Optional AI tutor. Disabled when no API key is configured.
#[derive(Clone)]
pub struct FeedbackService {
    client: Client,
    config: Option<FeedbackConfig>,
}

impl FeedbackService {
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(FeedbackConfig::from_env())
    }

    #[must_use]
    pub fn new(config: Option<FeedbackConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Ask the tutor model for feedback on a graded submission.
    ///
    /// # Errors
    ///
    /// Returns `FeedbackError` when the service is disabled, the request fails,
    /// or the response is empty.
    pub async fn feedback(&self, request: &FeedbackRequest) -> Result<String, FeedbackError> {
        let config = self.config.as_ref().ok_or(FeedbackError::Disabled)?;

        let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        let payload = ChatRequest {
            model: config.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: request.prompt(),
            }],
            temperature: 0.2,
        };

        tracing::debug!(question = %request.question_name, model = %config.model, "requesting AI feedback");
        let response = self
            .client
            .post(url)
            .bearer_auth(&config.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "AI feedback request rejected");
            return Err(FeedbackError::HttpStatus(response.status()));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(FeedbackError::EmptyResponse)?;

        Ok(content.trim().to_string())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> FeedbackRequest {
        FeedbackRequest {
            user_answers: BTreeMap::from([("ans1".to_string(), "2*x".to_string())]),
            correct_answer: "2*x+1".into(),
            general_feedback: Some("Differentiate term by term.".into()),
            question_name: "Derivative of a polynomial".into(),
            question_text: "Differentiate x^2+x.".into(),
            question_type: "Algebraic input".into(),
            additional_context: String::new(),
            score: 0.0,
            max_score: 1.0,
            is_correct: false,
        }
    }

    fn service(uri: String) -> FeedbackService {
        FeedbackService::new(Some(FeedbackConfig {
            base_url: uri,
            api_key: "test-key".into(),
            model: "test-model".into(),
        }))
    }

    #[test]
    fn prompt_lists_answers_and_score() {
        let prompt = request().prompt();
        assert!(prompt.contains("- ans1: 2*x"));
        assert!(prompt.contains("Correct answer: 2*x+1"));
        assert!(prompt.contains("Score: 0/1 (not yet correct)"));
        assert!(!prompt.contains("Context:"));
    }

    #[tokio::test]
    async fn disabled_without_config() {
        let service = FeedbackService::new(None);
        assert!(!service.enabled());
        let err = service.feedback(&request()).await.unwrap_err();
        assert!(matches!(err, FeedbackError::Disabled));
    }

    #[tokio::test]
    async fn returns_trimmed_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "  Check the constant term.  "}}]
            })))
            .mount(&server)
            .await;

        let text = service(server.uri()).feedback(&request()).await.unwrap();
        assert_eq!(text, "Check the constant term.");
    }

    #[tokio::test]
    async fn empty_choice_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let err = service(server.uri()).feedback(&request()).await.unwrap_err();
        assert!(matches!(err, FeedbackError::EmptyResponse));
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = service(server.uri()).feedback(&request()).await.unwrap_err();
        assert!(matches!(err, FeedbackError::HttpStatus(s) if s.as_u16() == 429));
    }
}
