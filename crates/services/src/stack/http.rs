use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{GradeResponse, RenderResponse, StackClient, StackRequest, ValidationResponse};
use crate::error::StackError;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// `StackClient` backed by a STACK API server over HTTP.
#[derive(Clone)]
pub struct HttpStackClient {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateRequest<'a> {
    #[serde(flatten)]
    request: &'a StackRequest,
    input_name: &'a str,
}

impl HttpStackClient {
    /// # Errors
    ///
    /// Returns `StackError::Http` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, StackError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned + Send>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, StackError> {
        let url = format!("{}/{endpoint}", self.base_url.trim_end_matches('/'));
        tracing::debug!(%url, "calling STACK API");

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        let value: serde_json::Value = match response.json().await {
            Ok(value) => value,
            Err(_) if !status.is_success() => return Err(StackError::HttpStatus(status)),
            Err(err) => return Err(err.into()),
        };

        // STACK reports question errors as `{"message": ...}`, sometimes with a 200.
        if let Some(message) = value.get("message").and_then(serde_json::Value::as_str) {
            if !message.is_empty() {
                tracing::warn!(%url, message, "STACK API returned an error message");
                return Err(StackError::Api(message.to_owned()));
            }
        }
        if !status.is_success() {
            return Err(StackError::HttpStatus(status));
        }

        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl StackClient for HttpStackClient {
    async fn render(&self, request: &StackRequest) -> Result<RenderResponse, StackError> {
        self.post("render", request).await
    }

    async fn grade(&self, request: &StackRequest) -> Result<GradeResponse, StackError> {
        self.post("grade", request).await
    }

    async fn validate(
        &self,
        request: &StackRequest,
        input_name: &str,
    ) -> Result<ValidationResponse, StackError> {
        self.post("validate", &ValidateRequest {
            request,
            input_name,
        })
        .await
    }
}
