use crate::category::prompt_for;
use crate::config::ClassifierConfig;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Classifier API key is not configured")]
    MissingApiKey,

    #[error("Classifier request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Classifier returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Classifier response contained no text")]
    EmptyResponse,
}

/// A remote text classifier for transaction descriptions.
///
/// Implementations return the model's raw answer; choosing a fallback and
/// checking the answer against the known categories is the pipeline's job.
pub trait Classifier: Send + Sync {
    fn classify(
        &self,
        description: &str,
    ) -> impl Future<Output = Result<String, ClassifierError>> + Send;
}

/// Body of a Gemini `generateContent` call.
#[derive(Serialize, Debug)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug, Default)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

impl GenerateContentRequest {
    pub fn from_prompt(prompt: String) -> Self {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part { text: Some(prompt) }],
            }],
        }
    }
}

impl GenerateContentResponse {
    /// All text parts of the first candidate, joined and trimmed.
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect();
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}

/// Gemini REST client.
pub struct GeminiClassifier {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        if config.api_key.is_none() {
            log::warn!("GEMINI_API_KEY is not set; every row will be categorized as fallback");
        }

        Ok(GeminiClassifier {
            http,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn request_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

impl Classifier for GeminiClassifier {
    async fn classify(&self, description: &str) -> Result<String, ClassifierError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ClassifierError::MissingApiKey)?;

        let body = GenerateContentRequest::from_prompt(prompt_for(description));
        let response = self
            .http
            .post(self.request_url())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        parsed.text().ok_or(ClassifierError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::CategoryPolicy;

    fn config(api_key: Option<&str>) -> ClassifierConfig {
        ClassifierConfig {
            api_key: api_key.map(str::to_string),
            model: "gemini-test".to_string(),
            endpoint: "https://example.invalid/".to_string(),
            max_in_flight: 4,
            timeout_secs: 5,
            policy: CategoryPolicy::Trust,
        }
    }

    #[test]
    fn request_body_wraps_the_prompt() {
        let body = GenerateContentRequest::from_prompt("hello".to_string());
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "contents": [{ "role": "user", "parts": [{ "text": "hello" }] }]
            })
        );
    }

    #[test]
    fn response_text_joins_parts_of_first_candidate() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [
                { "content": { "role": "model", "parts": [{ "text": "Dine" }, { "text": "-in\n" }] } },
                { "content": { "parts": [{ "text": "Misc" }] } }
            ],
            "usageMetadata": { "totalTokenCount": 12 }
        }))
        .unwrap();
        assert_eq!(response.text().as_deref(), Some("Dine-in"));
    }

    #[test]
    fn response_without_text_is_empty() {
        let response: GenerateContentResponse =
            serde_json::from_value(serde_json::json!({ "candidates": [] })).unwrap();
        assert_eq!(response.text(), None);

        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        }))
        .unwrap();
        assert_eq!(response.text(), None);
    }

    #[test]
    fn builds_model_url() {
        let classifier = GeminiClassifier::new(&config(Some("key"))).unwrap();
        assert_eq!(
            classifier.request_url(),
            "https://example.invalid/v1beta/models/gemini-test:generateContent"
        );
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let classifier = GeminiClassifier::new(&config(None)).unwrap();
        let result = classifier.classify("coffee").await;
        assert!(matches!(result, Err(ClassifierError::MissingApiKey)));
    }
}
