//! Gemini `generateContent` client

use super::{extract_json, Classifier, ClassifierError};
use crate::config::LlmConfig;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

pub struct GeminiClassifier {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
}

impl GeminiClassifier {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Request(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            temperature,
        })
    }

    /// Build from the `[llm]` section, reading the key from `api_key_env`
    pub fn from_config(config: &LlmConfig) -> Result<Self, ClassifierError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ClassifierError::MissingApiKey(config.api_key_env.clone()))?;

        Self::new(
            api_key,
            &config.model,
            &config.base_url,
            config.temperature,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| {
            if body.is_empty() {
                "no response body".to_string()
            } else {
                body.chars().take(500).collect()
            }
        })
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn classify(&self, system_prompt: &str, query: &str) -> Result<Value, ClassifierError> {
        let prompt = format!(
            "{}\n\nUser Query: {}\n\nReturn the result as valid JSON.",
            system_prompt, query
        );
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": self.temperature,
                "responseMimeType": "application/json"
            }
        });

        tracing::debug!("Sending classifier request to {}", self.model);

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifierError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Http {
                status: status.as_u16(),
                message: extract_error_message(&text),
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ClassifierError::InvalidJson(e.to_string()))?;

        let text = payload
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .ok_or(ClassifierError::EmptyResponse)?;

        extract_json(text)
    }
}
