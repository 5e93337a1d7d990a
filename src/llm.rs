use crate::config::LlmConfig;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Text-completion boundary. Implementations may fail for any reason
/// (timeout, quota, network); callers own the fallback.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String>;
}

/// OpenAI-compatible chat-completions client.
#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AssistantError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            http,
        })
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        if !self.has_credentials() {
            return Err(AssistantError::Llm("no API key configured".to_string()));
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": temperature,
        });

        // Newer models take max_completion_tokens, older ones max_tokens
        if self.model.starts_with("gpt-4") || self.model.starts_with("gpt-5") || self.model.contains("o1") {
            body["max_completion_tokens"] = serde_json::json!(1000);
        } else {
            body["max_tokens"] = serde_json::json!(1000);
        }

        debug!("Calling model {} (temperature {})", self.model, temperature);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Llm(format!("LLM API call failed: {}", e)))?;

        // Check HTTP status
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            warn!("LLM API returned {}", status);
            return Err(AssistantError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        extract_content(&response_json)
    }
}

fn extract_content(response_json: &serde_json::Value) -> Result<String> {
    response_json["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| AssistantError::Llm("No content in LLM response".to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns queued replies in order; an empty queue fails the call.
    pub(crate) struct ScriptedModel {
        replies: Mutex<Vec<Result<String>>>,
        pub(crate) prompts: Mutex<Vec<(String, f32)>>,
    }

    impl ScriptedModel {
        pub(crate) fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing() -> Self {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
            self.prompts.lock().unwrap().push((prompt.to_string(), temperature));
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(AssistantError::Llm("model unavailable".to_string())))
        }
    }

    #[tokio::test]
    async fn test_client_without_key_fails_fast() {
        let client = LlmClient::from_config(&LlmConfig::default()).unwrap();
        assert!(!client.has_credentials());
        let err = client.complete("hello", 0.1).await.unwrap_err();
        assert!(matches!(err, AssistantError::Llm(_)));
    }

    #[test]
    fn test_extract_content() {
        let body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "SELECT 1"}}]
        });
        assert_eq!(extract_content(&body).unwrap(), "SELECT 1");

        let empty = serde_json::json!({"choices": []});
        assert!(extract_content(&empty).is_err());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = LlmConfig {
            base_url: "http://localhost:11434/v1/".to_string(),
            ..LlmConfig::default()
        };
        let client = LlmClient::from_config(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434/v1");
    }
}
