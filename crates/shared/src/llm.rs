use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{require, Config};
use crate::error::{ModelError, RemoteError};

/// A chat model that answers one system + user exchange with text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ModelError>;
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    top_p: f32,
    stream: bool,
    thinking: Thinking,
}

#[derive(Serialize)]
struct Thinking {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for the Z.AI GLM chat-completions endpoint.
pub struct ZaiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl fmt::Debug for ZaiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZaiClient")
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl ZaiClient {
    pub fn new(config: &Config) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(RemoteError::from_reqwest)?;

        Ok(Self {
            client,
            api_key: config.zai_api_key.clone(),
            base_url: config.zai_api_base.clone(),
            model: config.zai_model.clone(),
        })
    }
}

#[async_trait]
impl LanguageModel for ZaiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ModelError> {
        let api_key = require(&self.api_key, "ZAI_API_KEY")?;

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: 1.0,
            top_p: 0.95,
            stream: false,
            thinking: Thinking { kind: "enabled" },
        };

        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!("Chat completion with {} ({} chars of input)", self.model, user.len());

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Accept-Language", "en-US,en")
            .json(&request)
            .send()
            .await
            .map_err(RemoteError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(RemoteError::from_response(response).await.into());
        }

        let chat_response = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;

        let text = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, api_key: Option<&str>) -> ZaiClient {
        let config = Config {
            zai_api_key: api_key.map(str::to_string),
            zai_api_base: server.uri(),
            zai_model: "glm-test".to_string(),
            ..Config::default()
        };
        ZaiClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer zai-key"))
            .and(body_partial_json(json!({
                "model": "glm-test",
                "messages": [
                    { "role": "system", "content": "sys" },
                    { "role": "user", "content": "hello" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "Label: Technology" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("zai-key"));
        let text = client.complete("sys", "hello").await.unwrap();
        assert_eq!(text, "Label: Technology");
    }

    #[tokio::test]
    async fn test_rate_limit_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("zai-key"));
        let err = client.complete("sys", "hello").await.unwrap_err();
        assert!(matches!(err, ModelError::Remote(RemoteError::RateLimited)));
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("zai-key"));
        let err = client.complete("sys", "hello").await.unwrap_err();
        assert!(matches!(err, ModelError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let server = MockServer::start().await;
        let client = client_for(&server, None);
        let err = client.complete("sys", "hello").await.unwrap_err();
        assert!(matches!(err, ModelError::Config(_)));
    }
}
