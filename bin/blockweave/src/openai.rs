//! OpenAI-compatible content gateway over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use blockweave_core::{Usage, config::GatewayConfig};
use blockweave_generator::gateway::{
    Completion, CompletionRequest, ContentGateway, GatewayError, GeneratedImage, Result,
};
use serde::Deserialize;
use serde_json::json;

/// Gateway backed by the chat completions and image generation endpoints.
pub struct OpenAiGateway {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    image_model: String,
    api_key: String,
    image_cost: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

impl OpenAiGateway {
    /// Build a gateway from config; the API key is read from `api_key_env`.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            GatewayError::Request(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Request(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            image_model: config.image_model.clone(),
            api_key,
            image_cost: config.image_cost,
        })
    }

    async fn post_json<T>(&self, path: &str, body: serde_json::Value) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Request(format!("failed to send request to {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(GatewayError::Request(format!(
                "HTTP {status} from {url}: {error_text}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(format!("invalid response from {url}: {e}")))
    }
}

#[async_trait]
impl ContentGateway for OpenAiGateway {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        tracing::debug!(purpose = ?request.purpose, model = %self.model, "requesting completion");

        let reply: ChatResponse = self
            .post_json(
                "chat/completions",
                json!({
                    "model": self.model,
                    "messages": [
                        {"role": "system", "content": request.system},
                        {"role": "user", "content": request.user},
                    ],
                    "response_format": {"type": "json_object"},
                }),
            )
            .await?;

        let text = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GatewayError::Malformed("completion has no content".to_string()))?;
        let usage = reply
            .usage
            .map(|u| Usage::tokens(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(Completion { text, usage })
    }

    async fn generate_image(&self, description: &str) -> Result<GeneratedImage> {
        let reply: ImageResponse = self
            .post_json(
                "images/generations",
                json!({
                    "model": self.image_model,
                    "prompt": description,
                    "n": 1,
                    "size": "1024x1024",
                }),
            )
            .await
            .map_err(|e| GatewayError::Image(e.to_string()))?;

        let source_url = reply
            .data
            .into_iter()
            .find_map(|d| d.url)
            .ok_or_else(|| GatewayError::Image("image response has no URL".to_string()))?;

        let response = self
            .http_client
            .get(&source_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| GatewayError::Image(format!("failed to download image: {e}")))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Image(format!("failed to read image: {e}")))?;

        tracing::debug!(size = bytes.len(), "image downloaded");

        Ok(GeneratedImage {
            bytes,
            cost: self.image_cost,
            source_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key() {
        let config = GatewayConfig {
            api_key_env: "BLOCKWEAVE_TEST_UNSET_KEY".to_string(),
            ..GatewayConfig::default()
        };

        let result = OpenAiGateway::from_config(&config);
        assert!(matches!(result, Err(GatewayError::Request(msg)) if msg.contains("BLOCKWEAVE_TEST_UNSET_KEY")));
    }

    #[test]
    fn test_parse_chat_response() {
        let reply: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "{\"a\": 1}"}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}}"#,
        )
        .unwrap();

        assert_eq!(reply.choices[0].message.content.as_deref(), Some(r#"{"a": 1}"#));
        let usage = reply.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 3);
    }
}
