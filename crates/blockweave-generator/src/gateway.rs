//! Content generation service boundary.
//!
//! The pipeline talks to language and image models through [`ContentGateway`].
//! Prompts are built by the callers; the gateway only moves text and bytes.

use async_trait::async_trait;
use blockweave_core::Usage;
use bytes::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;

/// Gateway errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport or service failure.
    #[error("request failed: {0}")]
    Request(String),

    /// The response did not contain the expected JSON object.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Image generation failure.
    #[error("image generation failed: {0}")]
    Image(String),
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// What a completion is requested for. Lets implementations pick models and
/// lets scripted gateways answer deterministically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Purpose {
    BlockContent { category: String },
    Theme,
    Pages,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub purpose: Purpose,
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

/// A generated image.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Bytes,
    pub cost: f64,
    /// Where the service published the image; used for previews.
    pub source_url: String,
}

#[async_trait]
pub trait ContentGateway: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    async fn generate_image(&self, description: &str) -> Result<GeneratedImage>;
}

/// Extract the outermost `{...}` span of a reply and parse it as a JSON object.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>> {
    let start = text
        .find('{')
        .ok_or_else(|| GatewayError::Malformed("no JSON object in response".to_string()))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| GatewayError::Malformed("unterminated JSON object".to_string()))?;

    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(GatewayError::Malformed("expected a JSON object".to_string())),
        Err(e) => Err(GatewayError::Malformed(e.to_string())),
    }
}
