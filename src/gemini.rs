use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::models::DEFAULT_RESULT_MIME;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// One image edit: the photo plus the instruction describing the new look.
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub instruction: String,
    pub image: Bytes,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePart {
    Text(String),
    /// Base64 payload as sent by the API; only the part that becomes the result is decoded.
    InlineImage { mime_type: String, data: String },
}

pub fn decode_inline(data: &str) -> Result<Bytes, GeminiError> {
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map(Bytes::from)
        .map_err(|e| GeminiError::Decode(e.to_string()))
}

/// Seam between the editor and the generative image backend.
#[async_trait]
pub trait ImageEditService: Send + Sync {
    /// Sends one edit request and returns the parts of the first candidate.
    async fn edit_image(&self, request: &EditRequest) -> Result<Vec<ResponsePart>, GeminiError>;
}

// Shortens base64 payloads so request/response bodies stay readable in logs
fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let serde_json::Value::String(s) = val {
                        if s.len() > 100 && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=') {
                            *val = serde_json::Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

fn loggable<T: Serialize>(body: &T) -> String {
    match serde_json::to_value(body) {
        Ok(mut value) => {
            truncate_base64_in_json(&mut value);
            value.to_string()
        }
        Err(e) => format!("<unserializable: {e}>"),
    }
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ImageEditService for GeminiClient {
    async fn edit_image(&self, request: &EditRequest) -> Result<Vec<ResponsePart>, GeminiError> {
        let url = self.endpoint();
        let body = GenerateContentRequest::from_edit(request);

        info!("🔗 Making request to: {}", url);
        debug!("📤 Request body: {}", loggable(&body));

        let response = self.client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        let response_text = response.text().await
            .map_err(|e| GeminiError::Http(e.to_string()))?;

        if !status.is_success() {
            error!("❌ API Error response: {}", response_text);
            return Err(GeminiError::Api { status: status.as_u16(), body: response_text });
        }

        let parsed: GeminiResponse = serde_json::from_str(&response_text)
            .map_err(|e| GeminiError::Parse(e.to_string()))?;
        debug!("📥 Parsed Gemini response: {}", loggable(&parsed));

        Ok(parts_from_response(parsed))
    }
}

// --- Request Types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text { text: String },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
}

impl GenerateContentRequest {
    fn from_edit(request: &EditRequest) -> Self {
        Self {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart::Text { text: request.instruction.clone() },
                    RequestPart::Inline {
                        inline_data: InlineData {
                            mime_type: request.mime_type.clone(),
                            data: base64::engine::general_purpose::STANDARD.encode(&request.image),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig { response_modalities: vec!["TEXT", "IMAGE"] },
        }
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Serialize, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text { text: String },
    Other(serde_json::Value),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

fn parts_from_response(resp: GeminiResponse) -> Vec<ResponsePart> {
    let Some(candidate) = resp.candidates.into_iter().next() else {
        info!("⚠️ No candidates in Gemini response");
        return Vec::new();
    };

    let mut parts = Vec::new();
    for part in candidate.content.parts {
        match part {
            Part::Inline { inline_data } => {
                let mime_type = if inline_data.mime_type.trim().is_empty() {
                    DEFAULT_RESULT_MIME.to_string()
                } else {
                    inline_data.mime_type
                };
                parts.push(ResponsePart::InlineImage { mime_type, data: inline_data.data });
            }
            Part::Text { text } => parts.push(ResponsePart::Text(text)),
            Part::Other(value) => debug!("Skipping unrecognised response part: {}", value),
        }
    }
    parts
}
