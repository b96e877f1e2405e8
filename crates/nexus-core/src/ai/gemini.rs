//! Gemini REST client for streamed chat replies.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::sse::data_payloads;
use super::{ChatBackend, FragmentStream, ReplyRequest};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::state::ChatMessage;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Serialize, Debug, PartialEq)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Serialize, Debug, PartialEq)]
struct Part {
    text: String,
}

impl From<&ChatMessage> for Content {
    fn from(message: &ChatMessage) -> Self {
        Content {
            role: Some(message.role.as_wire()),
            parts: vec![Part {
                text: message.content.clone(),
            }],
        }
    }
}

#[derive(Deserialize, Debug, Default)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

/// Model and endpoint selection for [`GeminiClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiSettings {
    pub model: String,
    pub base_url: String,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl GeminiSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model().to_string(),
            base_url: config.base_url().to_string(),
        }
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    settings: GeminiSettings,
}

impl GeminiClient {
    /// Build a client. Fails when no usable API key is given.
    pub fn new(api_key: Option<&str>, settings: GeminiSettings) -> Result<Self> {
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                Error::configuration("GEMINI_API_KEY (or API_KEY) environment variable not set")
            })?;

        Ok(Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            settings,
        })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        )
    }
}

fn build_request(request: &ReplyRequest) -> GenerateContentRequest {
    let mut contents: Vec<Content> = request.history.iter().map(Content::from).collect();
    contents.push(Content::from(&ChatMessage::user(request.text.clone())));

    let system_instruction = Some(request.system_instruction.trim())
        .filter(|s| !s.is_empty())
        .map(|text| Content {
            role: None,
            parts: vec![Part {
                text: text.to_string(),
            }],
        });

    GenerateContentRequest {
        contents,
        system_instruction,
    }
}

/// Extract the reply text carried by one streamed chunk.
fn chunk_text(payload: &str) -> Result<String> {
    let chunk: StreamChunk = serde_json::from_str(payload)
        .map_err(|e| Error::transport(format!("malformed Gemini chunk: {e}")))?;

    if let Some(err) = chunk.error {
        return Err(Error::transport(format!(
            "Gemini API error {}: {}",
            err.code.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string()),
            err.message
        )));
    }

    Ok(chunk
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter(|part| !part.thought)
                .filter_map(|part| part.text.as_deref())
                .collect::<String>()
        })
        .unwrap_or_default())
}

#[async_trait]
impl ChatBackend for GeminiClient {
    async fn stream_reply(&self, request: ReplyRequest) -> Result<FragmentStream> {
        let body = build_request(&request);
        debug!(model = %self.settings.model, turns = body.contents.len(), "opening Gemini stream");

        let response = self
            .client
            .post(self.stream_url())
            .header("x-goog-api-key", &self.api_key)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::transport(format!("Gemini API error {}: {}", status, text)));
        }

        let fragments = data_payloads(response.bytes_stream())
            .map(|payload| payload.and_then(|p| chunk_text(&p)));

        Ok(Box::pin(fragments))
    }
}

/// Connect to Gemini using the credentials and settings from `config`.
///
/// Reads the environment each time it is called; callers cache the result.
pub fn connect(config: &Config) -> Result<Arc<dyn ChatBackend>> {
    let api_key = config.resolve_api_key();
    let client = GeminiClient::new(api_key.as_deref(), GeminiSettings::from_config(config))?;
    info!(model = %client.model(), "Gemini client ready");
    Ok(Arc::new(client))
}
