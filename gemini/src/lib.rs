//! Minimal Google Generative Language API client.
//!
//! This crate provides a focused client for the `generateContent` family of
//! endpoints with:
//! - Text and JSON-mode generation
//! - Multimodal requests (inline image data parts)
//! - Speech synthesis (audio response modality)
//! - Long-running video operations (start, poll, fetch)

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model for text and structured JSON generation.
pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-pro-preview";
/// Default model for image generation.
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
/// Default model for image editing.
pub const DEFAULT_IMAGE_EDIT_MODEL: &str = "gemini-2.5-flash-image";
/// Default model for speech synthesis.
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
/// Default model for video generation.
pub const DEFAULT_VIDEO_MODEL: &str = "veo-3.1-fast-generate-preview";

/// Errors that can occur when using the Gemini client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not configured")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error indicates a transient overload on the service.
    ///
    /// Overloaded calls are safe to retry with backoff.
    pub fn is_overloaded(&self) -> bool {
        match self {
            Error::Api { status, message } => {
                *status == 503
                    || message.contains("overloaded")
                    || message.contains("UNAVAILABLE")
            }
            _ => false,
        }
    }

    /// Whether this error indicates missing or rejected credentials.
    ///
    /// Access-denied calls must not be retried; the caller needs to
    /// re-supply credentials.
    pub fn is_access_denied(&self) -> bool {
        match self {
            Error::NoApiKey => true,
            Error::Api { status, message } => {
                *status == 403
                    || message.contains("Requested entity was not found")
                    || message.contains("API_KEY_INVALID")
                    || message.contains("PERMISSION_DENIED")
            }
            _ => false,
        }
    }
}

/// Gemini API client.
#[derive(Clone)]
pub struct Gemini {
    client: reqwest::Client,
    api_key: String,
}

impl Gemini {
    /// Create a new Gemini client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .connect_timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            api_key: api_key.into(),
        }
    }

    /// Create a Gemini client from the GEMINI_API_KEY environment variable.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| Error::NoApiKey)?;
        Ok(Self::new(api_key))
    }

    /// Send a `generateContent` request to the given model.
    pub async fn generate_content(
        &self,
        model: &str,
        request: GenerateRequest,
    ) -> Result<GenerateResponse, Error> {
        let url = format!("{API_BASE}/models/{model}:generateContent");
        let headers = self.build_headers()?;

        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| Error::Parse(e.to_string()))
    }

    /// Start a long-running video generation operation.
    ///
    /// Returns an [`Operation`] handle; poll it with
    /// [`Gemini::poll_operation`] until `done` is true.
    pub async fn start_video(
        &self,
        model: &str,
        request: VideoRequest,
    ) -> Result<Operation, Error> {
        let url = format!("{API_BASE}/models/{model}:predictLongRunning");
        let headers = self.build_headers()?;

        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        response
            .json::<Operation>()
            .await
            .map_err(|e| Error::Parse(e.to_string()))
    }

    /// Fetch the current state of a long-running operation by name.
    pub async fn poll_operation(&self, name: &str) -> Result<Operation, Error> {
        let url = format!("{API_BASE}/{name}");
        let headers = self.build_headers()?;

        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        response
            .json::<Operation>()
            .await
            .map_err(|e| Error::Parse(e.to_string()))
    }

    /// Download the bytes behind a file URI returned by an operation.
    pub async fn fetch_file(&self, uri: &str) -> Result<Vec<u8>, Error> {
        let sep = if uri.contains('?') { '&' } else { '?' };
        let url = format!("{uri}{sep}key={}", self.api_key);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| Error::Config(format!("Invalid API key: {e}")))?,
        );
        Ok(headers)
    }
}

// ============================================================================
// Request types
// ============================================================================

/// A `generateContent` request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateRequest {
    /// Create a request from a single text prompt.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::from_parts(vec![Part::text(text)])
    }

    /// Create a request from an ordered list of parts.
    pub fn from_parts(parts: Vec<Part>) -> Self {
        Self {
            contents: vec![Content { parts }],
            generation_config: None,
        }
    }

    /// Ask the model to return `application/json`.
    pub fn with_json_output(mut self) -> Self {
        self.config().response_mime_type = Some("application/json".to_string());
        self
    }

    /// Ask the model to return audio spoken by the given prebuilt voice.
    pub fn with_audio_output(mut self, voice_name: impl Into<String>) -> Self {
        let config = self.config();
        config.response_modalities = Some(vec!["AUDIO".to_string()]);
        config.speech_config = Some(SpeechConfig {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig {
                    voice_name: voice_name.into(),
                },
            },
        });
        self
    }

    /// Request a specific aspect ratio for image output.
    pub fn with_aspect_ratio(mut self, aspect_ratio: impl Into<String>) -> Self {
        self.config().image_config = Some(ImageConfig {
            aspect_ratio: aspect_ratio.into(),
        });
        self
    }

    fn config(&mut self) -> &mut GenerationConfig {
        self.generation_config
            .get_or_insert_with(GenerationConfig::default)
    }
}

/// One content entry in a request or response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A part of a content entry: text or inline binary data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    #[serde(rename = "text")]
    Text(String),
    #[serde(rename = "inlineData")]
    InlineData(InlineData),
}

impl Part {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    /// Create an inline data part from base64-encoded bytes.
    pub fn inline_data(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Part::InlineData(InlineData {
            mime_type: mime_type.into(),
            data: data.into(),
        })
    }
}

/// Base64-encoded binary payload with its media type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// Generation tuning options.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageConfig>,
}

/// Speech synthesis configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

/// Voice selection wrapper.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

/// A named prebuilt voice.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Image output configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub aspect_ratio: String,
}

/// A video generation request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<InlineData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<VideoConfig>,
}

impl VideoRequest {
    /// Create a video request animating the given base64 image.
    pub fn from_image(prompt: impl Into<String>, mime_type: &str, data: &str) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(InlineData {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            }),
            config: Some(VideoConfig::default()),
        }
    }
}

/// Video generation tuning options.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConfig {
    pub number_of_videos: u8,
    pub resolution: String,
    pub aspect_ratio: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            number_of_videos: 1,
            resolution: "720p".to_string(),
            aspect_ratio: "9:16".to_string(),
        }
    }
}

// ============================================================================
// Response types
// ============================================================================

/// A `generateContent` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl GenerateResponse {
    /// Concatenated text from the first candidate's parts.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        Part::Text(text) => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }

    /// The first inline data part of the first candidate, if any.
    pub fn inline_data(&self) -> Option<&InlineData> {
        self.candidates.first().and_then(|c| {
            c.content.parts.iter().find_map(|p| match p {
                Part::InlineData(data) => Some(data),
                _ => None,
            })
        })
    }
}

/// One response candidate.
#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    #[serde(default = "empty_content")]
    pub content: Content,
}

fn empty_content() -> Content {
    Content { parts: Vec::new() }
}

/// A long-running operation handle.
#[derive(Debug, Clone, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub response: Option<OperationResponse>,
}

impl Operation {
    /// The URI of the first generated video, if the operation produced one.
    pub fn video_uri(&self) -> Option<&str> {
        self.response
            .as_ref()?
            .generated_videos
            .first()?
            .video
            .as_ref()
            .map(|v| v.uri.as_str())
    }
}

/// The payload of a completed video operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    #[serde(default)]
    pub generated_videos: Vec<GeneratedVideo>,
}

/// One generated video entry.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedVideo {
    pub video: Option<VideoFile>,
}

/// A reference to a downloadable video file.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoFile {
    pub uri: String,
}
