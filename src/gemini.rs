// ============================================================================
// GEMINI CLIENT: one generateContent call per edit
// ============================================================================
//
// Request:  prompt text + source image + location guide as inline parts.
// Response: the first inline image part wins; a text-only answer is surfaced
//           to the user as an error. There are no retries.

use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::io::{GeneratedImage, SourceImage};
use crate::ops::guide::{GuideMode, build_guide, encode_png};
use crate::selection::BoundingBox;
use crate::{log_err, log_info};

pub const DEFAULT_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TIMEOUT_SECS: u64 = 180;

/// Marker the API returns when the key (or the model behind it) cannot be used.
const KEY_NOT_FOUND: &str = "Requested entity was not found";

// -- Errors ---------------------------------------------------------------

#[derive(Debug)]
pub enum InpaintError {
    MissingApiKey,
    /// Key rejected or expired; the UI asks for a new one.
    InvalidApiKey(String),
    Api { status: u16, message: String },
    Http(String),
    Blocked(String),
    NoContent,
    /// The model answered with prose instead of an image.
    ModelText(String),
    NoImage,
    Image(String),
    Decode(String),
}

impl std::fmt::Display for InpaintError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InpaintError::MissingApiKey => write!(f, "No API key configured"),
            InpaintError::InvalidApiKey(m) => {
                write!(f, "API key session expired or invalid. Please reconnect. ({})", m)
            }
            InpaintError::Api { status, message } => write!(f, "API error {}: {}", status, message),
            InpaintError::Http(e) => write!(f, "Request failed: {}", e),
            InpaintError::Blocked(r) => write!(f, "Request blocked by the model: {}", r),
            InpaintError::NoContent => write!(f, "No content returned from API"),
            InpaintError::ModelText(t) => write!(f, "Model returned text: {}", t),
            InpaintError::NoImage => write!(f, "Could not generate image."),
            InpaintError::Image(e) => write!(f, "Image error: {}", e),
            InpaintError::Decode(e) => write!(f, "Could not decode response: {}", e),
        }
    }
}

impl std::error::Error for InpaintError {}

impl From<reqwest::Error> for InpaintError {
    fn from(e: reqwest::Error) -> Self {
        InpaintError::Http(e.to_string())
    }
}

impl From<image::ImageError> for InpaintError {
    fn from(e: image::ImageError) -> Self {
        InpaintError::Image(e.to_string())
    }
}

impl From<base64::DecodeError> for InpaintError {
    fn from(e: base64::DecodeError) -> Self {
        InpaintError::Decode(e.to_string())
    }
}

impl From<serde_json::Error> for InpaintError {
    fn from(e: serde_json::Error) -> Self {
        InpaintError::Decode(e.to_string())
    }
}

// -- Config ---------------------------------------------------------------

/// Output resolution requested from the image model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ImageSize {
    OneK,
    #[default]
    TwoK,
    FourK,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::OneK => "1K",
            ImageSize::TwoK => "2K",
            ImageSize::FourK => "4K",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "1K" => Some(ImageSize::OneK),
            "2K" => Some(ImageSize::TwoK),
            "4K" => Some(ImageSize::FourK),
            _ => None,
        }
    }

    pub fn all() -> &'static [ImageSize] {
        &[ImageSize::OneK, ImageSize::TwoK, ImageSize::FourK]
    }
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub image_size: ImageSize,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            image_size: ImageSize::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

// -- Wire types -----------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    fn text(t: impl Into<String>) -> Self {
        Self { text: Some(t.into()), inline_data: None }
    }

    fn inline(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.to_string(),
                data: BASE64.encode(bytes),
            }),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub image_size: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub image_config: ImageConfig,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
    pub error: Option<ApiErrorBody>,
}

#[derive(Deserialize, Debug, Default)]
pub struct Candidate {
    pub content: Option<Content>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

// -- Prompt / request / response -----------------------------------------

/// Instruction text for the given replacement and guide flavour.
pub fn build_prompt(new_text: &str, mode: GuideMode) -> String {
    match mode {
        GuideMode::VisualGuide => format!(
            "Task: Professional Image Text Replacement.\n\
             \n\
             Input Data:\n\
             1. [Source Image]: The original image to be edited.\n\
             2. [Location Guide]: A reference version of the image where the area to edit is BRIGHT and framed in GREEN, while the rest is darkened.\n\
             \n\
             INSTRUCTIONS:\n\
             1. Look at the [Location Guide]. Focus ONLY on the bright area inside the GREEN frame.\n\
             2. Find the exact corresponding pixels in the [Source Image].\n\
             3. In that specific area of the [Source Image], replace the existing text with: \"{new_text}\".\n\
             4. PRESERVE the background texture, lighting, and style of the original image perfectly.\n\
             5. DO NOT touch any part of the image that is darkened in the [Location Guide].\n\
             6. Return the final clean image (without the green frame or darkening).\n"
        ),
        GuideMode::BinaryMask => format!(
            "Task: Professional Image Text Replacement.\n\
             \n\
             Input Data:\n\
             1. [Source Image]: The original image to be edited.\n\
             2. [Edit Mask]: A black and white image of the same size. WHITE marks the area to edit, BLACK must stay unchanged.\n\
             \n\
             INSTRUCTIONS:\n\
             1. Find the pixels of the [Source Image] that are WHITE in the [Edit Mask].\n\
             2. In that area, replace the existing text with: \"{new_text}\".\n\
             3. PRESERVE the background texture, lighting, and style of the original image perfectly.\n\
             4. DO NOT touch any part of the image that is BLACK in the [Edit Mask].\n\
             5. Return the final edited image at the original framing.\n"
        ),
    }
}

/// Assemble the generateContent body: prompt, source, then guide.
pub fn build_request(
    prompt: &str,
    source_mime: &str,
    source_bytes: &[u8],
    guide_png: &[u8],
    image_size: ImageSize,
) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                Part::text(prompt),
                Part::inline(source_mime, source_bytes),
                Part::inline("image/png", guide_png),
            ],
        }],
        generation_config: GenerationConfig {
            response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            image_config: ImageConfig {
                image_size: image_size.as_str().to_string(),
            },
        },
    }
}

fn api_error(status: u16, err: ApiErrorBody) -> InpaintError {
    let code = if err.code != 0 { err.code } else { status };
    if err.message.contains(KEY_NOT_FOUND)
        || err.message.contains("API key not valid")
        || code == 401
    {
        return InpaintError::InvalidApiKey(err.message);
    }
    let message = if err.status.is_empty() {
        err.message
    } else {
        format!("{} ({})", err.message, err.status)
    };
    InpaintError::Api { status: code, message }
}

/// Interpret a generateContent response body.
pub fn parse_response(status: u16, body: &str) -> Result<GeneratedImage, InpaintError> {
    let response: GenerateResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(_) if status >= 400 => {
            let snippet: String = body.chars().take(200).collect();
            return Err(InpaintError::Api { status, message: snippet });
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(err) = response.error {
        return Err(api_error(status, err));
    }
    if status >= 400 {
        return Err(InpaintError::Api { status, message: "empty error body".to_string() });
    }

    let parts = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();

    if parts.is_empty() {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(InpaintError::Blocked(reason));
        }
        return Err(InpaintError::NoContent);
    }

    if let Some(inline) = parts
        .iter()
        .filter_map(|p| p.inline_data.as_ref())
        .find(|d| !d.data.is_empty())
    {
        return Ok(GeneratedImage {
            bytes: BASE64.decode(inline.data.as_bytes())?,
            mime_type: inline.mime_type.clone(),
        });
    }

    if let Some(text) = parts.iter().filter_map(|p| p.text.as_deref()).find(|t| !t.trim().is_empty()) {
        return Err(InpaintError::ModelText(text.trim().to_string()));
    }

    Err(InpaintError::NoImage)
}

// -- Client ---------------------------------------------------------------

pub struct GeminiClient {
    config: ClientConfig,
    http: reqwest::blocking::Client,
}

impl GeminiClient {
    pub fn new(config: ClientConfig) -> Result<Self, InpaintError> {
        if config.api_key.trim().is_empty() {
            return Err(InpaintError::MissingApiKey);
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, http })
    }

    /// Replace the text inside `selection` with `new_text`. Single attempt.
    pub fn inpaint_text(
        &self,
        source: &SourceImage,
        selection: &BoundingBox,
        new_text: &str,
        mode: GuideMode,
    ) -> Result<GeneratedImage, InpaintError> {
        let guide = build_guide(mode, &source.rgba, selection);
        let guide_png = encode_png(&guide)?;
        let prompt = build_prompt(new_text, mode);
        let request = build_request(
            &prompt,
            source.mime_type,
            &source.bytes,
            &guide_png,
            self.config.image_size,
        );
        self.generate(&request)
    }

    fn generate(&self, request: &GenerateRequest) -> Result<GeneratedImage, InpaintError> {
        let started = Instant::now();
        log_info!(
            "generateContent model={} size={}",
            self.config.model,
            self.config.image_size.as_str()
        );
        let response = self
            .http
            .post(self.config.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(request)
            .send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        let result = parse_response(status, &body);
        match &result {
            Ok(img) => {
                log_info!(
                    "generateContent ok: {} bytes ({}) in {:.1}s",
                    img.bytes.len(),
                    img.mime_type,
                    started.elapsed().as_secs_f32()
                );
            }
            Err(e) => {
                log_err!("generateContent failed after {:.1}s: {}", started.elapsed().as_secs_f32(), e);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_has_prompt_source_and_guide_in_order() {
        let req = build_request("do it", "image/jpeg", b"src", b"guide", ImageSize::TwoK);
        let v = serde_json::to_value(&req).unwrap();
        let parts = &v["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "do it");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[1]["inlineData"]["data"], BASE64.encode(b"src"));
        assert_eq!(parts[2]["inlineData"]["mimeType"], "image/png");
        assert!(parts[0].get("inlineData").is_none());
        assert_eq!(v["generationConfig"]["imageConfig"]["imageSize"], "2K");
        assert_eq!(v["generationConfig"]["responseModalities"], json!(["TEXT", "IMAGE"]));
    }

    #[test]
    fn prompt_quotes_the_new_text() {
        let p = build_prompt("SALE 50%", GuideMode::VisualGuide);
        assert!(p.contains("replace the existing text with: \"SALE 50%\""));
        assert!(p.contains("GREEN"));
        let m = build_prompt("x", GuideMode::BinaryMask);
        assert!(m.contains("[Edit Mask]"));
    }

    #[test]
    fn first_inline_image_wins() {
        let body = json!({
            "candidates": [{ "content": { "parts": [
                { "text": "here you go" },
                { "inlineData": { "mimeType": "image/png", "data": BASE64.encode(b"img1") } },
                { "inlineData": { "mimeType": "image/png", "data": BASE64.encode(b"img2") } }
            ]}}]
        });
        let img = parse_response(200, &body.to_string()).unwrap();
        assert_eq!(img.bytes, b"img1");
        assert_eq!(img.mime_type, "image/png");
    }

    #[test]
    fn text_only_answer_is_an_error() {
        let body = json!({ "candidates": [{ "content": { "parts": [{ "text": " I can't do that " }] } }] });
        match parse_response(200, &body.to_string()) {
            Err(InpaintError::ModelText(t)) => assert_eq!(t, "I can't do that"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn empty_candidates() {
        assert!(matches!(parse_response(200, "{}"), Err(InpaintError::NoContent)));
        let blocked = json!({ "candidates": [], "promptFeedback": { "blockReason": "SAFETY" } });
        assert!(matches!(
            parse_response(200, &blocked.to_string()),
            Err(InpaintError::Blocked(r)) if r == "SAFETY"
        ));
        let no_parts = json!({ "candidates": [{ "content": { "parts": [{ "text": "" }] } }] });
        assert!(matches!(parse_response(200, &no_parts.to_string()), Err(InpaintError::NoImage)));
    }

    #[test]
    fn entity_not_found_means_bad_key() {
        let body = json!({ "error": { "code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND" } });
        assert!(matches!(
            parse_response(404, &body.to_string()),
            Err(InpaintError::InvalidApiKey(_))
        ));
    }

    #[test]
    fn rejected_key_message_and_401_mean_bad_key() {
        let not_valid = json!({ "error": {
            "code": 400,
            "message": "API key not valid. Please pass a valid API key.",
            "status": "INVALID_ARGUMENT"
        } });
        assert!(matches!(
            parse_response(400, &not_valid.to_string()),
            Err(InpaintError::InvalidApiKey(m)) if m.starts_with("API key not valid")
        ));

        let unauthenticated = json!({ "error": {
            "code": 401,
            "message": "Request had invalid authentication credentials.",
            "status": "UNAUTHENTICATED"
        } });
        assert!(matches!(
            parse_response(401, &unauthenticated.to_string()),
            Err(InpaintError::InvalidApiKey(_))
        ));

        // Body without a code falls back to the HTTP status.
        let bare = json!({ "error": { "message": "Unauthorized" } });
        assert!(matches!(
            parse_response(401, &bare.to_string()),
            Err(InpaintError::InvalidApiKey(_))
        ));
    }

    #[test]
    fn other_api_errors_keep_status() {
        let body = json!({ "error": { "code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED" } });
        match parse_response(429, &body.to_string()) {
            Err(InpaintError::Api { status, message }) => {
                assert_eq!(status, 429);
                assert_eq!(message, "Quota exceeded (RESOURCE_EXHAUSTED)");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            parse_response(502, "<html>bad gateway</html>"),
            Err(InpaintError::Api { status: 502, .. })
        ));
    }

    #[test]
    fn bad_base64_is_decode_error() {
        let body = json!({ "candidates": [{ "content": { "parts": [
            { "inlineData": { "mimeType": "image/png", "data": "!!!" } }
        ]}}]});
        assert!(matches!(parse_response(200, &body.to_string()), Err(InpaintError::Decode(_))));
    }

    #[test]
    fn url_and_key_checks() {
        let mut cfg = ClientConfig::new("k");
        cfg.endpoint = "http://localhost:9/v1/".into();
        cfg.model = "m".into();
        assert_eq!(cfg.url(), "http://localhost:9/v1/models/m:generateContent");
        assert!(matches!(GeminiClient::new(ClientConfig::new("  ")), Err(InpaintError::MissingApiKey)));
        assert_eq!(ImageSize::parse("4k"), Some(ImageSize::FourK));
    }
}
