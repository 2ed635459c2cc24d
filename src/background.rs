//! Background removal: manual erase strokes or remote replacement.
//!
//! Two mutually exclusive paths act on the current photo:
//!
//! - **Manual**: [`erase_strokes`] paints circular dabs along each stroke,
//!   either clearing alpha or filling with opaque white. Synchronous.
//! - **Remote**: a [`BackgroundService`] sends the photo to an image-editing
//!   model asking for a plain white background. Asynchronous and fallible;
//!   on failure the caller keeps its current image and offers the manual path.
//!
//! The single-flight rule (at most one remote call outstanding, no manual
//! erase while it is pending) is enforced by the
//! [`pipeline`](crate::pipeline), not here.
//!
//! [`GeminiBackground`] talks to the Gemini `generateContent` REST endpoint:
//!
//! ```text
//! POST {endpoint}/models/{model}:generateContent
//! x-goog-api-key: <key>
//! { "contents": [{ "parts": [ { "inlineData": { "mimeType": "image/png", "data": <base64> } },
//!                             { "text": <prompt> } ] }] }
//! ```
//!
//! The first `inlineData` part of the first candidate is the result. A
//! candidate that answers with text only is a refusal.

use crate::config::BackgroundConfig;
use crate::imaging::{BufferError, ImageBuffer};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::Rgba;
use serde::Deserialize;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackgroundError {
    #[error("API key not found: set the {0} environment variable")]
    MissingApiKey(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Background service timed out")]
    Timeout,
    #[error("Background service returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Malformed response from background service: {0}")]
    MalformedResponse(String),
    #[error("Background service did not return an image: {0}")]
    Refused(String),
    #[error("Background service returned neither an image nor an explanation")]
    NoImage,
    #[error("Could not decode returned image: {0}")]
    Decode(String),
}

/// Asynchronous background replacement.
///
/// Implementations must leave `image` untouched and return a new buffer.
pub trait BackgroundService: Send + Sync {
    fn replace_background(
        &self,
        image: &ImageBuffer,
    ) -> impl Future<Output = Result<ImageBuffer, BackgroundError>> + Send;
}

// =============================================================================
// Manual erase
// =============================================================================

/// What erased pixels become.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EraseFill {
    /// Alpha cleared; prints as paper white.
    #[default]
    Transparent,
    /// Opaque white.
    White,
}

impl EraseFill {
    fn paint(self, pixel: &mut Rgba<u8>) {
        match self {
            EraseFill::Transparent => pixel.0[3] = 0,
            EraseFill::White => *pixel = Rgba([255, 255, 255, 255]),
        }
    }
}

impl FromStr for EraseFill {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "transparent" => Ok(EraseFill::Transparent),
            "white" => Ok(EraseFill::White),
            other => Err(format!(
                "unknown erase fill '{other}' (expected transparent or white)"
            )),
        }
    }
}

impl fmt::Display for EraseFill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EraseFill::Transparent => write!(f, "transparent"),
            EraseFill::White => write!(f, "white"),
        }
    }
}

/// A brush stroke: a polyline in photo pixel coordinates and a brush radius.
#[derive(Debug, Clone, PartialEq)]
pub struct EraseStroke {
    pub points: Vec<(f32, f32)>,
    pub radius: f32,
}

impl EraseStroke {
    /// A single dab.
    pub fn dab(x: f32, y: f32, radius: f32) -> Self {
        Self {
            points: vec![(x, y)],
            radius,
        }
    }
}

impl FromStr for EraseStroke {
    type Err = String;

    /// Parse `x,y,r` (one dab) or `x1,y1,x2,y2,...,r` (polyline).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|part| {
                let part = part.trim();
                part.parse::<f32>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| format!("'{part}' is not a number"))
            })
            .collect::<Result<Vec<f32>, String>>()?;

        if values.len() < 3 || values.len() % 2 == 0 {
            return Err(format!(
                "expected x,y[,x,y...],radius but got '{s}'"
            ));
        }
        let (coords, radius) = values.split_at(values.len() - 1);
        let radius = radius[0];
        if radius <= 0.0 {
            return Err(format!("brush radius must be positive, got {radius}"));
        }
        Ok(Self {
            points: coords.chunks_exact(2).map(|c| (c[0], c[1])).collect(),
            radius,
        })
    }
}

/// Paint `strokes` onto a copy of `image`.
///
/// Each segment is stamped with circular dabs every half radius, so fast
/// strokes leave no gaps. A pixel is erased when its center lies within the
/// brush radius of a dab.
pub fn erase_strokes(image: &ImageBuffer, strokes: &[EraseStroke], fill: EraseFill) -> ImageBuffer {
    let mut pixels = image.pixels().clone();
    let (width, height) = pixels.dimensions();

    let mut stamp = |cx: f32, cy: f32, radius: f32| {
        let r2 = radius * radius;
        let x0 = (cx - radius).floor().max(0.0) as u32;
        let y0 = (cy - radius).floor().max(0.0) as u32;
        let x1 = ((cx + radius).ceil().max(0.0) as u32).min(width);
        let y1 = ((cy + radius).ceil().max(0.0) as u32).min(height);
        for y in y0..y1 {
            for x in x0..x1 {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                if dx * dx + dy * dy <= r2 {
                    fill.paint(pixels.get_pixel_mut(x, y));
                }
            }
        }
    };

    for stroke in strokes.iter().filter(|s| s.radius > 0.0) {
        let step = (stroke.radius / 2.0).max(0.5);
        let mut points = stroke.points.iter().copied();
        let Some(mut prev) = points.next() else {
            continue;
        };
        stamp(prev.0, prev.1, stroke.radius);
        for next in points {
            let (dx, dy) = (next.0 - prev.0, next.1 - prev.1);
            let steps = ((dx * dx + dy * dy).sqrt() / step).ceil().max(1.0) as u32;
            for i in 1..=steps {
                let t = i as f32 / steps as f32;
                stamp(prev.0 + dx * t, prev.1 + dy * t, stroke.radius);
            }
            prev = next;
        }
    }

    log::debug!("erased {} stroke(s) with {fill} fill", strokes.len());
    ImageBuffer::from_rgba(pixels).unwrap_or_else(|_| image.clone())
}

// =============================================================================
// Remote replacement (Gemini)
// =============================================================================

/// Background replacement through the Gemini image-editing API.
pub struct GeminiBackground {
    client: reqwest::Client,
    api_key: String,
    url: String,
    prompt: String,
}

impl GeminiBackground {
    pub fn new(api_key: impl Into<String>, config: &BackgroundConfig) -> Result<Self, BackgroundError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackgroundError::Network(e.to_string()))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            url: generate_content_url(&config.endpoint, &config.model),
            prompt: config.prompt.clone(),
        })
    }

    /// Build a client with the key read from `config.api_key_env`.
    pub fn from_config(config: &BackgroundConfig) -> Result<Self, BackgroundError> {
        let key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| BackgroundError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(key, config)
    }

    fn request_body(&self, png: &[u8]) -> serde_json::Value {
        serde_json::json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": "image/png", "data": BASE64.encode(png) } },
                    { "text": self.prompt },
                ]
            }]
        })
    }
}

impl BackgroundService for GeminiBackground {
    async fn replace_background(&self, image: &ImageBuffer) -> Result<ImageBuffer, BackgroundError> {
        let png = image
            .encode_png()
            .map_err(|e| BackgroundError::Decode(e.to_string()))?;
        let body = self.request_body(&png);

        log::info!(
            "requesting background replacement for {}x{} photo",
            image.width(),
            image.height()
        );
        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(BackgroundError::Http {
                status: status.as_u16(),
                message: api_error_message(&bytes)
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string()),
            });
        }
        parse_generate_response(&bytes)
    }
}

fn generate_content_url(endpoint: &str, model: &str) -> String {
    format!(
        "{}/models/{}:generateContent",
        endpoint.trim_end_matches('/'),
        model
    )
}

fn map_transport_error(err: reqwest::Error) -> BackgroundError {
    if err.is_timeout() {
        BackgroundError::Timeout
    } else {
        BackgroundError::Network(err.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<u16>,
    message: String,
}

fn api_error_message(bytes: &[u8]) -> Option<String> {
    serde_json::from_slice::<GenerateResponse>(bytes)
        .ok()?
        .error
        .map(|e| e.message)
}

/// Turn a `generateContent` response body into the edited photo.
pub fn parse_generate_response(bytes: &[u8]) -> Result<ImageBuffer, BackgroundError> {
    let response: GenerateResponse = serde_json::from_slice(bytes)
        .map_err(|e| BackgroundError::MalformedResponse(e.to_string()))?;

    if let Some(error) = response.error {
        return Err(BackgroundError::Http {
            status: error.code.unwrap_or(0),
            message: error.message,
        });
    }

    let parts: Vec<&ResponsePart> = response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|c| c.parts.iter().collect())
        .unwrap_or_default();

    if let Some(inline) = parts.iter().find_map(|p| p.inline_data.as_ref()) {
        log::debug!(
            "received {} image",
            inline.mime_type.as_deref().unwrap_or("image/png")
        );
        let encoded = BASE64
            .decode(inline.data.trim())
            .map_err(|e| BackgroundError::MalformedResponse(format!("bad base64: {e}")))?;
        return ImageBuffer::from_encoded(&encoded).map_err(|e| match e {
            BufferError::Decode(msg) => BackgroundError::Decode(msg),
            other => BackgroundError::Decode(other.to_string()),
        });
    }

    if let Some(text) = parts.iter().find_map(|p| p.text.as_deref()) {
        return Err(BackgroundError::Refused(text.trim().to_string()));
    }
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(BackgroundError::Refused(format!("request blocked ({reason})")));
    }
    if let Some(reason) = response.candidates.first().and_then(|c| c.finish_reason.clone()) {
        return Err(BackgroundError::Refused(format!("generation stopped ({reason})")));
    }
    Err(BackgroundError::NoImage)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::test_helpers::{pixel_at, solid_image};
    use std::sync::Mutex;

    /// Mock service that records the size of every photo it is sent.
    /// Uses Mutex (not RefCell) so it is Sync like a real client.
    pub struct MockBackground {
        pub result: Result<ImageBuffer, BackgroundError>,
        pub calls: Mutex<Vec<(u32, u32)>>,
    }

    impl MockBackground {
        pub fn returning(image: ImageBuffer) -> Self {
            Self {
                result: Ok(image),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(error: BackgroundError) -> Self {
            Self {
                result: Err(error),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<(u32, u32)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl BackgroundService for MockBackground {
        async fn replace_background(
            &self,
            image: &ImageBuffer,
        ) -> Result<ImageBuffer, BackgroundError> {
            self.calls.lock().unwrap().push(image.dimensions());
            self.result.clone()
        }
    }

    fn inline_response(image: &ImageBuffer) -> Vec<u8> {
        let data = BASE64.encode(image.encode_png().unwrap());
        serde_json::json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Here is the edited image." },
                    { "inlineData": { "mimeType": "image/png", "data": data } }
                ]}
            }]
        })
        .to_string()
        .into_bytes()
    }

    // =========================================================================
    // Manual erase
    // =========================================================================

    #[test]
    fn erase_dab_clears_alpha_inside_radius_only() {
        let image = solid_image(20, 20, [10, 20, 30, 255]);
        let out = erase_strokes(&image, &[EraseStroke::dab(10.0, 10.0, 3.0)], EraseFill::Transparent);

        assert_eq!(pixel_at(&out, 10, 10)[3], 0);
        // Color channels are preserved under cleared alpha
        assert_eq!(&pixel_at(&out, 10, 10)[..3], &[10, 20, 30]);
        assert_eq!(pixel_at(&out, 0, 0), [10, 20, 30, 255]);
        assert_eq!(pixel_at(&out, 15, 10), [10, 20, 30, 255]);
        // Input untouched
        assert_eq!(pixel_at(&image, 10, 10), [10, 20, 30, 255]);
    }

    #[test]
    fn erase_white_fill_is_opaque_white() {
        let image = solid_image(10, 10, [0, 0, 0, 255]);
        let out = erase_strokes(&image, &[EraseStroke::dab(5.0, 5.0, 2.0)], EraseFill::White);
        assert_eq!(pixel_at(&out, 5, 5), [255, 255, 255, 255]);
        assert_eq!(pixel_at(&out, 0, 9), [0, 0, 0, 255]);
    }

    #[test]
    fn erase_polyline_leaves_no_gaps() {
        let image = solid_image(100, 10, [50, 50, 50, 255]);
        let stroke = EraseStroke {
            points: vec![(2.0, 5.0), (98.0, 5.0)],
            radius: 2.0,
        };
        let out = erase_strokes(&image, &[stroke], EraseFill::Transparent);
        for x in 2..98 {
            assert_eq!(pixel_at(&out, x, 5)[3], 0, "gap at x={x}");
        }
        assert_eq!(pixel_at(&out, 50, 0)[3], 255);
    }

    #[test]
    fn erase_strokes_off_image_are_clipped() {
        let image = solid_image(10, 10, [1, 2, 3, 255]);
        let out = erase_strokes(
            &image,
            &[EraseStroke::dab(-50.0, -50.0, 5.0), EraseStroke::dab(0.0, 0.0, 1.0)],
            EraseFill::Transparent,
        );
        assert_eq!(out.dimensions(), (10, 10));
        assert_eq!(pixel_at(&out, 0, 0)[3], 0);
        assert_eq!(pixel_at(&out, 5, 5)[3], 255);
    }

    #[test]
    fn parse_erase_stroke() {
        let dab: EraseStroke = "10, 20, 4".parse().unwrap();
        assert_eq!(dab, EraseStroke::dab(10.0, 20.0, 4.0));

        let line: EraseStroke = "0,0,10,10,2.5".parse().unwrap();
        assert_eq!(line.points, vec![(0.0, 0.0), (10.0, 10.0)]);
        assert_eq!(line.radius, 2.5);

        assert!("1,2".parse::<EraseStroke>().is_err());
        assert!("1,2,3,4".parse::<EraseStroke>().is_err());
        assert!("1,2,0".parse::<EraseStroke>().is_err());
        assert!("a,2,3".parse::<EraseStroke>().is_err());
    }

    #[test]
    fn parse_erase_fill() {
        assert_eq!("White".parse::<EraseFill>().unwrap(), EraseFill::White);
        assert_eq!("transparent".parse::<EraseFill>().unwrap(), EraseFill::Transparent);
        assert!("blue".parse::<EraseFill>().is_err());
    }

    // =========================================================================
    // Response parsing
    // =========================================================================

    #[test]
    fn parse_response_returns_first_inline_image() {
        let edited = solid_image(4, 5, [255, 255, 255, 255]);
        let out = parse_generate_response(&inline_response(&edited)).unwrap();
        assert_eq!(out, edited);
    }

    #[test]
    fn parse_response_text_only_is_refusal() {
        let body = br#"{"candidates":[{"content":{"parts":[{"text":"I can't edit photos of people."}]}}]}"#;
        let err = parse_generate_response(body).unwrap_err();
        assert_eq!(
            err,
            BackgroundError::Refused("I can't edit photos of people.".into())
        );
    }

    #[test]
    fn parse_response_blocked_prompt_is_refusal() {
        let body = br#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let err = parse_generate_response(body).unwrap_err();
        assert!(matches!(err, BackgroundError::Refused(msg) if msg.contains("SAFETY")));
    }

    #[test]
    fn parse_response_error_object() {
        let body = br#"{"error":{"code":403,"message":"API key not valid","status":"PERMISSION_DENIED"}}"#;
        assert_eq!(
            parse_generate_response(body).unwrap_err(),
            BackgroundError::Http {
                status: 403,
                message: "API key not valid".into()
            }
        );
        assert_eq!(api_error_message(body).as_deref(), Some("API key not valid"));
    }

    #[test]
    fn parse_response_empty_is_no_image() {
        assert_eq!(
            parse_generate_response(br#"{"candidates":[]}"#).unwrap_err(),
            BackgroundError::NoImage
        );
    }

    #[test]
    fn parse_response_garbage() {
        assert!(matches!(
            parse_generate_response(b"<html>").unwrap_err(),
            BackgroundError::MalformedResponse(_)
        ));
        let body = br#"{"candidates":[{"content":{"parts":[{"inlineData":{"mimeType":"image/png","data":"bm90IGFuIGltYWdl"}}]}}]}"#;
        assert!(matches!(
            parse_generate_response(body).unwrap_err(),
            BackgroundError::Decode(_)
        ));
    }

    // =========================================================================
    // Request construction
    // =========================================================================

    #[test]
    fn url_joins_endpoint_and_model() {
        assert_eq!(
            generate_content_url("https://example.test/v1beta/", "m-1"),
            "https://example.test/v1beta/models/m-1:generateContent"
        );
    }

    #[test]
    fn request_body_carries_image_and_prompt() {
        let config = BackgroundConfig::default();
        let service = GeminiBackground::new("key", &config).unwrap();
        let body = service.request_body(b"png-bytes");
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[0]["inlineData"]["data"], BASE64.encode(b"png-bytes"));
        assert_eq!(parts[1]["text"], config.prompt.as_str());
    }

    #[test]
    fn from_config_without_key_fails() {
        let config = BackgroundConfig {
            api_key_env: "PHOTO_SHEET_TEST_UNSET_KEY_VAR".into(),
            ..BackgroundConfig::default()
        };
        assert!(matches!(
            GeminiBackground::from_config(&config),
            Err(BackgroundError::MissingApiKey(var)) if var == "PHOTO_SHEET_TEST_UNSET_KEY_VAR"
        ));
    }

    // =========================================================================
    // Service trait
    // =========================================================================

    #[tokio::test]
    async fn mock_service_records_calls() {
        let mock = MockBackground::returning(solid_image(3, 3, [255, 255, 255, 255]));
        let input = solid_image(3, 3, [9, 9, 9, 255]);
        let out = mock.replace_background(&input).await.unwrap();
        assert_eq!(pixel_at(&out, 1, 1), [255, 255, 255, 255]);
        assert_eq!(mock.calls(), vec![(3, 3)]);
    }
}
