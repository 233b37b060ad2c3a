use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::llm::generator::{GenerationError, GenerationRequest, ImageGenerator};
use crate::llm::media::ImageRef;
use crate::studio::types::AspectRatio;
use crate::utils::http::build_http_client;
use crate::utils::timing::log_llm_timing;

const DEFAULT_SOURCE_MIME_TYPE: &str = "image/png";
const DEFAULT_RESULT_MIME_TYPE: &str = "image/png";

#[derive(Debug, Clone)]
pub struct GeminiImageSettings {
    pub api_key: String,
    pub model: String,
    pub api_base: Url,
    pub timeout: Duration,
}

impl GeminiImageSettings {
    pub fn from_config(config: &Config) -> Self {
        GeminiImageSettings {
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_image_model.clone(),
            api_base: config.gemini_api_base.clone(),
            timeout: config.gemini_request_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    Text {
        text: String,
    },
    Other(Value),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    data: String,
}

/// Studio photo instruction. Persona and pose labels are embedded verbatim.
pub fn compose_fashion_prompt(persona_label: &str, pose_label: &str) -> String {
    format!(
        "High-end professional fashion photography.\n\
         The model persona is {persona_label}.\n\
         The model is posing in a {pose_label} style.\n\
         The model must be wearing the clothing item from the attached image.\n\
         \n\
         Environment: Professional boutique studio, soft neutral background, cinematic lighting.\n\
         Quality: 8K resolution, realistic fabric textures, perfect lighting integration.\n\
         No text, no watermarks. Focus on a clean, luxury fashion aesthetic."
    )
}

fn build_generation_payload(
    source: &ImageRef,
    prompt: &str,
    aspect_ratio: AspectRatio,
) -> Value {
    let mime_type = source
        .mime_type()
        .filter(|mime| mime.starts_with("image/"))
        .unwrap_or(DEFAULT_SOURCE_MIME_TYPE);

    json!({
        "contents": [{
            "role": "user",
            "parts": [
                {
                    "inlineData": {
                        "mimeType": mime_type,
                        "data": source.payload()
                    }
                },
                { "text": prompt }
            ]
        }],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"],
            "imageConfig": { "aspectRatio": aspect_ratio.as_str() }
        }
    })
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_parts(parts: &[Value]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| {
            if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                json!({ "text": truncate_for_log(text, 200) })
            } else if let Some(inline_data) = part.get("inlineData") {
                let mime_type = inline_data
                    .get("mimeType")
                    .and_then(|value| value.as_str())
                    .unwrap_or("unknown");
                let data_len = inline_data
                    .get("data")
                    .and_then(|value| value.as_str())
                    .map(|value| value.len())
                    .unwrap_or(0);
                json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
            } else {
                json!({ "unknownPart": true })
            }
        })
        .collect()
}

fn summarize_payload(payload: &Value) -> Value {
    let mut summary = Map::new();

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let summarized_contents: Vec<Value> = contents
            .iter()
            .map(|content| {
                let parts = content
                    .get("parts")
                    .and_then(|value| value.as_array())
                    .map(|parts| summarize_parts(parts))
                    .unwrap_or_default();
                json!({ "parts": parts })
            })
            .collect();
        summary.insert("contents".to_string(), Value::Array(summarized_contents));
    }

    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }

    Value::Object(summary)
}

fn summarize_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut text_preview = None;
    let mut other_part_keys: Vec<String> = Vec::new();

    let candidates = response.candidates.as_deref().unwrap_or(&[]);
    for part in candidates
        .iter()
        .filter_map(|candidate| candidate.content.as_ref())
        .filter_map(|content| content.parts.as_ref())
        .flatten()
    {
        match part {
            GeminiPart::Text { text } => {
                text_parts += 1;
                if text_preview.is_none() && !text.trim().is_empty() {
                    text_preview = Some(truncate_for_log(text, 200));
                }
            }
            GeminiPart::InlineData { .. } => image_parts += 1,
            GeminiPart::Other(value) => {
                if let Some(object) = value.as_object() {
                    other_part_keys.extend(object.keys().cloned());
                }
            }
        }
    }

    json!({
        "candidates": candidates.len(),
        "textParts": text_parts,
        "imageParts": image_parts,
        "textPreview": text_preview,
        "otherPartKeys": other_part_keys
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

/// First inline image across candidates, in response order.
fn extract_first_image(response: GeminiResponse) -> Option<ImageRef> {
    response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .filter_map(|content| content.parts)
        .flatten()
        .find_map(|part| match part {
            GeminiPart::InlineData { inline_data } => {
                let data = inline_data.data.trim();
                if data.is_empty() {
                    return None;
                }
                let mime_type = inline_data.mime_type.trim();
                if mime_type.is_empty() {
                    Some(ImageRef::from_base64(DEFAULT_RESULT_MIME_TYPE, data))
                } else if mime_type.starts_with("image/") {
                    Some(ImageRef::from_base64(mime_type, data))
                } else {
                    None
                }
            }
            _ => None,
        })
}

/// Configured once at startup and handed to the studio.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    settings: GeminiImageSettings,
}

impl GeminiClient {
    pub fn new(settings: GeminiImageSettings) -> Result<Self> {
        let http = build_http_client(settings.timeout).context("Failed to build HTTP client")?;
        Ok(GeminiClient { http, settings })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(GeminiImageSettings::from_config(config))
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn redact(&self, text: &str) -> String {
        let key = self.settings.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }

    fn endpoint(&self) -> Result<Url, GenerationError> {
        let mut base = self.settings.api_base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(&format!(
            "v1beta/models/{}:generateContent",
            self.settings.model
        ))
        .map_err(|err| GenerationError::Failed(format!("Invalid Gemini endpoint: {err}")))
    }

    async fn call_api(&self, payload: Value) -> Result<GeminiResponse, GenerationError> {
        let url = self.endpoint()?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            let payload_summary = summarize_payload(&payload);
            debug!(target: "llm.gemini", model = %self.settings.model, payload = %payload_summary);
        }

        let response = self
            .http
            .post(url)
            .timeout(self.settings.timeout)
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                let err_text = self.redact(&err.to_string());
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={}, status={:?})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect(),
                    err.status()
                );
                GenerationError::Failed(format!("Gemini request failed: {err_text}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!("Gemini API error: status={}, body={}", status, body_summary);
            let detail = self.redact(&message.unwrap_or(body_summary));
            return Err(GenerationError::Failed(format!(
                "Gemini request failed with status {status}: {detail}"
            )));
        }

        let value = response.json::<GeminiResponse>().await.map_err(|err| {
            GenerationError::Failed(format!(
                "Gemini response could not be parsed: {}",
                self.redact(&err.to_string())
            ))
        })?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            let response_summary = summarize_response(&value);
            debug!(target: "llm.gemini", model = %self.settings.model, response = %response_summary);
        }
        Ok(value)
    }

    pub async fn generate_model_photo(
        &self,
        request: GenerationRequest,
    ) -> Result<ImageRef, GenerationError> {
        let prompt = compose_fashion_prompt(&request.persona_label, &request.pose_label);
        let payload = build_generation_payload(&request.source_image, &prompt, request.aspect_ratio);
        let metadata = json!({ "aspectRatio": request.aspect_ratio.as_str() });
        let model = self.settings.model.as_str();

        log_llm_timing("gemini", model, "generate_model_photo", Some(metadata), || async {
            let response = self.call_api(payload).await?;
            extract_first_image(response).ok_or_else(|| GenerationError::EmptyResult {
                model: model.to_string(),
            })
        })
        .await
    }
}

impl ImageGenerator for GeminiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<ImageRef, GenerationError> {
        self.generate_model_photo(request).await
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::*;

    fn parse_response(value: Value) -> GeminiResponse {
        serde_json::from_value(value).unwrap()
    }

    fn settings_for(api_base: &str) -> GeminiImageSettings {
        GeminiImageSettings {
            api_key: "test-key-123".to_string(),
            model: "gemini-2.5-flash-image".to_string(),
            api_base: Url::parse(api_base).unwrap(),
            timeout: Duration::from_secs(5),
        }
    }

    fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
    }

    /// Serves exactly one HTTP exchange and hands back the raw request.
    async fn serve_once(status_line: &'static str, body: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 8192];
            loop {
                let read = socket.read(&mut chunk).await.unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..read]);
                if let Some(header_end) = find_subsequence(&request, b"\r\n\r\n") {
                    let headers = String::from_utf8_lossy(&request[..header_end]).to_lowercase();
                    let content_length = headers
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|value| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });
        (base, handle)
    }

    fn sample_request() -> GenerationRequest {
        GenerationRequest {
            source_image: ImageRef::from_bytes("image/jpeg", b"garment-bytes"),
            persona_label: "Minimalist Nötr".to_string(),
            pose_label: "Klasik Ön Poz".to_string(),
            aspect_ratio: AspectRatio::Portrait3x4,
        }
    }

    #[test]
    fn prompt_embeds_persona_and_pose_verbatim() {
        let prompt = compose_fashion_prompt("Avangart Stil", "Omuz Üstü Bakış");
        assert!(prompt.contains("The model persona is Avangart Stil."));
        assert!(prompt.contains("posing in a Omuz Üstü Bakış style"));
        assert!(prompt.contains("clothing item from the attached image"));
        assert!(prompt.contains("boutique studio"));
        assert!(prompt.contains("No text, no watermarks"));
    }

    #[test]
    fn payload_carries_raw_base64_and_ratio() {
        let source = ImageRef::from_bytes("image/jpeg", b"abc");
        let payload = build_generation_payload(&source, "prompt", AspectRatio::Story9x16);

        let inline = &payload["contents"][0]["parts"][0]["inlineData"];
        assert_eq!(inline["data"], "YWJj");
        assert_eq!(inline["mimeType"], "image/jpeg");
        assert_eq!(payload["contents"][0]["parts"][1]["text"], "prompt");
        assert_eq!(
            payload["generationConfig"]["imageConfig"]["aspectRatio"],
            "9:16"
        );
    }

    #[test]
    fn payload_declares_png_when_source_has_no_mime() {
        let source = ImageRef::from_data_uri("YWJj");
        let payload = build_generation_payload(&source, "prompt", AspectRatio::Square1x1);
        assert_eq!(
            payload["contents"][0]["parts"][0]["inlineData"]["mimeType"],
            "image/png"
        );
        assert_eq!(payload["contents"][0]["parts"][0]["inlineData"]["data"], "YWJj");
    }

    #[test]
    fn extracts_first_inline_image_after_text() {
        let response = parse_response(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Here is your photo" },
                    { "inlineData": { "mimeType": "image/png", "data": "Rmlyc3Q=" } },
                    { "inlineData": { "mimeType": "image/png", "data": "U2Vjb25k" } }
                ]}
            }]
        }));
        let image = extract_first_image(response).unwrap();
        assert_eq!(image.as_str(), "data:image/png;base64,Rmlyc3Q=");
    }

    #[test]
    fn skips_empty_and_non_image_inline_parts() {
        let response = parse_response(json!({
            "candidates": [{
                "content": { "parts": [
                    { "inlineData": { "mimeType": "image/png", "data": "" } },
                    { "inlineData": { "mimeType": "application/pdf", "data": "JVBERg==" } },
                    { "thoughtSignature": "abc" },
                    { "inlineData": { "mimeType": "image/jpeg", "data": "SlBFRw==" } }
                ]}
            }]
        }));
        let image = extract_first_image(response).unwrap();
        assert_eq!(image.mime_type(), Some("image/jpeg"));
    }

    #[test]
    fn text_only_response_has_no_image() {
        let response = parse_response(json!({
            "candidates": [{ "content": { "parts": [{ "text": "I cannot do that." }] } }]
        }));
        assert!(extract_first_image(response).is_none());
        assert!(extract_first_image(parse_response(json!({}))).is_none());
    }

    #[test]
    fn error_body_summary_prefers_api_message() {
        let (message, _) =
            summarize_error_body(r#"{"error":{"code":403,"message":"API key not valid"}}"#);
        assert_eq!(message.as_deref(), Some("API key not valid"));

        let (message, summary) = summarize_error_body("   ");
        assert!(message.is_none());
        assert_eq!(summary, "empty response body");
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let client = GeminiClient::new(settings_for("http://localhost:9000/proxy")).unwrap();
        assert_eq!(
            client.endpoint().unwrap().as_str(),
            "http://localhost:9000/proxy/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
    }

    #[test]
    fn redacts_api_key_from_messages() {
        let client = GeminiClient::new(settings_for("http://localhost:9000")).unwrap();
        assert_eq!(
            client.redact("bad key test-key-123 rejected"),
            "bad key [redacted] rejected"
        );
    }

    #[tokio::test]
    async fn generate_posts_inline_image_and_returns_generated_one() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "done" },
                    { "inlineData": { "mimeType": "image/png", "data": "R0VORVJBVEVE" } }
                ]}
            }]
        })
        .to_string();
        let (base, server) = serve_once("HTTP/1.1 200 OK", body).await;
        let client = GeminiClient::new(settings_for(&base)).unwrap();
        let request = sample_request();

        let image = client.generate(request.clone()).await.unwrap();
        assert_eq!(image.as_str(), "data:image/png;base64,R0VORVJBVEVE");
        assert_ne!(image.payload(), request.source_image.payload());

        let raw_request = server.await.unwrap();
        assert!(raw_request
            .starts_with("POST /v1beta/models/gemini-2.5-flash-image:generateContent"));
        assert!(raw_request.to_lowercase().contains("x-goog-api-key: test-key-123"));
        assert!(raw_request.contains(request.source_image.payload()));
        assert!(!raw_request.contains("data:image/jpeg;base64,"));
        assert!(raw_request.contains("\"aspectRatio\":\"3:4\""));
    }

    #[tokio::test]
    async fn response_without_image_is_empty_result() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "no image today" }] } }]
        })
        .to_string();
        let (base, server) = serve_once("HTTP/1.1 200 OK", body).await;
        let client = GeminiClient::new(settings_for(&base)).unwrap();

        let err = client.generate(sample_request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::EmptyResult { .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn service_error_is_generation_failed_with_cause() {
        let body = json!({ "error": { "code": 403, "message": "API key not valid" } }).to_string();
        let (base, server) = serve_once("HTTP/1.1 403 Forbidden", body).await;
        let client = GeminiClient::new(settings_for(&base)).unwrap();

        let err = client.generate(sample_request()).await.unwrap_err();
        match err {
            GenerationError::Failed(cause) => {
                assert!(cause.contains("403"));
                assert!(cause.contains("API key not valid"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connection_failure_is_generation_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = GeminiClient::new(settings_for(&base)).unwrap();
        let err = client.generate(sample_request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Failed(_)));
    }
}
