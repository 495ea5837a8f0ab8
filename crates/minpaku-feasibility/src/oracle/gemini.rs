use super::{OracleError, OracleResponse, ReasoningOracle, VisionOracle};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub endpoint: String,
}

impl GeminiSettings {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            timeout,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

/// Blocking client for the Gemini `generateContent` endpoint.
#[derive(Debug)]
pub struct GeminiClient {
    client: Client,
    settings: GeminiSettings,
}

impl GeminiClient {
    pub fn new(settings: GeminiSettings) -> Result<Self, OracleError> {
        if settings.api_key.trim().is_empty() {
            return Err(OracleError::Unavailable(
                "Gemini API key is not configured".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| OracleError::Unavailable(format!("http client init failed: {err}")))?;
        Ok(Self { client, settings })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.model
        )
    }

    fn send(&self, body: Value) -> Result<OracleResponse, OracleError> {
        let url = self.url();
        info!(model = %self.settings.model, "calling gemini");
        let resp = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, self.settings.api_key.as_str())
            .json(&body)
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let payload: GenerateContentResponse = resp.json()?;
        let response = payload.into_response()?;
        debug!(
            chars = response.text.chars().count(),
            sources = response.grounding_sources.len(),
            "gemini responded"
        );
        Ok(response)
    }
}

fn classify_status(status: StatusCode, body: String) -> OracleError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => OracleError::QuotaExhausted(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            OracleError::Unavailable(format!("{status}: {body}"))
        }
        _ => OracleError::from_message(format!("{status}: {body}")),
    }
}

impl ReasoningOracle for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<OracleResponse, OracleError> {
        self.send(json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        }))
    }

    fn generate_with_search(&self, prompt: &str) -> Result<OracleResponse, OracleError> {
        self.send(json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "tools": [{ "google_search": {} }]
        }))
    }
}

impl VisionOracle for GeminiClient {
    fn read_image(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
    ) -> Result<OracleResponse, OracleError> {
        self.send(json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    { "inline_data": { "mime_type": mime_type, "data": STANDARD.encode(image) } }
                ]
            }]
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    uri: Option<String>,
}

impl GenerateContentResponse {
    fn into_response(self) -> Result<OracleResponse, OracleError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            return Err(OracleError::EmptyResponse);
        };

        let text = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(OracleError::EmptyResponse);
        }

        let grounding_sources = candidate
            .grounding_metadata
            .map(|metadata| {
                metadata
                    .grounding_chunks
                    .into_iter()
                    .filter_map(|chunk| chunk.web.and_then(|web| web.uri))
                    .collect()
            })
            .unwrap_or_default();

        Ok(OracleResponse {
            text,
            grounding_sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_text_parts_and_collects_grounding_uris() {
        let payload: GenerateContentResponse = serde_json::from_str(
            r#"{
                "candidates": [{
                    "content": { "parts": [{ "text": "許可判定: 許可\n" }, { "text": "主な理由: 条例なし" }] },
                    "groundingMetadata": {
                        "groundingChunks": [
                            { "web": { "uri": "https://www.airbnb.jp/rooms/1", "title": "a" } },
                            { "retrievedContext": {} }
                        ]
                    }
                }]
            }"#,
        )
        .expect("payload parses");

        let response = payload.into_response().expect("candidate present");
        assert_eq!(response.text, "許可判定: 許可\n主な理由: 条例なし");
        assert_eq!(
            response.grounding_sources,
            vec!["https://www.airbnb.jp/rooms/1".to_string()]
        );
    }

    #[test]
    fn missing_candidates_is_empty_response() {
        let payload: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback": {}}"#).expect("payload parses");
        assert!(matches!(
            payload.into_response(),
            Err(OracleError::EmptyResponse)
        ));
    }

    #[test]
    fn status_codes_map_to_error_classes() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_quota());
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "bad key".into()),
            OracleError::Unavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "upstream".into()),
            OracleError::Request(_)
        ));
    }

    #[test]
    fn transport_errors_never_carry_the_api_key() {
        let mut settings =
            GeminiSettings::new("SECRETKEY123", "m", Duration::from_secs(2));
        settings.endpoint = "http://127.0.0.1:9".to_string();
        let client = GeminiClient::new(settings).expect("client builds");

        let err = client.generate("hi").expect_err("nothing listens on port 9");
        let text = err.to_string();
        assert!(!text.contains("SECRETKEY123"), "{text}");
        assert!(!text.contains("key="), "{text}");
    }

    #[test]
    fn rejects_blank_api_key() {
        let settings = GeminiSettings::new(" ", "gemini-2.0-flash", Duration::from_secs(1));
        assert!(matches!(
            GeminiClient::new(settings),
            Err(OracleError::Unavailable(_))
        ));
    }
}
