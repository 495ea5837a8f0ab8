//! Narrow interface over the external language and vision models.
//!
//! Every caller in the pipeline sees exactly `{text, grounding_sources}`
//! regardless of the provider's wire shape. Providers report failures as
//! [`OracleError`], classified so that callers can tell a session-permanent
//! condition (unconfigured, quota) from a transient one.

mod gate;
mod gemini;

pub use gate::GatedOracle;
pub use gemini::{GeminiClient, GeminiSettings};

use std::fmt::Debug;

/// Text produced by an oracle call, plus any URLs the provider reported as
/// search grounding for that text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleResponse {
    pub text: String,
    pub grounding_sources: Vec<String>,
}

impl OracleResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            grounding_sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle quota exhausted: {0}")]
    QuotaExhausted(String),
    #[error("oracle request failed: {0}")]
    Request(String),
    #[error("oracle returned no text")]
    EmptyResponse,
}

impl OracleError {
    /// Builds an error from a raw provider message, promoting it to
    /// [`OracleError::QuotaExhausted`] when the message signals rate limiting.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if signals_quota(&message) {
            Self::QuotaExhausted(message)
        } else {
            Self::Request(message)
        }
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExhausted(_))
    }

    /// Unavailable and quota conditions hold for the rest of the session.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::QuotaExhausted(_))
    }
}

/// The request URL is dropped so credentials sent as query parameters never
/// reach logs or response bodies.
impl From<reqwest::Error> for OracleError {
    fn from(value: reqwest::Error) -> Self {
        let value = value.without_url();
        if value.status().map(|status| status.as_u16()) == Some(429) {
            return Self::QuotaExhausted(value.to_string());
        }
        Self::from_message(value.to_string())
    }
}

impl From<serde_json::Error> for OracleError {
    fn from(value: serde_json::Error) -> Self {
        Self::Request(format!("malformed provider payload: {value}"))
    }
}

const QUOTA_MARKERS: &[&str] = &[
    "429",
    "quota",
    "rate limit",
    "rate_limit",
    "ratelimit",
    "resource_exhausted",
    "クォータ",
];

/// True when a provider message reports quota or rate exhaustion.
pub fn signals_quota(message: &str) -> bool {
    let lowered = message.to_lowercase();
    QUOTA_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// A successful reply that is really the provider's error sentence about
/// quota, e.g. `エラー: Gemini APIのクォータ制限に達しています`.
pub fn quota_reply(text: &str) -> bool {
    let text = text.trim();
    (text.starts_with("エラー") || text.starts_with("Gemini API")) && signals_quota(text)
}

/// Free-text reasoning model. `generate_with_search` asks the provider to
/// ground its answer in live web search; providers without that capability
/// fall back to a plain generation.
pub trait ReasoningOracle: Debug + Send + Sync {
    fn generate(&self, prompt: &str) -> Result<OracleResponse, OracleError>;

    fn generate_with_search(&self, prompt: &str) -> Result<OracleResponse, OracleError> {
        self.generate(prompt)
    }

    /// Reports a permanent failure the caller found in a reply body, so a
    /// session gate can stop further calls. Plain providers ignore it.
    fn disable(&self, _reason: &OracleError) {}
}

/// Vision-capable model used for flyer OCR.
pub trait VisionOracle: Debug + Send + Sync {
    fn read_image(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
    ) -> Result<OracleResponse, OracleError>;
}

impl<T: ReasoningOracle + ?Sized> ReasoningOracle for std::sync::Arc<T> {
    fn generate(&self, prompt: &str) -> Result<OracleResponse, OracleError> {
        (**self).generate(prompt)
    }

    fn generate_with_search(&self, prompt: &str) -> Result<OracleResponse, OracleError> {
        (**self).generate_with_search(prompt)
    }

    fn disable(&self, reason: &OracleError) {
        (**self).disable(reason)
    }
}

impl<T: VisionOracle + ?Sized> VisionOracle for std::sync::Arc<T> {
    fn read_image(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
    ) -> Result<OracleResponse, OracleError> {
        (**self).read_image(prompt, image, mime_type)
    }
}

/// Stand-in used when no model credentials are configured.
#[derive(Debug, Clone)]
pub struct DisabledOracle {
    reason: String,
}

impl DisabledOracle {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl ReasoningOracle for DisabledOracle {
    fn generate(&self, _prompt: &str) -> Result<OracleResponse, OracleError> {
        Err(OracleError::Unavailable(self.reason.clone()))
    }
}

impl VisionOracle for DisabledOracle {
    fn read_image(
        &self,
        _prompt: &str,
        _image: &[u8],
        _mime_type: &str,
    ) -> Result<OracleResponse, OracleError> {
        Err(OracleError::Unavailable(self.reason.clone()))
    }
}
