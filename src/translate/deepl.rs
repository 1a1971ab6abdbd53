//! DeepL API transport.
//! One form-encoded POST per call with a 10s timeout. Provider status codes
//! are mapped into `TranslateError` here; retrying is the caller's job.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{TranslateError, TranslateRequest};

pub const DEEPL_FREE_API_URL: &str = "https://api-free.deepl.com/v2/translate";
pub const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// DeepL answers 456 when the account's character quota is used up.
const STATUS_QUOTA_EXCEEDED: u16 = 456;
const BODY_EXCERPT_CHARS: usize = 200;

/// A single network attempt. Implementations must not retry internally.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &TranslateRequest, api_key: &str)
        -> Result<String, TranslateError>;
}

/// reqwest-backed DeepL client with pooled connections.
pub struct DeepLClient {
    http: reqwest::Client,
    endpoint: String,
}

impl DeepLClient {
    /// Client for the DeepL free API endpoint.
    pub fn new() -> Result<Self, TranslateError> {
        Self::with_endpoint(DEEPL_FREE_API_URL, TRANSPORT_TIMEOUT)
    }

    pub fn with_endpoint(
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TranslateError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(timeout)
            .build()
            .map_err(|e| TranslateError::Other(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Transport for DeepLClient {
    #[instrument(
        skip(self, request, api_key),
        fields(
            source_lang = %request.source_lang,
            target_lang = %request.target_lang,
            chars = request.text.chars().count()
        )
    )]
    async fn send(
        &self,
        request: &TranslateRequest,
        api_key: &str,
    ) -> Result<String, TranslateError> {
        let form = [
            ("text", request.text.as_str()),
            ("source_lang", request.source_lang.as_str()),
            ("target_lang", request.target_lang.as_str()),
            ("auth_key", api_key),
        ];

        let response = self
            .http
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body_text));
        }

        let body: DeepLResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                TranslateError::Transient("response body timed out".into())
            } else {
                debug!(error = %e, "undecodable DeepL response");
                TranslateError::Other("No translation found in response".into())
            }
        })?;

        first_translation(body)
    }
}

fn classify_send_error(e: reqwest::Error) -> TranslateError {
    if e.is_timeout() {
        TranslateError::Transient("Translation request timed out".into())
    } else {
        TranslateError::Other(e.to_string())
    }
}

/// Map a non-success HTTP status to the pipeline's failure taxonomy.
pub fn classify_status(status: StatusCode, body: &str) -> TranslateError {
    let reason = status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_u16().to_string());

    match status.as_u16() {
        401 | 403 => TranslateError::Unauthorized(format!(
            "{reason}. Please check your configuration."
        )),
        429 | STATUS_QUOTA_EXCEEDED => TranslateError::QuotaExceeded(format!(
            "HTTP {}. Please check your usage.",
            status.as_u16()
        )),
        code if code >= 500 => TranslateError::Transient(format!("server error: {status}")),
        _ => {
            let excerpt: String = body.chars().take(BODY_EXCERPT_CHARS).collect();
            if excerpt.trim().is_empty() {
                TranslateError::Other(reason)
            } else {
                TranslateError::Other(format!("{reason}: {}", excerpt.trim()))
            }
        }
    }
}

fn first_translation(body: DeepLResponse) -> Result<String, TranslateError> {
    body.translations
        .into_iter()
        .next()
        .map(|t| {
            if let Some(lang) = t.detected_source_language.as_deref() {
                debug!(detected_source_language = lang, "translation received");
            }
            t.text
        })
        .ok_or_else(|| TranslateError::Other("No translation found in response".into()))
}

// --- Response types ---

#[derive(Debug, Deserialize)]
struct DeepLResponse {
    #[serde(default)]
    translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslation {
    text: String,
    detected_source_language: Option<String>,
}
