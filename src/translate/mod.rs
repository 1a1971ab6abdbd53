//! Translation pipeline: cache → rate limiter → retry → DeepL transport.
//! `TranslationService` ties the pieces together; the submodules are usable
//! on their own for hosts that want a different arrangement.

pub mod cache;
pub mod deepl;
pub mod rate_limit;
pub mod retry;
pub mod service;

#[cfg(test)]
pub(crate) mod mock;

use serde::Serialize;
use thiserror::Error;

pub use cache::{CacheStats, TranslationCache};
pub use deepl::{DeepLClient, Transport};
pub use rate_limit::{RateLimitSnapshot, RateLimiter};
pub use retry::RetryPolicy;
pub use service::TranslationService;

/// A single translation request after language defaults have been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateRequest {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
}

impl TranslateRequest {
    pub fn new(
        text: impl Into<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
        }
    }

    /// Cache key for this request.
    pub fn cache_key(&self) -> [u8; 32] {
        TranslationCache::compute_key(&self.source_lang, &self.target_lang, &self.text)
    }
}

/// Classification tag used by the retry controller and the panel bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    Configuration,
    Unauthorized,
    QuotaExceeded,
    Transient,
    Other,
}

/// Every failure the pipeline can hand back to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    /// API key missing or blank. Raised before any cache, limiter or network work.
    #[error("DeepL API key is not configured: {0}")]
    Configuration(String),

    /// The provider rejected the key (401/403).
    #[error("Invalid DeepL API key: {0}")]
    Unauthorized(String),

    /// The provider reported quota exhaustion (429/456).
    #[error("DeepL API quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Timeout or server error on a single attempt. Only seen by the retry
    /// controller; callers get `RetriesExhausted` instead.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("Translation request timed out after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Translation failed: {0}")]
    Other(String),
}

impl TranslateError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TranslateError::Configuration(_) => FailureKind::Configuration,
            TranslateError::Unauthorized(_) => FailureKind::Unauthorized,
            TranslateError::QuotaExceeded(_) => FailureKind::QuotaExceeded,
            TranslateError::Transient(_) | TranslateError::RetriesExhausted { .. } => {
                FailureKind::Transient
            }
            TranslateError::Other(_) => FailureKind::Other,
        }
    }

    /// Whether another attempt may succeed.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, TranslateError::Transient(_))
    }
}
