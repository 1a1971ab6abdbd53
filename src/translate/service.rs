//! Translation pipeline orchestration.
//! settings → preconditions → cache → rate limiter → retry(transport) → cache.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::{PanelSettings, SettingsProvider, ENV_API_KEY};
use crate::metrics::{metric_names, MetricsRegistry, MetricsSummary};

use super::{
    CacheStats, RateLimitSnapshot, RateLimiter, RetryPolicy, TranslateError, TranslateRequest,
    TranslationCache, Transport,
};

/// Owns the cache and rate-limit state for one host. Share it behind an `Arc`;
/// every method takes `&self`.
pub struct TranslationService {
    transport: Arc<dyn Transport>,
    cache: TranslationCache,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
    settings_provider: Arc<dyn SettingsProvider>,
    settings: RwLock<PanelSettings>,
    metrics: Arc<MetricsRegistry>,
}

impl TranslationService {
    /// Build a service with default cache, limiter and retry settings.
    /// Settings are loaded from `settings_provider` immediately.
    pub fn new(
        transport: Arc<dyn Transport>,
        settings_provider: Arc<dyn SettingsProvider>,
    ) -> Self {
        let settings = settings_provider.load();
        Self {
            transport,
            cache: TranslationCache::default(),
            rate_limiter: RateLimiter::default(),
            retry: RetryPolicy::default(),
            settings_provider,
            settings: RwLock::new(settings),
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    pub fn with_cache(mut self, cache: TranslationCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Translate `text`. Missing languages fall back to the configured defaults.
    ///
    /// Blank text yields `""` without touching the cache or the network, but
    /// only once an API key is configured.
    pub async fn translate(
        &self,
        text: &str,
        source_lang: Option<&str>,
        target_lang: Option<&str>,
    ) -> Result<String, TranslateError> {
        let (request, api_key) = self.prepare(text, source_lang, target_lang)?;
        if request.text.trim().is_empty() {
            return Ok(String::new());
        }

        let key = request.cache_key();

        if let Some(hit) = self.cache.lookup(&key) {
            self.metrics.increment(metric_names::CACHE_HIT);
            debug!(
                source_lang = %request.source_lang,
                target_lang = %request.target_lang,
                "cache hit"
            );
            return Ok(hit);
        }
        self.metrics.increment(metric_names::CACHE_MISS);
        let span = self.metrics.span(metric_names::TRANSLATE_DONE);

        let wait = self.metrics.span(metric_names::RATE_LIMIT_WAIT);
        self.rate_limiter.acquire().await;
        wait.finish();

        let result = self
            .retry
            .execute(|| self.attempt(&request, &api_key))
            .await;
        let elapsed_us = span.finish();

        match result {
            Ok(translation) => {
                self.cache.store(key, translation.clone());
                info!(
                    source_lang = %request.source_lang,
                    target_lang = %request.target_lang,
                    elapsed_ms = elapsed_us / 1000.0,
                    "translation complete"
                );
                Ok(translation)
            }
            Err(e) => {
                if let TranslateError::QuotaExceeded(_) = e {
                    self.rate_limiter.report_quota_exceeded();
                }
                self.metrics.increment(metric_names::TRANSLATE_FAILED);
                warn!(
                    kind = ?e.kind(),
                    error = %e,
                    elapsed_ms = elapsed_us / 1000.0,
                    "translation failed"
                );
                Err(e)
            }
        }
    }

    /// Resolve languages and check the API key. No side effects.
    fn prepare(
        &self,
        text: &str,
        source_lang: Option<&str>,
        target_lang: Option<&str>,
    ) -> Result<(TranslateRequest, String), TranslateError> {
        let settings = self.settings.read();
        let api_key = settings.api_key().map(str::to_string).ok_or_else(|| {
            TranslateError::Configuration(format!(
                "set {ENV_API_KEY} or configure the panel's API key"
            ))
        })?;

        let request = TranslateRequest::new(
            text,
            resolve_lang(source_lang, &settings.default_source_lang),
            resolve_lang(target_lang, &settings.default_target_lang),
        );
        Ok((request, api_key))
    }

    async fn attempt(
        &self,
        request: &TranslateRequest,
        api_key: &str,
    ) -> Result<String, TranslateError> {
        self.metrics.increment(metric_names::TRANSPORT_ATTEMPTS);
        let span = self.metrics.span(metric_names::TRANSPORT_CALL);
        let result = self.transport.send(request, api_key).await;
        span.finish();
        result
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("translation cache cleared");
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Re-read settings from the provider (API key and default languages).
    pub fn refresh_api_key(&self) {
        let settings = self.settings_provider.load();
        info!(
            api_key_configured = settings.api_key().is_some(),
            source_lang = %settings.default_source_lang,
            target_lang = %settings.default_target_lang,
            "settings refreshed"
        );
        *self.settings.write() = settings;
    }

    pub fn has_api_key(&self) -> bool {
        self.settings.read().api_key().is_some()
    }

    pub fn rate_limit_snapshot(&self) -> RateLimitSnapshot {
        self.rate_limiter.snapshot()
    }

    pub fn metrics_summary(&self) -> MetricsSummary {
        self.metrics.summary()
    }
}

/// Blank language arguments count as unspecified.
fn resolve_lang(arg: Option<&str>, default: &str) -> String {
    arg.map(str::trim)
        .filter(|lang| !lang.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default.to_string())
}
