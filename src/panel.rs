//! Message bridge between the editor panel and the translation pipeline.
//! The webview posts `PanelMessage`s; the worker loop answers with
//! `PanelEvent`s. Both serialize as JSON objects tagged by `command`.
//!
//! Every `translate` message produces `translating` followed by exactly one
//! of `translationResult` or `translationError`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::translate::{FailureKind, TranslationService};

/// Inbound messages from the panel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum PanelMessage {
    Translate {
        text: String,
        #[serde(default, rename = "sourceLang")]
        source_lang: Option<String>,
        #[serde(default, rename = "targetLang")]
        target_lang: Option<String>,
        /// Echoed back on every event for this request. Generated when absent.
        #[serde(default, rename = "requestId")]
        request_id: Option<String>,
    },
    ClearCache,
    GetCacheStats,
    RefreshApiKey,
}

impl PanelMessage {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Outbound status notifications to the panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum PanelEvent {
    Translating {
        #[serde(rename = "requestId")]
        request_id: String,
    },
    TranslationResult {
        #[serde(rename = "requestId")]
        request_id: String,
        translation: String,
    },
    TranslationError {
        #[serde(rename = "requestId")]
        request_id: String,
        kind: FailureKind,
        error: String,
    },
    CacheStats {
        size: usize,
        #[serde(rename = "maxSize")]
        max_size: usize,
    },
    CacheCleared,
    ApiKeyRefreshed {
        configured: bool,
    },
}

impl PanelEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Spawn the panel worker loop.
///
/// Translations run on their own tasks, so a request parked in the rate
/// limiter does not hold up cache or settings commands. When `inbound`
/// closes, the loop waits for in-flight translations and then exits.
pub fn run_panel_loop(
    service: Arc<TranslationService>,
    mut inbound: mpsc::Receiver<PanelMessage>,
    outbound: mpsc::Sender<PanelEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("panel loop started");
        let mut in_flight = JoinSet::new();

        loop {
            let message = tokio::select! {
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "translation task panicked");
                    }
                    continue;
                }
                message = inbound.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            match message {
                PanelMessage::Translate {
                    text,
                    source_lang,
                    target_lang,
                    request_id,
                } => {
                    let request_id =
                        request_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                    let service = Arc::clone(&service);
                    let outbound = outbound.clone();
                    in_flight.spawn(async move {
                        handle_translate(
                            &service,
                            &outbound,
                            request_id,
                            &text,
                            source_lang.as_deref(),
                            target_lang.as_deref(),
                        )
                        .await;
                    });
                }
                PanelMessage::ClearCache => {
                    service.clear_cache();
                    emit(&outbound, PanelEvent::CacheCleared).await;
                }
                PanelMessage::GetCacheStats => {
                    let stats = service.cache_stats();
                    emit(
                        &outbound,
                        PanelEvent::CacheStats {
                            size: stats.size,
                            max_size: stats.max_size,
                        },
                    )
                    .await;
                }
                PanelMessage::RefreshApiKey => {
                    service.refresh_api_key();
                    emit(
                        &outbound,
                        PanelEvent::ApiKeyRefreshed {
                            configured: service.has_api_key(),
                        },
                    )
                    .await;
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "translation task panicked");
            }
        }
        info!("panel loop exiting");
    })
}

async fn handle_translate(
    service: &TranslationService,
    outbound: &mpsc::Sender<PanelEvent>,
    request_id: String,
    text: &str,
    source_lang: Option<&str>,
    target_lang: Option<&str>,
) {
    emit(
        outbound,
        PanelEvent::Translating {
            request_id: request_id.clone(),
        },
    )
    .await;

    let event = match service.translate(text, source_lang, target_lang).await {
        Ok(translation) => {
            debug!(request_id = %request_id, "translation delivered");
            PanelEvent::TranslationResult {
                request_id,
                translation,
            }
        }
        Err(e) => PanelEvent::TranslationError {
            request_id,
            kind: e.kind(),
            error: e.to_string(),
        },
    };
    emit(outbound, event).await;
}

async fn emit(outbound: &mpsc::Sender<PanelEvent>, event: PanelEvent) {
    if outbound.send(event).await.is_err() {
        warn!("panel event channel closed, dropping event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PanelSettings, StaticSettingsProvider};
    use crate::translate::mock::MockTransport;
    use crate::translate::{TranslateError, Transport};
    use pretty_assertions::assert_eq;

    fn setup(
        key: Option<&str>,
    ) -> (
        Arc<MockTransport>,
        StaticSettingsProvider,
        mpsc::Sender<PanelMessage>,
        mpsc::Receiver<PanelEvent>,
        JoinHandle<()>,
    ) {
        let transport = Arc::new(MockTransport::default());
        let mut settings = PanelSettings::default();
        if let Some(key) = key {
            settings = settings.with_api_key(key);
        }
        let provider = StaticSettingsProvider::new(settings);
        let service = Arc::new(TranslationService::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(provider.clone()),
        ));
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, out_rx) = mpsc::channel(64);
        let handle = run_panel_loop(service, in_rx, out_tx);
        (transport, provider, in_tx, out_rx, handle)
    }

    async fn drain(
        in_tx: mpsc::Sender<PanelMessage>,
        mut out_rx: mpsc::Receiver<PanelEvent>,
        handle: JoinHandle<()>,
    ) -> Vec<PanelEvent> {
        drop(in_tx);
        handle.await.unwrap();
        let mut events = Vec::new();
        while let Ok(event) = out_rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn translate(text: &str, id: &str) -> PanelMessage {
        PanelMessage::Translate {
            text: text.into(),
            source_lang: Some("JA".into()),
            target_lang: Some("EN".into()),
            request_id: Some(id.into()),
        }
    }

    #[test]
    fn test_parse_translate_message() {
        let msg = PanelMessage::from_json(
            r#"{"command":"translate","text":"こんにちは","sourceLang":"JA","targetLang":"EN"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            PanelMessage::Translate {
                text: "こんにちは".into(),
                source_lang: Some("JA".into()),
                target_lang: Some("EN".into()),
                request_id: None,
            }
        );
        assert_eq!(
            PanelMessage::from_json(r#"{"command":"clearCache"}"#).unwrap(),
            PanelMessage::ClearCache
        );
        assert!(PanelMessage::from_json(r#"{"command":"explode"}"#).is_err());
    }

    #[test]
    fn test_event_json_shape() {
        let json = PanelEvent::TranslationResult {
            request_id: "r1".into(),
            translation: "Hello".into(),
        }
        .to_json()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "command": "translationResult",
                "requestId": "r1",
                "translation": "Hello"
            })
        );

        let json = PanelEvent::CacheStats {
            size: 3,
            max_size: 1000,
        }
        .to_json()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"command": "cacheStats", "size": 3, "maxSize": 1000})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_translate_emits_translating_then_result() {
        let (transport, _, in_tx, out_rx, handle) = setup(Some("key"));
        transport.queue(Ok("Hello"));

        in_tx.send(translate("こんにちは", "r1")).await.unwrap();
        let events = drain(in_tx, out_rx, handle).await;

        assert_eq!(
            events,
            vec![
                PanelEvent::Translating {
                    request_id: "r1".into()
                },
                PanelEvent::TranslationResult {
                    request_id: "r1".into(),
                    translation: "Hello".into()
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_translate_error_carries_kind() {
        let (transport, _, in_tx, out_rx, handle) = setup(Some("key"));
        transport.queue(Err(TranslateError::Unauthorized("Forbidden".into())));

        in_tx.send(translate("x", "r2")).await.unwrap();
        let events = drain(in_tx, out_rx, handle).await;

        assert_eq!(events.len(), 2);
        match &events[1] {
            PanelEvent::TranslationError {
                request_id, kind, ..
            } => {
                assert_eq!(request_id, "r2");
                assert_eq!(*kind, FailureKind::Unauthorized);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_key_reported_then_fixed_by_refresh() {
        let (transport, provider, in_tx, out_rx, handle) = setup(None);

        in_tx.send(translate("x", "r1")).await.unwrap();
        provider.set_api_key(Some("now-set".into()));
        // Let the first translation finish before refreshing.
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        in_tx.send(PanelMessage::RefreshApiKey).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        in_tx.send(translate("x", "r3")).await.unwrap();

        let events = drain(in_tx, out_rx, handle).await;
        assert!(events.iter().any(|e| matches!(
            e,
            PanelEvent::TranslationError { request_id, kind: FailureKind::Configuration, .. }
                if request_id == "r1"
        )));
        assert!(events.contains(&PanelEvent::ApiKeyRefreshed { configured: true }));
        assert!(events.iter().any(|e| matches!(
            e,
            PanelEvent::TranslationResult { request_id, .. } if request_id == "r3"
        )));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_commands() {
        let (transport, _, in_tx, out_rx, handle) = setup(Some("key"));

        in_tx.send(translate("a", "r1")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        in_tx.send(PanelMessage::GetCacheStats).await.unwrap();
        in_tx.send(PanelMessage::ClearCache).await.unwrap();
        in_tx.send(PanelMessage::GetCacheStats).await.unwrap();

        let events = drain(in_tx, out_rx, handle).await;
        let tail: Vec<_> = events
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    PanelEvent::CacheStats { .. } | PanelEvent::CacheCleared
                )
            })
            .collect();
        assert_eq!(
            tail,
            vec![
                PanelEvent::CacheStats {
                    size: 1,
                    max_size: 1000
                },
                PanelEvent::CacheCleared,
                PanelEvent::CacheStats {
                    size: 0,
                    max_size: 1000
                },
            ]
        );
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_translation_does_not_block_commands() {
        let (_, _, in_tx, mut out_rx, handle) = setup(Some("key"));

        for i in 0..11 {
            in_tx.send(translate(&format!("t{i}"), &format!("r{i}"))).await.unwrap();
        }
        in_tx.send(PanelMessage::GetCacheStats).await.unwrap();

        // The stats reply arrives while r10 is still parked in the limiter.
        loop {
            match out_rx.recv().await.unwrap() {
                PanelEvent::CacheStats { .. } => break,
                PanelEvent::TranslationResult { request_id, .. } => {
                    assert_ne!(request_id, "r10")
                }
                _ => {}
            }
        }

        let events = drain(in_tx, out_rx, handle).await;
        assert!(events.iter().any(|e| matches!(
            e,
            PanelEvent::TranslationResult { request_id, .. } if request_id == "r10"
        )));
    }
}
