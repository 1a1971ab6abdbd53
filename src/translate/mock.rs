//! Scripted transport for unit tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{TranslateError, TranslateRequest, Transport};

/// Pops one queued outcome per call, then falls back to `always` or to an
/// echo of the request. Every call is recorded.
#[derive(Default)]
pub(crate) struct MockTransport {
    outcomes: Mutex<VecDeque<Result<String, TranslateError>>>,
    fallback: Mutex<Option<Result<String, TranslateError>>>,
    calls: Mutex<Vec<(TranslateRequest, String)>>,
}

impl MockTransport {
    pub(crate) fn queue(&self, outcome: Result<&str, TranslateError>) {
        self.outcomes.lock().push_back(outcome.map(str::to_string));
    }

    pub(crate) fn always(&self, outcome: Result<&str, TranslateError>) {
        *self.fallback.lock() = Some(outcome.map(str::to_string));
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub(crate) fn last_call(&self) -> Option<(TranslateRequest, String)> {
        self.calls.lock().last().cloned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        request: &TranslateRequest,
        api_key: &str,
    ) -> Result<String, TranslateError> {
        self.calls
            .lock()
            .push((request.clone(), api_key.to_string()));
        if let Some(outcome) = self.outcomes.lock().pop_front() {
            return outcome;
        }
        self.fallback
            .lock()
            .clone()
            .unwrap_or_else(|| Ok(format!("[{}] {}", request.target_lang, request.text)))
    }
}
