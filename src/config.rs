//! Host-supplied settings: API key and default language pair.
//! The pipeline reads them through `SettingsProvider` and only re-reads on
//! an explicit refresh.

use std::sync::Arc;

use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};

pub const DEFAULT_SOURCE_LANG: &str = "JA";
pub const DEFAULT_TARGET_LANG: &str = "EN";

pub const ENV_API_KEY: &str = "DEEPL_API_KEY";
pub const ENV_SOURCE_LANG: &str = "DEEPL_SOURCE_LANG";
pub const ENV_TARGET_LANG: &str = "DEEPL_TARGET_LANG";

#[derive(Debug, Clone)]
pub struct PanelSettings {
    /// Opaque to the pipeline. Blank keys are normalised to `None`.
    pub api_key: Option<SecretString>,
    pub default_source_lang: String,
    pub default_target_lang: String,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            default_source_lang: DEFAULT_SOURCE_LANG.to_string(),
            default_target_lang: DEFAULT_TARGET_LANG.to_string(),
        }
    }
}

impl PanelSettings {
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = non_blank(key.into()).map(SecretString::new);
        self
    }

    pub fn with_languages(
        mut self,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        self.default_source_lang = source_lang.into();
        self.default_target_lang = target_lang.into();
        self
    }

    /// The key, if one is configured and not blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_ref()
            .map(|k| k.expose_secret().as_str())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Source of settings. `load` is called once at startup and again on every
/// `refresh_api_key`.
pub trait SettingsProvider: Send + Sync {
    fn load(&self) -> PanelSettings;
}

/// Reads `DEEPL_API_KEY`, `DEEPL_SOURCE_LANG` and `DEEPL_TARGET_LANG`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSettingsProvider;

impl SettingsProvider for EnvSettingsProvider {
    fn load(&self) -> PanelSettings {
        let defaults = PanelSettings::default();
        PanelSettings {
            api_key: env_value(ENV_API_KEY).map(SecretString::new),
            default_source_lang: env_value(ENV_SOURCE_LANG)
                .unwrap_or(defaults.default_source_lang),
            default_target_lang: env_value(ENV_TARGET_LANG)
                .unwrap_or(defaults.default_target_lang),
        }
    }
}

/// Settings held in memory. Clones share state, so a host can keep one
/// handle, change the key, and have the pipeline pick it up on refresh.
#[derive(Debug, Clone, Default)]
pub struct StaticSettingsProvider {
    settings: Arc<RwLock<PanelSettings>>,
}

impl StaticSettingsProvider {
    pub fn new(settings: PanelSettings) -> Self {
        Self {
            settings: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn set_api_key(&self, key: Option<String>) {
        self.settings.write().api_key = key.and_then(non_blank).map(SecretString::new);
    }

    pub fn set(&self, settings: PanelSettings) {
        *self.settings.write() = settings;
    }
}

impl SettingsProvider for StaticSettingsProvider {
    fn load(&self) -> PanelSettings {
        self.settings.read().clone()
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(non_blank)
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
