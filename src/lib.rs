//! deepl-panel: translation pipeline behind an editor translation panel.
//! The host (editor plugin, webview) calls into `TranslationService` directly
//! or talks to it through the `panel` message loop.

pub mod config;
pub mod metrics;
pub mod panel;
pub mod translate;

pub use config::{EnvSettingsProvider, PanelSettings, SettingsProvider, StaticSettingsProvider};
pub use panel::{run_panel_loop, PanelEvent, PanelMessage};
pub use translate::{
    CacheStats, DeepLClient, FailureKind, TranslateError, TranslateRequest, TranslationService,
    Transport,
};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter; set `json` to emit one JSON object per line.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("deepl_panel=info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    // A second init (tests, embedding hosts) is not an error.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
