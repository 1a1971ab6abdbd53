//! Command-line host for the translation pipeline.
//!
//!   deepl-panel [--from JA] [--to EN] [--json-log] <text...>
//!   deepl-panel --panel        # JSON-lines panel protocol on stdin/stdout
//!
//! Settings come from `DEEPL_API_KEY`, `DEEPL_SOURCE_LANG`, `DEEPL_TARGET_LANG`;
//! `DEEPL_API_URL` overrides the endpoint.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use deepl_panel::translate::deepl::TRANSPORT_TIMEOUT;
use deepl_panel::{
    init_tracing, run_panel_loop, DeepLClient, EnvSettingsProvider, PanelMessage,
    TranslationService,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Source language code, e.g. JA
    #[arg(long)]
    from: Option<String>,

    /// Target language code, e.g. EN
    #[arg(long)]
    to: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_log: bool,

    /// Speak the JSON-lines panel protocol on stdin/stdout
    #[arg(long)]
    panel: bool,

    /// Text to translate; read from stdin when empty
    #[arg(trailing_var_arg = true, num_args = 1..)]
    text: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.json_log);

    let client = match std::env::var("DEEPL_API_URL") {
        Ok(endpoint) => DeepLClient::with_endpoint(endpoint, TRANSPORT_TIMEOUT),
        Err(_) => DeepLClient::new(),
    };
    let client = match client {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };

    let service = Arc::new(TranslationService::new(
        Arc::new(client),
        Arc::new(EnvSettingsProvider),
    ));
    if !service.has_api_key() {
        warn!("DEEPL_API_KEY is not set, translations will fail until it is configured");
    }

    if args.panel {
        run_stdio_panel(service).await
    } else {
        translate_once(&service, args).await
    }
}

async fn translate_once(service: &TranslationService, args: Args) -> ExitCode {
    let text = if args.text.is_empty() {
        let mut buf = String::new();
        if let Err(e) = tokio::io::stdin().read_to_string(&mut buf).await {
            error!(error = %e, "failed to read stdin");
            return ExitCode::FAILURE;
        }
        buf
    } else {
        args.text.join(" ")
    };

    match service
        .translate(&text, args.from.as_deref(), args.to.as_deref())
        .await
    {
        Ok(translation) => {
            println!("{translation}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// One JSON message per stdin line in, one JSON event per stdout line out.
async fn run_stdio_panel(service: Arc<TranslationService>) -> ExitCode {
    let (in_tx, in_rx) = mpsc::channel(64);
    let (out_tx, mut out_rx) = mpsc::channel(64);
    let panel = run_panel_loop(service, in_rx, out_tx);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = out_rx.recv().await {
            match event.to_json() {
                Ok(line) => {
                    if stdout.write_all(format!("{line}\n").as_bytes()).await.is_err() {
                        break;
                    }
                    let _ = stdout.flush().await;
                }
                Err(e) => error!(error = %e, "failed to encode panel event"),
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match PanelMessage::from_json(&line) {
                Ok(message) => {
                    if in_tx.send(message).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "ignoring malformed panel message"),
            },
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "failed to read stdin");
                break;
            }
        }
    }

    drop(in_tx);
    if let Err(e) = panel.await {
        error!(error = %e, "panel loop panicked");
        return ExitCode::FAILURE;
    }
    let _ = writer.await;
    info!("panel session closed");
    ExitCode::SUCCESS
}
