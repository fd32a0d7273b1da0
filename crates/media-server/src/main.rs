//! Entry point: parses the CLI contract, loads configuration, starts
//! every configured listener plus the HTTP control API and HLS
//! packaging watcher, and waits for Ctrl+C, matching the
//! spawn-then-await-ctrl_c shutdown shape used across this workspace's
//! sibling binaries.

mod cli;
mod hls_watcher;
mod http;
mod listeners;
mod rtc_answer;
mod signal_watch;
mod state;

use std::process::ExitCode;
use std::sync::Arc;

use streamcfg::AppConfig;
use tracing::{error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse(std::env::args()) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("media-server: {err}");
            return ExitCode::from(1);
        }
    };

    if args.print_version {
        println!("media-server {VERSION}");
        return ExitCode::SUCCESS;
    }

    if let Some(path) = &args.config_path {
        if let Err(err) = dotenvy::from_path(path) {
            eprintln!("media-server: failed to load config {}: {err}", path.display());
            return ExitCode::from(1);
        }
    }

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("media-server: config error: {err}");
            return ExitCode::from(1);
        }
    };

    if let Err(err) = config.validate() {
        eprintln!("media-server: invalid config: {err}");
        return ExitCode::from(1);
    }

    if args.validate_only {
        println!("media-server: configuration OK");
        return ExitCode::SUCCESS;
    }

    streamlog::init_console_logging("media-server", config.log_level());

    if let Err(err) = run(config, args.signal_file).await {
        error!(error = %err, "media-server exited with an error");
        return ExitCode::from(2);
    }
    ExitCode::SUCCESS
}

async fn run(config: AppConfig, signal_file: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let state = state::AppState::new(config);
    info!(
        rtmp = state.config.listen.rtmp,
        http_api = state.config.listen.http_api,
        "media-server starting"
    );

    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(listeners::rtmp::serve(Arc::clone(&state))));

    if let Some(addr) = state.config.listen.srt.clone() {
        tasks.push(tokio::spawn(listeners::srt::serve(Arc::clone(&state), addr)));
    }
    if let Some(addr) = state.config.listen.rtsp.clone() {
        tasks.push(tokio::spawn(listeners::rtsp::serve(Arc::clone(&state), addr)));
    }

    let hls_handle = hls_watcher::spawn(Arc::clone(&state));
    let http_state = Arc::clone(&state);

    if let Some(path) = signal_file {
        signal_watch::spawn(path);
    }

    tokio::select! {
        result = http::serve(http_state) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
        }
    }

    hls_handle.abort();
    for task in tasks {
        task.abort();
    }
    warn!("media-server stopped");
    Ok(())
}
