mod cli;
mod feed;
mod output;

use crate::cli::{Cli, Command};
use crate::output::OutputFormat;
use clap::Parser;
use lyricsync_core::config::LyricsProviderType;
use lyricsync_core::{
    Clock, CoreError, LocalLyricsProvider, LyricsConfig, LyricsFetcher, LyricsProvider,
    LyricsyncConfig, SyncScheduler, SystemClock,
};
use lyricsync_lyrics_lrclib::LrclibProvider;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(LyricsyncConfig::config_path);

    // Check config for logging.enabled before full config load
    let file_logging_enabled = check_file_logging_enabled(&config_path);
    init_tracing(file_logging_enabled);

    // Load config or create template on first run
    let mut config = match LyricsyncConfig::load_or_create_at(&config_path) {
        Ok(config) => config,
        Err(CoreError::ConfigNotFound { path }) => {
            info!(
                "Created config template at {}, continuing with defaults",
                path.display()
            );
            LyricsyncConfig::default()
        }
        Err(CoreError::ConfigParseError(parse_error)) => {
            error!(
                "Config file {} has a syntax error: {parse_error}",
                config_path.display()
            );
            std::process::exit(1);
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    if let Some(offset_ms) = cli.offset_ms {
        config.sync.timing_offset_ms = offset_ms;
    }

    // Create tokio runtime for background tasks
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(run(cli, config));

    // A pending stdin read would otherwise block runtime drop
    runtime.shutdown_background();

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: LyricsyncConfig) -> Result<(), CoreError> {
    // Create shared cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    // Set up Ctrl+C handler to trigger graceful shutdown
    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down gracefully...");
        ctrlc_token.cancel();
    }) {
        error!("Failed to set Ctrl+C handler: {}", e);
    }

    let scheduler = SyncScheduler::with_clock(
        config.sync.settings(),
        Arc::new(SystemClock),
        Some(cancel_token.clone()),
    );

    // Create lyrics providers based on config
    let providers = create_providers(&config.lyrics);
    let provider_names: Vec<_> = providers.iter().map(|p| p.name()).collect();
    info!(
        "Initialized {} lyrics provider(s): {:?}",
        providers.len(),
        provider_names
    );
    if providers.is_empty() {
        warn!("No lyrics providers available; every track will report no lyrics");
    }

    let lyrics_fetcher = Arc::new(LyricsFetcher::new(
        Arc::clone(&scheduler),
        providers,
        Some(cancel_token.clone()),
    ));
    let fetcher_handle = lyrics_fetcher.start();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Plain
    };
    let printer_handle = tokio::spawn(output::print_events(
        scheduler.subscribe(),
        format,
        cancel_token.clone(),
    ));

    let result = match cli.command {
        Command::Watch => {
            let stdin = BufReader::new(tokio::io::stdin());
            tokio::select! {
                () = cancel_token.cancelled() => Ok(()),
                result = feed::watch(stdin, &scheduler) => result,
            }
        }
        Command::Play {
            artist,
            song,
            album,
            duration_secs,
        } => {
            let presence = feed::simulated_presence(
                &artist,
                &song,
                &album,
                duration_secs.saturating_mul(1000),
                SystemClock.now_ms(),
            );
            tokio::select! {
                () = cancel_token.cancelled() => {}
                () = feed::play(presence, &scheduler) => {}
            }
            Ok(())
        }
    };

    // Stops the ticker and cancels the shared token
    scheduler.shutdown().await;
    join_task("lyrics fetcher", fetcher_handle).await;
    join_task("event printer", printer_handle).await;

    result
}

/// Wait for a background task, logging it if the task panicked
async fn join_task(name: &str, handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            error!("{} task failed: {}", name, e);
            false
        }
    }
}

fn create_providers(config: &LyricsConfig) -> Vec<Box<dyn LyricsProvider>> {
    config
        .providers
        .iter()
        .filter_map(|provider_type| -> Option<Box<dyn LyricsProvider>> {
            match provider_type {
                LyricsProviderType::Lrclib => {
                    info!("Initializing LRCLIB provider");
                    match LrclibProvider::new(config.request_timeout_secs) {
                        Ok(provider) => Some(Box::new(provider)),
                        Err(e) => {
                            error!("Failed to create LRCLIB provider: {}", e);
                            None
                        }
                    }
                }
                LyricsProviderType::Local => config.local_dir.as_ref().map_or_else(
                    || {
                        info!("Skipping local lyrics provider: local_dir not configured");
                        None
                    },
                    |dir| {
                        info!("Initializing local lyrics provider ({})", dir.display());
                        Some(Box::new(LocalLyricsProvider::new(dir)) as Box<dyn LyricsProvider>)
                    },
                ),
            }
        })
        .collect()
}

/// Check if file logging is enabled by reading the config file.
/// This is done before full config loading to set up tracing first.
/// Returns `false` if config doesn't exist or can't be parsed.
fn check_file_logging_enabled(config_path: &Path) -> bool {
    // Minimal structs to parse just the logging.enabled field
    #[derive(serde::Deserialize)]
    struct PartialConfig {
        #[serde(default)]
        logging: PartialLoggingConfig,
    }
    #[derive(serde::Deserialize, Default)]
    struct PartialLoggingConfig {
        #[serde(default)]
        enabled: bool,
    }

    let Ok(content) = std::fs::read_to_string(config_path) else {
        return false;
    };

    toml::from_str::<PartialConfig>(&content)
        .map(|c| c.logging.enabled)
        .unwrap_or(false)
}

/// Initialize tracing with stderr output and optional file logging.
/// Stdout is reserved for lyric output.
fn init_tracing(file_logging_enabled: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper_util=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if file_logging_enabled {
        let log_path: PathBuf = lyricsync_core::paths::log_file_path();

        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match File::create(&log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();

                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_providers_in_configured_order() {
        let config = LyricsConfig {
            providers: vec![LyricsProviderType::Local, LyricsProviderType::Lrclib],
            local_dir: Some(PathBuf::from("/tmp/lyrics")),
            request_timeout_secs: 5,
        };
        let names: Vec<_> = create_providers(&config).iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["local", "lrclib"]);
    }

    #[test]
    fn test_local_provider_skipped_without_dir() {
        let config = LyricsConfig {
            providers: vec![LyricsProviderType::Local],
            local_dir: None,
            request_timeout_secs: 5,
        };
        assert!(create_providers(&config).is_empty());
    }

    #[tokio::test]
    async fn test_join_task_reports_panicked_task() {
        assert!(join_task("ok", tokio::spawn(async {})).await);

        let handle = tokio::spawn(async { panic!("printer crashed") });
        assert!(!join_task("printer", handle).await);
    }

    #[test]
    fn test_file_logging_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert!(!check_file_logging_enabled(&path));

        std::fs::write(&path, "[logging]\nenabled = true\n").unwrap();
        assert!(check_file_logging_enabled(&path));

        std::fs::write(&path, "[logging\n").unwrap();
        assert!(!check_file_logging_enabled(&path));
    }
}
