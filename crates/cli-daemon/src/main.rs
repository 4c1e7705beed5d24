//! CLI entry point for tilemark
//!
//! `batch` watermarks the uploads directory once, `watch` keeps doing it as
//! files arrive, `serve` exposes the HTTP endpoint and `request` calls it.

mod client;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tilemark::config::ConfigError;
use tilemark::{
    run_batch_with_progress, run_server, AppState, BatchEvent, Config, Processor, SandboxPolicy,
    WatchDaemon,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::client::{request_watermark, DEFAULT_SERVER_URL};

/// Tiled text watermarks for uploaded images
#[derive(Parser, Debug)]
#[command(name = "tilemark")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a config.toml; built-in defaults plus env overrides when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watermark every image in the uploads directory once
    Batch {
        /// Watermark text (defaults to the configured text)
        text: Option<String>,

        /// Directory to process instead of the configured uploads directory
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Watch the uploads directory and watermark new images
    Watch {
        /// Directory to watch instead of the configured uploads directory
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Serve POST /api/watermark
    Serve {
        /// Address to bind, e.g. 127.0.0.1:3000
        #[arg(long)]
        bind: Option<String>,
    },

    /// Ask a running server to watermark one image
    Request {
        /// Public path of the image, e.g. /uploads/photo.jpg
        image_path: String,

        /// Watermark text (server default when omitted)
        #[arg(long)]
        text: Option<String>,

        /// Base URL of the server
        #[arg(long, default_value = DEFAULT_SERVER_URL)]
        url: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,notify=warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::load(path),
        None => Config::from_env(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for interrupt");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Batch { text, dir, json } => batch(&config, text, dir, json),
        Command::Watch { dir } => watch(&config, dir).await,
        Command::Serve { bind } => serve(&config, bind).await,
        Command::Request {
            image_path,
            text,
            url,
        } => request(&url, &image_path, text.as_deref()).await,
    }
}

/// Explicit text wins unless it is empty; then the configured text applies.
fn batch_text(arg: Option<String>, config: &Config) -> String {
    arg.filter(|text| !text.is_empty())
        .unwrap_or_else(|| config.watermark.text.clone())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn batch(config: &Config, text: Option<String>, dir: Option<PathBuf>, json: bool) -> ExitCode {
    let dir = dir.unwrap_or_else(|| config.paths.uploads_dir());
    let text = batch_text(text, config);
    let processor = Processor::from_config(&config.watermark);

    let result = run_batch_with_progress(&dir, &text, &processor, |event| {
        if json {
            return;
        }
        match event {
            BatchEvent::Started { images, .. } => {
                println!("Found {} images in {}", images, dir.display())
            }
            BatchEvent::Item(item) => match &item.error {
                None => println!("  watermarked {}", display_name(&item.path)),
                Some(error) => println!("  failed      {}: {}", display_name(&item.path), error),
            },
        }
    });

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Failed to serialize report: {}", e);
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    println!(
        "Done: {} watermarked, {} failed, {} skipped",
        report.processed, report.failed, report.skipped
    );

    ExitCode::SUCCESS
}

async fn watch(config: &Config, dir: Option<PathBuf>) -> ExitCode {
    let dir = dir.unwrap_or_else(|| config.paths.uploads_dir());
    let processor = Arc::new(Processor::from_config(&config.watermark));
    let daemon = WatchDaemon::new(
        dir.clone(),
        config.watermark.text.as_str(),
        processor,
        &config.watch,
    );

    println!("Watching {} for new images (Ctrl-C to stop)", dir.display());
    match daemon.run(shutdown_signal()).await {
        Ok(()) => {
            println!("Stopped watching {}", dir.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: &Config, bind: Option<String>) -> ExitCode {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let state = AppState::new(
        Arc::new(Processor::from_config(&config.watermark)),
        SandboxPolicy::from_config(&config.paths),
        config.watermark.text.as_str(),
    );

    println!("Serving POST /api/watermark on http://{}", bind);
    match run_server(&bind, state, shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn request(url: &str, image_path: &str, text: Option<&str>) -> ExitCode {
    let client = reqwest::Client::new();
    match request_watermark(&client, url, image_path, text).await {
        Ok(response) => {
            println!("{}", response.message);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_batch_with_text() {
        let cli = Cli::try_parse_from(["tilemark", "batch", "SAMPLE"]).unwrap();
        match cli.command {
            Command::Batch { text, dir, json } => {
                assert_eq!(text.as_deref(), Some("SAMPLE"));
                assert!(dir.is_none());
                assert!(!json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["tilemark", "watch", "--config", "site.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("site.toml")));
        assert!(matches!(cli.command, Command::Watch { dir: None }));
    }

    #[test]
    fn test_parse_request_defaults() {
        let cli = Cli::try_parse_from(["tilemark", "request", "/uploads/a.png"]).unwrap();
        match cli.command {
            Command::Request { image_path, text, url } => {
                assert_eq!(image_path, "/uploads/a.png");
                assert!(text.is_none());
                assert_eq!(url, DEFAULT_SERVER_URL);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_request_requires_image_path() {
        assert!(Cli::try_parse_from(["tilemark", "request"]).is_err());
    }

    #[test]
    fn test_empty_batch_text_falls_back_to_config() {
        let config = Config::default();
        assert_eq!(batch_text(Some(String::new()), &config), "NQJACK");
        assert_eq!(batch_text(None, &config), "NQJACK");
        assert_eq!(batch_text(Some("SAMPLE".to_string()), &config), "SAMPLE");
    }

    #[test]
    fn test_parse_batch_empty_text() {
        let cli = Cli::try_parse_from(["tilemark", "batch", ""]).unwrap();
        match cli.command {
            Command::Batch { text, .. } => assert_eq!(batch_text(text, &Config::default()), "NQJACK"),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_display_name_uses_file_name() {
        assert_eq!(display_name(Path::new("/uploads/photo.png")), "photo.png");
    }

    #[test]
    fn test_load_config_missing_file_fails() {
        let result = load_config(Some(Path::new("/definitely/not/here/config.toml")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
