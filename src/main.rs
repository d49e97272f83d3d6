use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use previewd::config::DaemonConfig;
use previewd::AppContext;

#[derive(Parser)]
#[command(
    name = "previewd",
    about = "Live-preview build daemon — rebuilds chat-edited web projects and streams progress",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Data directory for config and logs (default: ~/.previewd)
    #[arg(long, env = "PREVIEWD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Root directory holding one project tree per session
    #[arg(long, env = "PREVIEWD_PROJECTS_DIR")]
    projects_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PREVIEWD_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "PREVIEWD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon in the foreground (default when no subcommand given).
    ///
    /// Examples:
    ///   previewd serve
    ///   previewd
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Arc::new(DaemonConfig::new(
        args.data_dir,
        args.projects_dir,
        args.log,
    ));

    // Init once — must happen before any tracing calls.
    let _file_guard = setup_logging(&config.log, args.log_file.as_deref(), &config.log_format);

    match args.command {
        None | Some(Command::Serve) => run_server(config).await,
    }
}

async fn run_server(config: Arc<DaemonConfig>) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        projects_dir = %config.projects_dir.display(),
        "previewd starting"
    );

    let ctx = AppContext::initialize(config)?;

    info!("previewd ready — waiting for build requests");
    tokio::signal::ctrl_c().await?;

    info!("shutdown signal received");
    ctx.shutdown();
    Ok(())
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default) or `"json"` (structured output
/// for log aggregators). A log directory that cannot be created logs a
/// warning and falls back to stdout-only — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    // Resolve the optional file writer first; any failure downgrades to
    // stdout-only rather than refusing to start.
    let mut guard = None;
    let file_writer = log_file.and_then(|path| {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("previewd.log"));
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            return None;
        }
        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, g) = tracing_appender::non_blocking(appender);
        guard = Some(g);
        Some(non_blocking)
    });

    if use_json {
        tracing_subscriber::registry()
            .with(EnvFilter::new(log_level))
            .with(fmt::layer().json())
            .with(file_writer.map(|w| fmt::layer().json().with_writer(w)))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(EnvFilter::new(log_level))
            .with(fmt::layer().compact())
            .with(file_writer.map(|w| fmt::layer().compact().with_writer(w)))
            .init();
    }

    guard
}
