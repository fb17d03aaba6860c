use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use motionwatch::{stream, BroadcastObserver, DetectorConfig, DetectorWorker};

/// Buffered transitions before a slow printer starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "motionwatch")]
#[command(about = "Continuous video motion detector")]
#[command(version)]
#[command(long_about = "Watches one video stream, learns its background and reports \
debounced motion transitions as JSON lines on stdout until interrupted.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "motionwatch.toml", help = "Path to TOML configuration file")]
    config: PathBuf,

    /// Override the camera identifier
    #[arg(long, value_name = "ID")]
    camera_id: Option<String>,

    /// Override the stream address
    #[arg(long, value_name = "URL")]
    source: Option<String>,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the detector")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", DetectorConfig::default().to_toml()?);
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting motionwatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config.display());

    let mut config = DetectorConfig::load_from_file(&args.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Some(camera_id) = args.camera_id.clone() {
        config.camera.id = camera_id;
    }
    if let Some(source) = args.source.clone() {
        config.camera.source = Some(source);
    }

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    run(config).await
}

async fn run(config: DetectorConfig) -> Result<()> {
    let source = stream::default_source(&config.worker)?;
    let observer = BroadcastObserver::new(config.camera.id.as_str(), EVENT_CHANNEL_CAPACITY);
    let mut events = observer.subscribe();

    info!(
        "Watching camera '{}' at {}",
        config.camera.id,
        config.camera.stream_address()
    );

    let worker = DetectorWorker::builder()
        .config(config)
        .source(source)
        .observer(observer)
        .spawn()
        .context("Failed to start detector")?;

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("Failed to serialize event: {}", e),
                },
                Err(RecvError::Lagged(n)) => warn!("Event printer lagged behind by {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let exited_on_its_own = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received Ctrl-C, stopping detector"),
                Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
            }
            false
        }
        result = worker.join_async() => {
            result?;
            warn!("Detector worker exited on its own");
            true
        }
    };

    if !exited_on_its_own {
        worker.request_stop();
        worker.join_async().await?;
    }
    info!(
        "Detector for camera '{}' stopped (motion={})",
        worker.camera_id(),
        worker.is_motion_detected()
    );

    // the detector thread owned the only sender; the printer ends once drained
    if let Err(e) = printer.await {
        warn!("Event printer task failed: {}", e);
    }

    if exited_on_its_own {
        anyhow::bail!(
            "Detector for camera '{}' exited without being stopped",
            worker.camera_id()
        );
    }
    Ok(())
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("motionwatch={}", log_level)));

    // Logs go to stderr; stdout carries the JSON event stream
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_names(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}
