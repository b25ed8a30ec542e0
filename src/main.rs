//! nova-libvirt-exporter
//!
//! Prometheus exporter for OpenStack Nova instance metadata read from libvirt.
//! This is the main entry point that initializes the server and handles subcommands.

mod cli;
mod commands;
mod config;
mod handlers;
mod state;

use axum::{routing::get, Router};
use clap::Parser;
use nova_libvirt_exporter::{
    run_collection_loop, Collector, CollectorHealth, FamilyTable, PrometheusSink, Telemetry,
    Translator,
};
use prometheus::Registry;
use std::sync::Arc;
use std::time::Instant;
use tokio::{net::TcpListener, signal, sync::watch};
use tracing::{debug, error, info, Level};

use cli::{Args, Commands, LogLevel};
use commands::{command_check, command_config, command_translate};
use config::{resolve_config, show_config, validate_effective_config, Config};
use handlers::{health_handler, metrics_handler, root_handler};
use state::{AppState, SharedState};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(config: &Config) {
    let level = config.log_level().unwrap_or(LogLevel::Info);
    if level == LogLevel::Off {
        return;
    }

    let max_level = match level {
        LogLevel::Off | LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    info!("Logging initialized with level: {:?}", level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Resolves once SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        return match command {
            Commands::Config {
                output,
                format,
                commented,
            } => command_config(output.clone(), *format, *commented),

            Commands::Translate { files, format } => {
                let config = load_validated_config(&args)?;
                setup_logging(&config);
                command_translate(files, *format).map_err(Into::into)
            }

            Commands::Check { all } => {
                let config = load_validated_config(&args)?;
                setup_logging(&config);
                command_check(*all, &config)
            }
        };
    }

    // Load configuration for main server mode
    let config = load_validated_config(&args)?;
    setup_logging(&config);

    info!("Starting nova-libvirt-exporter {}", env!("CARGO_PKG_VERSION"));

    // Bind first: a port that cannot be bound is fatal before any polling starts
    let addr = config.listen_addr()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind {}: {}", addr, e);
        e
    })?;

    // Initialize Prometheus metrics registry
    let registry = Registry::new();
    let families = Arc::new(FamilyTable::standard()?);
    let sink = Arc::new(PrometheusSink::new(&registry, &families)?);
    debug!("Prometheus registry initialized with {} families", families.len());

    let health = Arc::new(CollectorHealth::new());
    let mut collector = Collector::new(
        config.hypervisor(),
        config.libvirt_uri(),
        Translator::new(families.clone()),
        sink,
    )
    .with_prune_stale(config.prune_stale())
    .with_health(health.clone());

    if config.enable_telemetry() {
        collector = collector.with_telemetry(Telemetry::register(&registry)?);
        debug!("Exporter telemetry registered");
    }

    info!(
        "Collecting from {} every {}s (prune stale: {})",
        config.source_description(),
        config.interval().as_secs(),
        config.prune_stale()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let collection = tokio::spawn(run_collection_loop(
        Arc::new(collector),
        config.interval(),
        shutdown_rx,
    ));

    let state: SharedState = Arc::new(AppState {
        registry,
        families,
        health,
        config: Arc::new(config.clone()),
        start_time: Instant::now(),
    });

    // Configure HTTP server routes
    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler));

    if config.enable_health() {
        app = app.route("/health", get(health_handler));
    }

    let app = app.with_state(state);

    info!("nova-libvirt-exporter listening on http://{}", addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    let result = server.await;

    // Stop the collection loop; an in-flight cycle finishes first
    let _ = shutdown_tx.send(true);
    if let Err(e) = collection.await {
        error!("Collection loop task failed: {}", e);
    }

    if let Err(e) = result {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("nova-libvirt-exporter stopped gracefully");
    Ok(())
}
