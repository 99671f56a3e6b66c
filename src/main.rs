use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::{LoggingConfig, TurnstileConfig};
use turnstile::http::{GateState, HttpServer, KeyExtractor};
use turnstile::ratelimit::{LimiterRegistry, Sweeper, SystemClock};

/// In-memory fixed-window rate limiting service.
#[derive(Parser, Debug)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Rate limit rules file, overrides `rate_limiting.rules_path`
    #[arg(short, long)]
    rules: Option<String>,

    /// Listen address, overrides `server.http_addr`
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    if let Some(rules) = args.rules {
        config.rate_limiting.rules_path = Some(rules);
    }
    if let Some(listen) = args.listen {
        config.server.http_addr = listen;
    }

    init_tracing(&config.logging)?;

    info!("Starting Turnstile Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(http_addr = %config.server.http_addr, store = ?config.rate_limiting.store, "Configuration loaded");

    let rules = config.rate_limiting.load_rules()?;
    let registry = Arc::new(LimiterRegistry::from_rules(
        rules,
        config.rate_limiting.store,
        Arc::new(SystemClock),
    )?);

    let sweeper = Sweeper::spawn(registry.clone(), config.rate_limiting.sweep_interval());

    let extractor = KeyExtractor::new(
        config.rate_limiting.identity_header.as_deref(),
        config.rate_limiting.trust_proxy_headers,
    )?;
    let server = HttpServer::new(config.server.http_addr, GateState::new(registry, extractor));

    // Run the server with graceful shutdown on Ctrl+C
    let result = server.serve_with_shutdown(shutdown_signal()).await;

    sweeper.shutdown().await;
    result?;

    info!("Turnstile Rate Limiting Service stopped");
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    let installed = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!(e))
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
