//! redirsocks: transparent TCP redirector over SOCKS5
//!
//! This is the main entry point for the redirector.
//!
//! # Usage
//!
//! ```bash
//! # Relay through the default SOCKS5 proxy (10.0.0.80:1080)
//! ./redirsocks
//!
//! # Custom listen address and authenticated relay
//! ./redirsocks --bind 127.0.0.1:1081 --relay user:secret@proxy.lan:1080
//!
//! # Same through the environment
//! REDIRSOCKS_RELAY=proxy.lan:1080 REDIRSOCKS_DEBUG=true ./redirsocks
//! ```

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use redirsocks::config::{Cli, LogConfig, LogFormat};
use redirsocks::io::{BufferPool, CopyMode};
use redirsocks::redirect::default_resolver;
use redirsocks::relay::{Redirector, Relay, RelayOptions, RelayStats};
use redirsocks::upstream::Socks5Dialer;

/// Initialize logging
fn init_logging(log: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log.default_directive()))
        .context("invalid log filter")?
        .add_directive("tokio=warn".parse()?);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match log.format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }
    Ok(())
}

/// Main application entry point
#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Instant::now();

    let config = Cli::parse()
        .into_config()
        .context("invalid configuration")?;

    init_logging(config.log)?;

    info!(
        "Starting redirsocks v{}: listen {} relay {}",
        redirsocks::VERSION,
        config.listen.address,
        config.upstream.redacted()
    );
    if config.relay.copy_mode == CopyMode::Manual {
        info!("Using manual read/write copy (iohack)");
    }

    let resolver = default_resolver();
    let dialer =
        Arc::new(Socks5Dialer::new(&config.upstream).context("failed to create SOCKS5 dialer")?);
    let pool = Arc::new(BufferPool::new(
        config.relay.pool_capacity,
        config.relay.buffer_size,
    ));
    let stats = Arc::new(RelayStats::new());

    let relay = Arc::new(Relay::new(
        resolver,
        dialer,
        Arc::clone(&pool),
        Arc::clone(&stats),
        RelayOptions::from(&config.relay),
    ));

    let handle = Redirector::new(relay)
        .start(&config.listen)
        .with_context(|| format!("failed to listen on {}", config.listen.address))?;

    info!(
        "Startup complete in {:.2}ms",
        start_time.elapsed().as_secs_f64() * 1000.0
    );

    let signal = wait_for_shutdown_signal().await?;
    info!("Received {}, shutting down...", signal);

    handle.stop();
    handle.join().await;

    info!("Final stats: {}", stats.snapshot());
    let pool_stats = pool.stats().snapshot();
    info!(
        "Buffer pool: {} allocations, {} reuses, {} drops ({:.1}% reuse)",
        pool_stats.allocations,
        pool_stats.reuses,
        pool_stats.drops,
        pool_stats.efficiency() * 100.0
    );

    info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGHUP, SIGINT, SIGTERM or SIGQUIT
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("failed to register SIGHUP handler")?;
    let mut interrupt =
        signal(SignalKind::interrupt()).context("failed to register SIGINT handler")?;
    let mut terminate =
        signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;
    let mut quit = signal(SignalKind::quit()).context("failed to register SIGQUIT handler")?;

    let name = tokio::select! {
        _ = hangup.recv() => "SIGHUP",
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
    };
    Ok(name)
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    Ok("Ctrl-C")
}
