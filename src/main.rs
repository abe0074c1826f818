//! R0N Rate Proxy binary entry point.

use anyhow::{Context, Result};
use clap::Parser;
use r0n_rate_proxy::config::{BasicValidator, ConfigLoader, LogLevel, ProxyConfig};
use r0n_rate_proxy::logging;
use r0n_rate_proxy::module::{ModuleConfig, ModuleContract};
use r0n_rate_proxy::modules::proxy::ProxyModule;
use r0n_rate_proxy::modules::rate_limiting::RateLimitHandler;
use std::path::PathBuf;
use tracing::{error, info};

/// Transparent HTTP proxy with per-host rate limits.
#[derive(Parser, Debug)]
#[command(name = "r0n-rate-proxy")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (overrides logging.level)
    #[arg(long)]
    log_level: Option<LogLevel>,
}

impl Cli {
    /// Parse the file and apply overrides. Does not validate.
    fn load_config(&self, loader: &ConfigLoader) -> Result<ProxyConfig> {
        let mut config = match self.config {
            Some(ref path) => loader
                .load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ProxyConfig::default(),
        };

        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config(&ConfigLoader::new())?;

    logging::init(&config.logging).context("installing log subscriber")?;
    ConfigLoader::new()
        .with_validator(BasicValidator::new())
        .validate(&config)?;

    println!("Starting HTTP proxy on port {}", config.server.port);

    let mut rate_limiter = RateLimitHandler::new();
    rate_limiter.init(ModuleConfig::from_section(&config.rate_limits)?)?;
    rate_limiter.start()?;

    let limiter = rate_limiter
        .limiter()
        .context("rate limiter not initialized")?;

    let mut proxy = ProxyModule::new(limiter);
    proxy.init(ModuleConfig::from_section(&config.proxy_module_config())?)?;
    proxy.start()?;

    info!(
        addr = ?proxy.local_addr(),
        limited_hosts = config.rate_limits.hosts.len(),
        "Proxy running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    println!("Shutting down..");

    if let Err(e) = proxy.stop() {
        error!("Failed to stop proxy: {e}");
    }
    if let Err(e) = rate_limiter.stop() {
        error!("Failed to stop rate limiter: {e}");
    }

    info!("{}", proxy.metrics().to_prometheus("r0n_rate_proxy"));
    Ok(())
}
