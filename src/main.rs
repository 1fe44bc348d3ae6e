//! IP reputation checker CLI.

use anyhow::Result;
use clap::Parser;
use ip_reputation_check::{build, create_app, server, Config};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ip-reputation-check")]
#[command(about = "Web front end that checks IP addresses against AbuseIPDB")]
#[command(version)]
struct Args {
    /// Path to configuration file (defaults plus ABUSEIPDB_KEY when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the configuration file
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: String,

    /// Print example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("{}", Config::example());
        return Ok(());
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            Config::load(path)?
        }
        None => {
            let config = Config::from_env();
            config.validate()?;
            config
        }
    };

    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }

    if args.validate {
        if config.api_key().is_none() {
            info!("Configuration is valid, but ABUSEIPDB_KEY is missing");
        } else {
            info!("Configuration is valid");
        }
        return Ok(());
    }

    let (state, limiter) = build(&config);

    if let Some(limiter) = &limiter {
        let limiter = Arc::clone(limiter);
        let every = Duration::from_secs(config.rate_limit.window_seconds);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                limiter.cleanup();
            }
        });
    }

    let app = create_app(state, limiter);
    let listener = tokio::net::TcpListener::bind(config.server.listen).await?;

    info!(
        listen = %config.server.listen,
        url = format!("http://{}", config.server.listen),
        "IP reputation checker started"
    );

    server::serve(listener, app).await?;

    info!("IP reputation checker stopped");
    Ok(())
}
