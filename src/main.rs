//! sockprobe - run the SockJS conformance suite against a server

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use sockprobe::{catalog, Config, Runner};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// SockJS protocol conformance harness
#[derive(Parser, Debug)]
#[command(name = "sockprobe", version, about = "Verify a SockJS server against the protocol")]
struct Args {
    /// Root URL of the test server (overrides config and SOCKJS_URL)
    #[arg(short, long)]
    url: Option<String>,

    /// Configuration file (default: sockprobe.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only run scenarios whose name contains this text
    #[arg(short, long)]
    filter: Option<String>,

    /// List the selected scenarios and exit
    #[arg(long)]
    list: bool,

    /// Log as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing; logs go to stderr, the report to stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sockprobe=info".into()),
        )
        .with(
            args.json
                .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
        .with(
            (!args.json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
        .init();

    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(url) = args.url {
        config = config.with_url(url);
    }
    let endpoints = config
        .endpoints()
        .with_context(|| format!("deriving service URLs from {}", config.url))?;

    let scenarios = catalog::filtered(&config, &endpoints, args.filter.as_deref());
    if args.list {
        for scenario in &scenarios {
            println!("{:<40} {}", scenario.name, scenario.description);
        }
        return Ok(());
    }
    if scenarios.is_empty() {
        bail!("no scenario matches {:?}", args.filter.unwrap_or_default());
    }

    info!(url = %config.url, scenarios = scenarios.len(), "starting run");
    let runner = Runner::new(config, endpoints).context("building the HTTP client")?;
    let summary = runner.run(&scenarios).await;
    println!("{}", summary);

    std::process::exit(summary.exit_code());
}
