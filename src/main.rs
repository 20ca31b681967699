use chrono::Local;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use scrapfwd::config::Config;
use scrapfwd::forward::HttpForwarder;
use scrapfwd::process::run;
use scrapfwd::request::HttpFetcher;
use scrapfwd::sites::Site;
use scrapfwd::{info_time, Result};

/// Scrape one site and forward the extracted records to the destination API.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Scraper to run
    #[arg(value_enum)]
    site: Site,

    /// Seconds to wait between items, overrides DELAY
    #[arg(long)]
    delay: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scrapfwd=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(delay) = cli.delay {
        config.delay = std::time::Duration::try_from_secs_f64(delay)
            .map_err(|_| scrapfwd::Error::Config(format!("invalid delay: {delay}")))?;
    }

    let source = cli.site.source(&config)?;
    let fetcher = HttpFetcher::new(&config)?;
    let forwarder = HttpForwarder::new(&config)?;

    let start_time = Local::now();
    let summary = run(&source, &fetcher, &forwarder, config.delay).await?;
    println!("\n{summary}");
    info_time!(start_time, "Full program time:");

    Ok(())
}
