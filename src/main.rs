use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tripz_core::pipeline::SearchOutcome;
use tripz_core::{
    FlightSearchService, HttpRateFetcher, HttpSearchFetcher, InMemoryStore, SearchParams,
    ServiceConfig, StaticHolidaySource, WeekendPlanner,
};

/// Cheap weekend trips: long-weekend finder and flight deal search
#[derive(Parser)]
#[command(name = "tripz")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List upcoming weekends, flagging leave hacks
    Weekends {
        /// Start scanning from this date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Number of weekends to list
        #[arg(long)]
        count: Option<usize>,
    },

    /// Search flight deals, one search per destination
    Search {
        #[arg(long)]
        origin: String,

        #[arg(long = "destination", required = true)]
        destinations: Vec<String>,

        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: NaiveDate,

        #[arg(long)]
        passengers: Option<u32>,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run_weekends(config: &ServiceConfig, from: Option<NaiveDate>, count: Option<usize>) -> Result<()> {
    let reference = match from {
        Some(date) => date.and_time(NaiveTime::MIN).and_utc(),
        None => Utc::now(),
    };
    let count = count.unwrap_or(config.weekend_window_count);

    let planner = WeekendPlanner::new(StaticHolidaySource::singapore_2025(), count);
    let suggestions = planner.suggestions(reference).await?;
    info!(count = suggestions.len(), "weekend suggestions ready");

    println!("{}", serde_json::to_string_pretty(&suggestions)?);
    Ok(())
}

async fn run_search(
    config: &ServiceConfig,
    origin: &str,
    destinations: &[String],
    from: NaiveDate,
    to: NaiveDate,
    passengers: Option<u32>,
) -> Result<()> {
    if config.flight_api_key.is_empty() {
        anyhow::bail!("FLIGHT_API_KEY is not set");
    }

    let store = Arc::new(InMemoryStore::new());
    let rates = HttpRateFetcher::new(&config.fx_base, config.http_timeout)?;
    let fetcher = HttpSearchFetcher::new(&config.flight_api_base, &config.flight_api_key, config.http_timeout)?;
    let service = FlightSearchService::new(store, rates, fetcher).configure(config);

    let requests: Vec<SearchParams> = destinations
        .iter()
        .map(|destination| {
            let mut params = SearchParams::new(origin, from, to).with_destination(destination);
            params.passengers = passengers;
            params
        })
        .collect();

    let outcomes = join_all(requests.iter().map(|params| service.search(params, None))).await;

    let mut failures = 0;
    for (params, outcome) in requests.iter().zip(outcomes) {
        let destination = params.destination.as_deref().unwrap_or("*");
        match outcome {
            Ok(SearchOutcome::Deals(results)) => {
                println!("{} -> {} (etag {})", params.origin, destination, results.etag);
                println!("{}", serde_json::to_string_pretty(&results.deals)?);
            }
            Ok(SearchOutcome::NotModified { etag, .. }) => {
                println!("{} -> {}: not modified ({})", params.origin, destination, etag);
            }
            Err(e) => {
                failures += 1;
                error!(destination, error = %e, "search failed");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} searches failed", failures, requests.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = ServiceConfig::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Weekends { from, count } => run_weekends(&config, from, count).await,
        Commands::Search {
            origin,
            destinations,
            from,
            to,
            passengers,
        } => run_search(&config, &origin, &destinations, from, to, passengers).await,
    }
}
