use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use places_guard::config::Config;
use places_guard::guard::PlacesGuard;
use places_guard::monitoring::recommend;
use places_guard::response::ReportResponse;
use places_guard::server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "places-guard", version, about = "Usage monitoring for the Places API guard")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve health and usage reports over HTTP
    Serve,
    /// Print the 7-day monitoring report with recommendations
    Report,
    /// Print usage statistics for one category
    Stats {
        category: String,
        #[arg(long, default_value_t = 1)]
        days: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("places_guard={},tower_http=debug", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(
        "Configuration: bind_addr={}, memory_store={}",
        config.bind_addr,
        config.uses_memory_store()
    );

    let guard = Arc::new(
        PlacesGuard::from_config(&config)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize guard: {}", e))?,
    );

    match cli.command {
        Command::Serve => {
            let sweeper = guard.spawn_sweeper(config.sweep_interval());
            let result = Server::new(guard.clone(), config.bind_addr).run().await;
            sweeper.shutdown().await;
            result.map_err(|e| anyhow::anyhow!("Server error: {}", e))?;
        }
        Command::Report => {
            let report = guard.usage().generate_report().await;
            let recommendations = recommend(&report, &guard.policy().recommendations);
            let body = ReportResponse::new(report, recommendations);
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Stats { category, days } => {
            let stats = guard.usage().get_usage_stats(&category, days).await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
