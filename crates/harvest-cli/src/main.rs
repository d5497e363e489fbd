//! Harvest Prediction CLI
//!
//! A command-line tool for requesting paddy extent and production
//! predictions, browsing saved predictions and load testing the service.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{history, load, predict};

/// Harvest Prediction CLI
#[derive(Parser)]
#[command(name = "harvest")]
#[command(author, version, about = "CLI for the Paddy Harvest Prediction API", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via HARVEST_API_URL env var)
    #[arg(long, env = "HARVEST_API_URL")]
    pub api_url: Option<String>,

    /// Bearer token; predictions are saved to your history when set
    #[arg(long, env = "HARVEST_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Predict cultivated extent and production
    Predict {
        /// Harvest year
        #[arg(long)]
        year: i32,

        /// Season (Yala or Maha)
        #[arg(long)]
        season: Option<String>,

        /// District name, e.g. ANURADHAPURA
        #[arg(long)]
        district: String,

        /// Sown area in hectares
        #[arg(long)]
        sown_hect: f64,

        /// Yield of the previous comparable season
        #[arg(long)]
        previous_yield: f64,

        /// Production of the previous comparable season (required for Maha)
        #[arg(long)]
        previous_production: Option<f64>,
    },

    /// List your most recent predictions
    History {
        /// Maximum number of records
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Show a saved prediction
    Show {
        /// Record ID
        id: String,
    },

    /// Show service health and readiness
    Health,

    /// Send randomized prediction requests and report latency
    Load {
        /// Total number of requests
        #[arg(long, short = 'n', default_value_t = 100)]
        requests: usize,

        /// Requests in flight at once
        #[arg(long, short, default_value_t = 10)]
        concurrency: usize,

        /// Season for generated requests
        #[arg(long)]
        season: Option<String>,

        /// District for generated requests
        #[arg(long, default_value = load::DEFAULT_DISTRICT)]
        district: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::Config::load()?;

    // Initialize client
    let client = client::ApiClient::new(&settings.api_url(cli.api_url), settings.token(cli.token))?;

    // Execute command
    match cli.command {
        Commands::Predict {
            year,
            season,
            district,
            sown_hect,
            previous_yield,
            previous_production,
        } => {
            let season = settings
                .season(season)
                .ok_or_else(|| anyhow::anyhow!("--season is required"))?;
            let input = client::PredictionInput {
                year,
                season,
                district,
                sown_hect,
                previous_yield,
                previous_production,
            };
            predict::predict(&client, input, cli.format).await?;
        }
        Commands::History { limit } => {
            history::show_history(&client, limit, cli.format).await?;
        }
        Commands::Show { id } => {
            history::show_record(&client, &id, cli.format).await?;
        }
        Commands::Health => {
            history::show_health(&client, cli.format).await?;
        }
        Commands::Load {
            requests,
            concurrency,
            season,
            district,
        } => {
            let options = load::LoadOptions {
                requests,
                concurrency,
                season: settings.season(season).unwrap_or_else(|| "Yala".to_string()),
                district,
            };
            load::run_load(client, options, cli.format).await?;
        }
    }

    Ok(())
}
