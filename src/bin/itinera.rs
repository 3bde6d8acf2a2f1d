use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use itinera::api::{peek_first, GenerationRequest};
use itinera::travel::{Interest, MockFallback, Pace, PlanRequest, TravelPlanner};
use itinera::ItineraClient;

#[derive(Parser)]
#[command(name = "itinera", about = "Travel planning with Gemini key rotation and model fallback")]
struct Cli {
    /// Config file (replaces the default search path)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model to request (defaults to the configured default model)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Return built-in demo data when generation fails
    #[arg(long, global = true)]
    fallback: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a day-by-day itinerary
    Itinerary {
        /// Destination city
        city: String,
        /// Number of days (1-10)
        #[arg(long, default_value_t = 3)]
        days: u32,
        /// Relaxed, Moderate or Fast-Paced
        #[arg(long, default_value = "Moderate")]
        pace: Pace,
        /// Interests: Nature, Culinary, Culture, History, Hidden Gem
        #[arg(long = "interest", required = true)]
        interests: Vec<Interest>,
        /// Prefer sustainable options
        #[arg(long)]
        eco: bool,
    },
    /// Recommend places in a city
    Recommend {
        city: String,
        /// Restrict to one category
        #[arg(long)]
        category: Option<Interest>,
    },
    /// Show local etiquette for a city
    Etiquette { city: String },
    /// Plan a map route with locations and connecting lines
    Route {
        prompt: String,
        /// Ask for a timed day plan
        #[arg(long)]
        day_planner: bool,
        /// Print features as they arrive, one JSON object per line
        #[arg(long)]
        stream: bool,
    },
    /// Send a prompt and print only the first streamed chunk
    Stream { prompt: String },
    /// List models that support content generation
    Models,
    /// Show the key pool with masked keys
    Keys,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling request");
            trigger.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let client = match &cli.config {
        Some(path) => ItineraClient::with_config_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ItineraClient::new().context("failed to load configuration")?,
    };

    let cancel = cancel_on_ctrl_c();
    let mut planner: TravelPlanner = client
        .planner(cli.model.as_deref())
        .with_cancellation(cancel.clone());
    if cli.fallback {
        planner = planner.with_fallback(Arc::new(MockFallback::new()));
    }

    match cli.command {
        Commands::Itinerary {
            city,
            days,
            pace,
            interests,
            eco,
        } => {
            let request = PlanRequest::new(city, days, pace, interests).with_eco_focus(eco);
            let itinerary = planner.generate_itinerary(&request).await?;
            print_json(&itinerary)?;
        }
        Commands::Recommend { city, category } => {
            let recommendations = planner.recommend_places(&city, category).await?;
            print_json(&recommendations)?;
        }
        Commands::Etiquette { city } => {
            let guide = planner.etiquette(&city).await?;
            print_json(&guide)?;
        }
        Commands::Route {
            prompt,
            day_planner,
            stream,
        } => {
            if stream {
                let mut features = planner.stream_route(&prompt, day_planner).await?;
                while let Some(feature) = features.next().await {
                    println!("{}", serde_json::to_string(&feature?)?);
                }
            } else {
                let plan = planner.plan_route(&prompt, day_planner).await?;
                print_json(&plan)?;
            }
        }
        Commands::Stream { prompt } => {
            let request = GenerationRequest::from_prompt(prompt);
            let mut stream = client
                .dispatch(cli.model.as_deref(), &request, &cancel)
                .await?;
            tracing::info!(model = stream.model(), attempts = stream.attempts(), "stream opened");
            match peek_first(&mut stream).await? {
                Some(chunk) => print_json(&chunk)?,
                None => anyhow::bail!("stream ended without producing a chunk"),
            }
        }
        Commands::Models => {
            let models = client.list_models().await?;
            print_json(&models)?;
        }
        Commands::Keys => {
            print_json(&client.pool_stats())?;
        }
    }

    Ok(())
}
