//! PARLAY — football accumulator ticket builder.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the feed client, runs one fetch→normalize→assemble pass for
//! the requested date, and prints the rendered tickets to stdout for
//! the delivery collaborators.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use tracing::info;

use parlay::config::AppConfig;
use parlay::feed::ApiFootballClient;
use parlay::pipeline::TicketPipeline;
use parlay::render;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("PARLAY_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    // Date: first CLI argument (YYYY-MM-DD) or today.
    let date = match std::env::args().nth(1) {
        Some(arg) => NaiveDate::parse_from_str(&arg, "%Y-%m-%d")
            .with_context(|| format!("Invalid date argument: {arg}"))?,
        None => Utc::now().date_naive(),
    };

    info!(
        %date,
        tiers = cfg.tiers.len(),
        targets = cfg.tickets.targets.len(),
        "PARLAY starting up"
    );

    // Fails before any network call when the API key env var is unset.
    let client = ApiFootballClient::new(&cfg.api)?;
    let pipeline = TicketPipeline::new(client, cfg);

    let tickets = pipeline.run(date).await?;

    if tickets.is_empty() {
        info!("No tickets produced");
        println!("No tickets produced");
        return Ok(());
    }

    for ticket in &tickets {
        println!(
            "🎫 Ticket #{}\n{}\n{}",
            ticket.index,
            render::render_ticket(ticket),
            "-".repeat(64),
        );
    }

    info!(tickets = tickets.len(), "Run finished");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("parlay=info"));

    let json_logging = std::env::var("PARLAY_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
