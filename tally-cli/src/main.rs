//! Tally CLI
//!
//! Runs the API server, or answers one-off quote, history, and LLM queries
//! through the same caches the server uses.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tally_api::{ApiConfig, ApiServer, AppState};
use tally_core::keys::{symbol_key, symbol_keys};
use tally_core::types::{Completion, CompletionRequest};

/// Tally - cached market data and LLM answers for a personal-finance dashboard
#[derive(Parser)]
#[command(name = "tally")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3001", env = "PORT")]
        port: u16,
        /// Bind address
        #[arg(short, long, default_value = "0.0.0.0")]
        bind: IpAddr,
    },

    /// Fetch live quotes
    Quote {
        /// Ticker symbols (e.g. AAPL MSFT ^GSPC)
        #[arg(required = true)]
        symbols: Vec<String>,
    },

    /// Show recent daily closes
    History {
        /// Ticker symbol
        symbol: String,
        /// Number of most recent trading days to show
        #[arg(short, long, default_value = "10")]
        days: usize,
    },

    /// Ask the LLM
    Ask {
        /// Prompt text
        prompt: String,
        /// System instruction
        #[arg(short, long)]
        system: Option<String>,
        /// JSON schema file for a structured answer
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Ground the answer with a web search
        #[arg(long)]
        web: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "tally=debug,info"
    } else {
        "tally=info,warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve { port, bind } => cmd_serve(port, bind).await,
        Commands::Quote { symbols } => cmd_quote(&symbols).await,
        Commands::History { symbol, days } => cmd_history(&symbol, days).await,
        Commands::Ask {
            prompt,
            system,
            schema,
            web,
        } => cmd_ask(prompt, system, schema, web).await,
    }
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

/// Run API server
async fn cmd_serve(port: u16, bind: IpAddr) -> Result<()> {
    println!("{}", "🚀 Starting Tally API server...".cyan().bold());
    println!("   {} http://{}:{}", "Listening on:".green(), bind, port);
    println!("   {} http://{}:{}/health", "Health check:".dimmed(), bind, port);
    println!("\n   Press Ctrl+C to stop.\n");

    let server = ApiServer::new(ApiConfig::from_env());
    server
        .run((bind, port))
        .await
        .with_context(|| format!("API server on {bind}:{port} failed"))?;

    Ok(())
}

/// Fetch live quotes
async fn cmd_quote(symbols: &[String]) -> Result<()> {
    let keys = symbol_keys(&symbols.join(",")).context("Invalid symbol list")?;
    let state = AppState::new(ApiConfig::from_env());

    let pb = spinner(&format!("Fetching {} quote(s)...", keys.len()))?;
    let result = state.quote_batch(keys).await;
    pb.finish_and_clear();
    let outcome = result.context("Quote lookup failed")?;

    let mut symbols: Vec<&String> = outcome.results.keys().collect();
    symbols.sort();

    println!("{}", "📈 Quotes".cyan().bold());
    for symbol in symbols {
        let resolved = &outcome.results[symbol];
        let quote = &resolved.value;
        let change = format_change(quote.change_percent());
        let marker = if resolved.stale {
            format!(" (stale, {}s old)", resolved.age.as_secs()).yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "   {:<10} {:>12.2} {:<4} {}{}",
            symbol.bold(),
            quote.price,
            quote.currency,
            change,
            marker
        );
    }

    for failure in &outcome.failures {
        println!("   {} {}: {}", "✗".red(), failure.key, failure.error);
    }

    Ok(())
}

/// Show recent daily closes
async fn cmd_history(symbol: &str, days: usize) -> Result<()> {
    let symbol = symbol_key(symbol).context("Invalid symbol")?;
    let state = AppState::new(ApiConfig::from_env());

    let pb = spinner(&format!("Fetching history for {symbol}..."))?;
    let result = state.daily_history(&symbol).await;
    pb.finish_and_clear();
    let series = result.context("History lookup failed")?;

    println!("{} {}", "📊 Daily closes:".cyan().bold(), symbol);
    let points = &series.value;
    debug!(total = points.len(), "History received");
    for point in points.iter().skip(points.len().saturating_sub(days)) {
        println!("   {}  {:>12.2}", point.date, point.close);
    }
    if points.is_empty() {
        println!("   {}", "No data.".yellow());
    }

    Ok(())
}

/// Ask the LLM
async fn cmd_ask(
    prompt: String,
    system: Option<String>,
    schema: Option<PathBuf>,
    web: bool,
) -> Result<()> {
    let mut request = CompletionRequest::new(prompt);
    if let Some(system) = system {
        request = request.with_system_instruction(system);
    }
    if let Some(path) = schema {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read schema {}", path.display()))?;
        let schema = serde_json::from_str(&raw)
            .with_context(|| format!("Schema {} is not valid JSON", path.display()))?;
        request = request.with_schema(schema);
    }
    if web {
        request = request.with_internet_context();
    }

    let state = AppState::new(ApiConfig::from_env());
    let pb = spinner("Thinking...")?;
    let result = state.complete(request).await;
    pb.finish_and_clear();
    let (_, answer) = result.context("Completion failed")?;

    match answer.value {
        Completion::Text(text) => println!("{text}"),
        Completion::Structured(value) => println!("{}", serde_json::to_string_pretty(&value)?),
    }

    Ok(())
}

fn format_change(percent: Option<f64>) -> String {
    match percent {
        Some(p) if p > 0.0 => format!("+{p:.2}%").green().to_string(),
        Some(p) if p < 0.0 => format!("{p:.2}%").red().to_string(),
        Some(p) => format!("{p:.2}%"),
        None => "n/a".dimmed().to_string(),
    }
}
