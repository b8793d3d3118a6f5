use anyhow::Context;
use clap::Parser;
use dipbot::config::BotConfig;
use dipbot::exchange::{BinanceClient, ExchangeGateway, PaperExchange};
use dipbot::execution::{EngineState, TradingEngine};
use dipbot::strategy::BaselineTracker;
use dipbot::web;
use dipbot::BotController;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "dipbot=info";

/// Dip-buying spot trading bot with an HTTP start/stop/status API
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Optional TOML config file (environment variables take precedence)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the control API bind address
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Simulate fills against an in-memory wallet instead of placing real orders
    #[arg(long)]
    paper: bool,

    /// Start the trading loop immediately instead of waiting for GET /start
    #[arg(long)]
    autostart: bool,

    /// tracing filter directive (RUST_LOG wins when set)
    #[arg(long, default_value = DEFAULT_LOG_FILTER)]
    log_filter: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    setup_logging(&args.log_filter);

    tracing::info!("🚀 dipbot starting");

    let mut builder = BotConfig::builder(args.config.as_deref())?;
    if args.paper {
        builder = builder.set_override("paper_trading", true)?;
    }
    if let Some(bind) = args.bind {
        builder = builder.set_override("bind_addr", bind.to_string())?;
    }
    let config = BotConfig::from_builder(builder).context("Invalid configuration")?;

    log_configuration(&config);

    let gateway = build_gateway(&config)?;
    let tracker = BaselineTracker::new(
        gateway.clone(),
        config.time_interval.clone(),
        config.baseline_periods,
    );
    let engine = TradingEngine::new(
        config.engine_settings(),
        gateway,
        tracker,
        Arc::new(EngineState::new()),
    )?;
    let bot = Arc::new(BotController::new(Arc::new(engine), config.stop_timeout()));

    if args.autostart {
        bot.start().await?;
    }

    web::serve(config.bind_addr, bot.clone(), shutdown_signal()).await?;

    bot.shutdown().await;
    tracing::info!("👋 dipbot stopped");
    Ok(())
}

fn setup_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_gateway(config: &BotConfig) -> anyhow::Result<Arc<dyn ExchangeGateway>> {
    let client = BinanceClient::new(
        config.exchange_base_url.clone(),
        config.api_key.clone(),
        config.secret_key.clone(),
        config.rate_limit_per_minute,
    )
    .context("Failed to build exchange client")?;

    if !config.paper_trading {
        return Ok(Arc::new(client));
    }

    let quote_balance = config.paper_quote_balance();
    let mut paper = PaperExchange::new(Arc::new(client));
    // Every pair's quote asset starts with the same paper budget
    for pair in &config.target_pairs {
        paper = paper.with_balance(pair.quote(), quote_balance);
    }

    tracing::info!("📝 Paper trading with {:.2} per quote asset", quote_balance);
    Ok(Arc::new(paper))
}

fn log_configuration(config: &BotConfig) {
    tracing::info!("📊 Configuration:");
    tracing::info!("  Exchange: {}", config.exchange_base_url);
    tracing::info!("  Paper trading: {}", config.paper_trading);
    tracing::info!("  Investment: {:.2}", config.investment);
    tracing::info!("  Buy threshold: {}% below baseline", config.threshold_percent);
    tracing::info!("  Sell margin: x{}", config.sell_profit_margin);
    tracing::info!(
        "  Baseline: mean of {} x {} candles",
        config.baseline_periods,
        config.time_interval
    );
    tracing::info!("  Cycle interval: {}s", config.sleep_interval_secs);
    tracing::info!("  Pairs: {}", config.target_pairs.len());
    for pair in &config.target_pairs {
        tracing::info!("    - {}", pair);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("⚠️  Received Ctrl+C, shutting down...");
}
