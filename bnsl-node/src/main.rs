mod gateways;

use anyhow::{Context, Result};
use bnsl_config::PlatformConfig;
use bnsl_lifecycle::{ApprovalGate, LifecycleController, StaticApprovalGate, SweepService};
use bnsl_oracles::{FixedPriceOracle, GoldPriceFeed, PriceOracle};
use bnsl_storage::PlanLedger;
use clap::Parser;
use gateways::{HttpApprovalGate, HttpWalletCredit};
use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about = "BNSL gold plan service")]
struct Args {
    /// JSON platform configuration; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long, default_value = "./data")]
    data_dir: String,
    #[arg(long, default_value = "info")]
    log_level: String,
    /// Serve a constant gold price (USD/g) instead of the live feed.
    #[arg(long)]
    fixed_price: Option<Decimal>,
    /// Approve every plan without asking the approval service.
    #[arg(long)]
    auto_approve: bool,
}

#[cfg(feature = "rocksdb")]
fn open_ledger(data_dir: &str) -> Result<Arc<dyn PlanLedger>> {
    let ledger = bnsl_storage::db::RocksPlanLedger::open(data_dir)
        .with_context(|| format!("Failed to open plan ledger at {data_dir}"))?;
    Ok(Arc::new(ledger))
}

#[cfg(not(feature = "rocksdb"))]
fn open_ledger(_data_dir: &str) -> Result<Arc<dyn PlanLedger>> {
    warn!("Built without the rocksdb feature; plans are kept in memory only");
    Ok(Arc::new(bnsl_storage::InMemoryPlanLedger::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level: Level = args
        .log_level
        .parse()
        .with_context(|| format!("Unknown log level {:?}", args.log_level))?;
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install logger")?;

    info!("Starting BNSL node...");

    let config = match &args.config {
        Some(path) => PlatformConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => {
            info!("No configuration file given, using defaults");
            PlatformConfig::default()
        }
    };
    let config = Arc::new(config);

    let ledger = open_ledger(&args.data_dir)?;

    let oracle: Arc<dyn PriceOracle> = match args.fixed_price {
        Some(price) => {
            warn!("Serving a fixed gold price of {} USD/g", price);
            Arc::new(FixedPriceOracle::new(price))
        }
        None => Arc::new(GoldPriceFeed::new(&config.oracle).context("Failed to build gold price feed")?),
    };

    let wallet = Arc::new(HttpWalletCredit::new(&config.gateways).context("Failed to build wallet client")?);
    let approvals: Arc<dyn ApprovalGate> = if args.auto_approve {
        warn!("Every plan is auto-approved");
        Arc::new(StaticApprovalGate::allow_all())
    } else {
        Arc::new(HttpApprovalGate::new(&config.gateways).context("Failed to build approval client")?)
    };

    let controller = Arc::new(LifecycleController::new(
        ledger,
        oracle,
        wallet,
        approvals,
        config.clone(),
    ));

    let sweep = SweepService::new(controller.clone(), Duration::from_secs(config.sweep.interval_secs));
    tokio::spawn(sweep.run());

    let addr: SocketAddr = config
        .api
        .bind_addr
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.api.bind_addr))?;
    let api_state = bnsl_api::AppState::new(controller);
    tokio::spawn(async move {
        if let Err(e) = bnsl_api::start_server(api_state, addr).await {
            error!("API server stopped: {}", e);
        }
    });

    info!("Node running. Press Ctrl+C to stop.");
    signal::ctrl_c().await?;
    info!("Shutting down");

    Ok(())
}
