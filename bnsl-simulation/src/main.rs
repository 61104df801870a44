use anyhow::{Context, Result};
use bnsl_config::PlatformConfig;
use bnsl_lifecycle::{InMemoryWallet, LifecycleController, StaticApprovalGate, SweepService};
use bnsl_oracles::FixedPriceOracle;
use bnsl_storage::InMemoryPlanLedger;
use bnsl_types::{PlanError, PlanId};
use chrono::{DateTime, Days, TimeZone, Utc};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "BNSL plan book simulation over a random gold price path")]
struct Args {
    /// Number of plans opened on day zero.
    #[arg(long, default_value_t = 500)]
    plans: usize,
    /// Number of simulated days.
    #[arg(long, default_value_t = 1_100)]
    days: u64,
    /// Starting gold price in USD per gram.
    #[arg(long, default_value = "75")]
    start_price: Decimal,
    /// Largest daily price move, in basis points.
    #[arg(long, default_value_t = 150)]
    volatility_bp: i64,
    /// Daily probability that a holder exits an active plan early.
    #[arg(long, default_value_t = 0.0005)]
    termination_rate: f64,
    /// Daily probability that no gold price is available.
    #[arg(long, default_value_t = 0.01)]
    outage_rate: f64,
    /// Force every plan onto this tenor instead of a random offered one.
    #[arg(long)]
    tenor_months: Option<u32>,
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct SimulationSummary {
    plans_opened: usize,
    distributions_paid: usize,
    matured: usize,
    terminated: usize,
    sweeps_skipped: usize,
    failures: usize,
    outage_days: u64,
    gold_credited_grams: Decimal,
    final_price: Decimal,
}

fn next_price(rng: &mut StdRng, price: Decimal, volatility_bp: i64) -> Decimal {
    if volatility_bp <= 0 {
        return price;
    }
    let step = Decimal::new(rng.gen_range(-volatility_bp..=volatility_bp), 4);
    (price * (Decimal::ONE + step)).round_dp(4).max(Decimal::ONE)
}

async fn run_simulation(args: &Args) -> Result<SimulationSummary> {
    let config = Arc::new(PlatformConfig::default());
    let oracle = Arc::new(FixedPriceOracle::new(args.start_price));
    let wallet = Arc::new(InMemoryWallet::new());
    let controller = Arc::new(LifecycleController::new(
        Arc::new(InMemoryPlanLedger::new()),
        oracle.clone(),
        wallet.clone(),
        Arc::new(StaticApprovalGate::allow_all()),
        config.clone(),
    ));
    let sweep = SweepService::new(controller.clone(), Duration::from_secs(86_400));
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut summary = SimulationSummary::default();

    let start: DateTime<Utc> = Utc
        .with_ymd_and_hms(2026, 1, 1, 12, 0, 0)
        .single()
        .context("invalid simulation start")?;
    let limits = &config.plans;
    let min_grams = limits.min_principal_grams.trunc().try_into().unwrap_or(10i64).max(1);
    let max_grams = 500i64.max(min_grams);

    let mut open: Vec<PlanId> = Vec::with_capacity(args.plans);
    for i in 0..args.plans {
        let grams = Decimal::from(rng.gen_range(min_grams..=max_grams));
        let tenor = match args.tenor_months {
            Some(t) => t,
            None => limits.tenors[rng.gen_range(0..limits.tenors.len())].tenor_months,
        };
        let plan = controller
            .create_plan(&format!("holder-{:04}", i % 97), grams, tenor, start)
            .await?;
        controller.activate(plan.id, start).await?;
        open.push(plan.id);
    }
    summary.plans_opened = open.len();

    let mut price = args.start_price;
    for day in 1..=args.days {
        let now = start
            .checked_add_days(Days::new(day))
            .context("simulation ran past the calendar")?;
        price = next_price(&mut rng, price, args.volatility_bp);
        if rng.gen_bool(args.outage_rate.clamp(0.0, 1.0)) {
            oracle.go_offline();
            summary.outage_days += 1;
        } else {
            oracle.set_price(price);
        }

        let mut still_open = Vec::with_capacity(open.len());
        for id in open {
            if !rng.gen_bool(args.termination_rate.clamp(0.0, 1.0)) {
                still_open.push(id);
                continue;
            }
            match controller.terminate_early(id, now, "simulation").await {
                Ok(_) => summary.terminated += 1,
                Err(PlanError::NotActive { .. }) => {}
                Err(_) => still_open.push(id),
            }
        }
        open = still_open;

        let report = sweep.run_once(now).await?;
        summary.distributions_paid += report.distributions_paid;
        summary.matured += report.matured;
        summary.sweeps_skipped += report.skipped_price_unavailable;
        summary.failures += report.failed;
    }

    summary.gold_credited_grams = wallet.credits().iter().map(|c| c.gold_grams).sum();
    summary.final_price = price;
    Ok(summary)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let started = Instant::now();
    let summary = run_simulation(&args).await?;

    println!("=== BNSL Simulation ===");
    println!("Plans opened: {}", summary.plans_opened);
    println!("Days simulated: {}", args.days);
    println!("Price: {} -> {} USD/g", args.start_price, summary.final_price);
    println!("Price outage days: {}", summary.outage_days);
    println!("Distributions paid: {}", summary.distributions_paid);
    println!("Plans matured: {}", summary.matured);
    println!("Plans terminated early: {}", summary.terminated);
    println!("Plan sweeps skipped (no price): {}", summary.sweeps_skipped);
    println!("Failures: {}", summary.failures);
    println!("Gold credited: {} g", summary.gold_credited_grams);
    println!("Elapsed: {:.2?}", started.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet(plans: usize, days: u64) -> Args {
        Args {
            plans,
            days,
            start_price: Decimal::from(50),
            volatility_bp: 0,
            termination_rate: 0.0,
            outage_rate: 0.0,
            tenor_months: Some(12),
            seed: 1,
        }
    }

    #[tokio::test]
    async fn one_year_book_matures_in_full() {
        let summary = run_simulation(&quiet(5, 370)).await.unwrap();
        assert_eq!(summary.plans_opened, 5);
        assert_eq!(summary.distributions_paid, 20);
        assert_eq!(summary.matured, 5);
        assert_eq!(summary.terminated, 0);
        assert_eq!(summary.failures, 0);
    }

    #[tokio::test]
    async fn outages_delay_but_do_not_lose_payouts() {
        let args = Args {
            outage_rate: 0.3,
            ..quiet(3, 400)
        };
        let summary = run_simulation(&args).await.unwrap();
        assert!(summary.outage_days > 0);
        assert_eq!(summary.distributions_paid, 12);
        assert_eq!(summary.matured, 3);
    }

    #[test]
    fn price_walk_stays_positive() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut price = Decimal::from(2);
        for _ in 0..1_000 {
            price = next_price(&mut rng, price, 5_000);
            assert!(price >= Decimal::ONE);
        }
    }
}
