//! Pure BNSL settlement arithmetic.
//!
//! Nothing here touches storage, clocks or the network: every function takes
//! the plan data and a spot price and returns a value or a `PlanError`. The
//! lifecycle controller decides when to call them and persists the results.

pub mod portfolio;

use bnsl_config::FeeSchedule;
use bnsl_types::{
    Distribution, DistributionStatus, EarlyTerminationSettlement, MaturitySettlement, Plan,
    PlanError,
};
use chrono::{DateTime, Months, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Gram quantities credited to holders keep six decimals (one microgram).
pub const GRAM_SCALE: u32 = 6;
/// USD amounts are booked in cents.
pub const USD_SCALE: u32 = 2;
pub const MONTHS_PER_DISTRIBUTION: u32 = 3;
const DISTRIBUTIONS_PER_YEAR: Decimal = dec!(4);

fn ensure_positive(name: &str, value: Decimal) -> Result<(), PlanError> {
    if value <= Decimal::ZERO {
        return Err(PlanError::invalid(format!("{name} must be positive, got {value}")));
    }
    Ok(())
}

fn out_of_range(what: &str) -> PlanError {
    PlanError::invalid(format!("{what} is out of range"))
}

fn percent_fraction(percent: Decimal) -> Decimal {
    percent / Decimal::ONE_HUNDRED
}

/// Grams owed to a holder, truncated so the platform never over-credits.
fn grams_down(grams: Decimal) -> Decimal {
    grams.round_dp_with_strategy(GRAM_SCALE, RoundingStrategy::ToZero)
}

fn add_months(start: NaiveDate, months: u32) -> Result<NaiveDate, PlanError> {
    start
        .checked_add_months(Months::new(months))
        .ok_or_else(|| PlanError::invalid(format!("{start} + {months} months is out of range")))
}

/// `goldGrams × lockedPrice`; both must be positive.
pub fn compute_locked_principal(gold_grams: Decimal, locked_price: Decimal) -> Result<Decimal, PlanError> {
    ensure_positive("gold grams", gold_grams)?;
    ensure_positive("locked price", locked_price)?;
    gold_grams
        .checked_mul(locked_price)
        .ok_or_else(|| out_of_range("locked principal"))
}

pub fn distribution_count(tenor_months: u32) -> u32 {
    tenor_months / MONTHS_PER_DISTRIBUTION
}

pub fn maturity_date(start_date: NaiveDate, tenor_months: u32) -> Result<NaiveDate, PlanError> {
    add_months(start_date, tenor_months)
}

/// Quarterly share of the annual rate, in cents.
pub fn quarterly_distribution_value(
    locked_principal_usd: Decimal,
    annual_rate_percent: Decimal,
) -> Decimal {
    (locked_principal_usd * percent_fraction(annual_rate_percent) / DISTRIBUTIONS_PER_YEAR)
        .round_dp(USD_SCALE)
}

/// Builds the full payout calendar once, at activation. Each entry carries the
/// same fixed USD value; grams are decided only when it is realized.
pub fn compute_distribution_schedule(
    locked_principal_usd: Decimal,
    annual_rate_percent: Decimal,
    tenor_months: u32,
    start_date: NaiveDate,
) -> Result<Vec<Distribution>, PlanError> {
    ensure_positive("locked principal", locked_principal_usd)?;
    ensure_positive("annual rate", annual_rate_percent)?;
    let count = distribution_count(tenor_months);
    if count == 0 {
        return Err(PlanError::invalid(format!(
            "a {tenor_months}-month tenor has no quarterly distribution"
        )));
    }

    let value = quarterly_distribution_value(locked_principal_usd, annual_rate_percent);
    (1..=count)
        .map(|seq| {
            let scheduled = add_months(start_date, seq * MONTHS_PER_DISTRIBUTION)?;
            Ok(Distribution::upcoming(seq, scheduled, value))
        })
        .collect()
}

/// Pays one distribution at the current spot price. The USD value is fixed,
/// so the grams credited move inversely with the market.
pub fn realize_distribution(
    distribution: &Distribution,
    current_spot_price: Decimal,
    today: NaiveDate,
    paid_at: DateTime<Utc>,
) -> Result<Distribution, PlanError> {
    match distribution.status {
        DistributionStatus::Paid => {
            return Err(PlanError::AlreadyPaid {
                sequence_number: distribution.sequence_number,
            })
        }
        DistributionStatus::Forfeited => {
            return Err(PlanError::DistributionForfeited {
                sequence_number: distribution.sequence_number,
            })
        }
        DistributionStatus::Upcoming => {}
    }
    if today < distribution.scheduled_date {
        return Err(PlanError::DistributionNotDue {
            sequence_number: distribution.sequence_number,
            scheduled_date: distribution.scheduled_date,
            today,
        });
    }
    ensure_positive("spot price", current_spot_price)?;

    let grams = distribution
        .monetary_value_usd
        .checked_div(current_spot_price)
        .ok_or_else(|| out_of_range(&format!("distribution #{} in grams", distribution.sequence_number)))?;

    let mut realized = distribution.clone();
    realized.gold_credited_grams = Some(grams_down(grams));
    realized.market_price_used_per_gram = Some(current_spot_price);
    realized.paid_at = Some(paid_at);
    realized.status = DistributionStatus::Paid;
    Ok(realized)
}

/// Principal returned at full term: the same grams that were locked, valued at
/// the locked-in price for display. Spot price plays no part.
pub fn compute_maturity_settlement(plan: &Plan) -> Result<MaturitySettlement, PlanError> {
    plan.active_terms()?;
    let unpaid = plan.unpaid_count();
    if unpaid > 0 {
        return Err(PlanError::IncompleteDistributions { unpaid });
    }
    let grams = plan.terms.principal_gold_grams;
    Ok(MaturitySettlement {
        gold_returned_grams: grams,
        usd_equivalent: compute_locked_principal(grams, plan.terms.locked_in_price_per_gram)?,
    })
}

/// Early exit payout.
///
/// 1. base = min(locked principal, principal grams × spot)
/// 2. after fees = base × (1 − admin% − penalty%)
/// 3. clawback = value of distribution #1 if it was paid
/// 4. payout = max(0, after fees − clawback), in cents, rounded down
/// 5. payout grams = payout / spot, rounded down
/// 6. every Upcoming distribution is forfeited
pub fn compute_early_termination_settlement(
    plan: &Plan,
    current_spot_price: Decimal,
    admin_fee_percent: Decimal,
    penalty_percent: Decimal,
) -> Result<EarlyTerminationSettlement, PlanError> {
    let activation = plan.active_terms()?;
    ensure_positive("spot price", current_spot_price)?;
    if admin_fee_percent < Decimal::ZERO || penalty_percent < Decimal::ZERO {
        return Err(PlanError::invalid("fee percentages cannot be negative"));
    }
    let retained = Decimal::ONE - percent_fraction(admin_fee_percent) - percent_fraction(penalty_percent);
    if retained < Decimal::ZERO {
        return Err(PlanError::invalid(format!(
            "admin fee {admin_fee_percent}% and penalty {penalty_percent}% exceed the whole value"
        )));
    }

    let market_value = plan
        .terms
        .principal_gold_grams
        .checked_mul(current_spot_price)
        .ok_or_else(|| out_of_range("principal at spot"))?;
    let base_value_usd = activation.locked_principal_value_usd.min(market_value);
    let after_fees_usd = base_value_usd
        .checked_mul(retained)
        .ok_or_else(|| out_of_range("value after fees"))?;

    let first_distribution_clawback_usd = plan
        .distributions
        .first()
        .filter(|d| d.status == DistributionStatus::Paid)
        .map(|d| d.monetary_value_usd)
        .unwrap_or(Decimal::ZERO);

    let payout_usd = (after_fees_usd - first_distribution_clawback_usd)
        .max(Decimal::ZERO)
        .round_dp_with_strategy(USD_SCALE, RoundingStrategy::ToZero);
    let payout_gold_grams = grams_down(
        payout_usd
            .checked_div(current_spot_price)
            .ok_or_else(|| out_of_range("payout in grams"))?,
    );

    let forfeited_distributions = plan
        .distributions
        .iter()
        .filter(|d| d.status == DistributionStatus::Upcoming)
        .map(|d| d.sequence_number)
        .collect();

    Ok(EarlyTerminationSettlement {
        spot_price_per_gram: current_spot_price,
        base_value_usd,
        admin_fee_percent,
        penalty_percent,
        after_fees_usd,
        first_distribution_clawback_usd,
        payout_usd,
        payout_gold_grams,
        forfeited_distributions,
    })
}

/// Early exit priced with the platform's configured fee schedule.
pub fn quote_early_termination(
    plan: &Plan,
    current_spot_price: Decimal,
    fees: &FeeSchedule,
) -> Result<EarlyTerminationSettlement, PlanError> {
    compute_early_termination_settlement(
        plan,
        current_spot_price,
        fees.admin_fee_percent,
        fees.early_withdrawal_penalty_percent,
    )
}
