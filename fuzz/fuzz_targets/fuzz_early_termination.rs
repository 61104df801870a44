#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use bnsl_settlement::{
    compute_distribution_schedule, compute_early_termination_settlement, compute_locked_principal,
    maturity_date, realize_distribution,
};
use bnsl_types::{Activation, Plan, PlanStatus, PlanTerms};
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;

#[derive(Arbitrary, Debug)]
struct TerminationInput {
    milligrams: u32,
    locked_cents: u32,
    spot_cents: u32,
    tenor_quarters: u8,
    rate_bp: u16,
    admin_bp: u16,
    penalty_bp: u16,
    first_paid: bool,
}

fuzz_target!(|data: TerminationInput| {
    let grams = Decimal::new(i64::from(data.milligrams % 100_000_000) + 1, 3);
    let locked = Decimal::new(i64::from(data.locked_cents % 10_000_000) + 1, 2);
    let spot = Decimal::new(i64::from(data.spot_cents % 10_000_000) + 1, 2);
    let tenor = u32::from(data.tenor_quarters % 40 + 1) * 3;
    let rate = Decimal::new(i64::from(data.rate_bp % 10_000) + 1, 2);
    let admin = Decimal::new(i64::from(data.admin_bp), 2);
    let penalty = Decimal::new(i64::from(data.penalty_bp), 2);

    let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let start = now.date_naive();
    let terms = PlanTerms {
        principal_gold_grams: grams,
        locked_in_price_per_gram: locked,
        tenor_months: tenor,
        annual_rate_percent: rate,
    };
    let principal = compute_locked_principal(grams, locked).unwrap();
    let mut plan = Plan::new_pending("fuzz".to_string(), terms, now, 0);
    plan.distributions = compute_distribution_schedule(principal, rate, tenor, start).unwrap();
    plan.activation = Some(Activation {
        locked_principal_value_usd: principal,
        start_date: start,
        maturity_date: maturity_date(start, tenor).unwrap(),
        activated_at: now,
    });
    plan.transition(PlanStatus::Active).unwrap();

    if data.first_paid {
        let first = plan.distributions[0].clone();
        let paid = realize_distribution(&first, spot, first.scheduled_date, now).unwrap();
        plan.apply_paid_distribution(paid).unwrap();
    }

    if let Ok(s) = compute_early_termination_settlement(&plan, spot, admin, penalty) {
        assert!(s.payout_usd >= Decimal::ZERO);
        assert!(s.payout_usd <= principal);
        assert!(s.base_value_usd <= principal);
        assert!(s.payout_gold_grams * spot <= s.payout_usd);
        assert_eq!(
            s.forfeited_distributions.len(),
            plan.distributions.len() - usize::from(data.first_paid)
        );
    } else {
        assert!(admin + penalty > Decimal::ONE_HUNDRED);
    }
});
