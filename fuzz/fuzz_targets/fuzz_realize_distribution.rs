#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use bnsl_settlement::realize_distribution;
use bnsl_types::{Distribution, DistributionStatus, PlanError};
use chrono::{Days, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

#[derive(Arbitrary, Debug)]
struct RealizeInput {
    value_cents: u32,
    spot_cents: i32,
    day_offset: i16,
    status: u8,
}

fuzz_target!(|data: RealizeInput| {
    let scheduled = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
    let today = if data.day_offset >= 0 {
        scheduled + Days::new(data.day_offset as u64)
    } else {
        scheduled - Days::new(u64::from(data.day_offset.unsigned_abs()))
    };
    let value = Decimal::new(i64::from(data.value_cents), 2);
    let spot = Decimal::new(i64::from(data.spot_cents), 2);

    let mut distribution = Distribution::upcoming(1, scheduled, value);
    distribution.status = match data.status % 3 {
        0 => DistributionStatus::Upcoming,
        1 => DistributionStatus::Paid,
        _ => DistributionStatus::Forfeited,
    };
    let paid_at = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();

    match realize_distribution(&distribution, spot, today, paid_at) {
        Ok(realized) => {
            assert_eq!(realized.status, DistributionStatus::Paid);
            assert_eq!(realized.monetary_value_usd, value);
            let grams = realized.gold_credited_grams.unwrap();
            assert!(grams * spot <= value);
            assert!(grams.scale() <= 6);
        }
        Err(PlanError::AlreadyPaid { .. }) => assert_eq!(distribution.status, DistributionStatus::Paid),
        Err(PlanError::DistributionForfeited { .. }) => {
            assert_eq!(distribution.status, DistributionStatus::Forfeited)
        }
        Err(PlanError::DistributionNotDue { .. }) => assert!(today < scheduled),
        Err(PlanError::InvalidInput(_)) => assert!(spot <= Decimal::ZERO),
        Err(other) => panic!("unexpected error {other}"),
    }
});
