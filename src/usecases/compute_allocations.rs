use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::models::{round_money, Snapshot, ValuationRecord};
use crate::usecases::valuation::ValuationResult;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Sets each record's `portfolio_share` to its percentage of the total market
/// value. When the total is zero every share is zero.
///
/// Shares are derived from `market_value` alone, so re-running over the same
/// records gives the same shares.
pub fn compute_allocations(records: &mut [ValuationRecord]) -> Decimal {
    let total_market_value: Decimal = records.iter().map(|r| r.market_value).sum();

    for record in records.iter_mut() {
        record.portfolio_share = if total_market_value > Decimal::ZERO {
            round_money(HUNDRED * record.market_value / total_market_value)
        } else {
            Decimal::ZERO
        };
    }
    total_market_value
}

/// Builds the snapshot for one cycle from per-holding results in registry order.
pub fn build_snapshot(
    cycle: u64,
    results: Vec<ValuationResult>,
    completed_at: DateTime<Utc>,
) -> Snapshot {
    let mut records = Vec::with_capacity(results.len());
    let mut failed_symbols = Vec::new();
    for result in results {
        match result {
            Ok(record) => records.push(record),
            Err(failure) => failed_symbols.push(failure.symbol),
        }
    }

    let total_market_value = compute_allocations(&mut records);
    let total_invested_value = records.iter().map(|r| r.invested_value).sum();

    Snapshot {
        cycle,
        completed_at: Some(completed_at),
        records,
        failed_symbols,
        total_market_value,
        total_invested_value,
    }
}
