use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Serialize, Serializer};

/// Placeholder the upstream-facing fields fall back to when a value is missing.
pub const NOT_AVAILABLE: &str = "N/A";

const MONEY_DP: u32 = 2;

/// Rounds a monetary amount or percentage to two decimal places.
///
/// Ties round away from zero (1.005 -> 1.01, -1.005 -> -1.01), the same
/// half-up behaviour as fixed-point money formatting.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

// One tracked position. Symbol and cost basis never change after load.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub symbol: String,
    pub quantity: u32,
    pub cost_basis: Decimal,
}

impl Holding {
    pub fn new(symbol: impl Into<String>, quantity: u32, cost_basis: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            cost_basis,
        }
    }
}

/// A numeric figure the upstream may not report (e.g. P/E for an ETF).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    Value(Decimal),
    NotAvailable,
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Metric::Value(v) => Serialize::serialize(v, serializer),
            Metric::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

/// Point-in-time price reading for one symbol, with defaults already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub current_price: Decimal,
    pub exchange: String,
    pub pe_ratio: Metric,
}

impl Quote {
    pub fn new(current_price: Decimal) -> Self {
        Self {
            current_price,
            exchange: NOT_AVAILABLE.to_string(),
            pe_ratio: Metric::NotAvailable,
        }
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    pub fn with_pe_ratio(mut self, pe_ratio: Decimal) -> Self {
        self.pe_ratio = Metric::Value(pe_ratio);
        self
    }
}

/// Derived metrics for one holding in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationRecord {
    pub symbol: String,
    pub exchange: String,
    pub current_price: Decimal,
    pub pe_ratio: Metric,
    pub quantity: u32,
    #[serde(rename = "purchase_price")]
    pub cost_basis: Decimal,
    pub invested_value: Decimal,
    pub market_value: Decimal,
    pub gain_or_loss: Decimal,
    pub portfolio_share: Decimal,
}

/// The published result of one completed cycle.
///
/// `records` follow holding-registry order and only contain holdings whose
/// quote was fetched; `failed_symbols` lists the rest, also in registry order.
/// Cycle 0 is the empty snapshot readers see before the first cycle completes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub cycle: u64,
    pub completed_at: Option<DateTime<Utc>>,
    pub records: Vec<ValuationRecord>,
    pub failed_symbols: Vec<String>,
    pub total_market_value: Decimal,
    pub total_invested_value: Decimal,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
