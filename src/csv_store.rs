use csv::ReaderBuilder;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::io::Read;
use std::str::FromStr;

use crate::domain::models::Holding;
use crate::error::ConfigError;

#[derive(Debug, Deserialize)]
struct HoldingCsv {
    symbol: String,
    quantity: u32,
    purchase_price: String,
}

pub trait HoldingsStore {
    fn read_holdings(&self, path: &str) -> Result<Vec<Holding>, ConfigError>;
}

pub struct FileCsvStore;

impl HoldingsStore for FileCsvStore {
    fn read_holdings(&self, path: &str) -> Result<Vec<Holding>, ConfigError> {
        let file = std::fs::File::open(path).map_err(csv::Error::from)?;
        parse_holdings(file)
    }
}

/// Parses a `symbol,quantity,purchase_price` CSV and validates the result.
pub fn parse_holdings<R: Read>(reader: R) -> Result<Vec<Holding>, ConfigError> {
    let mut rdr = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .has_headers(true)
        .from_reader(reader);
    let mut holdings = Vec::new();
    for result in rdr.deserialize::<HoldingCsv>() {
        let row = result?;
        let cost_basis = Decimal::from_str(&row.purchase_price).map_err(|_| {
            ConfigError::InvalidCostBasis {
                symbol: row.symbol.clone(),
                value: row.purchase_price.clone(),
            }
        })?;
        holdings.push(Holding::new(row.symbol, row.quantity, cost_basis));
    }
    validate_holdings(&holdings)?;
    Ok(holdings)
}

pub fn validate_holdings(holdings: &[Holding]) -> Result<(), ConfigError> {
    if holdings.is_empty() {
        return Err(ConfigError::NoHoldings);
    }
    let mut seen = HashSet::new();
    for (i, h) in holdings.iter().enumerate() {
        if h.symbol.trim().is_empty() {
            // data rows start at 1, after the header
            return Err(ConfigError::EmptySymbol(i + 1));
        }
        if h.cost_basis <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveCostBasis(h.symbol.clone()));
        }
        if !seen.insert(h.symbol.as_str()) {
            return Err(ConfigError::DuplicateSymbol(h.symbol.clone()));
        }
    }
    Ok(())
}

/// Positions tracked when no holdings file is configured.
pub fn default_holdings() -> Vec<Holding> {
    [
        ("AAPL", 3, 180),
        ("TCS.NS", 2, 3700),
        ("RELIANCE.NS", 5, 2500),
        ("HDFCBANK.NS", 8, 1600),
        ("LT.NS", 4, 3000),
        ("INFY.NS", 6, 1500),
        ("ICICIBANK.NS", 10, 950),
        ("SBIN.NS", 12, 600),
        ("BAJFINANCE.NS", 3, 7000),
        ("HINDUNILVR.NS", 7, 2400),
        ("ITC.NS", 88, 450),
        ("WIPRO.NS", 9, 400),
        ("AXISBANK.NS", 5, 950),
        ("MARUTI.NS", 2, 9200),
        ("HCLTECH.NS", 6, 1100),
        ("NTPC.NS", 20, 280),
        ("JSWSTEEL.NS", 96, 800),
        ("TATASTEEL.NS", 10, 120),
        ("GOOGL", 1, 2800),
    ]
    .into_iter()
    .map(|(symbol, qty, price)| Holding::new(symbol, qty, Decimal::from(price)))
    .collect()
}
