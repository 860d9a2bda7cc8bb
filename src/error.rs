use thiserror::Error;

/// Errors returned by a quote provider for a single symbol.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuoteError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("upstream returned HTTP {0}")]
    Status(u16),

    #[error("upstream authentication failed: {0}")]
    Auth(String),

    #[error("symbol not found")]
    SymbolNotFound,

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A holding whose quote could not be obtained this cycle.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{symbol}: {cause}")]
pub struct FetchFailure {
    pub symbol: String,
    pub cause: QuoteError,
}

/// Fatal startup errors: bad environment values or a malformed holding list.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    Env { var: &'static str, message: String },

    #[error("failed to read holdings: {0}")]
    Csv(#[from] csv::Error),

    #[error("holding on row {0} has an empty symbol")]
    EmptySymbol(usize),

    #[error("holding {symbol} has an unparseable purchase price {value:?}")]
    InvalidCostBasis { symbol: String, value: String },

    #[error("holding {0} must have a positive purchase price")]
    NonPositiveCostBasis(String),

    #[error("holding {0} is listed more than once")]
    DuplicateSymbol(String),

    #[error("holding list is empty")]
    NoHoldings,
}
