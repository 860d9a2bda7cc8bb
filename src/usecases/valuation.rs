use futures::future::join_all;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, warn};

use crate::api_client::QuoteProvider;
use crate::domain::models::{round_money, Holding, Quote, ValuationRecord};
use crate::error::{FetchFailure, QuoteError};

pub type ValuationResult = Result<ValuationRecord, FetchFailure>;

/// Combines a holding with its quote. `portfolio_share` stays zero until the
/// record goes through `compute_allocations`.
pub fn value_holding(holding: &Holding, quote: Quote) -> ValuationRecord {
    let quantity = Decimal::from(holding.quantity);
    let invested_value = round_money(quantity * holding.cost_basis);
    let market_value = round_money(quantity * quote.current_price);
    let gain_or_loss = round_money(market_value - invested_value);

    ValuationRecord {
        symbol: holding.symbol.clone(),
        exchange: quote.exchange,
        current_price: quote.current_price,
        pe_ratio: quote.pe_ratio,
        quantity: holding.quantity,
        cost_basis: holding.cost_basis,
        invested_value,
        market_value,
        gain_or_loss,
        portfolio_share: Decimal::ZERO,
    }
}

/// Fetches and values one holding, bounding the fetch by `timeout`.
pub async fn fetch_and_value(
    provider: &dyn QuoteProvider,
    holding: &Holding,
    timeout: Duration,
) -> ValuationResult {
    let fetched = match tokio::time::timeout(timeout, provider.fetch_quote(&holding.symbol)).await
    {
        Ok(result) => result,
        Err(_) => Err(QuoteError::Timeout(timeout)),
    };

    match fetched {
        Ok(quote) => {
            let record = value_holding(holding, quote);
            debug!(
                symbol = %record.symbol,
                price = %record.current_price,
                market_value = %record.market_value,
                "valued holding"
            );
            Ok(record)
        }
        Err(cause) => {
            warn!(symbol = %holding.symbol, error = %cause, "quote fetch failed; holding dropped this cycle");
            Err(FetchFailure {
                symbol: holding.symbol.clone(),
                cause,
            })
        }
    }
}

/// Values every holding concurrently. Results come back in `holdings` order
/// whatever order the fetches complete in.
pub async fn value_holdings(
    provider: &dyn QuoteProvider,
    holdings: &[Holding],
    timeout: Duration,
) -> Vec<ValuationResult> {
    join_all(
        holdings
            .iter()
            .map(|h| fetch_and_value(provider, h, timeout)),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::MockQuoteProvider;
    use crate::domain::models::Metric;
    use rust_decimal_macros::dec;
    use std::time::Instant;

    #[test]
    fn test_value_holding_computes_metrics() {
        let a = value_holding(&Holding::new("A", 10, dec!(100)), Quote::new(dec!(110)));
        assert_eq!(a.invested_value, dec!(1000));
        assert_eq!(a.market_value, dec!(1100));
        assert_eq!(a.gain_or_loss, dec!(100));
        assert_eq!(a.portfolio_share, Decimal::ZERO);

        let b = value_holding(&Holding::new("B", 5, dec!(200)), Quote::new(dec!(180)));
        assert_eq!(b.invested_value, dec!(1000));
        assert_eq!(b.market_value, dec!(900));
        assert_eq!(b.gain_or_loss, dec!(-100));
    }

    #[test]
    fn test_value_holding_rounds_money_to_cents() {
        let rec = value_holding(
            &Holding::new("X", 3, dec!(33.335)),
            Quote::new(dec!(12.3456)).with_exchange("NMS").with_pe_ratio(dec!(17.2)),
        );
        assert_eq!(rec.invested_value, dec!(100.01));
        assert_eq!(rec.market_value, dec!(37.04));
        assert_eq!(rec.gain_or_loss, dec!(-62.97));
        assert_eq!(rec.exchange, "NMS");
        assert_eq!(rec.pe_ratio, Metric::Value(dec!(17.2)));
        // the raw price is reported unrounded
        assert_eq!(rec.current_price, dec!(12.3456));
    }

    #[test]
    fn test_value_holding_zero_quantity() {
        let rec = value_holding(&Holding::new("Z", 0, dec!(50)), Quote::new(dec!(60)));
        assert_eq!(rec.invested_value, Decimal::ZERO);
        assert_eq!(rec.market_value, Decimal::ZERO);
        assert_eq!(rec.gain_or_loss, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_failures_do_not_affect_other_holdings() {
        let provider = MockQuoteProvider::new()
            .with_price("A", dec!(10))
            .with_failure("B", QuoteError::Status(500))
            .with_price("C", dec!(30));
        let holdings = vec![
            Holding::new("A", 1, dec!(5)),
            Holding::new("B", 1, dec!(5)),
            Holding::new("C", 1, dec!(5)),
        ];

        let results = value_holdings(&provider, &holdings, Duration::from_secs(1)).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().symbol, "A");
        assert_eq!(
            results[1],
            Err(FetchFailure {
                symbol: "B".to_string(),
                cause: QuoteError::Status(500)
            })
        );
        assert_eq!(results[2].as_ref().unwrap().symbol, "C");
        assert_eq!(provider.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_hung_fetch_times_out() {
        let provider = MockQuoteProvider::new().with_hang("SLOW");
        let holding = Holding::new("SLOW", 1, dec!(1));
        let timeout = Duration::from_millis(50);

        let result = fetch_and_value(&provider, &holding, timeout).await;
        assert_eq!(
            result,
            Err(FetchFailure {
                symbol: "SLOW".to_string(),
                cause: QuoteError::Timeout(timeout)
            })
        );
    }

    #[tokio::test]
    async fn test_results_keep_registry_order_when_completion_is_reversed() {
        // first holding is slowest, so completion order is the reverse of registry order
        let provider = MockQuoteProvider::new()
            .with_delayed_quote("FIRST", Quote::new(dec!(1)), Duration::from_millis(120))
            .with_delayed_quote("SECOND", Quote::new(dec!(2)), Duration::from_millis(60))
            .with_delayed_quote("THIRD", Quote::new(dec!(3)), Duration::from_millis(0));
        let holdings = vec![
            Holding::new("FIRST", 1, dec!(1)),
            Holding::new("SECOND", 1, dec!(1)),
            Holding::new("THIRD", 1, dec!(1)),
        ];

        let started = Instant::now();
        let results = value_holdings(&provider, &holdings, Duration::from_secs(2)).await;
        let elapsed = started.elapsed();

        let symbols: Vec<&str> = results
            .iter()
            .map(|r| r.as_ref().unwrap().symbol.as_str())
            .collect();
        assert_eq!(symbols, vec!["FIRST", "SECOND", "THIRD"]);
        // fetches overlap: bounded by the slowest, not the sum
        assert!(elapsed < Duration::from_millis(175), "took {:?}", elapsed);
    }
    #[tokio::test]
    async fn test_results_keep_registry_order_when_completion_matches() {
        let provider = MockQuoteProvider::new()
            .with_delayed_quote("FIRST", Quote::new(dec!(1)), Duration::from_millis(0))
            .with_delayed_quote("SECOND", Quote::new(dec!(2)), Duration::from_millis(60))
            .with_delayed_quote("THIRD", Quote::new(dec!(3)), Duration::from_millis(120));
        let holdings = vec![
            Holding::new("FIRST", 1, dec!(1)),
            Holding::new("SECOND", 1, dec!(1)),
            Holding::new("THIRD", 1, dec!(1)),
        ];

        let results = value_holdings(&provider, &holdings, Duration::from_secs(2)).await;
        let prices: Vec<(&str, Decimal)> = results
            .iter()
            .map(|r| {
                let rec = r.as_ref().unwrap();
                (rec.symbol.as_str(), rec.current_price)
            })
            .collect();
        assert_eq!(
            prices,
            vec![("FIRST", dec!(1)), ("SECOND", dec!(2)), ("THIRD", dec!(3))]
        );
    }
}
