use crate::domain::models::Holding;

/// Quantity at or above which a holding wraps back to one on the next advance.
pub const QUANTITY_CEILING: u32 = 100;

/// Ordered set of tracked positions.
///
/// Only the scheduler owns a registry, so quantities have a single writer.
#[derive(Debug, Clone)]
pub struct HoldingRegistry {
    holdings: Vec<Holding>,
}

impl HoldingRegistry {
    pub fn new(holdings: Vec<Holding>) -> Self {
        Self { holdings }
    }

    /// Holdings in configuration order.
    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    /// Applies the per-cycle quantity rule to every holding.
    pub fn advance(&mut self) {
        for holding in &mut self.holdings {
            holding.quantity = next_quantity(holding.quantity);
        }
    }
}

fn next_quantity(quantity: u32) -> u32 {
    if quantity >= QUANTITY_CEILING {
        1
    } else {
        quantity + 1
    }
}
