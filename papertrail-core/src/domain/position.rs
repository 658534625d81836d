use serde::{Deserialize, Serialize};

/// Open position in one symbol. Quantity is signed (negative = short).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    /// Volume-weighted average fill price.
    pub average_price: f64,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0.0
    }

    pub fn market_value(&self, current_price: f64) -> f64 {
        self.quantity * current_price
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        self.quantity * (current_price - self.average_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_position_pnl_sign() {
        let pos = Position {
            symbol: "ETH-USD".into(),
            quantity: -2.0,
            average_price: 200.0,
        };
        assert!(pos.is_short());
        assert!(!pos.is_long());
        assert_eq!(pos.market_value(190.0), -380.0);
        assert_eq!(pos.unrealized_pnl(190.0), 20.0);
    }
}
