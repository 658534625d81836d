use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Direction of a proposed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata key carrying the caller's mark price.
pub const META_MARK_PRICE: &str = "mark_price";
/// Metadata key carrying the caller's quoted spread.
pub const META_SPREAD: &str = "spread";

/// A proposed trade, constructed fresh for every order attempt.
///
/// Metadata is a sorted map so journal output is stable across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub limit_price: Option<f64>,
    pub ttl_seconds: u64,
    pub strategy_id: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl TradePlan {
    /// Plan with the harness defaults: no limit price, 60s TTL, `baseline` strategy.
    pub fn new(symbol: impl Into<String>, side: Side, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            limit_price: None,
            ttl_seconds: 60,
            strategy_id: "baseline".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_limit_price(mut self, price: f64) -> Self {
        self.limit_price = Some(price);
        self
    }

    pub fn with_ttl_seconds(mut self, ttl: u64) -> Self {
        self.ttl_seconds = ttl;
        self
    }

    pub fn with_strategy(mut self, strategy_id: impl Into<String>) -> Self {
        self.strategy_id = strategy_id.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Metadata value parsed as a finite `f64`, or `None` when absent,
    /// malformed, NaN or infinite.
    pub fn metadata_f64(&self, key: &str) -> Option<f64> {
        self.metadata
            .get(key)?
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }
}
