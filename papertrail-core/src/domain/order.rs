use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome state of a single `place` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Filled,
    Rejected,
    Pending,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Filled => "filled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Pending => "pending",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one order attempt. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub status: OrderStatus,
    pub filled_qty: f64,
    pub average_price: f64,
    pub fees_paid: f64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    /// Free-form diagnostics (notional, spread, slippage, or a rejection reason).
    #[serde(default)]
    pub raw: BTreeMap<String, serde_json::Value>,
}

impl OrderResult {
    /// A zero-fill rejection carrying `reason` in its diagnostics.
    pub fn rejected(order_id: String, timestamp: f64, reason: &str) -> Self {
        let mut raw = BTreeMap::new();
        raw.insert("reason".to_string(), serde_json::Value::from(reason));
        Self {
            order_id,
            status: OrderStatus::Rejected,
            filled_qty: 0.0,
            average_price: 0.0,
            fees_paid: 0.0,
            timestamp,
            raw,
        }
    }

    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    pub fn is_rejected(&self) -> bool {
        self.status == OrderStatus::Rejected
    }

    /// Rejection reason, if this result carries one.
    pub fn reason(&self) -> Option<&str> {
        self.raw.get("reason").and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_as_lowercase_name() {
        for (status, name) in [
            (OrderStatus::Filled, "filled"),
            (OrderStatus::Rejected, "rejected"),
            (OrderStatus::Pending, "pending"),
            (OrderStatus::Cancelled, "cancelled"),
        ] {
            assert_eq!(serde_json::to_value(status).unwrap(), name);
            assert_eq!(status.to_string(), name);
        }
    }

    #[test]
    fn rejected_has_zero_fill_and_reason() {
        let result = OrderResult::rejected("paper-reject-x".into(), 1.0, "budget_exceeded");
        assert!(result.is_rejected());
        assert_eq!(result.filled_qty, 0.0);
        assert_eq!(result.average_price, 0.0);
        assert_eq!(result.fees_paid, 0.0);
        assert_eq!(result.reason(), Some("budget_exceeded"));
    }
}
