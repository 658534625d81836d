//! Domain types for order simulation

pub mod order;
pub mod plan;
pub mod position;

pub use order::{OrderResult, OrderStatus};
pub use plan::{Side, TradePlan};
pub use position::Position;

/// Currency code of the single simulated cash balance.
pub const QUOTE_CURRENCY: &str = "USD";
