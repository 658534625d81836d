//! Cost model: mark resolution, slippage and fees.
//!
//! Slippage is directional: buyers fill above the mark, sellers below.
//! `slippage = uniform(0, spread) * 0.5 + |quantity| * 1e-4`, so half the
//! quoted spread is paid on average plus a linear size-impact term.
//! Fees are charged in basis points of the mark notional.

use crate::domain::plan::{META_MARK_PRICE, META_SPREAD};
use crate::domain::{Side, TradePlan};
use crate::rng::SeededSource;

/// Price impact per unit of quantity.
const SIZE_IMPACT: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    /// Fee in basis points of notional.
    pub fee_bps: f64,
    /// Spread assumed when the plan does not carry one.
    pub default_spread: f64,
    /// Mark used when the plan has neither a limit price nor a carried mark.
    pub fallback_mark_price: f64,
}

impl CostModel {
    pub fn new(fee_bps: f64, default_spread: f64, fallback_mark_price: f64) -> Self {
        Self {
            fee_bps,
            default_spread,
            fallback_mark_price,
        }
    }

    /// Positive finite limit price, else a positive metadata `mark_price`,
    /// else the fallback.
    pub fn mark_price(&self, plan: &TradePlan) -> f64 {
        plan.limit_price
            .filter(|p| is_usable_price(*p))
            .or_else(|| plan.metadata_f64(META_MARK_PRICE).filter(|p| is_usable_price(*p)))
            .unwrap_or(self.fallback_mark_price)
    }

    /// Metadata `spread` when present, finite and non-negative, else the default.
    pub fn spread(&self, plan: &TradePlan) -> f64 {
        plan.metadata_f64(META_SPREAD)
            .filter(|s| *s >= 0.0)
            .unwrap_or(self.default_spread)
    }

    /// Draw slippage for one fill. Consumes exactly one value from `rng`.
    pub fn slippage(&self, spread: f64, quantity: f64, rng: &mut SeededSource) -> f64 {
        rng.uniform(spread) * 0.5 + quantity.abs() * SIZE_IMPACT
    }

    pub fn fill_price(&self, mark: f64, side: Side, slippage: f64) -> f64 {
        match side {
            Side::Buy => mark + slippage,
            Side::Sell => mark - slippage,
        }
    }

    /// `fees = notional * fee_bps / 10_000`
    pub fn fees(&self, notional: f64) -> f64 {
        notional * (self.fee_bps / 10_000.0)
    }
}

fn is_usable_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}
