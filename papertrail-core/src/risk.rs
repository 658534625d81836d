//! Stateful pre-trade risk gates.
//!
//! `RiskEngine` holds the limits; `RiskState` holds per-run exposure and the
//! cooldown counter. Gates are evaluated in a fixed priority order and the
//! first violation is returned:
//!
//! 1. cooldown (any remaining bars blocks everything)
//! 2. aggregate exposure cap
//! 3. per-symbol concentration cap
//! 4. minimum stop distance relative to volatility
//!
//! A rejection is a "skip this bar" signal for the caller, never fatal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Volatility floor used by the stop-distance gate.
const VOL_EPS: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RiskRejection {
    #[error("cooldown")]
    Cooldown,
    #[error("exposure cap")]
    ExposureCap,
    #[error("concentration cap")]
    ConcentrationCap,
    #[error("stop too tight")]
    StopTooTight,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskParams {
    /// Daily loss magnitude that triggers a cooldown. Sign is ignored.
    pub max_daily_loss: f64,
    pub max_exposure: f64,
    pub max_concentration_per_symbol: f64,
    pub cooldown_bars: u32,
    /// Required `stop_distance / volatility`.
    pub min_stop_distance_factor: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            max_daily_loss: 5_000.0,
            max_exposure: 200_000.0,
            max_concentration_per_symbol: 150_000.0,
            cooldown_bars: 2,
            min_stop_distance_factor: 0.5,
        }
    }
}

/// Exposure bookkeeping for one run.
///
/// `total_exposure` is recomputed from the per-symbol map on every mutation,
/// so it always equals their sum exactly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    total_exposure: f64,
    symbol_exposure: BTreeMap<String, f64>,
    cooldown_bars_remaining: u32,
}

impl RiskState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_exposure(&self) -> f64 {
        self.total_exposure
    }

    pub fn symbol_exposure(&self, symbol: &str) -> f64 {
        self.symbol_exposure.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn symbol_exposures(&self) -> &BTreeMap<String, f64> {
        &self.symbol_exposure
    }

    pub fn cooldown_bars_remaining(&self) -> u32 {
        self.cooldown_bars_remaining
    }

    pub fn in_cooldown(&self) -> bool {
        self.cooldown_bars_remaining > 0
    }

    pub fn is_empty(&self) -> bool {
        self.symbol_exposure.is_empty() && self.cooldown_bars_remaining == 0
    }

    /// Decrement the cooldown counter once, saturating at zero.
    pub fn decay_cooldown(&mut self) {
        self.cooldown_bars_remaining = self.cooldown_bars_remaining.saturating_sub(1);
    }

    fn resync_total(&mut self) {
        self.total_exposure = self.symbol_exposure.values().sum();
    }
}

#[derive(Debug, Clone, Default)]
pub struct RiskEngine {
    params: RiskParams,
}

impl RiskEngine {
    pub fn new(params: RiskParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RiskParams {
        &self.params
    }

    /// Evaluate the four gates in priority order. Never mutates `state`.
    ///
    /// Every limit must be positively satisfied: a NaN or infinite notional
    /// fails the exposure cap, and a non-finite volatility or stop distance
    /// fails the stop check.
    pub fn check_trade(
        &self,
        notional: f64,
        symbol: &str,
        volatility: f64,
        stop_distance: f64,
        state: &RiskState,
    ) -> Result<(), RiskRejection> {
        let size = notional.abs();

        if state.in_cooldown() {
            return Err(RiskRejection::Cooldown);
        }
        if !within(state.total_exposure() + size, self.params.max_exposure) {
            return Err(RiskRejection::ExposureCap);
        }
        if !within(
            state.symbol_exposure(symbol) + size,
            self.params.max_concentration_per_symbol,
        ) {
            return Err(RiskRejection::ConcentrationCap);
        }
        if !volatility.is_finite() {
            return Err(RiskRejection::StopTooTight);
        }
        let required = self.params.min_stop_distance_factor * volatility.max(VOL_EPS);
        if !(stop_distance.is_finite() && within(required, stop_distance)) {
            return Err(RiskRejection::StopTooTight);
        }
        Ok(())
    }

    /// Add `|notional|` to the symbol and aggregate exposure.
    ///
    /// Call only after `check_trade` accepted the same trade. Non-finite
    /// notionals are dropped so the totals stay finite.
    pub fn record_trade(&self, symbol: &str, notional: f64, state: &mut RiskState) {
        if !notional.is_finite() {
            warn!(symbol, notional, "ignoring non-finite exposure");
            return;
        }
        *state.symbol_exposure.entry(symbol.to_string()).or_insert(0.0) += notional.abs();
        state.resync_total();
        debug!(symbol, notional, total = state.total_exposure, "exposure recorded");
    }

    /// Release one symbol's exposure, or everything when `symbol` is `None`.
    ///
    /// Releasing everything also clears the cooldown. Both forms are idempotent.
    pub fn release_positions(&self, state: &mut RiskState, symbol: Option<&str>) {
        match symbol {
            Some(sym) => {
                state.symbol_exposure.remove(sym);
                state.resync_total();
            }
            None => *state = RiskState::default(),
        }
    }

    pub fn decay_cooldown(&self, state: &mut RiskState) {
        state.decay_cooldown();
    }

    /// Start (or refresh) a cooldown when `pnl` breaches the daily loss limit.
    ///
    /// Repeated breaches refresh the counter to `cooldown_bars`; they never stack.
    pub fn record_daily_pnl(&self, pnl: f64, state: &mut RiskState) {
        if pnl < -self.params.max_daily_loss.abs() {
            let bars = state.cooldown_bars_remaining.max(self.params.cooldown_bars);
            info!(pnl, cooldown_bars = bars, "daily loss breached, entering cooldown");
            state.cooldown_bars_remaining = bars;
        }
    }
}

/// `value <= limit`, false whenever either side is NaN.
fn within(value: f64, limit: f64) -> bool {
    value <= limit
}
