//! Volatility-aware trade gate and inverse-volatility position sizing.
//!
//! Rejects trading when volatility is too low to be worth the friction, or when
//! the quoted spread is wide relative to volatility. Sizing is linear in
//! `equity / volatility` with a hard notional ceiling.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyParams {
    /// Sizing coefficient: `notional = k * equity / volatility`.
    pub k: f64,
    pub max_notional: f64,
    /// Volatility floor below which trading is refused.
    pub min_vol: f64,
    /// Maximum tolerated `spread / volatility`.
    pub max_spread_ratio: f64,
    /// Guard against division by a zero volatility.
    pub eps: f64,
}

impl Default for PolicyParams {
    fn default() -> Self {
        Self {
            k: 0.1,
            max_notional: 250_000.0,
            min_vol: 0.5,
            max_spread_ratio: 0.6,
            eps: 1e-6,
        }
    }
}

/// Why the gate refused to trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    LowVol,
    WideSpread,
}

impl GateReason {
    pub fn as_str(self) -> &'static str {
        match self {
            GateReason::LowVol => "low_vol",
            GateReason::WideSpread => "wide_spread",
        }
    }
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Reject(GateReason),
}

impl GateDecision {
    pub fn allowed(self) -> bool {
        matches!(self, GateDecision::Allow)
    }

    /// `""` when allowed, otherwise the reason name.
    pub fn reason(self) -> &'static str {
        match self {
            GateDecision::Allow => "",
            GateDecision::Reject(reason) => reason.as_str(),
        }
    }
}

/// Decide whether current volatility and spread permit trading.
pub fn should_trade(volatility: f64, spread: f64, params: &PolicyParams) -> GateDecision {
    if volatility < params.min_vol {
        return GateDecision::Reject(GateReason::LowVol);
    }
    let vol = volatility.max(params.eps);
    if spread / vol > params.max_spread_ratio {
        return GateDecision::Reject(GateReason::WideSpread);
    }
    GateDecision::Allow
}

/// Target notional: `min(k * equity / max(volatility, eps), max_notional)`.
pub fn position_size(volatility: f64, equity: f64, params: &PolicyParams) -> f64 {
    let vol = volatility.max(params.eps);
    (params.k * equity / vol).min(params.max_notional)
}
