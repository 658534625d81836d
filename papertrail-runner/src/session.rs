//! Per-bar session driver.
//!
//! Wires the core components in the order a backtest loop calls them:
//!
//! 1. decay the risk cooldown
//! 2. policy gate (`should_trade`), then inverse-volatility sizing
//! 3. risk gates (`check_trade`); a rejection keeps the bar flat
//! 4. execution (`place`), when a backend is configured; a rejected order
//!    keeps the bar flat
//! 5. mark the position carried from the previous bar against this bar's
//!    price, feed that PnL to `record_daily_pnl`, release the bar's exposure
//!
//! The position opened on bar `t` earns the move from `t` to `t + 1`, so a
//! bar's own direction never sees its own return.

use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use papertrail_core::domain::plan::{META_MARK_PRICE, META_SPREAD};
use papertrail_core::{
    position_size, should_trade, Clock, ExecutionBackend, ExecutionError, ExecutionMode,
    ExecutionService, FileKillSwitch, GateDecision, KillSwitch, LiveAdapterStub, OrderResult,
    PaperExecutionEngine, PolicyParams, RiskEngine, RiskRejection, RiskState, Side, SystemClock,
    TradePlan,
};

use crate::config::RunConfig;

/// Floor applied to marked equity.
pub const EQUITY_FLOOR: f64 = 1_000.0;

const PRICE_EPS: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),
}

/// Market inputs and the strategy's directional view for one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarInput {
    pub date: NaiveDate,
    pub price: f64,
    /// ATR-like volatility estimate in price units.
    pub volatility: f64,
    pub spread: f64,
    /// +1 long, -1 short, 0 flat.
    pub direction: i8,
}

/// What happened on one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct BarOutcome {
    pub date: NaiveDate,
    pub gate: GateDecision,
    pub risk_rejection: Option<RiskRejection>,
    pub order: Option<OrderResult>,
    /// Direction actually held after this bar's decisions.
    pub direction: i8,
    /// Notional actually held after this bar's decisions.
    pub size: f64,
    /// PnL of the position carried into this bar.
    pub pnl: f64,
    pub equity: f64,
}

#[derive(Debug)]
pub struct Session {
    symbol: String,
    strategy_id: String,
    policy: PolicyParams,
    risk: RiskEngine,
    state: RiskState,
    backend: Option<ExecutionBackend>,
    equity: f64,
    /// Price, direction and notional carried from the previous bar.
    carried: Option<(f64, i8, f64)>,
}

impl Session {
    pub fn new(
        symbol: impl Into<String>,
        strategy_id: impl Into<String>,
        initial_equity: f64,
        policy: PolicyParams,
        risk: RiskEngine,
        backend: Option<ExecutionBackend>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            strategy_id: strategy_id.into(),
            policy,
            risk,
            state: RiskState::new(),
            backend,
            equity: initial_equity,
            carried: None,
        }
    }

    /// Build a session and its backend from a run config.
    ///
    /// The paper backend reads the kill switch marker at `kill_switch_path`.
    pub fn from_config(config: &RunConfig, clock: Arc<dyn Clock>) -> Result<Self, SessionError> {
        let kill_switch: Arc<dyn KillSwitch> =
            Arc::new(FileKillSwitch::new(&config.kill_switch_path));
        let backend = build_backend(config, kill_switch, clock)?;
        Ok(Self::new(
            config.symbol.clone(),
            config.strategy_id.clone(),
            config.initial_equity,
            config.policy,
            RiskEngine::new(config.risk),
            backend,
        ))
    }

    /// Load a TOML run config and build a session on the system clock.
    pub fn from_config_file(path: &Path) -> anyhow::Result<Self> {
        let config = RunConfig::load(path)
            .with_context(|| format!("loading run config {}", path.display()))?;
        let session = Self::from_config(&config, Arc::new(SystemClock))
            .with_context(|| format!("building {} backend", config.execution_mode))?;
        Ok(session)
    }

    pub fn equity(&self) -> f64 {
        self.equity
    }

    pub fn risk_state(&self) -> &RiskState {
        &self.state
    }

    pub fn backend(&self) -> Option<&ExecutionBackend> {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> Option<&mut ExecutionBackend> {
        self.backend.as_mut()
    }

    pub fn step(&mut self, bar: &BarInput) -> Result<BarOutcome, SessionError> {
        self.risk.decay_cooldown(&mut self.state);

        let gate = should_trade(bar.volatility, bar.spread, &self.policy);
        let mut direction = if gate.allowed() { bar.direction.signum() } else { 0 };
        let mut size = 0.0;
        let mut risk_rejection = None;
        let mut order = None;

        if !gate.allowed() {
            debug!(date = %bar.date, reason = gate.reason(), "policy gate closed");
        }

        if direction != 0 {
            let vol = bar.volatility.max(self.policy.eps);
            size = position_size(vol, self.equity, &self.policy);
            let stop_distance = (bar.volatility * 0.5).max(PRICE_EPS);
            match self
                .risk
                .check_trade(size, &self.symbol, vol, stop_distance, &self.state)
            {
                Ok(()) => self.risk.record_trade(&self.symbol, size, &mut self.state),
                Err(rejection) => {
                    info!(
                        date = %bar.date,
                        symbol = %self.symbol,
                        reason = %rejection,
                        "risk_reject"
                    );
                    risk_rejection = Some(rejection);
                    direction = 0;
                    size = 0.0;
                }
            }
        }

        if direction != 0 && self.backend.is_some() {
            let plan = self.plan_for(bar, direction, size);
            if let Some(backend) = self.backend.as_mut() {
                let result = match backend.place(&plan) {
                    Ok(result) => result,
                    Err(err) => {
                        self.risk
                            .release_positions(&mut self.state, Some(&self.symbol));
                        return Err(err.into());
                    }
                };
                if result.is_rejected() {
                    direction = 0;
                    size = 0.0;
                }
                order = Some(result);
            }
        }

        let pnl = match self.carried {
            Some((prev_price, held_dir, held_size)) if prev_price > 0.0 => {
                f64::from(held_dir) * held_size * (bar.price / prev_price - 1.0)
            }
            _ => 0.0,
        };
        self.equity = (self.equity + pnl).max(EQUITY_FLOOR);
        self.risk.record_daily_pnl(pnl, &mut self.state);
        self.risk
            .release_positions(&mut self.state, Some(&self.symbol));
        self.carried = Some((bar.price, direction, size));

        Ok(BarOutcome {
            date: bar.date,
            gate,
            risk_rejection,
            order,
            direction,
            size,
            pnl,
            equity: self.equity,
        })
    }

    /// Step through every bar in order.
    pub fn run<'a, I>(&mut self, bars: I) -> Result<Vec<BarOutcome>, SessionError>
    where
        I: IntoIterator<Item = &'a BarInput>,
    {
        bars.into_iter().map(|bar| self.step(bar)).collect()
    }

    fn plan_for(&self, bar: &BarInput, direction: i8, size: f64) -> TradePlan {
        let side = if direction > 0 { Side::Buy } else { Side::Sell };
        TradePlan::new(self.symbol.clone(), side, size / bar.price.max(PRICE_EPS))
            .with_limit_price(bar.price)
            .with_ttl_seconds(60)
            .with_strategy(self.strategy_id.clone())
            .with_metadata(META_MARK_PRICE, bar.price.to_string())
            .with_metadata(META_SPREAD, bar.spread.to_string())
    }
}

fn build_backend(
    config: &RunConfig,
    kill_switch: Arc<dyn KillSwitch>,
    clock: Arc<dyn Clock>,
) -> Result<Option<ExecutionBackend>, ExecutionError> {
    let backend = match config.execution_mode {
        ExecutionMode::Disabled => None,
        ExecutionMode::Paper => Some(ExecutionBackend::Paper(PaperExecutionEngine::new(
            config.paper_config(),
            kill_switch,
            clock,
        )?)),
        ExecutionMode::Ccxt => Some(ExecutionBackend::Ccxt(LiveAdapterStub::ccxt())),
        ExecutionMode::Hyperliquid => {
            Some(ExecutionBackend::Hyperliquid(LiveAdapterStub::hyperliquid()))
        }
    };
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use papertrail_core::{GateReason, RiskParams};

    fn bar(day: u32, price: f64, volatility: f64, direction: i8) -> BarInput {
        BarInput {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            price,
            volatility,
            spread: price * 0.0008,
            direction,
        }
    }

    fn decisions_only() -> Session {
        Session::new(
            "BTC-USD",
            "heuristic",
            100_000.0,
            PolicyParams::default(),
            RiskEngine::new(RiskParams::default()),
            None,
        )
    }

    #[test]
    fn low_volatility_keeps_bar_flat() {
        let mut session = decisions_only();
        let out = session.step(&bar(2, 100.0, 0.1, 1)).unwrap();
        assert_eq!(out.gate, GateDecision::Reject(GateReason::LowVol));
        assert_eq!(out.direction, 0);
        assert_eq!(out.size, 0.0);
        assert!(out.order.is_none());
    }

    #[test]
    fn position_earns_next_bar_move() {
        let mut session = decisions_only();
        let first = session.step(&bar(2, 100.0, 2.0, 1)).unwrap();
        assert_eq!(first.pnl, 0.0);
        assert_eq!(first.direction, 1);
        // 0.1 * 100_000 / 2.0
        assert!((first.size - 5_000.0).abs() < 1e-9);

        let second = session.step(&bar(3, 110.0, 2.0, 0)).unwrap();
        assert!((second.pnl - 500.0).abs() < 1e-9);
        assert!((session.equity() - 100_500.0).abs() < 1e-9);
    }

    #[test]
    fn exposure_released_every_bar() {
        let mut session = decisions_only();
        session.step(&bar(2, 100.0, 2.0, 1)).unwrap();
        assert_eq!(session.risk_state().total_exposure(), 0.0);
    }

    #[test]
    fn equity_is_floored() {
        let mut session = Session::new(
            "BTC-USD",
            "heuristic",
            2_000.0,
            PolicyParams {
                k: 100.0,
                max_notional: 1e9,
                ..PolicyParams::default()
            },
            RiskEngine::new(RiskParams {
                max_exposure: 1e12,
                max_concentration_per_symbol: 1e12,
                ..RiskParams::default()
            }),
            None,
        );
        session.step(&bar(2, 100.0, 1.0, 1)).unwrap();
        let out = session.step(&bar(3, 10.0, 1.0, 0)).unwrap();
        assert_eq!(out.equity, EQUITY_FLOOR);
    }
}
