//! Deterministic paper execution.
//!
//! Per `place` call, in order:
//! 1. kill switch (re-read every call) → reject
//! 2. resolve mark, notional = |qty| * mark
//! 3. strategy budget check → reject with `budget_exceeded`
//! 4. spread + seeded slippage → fill price
//! 5. fees on notional
//! 6. `order_filled` journal record
//! 7. budget spend, position (VWAP) and USD balance update
//!
//! State only changes once the journal append succeeds.
//!
//! Every attempt, filled or rejected, appends exactly one journal record.
//! Fills are final: `cancel` is journaled and always returns `false`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{CostModel, ExecutionError, ExecutionService};
use crate::budget::{BudgetCaps, BudgetManager};
use crate::clock::Clock;
use crate::domain::{OrderResult, OrderStatus, Position, TradePlan, QUOTE_CURRENCY};
use crate::journal::{Journal, JournalRecord};
use crate::kill_switch::KillSwitch;
use crate::rng::SeededSource;

pub const DEFAULT_JOURNAL_PATH: &str = "logs/execution/paper_journal.jsonl";

/// Rejection reason when the kill switch is engaged without a reason.
pub const REASON_KILL_SWITCH: &str = "killswitch_engaged";
pub const REASON_BUDGET_EXCEEDED: &str = "budget_exceeded";

/// Positions smaller than this are treated as closed.
const POSITION_EPS: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    pub seed: u64,
    pub fee_bps: f64,
    pub default_spread: f64,
    pub fallback_mark_price: f64,
    /// Opening USD balance.
    pub starting_balance: f64,
    pub journal_path: PathBuf,
    pub budget_caps: BudgetCaps,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            fee_bps: 5.0,
            default_spread: 0.5,
            fallback_mark_price: 100.0,
            starting_balance: 1_000_000.0,
            journal_path: PathBuf::from(DEFAULT_JOURNAL_PATH),
            budget_caps: BudgetCaps::with_default(1_000_000.0),
        }
    }
}

impl PaperConfig {
    pub fn cost_model(&self) -> CostModel {
        CostModel::new(self.fee_bps, self.default_spread, self.fallback_mark_price)
    }
}

pub struct PaperExecutionEngine {
    cost: CostModel,
    rng: SeededSource,
    positions: BTreeMap<String, Position>,
    balances: BTreeMap<String, f64>,
    budget: BudgetManager,
    kill_switch: Arc<dyn KillSwitch>,
    clock: Arc<dyn Clock>,
    journal: Journal,
}

impl PaperExecutionEngine {
    /// Build an engine from an explicit config. Opens (never truncates) the journal.
    pub fn new(
        config: PaperConfig,
        kill_switch: Arc<dyn KillSwitch>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ExecutionError> {
        let journal = Journal::open(&config.journal_path)?;
        let mut balances = BTreeMap::new();
        balances.insert(QUOTE_CURRENCY.to_string(), config.starting_balance);

        Ok(Self {
            cost: config.cost_model(),
            rng: SeededSource::new(config.seed),
            positions: BTreeMap::new(),
            balances,
            budget: BudgetManager::new(config.budget_caps, Arc::clone(&clock)),
            kill_switch,
            clock,
            journal,
        })
    }

    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost
    }

    pub fn journal_path(&self) -> &Path {
        self.journal.path()
    }

    /// Notional consumed today by `strategy_id`.
    pub fn budget_usage(&mut self, strategy_id: &str) -> f64 {
        self.budget.usage(strategy_id)
    }

    fn reject(
        &mut self,
        plan: &TradePlan,
        timestamp: f64,
        reason: &str,
    ) -> Result<OrderResult, ExecutionError> {
        let mut rng = self.rng.clone();
        let order_id = rng.next_order_id("paper-reject");
        let result = OrderResult::rejected(order_id, timestamp, reason);
        let record = JournalRecord::rejected(self.clock.timestamp(), reason, plan, &result);
        self.journal.append(&record)?;
        self.rng = rng;
        Ok(result)
    }

    fn apply_fill(&mut self, plan: &TradePlan, price: f64, fees: f64) {
        let qty = plan.side.sign() * plan.quantity.abs();

        match self.positions.get_mut(&plan.symbol) {
            Some(current) => {
                let new_qty = current.quantity + qty;
                if new_qty.abs() < POSITION_EPS {
                    self.positions.remove(&plan.symbol);
                } else {
                    current.average_price =
                        (current.average_price * current.quantity + price * qty) / new_qty;
                    current.quantity = new_qty;
                }
            }
            None if qty.abs() >= POSITION_EPS => {
                self.positions.insert(
                    plan.symbol.clone(),
                    Position {
                        symbol: plan.symbol.clone(),
                        quantity: qty,
                        average_price: price,
                    },
                );
            }
            None => {}
        }

        let fill_notional = price * qty.abs();
        let cash = self
            .balances
            .entry(QUOTE_CURRENCY.to_string())
            .or_insert(0.0);
        if qty >= 0.0 {
            *cash -= fill_notional + fees;
        } else {
            *cash += fill_notional - fees;
        }
    }
}

impl ExecutionService for PaperExecutionEngine {
    fn place(&mut self, plan: &TradePlan) -> Result<OrderResult, ExecutionError> {
        let timestamp = self.clock.timestamp();

        if self.kill_switch.is_engaged() {
            let reason = self
                .kill_switch
                .reason()
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| REASON_KILL_SWITCH.to_string());
            warn!(symbol = %plan.symbol, %reason, "kill switch engaged, rejecting order");
            return self.reject(plan, timestamp, &reason);
        }

        let mark = self.cost.mark_price(plan);
        let notional = plan.quantity.abs() * mark;
        let strategy = plan.strategy_id.to_lowercase();
        if !self.budget.fits(&strategy, notional) {
            debug!(strategy = %plan.strategy_id, notional, "budget exceeded, rejecting order");
            return self.reject(plan, timestamp, REASON_BUDGET_EXCEEDED);
        }

        // Draws go to a copy until the fill is journaled.
        let mut rng = self.rng.clone();
        let spread = self.cost.spread(plan);
        let slippage = self.cost.slippage(spread, plan.quantity, &mut rng);
        let fill_price = self.cost.fill_price(mark, plan.side, slippage);
        let fees = self.cost.fees(notional);

        let mut raw = BTreeMap::new();
        raw.insert("notional".to_string(), serde_json::Value::from(notional));
        raw.insert("spread".to_string(), serde_json::Value::from(spread));
        raw.insert("slippage".to_string(), serde_json::Value::from(slippage));

        let result = OrderResult {
            order_id: rng.next_order_id("paper"),
            status: OrderStatus::Filled,
            filled_qty: plan.quantity,
            average_price: fill_price,
            fees_paid: fees,
            timestamp,
            raw,
        };

        let record = JournalRecord::filled(self.clock.timestamp(), plan, &result);
        self.journal.append(&record)?;

        self.rng = rng;
        self.budget.consume(&strategy, notional);
        self.apply_fill(plan, fill_price, fees);
        debug!(
            order_id = %result.order_id,
            symbol = %plan.symbol,
            side = %plan.side,
            qty = plan.quantity,
            fill_price,
            fees,
            "order filled"
        );
        Ok(result)
    }

    fn cancel(&mut self, order_id: &str) -> Result<bool, ExecutionError> {
        self.journal
            .append(&JournalRecord::cancel(self.clock.timestamp(), order_id))?;
        Ok(false)
    }

    fn positions(&self) -> Result<Vec<Position>, ExecutionError> {
        Ok(self.positions.values().cloned().collect())
    }

    fn balances(&self) -> Result<BTreeMap<String, f64>, ExecutionError> {
        Ok(self.balances.clone())
    }
}

impl std::fmt::Debug for PaperExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperExecutionEngine")
            .field("cost", &self.cost)
            .field("seed", &self.rng.seed())
            .field("positions", &self.positions)
            .field("balances", &self.balances)
            .field("budget", &self.budget)
            .field("journal", &self.journal)
            .finish()
    }
}
