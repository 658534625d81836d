//! Papertrail core: simulated order execution behind pre-trade safety gates.
//!
//! This crate contains:
//! - Domain types (trade plans, order results, positions)
//! - Volatility policy gate and inverse-volatility sizing
//! - Stateful risk engine (exposure, concentration, stop distance, cooldown)
//! - Per-strategy daily budgets and the cross-process kill switch
//! - Seeded paper execution engine with an append-only JSONL journal
//!
//! Everything is synchronous and single-writer. For a fixed seed, clock and
//! sequence of plans, fills and journal bytes are reproducible.

pub mod budget;
pub mod clock;
pub mod domain;
pub mod execution;
pub mod journal;
pub mod kill_switch;
pub mod policy;
pub mod risk;
pub mod rng;

pub use budget::{BudgetCaps, BudgetManager, DEFAULT_BUDGET_KEY};
pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::{OrderResult, OrderStatus, Position, Side, TradePlan};
pub use execution::{
    ExecutionBackend, ExecutionError, ExecutionMode, ExecutionService, LiveAdapterStub,
    PaperConfig, PaperExecutionEngine,
};
pub use journal::{Journal, JournalEvent, JournalRecord};
pub use kill_switch::{
    FileKillSwitch, KillSwitch, KillSwitchError, KillSwitchRequest, KillSwitchStatus,
    MemoryKillSwitch,
};
pub use policy::{position_size, should_trade, GateDecision, GateReason, PolicyParams};
pub use risk::{RiskEngine, RiskParams, RiskRejection, RiskState};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: shared capabilities and value types cross threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<TradePlan>();
        require_sync::<TradePlan>();
        require_send::<OrderResult>();
        require_sync::<OrderResult>();
        require_send::<Position>();
        require_sync::<Position>();
        require_send::<RiskState>();
        require_sync::<RiskState>();

        require_send::<FileKillSwitch>();
        require_sync::<FileKillSwitch>();
        require_send::<MemoryKillSwitch>();
        require_sync::<MemoryKillSwitch>();
        require_send::<FixedClock>();
        require_sync::<FixedClock>();

        // engines move between threads but are driven by one writer
        require_send::<BudgetManager>();
        require_send::<PaperExecutionEngine>();
        require_send::<ExecutionBackend>();
    }

    #[test]
    fn rejection_messages_are_fixed() {
        let names: Vec<String> = [
            RiskRejection::Cooldown,
            RiskRejection::ExposureCap,
            RiskRejection::ConcentrationCap,
            RiskRejection::StopTooTight,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(
            names,
            ["cooldown", "exposure cap", "concentration cap", "stop too tight"]
        );
    }
}
