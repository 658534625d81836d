//! Per-strategy daily notional budgets.
//!
//! Caps are keyed by lower-cased strategy id. The `__default__` key applies to
//! any strategy without its own entry; no matching entry at all means
//! unlimited. Usage resets whenever the clock's date moves past the stored
//! accounting day.

use chrono::NaiveDate;
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::Clock;

/// Sentinel key whose cap applies to any unmatched strategy.
pub const DEFAULT_BUDGET_KEY: &str = "__default__";

/// Explicit strategy → cap table.
///
/// Deserializing goes through [`BudgetCaps::from_entries`], so keys are
/// lower-cased and unusable values are dropped rather than failing the load.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BudgetCaps(BTreeMap<String, f64>);

impl<'de> Deserialize<'de> for BudgetCaps {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, RawCap>::deserialize(deserializer)?;
        Ok(Self::from_entries(
            raw.into_iter().map(|(key, value)| (key, value.into_text())),
        ))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCap {
    Number(f64),
    Text(String),
    Other(IgnoredAny),
}

impl RawCap {
    fn into_text(self) -> String {
        match self {
            RawCap::Number(n) => n.to_string(),
            RawCap::Text(s) => s,
            RawCap::Other(_) => String::new(),
        }
    }
}

impl BudgetCaps {
    /// No caps at all: every strategy is unlimited.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Only a `__default__` cap.
    pub fn with_default(cap: f64) -> Self {
        Self::unlimited().with_cap(DEFAULT_BUDGET_KEY, cap)
    }

    pub fn with_cap(mut self, strategy: &str, cap: f64) -> Self {
        self.0.insert(strategy.to_lowercase(), cap);
        self
    }

    /// Build from raw `(strategy, value)` string pairs.
    ///
    /// Keys are lower-cased; values that do not parse as a number are skipped.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut caps = BTreeMap::new();
        for (key, value) in entries {
            let key = key.as_ref().trim().to_lowercase();
            match value.as_ref().trim().parse::<f64>() {
                Ok(cap) if !cap.is_nan() => {
                    caps.insert(key, cap);
                }
                _ => warn!(strategy = %key, value = value.as_ref(), "skipping unparseable budget cap"),
            }
        }
        Self(caps)
    }

    /// Cap for `strategy` (already lower-cased), falling back to `__default__`.
    pub fn cap_for(&self, strategy: &str) -> Option<f64> {
        self.0
            .get(strategy)
            .or_else(|| self.0.get(DEFAULT_BUDGET_KEY))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Daily spending tracker.
pub struct BudgetManager {
    caps: BudgetCaps,
    clock: Arc<dyn Clock>,
    day: Option<NaiveDate>,
    usage: HashMap<String, f64>,
}

impl BudgetManager {
    pub fn new(caps: BudgetCaps, clock: Arc<dyn Clock>) -> Self {
        Self {
            caps,
            clock,
            day: None,
            usage: HashMap::new(),
        }
    }

    pub fn caps(&self) -> &BudgetCaps {
        &self.caps
    }

    /// Applicable cap for a strategy; `None` means unlimited.
    pub fn cap_for(&self, strategy_id: &str) -> Option<f64> {
        self.caps
            .cap_for(&strategy_id.to_lowercase())
            .filter(|cap| cap.is_finite())
    }

    /// Notional consumed by `strategy_id` on the current accounting day.
    pub fn usage(&mut self, strategy_id: &str) -> f64 {
        self.rollover();
        self.usage
            .get(&strategy_id.to_lowercase())
            .copied()
            .unwrap_or(0.0)
    }

    /// Whether `consume(strategy_id, notional)` would succeed right now.
    /// Never records usage.
    pub fn fits(&mut self, strategy_id: &str, notional: f64) -> bool {
        self.rollover();
        if !notional.is_finite() {
            return false;
        }
        let key = strategy_id.to_lowercase();
        let used = self.usage.get(&key).copied().unwrap_or(0.0);
        self.cap_for(&key).map_or(true, |cap| used + notional <= cap)
    }

    /// Try to spend `notional` for `strategy_id`.
    ///
    /// All-or-nothing: on failure the recorded usage is unchanged. Unlimited
    /// strategies succeed for any finite notional but still accumulate usage.
    /// A NaN or infinite notional is always refused.
    pub fn consume(&mut self, strategy_id: &str, notional: f64) -> bool {
        self.rollover();
        let key = strategy_id.to_lowercase();
        if !notional.is_finite() {
            warn!(strategy = %key, notional, "refusing non-finite budget spend");
            return false;
        }
        let used = self.usage.get(&key).copied().unwrap_or(0.0);
        let next = used + notional;

        if let Some(cap) = self.cap_for(&key) {
            if next > cap {
                debug!(strategy = %key, used, notional, cap, "budget exhausted");
                return false;
            }
        }
        self.usage.insert(key, next);
        true
    }

    fn rollover(&mut self) {
        let today = self.clock.today();
        if self.day != Some(today) {
            if self.day.is_some() {
                debug!(%today, "budget day rollover");
            }
            self.day = Some(today);
            self.usage.clear();
        }
    }
}

impl std::fmt::Debug for BudgetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetManager")
            .field("caps", &self.caps)
            .field("day", &self.day)
            .field("usage", &self.usage)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::Duration;

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::at_date(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        ))
    }

    #[test]
    fn rejects_over_cap_without_partial_consumption() {
        let mut budget = BudgetManager::new(BudgetCaps::with_default(50.0), clock());
        assert!(!budget.consume("budget", 100.0));
        assert_eq!(budget.usage("budget"), 0.0);
        assert!(budget.consume("budget", 50.0));
        assert!(!budget.consume("budget", 0.01));
        assert_eq!(budget.usage("budget"), 50.0);
    }

    #[test]
    fn specific_cap_overrides_default() {
        let caps = BudgetCaps::with_default(10.0).with_cap("Momentum", 1_000.0);
        let mut budget = BudgetManager::new(caps, clock());
        assert!(budget.consume("MOMENTUM", 500.0));
        assert!(!budget.consume("other", 500.0));
    }

    #[test]
    fn non_finite_notional_never_spends() {
        let mut budget = BudgetManager::new(BudgetCaps::with_default(150.0), clock());
        assert!(!budget.consume("s", f64::NAN));
        assert!(!budget.consume("s", f64::INFINITY));
        assert_eq!(budget.usage("s"), 0.0);
        assert!(budget.consume("s", 100.0));
        assert!(!budget.consume("s", 100.0));

        let mut open = BudgetManager::new(BudgetCaps::unlimited(), clock());
        assert!(!open.consume("s", f64::NAN));
        assert_eq!(open.usage("s"), 0.0);
    }

    #[test]
    fn fits_does_not_record_usage() {
        let mut budget = BudgetManager::new(BudgetCaps::with_default(100.0), clock());
        assert!(budget.fits("s", 100.0));
        assert!(budget.fits("s", 100.0));
        assert!(!budget.fits("s", 100.5));
        assert!(!budget.fits("s", f64::NAN));
        assert_eq!(budget.usage("s"), 0.0);
    }

    #[test]
    fn no_caps_means_unlimited_but_tracked() {
        let mut budget = BudgetManager::new(BudgetCaps::unlimited(), clock());
        assert!(budget.consume("anything", 1e12));
        assert!(budget.consume("anything", 1e12));
        assert_eq!(budget.usage("anything"), 2e12);
        assert_eq!(budget.cap_for("anything"), None);
    }

    #[test]
    fn infinite_cap_is_unlimited() {
        let caps = BudgetCaps::with_default(f64::INFINITY);
        let mut budget = BudgetManager::new(caps, clock());
        assert!(budget.consume("x", 1e300));
        assert_eq!(budget.cap_for("x"), None);
    }

    #[test]
    fn usage_resets_on_new_day() {
        let clock = clock();
        let mut budget = BudgetManager::new(BudgetCaps::with_default(100.0), clock.clone());
        assert!(budget.consume("s", 100.0));
        assert!(!budget.consume("s", 1.0));

        clock.advance(Duration::days(1));
        assert_eq!(budget.usage("s"), 0.0);
        assert!(budget.consume("s", 100.0));
    }

    #[test]
    fn deserialized_caps_are_normalized() {
        let caps: BudgetCaps = serde_json::from_str(
            r#"{"Momentum": 10, "Broken": "lots", "flag": true, "__default__": "500"}"#,
        )
        .unwrap();
        assert_eq!(caps.len(), 2);
        assert_eq!(caps.cap_for("momentum"), Some(10.0));
        assert_eq!(caps.cap_for("broken"), Some(500.0));

        let mut budget = BudgetManager::new(caps, clock());
        assert!(!budget.consume("Momentum", 1_000.0));
        assert!(budget.consume("Momentum", 10.0));
    }

    #[test]
    fn from_entries_skips_garbage_and_lowercases() {
        let caps = BudgetCaps::from_entries([
            ("Alpha", "250"),
            ("beta", "lots"),
            ("__DEFAULT__", " 75.5 "),
            ("gamma", "NaN"),
        ]);
        assert_eq!(caps.len(), 2);
        assert_eq!(caps.cap_for("alpha"), Some(250.0));
        assert_eq!(caps.cap_for("beta"), Some(75.5));
        assert_eq!(caps.cap_for("gamma"), Some(75.5));
    }
}
