//! Serializable run configuration.
//!
//! A run is described by one TOML document. Every section is optional and
//! falls back to the harness defaults, but the resulting `PaperConfig` is
//! always fully explicit, budget caps included.
//!
//! ```toml
//! symbol = "BTC-USD"
//! strategy_id = "heuristic"
//! execution_mode = "paper"
//!
//! [paper]
//! seed = 7
//! journal_path = "logs/execution/run.jsonl"
//!
//! [risk]
//! max_exposure = 200000.0
//!
//! [budget]
//! __default__ = 1000000
//! momentum = "250000"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use papertrail_core::budget::{BudgetCaps, DEFAULT_BUDGET_KEY};
use papertrail_core::kill_switch::DEFAULT_KILL_SWITCH_PATH;
use papertrail_core::{ExecutionMode, PaperConfig, PolicyParams, RiskParams};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Paper engine settings. Budget caps live in their own `[budget]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperSection {
    pub seed: u64,
    pub fee_bps: f64,
    pub default_spread: f64,
    pub fallback_mark_price: f64,
    pub starting_balance: f64,
    pub journal_path: PathBuf,
}

impl Default for PaperSection {
    fn default() -> Self {
        let defaults = PaperConfig::default();
        Self {
            seed: defaults.seed,
            fee_bps: defaults.fee_bps,
            default_spread: defaults.default_spread,
            fallback_mark_price: defaults.fallback_mark_price,
            starting_balance: defaults.starting_balance,
            journal_path: defaults.journal_path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub symbol: String,
    pub strategy_id: String,
    pub initial_equity: f64,
    pub execution_mode: ExecutionMode,
    pub kill_switch_path: PathBuf,
    pub paper: PaperSection,
    pub policy: PolicyParams,
    pub risk: RiskParams,
    /// Strategy → cap. Numbers or numeric strings; anything else is skipped.
    pub budget: BTreeMap<String, toml::Value>,
}

impl Default for RunConfig {
    fn default() -> Self {
        let mut budget = BTreeMap::new();
        budget.insert(
            DEFAULT_BUDGET_KEY.to_string(),
            toml::Value::Float(1_000_000.0),
        );
        Self {
            symbol: "BTC-USD".to_string(),
            strategy_id: "heuristic".to_string(),
            initial_equity: 100_000.0,
            execution_mode: ExecutionMode::Disabled,
            kill_switch_path: PathBuf::from(DEFAULT_KILL_SWITCH_PATH),
            paper: PaperSection::default(),
            policy: PolicyParams::default(),
            risk: RiskParams::default(),
            budget,
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("symbol must not be empty".into()));
        }
        if !(self.initial_equity > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "initial_equity must be positive, got {}",
                self.initial_equity
            )));
        }
        if self.paper.fee_bps < 0.0 {
            return Err(ConfigError::Invalid("paper.fee_bps must be >= 0".into()));
        }
        if self.policy.max_notional <= 0.0 || self.policy.eps <= 0.0 {
            return Err(ConfigError::Invalid(
                "policy.max_notional and policy.eps must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Budget caps with unparseable entries dropped.
    pub fn budget_caps(&self) -> BudgetCaps {
        BudgetCaps::from_entries(self.budget.iter().map(|(key, value)| {
            let raw = match value {
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::String(s) => s.clone(),
                other => other.type_str().to_string(),
            };
            (key.as_str(), raw)
        }))
    }

    /// Fully explicit engine configuration for this run.
    pub fn paper_config(&self) -> PaperConfig {
        PaperConfig {
            seed: self.paper.seed,
            fee_bps: self.paper.fee_bps,
            default_spread: self.paper.default_spread,
            fallback_mark_price: self.paper.fallback_mark_price,
            starting_balance: self.paper.starting_balance,
            journal_path: self.paper.journal_path.clone(),
            budget_caps: self.budget_caps(),
        }
    }
}
