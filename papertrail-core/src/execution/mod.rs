//! Execution backends.
//!
//! `ExecutionService` is the one interface the caller drives. Backends form a
//! closed set (`ExecutionBackend`): the paper simulator plus placeholders for
//! live venues, which fail every call with `NotSupported` instead of silently
//! doing nothing.

pub mod cost_model;
pub mod paper;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::{OrderResult, Position, TradePlan};

pub use cost_model::CostModel;
pub use paper::{PaperConfig, PaperExecutionEngine};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("journal write failed: {0}")]
    Journal(#[from] io::Error),
    #[error("{backend} does not support {operation}")]
    NotSupported {
        backend: &'static str,
        operation: &'static str,
    },
}

pub trait ExecutionService {
    /// Submit a plan. Safety denials come back as `Rejected` results, not errors.
    fn place(&mut self, plan: &TradePlan) -> Result<OrderResult, ExecutionError>;

    fn cancel(&mut self, order_id: &str) -> Result<bool, ExecutionError>;

    /// Point-in-time snapshot of open positions.
    fn positions(&self) -> Result<Vec<Position>, ExecutionError>;

    /// Point-in-time snapshot of cash balances by currency.
    fn balances(&self) -> Result<BTreeMap<String, f64>, ExecutionError>;
}

/// Which backend a run should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Decisions only; nothing is placed.
    #[default]
    #[serde(rename = "none", alias = "noop", alias = "off")]
    Disabled,
    Paper,
    Ccxt,
    Hyperliquid,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown execution mode '{0}'")]
pub struct UnknownExecutionMode(pub String);

impl FromStr for ExecutionMode {
    type Err = UnknownExecutionMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "noop" | "off" => Ok(ExecutionMode::Disabled),
            "paper" => Ok(ExecutionMode::Paper),
            "ccxt" => Ok(ExecutionMode::Ccxt),
            "hyperliquid" => Ok(ExecutionMode::Hyperliquid),
            other => Err(UnknownExecutionMode(other.to_string())),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionMode::Disabled => "none",
            ExecutionMode::Paper => "paper",
            ExecutionMode::Ccxt => "ccxt",
            ExecutionMode::Hyperliquid => "hyperliquid",
        };
        f.write_str(name)
    }
}

/// Placeholder for a live venue adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveAdapterStub {
    name: &'static str,
}

impl LiveAdapterStub {
    pub fn ccxt() -> Self {
        Self { name: "ccxt" }
    }

    pub fn hyperliquid() -> Self {
        Self { name: "hyperliquid" }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn unsupported<T>(&self, operation: &'static str) -> Result<T, ExecutionError> {
        Err(ExecutionError::NotSupported {
            backend: self.name,
            operation,
        })
    }
}

impl ExecutionService for LiveAdapterStub {
    fn place(&mut self, _plan: &TradePlan) -> Result<OrderResult, ExecutionError> {
        self.unsupported("place")
    }

    fn cancel(&mut self, _order_id: &str) -> Result<bool, ExecutionError> {
        self.unsupported("cancel")
    }

    fn positions(&self) -> Result<Vec<Position>, ExecutionError> {
        self.unsupported("positions")
    }

    fn balances(&self) -> Result<BTreeMap<String, f64>, ExecutionError> {
        self.unsupported("balances")
    }
}

#[derive(Debug)]
pub enum ExecutionBackend {
    Paper(PaperExecutionEngine),
    Ccxt(LiveAdapterStub),
    Hyperliquid(LiveAdapterStub),
}

impl ExecutionBackend {
    pub fn mode(&self) -> ExecutionMode {
        match self {
            ExecutionBackend::Paper(_) => ExecutionMode::Paper,
            ExecutionBackend::Ccxt(_) => ExecutionMode::Ccxt,
            ExecutionBackend::Hyperliquid(_) => ExecutionMode::Hyperliquid,
        }
    }

    pub fn as_paper(&self) -> Option<&PaperExecutionEngine> {
        match self {
            ExecutionBackend::Paper(engine) => Some(engine),
            _ => None,
        }
    }

    fn service(&mut self) -> &mut dyn ExecutionService {
        match self {
            ExecutionBackend::Paper(engine) => engine,
            ExecutionBackend::Ccxt(stub) | ExecutionBackend::Hyperliquid(stub) => stub,
        }
    }

    fn service_ref(&self) -> &dyn ExecutionService {
        match self {
            ExecutionBackend::Paper(engine) => engine,
            ExecutionBackend::Ccxt(stub) | ExecutionBackend::Hyperliquid(stub) => stub,
        }
    }
}

impl ExecutionService for ExecutionBackend {
    fn place(&mut self, plan: &TradePlan) -> Result<OrderResult, ExecutionError> {
        self.service().place(plan)
    }

    fn cancel(&mut self, order_id: &str) -> Result<bool, ExecutionError> {
        self.service().cancel(order_id)
    }

    fn positions(&self) -> Result<Vec<Position>, ExecutionError> {
        self.service_ref().positions()
    }

    fn balances(&self) -> Result<BTreeMap<String, f64>, ExecutionError> {
        self.service_ref().balances()
    }
}
