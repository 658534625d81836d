//! Runner for papertrail: TOML run configuration, the per-bar session driver
//! and tracing setup.

pub mod config;
pub mod session;
pub mod telemetry;

pub use config::{ConfigError, PaperSection, RunConfig};
pub use session::{BarInput, BarOutcome, Session, SessionError, EQUITY_FLOOR};
pub use telemetry::init_tracing;
