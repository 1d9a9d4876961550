//! Constrained multi-period allocation of shared solar generation across the
//! units of an energy community, with cross-period credit banking.

pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod optimizer;
pub mod scenario;
pub mod telemetry;

pub use error::{AllocationError, ConfigError, Result};
