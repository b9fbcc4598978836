//! probefix-core — types, configuration and the probe corrector.
//!
//! Everything in this crate is pure: no I/O besides reading the config
//! file, no async. The reconciler and delivery layers build on it.

pub mod config;
pub mod corrector;
pub mod error;
pub mod types;

pub use config::{ControllerConfig, LogFormat, LoggingConfig, RetryConfig};
pub use corrector::{BAD_TIMEOUT_SECONDS, SAFE_TIMEOUT_SECONDS, apply_patch, compute};
pub use error::{ConfigError, PatchError, ReconcileError};
pub use types::*;
