//! probefix-reconciler — the reconciliation pass.
//!
//! A trigger (create, resume, timer tick) is routed through the
//! [`DispatchTable`] to a handler. Correcting handlers run the probe
//! corrector, patch the workload through a [`PatchClient`] when needed,
//! and report the change through an [`EventSink`].
//!
//! # Pass lifecycle
//!
//! ```text
//! Trigger
//!   ├── WorkloadRef::from_object()   (UnsupportedKind → abort, no side effects)
//!   ├── DispatchTable::lookup()
//!   ├── Resume → one info line, done
//!   └── Create / Timer
//!         ├── compute(spec) → NoChange → done, silent
//!         └── Patched → patch_{deployment,stateful_set}()
//!               ├── Ok  → one info line + one Normal/Patched event
//!               └── Err → one error line, error returned to the caller
//! ```
//!
//! Retries are not performed here; the delivery layer decides based on
//! [`ReconcileError::is_retryable`](probefix_core::ReconcileError::is_retryable).

pub mod client;
pub mod dispatch;
pub mod reconciler;

pub use client::{EventFuture, EventSink, EventType, PatchClient, PatchFuture, WorkloadEvent};
pub use dispatch::{DispatchTable, Handler};
pub use reconciler::{PATCHED_REASON, PassReport, Reconciler};
