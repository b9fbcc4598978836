//! probefix-watch — trigger delivery for the probe reconciler.
//!
//! Watches Deployments and StatefulSets, keeps a cache of their latest
//! bodies, and turns watch events and timer ticks into reconciler
//! passes.
//!
//! # Architecture
//!
//! ```text
//! run_controller
//!   ├── per kind: run_watch   (watch stream → WatchClassifier → cache + OnCreate/OnResume)
//!   ├── per kind: run_timer   (every timer_interval → OnTimerTick per cached object)
//!   └── Delivery
//!         ├── KeyedLocks      (one pass per object at a time)
//!         ├── Semaphore       (at most `workers` passes overall)
//!         └── RetryTracker    (exponential backoff for transient/conflict errors)
//! ```

pub mod backoff;
pub mod cluster;
pub mod delivery;
pub mod watch;

mod controller;

#[cfg(test)]
mod testing;

pub use backoff::{RetryPolicy, RetryTracker};
pub use cluster::{KubeEventSink, KubePatchClient, classify_error, watch_stream};
pub use controller::run_controller;
pub use delivery::{Delivery, DeliveryOutcome, WorkloadCache};
pub use watch::{WatchClassifier, WatchEvent, run_timer, run_watch};
