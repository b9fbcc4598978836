//! Seams to the API server: the patch client and the event sink.
//!
//! Both are injected into the [`Reconciler`](crate::Reconciler) so the
//! pass logic can be exercised without a cluster.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use probefix_core::PatchError;

/// Boxed future alias for patch calls.
pub type PatchFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PatchError>> + Send + 'a>>;

/// Boxed future alias for event emission.
pub type EventFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// Applies strategic merge patches to workloads.
///
/// Implementations own the request timeout; the reconciler awaits the
/// returned future without one.
pub trait PatchClient: Send + Sync {
    fn patch_deployment<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
        patch: &'a Value,
    ) -> PatchFuture<'a>;

    fn patch_stateful_set<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
        patch: &'a Value,
    ) -> PatchFuture<'a>;
}

/// Severity of a cluster event. Only successful corrections are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Normal => "Normal",
        }
    }
}

/// A cluster-visible event attached to a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadEvent {
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
}

/// Records events against the object they describe. Best-effort.
pub trait EventSink: Send + Sync {
    /// `object` is the full object body the event is about.
    fn record<'a>(&'a self, object: &'a Value, event: &'a WorkloadEvent) -> EventFuture<'a>;
}
