//! Dispatch table — maps (trigger, workload kind) to a handler.
//!
//! Built once at start-up and shared read-only by every pass.

use std::collections::HashMap;

use probefix_core::{TriggerKind, WorkloadKind};

/// The three handlers a trigger can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// Correct probes right away on a newly observed object.
    Create,
    /// Log that the object is watched again; no patching.
    Resume,
    /// Periodic correction.
    Timer,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchTable {
    routes: HashMap<(TriggerKind, WorkloadKind), Handler>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route all three triggers for every given kind.
    pub fn standard(kinds: &[WorkloadKind]) -> Self {
        let mut table = Self::new();
        for &kind in kinds {
            table.register(TriggerKind::OnCreate, kind, Handler::Create);
            table.register(TriggerKind::OnResume, kind, Handler::Resume);
            table.register(TriggerKind::OnTimerTick, kind, Handler::Timer);
        }
        table
    }

    pub fn register(&mut self, trigger: TriggerKind, kind: WorkloadKind, handler: Handler) {
        self.routes.insert((trigger, kind), handler);
    }

    pub fn lookup(&self, trigger: TriggerKind, kind: WorkloadKind) -> Option<Handler> {
        self.routes.get(&(trigger, kind)).copied()
    }

    /// Kinds with at least one registered route.
    pub fn kinds(&self) -> Vec<WorkloadKind> {
        WorkloadKind::ALL
            .into_iter()
            .filter(|k| self.routes.keys().any(|(_, kind)| kind == k))
            .collect()
    }
}
