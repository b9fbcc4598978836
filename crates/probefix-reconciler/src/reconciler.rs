//! Reconciler — runs one pass for one workload.
//!
//! A pass is self-contained: compute the probe corrections from the
//! delivered spec, patch the live object if there is anything to fix,
//! and report the change once. The live object is the only state, so
//! repeating a pass is always safe.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use probefix_core::{
    ReconcileError, ReconciliationOutcome, Trigger, TriggerKind, WorkloadKind, WorkloadRef,
    compute,
};

use crate::client::{EventSink, EventType, PatchClient, WorkloadEvent};
use crate::dispatch::{DispatchTable, Handler};

/// Reason attached to events for successful corrections.
pub const PATCHED_REASON: &str = "Patched";

/// What a successful pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassReport {
    /// Resume trigger: the object was announced, nothing inspected.
    Announced,
    /// Nothing to correct.
    Unchanged,
    /// The object was patched with these changes.
    Patched { changes: Vec<String> },
}

pub struct Reconciler {
    table: DispatchTable,
    client: Arc<dyn PatchClient>,
    events: Arc<dyn EventSink>,
}

impl Reconciler {
    pub fn new(table: DispatchTable, client: Arc<dyn PatchClient>, events: Arc<dyn EventSink>) -> Self {
        Self {
            table,
            client,
            events,
        }
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    /// Top-level entry for the delivery layer.
    ///
    /// Derives the workload identity from the object body and runs the
    /// routed handler. Identity errors are logged here, once, before any
    /// side effect.
    pub async fn handle(&self, trigger: &Trigger) -> Result<PassReport, ReconcileError> {
        let workload = match WorkloadRef::from_object(&trigger.object) {
            Ok(w) => w,
            Err(e) => {
                error!(trigger = %trigger.kind, error = %e, "rejecting trigger");
                return Err(e);
            }
        };

        self.reconcile(trigger.kind, &workload, trigger.spec(), &trigger.object)
            .await
    }

    /// Run one pass for `workload`.
    ///
    /// `spec` is the workload's `spec` mapping; `body` is the full object,
    /// used only to attach the event.
    pub async fn reconcile(
        &self,
        trigger: TriggerKind,
        workload: &WorkloadRef,
        spec: &Value,
        body: &Value,
    ) -> Result<PassReport, ReconcileError> {
        let Some(handler) = self.table.lookup(trigger, workload.kind) else {
            error!(%trigger, kind = %workload.kind, "no handler registered");
            return Err(ReconcileError::UnsupportedKind(workload.kind.to_string()));
        };

        match handler {
            Handler::Resume => {
                info!(
                    kind = %workload.kind,
                    name = %workload.name,
                    namespace = %workload.namespace,
                    "Resumed watching {} in ns={}",
                    workload.name,
                    workload.namespace
                );
                Ok(PassReport::Announced)
            }
            Handler::Create | Handler::Timer => self.correct(trigger, workload, spec, body).await,
        }
    }

    async fn correct(
        &self,
        trigger: TriggerKind,
        workload: &WorkloadRef,
        spec: &Value,
        body: &Value,
    ) -> Result<PassReport, ReconcileError> {
        let outcome = compute(spec);
        let Some(document) = outcome.patch_document() else {
            trace!(%trigger, workload = %workload, "probes already correct");
            return Ok(PassReport::Unchanged);
        };

        let result = match workload.kind {
            WorkloadKind::Deployment => {
                self.client
                    .patch_deployment(&workload.namespace, &workload.name, &document)
                    .await
            }
            WorkloadKind::StatefulSet => {
                self.client
                    .patch_stateful_set(&workload.namespace, &workload.name, &document)
                    .await
            }
        };

        if let Err(e) = result {
            if e.is_benign() {
                warn!(%trigger, workload = %workload, error = %e, "object gone before patch");
            } else if e.is_retryable() {
                // The delivery layer reports the final attempt.
                debug!(%trigger, workload = %workload, error = %e, "patch attempt failed");
            } else {
                error!(%trigger, workload = %workload, error = %e, "patch failed");
            }
            return Err(e.into());
        }

        let summary = outcome.summary();
        info!(
            kind = %workload.kind,
            name = %workload.name,
            namespace = %workload.namespace,
            %trigger,
            "Patched {} '{}' in ns={}: {}",
            workload.kind,
            workload.name,
            workload.namespace,
            summary
        );

        let event = WorkloadEvent {
            event_type: EventType::Normal,
            reason: PATCHED_REASON.to_string(),
            message: format!(
                "{}/{} ns={}: {} updated",
                workload.kind, workload.name, workload.namespace, summary
            ),
        };
        if let Err(e) = self.events.record(body, &event).await {
            warn!(workload = %workload, error = %e, "failed to record event");
        }

        let changes = match outcome {
            ReconciliationOutcome::Patched { changes, .. } => changes,
            ReconciliationOutcome::NoChange => Vec::new(),
        };
        Ok(PassReport::Patched { changes })
    }
}
