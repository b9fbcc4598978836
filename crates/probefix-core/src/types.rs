//! Shared types used across probefix crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ReconcileError;

// ── Workload identity ──────────────────────────────────────────────

/// The workload kinds this controller understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

impl WorkloadKind {
    /// All watched kinds, in registration order.
    pub const ALL: [WorkloadKind; 2] = [WorkloadKind::Deployment, WorkloadKind::StatefulSet];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::StatefulSet => "StatefulSet",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadKind {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Deployment" => Ok(WorkloadKind::Deployment),
            "StatefulSet" => Ok(WorkloadKind::StatefulSet),
            other => Err(ReconcileError::UnsupportedKind(other.to_string())),
        }
    }
}

/// Identity of a target object for one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
}

impl WorkloadRef {
    pub fn new(kind: WorkloadKind, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Extract the identity from a full object body.
    ///
    /// Reads `kind`, `metadata.namespace` and `metadata.name`. A kind other
    /// than Deployment/StatefulSet is an `UnsupportedKind` error.
    pub fn from_object(body: &Value) -> Result<Self, ReconcileError> {
        let kind = body
            .get("kind")
            .and_then(Value::as_str)
            .ok_or(ReconcileError::MissingField("kind"))?
            .parse::<WorkloadKind>()?;
        let metadata = body
            .get("metadata")
            .ok_or(ReconcileError::MissingField("metadata"))?;
        let namespace = metadata
            .get("namespace")
            .and_then(Value::as_str)
            .ok_or(ReconcileError::MissingField("metadata.namespace"))?;
        let name = metadata
            .get("name")
            .and_then(Value::as_str)
            .ok_or(ReconcileError::MissingField("metadata.name"))?;

        Ok(Self::new(kind, namespace, name))
    }

    /// Stable key used to serialize passes per object.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ns={}", self.kind, self.name, self.namespace)
    }
}

// ── Triggers ───────────────────────────────────────────────────────

/// What caused a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerKind {
    /// The object was observed for the first time after start-up.
    OnCreate,
    /// The object already existed when the controller (re)started.
    OnResume,
    /// Periodic re-check.
    OnTimerTick,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerKind::OnCreate => "create",
            TriggerKind::OnResume => "resume",
            TriggerKind::OnTimerTick => "timer",
        };
        f.write_str(s)
    }
}

/// A trigger as delivered by the watch layer: the cause plus the full
/// object body at the time of delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub kind: TriggerKind,
    pub object: Value,
}

impl Trigger {
    pub fn new(kind: TriggerKind, object: Value) -> Self {
        Self { kind, object }
    }

    /// The object's `spec` mapping, or `Null` when absent.
    pub fn spec(&self) -> &Value {
        self.object.get("spec").unwrap_or(&Value::Null)
    }
}

// ── Corrector output ───────────────────────────────────────────────

/// Partial container entry for a strategic merge patch.
///
/// Only the probes that changed are present; the container is matched
/// by `name` on the server side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerPatch {
    pub name: String,
    #[serde(rename = "livenessProbe", skip_serializing_if = "Option::is_none", default)]
    pub liveness_probe: Option<Map<String, Value>>,
    #[serde(rename = "readinessProbe", skip_serializing_if = "Option::is_none", default)]
    pub readiness_probe: Option<Map<String, Value>>,
}

impl ContainerPatch {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            liveness_probe: None,
            readiness_probe: None,
        }
    }

    /// Whether any probe was recorded for this container.
    pub fn is_empty(&self) -> bool {
        self.liveness_probe.is_none() && self.readiness_probe.is_none()
    }

    pub(crate) fn set_probe(&mut self, probe: ProbeType, value: Map<String, Value>) {
        match probe {
            ProbeType::Liveness => self.liveness_probe = Some(value),
            ProbeType::Readiness => self.readiness_probe = Some(value),
        }
    }

    /// Recorded probe of the given type, if any.
    pub fn probe(&self, probe: ProbeType) -> Option<&Map<String, Value>> {
        match probe {
            ProbeType::Liveness => self.liveness_probe.as_ref(),
            ProbeType::Readiness => self.readiness_probe.as_ref(),
        }
    }
}

/// The two probe kinds inspected, in the order they are inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeType {
    Liveness,
    Readiness,
}

impl ProbeType {
    pub const ORDERED: [ProbeType; 2] = [ProbeType::Liveness, ProbeType::Readiness];

    /// Field name within a container spec.
    pub fn field(&self) -> &'static str {
        match self {
            ProbeType::Liveness => "livenessProbe",
            ProbeType::Readiness => "readinessProbe",
        }
    }
}

/// Result of running the probe corrector over one pod template.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconciliationOutcome {
    NoChange,
    Patched {
        containers: Vec<ContainerPatch>,
        changes: Vec<String>,
    },
}

impl ReconciliationOutcome {
    /// Build the strategic merge document for this outcome.
    ///
    /// Returns `None` for `NoChange`.
    pub fn patch_document(&self) -> Option<Value> {
        match self {
            ReconciliationOutcome::NoChange => None,
            ReconciliationOutcome::Patched { containers, .. } => Some(serde_json::json!({
                "spec": {
                    "template": {
                        "spec": {
                            "containers": containers,
                        }
                    }
                }
            })),
        }
    }

    /// Change descriptions joined for log and event messages.
    pub fn summary(&self) -> String {
        match self {
            ReconciliationOutcome::NoChange => String::new(),
            ReconciliationOutcome::Patched { changes, .. } => changes.join(", "),
        }
    }
}
