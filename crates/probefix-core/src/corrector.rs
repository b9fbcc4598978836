//! Probe corrector — computes the minimal probe-timeout patch for a
//! workload's pod template.
//!
//! Pure: takes the workload `spec` mapping and never fails. Missing or
//! mistyped fields anywhere along `template.spec.containers` are treated
//! as "no containers".

use serde_json::{Map, Value};

use crate::types::{ContainerPatch, ProbeType, ReconciliationOutcome};

/// `timeoutSeconds` value that triggers a correction.
pub const BAD_TIMEOUT_SECONDS: i64 = 1;

/// Value written in place of [`BAD_TIMEOUT_SECONDS`].
pub const SAFE_TIMEOUT_SECONDS: i64 = 5;

const TIMEOUT_FIELD: &str = "timeoutSeconds";

/// Compute the probe corrections for a workload spec.
pub fn compute(spec: &Value) -> ReconciliationOutcome {
    let mut containers = Vec::new();
    let mut changes = Vec::new();

    for container in template_containers(spec) {
        let Some(name) = container.get("name").and_then(Value::as_str) else {
            continue;
        };

        let mut patch = ContainerPatch::new(name);
        for probe_type in ProbeType::ORDERED {
            if let Some(corrected) = correct_probe(container.get(probe_type.field())) {
                patch.set_probe(probe_type, corrected);
                changes.push(format!("{} in container '{}'", probe_type.field(), name));
            }
        }

        if !patch.is_empty() {
            containers.push(patch);
        }
    }

    if containers.is_empty() {
        ReconciliationOutcome::NoChange
    } else {
        ReconciliationOutcome::Patched { containers, changes }
    }
}

/// `spec.template.spec.containers`, or an empty slice.
fn template_containers(spec: &Value) -> &[Value] {
    spec.get("template")
        .and_then(|t| t.get("spec"))
        .and_then(|s| s.get("containers"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Copy of the probe with the timeout corrected, if it needs correcting.
fn correct_probe(probe: Option<&Value>) -> Option<Map<String, Value>> {
    let probe = probe?.as_object()?;
    let timeout = probe.get(TIMEOUT_FIELD)?;

    // Exact integer match only: 1.0, "1" and true are left alone.
    if timeout.as_i64() != Some(BAD_TIMEOUT_SECONDS) {
        return None;
    }

    let mut corrected = probe.clone();
    corrected.insert(TIMEOUT_FIELD.to_string(), Value::from(SAFE_TIMEOUT_SECONDS));
    Some(corrected)
}

/// Merge container patches into a workload spec the way the API server
/// applies a strategic merge on `containers` (keyed by `name`).
///
/// Containers in the patch that do not exist in the spec are ignored.
pub fn apply_patch(spec: &Value, patches: &[ContainerPatch]) -> Value {
    let mut merged = spec.clone();

    let Some(containers) = merged
        .get_mut("template")
        .and_then(|t| t.get_mut("spec"))
        .and_then(|s| s.get_mut("containers"))
        .and_then(Value::as_array_mut)
    else {
        return merged;
    };

    for patch in patches {
        let target = containers
            .iter_mut()
            .find(|c| c.get("name").and_then(Value::as_str) == Some(patch.name.as_str()));
        let Some(Value::Object(target)) = target else {
            continue;
        };

        for probe_type in ProbeType::ORDERED {
            let Some(fields) = patch.probe(probe_type) else {
                continue;
            };
            let entry = target
                .entry(probe_type.field())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(existing) = entry {
                for (k, v) in fields {
                    existing.insert(k.clone(), v.clone());
                }
            } else {
                *entry = Value::Object(fields.clone());
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workload(containers: Value) -> Value {
        json!({
            "replicas": 2,
            "template": {
                "metadata": { "labels": { "app": "web" } },
                "spec": { "containers": containers }
            }
        })
    }

    fn http_probe(timeout: Value) -> Value {
        json!({
            "httpGet": { "path": "/healthz", "port": 8080 },
            "periodSeconds": 10,
            "failureThreshold": 3,
            "timeoutSeconds": timeout,
        })
    }

    fn patched(outcome: &ReconciliationOutcome) -> (&[ContainerPatch], &[String]) {
        match outcome {
            ReconciliationOutcome::Patched { containers, changes } => (containers, changes),
            ReconciliationOutcome::NoChange => panic!("expected a patch"),
        }
    }

    #[test]
    fn readiness_only_is_corrected() {
        let spec = workload(json!([{
            "name": "web",
            "image": "nginx",
            "readinessProbe": http_probe(json!(1)),
            "livenessProbe": http_probe(json!(3)),
        }]));

        let outcome = compute(&spec);
        let (containers, changes) = patched(&outcome);

        assert_eq!(changes, ["readinessProbe in container 'web'"]);
        assert_eq!(containers.len(), 1);
        assert!(containers[0].liveness_probe.is_none());

        let doc = outcome.patch_document().unwrap();
        assert_eq!(
            doc,
            json!({
                "spec": { "template": { "spec": { "containers": [{
                    "name": "web",
                    "readinessProbe": http_probe(json!(5)),
                }]}}}
            })
        );
    }

    #[test]
    fn no_bad_timeouts_is_no_change() {
        let spec = workload(json!([
            { "name": "a", "livenessProbe": http_probe(json!(2)) },
            { "name": "b", "readinessProbe": http_probe(json!(10)) },
        ]));
        assert_eq!(compute(&spec), ReconciliationOutcome::NoChange);
    }

    #[test]
    fn container_without_probes_contributes_nothing() {
        let spec = workload(json!([
            { "name": "sidecar", "image": "envoy" },
            { "name": "app", "livenessProbe": http_probe(json!(1)) },
        ]));

        let outcome = compute(&spec);
        let (containers, changes) = patched(&outcome);
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name, "app");
        assert_eq!(changes, ["livenessProbe in container 'app'"]);
    }

    #[test]
    fn missing_ancestors_are_empty() {
        for spec in [
            Value::Null,
            json!({}),
            json!({ "template": {} }),
            json!({ "template": { "spec": {} } }),
            json!({ "template": { "spec": { "containers": null } } }),
            json!({ "template": { "spec": { "containers": "nope" } } }),
        ] {
            assert_eq!(compute(&spec), ReconciliationOutcome::NoChange, "spec: {spec}");
        }
    }

    #[test]
    fn only_exact_integer_one_matches() {
        for timeout in [json!(1.0), json!("1"), json!(true), json!(0), json!(-1), json!(null)] {
            let spec = workload(json!([{ "name": "c", "livenessProbe": http_probe(timeout.clone()) }]));
            assert_eq!(compute(&spec), ReconciliationOutcome::NoChange, "timeout: {timeout}");
        }
    }

    #[test]
    fn probe_without_timeout_is_untouched() {
        let spec = workload(json!([{
            "name": "c",
            "livenessProbe": { "tcpSocket": { "port": 5432 } },
        }]));
        assert_eq!(compute(&spec), ReconciliationOutcome::NoChange);
    }

    #[test]
    fn unnamed_container_is_skipped() {
        let spec = workload(json!([
            { "livenessProbe": http_probe(json!(1)) },
            "not-a-container",
        ]));
        assert_eq!(compute(&spec), ReconciliationOutcome::NoChange);
    }

    #[test]
    fn other_probe_fields_are_preserved() {
        let probe = json!({
            "exec": { "command": ["pg_isready", "-U", "postgres"] },
            "initialDelaySeconds": 15,
            "timeoutSeconds": 1,
            "successThreshold": 1,
            "x-custom": { "nested": [1, 2, 3] },
        });
        let spec = workload(json!([{ "name": "db", "livenessProbe": probe.clone() }]));

        let outcome = compute(&spec);
        let (containers, _) = patched(&outcome);
        let corrected = containers[0].liveness_probe.as_ref().unwrap();

        let original = probe.as_object().unwrap();
        assert_eq!(corrected.len(), original.len());
        for (k, v) in original {
            if k == "timeoutSeconds" {
                assert_eq!(corrected[k], json!(5));
            } else {
                assert_eq!(&corrected[k], v, "field {k}");
            }
        }
    }

    #[test]
    fn order_is_preserved() {
        let spec = workload(json!([
            { "name": "first", "readinessProbe": http_probe(json!(1)), "livenessProbe": http_probe(json!(1)) },
            { "name": "middle" },
            { "name": "last", "readinessProbe": http_probe(json!(1)) },
        ]));

        let outcome = compute(&spec);
        let (containers, changes) = patched(&outcome);

        let names: Vec<_> = containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["first", "last"]);
        assert_eq!(
            changes,
            [
                "livenessProbe in container 'first'",
                "readinessProbe in container 'first'",
                "readinessProbe in container 'last'",
            ]
        );
        assert_eq!(
            outcome.summary(),
            "livenessProbe in container 'first', readinessProbe in container 'first', readinessProbe in container 'last'"
        );
    }

    #[test]
    fn second_pass_is_no_change() {
        let spec = workload(json!([
            { "name": "web", "readinessProbe": http_probe(json!(1)), "livenessProbe": http_probe(json!(1)) },
            { "name": "worker", "livenessProbe": http_probe(json!(7)) },
        ]));

        let first = compute(&spec);
        let (containers, _) = patched(&first);

        let corrected = apply_patch(&spec, containers);
        assert_eq!(compute(&corrected), ReconciliationOutcome::NoChange);

        // The untouched container survives the merge verbatim.
        assert_eq!(
            corrected["template"]["spec"]["containers"][1],
            spec["template"]["spec"]["containers"][1]
        );
    }

    #[test]
    fn apply_patch_ignores_unknown_containers() {
        let spec = workload(json!([{ "name": "web" }]));
        let mut patch = ContainerPatch::new("ghost");
        patch.set_probe(ProbeType::Liveness, Map::new());

        assert_eq!(apply_patch(&spec, &[patch]), spec);
    }
}
