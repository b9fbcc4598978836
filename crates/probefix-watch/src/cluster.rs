//! Kubernetes adapters: patch client, event sink and watch streams.

use std::fmt::Debug;

use futures_util::{Stream, StreamExt};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use probefix_core::PatchError;
use probefix_reconciler::{EventFuture, EventSink, PatchClient, PatchFuture, WorkloadEvent};

use crate::watch::WatchEvent;

/// Strategic merge patches against `apps/v1`.
#[derive(Clone)]
pub struct KubePatchClient {
    client: Client,
}

impl KubePatchClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl PatchClient for KubePatchClient {
    fn patch_deployment<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
        patch: &'a Value,
    ) -> PatchFuture<'a> {
        Box::pin(async move {
            let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
            api.patch(name, &PatchParams::default(), &Patch::Strategic(patch))
                .await
                .map(|_| ())
                .map_err(classify_error)
        })
    }

    fn patch_stateful_set<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
        patch: &'a Value,
    ) -> PatchFuture<'a> {
        Box::pin(async move {
            let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
            api.patch(name, &PatchParams::default(), &Patch::Strategic(patch))
                .await
                .map(|_| ())
                .map_err(classify_error)
        })
    }
}

/// Map a kube client error onto the patch error taxonomy.
pub fn classify_error(err: kube::Error) -> PatchError {
    match err {
        kube::Error::Api(resp) => classify_status(resp.code, resp.message),
        kube::Error::HyperError(e) => PatchError::Transient(e.to_string()),
        kube::Error::Service(e) => PatchError::Transient(e.to_string()),
        other => PatchError::Other(other.to_string()),
    }
}

fn classify_status(code: u16, message: String) -> PatchError {
    match code {
        404 => PatchError::NotFound(message),
        409 => PatchError::Conflict(message),
        401 | 403 => PatchError::Forbidden(message),
        408 | 429 | 500..=599 => PatchError::Transient(message),
        _ => PatchError::Other(format!("{code}: {message}")),
    }
}

/// Posts `core/v1` events attached to the workload.
#[derive(Clone)]
pub struct KubeEventSink {
    client: Client,
    reporter: String,
}

impl KubeEventSink {
    pub fn new(client: Client, reporter: &str) -> Self {
        Self {
            client,
            reporter: reporter.to_string(),
        }
    }
}

impl EventSink for KubeEventSink {
    fn record<'a>(&'a self, object: &'a Value, event: &'a WorkloadEvent) -> EventFuture<'a> {
        Box::pin(async move {
            let involved = object_reference(object);
            let namespace = involved
                .namespace
                .clone()
                .ok_or_else(|| anyhow::anyhow!("event target has no namespace"))?;
            let now = Time(k8s_openapi::chrono::Utc::now());

            let ev = Event {
                metadata: ObjectMeta {
                    generate_name: Some(format!(
                        "{}.",
                        involved.name.as_deref().unwrap_or("workload")
                    )),
                    namespace: Some(namespace.clone()),
                    ..Default::default()
                },
                involved_object: involved,
                type_: Some(event.event_type.as_str().to_string()),
                reason: Some(event.reason.clone()),
                message: Some(event.message.clone()),
                source: Some(EventSource {
                    component: Some(self.reporter.clone()),
                    host: None,
                }),
                reporting_component: Some(self.reporter.clone()),
                first_timestamp: Some(now.clone()),
                last_timestamp: Some(now),
                count: Some(1),
                ..Default::default()
            };

            let api: Api<Event> = Api::namespaced(self.client.clone(), &namespace);
            api.create(&PostParams::default(), &ev).await?;
            Ok(())
        })
    }
}

/// Reference to the object described by `body`.
pub fn object_reference(body: &Value) -> ObjectReference {
    let field = |path: &[&str]| -> Option<String> {
        let mut v = body;
        for p in path {
            v = v.get(p)?;
        }
        v.as_str().map(str::to_string)
    };

    ObjectReference {
        api_version: field(&["apiVersion"]),
        kind: field(&["kind"]),
        name: field(&["metadata", "name"]),
        namespace: field(&["metadata", "namespace"]),
        uid: field(&["metadata", "uid"]),
        resource_version: field(&["metadata", "resourceVersion"]),
        ..Default::default()
    }
}

/// Cluster-wide watch of one resource type as a stream of [`WatchEvent`]s.
///
/// Reconnects with the watcher's default backoff; errors are yielded and
/// the stream continues.
pub fn watch_stream<K>(api: Api<K>) -> impl Stream<Item = anyhow::Result<WatchEvent>> + Send
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static,
{
    watcher(api, watcher::Config::default())
        .default_backoff()
        .map(|event| -> anyhow::Result<WatchEvent> {
            Ok(match event? {
                watcher::Event::Init => WatchEvent::Init,
                watcher::Event::InitApply(obj) => WatchEvent::InitApply(serde_json::to_value(obj)?),
                watcher::Event::InitDone => WatchEvent::InitDone,
                watcher::Event::Apply(obj) => WatchEvent::Apply(serde_json::to_value(obj)?),
                watcher::Event::Delete(obj) => WatchEvent::Delete(serde_json::to_value(obj)?),
            })
        })
}
