//! Watch and timer loops — turn object events and ticks into triggers.
//!
//! # Trigger classification
//!
//! ```text
//! first listing after start-up   InitApply(obj)   → OnResume
//! later relist, unknown object   InitApply(obj)   → OnCreate
//! live event, unknown object     Apply(obj)       → OnCreate
//! known object changed           Apply/InitApply  → cache only
//! object deleted                 Delete(obj)      → evicted
//! relist finished                InitDone         → objects not relisted evicted
//! every timer_interval                            → OnTimerTick per cached object
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use probefix_core::{Trigger, TriggerKind, WorkloadKind};

use crate::delivery::{Delivery, WorkloadCache};

/// Object event as produced by a watch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// A (re)list is starting.
    Init,
    /// An object seen during a (re)list.
    InitApply(Value),
    /// The (re)list is complete.
    InitDone,
    /// An object was added or modified.
    Apply(Value),
    /// An object was deleted.
    Delete(Value),
}

/// What the watch loop should do with one classified event.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Upsert {
        key: String,
        object: Value,
        trigger: Option<TriggerKind>,
    },
    Remove {
        key: String,
    },
}

/// Tracks which objects have been seen to classify events as create or
/// resume. One per watched kind.
#[derive(Debug, Default)]
pub struct WatchClassifier {
    /// Whether the first listing has completed.
    synced: bool,
    known: HashSet<String>,
    /// Keys seen during the current (re)list.
    relisted: HashSet<String>,
}

impl WatchClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: WatchEvent) -> Vec<Observation> {
        match event {
            WatchEvent::Init => {
                self.relisted.clear();
                Vec::new()
            }
            WatchEvent::InitApply(object) => {
                let Some(key) = object_key(&object) else {
                    return Vec::new();
                };
                self.relisted.insert(key.clone());
                let trigger = if !self.synced {
                    Some(TriggerKind::OnResume)
                } else if !self.known.contains(&key) {
                    Some(TriggerKind::OnCreate)
                } else {
                    None
                };
                self.known.insert(key.clone());
                vec![Observation::Upsert { key, object, trigger }]
            }
            WatchEvent::InitDone => {
                self.synced = true;
                let stale: Vec<String> = self
                    .known
                    .iter()
                    .filter(|k| !self.relisted.contains(*k))
                    .cloned()
                    .collect();
                for key in &stale {
                    self.known.remove(key);
                }
                self.relisted.clear();
                stale.into_iter().map(|key| Observation::Remove { key }).collect()
            }
            WatchEvent::Apply(object) => {
                let Some(key) = object_key(&object) else {
                    return Vec::new();
                };
                let trigger = self.known.insert(key.clone()).then_some(TriggerKind::OnCreate);
                vec![Observation::Upsert { key, object, trigger }]
            }
            WatchEvent::Delete(object) => {
                let Some(key) = object_key(&object) else {
                    return Vec::new();
                };
                self.known.remove(&key);
                vec![Observation::Remove { key }]
            }
        }
    }
}

/// `namespace/name` of an object body.
pub fn object_key(object: &Value) -> Option<String> {
    let metadata = object.get("metadata")?;
    let namespace = metadata.get("namespace").and_then(Value::as_str)?;
    let name = metadata.get("name").and_then(Value::as_str)?;
    Some(format!("{namespace}/{name}"))
}

/// Consume a watch stream for one kind until it ends or shutdown fires.
pub async fn run_watch<S, E>(
    kind: WorkloadKind,
    stream: S,
    cache: WorkloadCache,
    delivery: Arc<Delivery>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: Stream<Item = Result<WatchEvent, E>> + Send,
    E: std::fmt::Display + Send,
{
    let mut classifier = WatchClassifier::new();
    let mut stream = std::pin::pin!(stream);

    info!(%kind, "watch started");

    loop {
        tokio::select! {
            next = stream.next() => {
                match next {
                    Some(Ok(event)) => {
                        for observation in classifier.observe(event) {
                            apply_observation(kind, observation, &cache, &delivery).await;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(%kind, error = %e, "watch stream error");
                    }
                    None => {
                        info!(%kind, "watch stream ended");
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                debug!(%kind, "watch shutting down");
                break;
            }
        }
    }
}

async fn apply_observation(
    kind: WorkloadKind,
    observation: Observation,
    cache: &WorkloadCache,
    delivery: &Arc<Delivery>,
) {
    match observation {
        Observation::Upsert { key, object, trigger } => {
            cache.upsert(&key, object.clone()).await;
            if let Some(trigger) = trigger {
                delivery.spawn(Trigger::new(trigger, object));
            }
        }
        Observation::Remove { key } => {
            cache.remove(&key).await;
            delivery.forget(&format!("{kind}/{key}")).await;
            debug!(%kind, %key, "object evicted");
        }
    }
}

/// Deliver a timer tick for every cached object of one kind each
/// `interval`, until shutdown.
pub async fn run_timer(
    kind: WorkloadKind,
    interval: Duration,
    cache: WorkloadCache,
    delivery: Arc<Delivery>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(%kind, interval_secs = interval.as_secs(), "timer started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let objects = cache.snapshot().await;
                debug!(%kind, objects = objects.len(), "timer tick");
                for object in objects {
                    delivery.spawn(Trigger::new(TriggerKind::OnTimerTick, object));
                }
            }
            _ = shutdown.changed() => {
                debug!(%kind, "timer shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::RetryPolicy;
    use crate::testing::{MockClient, NullSink, object, probe};
    use futures_util::stream;
    use probefix_reconciler::{DispatchTable, Reconciler};
    use serde_json::json;

    fn deploy(name: &str, timeout: i64) -> Value {
        object(
            "Deployment",
            "default",
            name,
            json!([{ "name": "app", "readinessProbe": probe(timeout) }]),
        )
    }

    fn triggers(observations: &[Observation]) -> Vec<Option<TriggerKind>> {
        observations
            .iter()
            .map(|o| match o {
                Observation::Upsert { trigger, .. } => *trigger,
                Observation::Remove { .. } => None,
            })
            .collect()
    }

    fn delivery(client: Arc<MockClient>) -> Arc<Delivery> {
        let reconciler = Reconciler::new(
            DispatchTable::standard(&WorkloadKind::ALL),
            client,
            Arc::new(NullSink),
        );
        Arc::new(Delivery::new(Arc::new(reconciler), 2, RetryPolicy::default()))
    }

    #[test]
    fn first_listing_is_resume() {
        let mut c = WatchClassifier::new();
        assert!(c.observe(WatchEvent::Init).is_empty());
        let obs = c.observe(WatchEvent::InitApply(deploy("web", 1)));
        assert_eq!(triggers(&obs), [Some(TriggerKind::OnResume)]);
        assert!(c.observe(WatchEvent::InitDone).is_empty());
    }

    #[test]
    fn new_object_after_sync_is_create() {
        let mut c = WatchClassifier::new();
        c.observe(WatchEvent::Init);
        c.observe(WatchEvent::InitDone);

        let obs = c.observe(WatchEvent::Apply(deploy("web", 1)));
        assert_eq!(triggers(&obs), [Some(TriggerKind::OnCreate)]);

        // Subsequent modifications only refresh the cache.
        let obs = c.observe(WatchEvent::Apply(deploy("web", 3)));
        assert_eq!(triggers(&obs), [None]);
    }

    #[test]
    fn relist_classifies_new_and_evicts_gone() {
        let mut c = WatchClassifier::new();
        c.observe(WatchEvent::Init);
        c.observe(WatchEvent::InitApply(deploy("old", 5)));
        c.observe(WatchEvent::InitApply(deploy("kept", 5)));
        c.observe(WatchEvent::InitDone);

        // Reconnect: "old" was deleted and "fresh" created while disconnected.
        c.observe(WatchEvent::Init);
        let kept = c.observe(WatchEvent::InitApply(deploy("kept", 5)));
        let fresh = c.observe(WatchEvent::InitApply(deploy("fresh", 1)));
        let done = c.observe(WatchEvent::InitDone);

        assert_eq!(triggers(&kept), [None]);
        assert_eq!(triggers(&fresh), [Some(TriggerKind::OnCreate)]);
        assert_eq!(
            done,
            vec![Observation::Remove {
                key: "default/old".to_string()
            }]
        );
    }

    #[test]
    fn delete_then_apply_is_create_again() {
        let mut c = WatchClassifier::new();
        c.observe(WatchEvent::Init);
        c.observe(WatchEvent::InitDone);
        c.observe(WatchEvent::Apply(deploy("web", 1)));

        let obs = c.observe(WatchEvent::Delete(deploy("web", 1)));
        assert_eq!(obs, vec![Observation::Remove { key: "default/web".to_string() }]);

        let obs = c.observe(WatchEvent::Apply(deploy("web", 1)));
        assert_eq!(triggers(&obs), [Some(TriggerKind::OnCreate)]);
    }

    #[test]
    fn object_without_metadata_is_ignored() {
        let mut c = WatchClassifier::new();
        assert!(c.observe(WatchEvent::Apply(json!({ "kind": "Deployment" }))).is_empty());
    }

    #[test]
    fn object_key_reads_metadata() {
        assert_eq!(object_key(&deploy("web", 1)), Some("default/web".to_string()));
        assert_eq!(object_key(&json!({ "metadata": { "name": "x" } })), None);
    }

    #[tokio::test]
    async fn watch_resume_does_not_patch_but_create_does() {
        let client = Arc::new(MockClient::default());
        let d = delivery(client.clone());
        let cache = WorkloadCache::new();
        let (_tx, rx) = watch::channel(false);

        let events: Vec<Result<WatchEvent, String>> = vec![
            Ok(WatchEvent::Init),
            Ok(WatchEvent::InitApply(deploy("existing", 1))),
            Ok(WatchEvent::InitDone),
            Err("watch stream desynced".to_string()),
            Ok(WatchEvent::Apply(deploy("created", 1))),
        ];
        run_watch(WorkloadKind::Deployment, stream::iter(events), cache.clone(), d, rx).await;

        // Let the spawned passes finish.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(client.patched(), vec!["default/created".to_string()]);
    }

    #[tokio::test]
    async fn timer_ticks_every_cached_object() {
        let client = Arc::new(MockClient::default());
        let d = delivery(client.clone());
        let cache = WorkloadCache::new();
        cache.upsert("default/a", deploy("a", 1)).await;
        cache.upsert("default/b", deploy("b", 5)).await;

        let (tx, rx) = watch::channel(false);
        let timer = tokio::spawn(run_timer(
            WorkloadKind::Deployment,
            Duration::from_millis(10),
            cache,
            d,
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(35)).await;
        tx.send(true).unwrap();
        timer.await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Only "a" needs fixing; the mock never applies the patch, so it is
        // re-patched on every tick.
        let patched = client.patched();
        assert!(!patched.is_empty());
        assert!(patched.iter().all(|k| k == "default/a"));
    }

    #[tokio::test]
    async fn shutdown_stops_watch() {
        let d = delivery(Arc::new(MockClient::default()));
        let (tx, rx) = watch::channel(false);

        let pending = stream::pending::<Result<WatchEvent, String>>();
        let task = tokio::spawn(run_watch(WorkloadKind::StatefulSet, pending, WorkloadCache::new(), d, rx));

        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
