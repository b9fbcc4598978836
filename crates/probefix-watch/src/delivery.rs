//! Trigger delivery — runs reconciler passes with per-object
//! serialization, bounded concurrency and retry.
//!
//! Passes for different objects run concurrently, up to `workers` at a
//! time. Passes for the same object are serialized through a lock table
//! keyed by `kind/namespace/name`. A timer tick that finds its object
//! busy is skipped; the next tick covers it.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use probefix_core::{ReconcileError, Trigger, TriggerKind, WorkloadRef};
use probefix_reconciler::{PassReport, Reconciler};

use crate::backoff::RetryPolicy;

/// How a delivered trigger ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The pass ran to completion.
    Completed(PassReport),
    /// A timer tick found another pass in flight for the same object.
    Skipped,
    /// The pass failed and will not be retried.
    Dropped(ReconcileError),
}

/// Per-object locks. Entries are dropped when the object is deleted and
/// no pass holds or waits on them.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    async fn entry(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait for the object's lock.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        self.entry(key).await.lock_owned().await
    }

    /// Take the object's lock only if no pass holds it.
    pub async fn try_acquire(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
        self.entry(key).await.try_lock_owned().ok()
    }

    /// Drop the entry unless a pass still holds or waits on it.
    ///
    /// Returns whether the entry is gone.
    pub async fn forget(&self, key: &str) -> bool {
        let mut locks = self.locks.lock().await;
        match locks.get(key) {
            Some(lock) if Arc::strong_count(lock) > 1 => false,
            _ => {
                locks.remove(key);
                true
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

/// Latest observed body of every watched object of one kind,
/// keyed by `namespace/name`.
#[derive(Clone, Default)]
pub struct WorkloadCache {
    objects: Arc<RwLock<HashMap<String, Value>>>,
}

impl WorkloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, key: &str, object: Value) {
        self.objects.write().await.insert(key.to_string(), object);
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.objects.write().await.remove(key)
    }

    pub async fn snapshot(&self) -> Vec<Value> {
        self.objects.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

pub struct Delivery {
    reconciler: Arc<Reconciler>,
    locks: KeyedLocks,
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl Delivery {
    pub fn new(reconciler: Arc<Reconciler>, workers: usize, retry: RetryPolicy) -> Self {
        Self {
            reconciler,
            locks: KeyedLocks::default(),
            permits: Arc::new(Semaphore::new(workers.max(1))),
            retry,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Drop the lock entry of a deleted object.
    pub async fn forget(&self, key: &str) {
        if !self.locks.forget(key).await {
            debug!(%key, "lock still in use, keeping entry");
        }
    }

    /// Run the trigger on a background task.
    pub fn spawn(self: &Arc<Self>, trigger: Trigger) -> JoinHandle<DeliveryOutcome> {
        let delivery = self.clone();
        tokio::spawn(async move { delivery.deliver(trigger).await })
    }

    /// Run one trigger to completion, retrying retryable failures.
    pub async fn deliver(&self, trigger: Trigger) -> DeliveryOutcome {
        let key = match WorkloadRef::from_object(&trigger.object) {
            Ok(workload) => workload.key(),
            // Nothing to serialize on; the reconciler rejects and logs it.
            Err(_) => {
                return match self.reconciler.handle(&trigger).await {
                    Ok(report) => DeliveryOutcome::Completed(report),
                    Err(e) => DeliveryOutcome::Dropped(e),
                };
            }
        };

        let _guard = if trigger.kind == TriggerKind::OnTimerTick {
            match self.locks.try_acquire(&key).await {
                Some(guard) => guard,
                None => {
                    debug!(%key, "pass in flight, skipping tick");
                    return DeliveryOutcome::Skipped;
                }
            }
        } else {
            self.locks.acquire(&key).await
        };

        let Ok(_permit) = self.permits.clone().acquire_owned().await else {
            return DeliveryOutcome::Skipped;
        };

        let mut tracker = self.retry.tracker();
        loop {
            match self.reconciler.handle(&trigger).await {
                Ok(report) => return DeliveryOutcome::Completed(report),
                Err(e) if e.is_benign() => {
                    debug!(%key, error = %e, "dropping pass for deleted object");
                    return DeliveryOutcome::Dropped(e);
                }
                Err(e) if e.is_retryable() => match tracker.record_failure() {
                    Some(delay) => {
                        debug!(
                            %key,
                            attempt = tracker.attempts(),
                            delay_ms = delay.as_millis() as u64,
                            "retrying pass"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        error!(
                            %key,
                            attempts = tracker.attempts(),
                            error = %e,
                            "giving up on pass"
                        );
                        return DeliveryOutcome::Dropped(e);
                    }
                },
                Err(e) => return DeliveryOutcome::Dropped(e),
            }
        }
    }
}
