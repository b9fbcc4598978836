//! Test doubles shared by the delivery and watch tests.

use std::io;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};

use probefix_core::PatchError;
use probefix_reconciler::{EventFuture, EventSink, PatchClient, PatchFuture, WorkloadEvent};

/// Patch client that fails its first `fail_first` calls.
#[derive(Default)]
pub struct MockClient {
    calls: AtomicUsize,
    fail_first: usize,
    error: Option<PatchError>,
    patched: Mutex<Vec<String>>,
}

impl MockClient {
    pub fn failing_first(fail_first: usize, error: PatchError) -> Self {
        Self {
            fail_first,
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn patch_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `namespace/name` of every successful patch, in call order.
    pub fn patched(&self) -> Vec<String> {
        self.patched.lock().unwrap().clone()
    }

    fn call(&self, namespace: &str, name: &str) -> Result<(), PatchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            if let Some(e) = &self.error {
                return Err(e.clone());
            }
        }
        self.patched.lock().unwrap().push(format!("{namespace}/{name}"));
        Ok(())
    }
}

impl PatchClient for MockClient {
    fn patch_deployment<'a>(&'a self, namespace: &'a str, name: &'a str, _patch: &'a Value) -> PatchFuture<'a> {
        let result = self.call(namespace, name);
        Box::pin(async move { result })
    }

    fn patch_stateful_set<'a>(&'a self, namespace: &'a str, name: &'a str, _patch: &'a Value) -> PatchFuture<'a> {
        let result = self.call(namespace, name);
        Box::pin(async move { result })
    }
}

pub struct NullSink;

impl EventSink for NullSink {
    fn record<'a>(&'a self, _object: &'a Value, _event: &'a WorkloadEvent) -> EventFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

pub fn object(kind: &str, namespace: &str, name: &str, containers: Value) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": kind,
        "metadata": { "name": name, "namespace": namespace },
        "spec": { "template": { "spec": { "containers": containers } } }
    })
}

pub fn probe(timeout: i64) -> Value {
    json!({ "tcpSocket": { "port": 8080 }, "timeoutSeconds": timeout })
}

/// Captures formatted log lines at INFO and above while installed.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}
