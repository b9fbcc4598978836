//! Assembles the reconciler, delivery layer and per-kind loops against
//! a live cluster.

use std::sync::Arc;

use anyhow::Context;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::Client;
use kube::api::{Api, ListParams};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use probefix_core::{ControllerConfig, WorkloadKind};
use probefix_reconciler::{DispatchTable, Reconciler};

use crate::backoff::RetryPolicy;
use crate::cluster::{KubeEventSink, KubePatchClient, watch_stream};
use crate::delivery::{Delivery, WorkloadCache};
use crate::watch::{run_timer, run_watch};

/// Run the controller until `shutdown` fires.
pub async fn run_controller(
    client: Client,
    config: &ControllerConfig,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let interval = config.timer_interval()?;
    let retry = RetryPolicy::from_config(&config.retry)?;

    preflight(&client).await?;

    let table = DispatchTable::standard(&WorkloadKind::ALL);
    let reconciler = Reconciler::new(
        table,
        Arc::new(KubePatchClient::new(client.clone())),
        Arc::new(KubeEventSink::new(client.clone(), &config.reporter)),
    );
    let delivery = Arc::new(Delivery::new(Arc::new(reconciler), config.workers, retry));

    let mut handles: Vec<JoinHandle<()>> = Vec::new();
    for kind in delivery.reconciler().table().kinds() {
        let cache = WorkloadCache::new();

        let watch_task = match kind {
            WorkloadKind::Deployment => tokio::spawn(run_watch(
                kind,
                watch_stream(Api::<Deployment>::all(client.clone())),
                cache.clone(),
                delivery.clone(),
                shutdown.clone(),
            )),
            WorkloadKind::StatefulSet => tokio::spawn(run_watch(
                kind,
                watch_stream(Api::<StatefulSet>::all(client.clone())),
                cache.clone(),
                delivery.clone(),
                shutdown.clone(),
            )),
        };
        handles.push(watch_task);
        handles.push(tokio::spawn(run_timer(
            kind,
            interval,
            cache,
            delivery.clone(),
            shutdown.clone(),
        )));
    }

    info!(
        workers = config.workers,
        interval_secs = interval.as_secs(),
        "controller started, watching Deployments and StatefulSets in all namespaces"
    );

    for handle in handles {
        handle.await.context("controller task panicked")?;
    }

    info!("controller stopped");
    Ok(())
}

/// Fail fast when the watched kinds cannot be listed.
async fn preflight(client: &Client) -> anyhow::Result<()> {
    let params = ListParams::default().limit(1);
    Api::<Deployment>::all(client.clone())
        .list(&params)
        .await
        .context("cannot list deployments; check RBAC")?;
    Api::<StatefulSet>::all(client.clone())
        .list(&params)
        .await
        .context("cannot list statefulsets; check RBAC")?;
    Ok(())
}
