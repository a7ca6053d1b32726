//! Controller Shell: wires informer events onto the work queue, starts `workers`
//! identical reconciler worker tasks, and owns startup/shutdown. Also carries the
//! `State`/`Diagnostics` pair the web server in `main.rs` reads from.

use crate::deleter::ClusterDeleter;
use crate::health::{HealthMonitor, HealthProbe};
use crate::informer::{self, ClusterCache};
use crate::providers::ProviderRegistry;
use crate::queue::WorkQueue;
use crate::reconciler::Reconciler;
use crate::util::config::Config;
use crate::util::errors::{Error, Result, StdError};
use crate::util::metrics::Metrics;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use kube::Client;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Diagnostics exposed by the web server's `/` endpoint.
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_reconcile: DateTime<Utc>,
}

impl Default for Diagnostics {
    fn default() -> Diagnostics {
        Diagnostics {
            last_reconcile: Utc::now(),
        }
    }
}

/// State shared between the controller shell and the web server.
#[derive(Clone)]
pub struct State {
    diagnostics: Arc<RwLock<Diagnostics>>,
    registry: prometheus::Registry,
}

impl Default for State {
    fn default() -> State {
        State {
            diagnostics: Arc::new(RwLock::new(Diagnostics::default())),
            registry: prometheus::Registry::default(),
        }
    }
}

impl State {
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    fn register_metrics(&self) -> Arc<Metrics> {
        Arc::new(
            Metrics::default()
                .register(&self.registry)
                .expect("metric registration is infallible for a fresh registry"),
        )
    }
}

pub struct ControllerShell {
    cache: ClusterCache,
    queue: WorkQueue,
    registry: ProviderRegistry,
    reconciler: Reconciler,
    diagnostics: Arc<RwLock<Diagnostics>>,
}

impl ControllerShell {
    /// Constructs the shell: builds the informer cache, the rate-limited work
    /// queue, the deleter, and the health monitor, then wires them all into a
    /// `Reconciler`.
    pub fn new(
        client: Client,
        config: Config,
        provider_registry: ProviderRegistry,
        health_probe: Arc<dyn HealthProbe>,
        state: &State,
        stop: CancellationToken,
    ) -> ControllerShell {
        let queue = WorkQueue::new("cluster");
        let cache = informer::start(client.clone(), config.resync_period, queue.clone(), stop.clone());
        let deleter = ClusterDeleter::new(
            client.clone(),
            provider_registry.clone(),
            config.finalizer_token.clone(),
            true,
        );
        let metrics = state.register_metrics();
        let health = HealthMonitor::new(
            client.clone(),
            cache.clone(),
            health_probe,
            config.health_check_interval,
            stop.clone(),
            metrics.clone(),
        );
        let reconciler = Reconciler::new(client, cache.clone(), provider_registry.clone(), deleter, health, metrics);

        ControllerShell {
            cache,
            queue,
            registry: provider_registry,
            reconciler,
            diagnostics: state.diagnostics.clone(),
        }
    }

    /// `run(workers, stop)`: blocks until the informer syncs, then drives
    /// `workers` worker tasks against the queue until `stop` fires.
    pub async fn run(&self, workers: usize, stop: CancellationToken) -> Result<()> {
        self.registry.setup().await?;

        self.wait_for_sync(&stop).await?;
        info!("informer synced, starting {workers} reconciler workers");

        let mut tasks = JoinSet::new();
        for id in 0..workers {
            let queue = self.queue.clone();
            let reconciler = self.reconciler.clone();
            let diagnostics = self.diagnostics.clone();
            tasks.spawn(async move { worker_loop(id, queue, reconciler, diagnostics).await });
        }

        stop.cancelled().await;
        info!("stop signal received, shutting down work queue");
        self.queue.shutdown();
        while tasks.join_next().await.is_some() {}

        self.registry.teardown().await;
        Ok(())
    }

    async fn wait_for_sync(&self, stop: &CancellationToken) -> Result<()> {
        loop {
            if self.cache.has_synced() {
                return Ok(());
            }
            tokio::select! {
                _ = stop.cancelled() => {
                    return Err(Error::StdError(StdError::InformerSyncTimedOut(
                        "stop signal fired before informer synced".to_string(),
                    )));
                }
                _ = tokio::time::sleep(StdDuration::from_millis(100)) => {}
            }
        }
    }
}

/// One worker's loop: pop a key, sync it, forget or rate-limit-requeue based on the
/// outcome. A panicking reconcile is caught and treated as a retryable error so
/// one malformed object can't take down the whole worker pool.
///
/// Termination is driven solely by `queue.get()` returning `None`: `run` calls
/// `queue.shutdown()` once `stop` fires, which lets `get()` drain whatever is still
/// ready before it returns `None`. Racing `stop.cancelled()` directly against
/// `queue.get()` here would let a worker abandon already-queued keys the instant
/// shutdown begins, since `select!` doesn't prefer one ready branch over another.
async fn worker_loop(id: usize, queue: WorkQueue, reconciler: Reconciler, diagnostics: Arc<RwLock<Diagnostics>>) {
    loop {
        let Some(key) = queue.get().await else {
            return;
        };

        diagnostics.write().await.last_reconcile = Utc::now();

        let outcome = AssertUnwindSafe(reconciler.sync_cluster(&key)).catch_unwind().await;
        match outcome {
            Ok(Ok(())) => queue.forget(&key).await,
            Ok(Err(e)) => {
                warn!(worker = id, %key, error = %e, fixed_retry = ?e.requeue_after(), "reconcile failed, requeueing");
                match e.requeue_after() {
                    Some(delay) => queue.add_after(key.clone(), delay).await,
                    None => queue.add_rate_limited(key.clone()).await,
                }
            }
            Err(_) => {
                error!(worker = id, %key, "reconcile panicked, requeueing");
                queue.add_rate_limited(key.clone()).await;
            }
        }
        queue.done(&key).await;
    }
}
