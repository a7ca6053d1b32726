//! Health Monitor: a per-cluster periodic external probe, independent of the
//! reconciler, that updates `status.phase` and the `HealthCheck` condition via
//! strategic-merge patch. Armed from `on_update`/the tail of `on_create` once a cluster
//! reaches `Running`.

use crate::api::{Cluster, ClusterCredential, ClusterPhase, FAILED_HEALTH_CHECK_REASON, HEALTH_CHECK_CONDITION};
use crate::informer::ClusterCache;
use crate::queue::Key;
use crate::util::metrics::Metrics;
use crate::util::status::set_status_condition;
use crate::wrapper::FIELD_MANAGER;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A handle onto an external, managed Kubernetes cluster, obtained via its credentials.
/// Building the handle is out of scope for this crate beyond this contract.
#[async_trait]
pub trait ClusterHandle: Send + Sync {
    async fn server_version(&self) -> std::result::Result<String, String>;
}

/// Builds a `ClusterHandle` for a `Cluster` given its `ClusterCredential`. The only seam
/// a real implementation needs to fill in.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn connect(&self, credential: &ClusterCredential) -> std::result::Result<Box<dyn ClusterHandle>, String>;
}

/// A `HealthProbe` for deployments that haven't wired up a real one yet. Every probe
/// attempt fails, so affected clusters surface as `Failed` with a `HealthCheck`
/// condition naming the gap rather than silently never being checked.
#[derive(Default)]
pub struct UnconfiguredProbe;

#[async_trait]
impl HealthProbe for UnconfiguredProbe {
    async fn connect(&self, _credential: &ClusterCredential) -> std::result::Result<Box<dyn ClusterHandle>, String> {
        Err("no HealthProbe configured for this deployment".to_string())
    }
}

/// The set of cluster keys with an active health task.
#[derive(Clone, Default)]
pub struct HealthRegistry {
    keys: Arc<Mutex<HashSet<Key>>>,
}

impl HealthRegistry {
    pub fn new() -> HealthRegistry {
        HealthRegistry::default()
    }

    async fn contains(&self, key: &Key) -> bool {
        self.keys.lock().await.contains(key)
    }

    async fn insert(&self, key: Key) {
        self.keys.lock().await.insert(key);
    }

    async fn remove(&self, key: &Key) {
        self.keys.lock().await.remove(key);
    }

    #[cfg(test)]
    pub async fn contains_key(&self, key: &Key) -> bool {
        self.contains(key).await
    }
}

#[derive(Clone)]
pub struct HealthMonitor {
    client: Client,
    cache: ClusterCache,
    probe: Arc<dyn HealthProbe>,
    registry: HealthRegistry,
    interval: Duration,
    stop: CancellationToken,
    metrics: Arc<Metrics>,
}

impl HealthMonitor {
    pub fn new(
        client: Client,
        cache: ClusterCache,
        probe: Arc<dyn HealthProbe>,
        interval: Duration,
        stop: CancellationToken,
        metrics: Arc<Metrics>,
    ) -> HealthMonitor {
        HealthMonitor {
            client,
            cache,
            probe,
            registry: HealthRegistry::new(),
            interval,
            stop,
            metrics,
        }
    }

    pub fn registry(&self) -> HealthRegistry {
        self.registry.clone()
    }

    /// Arms the health task for `key`, unless one is already running.
    pub async fn ensure_start_health_check(&self, key: Key) {
        if self.registry.contains(&key).await {
            return;
        }
        self.registry.insert(key.clone()).await;

        let monitor = self.clone();
        let stop = self.stop.clone();
        tokio::spawn(async move {
            // Desynchronize startup storms.
            let jitter_micros = rand::thread_rng().gen_range(0..100);
            tokio::time::sleep(Duration::from_micros(jitter_micros)).await;

            let mut ticker = tokio::time::interval(monitor.interval);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => {
                        monitor.registry.remove(&key).await;
                        return;
                    }
                    _ = ticker.tick() => {
                        if monitor.watch_health(&key).await {
                            monitor.registry.remove(&key).await;
                            return;
                        }
                    }
                }
            }
        });
    }

    /// Runs one tick for `key`. Returns `true` if the loop should stop (object gone).
    async fn watch_health(&self, key: &Key) -> bool {
        let Some((ns, name)) = key.split() else {
            warn!(%key, "malformed health-check key");
            return true;
        };

        let Some(cluster) = self.cache.get(ns, name) else {
            debug!(%key, "cluster gone, stopping health checks");
            return true;
        };

        match cluster.status.as_ref().and_then(|s| s.phase()) {
            Some(ClusterPhase::Running) | Some(ClusterPhase::Failed) => {
                if let Err(e) = self.check_health((*cluster).clone()).await {
                    warn!(%key, error = %e, "health check failed to persist");
                }
            }
            _ => {}
        }
        false
    }

    /// Runs a single probe and patches the result back.
    async fn check_health(&self, mut cluster: Cluster) -> crate::util::errors::Result<()> {
        let old_cluster = cluster.clone();
        let credentials: Api<ClusterCredential> =
            Api::namespaced(self.client.clone(), &cluster.namespace().unwrap_or_default());

        let credential = match &cluster.spec.cluster_credential_ref {
            Some(cluster_credential_ref) => match credentials.get_opt(&cluster_credential_ref.name).await {
                Ok(credential) => Ok(credential),
                Err(e) => {
                    warn!(cluster = %cluster.name_any(), error = %e, "failed to fetch cluster credential for health check");
                    Err(e.to_string())
                }
            },
            None => Ok(None),
        };

        let outcome = match credential {
            Err(e) => Err(e),
            Ok(None) => Err("no credential available for health check".to_string()),
            Ok(Some(credential)) => match self.probe.connect(&credential).await {
                Ok(handle) => handle.server_version().await,
                Err(e) => Err(e),
            },
        };

        self.metrics.health_check_outcome(&cluster.name_any(), outcome.is_ok());

        let status = cluster.status.get_or_insert_with(Default::default);
        let condition = match &outcome {
            Ok(version) => {
                status.set_phase(ClusterPhase::Running);
                status.version = Some(version.clone());
                Condition {
                    type_: HEALTH_CHECK_CONDITION.to_string(),
                    status: "True".to_string(),
                    reason: "Healthy".to_string(),
                    message: "server responded".to_string(),
                    observed_generation: None,
                    last_transition_time: Time(chrono::Utc::now()),
                }
            }
            Err(e) => {
                status.set_phase(ClusterPhase::Failed);
                Condition {
                    type_: HEALTH_CHECK_CONDITION.to_string(),
                    status: "False".to_string(),
                    reason: FAILED_HEALTH_CHECK_REASON.to_string(),
                    message: e.clone(),
                    observed_generation: None,
                    last_transition_time: Time(chrono::Utc::now()),
                }
            }
        };
        let (conditions, _) = set_status_condition(&status.conditions, condition);
        status.conditions = conditions;

        self.patch_status(&old_cluster, &cluster).await
    }

    /// Computes and applies a strategic-merge (server-side apply) patch scoped to
    /// `status`, so concurrent reconciler writes to `spec` are never clobbered.
    async fn patch_status(&self, old_cluster: &Cluster, cluster: &Cluster) -> crate::util::errors::Result<()> {
        if old_cluster.status == cluster.status {
            return Ok(());
        }
        let clusters: Api<Cluster> = Api::namespaced(self.client.clone(), &cluster.namespace().unwrap_or_default());
        let patch = serde_json::json!({
            "apiVersion": "lifecycle.example.com/v1",
            "kind": "Cluster",
            "status": cluster.status,
        });
        clusters
            .patch_status(&cluster.name_any(), &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(patch))
            .await
            .map_err(|e| crate::util::errors::Error::StdError(crate::util::errors::StdError::KubeError(e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_condition_carries_reason_and_message() {
        let (conditions, changed) = set_status_condition(
            &[],
            Condition {
                type_: HEALTH_CHECK_CONDITION.to_string(),
                status: "False".to_string(),
                reason: FAILED_HEALTH_CHECK_REASON.to_string(),
                message: "connection refused".to_string(),
                observed_generation: None,
                last_transition_time: Time(chrono::Utc::now()),
            },
        );
        assert!(changed);
        assert_eq!(conditions[0].reason, FAILED_HEALTH_CHECK_REASON);
        assert_eq!(conditions[0].message, "connection refused");
    }

    #[tokio::test]
    async fn registry_tracks_presence_across_insert_and_remove() {
        let registry = HealthRegistry::new();
        let key = Key::new("default", "c1");
        assert!(!registry.contains_key(&key).await);
        registry.insert(key.clone()).await;
        assert!(registry.contains_key(&key).await);
        registry.remove(&key).await;
        assert!(!registry.contains_key(&key).await);
    }

    struct FailingProbe;

    #[async_trait]
    impl HealthProbe for FailingProbe {
        async fn connect(&self, _credential: &ClusterCredential) -> std::result::Result<Box<dyn ClusterHandle>, String> {
            Err("conn refused".to_string())
        }
    }

    /// A build-the-external-client failure must surface as `Phase=Failed` plus a
    /// `HealthCheck=False/FailedHealthCheck/<error>` condition, written back via a
    /// `status`-scoped strategic-merge patch rather than a full-object `Update`.
    #[tokio::test]
    async fn health_failure_patches_phase_failed_and_condition() {
        use crate::fixtures::{mock_client, test_cluster, test_credential, timeout_after_1s, with_credential_ref, Exchange};

        let (client, server) = mock_client();

        let mut cluster = with_credential_ref(test_cluster("c1", "bare"), "cred-1");
        cluster.status.as_mut().unwrap().set_phase(ClusterPhase::Running);
        let credential = test_credential("cred-1", "c1");

        let mocksrv = server.run(vec![
            Exchange::get("clustercredentials/cred-1", serde_json::json!(credential)),
            Exchange::patch("clusters/c1/status", serde_json::json!(cluster)),
        ]);

        let cache = ClusterCache::for_tests();
        let metrics = Arc::new(Metrics::default());
        let monitor = HealthMonitor::new(
            client,
            cache,
            Arc::new(FailingProbe),
            Duration::from_secs(300),
            CancellationToken::new(),
            metrics,
        );

        monitor.check_health(cluster).await.unwrap();

        timeout_after_1s(mocksrv).await;
    }
}
