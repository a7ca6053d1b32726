//! `providers::cloud`: delegates to an injected `CloudBackend` (itself out of scope for
//! this crate) to call out to a cloud API. The in-memory fake here demonstrates the seam
//! a real implementation would fill in and backs the unit tests.

use super::ClusterProvider;
use crate::api::ClusterPhase;
use crate::util::errors::{Error, Result, StdError};
use crate::wrapper::ClusterWrapper;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The cloud API contract this provider depends on: given a cluster name, provision (or
/// describe) it and report whether provisioning has finished. Concrete cloud backends
/// are out of scope for this crate; this trait is the seam.
#[async_trait]
pub trait CloudBackend: Send + Sync {
    async fn provision(&self, cluster_name: &str) -> std::result::Result<bool, String>;
    async fn describe(&self, cluster_name: &str) -> std::result::Result<bool, String>;
}

pub struct CloudProvider {
    backend: Arc<dyn CloudBackend>,
}

impl CloudProvider {
    pub fn new(backend: Arc<dyn CloudBackend>) -> CloudProvider {
        CloudProvider { backend }
    }
}

#[async_trait]
impl ClusterProvider for CloudProvider {
    async fn on_create(&self, wrapper: &mut ClusterWrapper) -> Result<()> {
        let name = kube::ResourceExt::name_any(&wrapper.cluster);
        let ready = self
            .backend
            .provision(&name)
            .await
            .map_err(|e| Error::StdError(StdError::HealthCheckFailed(e)))?;

        let status = wrapper.cluster.status.get_or_insert_with(Default::default);
        if ready {
            status.set_phase(ClusterPhase::Running);
        }
        Ok(())
    }

    async fn on_update(&self, wrapper: &mut ClusterWrapper) -> Result<()> {
        let name = kube::ResourceExt::name_any(&wrapper.cluster);
        match self.backend.describe(&name).await {
            Ok(true) => {
                wrapper.cluster.status.get_or_insert_with(Default::default).set_phase(ClusterPhase::Running);
                Ok(())
            }
            Ok(false) => {
                wrapper.cluster.status.get_or_insert_with(Default::default).set_phase(ClusterPhase::Failed);
                Ok(())
            }
            Err(e) => Err(Error::StdError(StdError::HealthCheckFailed(e))),
        }
    }
}

/// Fake `CloudBackend` for tests: a cluster is "ready" on its second `provision` call,
/// matching the `on_create` loop's "keep driving until done" contract.
#[derive(Default)]
pub struct InMemoryCloudBackend {
    seen: Mutex<HashSet<String>>,
}

#[async_trait]
impl CloudBackend for InMemoryCloudBackend {
    async fn provision(&self, cluster_name: &str) -> std::result::Result<bool, String> {
        let mut seen = self.seen.lock().await;
        if seen.contains(cluster_name) {
            Ok(true)
        } else {
            seen.insert(cluster_name.to_string());
            Ok(false)
        }
    }

    async fn describe(&self, _cluster_name: &str) -> std::result::Result<bool, String> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Cluster, ClusterSpec, ClusterStatus};

    fn wrapper() -> ClusterWrapper {
        let mut cluster = Cluster::new("c1", ClusterSpec {
            type_: "cloud".to_string(),
            tenant_id: "t1".to_string(),
            cluster_credential_ref: None,
            provider_config: Default::default(),
        });
        cluster.status = Some(ClusterStatus::default());
        ClusterWrapper { cluster, credential: None }
    }

    #[tokio::test]
    async fn becomes_running_on_second_create_call() {
        let provider = CloudProvider::new(Arc::new(InMemoryCloudBackend::default()));
        let mut w = wrapper();

        provider.on_create(&mut w).await.unwrap();
        assert_eq!(w.cluster.status.as_ref().unwrap().phase(), None);

        provider.on_create(&mut w).await.unwrap();
        assert_eq!(w.cluster.status.as_ref().unwrap().phase(), Some(ClusterPhase::Running));
    }
}
