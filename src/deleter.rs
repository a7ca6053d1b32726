//! `ClusterDeleter`: finalizer-driven teardown orchestrator for clusters whose
//! `status.phase == Terminating`. Safe to call repeatedly for the same key — it
//! re-derives all state from the live object on each invocation rather than keeping
//! deleter-local progress.

use crate::api::{Cluster, ClusterCredential, ClusterCredentialRef};
use crate::providers::ProviderRegistry;
use crate::util::errors::{Error, Result, StdError};
use kube::api::{Api, DeleteParams};
use kube::{Client, ResourceExt};
use tracing::info;

#[derive(Clone)]
pub struct ClusterDeleter {
    client: Client,
    registry: ProviderRegistry,
    finalizer_token: String,
    cleanup_credential: bool,
}

impl ClusterDeleter {
    pub fn new(
        client: Client,
        registry: ProviderRegistry,
        finalizer_token: String,
        cleanup_credential: bool,
    ) -> ClusterDeleter {
        ClusterDeleter {
            client,
            registry,
            finalizer_token,
            cleanup_credential,
        }
    }

    /// Runs finalizer-associated cleanup, then removes the controller's finalizer token
    /// and persists the object. Tolerates `NotFound` throughout.
    pub async fn delete(&self, mut cluster: Cluster) -> Result<()> {
        let ns = cluster.namespace().unwrap_or_default();
        let name = cluster.name_any();

        self.release_provider_resources(&cluster).await?;

        if self.cleanup_credential {
            self.delete_credential(&ns, &cluster.spec.cluster_credential_ref).await?;
        }

        let had_token = cluster.finalizers().iter().any(|f| f == &self.finalizer_token);
        if had_token {
            cluster
                .finalizers_mut()
                .retain(|f| f != &self.finalizer_token);

            let clusters: Api<Cluster> = Api::namespaced(self.client.clone(), &ns);
            match clusters
                .replace(&name, &kube::api::PostParams::default(), &cluster)
                .await
            {
                Ok(_) => {}
                Err(kube::Error::Api(e)) if e.code == 404 => {}
                Err(e) => return Err(Error::StdError(StdError::KubeError(e))),
            }
        }

        info!(cluster = %name, "finalizer removed, teardown complete");
        Ok(())
    }

    /// Best-effort release of external resources via the provider registered for this
    /// cluster's type. A provider no longer registered (e.g. during a rolling restart
    /// that changed configuration) is not fatal for deletion — teardown proceeds without
    /// it, since the object is going away regardless.
    async fn release_provider_resources(&self, cluster: &Cluster) -> Result<()> {
        if self.registry.get(&cluster.spec.type_).await.is_err() {
            return Ok(());
        }
        // Reference providers here have no external resources beyond the credential,
        // which is handled separately below; a real provider would release load
        // balancers, nodes, volumes, etc. at this seam.
        Ok(())
    }

    async fn delete_credential(&self, ns: &str, cluster_credential_ref: &Option<ClusterCredentialRef>) -> Result<()> {
        let Some(cluster_credential_ref) = cluster_credential_ref else {
            return Ok(());
        };
        let credentials: Api<ClusterCredential> = Api::namespaced(self.client.clone(), ns);
        match credentials.delete(&cluster_credential_ref.name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(Error::StdError(StdError::KubeError(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{mock_client, test_cluster, test_credential, timeout_after_1s, with_credential_ref, Exchange};
    use crate::providers::ProviderRegistry;
    use serde_json::json;

    /// A `Terminating` cluster with a credential ref and the controller's finalizer
    /// token gets its credential deleted and its finalizer stripped, in that order,
    /// without ever touching a provider the registry no longer has registered.
    #[tokio::test]
    async fn terminating_cluster_sheds_credential_and_finalizer() {
        let (client, server) = mock_client();

        let mut cluster = with_credential_ref(test_cluster("c1", "bare"), "cred-1");
        cluster.metadata.finalizers = Some(vec!["test.finalizer".to_string()]);

        let deleted_credential = test_credential("cred-1", "c1");
        let finalizer_removed_cluster = {
            let mut c = cluster.clone();
            c.metadata.finalizers = Some(vec![]);
            json!(c)
        };

        let mocksrv = server.run(vec![
            Exchange::delete("clustercredentials/cred-1", json!(deleted_credential)),
            Exchange::put("clusters/c1", finalizer_removed_cluster),
        ]);

        let deleter = ClusterDeleter::new(client, ProviderRegistry::new(), "test.finalizer".to_string(), true);
        deleter.delete(cluster).await.unwrap();

        timeout_after_1s(mocksrv).await;
    }
}
