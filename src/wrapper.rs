//! `ClusterWrapper`: the in-memory aggregate handed to providers. Providers mutate
//! `.cluster` and `.credential` in place; `persist` is the only place either object is
//! written back to the API store, via full-object `replace` (never a patch — that is
//! reserved for the health monitor, see `crate::health`).

use crate::api::{Cluster, ClusterCredential};
use crate::util::errors::{Error, Result, StdError};
use kube::api::{Api, PostParams};
use kube::{Client, ResourceExt};

pub const FIELD_MANAGER: &str = "cluster-controller";

/// `(Cluster, Option<ClusterCredential>)`, built on demand by `reconciler::build_wrapper`.
///
/// The credential is optional because an `Imported` cluster may legitimately have none
/// yet.
pub struct ClusterWrapper {
    pub cluster: Cluster,
    pub credential: Option<ClusterCredential>,
}

impl ClusterWrapper {
    pub fn namespace(&self) -> String {
        self.cluster.namespace().unwrap_or_default()
    }

    /// Persists both halves of the wrapper unconditionally: the cluster replace is
    /// always attempted even if the credential replace failed, so a provider's phase
    /// advancement is never silently dropped on a transient credential-write error. The
    /// returned error is whichever of the two replace calls failed last (the cluster
    /// outcome takes precedence over the credential outcome).
    pub async fn persist(&mut self, client: &Client) -> Result<()> {
        let ns = self.namespace();
        let mut last_err = None;

        if let Some(credential) = &self.credential {
            let credentials: Api<ClusterCredential> = Api::namespaced(client.clone(), &ns);
            match credentials
                .replace(&credential.name_any(), &PostParams::default(), credential)
                .await
            {
                Ok(updated) => self.credential = Some(updated),
                Err(e) => last_err = Some(Error::StdError(StdError::KubeError(e))),
            }
        }

        let clusters: Api<Cluster> = Api::namespaced(client.clone(), &ns);
        match clusters
            .replace(&self.cluster.name_any(), &PostParams::default(), &self.cluster)
            .await
        {
            Ok(updated) => {
                self.cluster = updated;
                last_err = None;
            }
            Err(e) => last_err = Some(Error::StdError(StdError::KubeError(e))),
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
