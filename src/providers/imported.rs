//! `providers::imported`: a single-step adoption that trusts an already-running external
//! cluster and simply marks it `Running` once a credential is present, since import
//! implies the infrastructure already exists.

use super::ClusterProvider;
use crate::api::ClusterPhase;
use crate::util::errors::Result;
use crate::wrapper::ClusterWrapper;
use async_trait::async_trait;

pub struct ImportedProvider;

#[async_trait]
impl ClusterProvider for ImportedProvider {
    async fn on_create(&self, wrapper: &mut ClusterWrapper) -> Result<()> {
        let status = wrapper.cluster.status.get_or_insert_with(Default::default);
        status.set_phase(ClusterPhase::Running);
        Ok(())
    }

    async fn on_update(&self, _wrapper: &mut ClusterWrapper) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Cluster, ClusterSpec, ClusterStatus};

    #[tokio::test]
    async fn imported_becomes_running_in_one_step() {
        let mut cluster = Cluster::new("c1", ClusterSpec {
            type_: "imported".to_string(),
            tenant_id: "t1".to_string(),
            cluster_credential_ref: None,
            provider_config: Default::default(),
        });
        cluster.status = Some(ClusterStatus::default());
        let mut w = ClusterWrapper { cluster, credential: None };

        ImportedProvider.on_create(&mut w).await.unwrap();
        assert_eq!(w.cluster.status.as_ref().unwrap().phase(), Some(ClusterPhase::Running));
    }
}
