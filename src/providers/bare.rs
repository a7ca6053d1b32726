//! `providers::bare`: a bare-metal provider that drives a multi-step bring-up (allocate
//! → install → verify) across repeated `on_create` calls, advancing an internal
//! step counter kept in `status.conditions` under a private `Provisioning` condition
//! type so the step survives across reconciles without a dedicated status field.

use super::ClusterProvider;
use crate::api::ClusterPhase;
use crate::util::errors::Result;
use crate::util::status::{find_status_condition, set_status_condition};
use crate::wrapper::ClusterWrapper;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

const PROVISIONING_CONDITION: &str = "Provisioning";
const STEPS: &[&str] = &["Allocating", "Installing", "Verifying"];

#[derive(Default)]
pub struct BareProvider;

#[async_trait]
impl ClusterProvider for BareProvider {
    async fn on_create(&self, wrapper: &mut ClusterWrapper) -> Result<()> {
        let step = find_status_condition(&wrapper.cluster.status.as_ref().unwrap().conditions, PROVISIONING_CONDITION)
            .map(|c| c.reason.as_str())
            .and_then(|reason| STEPS.iter().position(|s| *s == reason))
            .unwrap_or(0);

        let status = wrapper.cluster.status.as_mut().unwrap();
        let next = step + 1;
        if next >= STEPS.len() {
            status.set_phase(ClusterPhase::Running);
            let (conditions, _) = set_status_condition(
                &status.conditions,
                Condition {
                    type_: PROVISIONING_CONDITION.to_string(),
                    status: "True".to_string(),
                    reason: "Complete".to_string(),
                    message: "bring-up finished".to_string(),
                    observed_generation: None,
                    last_transition_time: Time(chrono::Utc::now()),
                },
            );
            status.conditions = conditions;
        } else {
            let (conditions, _) = set_status_condition(
                &status.conditions,
                Condition {
                    type_: PROVISIONING_CONDITION.to_string(),
                    status: "False".to_string(),
                    reason: STEPS[next].to_string(),
                    message: format!("step {next} of {}", STEPS.len()),
                    observed_generation: None,
                    last_transition_time: Time(chrono::Utc::now()),
                },
            );
            status.conditions = conditions;
        }
        Ok(())
    }

    async fn on_update(&self, _wrapper: &mut ClusterWrapper) -> Result<()> {
        // Steady state: a bare cluster has nothing to drift-correct beyond what the
        // health monitor already watches.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Cluster, ClusterSpec, ClusterStatus};

    fn wrapper() -> ClusterWrapper {
        let mut cluster = Cluster::new("c1", ClusterSpec {
            type_: "bare".to_string(),
            tenant_id: "t1".to_string(),
            cluster_credential_ref: None,
            provider_config: Default::default(),
        });
        cluster.status = Some(ClusterStatus::default());
        ClusterWrapper { cluster, credential: None }
    }

    #[tokio::test]
    async fn advances_through_three_steps_then_running() {
        let provider = BareProvider::default();
        let mut w = wrapper();

        provider.on_create(&mut w).await.unwrap();
        assert_eq!(w.cluster.status.as_ref().unwrap().phase(), None);

        provider.on_create(&mut w).await.unwrap();
        assert_eq!(w.cluster.status.as_ref().unwrap().phase(), None);

        provider.on_create(&mut w).await.unwrap();
        assert_eq!(w.cluster.status.as_ref().unwrap().phase(), Some(ClusterPhase::Running));
    }
}
