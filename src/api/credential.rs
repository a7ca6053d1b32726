use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Generates the Kubernetes wrapper struct `ClusterCredential` from `ClusterCredentialSpec`.
///
/// One-to-one with a `Cluster` (except `Imported` clusters, which may be created without a
/// pre-existing credential).
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[kube(
    kind = "ClusterCredential",
    group = "lifecycle.example.com",
    version = "v1",
    namespaced
)]
#[kube(status = "ClusterCredentialStatus", shortname = "clustercred")]
pub struct ClusterCredentialSpec {
    pub tenant_id: String,

    /// Back-pointer to the owning `Cluster`'s name.
    pub cluster_name: String,

    /// Opaque authentication material; shape is provider-specific.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
pub struct ClusterCredentialStatus {}
