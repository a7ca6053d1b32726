use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Back-reference to a `ClusterCredential` in the same namespace.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ClusterCredentialRef {
    pub name: String,
}

/// Generates the Kubernetes wrapper struct `Cluster` from `ClusterSpec`/`ClusterStatus`.
///
/// This provides the hook for generating CRD yaml in `crdgen.rs`.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[kube(
    kind = "Cluster",
    group = "lifecycle.example.com",
    version = "v1",
    namespaced
)]
#[kube(status = "ClusterStatus", shortname = "cluster")]
pub struct ClusterSpec {
    /// The provider key dispatched on by the `ProviderRegistry` (e.g. "bare", "imported",
    /// "cloud"). Named `type_` because `type` is a Rust keyword; serialized as `type`.
    #[serde(rename = "type")]
    pub type_: String,

    pub tenant_id: String,

    #[serde(default)]
    pub cluster_credential_ref: Option<ClusterCredentialRef>,

    /// Provider-specific knobs the core schema does not need to understand.
    #[serde(default)]
    pub provider_config: BTreeMap<String, String>,
}

/// The status object of `Cluster`.
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
pub struct ClusterStatus {
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// The cluster's lifecycle phase. Kept as a typed enum internally and converted
/// to/from the status's plain `Option<String>` at the edges, since `kube::CustomResource`
/// derives schema generation off the raw struct and a bare `String` keeps the CRD schema
/// simple for consumers that don't link this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterPhase {
    Initializing,
    Running,
    Failed,
    Terminating,
}

impl ClusterPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ClusterPhase::Initializing => "Initializing",
            ClusterPhase::Running => "Running",
            ClusterPhase::Failed => "Failed",
            ClusterPhase::Terminating => "Terminating",
        }
    }

    pub fn parse(value: &str) -> Option<ClusterPhase> {
        match value {
            "Initializing" => Some(ClusterPhase::Initializing),
            "Running" => Some(ClusterPhase::Running),
            "Failed" => Some(ClusterPhase::Failed),
            "Terminating" => Some(ClusterPhase::Terminating),
            _ => None,
        }
    }
}

impl fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ClusterStatus {
    pub fn phase(&self) -> Option<ClusterPhase> {
        self.phase.as_deref().and_then(ClusterPhase::parse)
    }

    pub fn set_phase(&mut self, phase: ClusterPhase) {
        self.phase = Some(phase.as_str().to_string());
    }
}

pub const IMPORTED_PROVIDER_TYPE: &str = "imported";

/// The `HealthCheck` condition type written by the health monitor.
pub const HEALTH_CHECK_CONDITION: &str = "HealthCheck";
pub const FAILED_HEALTH_CHECK_REASON: &str = "FailedHealthCheck";
