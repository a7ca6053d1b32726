pub mod cluster;
pub mod credential;

pub use cluster::{
    Cluster, ClusterCredentialRef, ClusterPhase, ClusterSpec, ClusterStatus, FAILED_HEALTH_CHECK_REASON,
    HEALTH_CHECK_CONDITION, IMPORTED_PROVIDER_TYPE,
};
pub use credential::{ClusterCredential, ClusterCredentialSpec, ClusterCredentialStatus};
