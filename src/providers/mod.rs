//! Provider registry: a process-wide, keyed directory of `ClusterProvider`
//! implementations with `setup`/`teardown` lifecycle hooks called once at controller
//! start/stop.
//!
//! Deliberately NOT a crate-init side effect (no `ctor`/`inventory` macros): the
//! registry is constructed explicitly so tests can substitute fakes per run.

pub mod bare;
pub mod cloud;
pub mod imported;

use crate::util::errors::{Error, Result, StdError};
use crate::wrapper::ClusterWrapper;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub use bare::BareProvider;
pub use cloud::{CloudBackend, CloudProvider};
pub use imported::ImportedProvider;

/// Cluster-type-specific create/update logic. Providers mutate `wrapper.cluster`
/// and `wrapper.credential` in place; in particular they advance `status.phase` from
/// `Initializing` to `Running` or `Failed` when provisioning terminates.
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    async fn on_create(&self, wrapper: &mut ClusterWrapper) -> Result<()>;
    async fn on_update(&self, wrapper: &mut ClusterWrapper) -> Result<()>;
}

/// A process-wide map keyed by `spec.type_`.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Arc<RwLock<HashMap<String, Arc<dyn ClusterProvider>>>>,
}

impl ProviderRegistry {
    pub fn new() -> ProviderRegistry {
        ProviderRegistry::default()
    }

    /// The three reference providers, registered under their well-known type keys.
    pub fn with_defaults() -> ProviderRegistry {
        let mut map: HashMap<String, Arc<dyn ClusterProvider>> = HashMap::new();
        map.insert("bare".to_string(), Arc::new(BareProvider::default()));
        map.insert(
            crate::api::IMPORTED_PROVIDER_TYPE.to_string(),
            Arc::new(ImportedProvider),
        );
        map.insert(
            "cloud".to_string(),
            Arc::new(CloudProvider::new(Arc::new(cloud::InMemoryCloudBackend::default()))),
        );
        ProviderRegistry {
            providers: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn register(&self, type_: &str, provider: Arc<dyn ClusterProvider>) {
        self.providers.write().await.insert(type_.to_string(), provider);
    }

    pub async fn get(&self, type_: &str) -> Result<Arc<dyn ClusterProvider>> {
        self.providers
            .read()
            .await
            .get(type_)
            .cloned()
            .ok_or_else(|| Error::StdError(StdError::ProviderNotFound(type_.to_string())))
    }

    /// Called once at controller start; fatal on error.
    pub async fn setup(&self) -> Result<()> {
        Ok(())
    }

    /// Called once at controller stop.
    pub async fn teardown(&self) {}
}
