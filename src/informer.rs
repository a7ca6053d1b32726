//! Informer/Lister Cache: a watch-synchronized local cache of `Cluster`
//! objects, built on `kube::runtime::{watcher, reflector}`, exposing `get`/`list` by key
//! and a `has_synced` barrier. Emits Add/Update events onto the `WorkQueue` (no Delete
//! handler: deletion surfaces via `metadata.deletion_timestamp` and the `Terminating`
//! phase).

use crate::api::Cluster;
use crate::queue::{Key, WorkQueue};
use futures::StreamExt;
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// `needs_update`: enqueue iff `spec` differs or `status` differs. Suppresses
/// no-op resyncs while still catching status-only changes, since the reconciler must
/// re-examine `phase` on every status transition.
pub fn needs_update(old: &Cluster, new: &Cluster) -> bool {
    old.spec != new.spec || old.status != new.status
}

#[derive(Clone)]
pub struct ClusterCache {
    store: Store<Cluster>,
    synced: Arc<AtomicBool>,
}

impl ClusterCache {
    pub fn get(&self, namespace: &str, name: &str) -> Option<Arc<Cluster>> {
        self.store.get(&ObjectRef::new(name).within(namespace))
    }

    pub fn list(&self) -> Vec<Arc<Cluster>> {
        self.store.state()
    }

    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    /// A cache backed by a fresh, empty store, with no watch loop behind it. For tests
    /// that drive the reconciler directly rather than through `sync_cluster`'s cache
    /// lookup.
    #[cfg(test)]
    pub fn for_tests() -> ClusterCache {
        let (store, _writer) = reflector::store();
        ClusterCache {
            store,
            synced: Arc::new(AtomicBool::new(true)),
        }
    }
}

/// Starts the watch loop and returns the cache handle immediately; the loop itself runs
/// in a spawned task and stops when `stop` is cancelled.
///
/// Every `Applied` event (Added or Modified) is compared against the previous observation
/// of that object and, if `needs_update` says it matters, enqueued via `queue.add`. A
/// separate resync ticker re-enqueues every known key every `resync` period regardless
/// of `needs_update`, matching the informer's periodic full-resync semantics.
pub fn start(client: Client, resync: Duration, queue: WorkQueue, stop: CancellationToken) -> ClusterCache {
    let api: Api<Cluster> = Api::all(client);
    let (store, writer) = reflector::store();
    let synced = Arc::new(AtomicBool::new(false));
    let cache = ClusterCache {
        store: store.clone(),
        synced: synced.clone(),
    };

    let watch_queue = queue.clone();
    let watch_synced = synced.clone();
    let watch_stop = stop.clone();
    tokio::spawn(async move {
        let prior: Arc<Mutex<HashMap<ObjectRef<Cluster>, Cluster>>> = Arc::new(Mutex::new(HashMap::new()));
        let stream = watcher(api, watcher::Config::default()).default_backoff();
        let mut applied = reflector::reflector(writer, stream).applied_objects().boxed();

        loop {
            tokio::select! {
                _ = watch_stop.cancelled() => break,
                next = applied.next() => {
                    match next {
                        Some(Ok(obj)) => {
                            let key_ref = ObjectRef::from_obj(obj.as_ref());
                            let changed = {
                                let mut prior = prior.lock().await;
                                let changed = prior.get(&key_ref).map(|old| needs_update(old, &obj)).unwrap_or(true);
                                prior.insert(key_ref, (*obj).clone());
                                changed
                            };
                            watch_synced.store(true, Ordering::SeqCst);
                            if changed {
                                if let Some(ns) = obj.namespace() {
                                    watch_queue.add(Key::new(&ns, &obj.name_any())).await;
                                }
                            }
                        }
                        Some(Err(e)) => warn!(error = %e, "cluster watch stream error"),
                        None => break,
                    }
                }
            }
        }
        debug!("cluster watch loop stopped");
    });

    spawn_resync(store, resync, queue, stop);
    cache
}

fn spawn_resync(store: Store<Cluster>, resync: Duration, queue: WorkQueue, stop: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(resync);
        ticker.tick().await; // first tick fires immediately; skip it, the watch already primed the queue
        loop {
            tokio::select! {
                _ = stop.cancelled() => return,
                _ = ticker.tick() => {
                    for obj in store.state() {
                        if let Some(ns) = obj.namespace() {
                            queue.add(Key::new(&ns, &obj.name_any())).await;
                        }
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ClusterSpec, ClusterStatus};

    fn cluster(phase: Option<&str>) -> Cluster {
        let mut c = Cluster::new(
            "c1",
            ClusterSpec {
                type_: "bare".to_string(),
                tenant_id: "t1".to_string(),
                cluster_credential_ref: None,
                provider_config: Default::default(),
            },
        );
        c.status = Some(ClusterStatus {
            phase: phase.map(|p| p.to_string()),
            ..Default::default()
        });
        c
    }

    #[test]
    fn needs_update_is_false_for_an_identical_object() {
        let c = cluster(Some("Running"));
        assert!(!needs_update(&c, &c));
    }

    #[test]
    fn needs_update_is_true_when_status_differs() {
        let old = cluster(Some("Initializing"));
        let new = cluster(Some("Running"));
        assert!(needs_update(&old, &new));
    }

    #[test]
    fn needs_update_is_true_when_spec_differs() {
        let old = cluster(Some("Running"));
        let mut new = cluster(Some("Running"));
        new.spec.tenant_id = "other-tenant".to_string();
        assert!(needs_update(&old, &new));
    }
}
