//! `controller`: the cluster lifecycle controller library. `main.rs` wires this crate's
//! `shell::ControllerShell` up to a `kube::Client` and an `actix-web` diagnostics server;
//! everything else lives here so integration tests can drive the controller in-process.

/// Typed `Cluster`/`ClusterCredential` custom resources.
pub mod api;

/// Finalizer-driven teardown orchestrator for `Terminating` clusters.
pub mod deleter;

/// Per-cluster periodic external health probe.
pub mod health;

/// Watch-synchronized local cache of `Cluster` objects.
pub mod informer;

/// Pluggable cluster-type-specific create/update logic.
pub mod providers;

/// Deduplicating, rate-limited FIFO of reconcile keys.
pub mod queue;

/// The phase dispatcher and credential lifecycle manager.
pub mod reconciler;

/// Wires the informer, queue, and reconciler together; owns startup/shutdown.
pub mod shell;

/// Ambient stack: config, errors, metrics, status-condition helpers, telemetry.
pub mod util;

/// The in-memory aggregate handed to providers.
pub mod wrapper;

pub use util::errors::{Error, Result};

#[cfg(test)]
mod fixtures;
