use std::fmt;
use thiserror::Error;
use tokio::time::Duration;

/// Errors that originate from a single, well-understood failure mode.
///
/// `metric_label` is used to bucket failures in the `cluster_controller_reconciliation_errors_total`
/// counter without leaking unbounded cardinality (raw messages are never used as a label value).
#[derive(Error, Debug)]
pub enum StdError {
    #[error("JsonSerializationError: {0}")]
    JsonSerializationError(#[source] serde_json::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("MetadataMissing: {0}")]
    MetadataMissing(String),

    #[error("InvalidKey: {0}")]
    InvalidKey(String),

    #[error("ProviderNotFound: {0}")]
    ProviderNotFound(String),

    #[error("CredentialMissing: {0}")]
    CredentialMissing(String),

    #[error("HealthCheckFailed: {0}")]
    HealthCheckFailed(String),

    #[error("InformerSyncTimedOut: {0}")]
    InformerSyncTimedOut(String),
}

impl StdError {
    pub fn metric_label(&self) -> String {
        format!("{self:?}")
            .split('(')
            .next()
            .unwrap_or("unknown")
            .to_lowercase()
    }
}

/// An error paired with the delay the work queue should wait before retrying it.
///
/// This is distinct from the work queue's own exponential backoff: a rate-limited
/// requeue is for errors whose retry interval is known up front (e.g. "come back once a
/// dependency probably exists"), while the queue's backoff is for errors whose retry
/// interval should grow because failures are repeating.
#[derive(Error, Debug)]
pub struct ErrorWithRequeue {
    pub duration: Duration,
    pub error: StdError,
}

impl ErrorWithRequeue {
    pub fn new(error: StdError, duration: Duration) -> ErrorWithRequeue {
        ErrorWithRequeue { error, duration }
    }

    pub fn metric_label(&self) -> String {
        self.error.metric_label()
    }
}

impl fmt::Display for ErrorWithRequeue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Standard Error: {0}")]
    StdError(#[source] StdError),

    #[error("Error With Requeue: {0}")]
    ErrorWithRequeue(#[source] ErrorWithRequeue),
}

impl Error {
    pub fn metric_label(&self) -> String {
        match self {
            Error::StdError(e) => e.metric_label(),
            Error::ErrorWithRequeue(e) => e.metric_label(),
        }
    }

    /// The duration the work queue should wait before retrying, if this error carries one.
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            Error::ErrorWithRequeue(e) => Some(e.duration),
            Error::StdError(_) => None,
        }
    }
}

impl From<kube::Error> for Error {
    fn from(e: kube::Error) -> Self {
        Error::StdError(StdError::KubeError(e))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
