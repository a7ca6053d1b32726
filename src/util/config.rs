use tokio::time::Duration;

pub const DEFAULT_FINALIZER_TOKEN: &str = "cluster.lifecycle.example.com/finalizer";

/// Runtime configuration for the controller shell.
///
/// Populated with defaults matching the source, overridable via environment variables so
/// the controller can be tuned without a code change or a config file dependency.
#[derive(Clone, Debug)]
pub struct Config {
    pub workers: usize,
    pub resync_period: Duration,
    pub finalizer_token: String,
    pub health_check_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            workers: 5,
            resync_period: Duration::from_secs(10 * 60),
            finalizer_token: DEFAULT_FINALIZER_TOKEN.to_string(),
            health_check_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl Config {
    /// Builds a `Config`, overriding individual defaults from the environment when the
    /// corresponding variable is present and parses cleanly.
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Some(workers) = env_usize("WORKERS") {
            config.workers = workers;
        }
        if let Some(secs) = env_u64("RESYNC_PERIOD_SECS") {
            config.resync_period = Duration::from_secs(secs);
        }
        if let Ok(token) = std::env::var("FINALIZER_TOKEN") {
            config.finalizer_token = token;
        }
        if let Some(secs) = env_u64("HEALTH_CHECK_INTERVAL_SECS") {
            config.health_check_interval = Duration::from_secs(secs);
        }

        config
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
