//! Engine tunables, threaded explicitly through the components that
//! need them, never read from ambient state at call sites.

use std::time::Duration;

use crate::analyze::Dialect;
use crate::retry::RetryPolicy;

/// Knobs shared by the dispatcher, workers, aggregator, and sweeper.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Task execution lock TTL. Must exceed the worst-case analysis
    /// duration; staleness after a crash is bounded by it.
    pub lock_ttl: Duration,

    /// A non-terminal task untouched for this long is eligible for the
    /// forced-failure sweep.
    pub stall_after: Duration,

    /// How often the sweep runs.
    pub sweep_interval: Duration,

    /// Backoff for transient storage failures inside the worker.
    pub retry: RetryPolicy,

    /// Dialect applied when a submission does not name one.
    pub default_dialect: Dialect,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(300),
            stall_after: Duration::from_secs(900),
            sweep_interval: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            default_dialect: Dialect::Ansi,
        }
    }
}

impl EngineConfig {
    /// Load from environment variables, falling back to defaults for
    /// anything unset or unparseable.
    ///
    /// | Env Var              | Default |
    /// |----------------------|---------|
    /// | `LOCK_TTL_SECS`      | `300`   |
    /// | `STALL_AFTER_SECS`   | `900`   |
    /// | `SWEEP_INTERVAL_SECS`| `60`    |
    /// | `RETRY_MAX_ATTEMPTS` | `4`     |
    /// | `RETRY_BASE_SECS`    | `60`    |
    /// | `DEFAULT_DIALECT`    | `ansi`  |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            lock_ttl: env_secs("LOCK_TTL_SECS").unwrap_or(defaults.lock_ttl),
            stall_after: env_secs("STALL_AFTER_SECS").unwrap_or(defaults.stall_after),
            sweep_interval: env_secs("SWEEP_INTERVAL_SECS").unwrap_or(defaults.sweep_interval),
            retry: RetryPolicy {
                max_attempts: env_parse("RETRY_MAX_ATTEMPTS")
                    .unwrap_or(defaults.retry.max_attempts),
                base_delay: env_secs("RETRY_BASE_SECS").unwrap_or(defaults.retry.base_delay),
                max_delay: defaults.retry.max_delay,
            },
            default_dialect: std::env::var("DEFAULT_DIALECT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_dialect),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_secs)
}
