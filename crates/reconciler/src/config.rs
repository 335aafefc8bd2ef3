//! Configuration for the reconciler and its loop.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Number of bundles reconciled concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Deadline for a single reconciliation.
    #[serde(with = "duration_millis", default = "default_reconcile_timeout")]
    pub reconcile_timeout: Duration,

    /// Interval at which every bundle is redelivered.
    #[serde(with = "duration_millis", default = "default_resync_period")]
    pub resync_period: Duration,

    /// Clusters converged concurrently for one bundle.
    #[serde(default = "default_max_concurrent_targets")]
    pub max_concurrent_targets: usize,

    /// Whether to write conditions onto bundle status.
    #[serde(default = "default_report_status")]
    pub report_status: bool,

    /// First redelivery delay after a failure.
    #[serde(with = "duration_millis", default = "default_requeue_base_delay")]
    pub requeue_base_delay: Duration,

    /// Upper bound on the redelivery delay.
    #[serde(with = "duration_millis", default = "default_requeue_max_delay")]
    pub requeue_max_delay: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            reconcile_timeout: default_reconcile_timeout(),
            resync_period: default_resync_period(),
            max_concurrent_targets: default_max_concurrent_targets(),
            report_status: default_report_status(),
            requeue_base_delay: default_requeue_base_delay(),
            requeue_max_delay: default_requeue_max_delay(),
        }
    }
}

impl ReconcilerConfig {
    /// Set the number of workers.
    #[must_use]
    pub const fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the reconcile deadline.
    #[must_use]
    pub const fn reconcile_timeout(mut self, timeout: Duration) -> Self {
        self.reconcile_timeout = timeout;
        self
    }

    /// Set the resync period.
    #[must_use]
    pub const fn resync_period(mut self, period: Duration) -> Self {
        self.resync_period = period;
        self
    }

    /// Set the per-bundle cluster concurrency.
    #[must_use]
    pub const fn max_concurrent_targets(mut self, max: usize) -> Self {
        self.max_concurrent_targets = max;
        self
    }

    /// Enable or disable status reporting.
    #[must_use]
    pub const fn report_status(mut self, enabled: bool) -> Self {
        self.report_status = enabled;
        self
    }

    /// Set the redelivery backoff bounds.
    #[must_use]
    pub const fn requeue_delays(mut self, base: Duration, max: Duration) -> Self {
        self.requeue_base_delay = base;
        self.requeue_max_delay = max;
        self
    }

    /// Load configuration from a file: JSON by extension, TOML otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the file cannot be read or parsed and
    /// [`Error::InvalidConfig`] when the values fail validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| kealm_core::Error::file_read_failed(path, e.to_string()))?;

        let config: Self = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content).map_err(kealm_core::Error::from)?
        } else {
            toml::from_str(&content).map_err(kealm_core::Error::from)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `KEALM_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when a variable does not parse.
    pub fn from_env() -> Result<Self> {
        Self::default().apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `KEALM_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when a value does not parse or the
    /// result fails validation.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var::<usize, _>(&lookup, "KEALM_WORKERS")? {
            self.workers = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "KEALM_RECONCILE_TIMEOUT_MS")? {
            self.reconcile_timeout = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "KEALM_RESYNC_PERIOD_MS")? {
            self.resync_period = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "KEALM_MAX_CONCURRENT_TARGETS")? {
            self.max_concurrent_targets = v;
        }
        if let Some(v) = parse_var::<bool, _>(&lookup, "KEALM_REPORT_STATUS")? {
            self.report_status = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "KEALM_REQUEUE_BASE_DELAY_MS")? {
            self.requeue_base_delay = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "KEALM_REQUEUE_MAX_DELAY_MS")? {
            self.requeue_max_delay = Duration::from_millis(v);
        }
        self.validate()?;
        Ok(self)
    }

    /// Check the values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::invalid_config("workers must be at least 1"));
        }
        if self.max_concurrent_targets == 0 {
            return Err(Error::invalid_config(
                "max_concurrent_targets must be at least 1",
            ));
        }
        if self.reconcile_timeout.is_zero() {
            return Err(Error::invalid_config("reconcile_timeout must be positive"));
        }
        if self.resync_period.is_zero() {
            return Err(Error::invalid_config("resync_period must be positive"));
        }
        if self.requeue_base_delay > self.requeue_max_delay {
            return Err(Error::invalid_config(
                "requeue_base_delay must not exceed requeue_max_delay",
            ));
        }
        Ok(())
    }

    /// Redelivery delay after `failures` consecutive failures (1-based).
    ///
    /// Doubles from the base delay and is capped at the max delay.
    pub fn requeue_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.requeue_base_delay
            .saturating_mul(factor)
            .min(self.requeue_max_delay)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::invalid_config(format!("{key}={raw}: {e}")))
        })
        .transpose()
}

const fn default_workers() -> usize {
    4
}

const fn default_reconcile_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_resync_period() -> Duration {
    Duration::from_secs(300)
}

const fn default_max_concurrent_targets() -> usize {
    8
}

const fn default_report_status() -> bool {
    true
}

const fn default_requeue_base_delay() -> Duration {
    Duration::from_millis(100)
}

const fn default_requeue_max_delay() -> Duration {
    Duration::from_secs(60)
}

/// Serialization helper for Duration as milliseconds.
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(ReconcilerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_overrides_apply() {
        let config = ReconcilerConfig::default()
            .apply_overrides(lookup(&[
                ("KEALM_WORKERS", "2"),
                ("KEALM_RECONCILE_TIMEOUT_MS", "1500"),
                ("KEALM_REPORT_STATUS", "false"),
            ]))
            .unwrap();

        assert_eq!(config.workers, 2);
        assert_eq!(config.reconcile_timeout, Duration::from_millis(1500));
        assert!(!config.report_status);
        assert_eq!(config.resync_period, default_resync_period());
    }

    #[test]
    fn test_bad_override_rejected() {
        let err = ReconcilerConfig::default()
            .apply_overrides(lookup(&[("KEALM_WORKERS", "many")]))
            .err();
        assert!(matches!(err, Some(Error::InvalidConfig { .. })));

        let err = ReconcilerConfig::default()
            .apply_overrides(lookup(&[("KEALM_WORKERS", "0")]))
            .err();
        assert!(matches!(err, Some(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_requeue_delay_doubles_and_caps() {
        let config = ReconcilerConfig::default()
            .requeue_delays(Duration::from_millis(100), Duration::from_secs(1));

        assert_eq!(config.requeue_delay(1), Duration::from_millis(100));
        assert_eq!(config.requeue_delay(2), Duration::from_millis(200));
        assert_eq!(config.requeue_delay(4), Duration::from_millis(800));
        assert_eq!(config.requeue_delay(5), Duration::from_secs(1));
        assert_eq!(config.requeue_delay(64), Duration::from_secs(1));
    }

    #[test]
    fn test_from_toml_file_fills_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "workers = 8\nresync_period = 60000").unwrap();

        let config = ReconcilerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.resync_period, Duration::from_secs(60));
        assert_eq!(config.max_concurrent_targets, default_max_concurrent_targets());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"workers": 3, "report_status": false}}"#).unwrap();

        let config = ReconcilerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.workers, 3);
        assert!(!config.report_status);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = ReconcilerConfig::from_file(Path::new("/nonexistent/kealm.toml")).err();
        assert!(matches!(err, Some(Error::Config(_))));
    }
}
