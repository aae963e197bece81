//! Checker configuration
//!
//! Configuration loaded from environment variables and command line,
//! following the same `from_env` shape as `RebalancerConfig`.

use std::time::Duration;
use thiserror::Error;

use crate::health::HealthMode;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Repair checker configuration.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// PostgreSQL database URL.
    pub database_url: String,

    /// Interval between scan iterations, in seconds.
    pub iteration_interval_secs: u64,

    /// Number of Partial tasks forked per iteration; defaults to
    /// `max(2, num_cpus * 2)` when unset.
    pub num_partials: Option<usize>,

    /// Segments pulled per batch by each Partial.
    pub segment_batch_size: usize,

    /// Injured-segment insert buffer batch size.
    pub insert_batch_size: usize,

    /// Reliability cache staleness bound, in seconds.
    pub cache_staleness_secs: u64,

    /// Online window used to classify a node as online, in seconds.
    pub online_window_secs: u64,

    /// ISO 3166-1 alpha-2 country codes excluded from placement.
    pub excluded_countries: Vec<String>,

    /// `k-value` comma-separated repair-threshold overrides.
    pub repair_threshold_overrides: String,

    /// `k-value` comma-separated repair-target overrides.
    pub repair_target_overrides: String,

    /// Health score computation mode.
    pub health_mode: HealthMode,

    /// Estimated per-iteration node failure probability, used by the
    /// health calculator and time-until-irreparable estimate.
    pub per_iteration_failure_prob: f64,

    /// Maximum distinct (redundancy, placement) stats buckets kept per
    /// iteration before folding novel keys into overflow.
    pub max_stats_buckets: usize,

    /// Whether to run declumping (last-net diversity) checks. When
    /// disabled, `Classification::clumped` stays empty for every piece.
    pub do_declumping: bool,

    /// Whether to run placement-compliance checks. When disabled,
    /// `Classification::out_of_placement` stays empty for every piece.
    pub do_placement_check: bool,

    /// Dry run mode: classify and log but never enqueue repairs.
    pub dry_run: bool,

    /// Run exactly one iteration and exit, instead of looping.
    pub one_shot: bool,

    /// Metrics port for the health/metrics HTTP endpoint.
    pub metrics_port: u16,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            iteration_interval_secs: 30 * 60,
            num_partials: None,
            segment_batch_size: 500,
            insert_batch_size: 100,
            cache_staleness_secs: 3 * 60,
            online_window_secs: 60 * 60,
            excluded_countries: Vec::new(),
            repair_threshold_overrides: String::new(),
            repair_target_overrides: String::new(),
            health_mode: HealthMode::Normalized,
            per_iteration_failure_prob: 0.01,
            max_stats_buckets: 256,
            do_declumping: true,
            do_placement_check: true,
            dry_run: false,
            one_shot: false,
            metrics_port: 9091,
        }
    }
}

impl CheckerConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let defaults = Self::default();

        let iteration_interval_secs = std::env::var("CHECKER_ITERATION_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.iteration_interval_secs);

        let num_partials = std::env::var("CHECKER_NUM_PARTIALS")
            .ok()
            .and_then(|v| v.parse().ok());

        let segment_batch_size = std::env::var("CHECKER_SEGMENT_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.segment_batch_size);

        let insert_batch_size = std::env::var("CHECKER_INSERT_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.insert_batch_size);

        let cache_staleness_secs = std::env::var("CHECKER_CACHE_STALENESS_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.cache_staleness_secs);

        let online_window_secs = std::env::var("CHECKER_ONLINE_WINDOW_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.online_window_secs);

        let excluded_countries = std::env::var("CHECKER_EXCLUDED_COUNTRIES")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let repair_threshold_overrides =
            std::env::var("CHECKER_REPAIR_THRESHOLD_OVERRIDES").unwrap_or_default();

        let repair_target_overrides =
            std::env::var("CHECKER_REPAIR_TARGET_OVERRIDES").unwrap_or_default();

        let health_mode = match std::env::var("CHECKER_HEALTH_MODE").ok().as_deref() {
            Some("probability") => HealthMode::Probability,
            Some("normalized") | None => HealthMode::Normalized,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "CHECKER_HEALTH_MODE".to_string(),
                    other.to_string(),
                ))
            }
        };

        let per_iteration_failure_prob = std::env::var("CHECKER_FAILURE_PROB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.per_iteration_failure_prob);

        let max_stats_buckets = std::env::var("CHECKER_MAX_STATS_BUCKETS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_stats_buckets);

        let do_declumping = std::env::var("CHECKER_DO_DECLUMPING")
            .ok()
            .map(|v| v == "true" || v == "1")
            .unwrap_or(defaults.do_declumping);

        let do_placement_check = std::env::var("CHECKER_DO_PLACEMENT_CHECK")
            .ok()
            .map(|v| v == "true" || v == "1")
            .unwrap_or(defaults.do_placement_check);

        let dry_run = std::env::var("CHECKER_DRY_RUN")
            .ok()
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let one_shot = std::env::var("CHECKER_ONE_SHOT")
            .ok()
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let metrics_port = std::env::var("CHECKER_METRICS_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.metrics_port);

        Ok(Self {
            database_url,
            iteration_interval_secs,
            num_partials,
            segment_batch_size,
            insert_batch_size,
            cache_staleness_secs,
            online_window_secs,
            excluded_countries,
            repair_threshold_overrides,
            repair_target_overrides,
            health_mode,
            per_iteration_failure_prob,
            max_stats_buckets,
            do_declumping,
            do_placement_check,
            dry_run,
            one_shot,
            metrics_port,
        })
    }

    pub fn iteration_interval(&self) -> Duration {
        Duration::from_secs(self.iteration_interval_secs)
    }

    pub fn cache_staleness(&self) -> Duration {
        Duration::from_secs(self.cache_staleness_secs)
    }

    pub fn online_window(&self) -> Duration {
        Duration::from_secs(self.online_window_secs)
    }

    pub fn excluded_country_codes(&self) -> Vec<[u8; 2]> {
        self.excluded_countries
            .iter()
            .filter_map(|s| {
                let bytes = s.as_bytes();
                if bytes.len() == 2 {
                    Some([bytes[0], bytes[1]])
                } else {
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CheckerConfig::default();
        assert_eq!(config.iteration_interval_secs, 30 * 60);
        assert_eq!(config.segment_batch_size, 500);
        assert!(!config.dry_run);
        assert!(config.do_declumping);
        assert!(config.do_placement_check);
        assert_eq!(config.health_mode, HealthMode::Normalized);
    }

    #[test]
    fn test_iteration_interval_duration() {
        let config = CheckerConfig {
            iteration_interval_secs: 120,
            ..Default::default()
        };
        assert_eq!(config.iteration_interval(), Duration::from_secs(120));
    }

    #[test]
    fn test_excluded_country_codes_filters_malformed() {
        let config = CheckerConfig {
            excluded_countries: vec!["US".to_string(), "bad".to_string(), "DE".to_string()],
            ..Default::default()
        };
        let codes = config.excluded_country_codes();
        assert_eq!(codes, vec![*b"US", *b"DE"]);
    }
}
