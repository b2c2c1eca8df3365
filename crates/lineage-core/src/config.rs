//! Job configuration shared by the maintenance jobs.
//!
//! Loaded from the `[jobs]` section of `lineage.toml` or
//! `LINEAGE__JOBS__` environment variables. The placeholder password has
//! no default and must always be supplied.

use serde::Deserialize;

use crate::error::CoreError;

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// The well-known password assigned to freshly created nodes.
    #[serde(default)]
    pub placeholder_password: String,

    /// Number of empty nodes resolved per propagation query.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Upper bound on traversal depth. A safety limit, not a business rule:
    /// it must exceed the deepest possible hierarchy.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Maximum concurrent re-keying tasks.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Maximum re-keying passes per run.
    #[serde(default = "default_max_passes")]
    pub max_passes: u32,

    /// Directory for run reports. Reports are not persisted when unset.
    #[serde(default)]
    pub journal_dir: Option<String>,
}

impl JobConfig {
    /// Build a configuration with defaults around the given placeholder.
    pub fn new(placeholder_password: impl Into<String>) -> Self {
        Self {
            placeholder_password: placeholder_password.into(),
            ..Default::default()
        }
    }

    /// Reject configurations the jobs cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.placeholder_password.is_empty() {
            return Err(CoreError::Config(
                "jobs.placeholder_password must be set".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(CoreError::Config("jobs.batch_size must be > 0".to_string()));
        }
        if self.max_depth == 0 {
            return Err(CoreError::Config("jobs.max_depth must be > 0".to_string()));
        }
        if self.max_in_flight == 0 {
            return Err(CoreError::Config(
                "jobs.max_in_flight must be > 0".to_string(),
            ));
        }
        if self.max_passes == 0 {
            return Err(CoreError::Config("jobs.max_passes must be > 0".to_string()));
        }
        Ok(())
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_max_depth() -> u32 {
    10_000
}

fn default_max_in_flight() -> usize {
    50
}

fn default_max_passes() -> u32 {
    1
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            placeholder_password: String::new(),
            batch_size: default_batch_size(),
            max_depth: default_max_depth(),
            max_in_flight: default_max_in_flight(),
            max_passes: default_max_passes(),
            journal_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = JobConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_in_flight, 50);
        assert_eq!(config.max_depth, 10_000);
        assert!(config.journal_dir.is_none());
    }

    #[test]
    fn test_placeholder_required() {
        assert!(JobConfig::default().validate().is_err());
        assert!(JobConfig::new("changeme").validate().is_ok());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let config = JobConfig {
            max_in_flight: 0,
            ..JobConfig::new("changeme")
        };
        assert_eq!(
            config.validate(),
            Err(CoreError::Config("jobs.max_in_flight must be > 0".to_string()))
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let config: JobConfig =
            serde_json::from_str(r#"{"placeholder_password": "pw", "batch_size": 25}"#).unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.max_passes, 1);
    }
}
