//! Configuration for the lineage-sync maintenance tool.

use serde::Deserialize;

use lineage_core::JobConfig;
use lineage_graph::GraphConfig;

use crate::error::Result;

/// Top-level configuration.
///
/// Loaded from `lineage.toml` or `LINEAGE__` environment variables
/// (e.g. `LINEAGE__JOBS__PLACEHOLDER_PASSWORD`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub neo4j: GraphConfig,

    #[serde(default)]
    pub jobs: JobConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Daemon scheduling.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between maintenance cycles.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

fn default_interval() -> u64 {
    3600
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
        }
    }
}

impl SyncConfig {
    /// Load from the config file `{file_prefix}` (any supported extension,
    /// optional) overlaid with environment variables, then validate.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("LINEAGE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: SyncConfig = cfg.try_deserialize()?;
        loaded.jobs.validate()?;
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.neo4j.uri, "bolt://localhost:7687");
        assert_eq!(config.jobs.max_in_flight, 50);
        assert_eq!(config.schedule.interval_secs, 3600);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lineage.toml");
        std::fs::write(
            &path,
            r#"
[neo4j]
uri = "bolt://graph.internal:7687"

[jobs]
placeholder_password = "welcome1"
batch_size = 250

[schedule]
interval_secs = 600
"#,
        )
        .unwrap();

        let config = SyncConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.neo4j.uri, "bolt://graph.internal:7687");
        assert_eq!(config.neo4j.user, "neo4j");
        assert_eq!(config.jobs.placeholder_password, "welcome1");
        assert_eq!(config.jobs.batch_size, 250);
        assert_eq!(config.jobs.max_in_flight, 50);
        assert_eq!(config.schedule.interval_secs, 600);
    }

    #[test]
    fn test_load_requires_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lineage.toml");
        std::fs::write(&path, "[jobs]\nbatch_size = 10\n").unwrap();

        assert!(SyncConfig::load(path.to_str().unwrap()).is_err());
    }
}
