//! Error types for the lineage-sync crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Graph error: {0}")]
    Graph(#[from] lineage_graph::GraphError),

    #[error("Config error: {0}")]
    Config(#[from] lineage_core::CoreError),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Journal error: {0}")]
    Journal(String),

    #[error("Task coordination error: {0}")]
    Task(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
