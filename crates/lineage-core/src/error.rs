use thiserror::Error;

/// Errors raised by shared Lineage types and configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),
}
