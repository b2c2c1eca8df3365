//! lineage-core: Shared types, configuration, and error handling for the Lineage tree engine.
//!
//! This crate provides the foundational types used across all Lineage components:
//! - Distributor identity and person attributes stored on `Person` nodes
//! - Credential classification (empty, placeholder, full)
//! - Job configuration shared by the maintenance jobs
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::JobConfig;
pub use error::CoreError;
pub use types::{
    CredentialCensus, CredentialState, Credentials, DistributorId, PersonAttributes, PersonRecord,
    Relations,
};
