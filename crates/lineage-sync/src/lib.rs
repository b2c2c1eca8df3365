//! lineage-sync: Credential maintenance jobs for the Lineage distributor tree.
//!
//! Two bulk passes keep username/password data consistent as the tree grows:
//! credential propagation fills empty nodes from their nearest full
//! ancestor, and chain re-keying rewrites placeholder chains to the
//! credentials of the full node above them. Every run can be recorded in a
//! tamper-evident journal.

pub mod config;
pub mod error;
pub mod journal;
pub mod propagate;
pub mod rekey;
pub mod scheduler;

pub use error::SyncError;
pub use propagate::{PropagationJob, PropagationReport};
pub use rekey::{RekeyJob, RekeyReport};
