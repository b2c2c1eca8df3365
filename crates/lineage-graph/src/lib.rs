//! lineage-graph: the node store boundary for the distributor tree.
//!
//! This crate is the single access point for the `Person` tree. The jobs
//! depend only on the [`NodeStore`] capability; [`GraphClient`] answers it
//! from Neo4j and [`MemoryStore`] from process memory.

pub mod client;
pub mod memory;
pub mod mutations;
pub mod person;
pub mod queries;
pub mod store;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use memory::{MemoryStore, Side, StoreStats};
pub use person::Person;
pub use store::{ChainCandidate, NodeStore, PathNode, UpwardPath, WriteGuard};
