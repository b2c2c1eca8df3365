//! The node store capability consumed by the maintenance jobs.
//!
//! Business logic only ever talks to a [`NodeStore`]. The traversal
//! primitives are deliberately narrow so the Neo4j implementation and the
//! in-memory one in [`crate::memory`] answer them identically.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use lineage_core::{
    CredentialCensus, CredentialState, Credentials, DistributorId, PersonRecord, Relations,
};

use crate::client::{GraphClient, GraphError};

/// Result of an upward `PARENT` walk that reached a terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpwardPath {
    /// The node the walk started from.
    pub origin: DistributorId,
    /// Every node walked through, origin first, terminator excluded.
    pub walked: Vec<DistributorId>,
    /// The first terminator found above the origin.
    pub terminator: DistributorId,
    pub credentials: Credentials,
}

/// A re-keying candidate: `start` is an ancestor of `end`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainCandidate {
    pub start: DistributorId,
    pub end: DistributorId,
}

/// One node of a freshly recomputed path, with its current credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathNode {
    pub id: DistributorId,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl PathNode {
    pub fn holds_placeholder(&self, placeholder: &str) -> bool {
        self.password.as_deref() == Some(placeholder)
    }

    pub fn state(&self, placeholder: &str) -> CredentialState {
        CredentialState::classify(
            self.username.as_deref(),
            self.password.as_deref(),
            placeholder,
        )
    }

    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Some(Credentials::new(u.clone(), p.clone())),
            _ => None,
        }
    }
}

/// Per-node precondition the store evaluates atomically at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteGuard<'a> {
    /// Write only nodes that are not *full*.
    NotFull { placeholder: &'a str },
    /// Write only nodes whose password is still the placeholder.
    Placeholder { placeholder: &'a str },
}

impl WriteGuard<'_> {
    pub fn permits(&self, username: Option<&str>, password: Option<&str>) -> bool {
        match *self {
            WriteGuard::NotFull { placeholder } => {
                CredentialState::classify(username, password, placeholder) != CredentialState::Full
            }
            WriteGuard::Placeholder { placeholder } => password == Some(placeholder),
        }
    }
}

/// Query/mutation capability over the `Person` tree.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Own attributes of one node.
    async fn get_person(&self, id: &DistributorId) -> Result<Option<PersonRecord>, GraphError>;

    /// Parent, left and right child of one node, resolved together.
    async fn relations(&self, id: &DistributorId) -> Result<Relations, GraphError>;

    /// Ids of all *empty* nodes.
    async fn empty_ids(&self) -> Result<Vec<DistributorId>, GraphError>;

    /// Ids of all *full* nodes.
    async fn full_ids(&self, placeholder: &str) -> Result<HashSet<DistributorId>, GraphError>;

    /// Walk `PARENT` edges up from each origin, stopping at the first node in
    /// `terminators`, at most `max_depth` edges. Origins that reach no
    /// terminator are absent from the result.
    async fn upward_paths(
        &self,
        origins: &[DistributorId],
        terminators: &HashSet<DistributorId>,
        max_depth: u32,
    ) -> Result<Vec<UpwardPath>, GraphError>;

    /// Pairs bridging a full ancestor and a chain end through placeholder nodes.
    async fn rekey_candidates(
        &self,
        placeholder: &str,
        max_depth: u32,
    ) -> Result<Vec<ChainCandidate>, GraphError>;

    /// The current path from `start` down to `end`, `start` first.
    async fn downward_path(
        &self,
        start: &DistributorId,
        end: &DistributorId,
        max_depth: u32,
    ) -> Result<Option<Vec<PathNode>>, GraphError>;

    /// Set `username`/`password` on every listed node the guard permits.
    /// Returns the number of nodes written.
    async fn set_credentials(
        &self,
        ids: &[DistributorId],
        credentials: &Credentials,
        guard: WriteGuard<'_>,
    ) -> Result<u64, GraphError>;

    /// Node counts per credential state.
    async fn credential_census(&self, placeholder: &str) -> Result<CredentialCensus, GraphError>;
}

#[async_trait]
impl NodeStore for GraphClient {
    async fn get_person(&self, id: &DistributorId) -> Result<Option<PersonRecord>, GraphError> {
        self.find_person(id).await
    }

    async fn relations(&self, id: &DistributorId) -> Result<Relations, GraphError> {
        self.fetch_relations(id).await
    }

    async fn empty_ids(&self) -> Result<Vec<DistributorId>, GraphError> {
        self.list_empty_ids().await
    }

    async fn full_ids(&self, placeholder: &str) -> Result<HashSet<DistributorId>, GraphError> {
        self.list_full_ids(placeholder).await
    }

    async fn upward_paths(
        &self,
        origins: &[DistributorId],
        terminators: &HashSet<DistributorId>,
        max_depth: u32,
    ) -> Result<Vec<UpwardPath>, GraphError> {
        self.find_upward_paths(origins, terminators, max_depth).await
    }

    async fn rekey_candidates(
        &self,
        placeholder: &str,
        max_depth: u32,
    ) -> Result<Vec<ChainCandidate>, GraphError> {
        self.find_rekey_candidates(placeholder, max_depth).await
    }

    async fn downward_path(
        &self,
        start: &DistributorId,
        end: &DistributorId,
        max_depth: u32,
    ) -> Result<Option<Vec<PathNode>>, GraphError> {
        self.fetch_downward_path(start, end, max_depth).await
    }

    async fn set_credentials(
        &self,
        ids: &[DistributorId],
        credentials: &Credentials,
        guard: WriteGuard<'_>,
    ) -> Result<u64, GraphError> {
        self.write_credentials(ids, credentials, guard).await
    }

    async fn credential_census(&self, placeholder: &str) -> Result<CredentialCensus, GraphError> {
        self.count_credential_states(placeholder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PH: &str = "changeme";

    #[test]
    fn not_full_guard_protects_full_nodes() {
        let guard = WriteGuard::NotFull { placeholder: PH };
        assert!(guard.permits(None, None));
        assert!(guard.permits(Some("u"), Some(PH)));
        assert!(!guard.permits(Some("u"), Some("real")));
    }

    #[test]
    fn placeholder_guard_requires_placeholder_password() {
        let guard = WriteGuard::Placeholder { placeholder: PH };
        assert!(guard.permits(Some("u"), Some(PH)));
        assert!(!guard.permits(None, None));
        assert!(!guard.permits(Some("u"), Some("real")));
    }

    #[test]
    fn path_node_state() {
        let node = PathNode {
            id: DistributorId::from("D-1"),
            username: Some("u".to_string()),
            password: Some(PH.to_string()),
        };
        assert!(node.holds_placeholder(PH));
        assert_eq!(node.state(PH), CredentialState::Placeholder);
        assert_eq!(node.credentials(), Some(Credentials::new("u", PH)));
    }
}
