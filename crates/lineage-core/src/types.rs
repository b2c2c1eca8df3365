//! Core domain types for the Lineage distributor tree.
//!
//! These types describe `Person` nodes as they are stored in the graph
//! and the derived credential state the maintenance jobs act upon.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Identity ──────────────────────────────────────────────────────

/// Globally unique distributor identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct DistributorId(pub String);

impl DistributorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DistributorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DistributorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── Credentials ───────────────────────────────────────────────────

/// A complete username/password pair, as written by the jobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Derived classification of a node's credentials. Never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    /// `username` is unset (or the pair is incomplete).
    Empty,
    /// `password` equals the well-known placeholder value.
    Placeholder,
    /// Real, non-placeholder credentials.
    Full,
}

impl CredentialState {
    /// Classify a raw username/password pair.
    ///
    /// A node without a complete pair is empty, even when its password
    /// happens to equal the placeholder.
    pub fn classify(username: Option<&str>, password: Option<&str>, placeholder: &str) -> Self {
        match (username, password) {
            (Some(_), Some(p)) if p == placeholder => Self::Placeholder,
            (Some(_), Some(_)) => Self::Full,
            _ => Self::Empty,
        }
    }
}

/// Node counts per credential state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialCensus {
    pub empty: u64,
    pub placeholder: u64,
    pub full: u64,
}

impl CredentialCensus {
    pub fn total(&self) -> u64 {
        self.empty + self.placeholder + self.full
    }

    pub fn record(&mut self, state: CredentialState) {
        match state {
            CredentialState::Empty => self.empty += 1,
            CredentialState::Placeholder => self.placeholder += 1,
            CredentialState::Full => self.full += 1,
        }
    }
}

// ── Person ────────────────────────────────────────────────────────

/// The node-local attributes of a distributor (everything except identity
/// and relationships).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PersonAttributes {
    pub name: Option<String>,
    pub rank: Option<String>,
    pub highest_rank: Option<String>,
    pub signup_date: Option<String>,
    pub center: Option<String>,
    pub country: Option<String>,
    pub personal_pv: f64,
    pub network_pv: f64,
    pub total_pv: f64,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Whether the tree builder has expanded this node's subtree.
    pub built_tree: bool,
}

impl PersonAttributes {
    pub fn credential_state(&self, placeholder: &str) -> CredentialState {
        CredentialState::classify(
            self.username.as_deref(),
            self.password.as_deref(),
            placeholder,
        )
    }

    /// The complete credential pair, if both halves are set.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Some(Credentials::new(u.clone(), p.clone())),
            _ => None,
        }
    }
}

/// A `Person` node's identity plus its own attributes, as fetched in bulk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonRecord {
    pub distributor_id: DistributorId,
    #[serde(flatten)]
    pub attributes: PersonAttributes,
}

impl PersonRecord {
    pub fn new(distributor_id: impl Into<String>) -> Self {
        Self {
            distributor_id: DistributorId::new(distributor_id),
            attributes: PersonAttributes::default(),
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.attributes.username = Some(username.to_string());
        self.attributes.password = Some(password.to_string());
        self
    }
}

/// The three structural neighbours of a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Relations {
    pub parent_id: Option<DistributorId>,
    pub left_id: Option<DistributorId>,
    pub right_id: Option<DistributorId>,
}

impl Relations {
    pub fn is_leaf(&self) -> bool {
        self.left_id.is_none() && self.right_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PH: &str = "changeme";

    #[test]
    fn classify_states() {
        assert_eq!(
            CredentialState::classify(None, None, PH),
            CredentialState::Empty
        );
        assert_eq!(
            CredentialState::classify(None, Some(PH), PH),
            CredentialState::Empty
        );
        assert_eq!(
            CredentialState::classify(Some("u"), None, PH),
            CredentialState::Empty
        );
        assert_eq!(
            CredentialState::classify(Some("u"), Some(PH), PH),
            CredentialState::Placeholder
        );
        assert_eq!(
            CredentialState::classify(Some("u"), Some("s3cret"), PH),
            CredentialState::Full
        );
    }

    #[test]
    fn census_counts() {
        let mut census = CredentialCensus::default();
        census.record(CredentialState::Empty);
        census.record(CredentialState::Full);
        census.record(CredentialState::Full);
        assert_eq!(census.full, 2);
        assert_eq!(census.total(), 3);
    }

    #[test]
    fn record_serializes_flat() {
        let record = PersonRecord::new("D-100").with_credentials("alice", "pw");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["distributor_id"], "D-100");
        assert_eq!(json["username"], "alice");
        assert!(json.get("attributes").is_none());
    }

    #[test]
    fn credentials_require_both_halves() {
        let mut attrs = PersonAttributes {
            username: Some("bob".to_string()),
            ..Default::default()
        };
        assert!(attrs.credentials().is_none());
        attrs.password = Some("pw".to_string());
        assert_eq!(attrs.credentials(), Some(Credentials::new("bob", "pw")));
    }
}
