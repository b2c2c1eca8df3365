//! Write operations for the `Person` tree.
//!
//! The core never creates or deletes nodes or edges. The only mutation is a
//! guarded bulk `SET` of `username`/`password`; the guard is part of the same
//! statement, so Neo4j evaluates it per node at write time.

use neo4rs::query;

use lineage_core::{Credentials, DistributorId};

use crate::client::{column, GraphClient, GraphError};
use crate::store::WriteGuard;

impl GraphClient {
    /// Set credentials on every listed person the guard permits.
    /// Returns the count of persons written.
    pub async fn write_credentials(
        &self,
        ids: &[DistributorId],
        credentials: &Credentials,
        guard: WriteGuard<'_>,
    ) -> Result<u64, GraphError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let (predicate, placeholder) = guard_predicate(guard);
        let cypher = format!(
            "MATCH (n:Person)
             WHERE n.distributor_id IN $ids AND {predicate}
             SET n.username = $username, n.password = $password
             RETURN count(n) AS cnt"
        );

        let q = query(&cypher)
            .param(
                "ids",
                ids.iter().map(|id| id.0.clone()).collect::<Vec<String>>(),
            )
            .param("placeholder", placeholder.to_string())
            .param("username", credentials.username.clone())
            .param("password", credentials.password.clone());

        match self.query_one(q).await? {
            Some(row) => Ok(column::<i64>(&row, "cnt")? as u64),
            None => Ok(0),
        }
    }
}

/// Cypher predicate matching [`WriteGuard::permits`].
fn guard_predicate(guard: WriteGuard<'_>) -> (&'static str, &str) {
    match guard {
        WriteGuard::NotFull { placeholder } => (
            "(n.username IS NULL OR n.password IS NULL OR n.password = $placeholder)",
            placeholder,
        ),
        WriteGuard::Placeholder { placeholder } => ("n.password = $placeholder", placeholder),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_predicates_bind_placeholder() {
        let (not_full, ph) = guard_predicate(WriteGuard::NotFull { placeholder: "x" });
        assert!(not_full.contains("n.username IS NULL"));
        assert_eq!(ph, "x");

        let (only_ph, _) = guard_predicate(WriteGuard::Placeholder { placeholder: "x" });
        assert_eq!(only_ph, "n.password = $placeholder");
    }
}
