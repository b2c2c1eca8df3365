//! Read operations and Cypher queries over the `Person` tree.
//!
//! `PARENT` edges point from child to parent; `LEFT_CHILD` and
//! `RIGHT_CHILD` point from parent to child.

use std::collections::HashSet;

use neo4rs::query;

use lineage_core::{
    CredentialCensus, Credentials, DistributorId, PersonAttributes, PersonRecord, Relations,
};

use crate::client::{column, GraphClient, GraphError};
use crate::store::{ChainCandidate, PathNode, UpwardPath};

impl GraphClient {
    // ── Single Node Lookups ──────────────────────────────────────

    /// Get a person by distributor id.
    pub async fn find_person(
        &self,
        id: &DistributorId,
    ) -> Result<Option<PersonRecord>, GraphError> {
        let q = query(
            "MATCH (n:Person {distributor_id: $id})
             RETURN n LIMIT 1",
        )
        .param("id", id.to_string());

        match self.query_one(q).await? {
            Some(row) => {
                let node: neo4rs::Node = row.get("n").map_err(|e| {
                    GraphError::Serialization(format!("Failed to deserialize person: {e}"))
                })?;
                Ok(Some(neo4j_node_to_person(&node)?))
            }
            None => Ok(None),
        }
    }

    /// Resolve parent, left and right child of a person in one round trip.
    pub async fn fetch_relations(&self, id: &DistributorId) -> Result<Relations, GraphError> {
        let q = query(
            "MATCH (n:Person {distributor_id: $id})
             OPTIONAL MATCH (n)-[:PARENT]->(p:Person)
             OPTIONAL MATCH (n)-[:LEFT_CHILD]->(l:Person)
             OPTIONAL MATCH (n)-[:RIGHT_CHILD]->(r:Person)
             RETURN coalesce(p.distributor_id, '') AS parent_id,
                    coalesce(l.distributor_id, '') AS left_id,
                    coalesce(r.distributor_id, '') AS right_id
             LIMIT 1",
        )
        .param("id", id.to_string());

        match self.query_one(q).await? {
            Some(row) => Ok(Relations {
                parent_id: non_empty_id(column(&row, "parent_id")?),
                left_id: non_empty_id(column(&row, "left_id")?),
                right_id: non_empty_id(column(&row, "right_id")?),
            }),
            None => Err(GraphError::NotFound {
                label: "Person".to_string(),
                id: id.to_string(),
            }),
        }
    }

    // ── Credential State Sets ────────────────────────────────────

    /// Ids of persons without a complete credential pair.
    pub async fn list_empty_ids(&self) -> Result<Vec<DistributorId>, GraphError> {
        let q = query(
            "MATCH (n:Person)
             WHERE n.username IS NULL OR n.password IS NULL
             RETURN n.distributor_id AS id
             ORDER BY id",
        );
        self.collect_ids(q).await
    }

    /// Ids of persons holding real, non-placeholder credentials.
    pub async fn list_full_ids(
        &self,
        placeholder: &str,
    ) -> Result<HashSet<DistributorId>, GraphError> {
        let q = query(
            "MATCH (n:Person)
             WHERE n.username IS NOT NULL AND n.password IS NOT NULL
               AND n.password <> $placeholder
             RETURN n.distributor_id AS id",
        )
        .param("placeholder", placeholder.to_string());
        Ok(self.collect_ids(q).await?.into_iter().collect())
    }

    /// Count persons per credential state.
    pub async fn count_credential_states(
        &self,
        placeholder: &str,
    ) -> Result<CredentialCensus, GraphError> {
        let q = query(
            "MATCH (n:Person)
             RETURN
               count(CASE WHEN n.username IS NULL OR n.password IS NULL THEN 1 END) AS empty,
               count(CASE WHEN n.username IS NOT NULL AND n.password = $placeholder
                          THEN 1 END) AS placeholder,
               count(CASE WHEN n.username IS NOT NULL AND n.password IS NOT NULL
                           AND n.password <> $placeholder THEN 1 END) AS full",
        )
        .param("placeholder", placeholder.to_string());

        match self.query_one(q).await? {
            Some(row) => Ok(CredentialCensus {
                empty: column::<i64>(&row, "empty")? as u64,
                placeholder: column::<i64>(&row, "placeholder")? as u64,
                full: column::<i64>(&row, "full")? as u64,
            }),
            None => Ok(CredentialCensus::default()),
        }
    }

    // ── Path Queries ─────────────────────────────────────────────

    /// Walk `PARENT` edges upward from each origin to its first terminator.
    ///
    /// Only the shortest such path can satisfy the `none(...)` filter, so each
    /// origin yields at most one row.
    pub async fn find_upward_paths(
        &self,
        origins: &[DistributorId],
        terminators: &HashSet<DistributorId>,
        max_depth: u32,
    ) -> Result<Vec<UpwardPath>, GraphError> {
        if origins.is_empty() || terminators.is_empty() {
            return Ok(Vec::new());
        }

        let q = query(&format!(
            "UNWIND $origins AS origin_id
             MATCH (origin:Person {{distributor_id: origin_id}})
             MATCH p = (origin)-[:PARENT*1..{max_depth}]->(t:Person)
             WHERE t.distributor_id IN $terminators
               AND none(x IN nodes(p)[0..-1] WHERE x.distributor_id IN $terminators)
             RETURN origin_id,
                    [x IN nodes(p)[0..-1] | x.distributor_id] AS walked,
                    t.distributor_id AS terminator_id,
                    t.username AS username,
                    t.password AS password"
        ))
        .param("origins", to_strings(origins))
        .param("terminators", to_strings(terminators.iter()));

        let rows = self.query_rows(q).await?;
        let mut paths = Vec::with_capacity(rows.len());
        for row in rows {
            let origin: String = column(&row, "origin_id")?;
            let walked: Vec<String> = column(&row, "walked")?;
            let terminator: String = column(&row, "terminator_id")?;
            let username: String = column(&row, "username")?;
            let password: String = column(&row, "password")?;

            paths.push(UpwardPath {
                origin: DistributorId(origin),
                walked: walked.into_iter().map(DistributorId).collect(),
                terminator: DistributorId(terminator),
                credentials: Credentials { username, password },
            });
        }
        Ok(paths)
    }

    /// Discover placeholder chains hanging below a full ancestor.
    ///
    /// A chain ends either at a non-placeholder node (full or empty) that
    /// bounds it, or at a placeholder node with no children that absorbs it.
    pub async fn find_rekey_candidates(
        &self,
        placeholder: &str,
        max_depth: u32,
    ) -> Result<Vec<ChainCandidate>, GraphError> {
        let q = query(&format!(
            "MATCH p = (end:Person)-[:PARENT*1..{max_depth}]->(start:Person)
             WHERE start.username IS NOT NULL AND start.password IS NOT NULL
               AND start.password <> $placeholder
               AND all(x IN nodes(p)[1..-1] WHERE x.password = $placeholder)
               AND (
                 (end.password = $placeholder AND NOT ()-[:PARENT]->(end))
                 OR (length(p) > 1 AND coalesce(end.password, '') <> $placeholder)
               )
             RETURN start.distributor_id AS start_id, end.distributor_id AS end_id"
        ))
        .param("placeholder", placeholder.to_string());

        let rows = self.query_rows(q).await?;
        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            let start: String = column(&row, "start_id")?;
            let end: String = column(&row, "end_id")?;
            candidates.push(ChainCandidate {
                start: DistributorId(start),
                end: DistributorId(end),
            });
        }
        Ok(candidates)
    }

    /// Recompute the path from `start` down to `end` with current credentials.
    pub async fn fetch_downward_path(
        &self,
        start: &DistributorId,
        end: &DistributorId,
        max_depth: u32,
    ) -> Result<Option<Vec<PathNode>>, GraphError> {
        let q = query(&format!(
            "MATCH p = (end:Person {{distributor_id: $end}})-[:PARENT*1..{max_depth}]->
                       (start:Person {{distributor_id: $start}})
             WITH reverse(nodes(p)) AS chain LIMIT 1
             RETURN [x IN chain | x.distributor_id] AS ids,
                    [x IN chain | coalesce(x.username, '')] AS usernames,
                    [x IN chain | coalesce(x.password, '')] AS passwords"
        ))
        .param("start", start.to_string())
        .param("end", end.to_string());

        let Some(row) = self.query_one(q).await? else {
            return Ok(None);
        };

        let ids: Vec<String> = column(&row, "ids")?;
        let usernames: Vec<String> = column(&row, "usernames")?;
        let passwords: Vec<String> = column(&row, "passwords")?;
        if usernames.len() != ids.len() || passwords.len() != ids.len() {
            return Err(GraphError::Serialization(
                "Path columns have mismatched lengths".to_string(),
            ));
        }

        let nodes = ids
            .into_iter()
            .zip(usernames)
            .zip(passwords)
            .map(|((id, username), password)| PathNode {
                id: DistributorId(id),
                username: non_empty(username),
                password: non_empty(password),
            })
            .collect();
        Ok(Some(nodes))
    }

    async fn collect_ids(&self, q: neo4rs::Query) -> Result<Vec<DistributorId>, GraphError> {
        let rows = self.query_rows(q).await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(DistributorId(column(&row, "id")?));
        }
        Ok(ids)
    }
}

/// Convert a neo4rs::Node to a PersonRecord.
fn neo4j_node_to_person(node: &neo4rs::Node) -> Result<PersonRecord, GraphError> {
    let distributor_id: String = node
        .get("distributor_id")
        .map_err(|e| GraphError::Serialization(format!("person without distributor_id: {e}")))?;

    Ok(PersonRecord {
        distributor_id: DistributorId(distributor_id),
        attributes: PersonAttributes {
            name: node.get("name").ok(),
            rank: node.get("rank").ok(),
            highest_rank: node.get("highest_rank").ok(),
            signup_date: node.get("signup_date").ok(),
            center: node.get("center").ok(),
            country: node.get("country").ok(),
            personal_pv: number_property(node, "personal_pv"),
            network_pv: number_property(node, "network_pv"),
            total_pv: number_property(node, "total_pv"),
            username: node.get("username").ok(),
            password: node.get("password").ok(),
            built_tree: node.get("built_tree").unwrap_or(false),
        },
    })
}

/// Point values are written as integers by some importers and floats by others.
fn number_property(node: &neo4rs::Node, key: &str) -> f64 {
    node.get::<f64>(key)
        .or_else(|_| node.get::<i64>(key).map(|v| v as f64))
        .unwrap_or(0.0)
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn non_empty_id(s: String) -> Option<DistributorId> {
    non_empty(s).map(DistributorId)
}

fn to_strings<'a>(ids: impl IntoIterator<Item = &'a DistributorId>) -> Vec<String> {
    ids.into_iter().map(|id| id.0.clone()).collect()
}
