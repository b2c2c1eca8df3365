//! Bolt connection to the distributor tree.

use neo4rs::{query, ConfigBuilder, Graph, Query, Row};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Errors from node store operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("{label} {id} not found")]
    NotFound { label: String, id: String },

    #[error("Malformed graph data: {0}")]
    Serialization(String),

    /// Store-side failure outside the driver (used by the in-memory store).
    #[error("Node store unavailable: {0}")]
    Unavailable(String),
}

/// The `[neo4j]` config section.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Upper bound on pooled Bolt connections. Keep it at or above
    /// `jobs.max_in_flight` so re-keying tasks do not queue on the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_max_connections() -> u32 {
    64
}

fn default_fetch_size() -> usize {
    500
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: "lineage-dev".to_string(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

/// Pooled Neo4j client holding the `:Person` tree. Clones share the pool.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Open the pool and make sure the server answers.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let bolt = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(bolt)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;
        let client = Self { graph };
        client.ping().await?;

        tracing::debug!(
            uri = %config.uri,
            max_connections = config.max_connections,
            "Neo4j pool ready"
        );
        Ok(client)
    }

    /// Round-trip a trivial statement.
    pub async fn ping(&self) -> Result<(), GraphError> {
        self.query_one(query("RETURN 1 AS ok"))
            .await?
            .map(|_| ())
            .ok_or_else(|| GraphError::Connection("server returned no rows".to_string()))
    }

    /// Create the `distributor_id` index the job queries look nodes up by.
    pub async fn ensure_schema(&self) -> Result<(), GraphError> {
        self.run(query(
            "CREATE INDEX person_distributor_id IF NOT EXISTS \
             FOR (p:Person) ON (p.distributor_id)",
        ))
        .await
    }

    /// Execute a statement and discard its result.
    pub async fn run(&self, q: Query) -> Result<(), GraphError> {
        self.graph.run(q).await?;
        Ok(())
    }

    pub async fn query_rows(&self, q: Query) -> Result<Vec<Row>, GraphError> {
        let mut stream = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    pub async fn query_one(&self, q: Query) -> Result<Option<Row>, GraphError> {
        let mut stream = self.graph.execute(q).await?;
        Ok(stream.next().await?)
    }
}

/// Read a required column, reporting a missing or mistyped value instead of
/// defaulting it.
pub(crate) fn column<T: DeserializeOwned>(row: &Row, key: &str) -> Result<T, GraphError> {
    row.get(key)
        .map_err(|e| GraphError::Serialization(format!("column `{key}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo4rs::BoltType;

    fn row(key: &str, value: BoltType) -> Row {
        Row::new(vec![BoltType::from(key)].into(), vec![value].into())
    }

    #[test]
    fn test_column_reads_typed_value() {
        let row = row("cnt", BoltType::from(3_i64));
        assert_eq!(column::<i64>(&row, "cnt").unwrap(), 3);
    }

    #[test]
    fn test_column_mistyped_value_is_an_error() {
        let row = row("parent_id", BoltType::from(7_i64));
        let err = column::<String>(&row, "parent_id").unwrap_err();
        assert!(matches!(err, GraphError::Serialization(ref m) if m.contains("parent_id")));
    }

    #[test]
    fn test_column_missing_is_an_error() {
        let row = row("cnt", BoltType::from(3_i64));
        assert!(matches!(
            column::<i64>(&row, "full"),
            Err(GraphError::Serialization(_))
        ));
    }
}
