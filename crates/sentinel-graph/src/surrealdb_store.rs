//! SurrealDB implementation for graph storage
//!
//! Nodes and edges are stored under deterministic record ids derived from
//! their identity, so `UPSERT` gives merge semantics and the database
//! serializes concurrent writes to the same key.

use async_trait::async_trait;
use sentinel_core::{GraphConfig, GraphEdge, GraphNode, Result, SentinelError};
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

use crate::GraphStore;

/// SurrealDB graph store implementation
pub struct SurrealDbStore {
    client: Surreal<Any>,
}

impl SurrealDbStore {
    /// Connect, authenticate, select the configured namespace/database and
    /// make sure the schema exists.
    ///
    /// `surrealdb_url` picks the engine by scheme; a bare `host:port` means
    /// `ws://`. Embedded `mem://` databases have no users, so sign-in is
    /// skipped for them.
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        let url = if config.surrealdb_url.contains("://") {
            config.surrealdb_url.clone()
        } else {
            format!("ws://{}", config.surrealdb_url)
        };

        let client = any::connect(url.as_str())
            .await
            .map_err(|e| SentinelError::Database(format!("SurrealDB connection failed: {e}")))?;

        if !url.starts_with("mem://") {
            client
                .signin(Root {
                    username: &config.surrealdb_user,
                    password: &config.surrealdb_pass,
                })
                .await
                .map_err(|e| SentinelError::Database(format!("SurrealDB auth failed: {e}")))?;
        }

        client
            .use_ns(&config.surrealdb_namespace)
            .use_db(&config.surrealdb_database)
            .await
            .map_err(|e| SentinelError::Database(format!("SurrealDB namespace error: {e}")))?;

        let store = Self { client };
        store.init_schema().await?;

        tracing::info!(
            url = %url,
            namespace = %config.surrealdb_namespace,
            database = %config.surrealdb_database,
            "Connected to SurrealDB"
        );
        Ok(store)
    }

    /// Define tables and lookup indexes; safe to repeat
    async fn init_schema(&self) -> Result<()> {
        self.client
            .query(
                r#"
                DEFINE TABLE IF NOT EXISTS node SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS idx_node_type ON node FIELDS entity_type;
                DEFINE TABLE IF NOT EXISTS edge SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS idx_edge_relation ON edge FIELDS relation;
            "#,
            )
            .await
            .and_then(|r| r.check())
            .map_err(|e| SentinelError::Database(format!("Schema init failed: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl GraphStore for SurrealDbStore {
    async fn upsert_node(&self, node: &GraphNode) -> Result<()> {
        self.client
            .query(
                "UPSERT type::thing('node', [$entity_type, $id]) \
                 SET entity_type = $entity_type, name = $id",
            )
            .bind(("entity_type", node.entity_type.clone()))
            .bind(("id", node.id.clone()))
            .await
            .and_then(|r| r.check())
            .map_err(|e| SentinelError::Database(format!("Failed to upsert node: {e}")))?;

        Ok(())
    }

    async fn upsert_edge(&self, edge: &GraphEdge) -> Result<()> {
        self.client
            .query(
                "UPSERT type::thing('edge', [$source, $relation, $target]) \
                 SET source = $source, relation = $relation, target = $target",
            )
            .bind(("source", edge.source_id.clone()))
            .bind(("relation", edge.relation.clone()))
            .bind(("target", edge.target_id.clone()))
            .await
            .and_then(|r| r.check())
            .map_err(|e| SentinelError::Database(format!("Failed to upsert edge: {e}")))?;

        Ok(())
    }

    async fn query(&self, query: &str) -> Result<Vec<serde_json::Value>> {
        // Record ids only convert through the database's own value type
        let result: surrealdb::Value = self
            .client
            .query(query)
            .await
            .map_err(|e| SentinelError::Database(format!("Query failed: {e}")))?
            .take(0)
            .map_err(|e| SentinelError::Database(format!("Result extraction failed: {e}")))?;

        Ok(match result.into_inner().into_json() {
            serde_json::Value::Array(rows) => rows,
            serde_json::Value::Null => Vec::new(),
            row => vec![row],
        })
    }

    fn name(&self) -> &'static str {
        "surrealdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::{Triple, TripleNode};

    async fn memory_db() -> SurrealDbStore {
        let config = GraphConfig {
            surrealdb_url: "mem://".to_string(),
            ..GraphConfig::default()
        };
        SurrealDbStore::connect(&config).await.unwrap()
    }

    fn apt29_uses_mimikatz() -> Triple {
        Triple::new(
            TripleNode::new("APT29", "THREAT_ACTOR"),
            "uses",
            TripleNode::new("Mimikatz", "TOOL"),
        )
    }

    #[tokio::test]
    async fn test_select_star_returns_rows_with_record_ids() {
        let store = memory_db().await;
        let (subject, object, edge) = apt29_uses_mimikatz().graph_elements();
        store.upsert_node(&subject).await.unwrap();
        store.upsert_node(&object).await.unwrap();
        store.upsert_edge(&edge).await.unwrap();

        let nodes = store.query("SELECT * FROM node").await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|row| row.get("id").is_some()));

        let edges = store.query("SELECT * FROM edge").await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0]["relation"], "uses");
        assert_eq!(edges[0]["source"], "APT29");
    }

    #[tokio::test]
    async fn test_repeated_upserts_merge() {
        let store = memory_db().await;
        let (subject, object, edge) = apt29_uses_mimikatz().graph_elements();
        for _ in 0..3 {
            store.upsert_node(&subject).await.unwrap();
            store.upsert_node(&object).await.unwrap();
            store.upsert_edge(&edge).await.unwrap();
        }

        let tools = store
            .query("SELECT name FROM node WHERE entity_type = 'TOOL'")
            .await
            .unwrap();
        assert_eq!(tools, vec![serde_json::json!({"name": "Mimikatz"})]);
        assert_eq!(store.query("SELECT * FROM edge").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_defines_lookup_indexes() {
        let store = memory_db().await;

        let node_info = store.query("INFO FOR TABLE node").await.unwrap();
        assert!(node_info[0]["indexes"].get("idx_node_type").is_some());

        let edge_info = store.query("INFO FOR TABLE edge").await.unwrap();
        assert!(edge_info[0]["indexes"].get("idx_edge_relation").is_some());
    }

    #[tokio::test]
    async fn test_invalid_query_is_database_error() {
        let store = memory_db().await;
        let err = store.query("SELEC nonsense").await.unwrap_err();
        assert!(matches!(err, SentinelError::Database(_)));
    }
}
