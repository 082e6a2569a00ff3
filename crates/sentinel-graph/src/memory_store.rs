//! In-memory graph store
//!
//! Nodes and edges live in ordered sets, so upserts are naturally idempotent
//! and query results come back in a stable order.

use std::collections::BTreeSet;

use async_trait::async_trait;
use sentinel_core::{GraphEdge, GraphNode, Result, SentinelError};
use tokio::sync::RwLock;

use crate::GraphStore;

#[derive(Debug, Default)]
struct Graph {
    nodes: BTreeSet<GraphNode>,
    edges: BTreeSet<GraphEdge>,
}

/// Process-local graph store
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    graph: RwLock<Graph>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn node_count(&self) -> usize {
        self.graph.read().await.nodes.len()
    }

    pub async fn edge_count(&self) -> usize {
        self.graph.read().await.edges.len()
    }

    pub async fn contains_node(&self, node: &GraphNode) -> bool {
        self.graph.read().await.nodes.contains(node)
    }

    pub async fn contains_edge(&self, edge: &GraphEdge) -> bool {
        self.graph.read().await.edges.contains(edge)
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn upsert_node(&self, node: &GraphNode) -> Result<()> {
        let mut graph = self.graph.write().await;
        if !graph.nodes.contains(node) {
            graph.nodes.insert(node.clone());
        }
        Ok(())
    }

    async fn upsert_edge(&self, edge: &GraphEdge) -> Result<()> {
        let mut graph = self.graph.write().await;
        if !graph.edges.contains(edge) {
            graph.edges.insert(edge.clone());
        }
        Ok(())
    }

    /// Supports `nodes [TYPE]` and `edges [RELATION]`
    async fn query(&self, query: &str) -> Result<Vec<serde_json::Value>> {
        let mut words = query.split_whitespace();
        let target = words.next().unwrap_or_default().to_ascii_lowercase();
        let filter = words.next();
        if words.next().is_some() {
            return Err(SentinelError::UnsupportedQuery(query.to_string()));
        }

        let graph = self.graph.read().await;
        let rows: std::result::Result<Vec<_>, _> = match target.as_str() {
            "nodes" => graph
                .nodes
                .iter()
                .filter(|n| filter.map_or(true, |f| n.entity_type == f))
                .map(serde_json::to_value)
                .collect(),
            "edges" => graph
                .edges
                .iter()
                .filter(|e| filter.map_or(true, |f| e.relation == f))
                .map(serde_json::to_value)
                .collect(),
            _ => return Err(SentinelError::UnsupportedQuery(query.to_string())),
        };
        rows.map_err(|e| SentinelError::Database(format!("Row serialization failed: {e}")))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
