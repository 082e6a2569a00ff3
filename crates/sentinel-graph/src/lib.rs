//! Sentinel Graph - Graph store abstraction
//!
//! Provides the upsert/query contract against a labeled graph store, an
//! in-memory store, a SurrealDB store, and the concurrent ingestion engine
//! that merges validated triples into either.
//!
//! Author: hephaex@gmail.com

use std::sync::Arc;

use async_trait::async_trait;
use sentinel_core::{GraphBackend, GraphConfig, GraphEdge, GraphNode, Result};

pub mod ingest;
pub mod memory_store;
pub mod surrealdb_store;

pub use ingest::{IngestionEngine, IngestionError, IngestionOutcome, IngestionReport};
pub use memory_store::MemoryGraphStore;
pub use surrealdb_store::SurrealDbStore;

/// Trait for graph store operations.
///
/// Upserts are create-if-absent merges keyed by identity: repeating one is a
/// no-op and never overwrites unrelated properties. Implementations must be
/// safe to call from concurrent ingestion workers.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Merge a node keyed by `(entity_type, id)`
    async fn upsert_node(&self, node: &GraphNode) -> Result<()>;

    /// Merge an edge keyed by `(source_id, relation, target_id)`
    async fn upsert_edge(&self, edge: &GraphEdge) -> Result<()>;

    /// Execute a backend query, returning rows as JSON
    async fn query(&self, query: &str) -> Result<Vec<serde_json::Value>>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Open the store selected by `config`
pub async fn connect(config: &GraphConfig) -> Result<Arc<dyn GraphStore>> {
    let store: Arc<dyn GraphStore> = match config.backend {
        GraphBackend::Memory => Arc::new(MemoryGraphStore::new()),
        GraphBackend::SurrealDb => Arc::new(SurrealDbStore::connect(config).await?),
    };
    tracing::info!(backend = store.name(), "Graph store ready");
    Ok(store)
}
