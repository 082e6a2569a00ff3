//! Sentinel Core - Domain models, ontology, and shared types
//!
//! This crate defines the core abstractions used throughout the Sentinel system:
//! - Entity spans decoded from tagged text
//! - Ontology-typed triples and their graph projection (nodes, edges)
//! - Common error types
//! - Configuration management
//! - The process-wide ontology registry
//!
//! Author: hephaex@gmail.com

pub mod config;
pub mod ontology;

pub use config::{
    ConfigError, ExportConfig, GraphBackend, GraphConfig, InferenceConfig, LoggingConfig,
    OntologyConfig, PipelineConfig,
};
pub use ontology::{EntityTypeDef, OntologyRegistry, RelationTypeDef, DEFAULT_NO_RELATION};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error type for calls into external collaborators
#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),
}

pub type Result<T> = std::result::Result<T, SentinelError>;

// ============================================================================
// Entity Spans
// ============================================================================

/// A typed entity span decoded from a source text.
///
/// Offsets are byte offsets into the source text, half-open. `text` is the
/// trimmed slice `source[start..end]`; the offsets themselves are not adjusted
/// by trimming.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntitySpan {
    pub start: usize,
    pub end: usize,
    pub label: String,
    pub text: String,
}

impl EntitySpan {
    /// Create a new span
    pub fn new(start: usize, end: usize, label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            label: label.into(),
            text: text.into(),
        }
    }

    /// Check `0 <= start < end <= text_len` and that both offsets fall on
    /// character boundaries of `source`.
    pub fn is_within(&self, source: &str) -> bool {
        self.start < self.end
            && self.end <= source.len()
            && source.is_char_boundary(self.start)
            && source.is_char_boundary(self.end)
    }

    /// Whether two spans share at least one byte
    pub fn overlaps(&self, other: &EntitySpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

// ============================================================================
// Triples
// ============================================================================

/// One end of a triple: entity text plus its ontology type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TripleNode {
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

impl TripleNode {
    pub fn new(text: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            entity_type: entity_type.into(),
        }
    }
}

impl From<&EntitySpan> for TripleNode {
    fn from(span: &EntitySpan) -> Self {
        Self::new(span.text.trim(), span.label.as_str())
    }
}

/// An ontology-typed (subject, predicate, object) fact
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    pub subject: TripleNode,
    pub predicate: String,
    pub object: TripleNode,
}

impl Triple {
    /// Create a new triple
    pub fn new(subject: TripleNode, predicate: impl Into<String>, object: TripleNode) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
        }
    }

    /// Plain `(subject, predicate, object)` text form, as used by the exporters
    pub fn to_text_triple(&self) -> (String, String, String) {
        (
            self.subject.text.clone(),
            self.predicate.clone(),
            self.object.text.clone(),
        )
    }

    /// Graph projection: subject node, object node, and the edge between them
    pub fn graph_elements(&self) -> (GraphNode, GraphNode, GraphEdge) {
        let subject = GraphNode::from(&self.subject);
        let object = GraphNode::from(&self.object);
        let edge = GraphEdge::new(subject.id.clone(), self.predicate.clone(), object.id.clone());
        (subject, object, edge)
    }
}

impl std::fmt::Display for Triple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}:{}) --[{}]--> ({}:{})",
            self.subject.text,
            self.subject.entity_type,
            self.predicate,
            self.object.text,
            self.object.entity_type
        )
    }
}

// ============================================================================
// Graph Projection
// ============================================================================

/// A node in the persistent graph.
///
/// Identity is the `(entity_type, id)` pair; `id` is the trimmed entity text,
/// case preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphNode {
    pub entity_type: String,
    pub id: String,
}

impl GraphNode {
    pub fn new(entity_type: impl Into<String>, text: &str) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: text.trim().to_string(),
        }
    }

    /// Identity key used for merges
    pub fn key(&self) -> (&str, &str) {
        (&self.entity_type, &self.id)
    }
}

impl From<&TripleNode> for GraphNode {
    fn from(node: &TripleNode) -> Self {
        Self::new(node.entity_type.as_str(), &node.text)
    }
}

/// A directed, labeled edge between two node ids
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source_id: String,
    pub relation: String,
    pub target_id: String,
}

impl GraphEdge {
    pub fn new(
        source_id: impl Into<String>,
        relation: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            relation: relation.into(),
            target_id: target_id.into(),
        }
    }
}

// ============================================================================
// Mapped Triples Document
// ============================================================================

/// On-disk document exchanged between the `extract`, `map`, `ingest` and
/// `export` commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappedTriples {
    pub triples: Vec<Triple>,
    pub metadata: MappingMetadata,
}

/// Provenance recorded alongside a set of mapped triples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingMetadata {
    pub num_triples: usize,
    pub ontology_files: Vec<String>,
    #[serde(default = "Utc::now")]
    pub generated_at: DateTime<Utc>,
}

impl MappedTriples {
    /// Wrap triples with metadata recording their count and ontology sources
    pub fn new(triples: Vec<Triple>, ontology_files: Vec<String>) -> Self {
        let metadata = MappingMetadata {
            num_triples: triples.len(),
            ontology_files,
            generated_at: Utc::now(),
        };
        Self { triples, metadata }
    }
}

// ============================================================================
// Tests
// ============================================================================
