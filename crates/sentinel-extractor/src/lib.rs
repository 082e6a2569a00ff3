//! Sentinel Extractor - Ontology-constrained triple extraction
//!
//! Turns raw model output into validated, ontology-typed triples:
//! - BIO tag decoding into non-overlapping entity spans
//! - Directed relation-candidate generation over decoded spans
//! - Triple validation against the ontology registry
//! - Annotation validation and ontology mapping for offline corpora
//!
//! Model inference itself is an external collaborator, consumed through the
//! [`TokenTagger`] and [`RelationScorer`] traits.

pub mod annotation;
pub mod bio;
pub mod candidates;
pub mod mapping;
pub mod pipeline;
pub mod validator;

pub use annotation::{AnnotatedDocument, AnnotationIssue, AnnotationValidator};
pub use bio::{align_tokens, BioTag, SpanDecoder, TaggedToken};
pub use candidates::{generate_candidates, CandidateIter, RelationCandidate};
pub use mapping::{MappingReport, RawTriple, TripleMapper};
pub use pipeline::{
    Document, DocumentExtraction, ExtractionError, ExtractionPipeline, RecordedDocument,
    RecordedInference, RecordedRelation,
};
pub use validator::{
    RawPrediction, SpanRole, TripleValidator, ValidationError, ValidationErrorKind,
    ValidationReport,
};

use async_trait::async_trait;
use sentinel_core::{EntitySpan, Result};

/// External token classifier (NER model)
#[async_trait]
pub trait TokenTagger: Send + Sync {
    /// Tag each token of `text` with a BIO label
    async fn tag(&self, text: &str) -> Result<Vec<TaggedToken>>;

    /// Tag a whole document. Implementations that know documents by id
    /// override this; the default tags the text alone.
    async fn tag_document(&self, document: &Document) -> Result<Vec<TaggedToken>> {
        self.tag(&document.text).await
    }
}

/// External relation classifier (RE model)
#[async_trait]
pub trait RelationScorer: Send + Sync {
    /// Return exactly one relation name per candidate, in candidate order
    async fn score(
        &self,
        text: &str,
        spans: &[EntitySpan],
        candidates: &[RelationCandidate],
    ) -> Result<Vec<String>>;

    /// Score candidates of a whole document, by default from its text alone
    async fn score_document(
        &self,
        document: &Document,
        spans: &[EntitySpan],
        candidates: &[RelationCandidate],
    ) -> Result<Vec<String>> {
        self.score(&document.text, spans, candidates).await
    }
}
