//! Triple validation
//!
//! Applies ontology rules to raw relation predictions. Validation is
//! per-item: an invalid prediction is recorded with its batch index and
//! reason, and the rest of the batch is still processed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use sentinel_core::{EntitySpan, OntologyRegistry, Triple, TripleNode};

/// A relation prediction as produced by external relation scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPrediction {
    pub source: EntitySpan,
    pub target: EntitySpan,
    #[serde(rename = "relation")]
    pub relation_name: String,
}

impl RawPrediction {
    pub fn new(source: EntitySpan, target: EntitySpan, relation_name: impl Into<String>) -> Self {
        Self {
            source,
            target,
            relation_name: relation_name.into(),
        }
    }
}

/// Which end of a prediction a span error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanRole {
    Source,
    Target,
}

impl std::fmt::Display for SpanRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
        }
    }
}

/// Reason a prediction was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationErrorKind {
    #[error("Invalid relation type: {relation}")]
    InvalidRelationType { relation: String },

    #[error("Invalid relation structure: {relation} from {source_label} to {target_label}")]
    InvalidRelationStructure {
        relation: String,
        source_label: String,
        target_label: String,
    },

    #[error("Invalid {role} span [{start}, {end}) for text of length {text_len}")]
    InvalidSpan {
        role: SpanRole,
        start: usize,
        end: usize,
        text_len: usize,
    },
}

/// A rejected prediction and its position in the input batch
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("[Prediction {index}] {kind}")]
pub struct ValidationError {
    pub index: usize,
    pub kind: ValidationErrorKind,
}

/// Outcome of validating a batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Accepted triples, in input order
    pub triples: Vec<Triple>,
    /// Rejected predictions, in input order
    pub errors: Vec<ValidationError>,
    /// Predictions dropped because they carried the "no relation" label
    pub no_relation: usize,
}

impl ValidationReport {
    /// Number of accepted triples
    pub fn valid_count(&self) -> usize {
        self.triples.len()
    }

    /// Number of rejected predictions
    pub fn rejected_count(&self) -> usize {
        self.errors.len()
    }

    /// Split into `(valid_triples, errors)`
    pub fn into_parts(self) -> (Vec<Triple>, Vec<ValidationError>) {
        (self.triples, self.errors)
    }
}

/// Validates predictions against a shared ontology registry
#[derive(Debug, Clone)]
pub struct TripleValidator {
    registry: Arc<OntologyRegistry>,
}

impl TripleValidator {
    pub fn new(registry: Arc<OntologyRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &OntologyRegistry {
        &self.registry
    }

    /// Validate a batch of predictions over the document `text` the spans
    /// were decoded from.
    #[tracing::instrument(skip_all, fields(predictions = predictions.len()))]
    pub fn validate(&self, text: &str, predictions: &[RawPrediction]) -> ValidationReport {
        let mut report = ValidationReport::default();

        for (index, prediction) in predictions.iter().enumerate() {
            match self.validate_one(text, prediction) {
                Ok(Some(triple)) => {
                    debug!(index, %triple, "Accepted triple");
                    report.triples.push(triple);
                }
                Ok(None) => report.no_relation += 1,
                Err(kind) => {
                    let error = ValidationError { index, kind };
                    warn!("{error}");
                    report.errors.push(error);
                }
            }
        }

        info!(
            valid = report.valid_count(),
            rejected = report.rejected_count(),
            no_relation = report.no_relation,
            "Validation finished"
        );
        report
    }

    /// Validate one prediction. `Ok(None)` means it carried the "no relation"
    /// label and is dropped without error.
    pub fn validate_one(
        &self,
        text: &str,
        prediction: &RawPrediction,
    ) -> Result<Option<Triple>, ValidationErrorKind> {
        let relation_name = prediction.relation_name.as_str();
        if self.registry.is_no_relation(relation_name) {
            return Ok(None);
        }

        let relation = self.registry.relation(relation_name).ok_or_else(|| {
            ValidationErrorKind::InvalidRelationType {
                relation: relation_name.to_string(),
            }
        })?;

        if !relation.allows_source(&prediction.source.label)
            || !relation.allows_target(&prediction.target.label)
        {
            return Err(ValidationErrorKind::InvalidRelationStructure {
                relation: relation_name.to_string(),
                source_label: prediction.source.label.clone(),
                target_label: prediction.target.label.clone(),
            });
        }

        check_span(text, &prediction.source, SpanRole::Source)?;
        check_span(text, &prediction.target, SpanRole::Target)?;

        Ok(Some(Triple::new(
            TripleNode::from(&prediction.source),
            relation.name.clone(),
            TripleNode::from(&prediction.target),
        )))
    }
}

fn check_span(text: &str, span: &EntitySpan, role: SpanRole) -> Result<(), ValidationErrorKind> {
    if span.is_within(text) {
        Ok(())
    } else {
        Err(ValidationErrorKind::InvalidSpan {
            role,
            start: span.start,
            end: span.end,
            text_len: text.len(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
