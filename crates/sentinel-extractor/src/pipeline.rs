//! Document extraction pipeline
//!
//! Runs one document through tag → decode → candidates → score → validate.
//! Calls into the model collaborators are the only suspension points and
//! each is bounded by the configured timeout; a timeout or collaborator
//! failure fails that document only.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use sentinel_core::{EntitySpan, InferenceConfig, OntologyRegistry, Result, SentinelError};

use crate::bio::{align_tokens, SpanDecoder, TaggedToken};
use crate::candidates::{generate_candidates, RelationCandidate};
use crate::validator::{RawPrediction, TripleValidator, ValidationReport};
use crate::{RelationScorer, TokenTagger};

/// An input document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub text: String,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
        }
    }
}

/// Everything extracted from one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentExtraction {
    pub document_id: Uuid,
    pub spans: Vec<EntitySpan>,
    pub candidates: usize,
    pub report: ValidationReport,
}

/// Per-document pipeline failure
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },

    #[error("{stage} failed: {source}")]
    Inference {
        stage: &'static str,
        #[source]
        source: SentinelError,
    },

    #[error("Relation scorer returned {actual} labels for {expected} candidates")]
    ScoreCountMismatch { expected: usize, actual: usize },
}

/// Extraction pipeline over external tagging and scoring collaborators
pub struct ExtractionPipeline {
    tagger: Arc<dyn TokenTagger>,
    scorer: Arc<dyn RelationScorer>,
    decoder: SpanDecoder,
    validator: TripleValidator,
    timeout: Duration,
    concurrency: usize,
}

impl ExtractionPipeline {
    pub fn new(
        registry: Arc<OntologyRegistry>,
        tagger: Arc<dyn TokenTagger>,
        scorer: Arc<dyn RelationScorer>,
        config: &InferenceConfig,
    ) -> Self {
        Self {
            tagger,
            scorer,
            decoder: SpanDecoder::new(),
            validator: TripleValidator::new(registry),
            timeout: config.timeout(),
            concurrency: config.concurrency.max(1),
        }
    }

    /// Process a single document
    #[tracing::instrument(skip_all, fields(document_id = %document.id))]
    pub async fn process(
        &self,
        document: &Document,
    ) -> std::result::Result<DocumentExtraction, ExtractionError> {
        let text = document.text.as_str();

        let tokens = self
            .bounded("tagging", self.tagger.tag_document(document))
            .await?;
        let spans = self.decoder.decode(text, &tokens);
        let candidates = generate_candidates(&spans);

        let report = if candidates.is_empty() {
            ValidationReport::default()
        } else {
            let labels = self
                .bounded(
                    "relation scoring",
                    self.scorer.score_document(document, &spans, &candidates),
                )
                .await?;
            if labels.len() != candidates.len() {
                return Err(ExtractionError::ScoreCountMismatch {
                    expected: candidates.len(),
                    actual: labels.len(),
                });
            }

            let predictions: Vec<RawPrediction> = candidates
                .iter()
                .zip(labels)
                .filter_map(|(candidate, label)| {
                    let (source, target) = candidate.resolve(&spans)?;
                    Some(RawPrediction::new(source.clone(), target.clone(), label))
                })
                .collect();
            self.validator.validate(text, &predictions)
        };

        Ok(DocumentExtraction {
            document_id: document.id,
            spans,
            candidates: candidates.len(),
            report,
        })
    }

    /// Process documents concurrently. Outcomes are returned in input order.
    pub async fn process_batch(
        &self,
        documents: &[Document],
    ) -> Vec<(Uuid, std::result::Result<DocumentExtraction, ExtractionError>)> {
        let outcomes: Vec<_> = stream::iter(documents)
            .map(|document| async move { (document.id, self.process(document).await) })
            .buffered(self.concurrency)
            .collect()
            .await;

        let failed = outcomes.iter().filter(|(_, r)| r.is_err()).count();
        for (id, outcome) in &outcomes {
            if let Err(e) = outcome {
                warn!(document_id = %id, "Document extraction failed: {e}");
            }
        }
        info!(
            documents = outcomes.len(),
            succeeded = outcomes.len() - failed,
            failed,
            "Extraction batch finished"
        );
        outcomes
    }

    async fn bounded<T, F>(&self, stage: &'static str, call: F) -> std::result::Result<T, ExtractionError>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        match timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(ExtractionError::Inference { stage, source }),
            Err(_) => Err(ExtractionError::Timeout {
                stage,
                after: self.timeout,
            }),
        }
    }
}

// ============================================================================
// Recorded model output
// ============================================================================

/// A relation prediction recorded against decoded span indices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRelation {
    pub source: usize,
    pub target: usize,
    pub relation: String,
}

/// Model output captured for one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedDocument {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub text: String,
    pub tokens: Vec<TaggedToken>,
    #[serde(default)]
    pub relations: Vec<RecordedRelation>,
}

/// Tagger and scorer replaying previously recorded model output.
///
/// Documents are looked up by id; a bare text lookup resolves to the first
/// recording of that text. Candidates without a recorded relation score as
/// the "no relation" label.
pub struct RecordedInference {
    documents: Vec<Document>,
    by_id: HashMap<Uuid, RecordedDocument>,
    by_text: HashMap<String, Uuid>,
    no_relation: String,
}

impl RecordedInference {
    pub fn new(recorded: Vec<RecordedDocument>, no_relation: impl Into<String>) -> Self {
        let mut documents = Vec::with_capacity(recorded.len());
        let mut by_id = HashMap::with_capacity(recorded.len());
        let mut by_text = HashMap::with_capacity(recorded.len());

        for mut doc in recorded {
            let id = doc.id.unwrap_or_else(Uuid::new_v4);
            if by_id.contains_key(&id) {
                warn!(document_id = %id, "Duplicate recorded document id, keeping the first");
                continue;
            }

            // Fill offsets by alignment when the recording carries none
            if doc.tokens.iter().all(|t| t.offset.is_none()) {
                let words: Vec<&str> = doc.tokens.iter().map(|t| t.token.as_str()).collect();
                let offsets = align_tokens(&doc.text, &words);
                for (token, offset) in doc.tokens.iter_mut().zip(offsets) {
                    token.offset = offset;
                }
            }
            documents.push(Document {
                id,
                text: doc.text.clone(),
            });
            by_text.entry(doc.text.clone()).or_insert(id);
            by_id.insert(id, doc);
        }

        Self {
            documents,
            by_id,
            by_text,
            no_relation: no_relation.into(),
        }
    }

    /// Recorded documents, in recording order
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    fn lookup(&self, document: &Document) -> Result<&RecordedDocument> {
        self.by_id
            .get(&document.id)
            .ok_or_else(|| SentinelError::Inference("no recorded output for document".to_string()))
    }

    fn lookup_text(&self, text: &str) -> Result<&RecordedDocument> {
        self.by_text
            .get(text)
            .and_then(|id| self.by_id.get(id))
            .ok_or_else(|| SentinelError::Inference("no recorded output for document".to_string()))
    }

    fn replay_scores(
        &self,
        recording: &RecordedDocument,
        candidates: &[RelationCandidate],
    ) -> Vec<String> {
        let recorded: HashMap<(usize, usize), &str> = recording
            .relations
            .iter()
            .map(|r| ((r.source, r.target), r.relation.as_str()))
            .collect();

        candidates
            .iter()
            .map(|c| {
                recorded
                    .get(&(c.source_index, c.target_index))
                    .copied()
                    .unwrap_or(self.no_relation.as_str())
                    .to_string()
            })
            .collect()
    }
}

#[async_trait]
impl TokenTagger for RecordedInference {
    async fn tag(&self, text: &str) -> Result<Vec<TaggedToken>> {
        Ok(self.lookup_text(text)?.tokens.clone())
    }

    async fn tag_document(&self, document: &Document) -> Result<Vec<TaggedToken>> {
        Ok(self.lookup(document)?.tokens.clone())
    }
}

#[async_trait]
impl RelationScorer for RecordedInference {
    async fn score(
        &self,
        text: &str,
        _spans: &[EntitySpan],
        candidates: &[RelationCandidate],
    ) -> Result<Vec<String>> {
        Ok(self.replay_scores(self.lookup_text(text)?, candidates))
    }

    async fn score_document(
        &self,
        document: &Document,
        _spans: &[EntitySpan],
        candidates: &[RelationCandidate],
    ) -> Result<Vec<String>> {
        Ok(self.replay_scores(self.lookup(document)?, candidates))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ValidationErrorKind;
    use sentinel_core::{EntityTypeDef, RelationTypeDef};
    use tokio_test::{assert_err, assert_ok};

    fn registry() -> Arc<OntologyRegistry> {
        let entities = ["THREAT_ACTOR", "TOOL", "TARGET"]
            .into_iter()
            .map(EntityTypeDef::new)
            .collect();
        let relations = vec![
            RelationTypeDef::new("uses", ["THREAT_ACTOR"], ["TOOL"]),
            RelationTypeDef::new("targets", ["THREAT_ACTOR"], ["TARGET"]),
        ];
        Arc::new(OntologyRegistry::new(entities, relations).unwrap())
    }

    fn recorded() -> RecordedDocument {
        serde_json::from_str(
            r#"{
                "text": "APT29 used Cobalt Strike against Microsoft",
                "tokens": [
                    {"token": "APT29", "tag": "B-THREAT_ACTOR"},
                    {"token": "used", "tag": "O"},
                    {"token": "Cobalt", "tag": "B-TOOL"},
                    {"token": "Strike", "tag": "I-TOOL"},
                    {"token": "against", "tag": "O"},
                    {"token": "Microsoft", "tag": "B-TARGET"}
                ],
                "relations": [
                    {"source": 0, "target": 1, "relation": "uses"},
                    {"source": 0, "target": 2, "relation": "uses"}
                ]
            }"#,
        )
        .unwrap()
    }

    fn pipeline(inference: Arc<RecordedInference>, timeout_secs: u64) -> ExtractionPipeline {
        let config = InferenceConfig {
            timeout_secs,
            concurrency: 2,
        };
        ExtractionPipeline::new(registry(), inference.clone(), inference, &config)
    }

    #[tokio::test]
    async fn test_recorded_document_end_to_end() {
        let inference = Arc::new(RecordedInference::new(vec![recorded()], "no_relation"));
        let document = inference.documents()[0].clone();
        let pipeline = pipeline(inference, 5);

        let extraction = assert_ok!(pipeline.process(&document).await);

        let texts: Vec<&str> = extraction.spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["APT29", "Cobalt Strike", "Microsoft"]);
        assert_eq!(extraction.candidates, 6);
        assert_eq!(extraction.report.triples.len(), 1);
        assert_eq!(extraction.report.triples[0].object.text, "Cobalt Strike");
        assert_eq!(extraction.report.no_relation, 4);
        assert_eq!(
            extraction.report.errors[0].kind,
            ValidationErrorKind::InvalidRelationStructure {
                relation: "uses".to_string(),
                source_label: "THREAT_ACTOR".to_string(),
                target_label: "TARGET".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_document_fails_alone() {
        let inference = Arc::new(RecordedInference::new(vec![recorded()], "no_relation"));
        let known = inference.documents()[0].clone();
        let pipeline = pipeline(inference, 5);

        let outcomes = pipeline
            .process_batch(&[Document::new("never recorded"), known])
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(
            outcomes[0].1,
            Err(ExtractionError::Inference { stage: "tagging", .. })
        ));
        assert!(outcomes[1].1.is_ok());
    }

    #[tokio::test]
    async fn test_same_text_recordings_replay_separately() {
        let first = recorded();
        let mut second = recorded();
        second.relations = vec![RecordedRelation {
            source: 0,
            target: 2,
            relation: "targets".to_string(),
        }];

        let inference = Arc::new(RecordedInference::new(vec![first, second], "no_relation"));
        let documents = inference.documents().to_vec();
        assert_eq!(documents.len(), 2);
        assert_ne!(documents[0].id, documents[1].id);

        let outcomes = pipeline(inference, 5).process_batch(&documents).await;
        let predicates: Vec<Vec<String>> = outcomes
            .into_iter()
            .map(|(_, outcome)| {
                let extraction = outcome.unwrap();
                extraction
                    .report
                    .triples
                    .into_iter()
                    .map(|t| t.predicate)
                    .collect()
            })
            .collect();
        assert_eq!(
            predicates,
            vec![vec!["uses".to_string()], vec!["targets".to_string()]]
        );
    }

    struct SlowTagger;

    #[async_trait]
    impl TokenTagger for SlowTagger {
        async fn tag(&self, _text: &str) -> Result<Vec<TaggedToken>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
    }

    struct ShortScorer;

    #[async_trait]
    impl RelationScorer for ShortScorer {
        async fn score(
            &self,
            _text: &str,
            _spans: &[EntitySpan],
            _candidates: &[RelationCandidate],
        ) -> Result<Vec<String>> {
            Ok(vec!["uses".to_string()])
        }
    }

    #[tokio::test]
    async fn test_tagger_timeout_is_per_document_failure() {
        let mut pipeline = ExtractionPipeline::new(
            registry(),
            Arc::new(SlowTagger),
            Arc::new(ShortScorer),
            &InferenceConfig::default(),
        );
        pipeline.timeout = Duration::from_millis(20);

        let err = assert_err!(pipeline.process(&Document::new("APT29")).await);
        assert!(matches!(err, ExtractionError::Timeout { stage: "tagging", .. }));
    }

    #[tokio::test]
    async fn test_score_count_mismatch() {
        let inference = Arc::new(RecordedInference::new(vec![recorded()], "no_relation"));
        let document = inference.documents()[0].clone();
        let pipeline = ExtractionPipeline::new(
            registry(),
            inference,
            Arc::new(ShortScorer),
            &InferenceConfig::default(),
        );

        let err = assert_err!(pipeline.process(&document).await);
        assert!(matches!(
            err,
            ExtractionError::ScoreCountMismatch {
                expected: 6,
                actual: 1
            }
        ));
    }
}
