//! Extraction Integration Tests
//!
//! Runs the decoder, candidate generation and validator against the
//! ontology definitions shipped in `ontology/`.

use std::path::PathBuf;
use std::sync::Arc;

use sentinel_core::{InferenceConfig, OntologyConfig, OntologyRegistry, TripleNode};
use sentinel_extractor::{
    align_tokens, generate_candidates, ExtractionPipeline, RawPrediction, RecordedDocument,
    RecordedInference, SpanDecoder, TaggedToken, TripleValidator, ValidationErrorKind,
};

fn shipped_registry() -> Arc<OntologyRegistry> {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../ontology");
    let config = OntologyConfig {
        entities_path: dir.join("entities.json"),
        relations_path: dir.join("relations.json"),
        ..OntologyConfig::default()
    };
    Arc::new(OntologyRegistry::from_config(&config).expect("shipped ontology should load"))
}

fn tagged(text: &str, tokens: &[&str], tags: &[&str]) -> Vec<TaggedToken> {
    align_tokens(text, tokens)
        .into_iter()
        .zip(tokens.iter().zip(tags))
        .map(|(offset, (token, tag))| TaggedToken::new(*token, *tag, offset))
        .collect()
}

// =============================================================================
// Decoding → Validation
// =============================================================================

#[test]
fn test_decoded_spans_validate_into_triple() {
    let text = "The APT29 used Cobalt Strike";
    let tokens = tagged(
        text,
        &["The", "APT29", "used", "Cobalt", "Strike"],
        &["O", "B-THREAT_ACTOR", "O", "B-TOOL", "I-TOOL"],
    );

    let spans = SpanDecoder::new().decode(text, &tokens);
    assert_eq!(spans.len(), 2);
    assert_eq!((spans[0].label.as_str(), spans[0].text.as_str()), ("THREAT_ACTOR", "APT29"));
    assert_eq!((spans[1].label.as_str(), spans[1].text.as_str()), ("TOOL", "Cobalt Strike"));

    let candidates = generate_candidates(&spans);
    assert_eq!(candidates.len(), 2);

    let validator = TripleValidator::new(shipped_registry());
    let report = validator.validate(
        text,
        &[
            RawPrediction::new(spans[0].clone(), spans[1].clone(), "uses"),
            RawPrediction::new(spans[1].clone(), spans[0].clone(), "no_relation"),
        ],
    );

    assert!(report.errors.is_empty());
    assert_eq!(report.triples.len(), 1);
    let triple = &report.triples[0];
    assert_eq!(triple.subject, TripleNode::new("APT29", "THREAT_ACTOR"));
    assert_eq!(triple.predicate, "uses");
    assert_eq!(triple.object, TripleNode::new("Cobalt Strike", "TOOL"));
}

#[test]
fn test_shipped_ontology_rejects_uses_against_target() {
    let text = "APT29 compromised Microsoft";
    let tokens = tagged(
        text,
        &["APT29", "compromised", "Microsoft"],
        &["B-THREAT_ACTOR", "O", "B-TARGET"],
    );
    let spans = SpanDecoder::new().decode(text, &tokens);

    let validator = TripleValidator::new(shipped_registry());
    let report = validator.validate(
        text,
        &[RawPrediction::new(spans[0].clone(), spans[1].clone(), "uses")],
    );

    assert!(report.triples.is_empty());
    assert_eq!(report.errors.len(), 1);
    assert!(matches!(
        report.errors[0].kind,
        ValidationErrorKind::InvalidRelationStructure { .. }
    ));
}

// =============================================================================
// Recorded pipeline
// =============================================================================

#[tokio::test]
async fn test_recorded_batch_keeps_input_order() {
    let recorded: Vec<RecordedDocument> = serde_json::from_str(
        r#"[
            {
                "text": "Emotet exploits CVE-2021-34527",
                "tokens": [
                    {"token": "Emotet", "tag": "B-MALWARE"},
                    {"token": "exploits", "tag": "O"},
                    {"token": "CVE-2021-34527", "tag": "B-VULNERABILITY"}
                ],
                "relations": [{"source": 0, "target": 1, "relation": "exploits"}]
            },
            {
                "text": "Nothing to see here",
                "tokens": [
                    {"token": "Nothing", "tag": "O"},
                    {"token": "to", "tag": "O"},
                    {"token": "see", "tag": "O"},
                    {"token": "here", "tag": "O"}
                ]
            }
        ]"#,
    )
    .unwrap();

    let registry = shipped_registry();
    let inference = Arc::new(RecordedInference::new(
        recorded,
        registry.no_relation_label(),
    ));
    let documents = inference.documents().to_vec();
    let pipeline = ExtractionPipeline::new(
        registry,
        inference.clone(),
        inference,
        &InferenceConfig::default(),
    );

    let outcomes = pipeline.process_batch(&documents).await;
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].0, documents[0].id);
    assert_eq!(outcomes[1].0, documents[1].id);

    let first = outcomes[0].1.as_ref().unwrap();
    assert_eq!(first.report.triples.len(), 1);
    assert_eq!(
        first.report.triples[0].to_text_triple(),
        (
            "Emotet".to_string(),
            "exploits".to_string(),
            "CVE-2021-34527".to_string()
        )
    );
    assert_eq!(first.report.no_relation, 1);

    let second = outcomes[1].1.as_ref().unwrap();
    assert!(second.spans.is_empty());
    assert_eq!(second.candidates, 0);
    assert!(second.report.triples.is_empty());
}
