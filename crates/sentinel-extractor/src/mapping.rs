//! Ontology mapping
//!
//! Attaches entity types to plain `(subject, predicate, object)` text triples
//! using an entity-label lookup. Mapping only labels; types and predicates
//! unknown to the ontology are reported, not rejected.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sentinel_core::{OntologyRegistry, Triple, TripleNode};

/// Type assigned to entities missing from the label lookup
pub const UNKNOWN_TYPE: &str = "UNKNOWN";

/// A text triple in either of the accepted input shapes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTriple {
    Tuple(String, String, String),
    Object {
        source: String,
        predicate: String,
        target: String,
    },
}

impl RawTriple {
    pub fn parts(&self) -> (&str, &str, &str) {
        match self {
            Self::Tuple(s, p, o) => (s.as_str(), p.as_str(), o.as_str()),
            Self::Object {
                source,
                predicate,
                target,
            } => (source.as_str(), predicate.as_str(), target.as_str()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTriplesDocument {
    Graph {
        #[serde(rename = "@graph")]
        graph: Vec<RawTriple>,
    },
    List(Vec<RawTriple>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EntityLabelsDocument {
    Map(HashMap<String, String>),
    List(Vec<HashMap<String, String>>),
}

/// Parse raw triples from a bare array or an object with an `@graph` array
pub fn parse_raw_triples(json: &str) -> serde_json::Result<Vec<RawTriple>> {
    Ok(match serde_json::from_str(json)? {
        RawTriplesDocument::Graph { graph } => graph,
        RawTriplesDocument::List(list) => list,
    })
}

/// Parse an entity label lookup from an object or a list of objects (later
/// entries win)
pub fn parse_entity_labels(json: &str) -> serde_json::Result<HashMap<String, String>> {
    Ok(match serde_json::from_str(json)? {
        EntityLabelsDocument::Map(map) => map,
        EntityLabelsDocument::List(list) => list.into_iter().flatten().collect(),
    })
}

/// Result of a mapping run
#[derive(Debug, Clone, Default)]
pub struct MappingReport {
    pub triples: Vec<Triple>,
    /// Entity types assigned that the ontology does not define
    pub unknown_entity_types: BTreeSet<String>,
    /// Predicates the ontology does not define
    pub unknown_relations: BTreeSet<String>,
}

/// Maps text triples to typed triples
pub struct TripleMapper {
    registry: Arc<OntologyRegistry>,
    entity_labels: HashMap<String, String>,
}

impl TripleMapper {
    pub fn new(registry: Arc<OntologyRegistry>, entity_labels: HashMap<String, String>) -> Self {
        Self {
            registry,
            entity_labels,
        }
    }

    fn node(&self, text: &str, report: &mut MappingReport) -> TripleNode {
        let text = text.trim();
        let entity_type = self
            .entity_labels
            .get(text)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_TYPE);
        if !self.registry.is_valid_entity_type(entity_type) {
            report.unknown_entity_types.insert(entity_type.to_string());
        }
        TripleNode::new(text, entity_type)
    }

    pub fn map(&self, raw: &[RawTriple]) -> MappingReport {
        let mut report = MappingReport::default();

        for triple in raw {
            let (s, p, o) = triple.parts();
            let subject = self.node(s, &mut report);
            let object = self.node(o, &mut report);
            let predicate = p.trim();
            if self.registry.relation(predicate).is_none() {
                report.unknown_relations.insert(predicate.to_string());
            }
            report.triples.push(Triple::new(subject, predicate, object));
        }

        if !report.unknown_entity_types.is_empty() {
            warn!(types = ?report.unknown_entity_types, "Mapped entity types missing from ontology");
        }
        if !report.unknown_relations.is_empty() {
            warn!(relations = ?report.unknown_relations, "Mapped predicates missing from ontology");
        }
        info!(triples = report.triples.len(), "Mapping finished");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::{EntityTypeDef, RelationTypeDef};

    fn mapper(labels: &str) -> TripleMapper {
        let registry = OntologyRegistry::new(
            vec![EntityTypeDef::new("THREAT_ACTOR"), EntityTypeDef::new("TOOL")],
            vec![RelationTypeDef::new("uses", ["THREAT_ACTOR"], ["TOOL"])],
        )
        .unwrap();
        TripleMapper::new(Arc::new(registry), parse_entity_labels(labels).unwrap())
    }

    #[test]
    fn test_parse_graph_document_with_both_shapes() {
        let raw = parse_raw_triples(
            r#"{"@graph": [
                ["APT29", "uses", "Mimikatz"],
                {"@id": "cti:1", "source": "Emotet", "predicate": "targets", "target": "Microsoft"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0].parts(), ("APT29", "uses", "Mimikatz"));
        assert_eq!(raw[1].parts(), ("Emotet", "targets", "Microsoft"));
    }

    #[test]
    fn test_parse_bare_list() {
        let raw = parse_raw_triples(r#"[["APT29", "uses", "Mimikatz"]]"#).unwrap();
        assert_eq!(raw.len(), 1);
    }

    #[test]
    fn test_parse_entity_labels_list_form() {
        let labels =
            parse_entity_labels(r#"[{"APT29": "THREAT_ACTOR"}, {"Mimikatz": "TOOL"}]"#).unwrap();
        assert_eq!(labels.get("Mimikatz").map(String::as_str), Some("TOOL"));
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn test_map_assigns_types_and_reports_unknowns() {
        let mapper = mapper(r#"{"APT29": "THREAT_ACTOR", "Mimikatz": "TOOL"}"#);
        let raw = vec![
            RawTriple::Tuple("APT29".into(), "uses".into(), "Mimikatz".into()),
            RawTriple::Tuple("APT29".into(), "targets".into(), "Microsoft".into()),
        ];

        let report = mapper.map(&raw);
        assert_eq!(report.triples.len(), 2);
        assert_eq!(report.triples[0].subject.entity_type, "THREAT_ACTOR");
        assert_eq!(report.triples[0].object.entity_type, "TOOL");
        assert_eq!(report.triples[1].object.entity_type, UNKNOWN_TYPE);
        assert!(report.unknown_entity_types.contains(UNKNOWN_TYPE));
        assert!(report.unknown_relations.contains("targets"));
    }
}
