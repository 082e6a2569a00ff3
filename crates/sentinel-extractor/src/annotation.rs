//! Annotation validation
//!
//! Checks hand-annotated documents against the ontology before they are used
//! as training or evaluation data. Every problem is reported; nothing aborts.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use sentinel_core::OntologyRegistry;

/// An annotated entity (byte offsets into the document text)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedEntity {
    pub start: usize,
    pub end: usize,
    pub label: String,
}

impl AnnotatedEntity {
    /// Non-empty, in bounds, and not cutting a multi-byte character
    pub fn is_within(&self, text: &str) -> bool {
        self.start < self.end
            && self.end <= text.len()
            && text.is_char_boundary(self.start)
            && text.is_char_boundary(self.end)
    }
}

/// An annotated relation between two entities, by index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedRelation {
    pub source: usize,
    pub target: usize,
    #[serde(rename = "type")]
    pub relation_type: String,
}

/// One annotated document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedDocument {
    pub text: String,
    pub entities: Vec<AnnotatedEntity>,
    #[serde(default)]
    pub relations: Vec<AnnotatedRelation>,
}

/// A problem found in an annotated document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum AnnotationIssue {
    InvalidEntityLabel {
        entry: usize,
        label: String,
    },
    InvalidEntitySpan {
        entry: usize,
        start: usize,
        end: usize,
    },
    InvalidRelationType {
        entry: usize,
        relation: String,
    },
    InvalidRelationStructure {
        entry: usize,
        relation: String,
        source_label: String,
        target_label: String,
    },
    DanglingRelation {
        entry: usize,
        source: usize,
        target: usize,
    },
}

impl std::fmt::Display for AnnotationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEntityLabel { entry, label } => {
                write!(f, "[Entry {entry}] Invalid entity label: {label}")
            }
            Self::InvalidEntitySpan { entry, start, end } => {
                write!(f, "[Entry {entry}] Invalid entity span: [{start}, {end})")
            }
            Self::InvalidRelationType { entry, relation } => {
                write!(f, "[Entry {entry}] Invalid relation type: {relation}")
            }
            Self::InvalidRelationStructure {
                entry,
                relation,
                source_label,
                target_label,
            } => write!(
                f,
                "[Entry {entry}] Invalid relation structure: {relation} from {source_label} to {target_label}"
            ),
            Self::DanglingRelation {
                entry,
                source,
                target,
            } => write!(
                f,
                "[Entry {entry}] Relation points to invalid entity index ({source} -> {target})"
            ),
        }
    }
}

/// Validates annotated corpora against the ontology
pub struct AnnotationValidator {
    registry: Arc<OntologyRegistry>,
}

impl AnnotationValidator {
    pub fn new(registry: Arc<OntologyRegistry>) -> Self {
        Self { registry }
    }

    /// Validate every document, returning all issues in document order
    pub fn validate(&self, documents: &[AnnotatedDocument]) -> Vec<AnnotationIssue> {
        let issues: Vec<AnnotationIssue> = documents
            .iter()
            .enumerate()
            .flat_map(|(entry, doc)| self.validate_document(entry, doc))
            .collect();

        info!(
            documents = documents.len(),
            issues = issues.len(),
            "Annotation validation finished"
        );
        issues
    }

    fn validate_document(&self, entry: usize, doc: &AnnotatedDocument) -> Vec<AnnotationIssue> {
        let mut issues = Vec::new();

        for entity in &doc.entities {
            if !self.registry.is_valid_entity_type(&entity.label) {
                issues.push(AnnotationIssue::InvalidEntityLabel {
                    entry,
                    label: entity.label.clone(),
                });
            }
            if !entity.is_within(&doc.text) {
                issues.push(AnnotationIssue::InvalidEntitySpan {
                    entry,
                    start: entity.start,
                    end: entity.end,
                });
            }
        }

        for relation in &doc.relations {
            let (Some(source), Some(target)) = (
                doc.entities.get(relation.source),
                doc.entities.get(relation.target),
            ) else {
                issues.push(AnnotationIssue::DanglingRelation {
                    entry,
                    source: relation.source,
                    target: relation.target,
                });
                continue;
            };

            match self.registry.relation(&relation.relation_type) {
                None => issues.push(AnnotationIssue::InvalidRelationType {
                    entry,
                    relation: relation.relation_type.clone(),
                }),
                Some(def) if !(def.allows_source(&source.label) && def.allows_target(&target.label)) => {
                    issues.push(AnnotationIssue::InvalidRelationStructure {
                        entry,
                        relation: relation.relation_type.clone(),
                        source_label: source.label.clone(),
                        target_label: target.label.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::{EntityTypeDef, RelationTypeDef};

    fn validator() -> AnnotationValidator {
        let registry = OntologyRegistry::new(
            vec![
                EntityTypeDef::new("THREAT_ACTOR"),
                EntityTypeDef::new("MALWARE"),
                EntityTypeDef::new("VULNERABILITY"),
            ],
            vec![RelationTypeDef::new(
                "exploits",
                ["THREAT_ACTOR", "MALWARE"],
                ["VULNERABILITY"],
            )],
        )
        .unwrap();
        AnnotationValidator::new(Arc::new(registry))
    }

    fn document(json: &str) -> AnnotatedDocument {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_clean_document_has_no_issues() {
        let doc = document(
            r#"{
                "text": "Emotet exploits CVE-2021-34527",
                "entities": [
                    {"start": 0, "end": 6, "label": "MALWARE"},
                    {"start": 16, "end": 30, "label": "VULNERABILITY"}
                ],
                "relations": [{"source": 0, "target": 1, "type": "exploits"}]
            }"#,
        );
        assert!(validator().validate(&[doc]).is_empty());
    }

    #[test]
    fn test_reports_every_issue_kind() {
        let doc = document(
            r#"{
                "text": "Emotet exploits CVE-2021-34527",
                "entities": [
                    {"start": 0, "end": 6, "label": "MALWARE"},
                    {"start": 16, "end": 99, "label": "VULNERABILITY"},
                    {"start": 7, "end": 15, "label": "VERB"}
                ],
                "relations": [
                    {"source": 1, "target": 0, "type": "exploits"},
                    {"source": 0, "target": 1, "type": "patches"},
                    {"source": 0, "target": 7, "type": "exploits"}
                ]
            }"#,
        );

        let issues = validator().validate(&[doc]);
        assert_eq!(
            issues,
            vec![
                AnnotationIssue::InvalidEntitySpan {
                    entry: 0,
                    start: 16,
                    end: 99
                },
                AnnotationIssue::InvalidEntityLabel {
                    entry: 0,
                    label: "VERB".to_string()
                },
                AnnotationIssue::InvalidRelationStructure {
                    entry: 0,
                    relation: "exploits".to_string(),
                    source_label: "VULNERABILITY".to_string(),
                    target_label: "MALWARE".to_string(),
                },
                AnnotationIssue::InvalidRelationType {
                    entry: 0,
                    relation: "patches".to_string()
                },
                AnnotationIssue::DanglingRelation {
                    entry: 0,
                    source: 0,
                    target: 7
                },
            ]
        );
    }

    #[test]
    fn test_span_cutting_multibyte_char_is_invalid() {
        let doc = document(
            r#"{
                "text": "Café Emotet",
                "entities": [
                    {"start": 0, "end": 4, "label": "MALWARE"},
                    {"start": 6, "end": 12, "label": "MALWARE"}
                ]
            }"#,
        );

        assert_eq!(
            validator().validate(&[doc]),
            vec![AnnotationIssue::InvalidEntitySpan {
                entry: 0,
                start: 0,
                end: 4
            }]
        );
    }

    #[test]
    fn test_issue_display_names_entry() {
        let issue = AnnotationIssue::InvalidEntityLabel {
            entry: 2,
            label: "VERB".to_string(),
        };
        assert_eq!(issue.to_string(), "[Entry 2] Invalid entity label: VERB");
    }
}
