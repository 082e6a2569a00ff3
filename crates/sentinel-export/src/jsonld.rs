//! JSON-LD export
//!
//! Triples are grouped into one node object per subject, in first-appearance
//! order. Each predicate becomes a key holding the object text. When the same
//! subject and predicate repeat, the later object replaces the earlier one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sentinel_core::ExportConfig;
use serde_json::{json, Map, Value};

use crate::{validate_triples, write_output, ExportError, TextTriple};

/// Context resolving keys and ids under `namespace`
pub fn namespace_context(namespace: &str) -> Value {
    let base = format!("{}/", namespace.trim_end_matches(['#', '/']));
    json!({
        "@vocab": namespace,
        "@base": base
    })
}

/// Context for the default export namespace
pub fn default_context() -> Value {
    namespace_context(&ExportConfig::default().namespace)
}

/// Writes triples as a JSON-LD document with `@context` and `@graph`
#[derive(Debug, Clone)]
pub struct JsonLdExporter {
    context: Value,
}

impl Default for JsonLdExporter {
    fn default() -> Self {
        Self {
            context: default_context(),
        }
    }
}

impl JsonLdExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(context: Value) -> Self {
        Self { context }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::with_context(namespace_context(&config.namespace))
    }

    /// Build the JSON-LD document
    pub fn to_document(&self, triples: &[TextTriple]) -> Result<Value, ExportError> {
        validate_triples(triples)?;

        let mut nodes: Vec<Map<String, Value>> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for (s, p, o) in triples {
            let (subject, predicate, object) = (s.trim(), p.trim(), o.trim());
            // Keyword keys would clobber the node's own @id/@type
            if predicate.starts_with('@') {
                return Err(ExportError::InvalidPredicate {
                    predicate: p.clone(),
                });
            }

            let slot = *index.entry(subject).or_insert_with(|| {
                let mut node = Map::new();
                node.insert("@id".to_string(), Value::String(subject.to_string()));
                nodes.push(node);
                nodes.len() - 1
            });
            nodes[slot].insert(predicate.to_string(), Value::String(object.to_string()));
        }

        Ok(json!({
            "@context": self.context,
            "@graph": nodes,
        }))
    }

    /// Serialize to a pretty-printed JSON string
    pub fn to_json_string(&self, triples: &[TextTriple]) -> Result<String, ExportError> {
        let document = self.to_document(triples)?;
        serde_json::to_string_pretty(&document).map_err(|e| ExportError::Serialization(e.to_string()))
    }

    /// Serialize and write to `path`, returning the absolute path written
    #[tracing::instrument(skip(self, triples), fields(triples = triples.len()))]
    pub fn export(&self, triples: &[TextTriple], path: &Path) -> Result<PathBuf, ExportError> {
        let json = self.to_json_string(triples)?;
        write_output(path, &json)
    }
}

/// Recover `(subject, predicate, object)` triples from a document produced
/// by [`JsonLdExporter`]. Keys starting with `@` and non-string values are
/// skipped.
pub fn flatten(document: &Value) -> Vec<TextTriple> {
    let Some(graph) = document.get("@graph").and_then(Value::as_array) else {
        return Vec::new();
    };

    graph
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|node| {
            let subject = node.get("@id").and_then(Value::as_str).unwrap_or_default();
            node.iter()
                .filter(|(key, _)| !key.starts_with('@'))
                .filter_map(move |(predicate, object)| {
                    Some((
                        subject.to_string(),
                        predicate.clone(),
                        object.as_str()?.to_string(),
                    ))
                })
        })
        .collect()
}
