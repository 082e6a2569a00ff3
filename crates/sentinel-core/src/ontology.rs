//! Ontology registry
//!
//! Entity and relation type definitions loaded once at startup from JSON
//! documents. The registry is immutable after construction and is shared by
//! reference (usually behind an `Arc`) with every component that validates
//! against it.
//!
//! Definition documents:
//!
//! ```json
//! { "entity_types": [ { "name": "THREAT_ACTOR" }, { "name": "TOOL" } ] }
//! { "relation_types": [ { "name": "uses", "source": ["THREAT_ACTOR"], "target": ["TOOL"] } ] }
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ConfigError, OntologyConfig};

/// Relation label the relation classifier emits when a pair is unrelated
pub const DEFAULT_NO_RELATION: &str = "no_relation";

/// Entity type definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeDef {
    /// Unique type name (e.g., "THREAT_ACTOR")
    pub name: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EntityTypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Relation type definition with its domain/range constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationTypeDef {
    /// Unique relation name (e.g., "uses")
    pub name: String,

    /// Entity types allowed as subject
    #[serde(rename = "source")]
    pub allowed_sources: BTreeSet<String>,

    /// Entity types allowed as object
    #[serde(rename = "target")]
    pub allowed_targets: BTreeSet<String>,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RelationTypeDef {
    pub fn new<S, T>(name: impl Into<String>, sources: S, targets: T) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            name: name.into(),
            allowed_sources: sources.into_iter().map(Into::into).collect(),
            allowed_targets: targets.into_iter().map(Into::into).collect(),
            description: None,
        }
    }

    pub fn allows_source(&self, entity_type: &str) -> bool {
        self.allowed_sources.contains(entity_type)
    }

    pub fn allows_target(&self, entity_type: &str) -> bool {
        self.allowed_targets.contains(entity_type)
    }
}

/// Shape shared by both definition documents; a file may carry either key
/// or both.
#[derive(Debug, Default, Deserialize)]
struct OntologyDocument {
    #[serde(default)]
    entity_types: Option<Vec<EntityTypeDef>>,
    #[serde(default)]
    relation_types: Option<Vec<RelationTypeDef>>,
}

/// Read-only index over the ontology.
///
/// Safe for unsynchronized concurrent reads; there is no interior mutability.
#[derive(Debug, Clone)]
pub struct OntologyRegistry {
    entity_types: Vec<EntityTypeDef>,
    relation_types: Vec<RelationTypeDef>,
    entity_index: HashMap<String, usize>,
    relation_index: HashMap<String, usize>,
    no_relation: String,
    sources: Vec<PathBuf>,
}

impl OntologyRegistry {
    /// Build a registry from definitions, checking uniqueness and that every
    /// relation only references defined entity types.
    pub fn new(
        entity_types: Vec<EntityTypeDef>,
        relation_types: Vec<RelationTypeDef>,
    ) -> Result<Self, ConfigError> {
        let mut entity_index = HashMap::with_capacity(entity_types.len());
        for (i, def) in entity_types.iter().enumerate() {
            if def.name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "entity_types.name".to_string(),
                    value: def.name.clone(),
                });
            }
            if entity_index.insert(def.name.clone(), i).is_some() {
                return Err(ConfigError::DuplicateDefinition {
                    kind: "entity type",
                    name: def.name.clone(),
                });
            }
        }

        let mut relation_index = HashMap::with_capacity(relation_types.len());
        for (i, def) in relation_types.iter().enumerate() {
            if def.name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "relation_types.name".to_string(),
                    value: def.name.clone(),
                });
            }
            if relation_index.insert(def.name.clone(), i).is_some() {
                return Err(ConfigError::DuplicateDefinition {
                    kind: "relation type",
                    name: def.name.clone(),
                });
            }
            let undefined = def
                .allowed_sources
                .iter()
                .chain(def.allowed_targets.iter())
                .find(|t| !entity_index.contains_key(t.as_str()));
            if let Some(entity_type) = undefined {
                return Err(ConfigError::UndefinedEntityType {
                    relation: def.name.clone(),
                    entity_type: entity_type.clone(),
                });
            }
        }

        Ok(Self {
            entity_types,
            relation_types,
            entity_index,
            relation_index,
            no_relation: DEFAULT_NO_RELATION.to_string(),
            sources: Vec::new(),
        })
    }

    /// Load from the two definition documents named in the configuration
    pub fn from_config(config: &OntologyConfig) -> Result<Self, ConfigError> {
        let registry = Self::load_files([&config.entities_path, &config.relations_path])?;
        Ok(registry.with_no_relation_label(config.no_relation_label.clone()))
    }

    /// Load from a list of definition documents. Each document contributes
    /// whichever of `entity_types` / `relation_types` it carries.
    pub fn load_files<I, P>(paths: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut entity_types = Vec::new();
        let mut relation_types = Vec::new();
        let mut sources = Vec::new();

        for path in paths {
            let path = path.as_ref().to_path_buf();
            let content =
                std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
                    path: path.clone(),
                    source: e,
                })?;
            let document = parse_document(&path, &content)?;
            debug!(path = %path.display(), "Loaded ontology document");

            entity_types.extend(document.entity_types.unwrap_or_default());
            relation_types.extend(document.relation_types.unwrap_or_default());
            sources.push(path);
        }

        let mut registry = Self::new(entity_types, relation_types)?;
        registry.sources = sources;
        info!(
            entity_types = registry.entity_types.len(),
            relation_types = registry.relation_types.len(),
            "Ontology registry loaded"
        );
        Ok(registry)
    }

    /// Build from in-memory JSON documents
    pub fn from_json(entities_json: &str, relations_json: &str) -> Result<Self, ConfigError> {
        let inline = PathBuf::from("<inline>");
        let entities = parse_document(&inline, entities_json)?;
        let relations = parse_document(&inline, relations_json)?;

        let entity_types = entities
            .entity_types
            .into_iter()
            .chain(relations.entity_types)
            .flatten()
            .collect();
        let relation_types = entities
            .relation_types
            .into_iter()
            .chain(relations.relation_types)
            .flatten()
            .collect();

        Self::new(entity_types, relation_types)
    }

    /// Override the "no relation" sentinel label
    pub fn with_no_relation_label(mut self, label: impl Into<String>) -> Self {
        self.no_relation = label.into();
        self
    }

    /// Whether `name` is a registered entity type
    pub fn is_valid_entity_type(&self, name: &str) -> bool {
        self.entity_index.contains_key(name)
    }

    /// Whether `name` is a registered relation whose constraints admit the
    /// given source and target entity types
    pub fn is_valid_relation(&self, name: &str, source_type: &str, target_type: &str) -> bool {
        self.relation(name)
            .map(|r| r.allows_source(source_type) && r.allows_target(target_type))
            .unwrap_or(false)
    }

    /// Look up a relation definition
    pub fn relation(&self, name: &str) -> Option<&RelationTypeDef> {
        self.relation_index
            .get(name)
            .map(|&i| &self.relation_types[i])
    }

    /// Relation definitions in declaration order
    pub fn relation_types(&self) -> impl Iterator<Item = &RelationTypeDef> {
        self.relation_types.iter()
    }

    /// Entity definitions in declaration order
    pub fn entity_types(&self) -> impl Iterator<Item = &EntityTypeDef> {
        self.entity_types.iter()
    }

    /// Whether `name` is the "no relation" sentinel
    pub fn is_no_relation(&self, name: &str) -> bool {
        name == self.no_relation
    }

    pub fn no_relation_label(&self) -> &str {
        &self.no_relation
    }

    /// Files the registry was loaded from (empty for in-memory registries)
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }
}

fn parse_document(path: &Path, content: &str) -> Result<OntologyDocument, ConfigError> {
    let document: OntologyDocument =
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    if document.entity_types.is_none() && document.relation_types.is_none() {
        return Err(ConfigError::ParseError {
            path: path.to_path_buf(),
            message: "expected an `entity_types` or `relation_types` array".to_string(),
        });
    }
    Ok(document)
}

// ============================================================================
// Tests
// ============================================================================
