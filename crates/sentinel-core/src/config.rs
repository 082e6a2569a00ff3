//! Sentinel Configuration Management
//!
//! Handles configuration from environment variables and TOML config files
//! with sensible defaults for local development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Ontology definition sources
    pub ontology: OntologyConfig,

    /// Graph store connection and ingestion settings
    pub graph: GraphConfig,

    /// Model inference collaborator settings
    pub inference: InferenceConfig,

    /// Linked-data export settings
    pub export: ExportConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_override()
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Merge with environment variables. Every variable that is set wins
    /// over the current value, whatever that value is.
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        // Ontology
        if let Some(path) = env_var("SENTINEL_ONTOLOGY_ENTITIES") {
            self.ontology.entities_path = PathBuf::from(path);
        }
        if let Some(path) = env_var("SENTINEL_ONTOLOGY_RELATIONS") {
            self.ontology.relations_path = PathBuf::from(path);
        }
        if let Some(label) = env_var("SENTINEL_NO_RELATION_LABEL") {
            self.ontology.no_relation_label = label;
        }

        // Graph store
        if let Some(backend) = env_var("SENTINEL_GRAPH_BACKEND") {
            self.graph.backend = backend.parse()?;
        }
        if let Some(url) = env_var("SURREALDB_URL") {
            self.graph.surrealdb_url = url;
        }
        if let Some(user) = env_var("SURREALDB_USER") {
            self.graph.surrealdb_user = user;
        }
        if let Some(pass) = env_var("SURREALDB_PASS") {
            self.graph.surrealdb_pass = pass;
        }
        if let Some(namespace) = env_var("SURREALDB_NAMESPACE") {
            self.graph.surrealdb_namespace = namespace;
        }
        if let Some(database) = env_var("SURREALDB_DATABASE") {
            self.graph.surrealdb_database = database;
        }
        if let Some(workers) = env_var("SENTINEL_GRAPH_WORKERS") {
            self.graph.workers = parse_env("SENTINEL_GRAPH_WORKERS", workers)?;
        }
        if let Some(secs) = env_var("SENTINEL_GRAPH_TIMEOUT_SECS") {
            self.graph.timeout_secs = parse_env("SENTINEL_GRAPH_TIMEOUT_SECS", secs)?;
        }

        // Inference
        if let Some(secs) = env_var("SENTINEL_INFERENCE_TIMEOUT_SECS") {
            self.inference.timeout_secs = parse_env("SENTINEL_INFERENCE_TIMEOUT_SECS", secs)?;
        }
        if let Some(concurrency) = env_var("SENTINEL_INFERENCE_CONCURRENCY") {
            self.inference.concurrency =
                parse_env("SENTINEL_INFERENCE_CONCURRENCY", concurrency)?;
        }

        // Export
        if let Some(namespace) = env_var("SENTINEL_EXPORT_NAMESPACE") {
            self.export.namespace = namespace;
        }
        if let Some(prefix) = env_var("SENTINEL_EXPORT_PREFIX") {
            self.export.prefix = prefix;
        }
        if let Some(dir) = env_var("SENTINEL_EXPORT_DIR") {
            self.export.output_dir = PathBuf::from(dir);
        }

        // Logging
        if let Some(level) = env_var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = env_var("LOG_JSON") {
            self.logging.json_format = parse_env("LOG_JSON", json)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.graph.workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "graph.workers".to_string(),
                value: "0".to_string(),
            });
        }
        if self.inference.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "inference.concurrency".to_string(),
                value: "0".to_string(),
            });
        }
        if self.ontology.no_relation_label.trim().is_empty() {
            return Err(ConfigError::MissingRequired(
                "ontology.no_relation_label".to_string(),
            ));
        }
        if self.export.namespace.trim().is_empty() {
            return Err(ConfigError::MissingRequired("export.namespace".to_string()));
        }
        Ok(())
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Ontology definition sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OntologyConfig {
    /// JSON document with an `entity_types` array
    pub entities_path: PathBuf,

    /// JSON document with a `relation_types` array
    pub relations_path: PathBuf,

    /// Relation label meaning "no relation" in model output
    pub no_relation_label: String,
}

impl Default for OntologyConfig {
    fn default() -> Self {
        Self {
            entities_path: PathBuf::from("ontology/entities.json"),
            relations_path: PathBuf::from("ontology/relations.json"),
            no_relation_label: crate::ontology::DEFAULT_NO_RELATION.to_string(),
        }
    }
}

/// Graph store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Which backend to connect to
    pub backend: GraphBackend,

    /// SurrealDB WebSocket URL
    pub surrealdb_url: String,

    /// SurrealDB username
    pub surrealdb_user: String,

    /// SurrealDB password
    pub surrealdb_pass: String,

    /// SurrealDB namespace
    pub surrealdb_namespace: String,

    /// SurrealDB database name
    pub surrealdb_database: String,

    /// Number of concurrent ingestion workers
    pub workers: usize,

    /// Per-operation timeout in seconds
    pub timeout_secs: u64,
}

impl GraphConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: GraphBackend::Memory,
            surrealdb_url: "ws://localhost:8000".to_string(),
            surrealdb_user: "root".to_string(),
            surrealdb_pass: "root".to_string(),
            surrealdb_namespace: "sentinel".to_string(),
            surrealdb_database: "cti".to_string(),
            workers: 4,
            timeout_secs: 10,
        }
    }
}

/// Supported graph store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackend {
    Memory,
    SurrealDb,
}

impl std::str::FromStr for GraphBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "surrealdb" | "surreal" => Ok(Self::SurrealDb),
            _ => Err(ConfigError::InvalidValue {
                key: "SENTINEL_GRAPH_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Model inference collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Timeout for a single tagging or scoring call, in seconds
    pub timeout_secs: u64,

    /// Documents processed concurrently
    pub concurrency: usize,
}

impl InferenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            concurrency: 4,
        }
    }
}

/// Linked-data export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Namespace URI that subjects, predicates and URI objects resolve under
    pub namespace: String,

    /// XML prefix bound to the namespace
    pub prefix: String,

    /// Directory for exports written without an explicit path
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            namespace: "http://example.org/cyber#".to_string(),
            prefix: "cyber".to_string(),
            output_dir: PathBuf::from("output"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Relation type '{relation}' references undefined entity type '{entity_type}'")]
    UndefinedEntityType {
        relation: String,
        entity_type: String,
    },

    #[error("Duplicate {kind} definition: {name}")]
    DuplicateDefinition { kind: &'static str, name: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.graph.backend, GraphBackend::Memory);
        assert_eq!(config.graph.workers, 4);
        assert_eq!(config.graph.timeout(), Duration::from_secs(10));
        assert_eq!(config.export.namespace, "http://example.org/cyber#");
        assert_eq!(config.export.prefix, "cyber");
        assert_eq!(config.ontology.no_relation_label, "no_relation");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_graph_backend_parse() {
        assert_eq!(
            "memory".parse::<GraphBackend>().unwrap(),
            GraphBackend::Memory
        );
        assert_eq!(
            "SurrealDB".parse::<GraphBackend>().unwrap(),
            GraphBackend::SurrealDb
        );
        assert!("neo4j".parse::<GraphBackend>().is_err());
    }

    #[test]
    fn test_from_file_partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[graph]\nbackend = \"surrealdb\"\nworkers = 8\n\n[export]\nprefix = \"cti\""
        )
        .unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.graph.backend, GraphBackend::SurrealDb);
        assert_eq!(config.graph.workers, 8);
        assert_eq!(config.graph.timeout_secs, 10);
        assert_eq!(config.export.prefix, "cti");
        assert_eq!(config.export.namespace, "http://example.org/cyber#");
    }

    #[test]
    fn test_from_file_rejects_zero_workers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[graph]\nworkers = 0").unwrap();

        let err = PipelineConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_env_overrides_file_even_with_default_value() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[graph]\nworkers = 8\nsurrealdb_database = \"intel\"\n\n[inference]\nconcurrency = 2"
        )
        .unwrap();

        // 4 is the built-in default for both settings
        std::env::set_var("SENTINEL_GRAPH_WORKERS", "4");
        std::env::set_var("SENTINEL_INFERENCE_CONCURRENCY", "4");
        std::env::set_var("SURREALDB_NAMESPACE", "soc");
        let config = PipelineConfig::from_file(file.path())
            .and_then(PipelineConfig::with_env_override);
        std::env::remove_var("SENTINEL_GRAPH_WORKERS");
        std::env::remove_var("SENTINEL_INFERENCE_CONCURRENCY");
        std::env::remove_var("SURREALDB_NAMESPACE");

        let config = config.unwrap();
        assert_eq!(config.graph.workers, 4);
        assert_eq!(config.inference.concurrency, 4);
        assert_eq!(config.graph.surrealdb_namespace, "soc");
        assert_eq!(config.graph.surrealdb_database, "intel");
    }

    #[test]
    fn test_from_file_missing() {
        let err = PipelineConfig::from_file("/nonexistent/sentinel.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }

    #[test]
    fn test_from_file_malformed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[graph\nworkers = ").unwrap();

        let err = PipelineConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
