//! Sentinel Export - Linked-data serialization
//!
//! Serializes `(subject, predicate, object)` text triples as RDF/XML or
//! JSON-LD. Both formats reject an empty input and any triple with a blank
//! component before anything is written.
//!
//! Author: hephaex@gmail.com

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod jsonld;
pub mod rdf;

pub use jsonld::{default_context, flatten, namespace_context, JsonLdExporter};
pub use rdf::{RdfExporter, RdfObject};

/// A plain `(subject, predicate, object)` triple
pub type TextTriple = (String, String, String);

/// Export failure. Aborts the export call only.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("No triples provided")]
    EmptyInput,

    #[error("Invalid triples found: {offending:?}")]
    InvalidTriples { offending: Vec<(usize, TextTriple)> },

    #[error("Predicate {predicate:?} is not a valid property name")]
    InvalidPredicate { predicate: String },

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reject empty input and triples with a blank component. Offending triples
/// are listed with their input index.
pub fn validate_triples(triples: &[TextTriple]) -> Result<(), ExportError> {
    if triples.is_empty() {
        return Err(ExportError::EmptyInput);
    }

    let offending: Vec<(usize, TextTriple)> = triples
        .iter()
        .enumerate()
        .filter(|(_, (s, p, o))| [s, p, o].iter().any(|part| part.trim().is_empty()))
        .map(|(i, t)| (i, t.clone()))
        .collect();

    if offending.is_empty() {
        Ok(())
    } else {
        Err(ExportError::InvalidTriples { offending })
    }
}

/// Write `contents` to `path`, creating parent directories, and return the
/// absolute path written.
pub(crate) fn write_output(path: &Path, contents: &str) -> Result<PathBuf, ExportError> {
    let io_error = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, contents).map_err(io_error)?;
    let written = path.canonicalize().map_err(io_error)?;

    tracing::info!(path = %written.display(), bytes = contents.len(), "Export written");
    Ok(written)
}
