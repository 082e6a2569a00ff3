//! RDF/XML export
//!
//! Subjects and predicates become URIs under the configured namespace.
//! Objects are typed from their text: all ASCII digits give an
//! `xsd:integer`, digits around a single `.` give an `xsd:float`, anything
//! else is a URI under the namespace. Identical triples are written once and
//! statements are grouped per subject in first-appearance order.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use regex::Regex;
use sentinel_core::ExportConfig;

use crate::{validate_triples, write_output, ExportError, TextTriple};

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_FLOAT: &str = "http://www.w3.org/2001/XMLSchema#float";

/// XML element local names (NCName, ASCII subset)
static NCNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("Invalid regex")
});

/// The typed form of a triple's object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RdfObject {
    /// Canonical integer lexical form
    Integer(String),
    /// Float lexical form
    Float(String),
    /// Absolute URI
    Resource(String),
}

impl RdfObject {
    pub fn classify(value: &str, namespace: &str) -> Self {
        if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
            let trimmed = value.trim_start_matches('0');
            return Self::Integer(if trimmed.is_empty() { "0" } else { trimmed }.to_string());
        }

        let digits = value.replacen('.', "", 1);
        if value.contains('.') && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(parsed) = value.parse::<f64>() {
                return Self::Float(format!("{parsed:?}"));
            }
        }

        Self::Resource(resource_uri(namespace, value))
    }
}

fn resource_uri(namespace: &str, local: &str) -> String {
    format!("{namespace}{}", urlencoding::encode(local))
}

/// Writes triples as RDF/XML
#[derive(Debug, Clone)]
pub struct RdfExporter {
    namespace: String,
    prefix: String,
}

impl Default for RdfExporter {
    fn default() -> Self {
        Self::from_config(&ExportConfig::default())
    }
}

impl RdfExporter {
    pub fn new(namespace: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.namespace.as_str(), config.prefix.as_str())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Serialize to an RDF/XML string
    pub fn to_rdf_xml(&self, triples: &[TextTriple]) -> Result<String, ExportError> {
        validate_triples(triples)?;

        let mut subjects: Vec<(String, Vec<(&str, RdfObject)>)> = Vec::new();
        let mut subject_index: HashMap<String, usize> = HashMap::new();
        let mut seen: HashSet<(String, &str, RdfObject)> = HashSet::new();

        for (s, p, o) in triples {
            let predicate = p.trim();
            if !NCNAME.is_match(predicate) {
                return Err(ExportError::InvalidPredicate {
                    predicate: p.clone(),
                });
            }
            let subject = resource_uri(&self.namespace, s.trim());
            let object = RdfObject::classify(o.trim(), &self.namespace);

            if !seen.insert((subject.clone(), predicate, object.clone())) {
                continue;
            }
            let slot = *subject_index.entry(subject.clone()).or_insert_with(|| {
                subjects.push((subject, Vec::new()));
                subjects.len() - 1
            });
            subjects[slot].1.push((predicate, object));
        }

        self.write_document(&subjects)
            .map_err(|e| ExportError::Serialization(e.to_string()))
    }

    fn write_document(
        &self,
        subjects: &[(String, Vec<(&str, RdfObject)>)],
    ) -> quick_xml::Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

        let mut root = BytesStart::new("rdf:RDF");
        let xmlns = format!("xmlns:{}", self.prefix);
        root.push_attribute((xmlns.as_str(), self.namespace.as_str()));
        root.push_attribute(("xmlns:rdf", RDF_NS));
        writer.write_event(Event::Start(root))?;

        for (subject, statements) in subjects {
            let mut description = BytesStart::new("rdf:Description");
            description.push_attribute(("rdf:about", subject.as_str()));
            writer.write_event(Event::Start(description))?;

            for (predicate, object) in statements {
                let name = format!("{}:{predicate}", self.prefix);
                let mut element = BytesStart::new(name.as_str());
                let (datatype, lexical) = match object {
                    RdfObject::Resource(uri) => {
                        element.push_attribute(("rdf:resource", uri.as_str()));
                        writer.write_event(Event::Empty(element))?;
                        continue;
                    }
                    RdfObject::Integer(lexical) => (XSD_INTEGER, lexical),
                    RdfObject::Float(lexical) => (XSD_FLOAT, lexical),
                };
                element.push_attribute(("rdf:datatype", datatype));
                writer.write_event(Event::Start(element))?;
                writer.write_event(Event::Text(BytesText::new(lexical)))?;
                writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
            }

            writer.write_event(Event::End(BytesEnd::new("rdf:Description")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("rdf:RDF")))?;

        let mut xml = String::from_utf8(writer.into_inner())
            .map_err(|e| quick_xml::Error::NonDecodable(Some(e.utf8_error())))?;
        xml.push('\n');
        Ok(xml)
    }

    /// Serialize and write to `path`, returning the absolute path written
    #[tracing::instrument(skip(self, triples), fields(triples = triples.len()))]
    pub fn export(&self, triples: &[TextTriple], path: &Path) -> Result<PathBuf, ExportError> {
        let xml = self.to_rdf_xml(triples)?;
        write_output(path, &xml)
    }
}
