//! RDF export model backed by oxigraph
//!
//! The analyzer accumulates statements in an in-memory [`Graph`]. Flattened
//! string [`Triple`]s are what the triple-level differ consumes.

pub mod projection;
pub mod turtle;

pub use projection::Projector;

use oxigraph::model::vocab::xsd;
use oxigraph::model::{
    BlankNode, Graph as RdfGraph, Literal, NamedNode, NamedNodeRef, Subject, SubjectRef, Term,
    TermRef, Triple as RdfTriple, TripleRef,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Vocabulary namespaces
pub mod ns {
    pub const CODE: &str = "http://example.org/code#";
    pub const DIFF: &str = "http://example.org/diff#";
    pub const FUNC: &str = "http://example.org/function#";
    pub const CORRUPTION: &str = "http://example.org/corruption#";
    pub const PARSER: &str = "http://example.org/parser#";
    pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
    pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
    pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

    /// Prefix bindings declared in every Turtle document
    pub const PREFIXES: [(&str, &str); 8] = [
        ("code", CODE),
        ("corruption", CORRUPTION),
        ("diff", DIFF),
        ("func", FUNC),
        ("parser", PARSER),
        ("rdf", RDF),
        ("rdfs", RDFS),
        ("xsd", XSD),
    ];
}

/// Failures persisting the model
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid namespace for prefix '{prefix}': {message}")]
    Prefix { prefix: String, message: String },

    #[error("failed to serialize model as Turtle")]
    Serialize(#[source] std::io::Error),

    #[error("failed to write model to {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// IRI formed from a namespace and a plain local name
pub fn named(namespace: &str, local: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("{}{}", namespace, local))
}

/// IRI for `path` under `base`, percent-encoding what an IRI may not contain
pub fn path_iri(base: &str, path: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("{}{}", base, encode_path(path)))
}

/// IRI of a definition inside a file or class node
pub fn fragment_iri(owner: &NamedNode, name: &str) -> NamedNode {
    let separator = if owner.as_str().contains('#') { "." } else { "#" };
    NamedNode::new_unchecked(format!("{}{}{}", owner.as_str(), separator, encode_path(name)))
}

fn encode_path(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\' | ' ' | '#' | '%' => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    encoded.push_str(&format!("%{:02X}", byte));
                }
            }
            c if c.is_control() => encoded.push_str(&format!("%{:02X}", c as u32)),
            c => encoded.push(c),
        }
    }
    encoded
}

/// Blank node with a caller-chosen label made of ASCII letters and digits
pub fn blank(label: &str) -> BlankNode {
    BlankNode::new_unchecked(label)
}

pub fn literal(value: impl Into<String>) -> Literal {
    Literal::new_simple_literal(value)
}

pub fn integer(value: usize) -> Literal {
    Literal::new_typed_literal(value.to_string(), xsd::INTEGER)
}

pub fn boolean(value: bool) -> Literal {
    Literal::new_typed_literal(value.to_string(), xsd::BOOLEAN)
}

pub fn decimal(value: f64) -> Literal {
    Literal::new_typed_literal(format!("{:.2}", value), xsd::DECIMAL)
}

/// A statement flattened to the lexical forms of its terms
///
/// IRIs lose their angle brackets, blank nodes keep `_:` and literals keep
/// only their value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triple {
    pub fn new(subject: &str, predicate: &str, object: &str) -> Self {
        Self {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object: object.to_string(),
        }
    }
}

impl std::fmt::Display for Triple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.subject, self.predicate, self.object)
    }
}

impl From<TripleRef<'_>> for Triple {
    fn from(triple: TripleRef<'_>) -> Self {
        Self {
            subject: subject_lexical(triple.subject),
            predicate: triple.predicate.as_str().to_string(),
            object: term_lexical(triple.object),
        }
    }
}

fn subject_lexical(subject: SubjectRef<'_>) -> String {
    match subject {
        SubjectRef::NamedNode(node) => node.as_str().to_string(),
        SubjectRef::BlankNode(node) => format!("_:{}", node.as_str()),
        #[allow(unreachable_patterns)]
        other => other.to_string(),
    }
}

fn term_lexical(term: TermRef<'_>) -> String {
    match term {
        TermRef::NamedNode(node) => node.as_str().to_string(),
        TermRef::BlankNode(node) => format!("_:{}", node.as_str()),
        TermRef::Literal(literal) => literal.value().to_string(),
        #[allow(unreachable_patterns)]
        other => other.to_string(),
    }
}

/// In-memory set of statements
#[derive(Debug, Clone, Default)]
pub struct Graph {
    inner: RdfGraph,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a statement; duplicates are ignored
    pub fn add(
        &mut self,
        subject: impl Into<Subject>,
        predicate: impl Into<NamedNode>,
        object: impl Into<Term>,
    ) {
        self.inner.insert(&RdfTriple::new(subject, predicate, object));
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = TripleRef<'_>> {
        self.inner.iter()
    }

    /// Whether the exact statement is present
    pub fn contains(
        &self,
        subject: impl Into<Subject>,
        predicate: impl Into<NamedNode>,
        object: impl Into<Term>,
    ) -> bool {
        self.inner.contains(&RdfTriple::new(subject, predicate, object))
    }

    /// Objects of every statement with the given subject and predicate
    pub fn objects<'a>(
        &'a self,
        subject: SubjectRef<'a>,
        predicate: NamedNodeRef<'a>,
    ) -> impl Iterator<Item = TermRef<'a>> + 'a {
        self.inner
            .iter()
            .filter(move |t| t.subject == subject && t.predicate == predicate)
            .map(|t| t.object)
    }

    /// Merge another graph into this one
    pub fn extend(&mut self, other: Graph) {
        for triple in other.inner.iter() {
            self.inner.insert(triple);
        }
    }

    /// Statements ordered by their N-Triples form
    pub(crate) fn sorted(&self) -> Vec<TripleRef<'_>> {
        let mut triples: Vec<TripleRef<'_>> = self.inner.iter().collect();
        triples.sort_by_cached_key(|t| t.to_string());
        triples
    }

    /// All statements flattened to string triples, sorted
    pub fn triples(&self) -> Vec<Triple> {
        let mut triples: Vec<Triple> = self.inner.iter().map(Triple::from).collect();
        triples.sort();
        triples
    }

    /// Flattened statements reachable from `root` by following objects
    ///
    /// Blank nodes hanging off the root (arguments, decorators, imports) are
    /// included; unrelated subjects are not.
    pub fn triples_reachable_from(&self, root: &str) -> Vec<Triple> {
        let triples = self.triples();
        let mut by_subject: HashMap<&str, Vec<&Triple>> = HashMap::new();
        for triple in &triples {
            by_subject.entry(triple.subject.as_str()).or_default().push(triple);
        }

        let mut reached: HashSet<&str> = HashSet::from([root]);
        let mut pending = vec![root];
        let mut selected = Vec::new();
        while let Some(subject) = pending.pop() {
            for triple in by_subject.get(subject).into_iter().flatten() {
                selected.push((*triple).clone());
                let object = triple.object.as_str();
                if by_subject.contains_key(object) && reached.insert(object) {
                    pending.push(object);
                }
            }
        }

        selected.sort();
        selected
    }

    /// Serialise as Turtle to `path`
    pub fn save_turtle(&self, path: &Path) -> Result<(), ModelError> {
        let document = turtle::to_turtle(self)?;
        std::fs::write(path, document).map_err(|source| ModelError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_deduplicates_and_flattens() {
        let mut graph = Graph::new();
        let file = path_iri("http://example.org/file/", "a.py");
        let has_function = named(ns::CODE, "hasFunction");
        graph.add(file.clone(), has_function.clone(), blank("f1"));
        graph.add(file.clone(), has_function.clone(), blank("f1"));
        graph.add(blank("f1"), named(ns::RDFS, "label"), literal("main"));

        assert_eq!(graph.len(), 2);
        assert!(graph.contains(file.clone(), has_function.clone(), blank("f1")));
        assert_eq!(graph.objects(file.as_ref().into(), has_function.as_ref()).count(), 1);
        assert!(graph.triples().contains(&Triple::new(
            "_:f1",
            "http://www.w3.org/2000/01/rdf-schema#label",
            "main"
        )));
    }

    #[test]
    fn test_typed_literals_flatten_to_value() {
        let mut graph = Graph::new();
        let node = blank("a");
        graph.add(node.clone(), named(ns::FUNC, "lineNumber"), integer(7));
        graph.add(node.clone(), named(ns::PARSER, "confidence"), decimal(0.8));
        graph.add(node, named(ns::DIFF, "hasFunctionalLoss"), boolean(true));

        let objects: Vec<String> = graph.triples().into_iter().map(|t| t.object).collect();
        assert!(objects.contains(&"7".to_string()));
        assert!(objects.contains(&"0.80".to_string()));
        assert!(objects.contains(&"true".to_string()));
    }

    #[test]
    fn test_extend_merges() {
        let mut left = Graph::new();
        left.add(blank("a"), named(ns::FUNC, "lineNumber"), integer(1));
        let mut right = Graph::new();
        right.add(blank("b"), named(ns::FUNC, "lineNumber"), integer(2));
        right.add(blank("a"), named(ns::FUNC, "lineNumber"), integer(1));
        left.extend(right);
        assert_eq!(left.len(), 2);
    }

    #[test]
    fn test_reachable_follows_blank_nodes() {
        let mut graph = Graph::new();
        let file = path_iri("http://example.org/file/", "a.py");
        let func = fragment_iri(&file, "f");
        graph.add(file.clone(), named(ns::CODE, "hasFunction"), func.clone());
        graph.add(func.clone(), named(ns::FUNC, "hasArgument"), blank("arg1"));
        graph.add(blank("arg1"), named(ns::RDFS, "label"), literal("x"));
        graph.add(blank("elsewhere"), named(ns::RDFS, "label"), literal("y"));

        let reached = graph.triples_reachable_from(file.as_str());
        assert_eq!(reached.len(), 3);
        assert!(reached.contains(&Triple::new(
            "_:arg1",
            "http://www.w3.org/2000/01/rdf-schema#label",
            "x"
        )));
        assert!(!reached.iter().any(|t| t.subject == "_:elsewhere"));
    }

    #[test]
    fn test_iri_encoding() {
        let file = path_iri("http://example.org/file/", "my dir/a#b.py");
        assert_eq!(file.as_str(), "http://example.org/file/my%20dir/a%23b.py");

        let class = fragment_iri(&file, "Store");
        assert_eq!(class.as_str(), "http://example.org/file/my%20dir/a%23b.py#Store");
        assert_eq!(
            fragment_iri(&class, "get").as_str(),
            "http://example.org/file/my%20dir/a%23b.py#Store.get"
        );
    }

    #[test]
    fn test_save_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("model.ttl");
        let err = Graph::new().save_turtle(&path).unwrap_err();
        assert!(matches!(err, ModelError::Write { .. }));
    }
}
