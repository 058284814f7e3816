//! Turtle serialisation through oxigraph's writer
//!
//! Statements are written in sorted order, so equal graphs always produce
//! byte-identical documents.

use super::{ns, Graph, ModelError};
use oxigraph::io::{RdfFormat, RdfSerializer};

/// Render the graph as a Turtle document
pub fn to_turtle(graph: &Graph) -> Result<String, ModelError> {
    let mut serializer = RdfSerializer::from_format(RdfFormat::Turtle);
    for (prefix, namespace) in ns::PREFIXES {
        serializer = serializer
            .with_prefix(prefix, namespace)
            .map_err(|e| ModelError::Prefix {
                prefix: prefix.to_string(),
                message: e.to_string(),
            })?;
    }

    let mut writer = serializer.for_writer(Vec::new());
    for triple in graph.sorted() {
        writer.serialize_triple(triple).map_err(ModelError::Serialize)?;
    }
    let bytes = writer.finish().map_err(ModelError::Serialize)?;

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::{blank, integer, literal, named, path_iri};
    use oxigraph::model::{NamedNode, Subject, Term};

    fn sample(reversed: bool) -> Graph {
        let file = path_iri("http://example.org/file/", "pkg/a.py");
        let mut statements: Vec<(Subject, NamedNode, Term)> = vec![
            (file.clone().into(), named(ns::RDF, "type"), named(ns::CODE, "File").into()),
            (file.into(), named(ns::CODE, "hasFunction"), blank("fn0").into()),
            (
                blank("fn0").into(),
                named(ns::FUNC, "hasDocstring"),
                literal("Say \"hi\"\nthen leave").into(),
            ),
            (blank("fn0").into(), named(ns::FUNC, "lineNumber"), integer(3).into()),
        ];
        if reversed {
            statements.reverse();
        }

        let mut graph = Graph::new();
        for (subject, predicate, object) in statements {
            graph.add(subject, predicate, object);
        }
        graph
    }

    #[test]
    fn test_document_uses_prefixes() {
        let doc = to_turtle(&sample(false)).unwrap();

        assert!(doc.contains("@prefix code: <http://example.org/code#> ."));
        assert!(doc.contains("code:hasFunction"));
        assert!(doc.contains("code:File"));
        assert!(doc.contains("<http://example.org/file/pkg/a.py>"));
        assert!(doc.contains("then leave"));
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        assert_eq!(
            to_turtle(&sample(false)).unwrap(),
            to_turtle(&sample(true)).unwrap()
        );
    }

    #[test]
    fn test_encoded_paths_survive() {
        let mut graph = Graph::new();
        let file = path_iri("http://example.org/file/", "my file.py");
        graph.add(file, named(ns::RDFS, "label"), literal("my file.py"));

        let doc = to_turtle(&graph).unwrap();
        assert!(doc.contains("<http://example.org/file/my%20file.py>"));
    }
}
