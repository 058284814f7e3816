//! Projection of artifacts and structural diffs into a [`Graph`]
//!
//! Blank node labels are derived from their owner and content, so projecting
//! the same artifact twice yields identical statements.

use super::{boolean, decimal, fragment_iri, integer, literal, named, ns, path_iri, Graph};
use crate::diff::StructuralDiff;
use crate::extract::{content_hash, ClassSignature, FileArtifact, FunctionSignature};
use oxigraph::model::{BlankNode, NamedNode};

const FILE_BASE: &str = "http://example.org/file/";
const COMMIT_BASE: &str = "http://example.org/commit/";
const DIFF_BASE: &str = "http://example.org/diff/";

fn rdf_type() -> NamedNode {
    named(ns::RDF, "type")
}

fn label() -> NamedNode {
    named(ns::RDFS, "label")
}

/// Content-derived blank node
fn blank(owner: &NamedNode, kind: &str, content: &str) -> BlankNode {
    let hash = content_hash(&format!("{}\u{0}{}\u{0}{}", owner.as_str(), kind, content));
    super::blank(&format!("{}{}", kind, &hash[..16]))
}

/// Builds statements for artifacts
///
/// A commit-scoped projector keeps two revisions of the same file apart in
/// one graph; a neutral projector gives both revisions the same URIs so their
/// triples can be compared.
#[derive(Debug, Clone, Default)]
pub struct Projector {
    commit: Option<String>,
}

impl Projector {
    /// URIs independent of any commit
    pub fn neutral() -> Self {
        Self { commit: None }
    }

    /// URIs qualified by `commit`
    pub fn at_commit(commit: &str) -> Self {
        Self {
            commit: Some(commit.to_string()),
        }
    }

    pub fn file_uri(&self, path: &str) -> NamedNode {
        match &self.commit {
            Some(commit) => path_iri(COMMIT_BASE, &format!("{}/file/{}", commit, path)),
            None => path_iri(FILE_BASE, path),
        }
    }

    /// Add the artifact's statements and return the file node
    pub fn project_artifact(&self, artifact: &FileArtifact, graph: &mut Graph) -> NamedNode {
        let file = self.file_uri(artifact.path());
        graph.add(file.clone(), rdf_type(), named(ns::CODE, "PythonFile"));
        graph.add(file.clone(), label(), literal(artifact.path()));
        graph.add(file.clone(), named(ns::CODE, "path"), literal(artifact.path()));
        if let Some(parser) = artifact.selected_parser() {
            graph.add(file.clone(), named(ns::PARSER, "parsedWith"), literal(parser.to_string()));
        }

        for function in artifact.functions() {
            let uri = fragment_iri(&file, &function.name);
            self.project_function(function, &uri, &file, graph);
            graph.add(file.clone(), named(ns::CODE, "hasFunction"), uri);
        }

        for class in artifact.classes() {
            let uri = self.project_class(class, &file, graph);
            graph.add(file.clone(), named(ns::CODE, "hasClass"), uri);
        }

        for import in artifact.imports() {
            let text = if import.is_from_import {
                format!("from {} import {}", import.module, import.names.join(", "))
            } else {
                import.module.clone()
            };
            let node = blank(&file, "import", &text);
            graph.add(node.clone(), rdf_type(), named(ns::CODE, "Import"));
            graph.add(node.clone(), label(), literal(text));
            graph.add(file.clone(), named(ns::CODE, "hasImport"), node);
        }

        for error in artifact.syntax_errors() {
            let node = blank(&file, "syntax", &error.key());
            graph.add(node.clone(), rdf_type(), named(ns::CODE, "SyntaxError"));
            graph.add(node.clone(), named(ns::CODE, "lineNumber"), integer(error.lineno));
            graph.add(node.clone(), label(), literal(error.message.as_str()));
            graph.add(file.clone(), named(ns::CODE, "hasSyntaxError"), node);
        }

        for corruption in artifact.comma_corruptions() {
            let node = blank(&file, "comma", &corruption.key());
            graph.add(node.clone(), rdf_type(), named(ns::CORRUPTION, "CommaCorruption"));
            graph.add(node.clone(), named(ns::CODE, "lineNumber"), integer(corruption.lineno));
            graph.add(node.clone(), label(), literal(corruption.message.as_str()));
            graph.add(file.clone(), named(ns::CORRUPTION, "hasCommaCorruption"), node);
        }

        file
    }

    fn project_function(
        &self,
        function: &FunctionSignature,
        uri: &NamedNode,
        owner: &NamedNode,
        graph: &mut Graph,
    ) {
        graph.add(uri.clone(), rdf_type(), named(ns::FUNC, "Function"));
        graph.add(uri.clone(), label(), literal(function.name.as_str()));
        graph.add(uri.clone(), named(ns::FUNC, "definedIn"), owner.clone());
        graph.add(uri.clone(), named(ns::FUNC, "lineNumber"), integer(function.lineno));
        graph.add(uri.clone(), named(ns::PARSER, "confidence"), decimal(function.confidence));

        if let Some(docstring) = &function.docstring {
            graph.add(uri.clone(), named(ns::FUNC, "hasDocstring"), literal(docstring.as_str()));
        }
        if let Some(annotation) = &function.return_annotation {
            graph.add(uri.clone(), named(ns::FUNC, "hasReturnType"), literal(annotation.as_str()));
        }

        for arg in &function.args {
            let node = blank(uri, "arg", arg);
            graph.add(node.clone(), rdf_type(), named(ns::FUNC, "Argument"));
            graph.add(node.clone(), label(), literal(arg.as_str()));
            graph.add(uri.clone(), named(ns::FUNC, "hasArgument"), node);
        }

        for (name, default) in &function.kwargs {
            let node = blank(uri, "kwarg", name);
            graph.add(node.clone(), rdf_type(), named(ns::FUNC, "KeywordArgument"));
            graph.add(node.clone(), label(), literal(name.as_str()));
            if let Some(default) = default {
                graph.add(node.clone(), named(ns::FUNC, "hasDefault"), literal(default.as_str()));
            }
            graph.add(uri.clone(), named(ns::FUNC, "hasKeywordArgument"), node);
        }

        self.project_decorators(&function.decorators, uri, graph);
    }

    fn project_class(
        &self,
        class: &ClassSignature,
        file: &NamedNode,
        graph: &mut Graph,
    ) -> NamedNode {
        let uri = fragment_iri(file, &class.name);
        graph.add(uri.clone(), rdf_type(), named(ns::FUNC, "Class"));
        graph.add(uri.clone(), label(), literal(class.name.as_str()));
        graph.add(uri.clone(), named(ns::FUNC, "definedIn"), file.clone());
        graph.add(uri.clone(), named(ns::FUNC, "lineNumber"), integer(class.lineno));
        graph.add(uri.clone(), named(ns::PARSER, "confidence"), decimal(class.confidence));

        if let Some(docstring) = &class.docstring {
            graph.add(uri.clone(), named(ns::FUNC, "hasDocstring"), literal(docstring.as_str()));
        }
        for base in &class.bases {
            graph.add(uri.clone(), named(ns::FUNC, "inheritsFrom"), literal(base.as_str()));
        }
        self.project_decorators(&class.decorators, &uri, graph);

        for method in &class.methods {
            let method_uri = fragment_iri(&uri, &method.name);
            self.project_function(method, &method_uri, &uri, graph);
            graph.add(uri.clone(), named(ns::FUNC, "hasMethod"), method_uri);
        }

        uri
    }

    fn project_decorators(&self, decorators: &[String], owner: &NamedNode, graph: &mut Graph) {
        for decorator in decorators {
            let node = blank(owner, "decorator", decorator);
            graph.add(node.clone(), rdf_type(), named(ns::FUNC, "Decorator"));
            graph.add(node.clone(), label(), literal(decorator.as_str()));
            graph.add(owner.clone(), named(ns::FUNC, "hasDecorator"), node);
        }
    }
}

/// Add a `diff:FileDiff` node linking two commit-scoped projections
///
/// `current` is the artifact at `commit1` and `previous` the one at
/// `commit2`, matching the argument order of
/// [`compare_artifacts`](crate::diff::compare_artifacts).
pub fn project_diff(
    graph: &mut Graph,
    current: &FileArtifact,
    previous: &FileArtifact,
    diff: &StructuralDiff,
    commit1: &str,
    commit2: &str,
) -> NamedNode {
    let current_uri = Projector::at_commit(commit1).project_artifact(current, graph);
    let previous_uri = Projector::at_commit(commit2).project_artifact(previous, graph);

    let uri = path_iri(DIFF_BASE, &format!("{}_{}/{}", commit1, commit2, current.path()));
    graph.add(uri.clone(), rdf_type(), named(ns::DIFF, "FileDiff"));
    graph.add(uri.clone(), named(ns::DIFF, "compares"), current_uri);
    graph.add(uri.clone(), named(ns::DIFF, "compares"), previous_uri);
    graph.add(uri.clone(), named(ns::DIFF, "fromCommit"), literal(commit1));
    graph.add(uri.clone(), named(ns::DIFF, "toCommit"), literal(commit2));

    if diff.functional_loss {
        graph.add(uri.clone(), named(ns::DIFF, "hasFunctionalLoss"), boolean(true));

        let losses = diff
            .removed_functions
            .iter()
            .map(|name| ("FunctionLoss", format!("Lost function: {}", name)))
            .chain(
                diff.removed_classes
                    .iter()
                    .map(|name| ("ClassLoss", format!("Lost class: {}", name))),
            )
            .chain(diff.removed_methods.iter().flat_map(|(class, methods)| {
                methods
                    .iter()
                    .map(move |m| ("MethodLoss", format!("Lost method: {}.{}", class, m)))
            }));

        for (kind, text) in losses {
            let node = blank(&uri, "loss", &text);
            graph.add(node.clone(), rdf_type(), named(ns::DIFF, kind));
            graph.add(node.clone(), label(), literal(text));
            graph.add(uri.clone(), named(ns::DIFF, "hasLoss"), node);
        }
    }

    if diff.corruption_detected {
        graph.add(uri.clone(), named(ns::DIFF, "hasCorruption"), boolean(true));

        for error in previous.syntax_errors() {
            let node = blank(&uri, "syntax", &error.key());
            graph.add(node.clone(), rdf_type(), named(ns::CORRUPTION, "SyntaxError"));
            graph.add(node.clone(), label(), literal(format!("Line {}", error.key())));
            graph.add(uri.clone(), named(ns::CORRUPTION, "hasSyntaxError"), node);
        }
        for corruption in previous.comma_corruptions() {
            let node = blank(&uri, "comma", &corruption.key());
            graph.add(node.clone(), rdf_type(), named(ns::CORRUPTION, "CommaCorruption"));
            graph.add(node.clone(), label(), literal(format!("Line {}", corruption.key())));
            graph.add(uri.clone(), named(ns::CORRUPTION, "hasCommaCorruption"), node);
        }
    }

    uri
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::compare_artifacts;
    use crate::extract::{AstStrategy, ParserStrategy};
    use crate::rdf::Triple;

    fn artifact(source: &str) -> FileArtifact {
        AstStrategy::new().unwrap().parse(source, "pkg/mod.py", "HEAD").0
    }

    const SOURCE: &str = r#"
import os

@cached
def load(path, *, mode="r") -> str:
    """Read a file."""
    return open(path, mode).read()

class Store(Base):
    def get(self, key):
        pass
"#;

    /// Labels of the nodes `subject` points at through `predicate`
    fn linked_labels(graph: &Graph, subject: &str, predicate: &str) -> Vec<String> {
        let triples = graph.triples();
        let label = format!("{}label", ns::RDFS);
        let targets: Vec<&str> = triples
            .iter()
            .filter(|t| t.subject == subject && t.predicate == predicate)
            .map(|t| t.object.as_str())
            .collect();
        triples
            .iter()
            .filter(|t| targets.contains(&t.subject.as_str()) && t.predicate == label)
            .map(|t| t.object.clone())
            .collect()
    }

    #[test]
    fn test_neutral_projection_is_stable() {
        let artifact = artifact(SOURCE);
        let mut first = Graph::new();
        let mut second = Graph::new();
        Projector::neutral().project_artifact(&artifact, &mut first);
        Projector::neutral().project_artifact(&artifact, &mut second);
        assert_eq!(first.triples(), second.triples());
    }

    #[test]
    fn test_artifact_statements() {
        let mut graph = Graph::new();
        let file = Projector::neutral().project_artifact(&artifact(SOURCE), &mut graph);
        assert_eq!(file.as_str(), "http://example.org/file/pkg/mod.py");

        let load = NamedNode::new_unchecked("http://example.org/file/pkg/mod.py#load");
        assert!(graph.contains(file.clone(), named(ns::CODE, "hasFunction"), load.clone()));
        assert!(graph.contains(load.clone(), named(ns::FUNC, "hasReturnType"), literal("str")));
        let kwarg = named(ns::FUNC, "hasKeywordArgument");
        assert_eq!(graph.objects(load.as_ref().into(), kwarg.as_ref()).count(), 1);
        let decorator = named(ns::FUNC, "hasDecorator");
        assert_eq!(graph.objects(load.as_ref().into(), decorator.as_ref()).count(), 1);

        let store = NamedNode::new_unchecked("http://example.org/file/pkg/mod.py#Store");
        let get = NamedNode::new_unchecked("http://example.org/file/pkg/mod.py#Store.get");
        assert!(graph.contains(store.clone(), named(ns::FUNC, "hasMethod"), get.clone()));
        assert!(graph.contains(store.clone(), named(ns::FUNC, "inheritsFrom"), literal("Base")));
        assert!(graph.contains(get, named(ns::FUNC, "definedIn"), store));
    }

    #[test]
    fn test_arguments_hang_off_functions() {
        let mut graph = Graph::new();
        Projector::neutral().project_artifact(&artifact(SOURCE), &mut graph);

        let load = "http://example.org/file/pkg/mod.py#load";
        let args = linked_labels(&graph, load, &format!("{}hasArgument", ns::FUNC));
        assert_eq!(args, vec!["path".to_string()]);
        assert!(graph.triples().contains(&Triple::new(
            load,
            &format!("{}hasDocstring", ns::FUNC),
            "Read a file."
        )));
    }

    #[test]
    fn test_diff_node_records_losses() {
        let previous = artifact(SOURCE);
        let current = artifact("import os\n\nclass Store(Base):\n    pass\n");
        let diff = compare_artifacts(&current, &previous);

        let mut graph = Graph::new();
        let uri = project_diff(&mut graph, &current, &previous, &diff, "HEAD", "HEAD~1");
        assert_eq!(uri.as_str(), "http://example.org/diff/HEAD_HEAD~1/pkg/mod.py");

        assert!(graph.contains(uri.clone(), named(ns::DIFF, "hasFunctionalLoss"), boolean(true)));
        let labels = linked_labels(&graph, uri.as_str(), &format!("{}hasLoss", ns::DIFF));
        assert!(labels.contains(&"Lost function: load".to_string()));
        assert!(labels.contains(&"Lost method: Store.get".to_string()));

        let compares = named(ns::DIFF, "compares");
        assert_eq!(graph.objects(uri.as_ref().into(), compares.as_ref()).count(), 2);
        assert!(!graph.contains(uri, named(ns::DIFF, "hasCorruption"), boolean(true)));
    }
}
