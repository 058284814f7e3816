//! AST strategy backed by tree-sitter
//!
//! Extracts, with full fidelity:
//! - Imports anywhere in the file
//! - Module-level functions (sync and async)
//! - Every class with the methods defined directly in its body
//!
//! A tree containing any ERROR or MISSING node is reported as a syntax error
//! and contributes no elements.

use super::{
    clean_docstring, detect_comma_corruption, strip_string_literal, ClassSignature, FileArtifact,
    FunctionSignature, ImportStatement, ParserStrategy, ParserTelemetry, ParserType, SyntaxIssue,
};
use anyhow::{Context, Result};
use tree_sitter::Node;

const CONFIDENCE: f64 = 1.0;

/// Get the tree-sitter language for Python
fn tree_sitter_language() -> tree_sitter::Language {
    tree_sitter_python::LANGUAGE.into()
}

/// Parses Python with a full grammar
pub struct AstStrategy {
    parser: tree_sitter::Parser,
}

/// Elements collected from a syntactically valid tree
#[derive(Default)]
struct Extracted {
    functions: Vec<FunctionSignature>,
    classes: Vec<ClassSignature>,
    imports: Vec<ImportStatement>,
}

impl AstStrategy {
    /// Create a new AST strategy
    pub fn new() -> Result<Self> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_language())
            .context("Failed to set Python language")?;
        Ok(Self { parser })
    }

    /// Walk module statements for top-level functions
    ///
    /// Descends through compound statements such as `if` and `try`, but never
    /// into function or class bodies.
    fn collect_module_functions(&self, node: Node, source: &str, out: &mut Vec<FunctionSignature>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "function_definition" => {
                    if let Some(func) = self.extract_function(child, source, &[], false) {
                        out.push(func);
                    }
                }
                "decorated_definition" => {
                    if let Some(def) = child.child_by_field_name("definition") {
                        if def.kind() == "function_definition" {
                            let decorators = self.extract_decorators(child, source);
                            let func = self.extract_function(def, source, &decorators, false);
                            if let Some(func) = func {
                                out.push(func);
                            }
                        }
                    }
                }
                "class_definition" => {}
                _ => self.collect_module_functions(child, source, out),
            }
        }
    }

    /// Walk the whole tree for classes, in source order
    fn collect_classes(&self, node: Node, source: &str, out: &mut Vec<ClassSignature>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "class_definition" => {
                    if let Some(class) = self.extract_class(child, source, &[]) {
                        out.push(class);
                    }
                    self.collect_classes(child, source, out);
                }
                "decorated_definition" => match child.child_by_field_name("definition") {
                    Some(def) if def.kind() == "class_definition" => {
                        let decorators = self.extract_decorators(child, source);
                        if let Some(class) = self.extract_class(def, source, &decorators) {
                            out.push(class);
                        }
                        self.collect_classes(def, source, out);
                    }
                    Some(def) => self.collect_classes(def, source, out),
                    None => {}
                },
                _ => self.collect_classes(child, source, out),
            }
        }
    }

    /// Walk the whole tree for import statements
    fn collect_imports(&self, node: Node, source: &str, out: &mut Vec<ImportStatement>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "import_statement" => {
                    let lineno = child.start_position().row + 1;
                    let mut names_cursor = child.walk();
                    for name in child.children_by_field_name("name", &mut names_cursor) {
                        let module = imported_name(name, source);
                        out.push(ImportStatement {
                            module: module.clone(),
                            names: vec![module],
                            is_from_import: false,
                            lineno,
                            confidence: CONFIDENCE,
                            parser_source: ParserType::Ast,
                        });
                    }
                }
                "import_from_statement" | "future_import_statement" => {
                    out.push(self.extract_from_import(child, source));
                }
                _ => self.collect_imports(child, source, out),
            }
        }
    }

    fn extract_from_import(&self, node: Node, source: &str) -> ImportStatement {
        let module = if node.kind() == "future_import_statement" {
            "__future__".to_string()
        } else {
            node.child_by_field_name("module_name")
                .map(|m| text(m, source).trim_start_matches('.').to_string())
                .unwrap_or_default()
        };

        let mut names = Vec::new();
        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            names.push(imported_name(name, source));
        }
        let mut cursor = node.walk();
        if node.named_children(&mut cursor).any(|c| c.kind() == "wildcard_import") {
            names.push("*".to_string());
        }

        ImportStatement {
            module,
            names,
            is_from_import: true,
            lineno: node.start_position().row + 1,
            confidence: CONFIDENCE,
            parser_source: ParserType::Ast,
        }
    }

    /// Extract a function or method
    fn extract_function(
        &self,
        node: Node,
        source: &str,
        decorators: &[String],
        is_method: bool,
    ) -> Option<FunctionSignature> {
        let name = text(node.child_by_field_name("name")?, source);
        let mut func = FunctionSignature::new(
            name,
            node.start_position().row + 1,
            CONFIDENCE,
            ParserType::Ast,
        );

        if let Some(params) = node.child_by_field_name("parameters") {
            self.extract_parameters(params, source, is_method, &mut func);
        }

        func.decorators = decorators.to_vec();
        func.docstring = self.extract_docstring(node, source);
        func.return_annotation = node
            .child_by_field_name("return_type")
            .map(|n| text(n, source).to_string());

        Some(func)
    }

    /// Classify parameters into positional names and keyword-only pairs
    fn extract_parameters(
        &self,
        params: Node,
        source: &str,
        is_method: bool,
        func: &mut FunctionSignature,
    ) {
        let mut keyword_only = false;
        let mut cursor = params.walk();

        for param in params.named_children(&mut cursor) {
            let (name, default) = match param.kind() {
                "identifier" => (text(param, source).to_string(), None),
                "default_parameter" | "typed_default_parameter" => {
                    let name = param
                        .child_by_field_name("name")
                        .map(|n| text(n, source).to_string())
                        .unwrap_or_default();
                    let default = param
                        .child_by_field_name("value")
                        .map(|v| text(v, source).to_string());
                    (name, default)
                }
                "typed_parameter" => {
                    // `*args: T` and `**kw: T` are wrapped in typed_parameter
                    match param.named_child(0) {
                        Some(inner) if inner.kind() == "identifier" => {
                            (text(inner, source).to_string(), None)
                        }
                        Some(inner) if inner.kind() == "list_splat_pattern" => {
                            keyword_only = true;
                            continue;
                        }
                        _ => continue,
                    }
                }
                "keyword_separator" | "list_splat_pattern" => {
                    keyword_only = true;
                    continue;
                }
                _ => continue,
            };

            if name.is_empty() {
                continue;
            }
            if keyword_only {
                func.kwargs.push((name, default));
            } else if !(is_method && (name == "self" || name == "cls")) {
                func.args.push(name);
            }
        }
    }

    /// Extract a class with its direct methods
    fn extract_class(
        &self,
        node: Node,
        source: &str,
        decorators: &[String],
    ) -> Option<ClassSignature> {
        let name = text(node.child_by_field_name("name")?, source);
        let mut class = ClassSignature::new(
            name,
            node.start_position().row + 1,
            CONFIDENCE,
            ParserType::Ast,
        );

        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            class.bases = superclasses
                .named_children(&mut cursor)
                .filter(|b| !matches!(b.kind(), "keyword_argument" | "comment"))
                .map(|b| text(b, source).to_string())
                .collect();
        }

        class.decorators = decorators.to_vec();
        class.docstring = self.extract_docstring(node, source);

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for child in body.named_children(&mut cursor) {
                let method = match child.kind() {
                    "function_definition" => self.extract_function(child, source, &[], true),
                    "decorated_definition" => child
                        .child_by_field_name("definition")
                        .filter(|d| d.kind() == "function_definition")
                        .and_then(|d| {
                            let decorators = self.extract_decorators(child, source);
                            self.extract_function(d, source, &decorators, true)
                        }),
                    _ => None,
                };
                if let Some(method) = method {
                    class.methods.push(method);
                }
            }
        }

        Some(class)
    }

    /// Decorator expressions of a decorated_definition, without `@`
    fn extract_decorators(&self, node: Node, source: &str) -> Vec<String> {
        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .filter(|c| c.kind() == "decorator")
            .map(|d| text(d, source).trim_start_matches('@').trim().to_string())
            .collect()
    }

    /// Docstring of a function or class body, cleaned
    fn extract_docstring(&self, node: Node, source: &str) -> Option<String> {
        let body = node.child_by_field_name("body")?;

        let mut cursor = body.walk();
        let first = body
            .named_children(&mut cursor)
            .find(|c| c.kind() != "comment")?;
        if first.kind() != "expression_statement" {
            return None;
        }

        let literal = first.named_child(0)?;
        if literal.kind() != "string" {
            return None;
        }

        // f-strings and bytes are expressions, not docstrings
        let literal = text(literal, source);
        let mut prefix = literal.chars().take_while(char::is_ascii_alphabetic);
        if prefix.any(|c| matches!(c, 'f' | 'F' | 'b' | 'B')) {
            return None;
        }

        Some(clean_docstring(&strip_string_literal(literal)))
    }
}

/// Name of an imported module or symbol, ignoring any alias
fn imported_name(node: Node, source: &str) -> String {
    if node.kind() == "aliased_import" {
        node.child_by_field_name("name")
            .map(|n| text(n, source).to_string())
            .unwrap_or_default()
    } else {
        text(node, source).to_string()
    }
}

fn text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// First ERROR or MISSING node in document order
fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

impl ParserStrategy for AstStrategy {
    fn parser_type(&self) -> ParserType {
        ParserType::Ast
    }

    fn parse(
        &mut self,
        content: &str,
        file_path: &str,
        commit: &str,
    ) -> (FileArtifact, ParserTelemetry) {
        let mut telemetry = ParserTelemetry::start(ParserType::Ast, file_path, commit);
        let mut syntax_errors = Vec::new();
        let mut extracted = Extracted::default();
        let (success, confidence);

        match self.parser.parse(content, None) {
            Some(tree) => {
                let root = tree.root_node();
                if let Some(error) = first_error(root) {
                    let lineno = error.start_position().row + 1;
                    let message = if error.is_missing() {
                        format!("invalid syntax: missing '{}'", error.kind())
                    } else {
                        "invalid syntax".to_string()
                    };
                    telemetry.record_error(format!("SyntaxError at line {}: {}", lineno, message));
                    syntax_errors.push(SyntaxIssue {
                        message,
                        lineno,
                        confidence: CONFIDENCE,
                        parser_source: ParserType::Ast,
                    });
                    success = 0.0;
                    confidence = 0.0;
                } else {
                    self.collect_imports(root, content, &mut extracted.imports);
                    self.collect_module_functions(root, content, &mut extracted.functions);
                    self.collect_classes(root, content, &mut extracted.classes);
                    success = 1.0;
                    confidence = 1.0;
                }
            }
            None => {
                telemetry.record_error("Error: parser produced no tree");
                success = 0.0;
                confidence = 0.0;
            }
        }

        let comma_corruptions = detect_comma_corruption(content, ParserType::Ast);
        let elements =
            extracted.functions.len() + extracted.classes.len() + extracted.imports.len();
        let telemetry = telemetry.finish(success, confidence, elements, comma_corruptions.len());

        let artifact = FileArtifact::builder(file_path)
            .functions(extracted.functions)
            .classes(extracted.classes)
            .imports(extracted.imports)
            .syntax_errors(syntax_errors)
            .comma_corruptions(comma_corruptions)
            .telemetry(telemetry.clone())
            .build();

        (artifact, telemetry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> FileArtifact {
        let mut strategy = AstStrategy::new().unwrap();
        strategy.parse(source, "test.py", "HEAD").0
    }

    #[test]
    fn test_function_with_docstring() {
        let artifact = parse("def foo(a, b):\n    \"\"\"doc\"\"\"\n");

        assert_eq!(artifact.functions().len(), 1);
        let func = &artifact.functions()[0];
        assert_eq!(func.name, "foo");
        assert_eq!(func.args, vec!["a", "b"]);
        assert_eq!(func.docstring.as_deref(), Some("doc"));
        assert_eq!(func.return_annotation, None);
        assert_eq!(func.confidence, 1.0);
        assert_eq!(func.lineno, 1);
    }

    #[test]
    fn test_async_decorated_and_keyword_only() {
        let code = r#"
import os, sys as system
from collections import OrderedDict as OD, defaultdict
from . import sibling

@cache
@route("/x")
async def fetch(url: str, retries=3, *, timeout: float = 1.5, verbose) -> bytes:
    return b""
"#;
        let artifact = parse(code);

        let modules: Vec<&str> = artifact.imports().iter().map(|i| i.module.as_str()).collect();
        assert_eq!(modules, vec!["os", "sys", "collections", ""]);
        assert_eq!(artifact.imports()[2].names, vec!["OrderedDict", "defaultdict"]);
        assert!(artifact.imports()[2].is_from_import);

        let func = &artifact.functions()[0];
        assert_eq!(func.name, "fetch");
        assert_eq!(func.decorators, vec!["cache", "route(\"/x\")"]);
        assert_eq!(func.args, vec!["url", "retries"]);
        assert_eq!(
            func.kwargs,
            vec![
                ("timeout".to_string(), Some("1.5".to_string())),
                ("verbose".to_string(), None),
            ]
        );
        assert_eq!(func.return_annotation.as_deref(), Some("bytes"));
        assert_eq!(func.lineno, 8);
    }

    #[test]
    fn test_class_methods_are_one_level_deep() {
        let code = r#"
class Base(object, metaclass=Meta):
    """Base class.

    More text.
    """

    def method(self, x):
        def helper():
            pass
        return helper

    @staticmethod
    def build(cls, y):
        pass

    class Inner:
        def inner_method(self):
            pass

def top():
    def nested():
        pass
"#;
        let artifact = parse(code);

        let names: Vec<&str> = artifact.functions().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["top"]);

        let classes: Vec<&str> = artifact.classes().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(classes, vec!["Base", "Inner"]);

        let base = &artifact.classes()[0];
        assert_eq!(base.bases, vec!["object"]);
        assert_eq!(base.docstring.as_deref(), Some("Base class.\n\nMore text."));
        let methods: Vec<&str> = base.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(methods, vec!["method", "build"]);
        assert_eq!(base.methods[0].args, vec!["x"]);
        assert_eq!(base.methods[1].args, vec!["y"]);
        assert_eq!(base.methods[1].decorators, vec!["staticmethod"]);
    }

    #[test]
    fn test_functions_inside_module_level_if() {
        let code = "\
import sys
if sys.version_info > (3,):
    def compat():
        pass
";
        let artifact = parse(code);
        assert_eq!(artifact.functions().len(), 1);
        assert_eq!(artifact.functions()[0].name, "compat");
    }

    #[test]
    fn test_only_plain_string_literals_are_docstrings() {
        let code = "\
def formatted():
    f\"\"\"Hello {name}\"\"\"

def raw_bytes():
    rb'data'

def raw():
    r\"\"\"Matches \\d+\"\"\"
";
        let artifact = parse(code);
        let functions = artifact.functions();
        assert_eq!(functions[0].docstring, None);
        assert_eq!(functions[1].docstring, None);
        assert_eq!(functions[2].docstring.as_deref(), Some("Matches \\d+"));
    }

    #[test]
    fn test_positional_only_parameters_stay_positional() {
        let artifact = parse("def f(a, /, b, *, c):\n    pass\n");
        let func = &artifact.functions()[0];
        assert_eq!(func.args, vec!["a", "b"]);
        assert_eq!(func.kwargs, vec![("c".to_string(), None)]);
    }

    #[test]
    fn test_syntax_error_yields_no_elements() {
        let mut strategy = AstStrategy::new().unwrap();
        let (artifact, telemetry) =
            strategy.parse("import os\n\ndef broken(:\n    pass\n", "bad.py", "abc123");

        assert!(artifact.functions().is_empty());
        assert!(artifact.imports().is_empty());
        assert_eq!(artifact.syntax_errors().len(), 1);
        assert!(artifact.syntax_errors()[0].message.starts_with("invalid syntax"));
        assert_eq!(telemetry.success_rate, 0.0);
        assert_eq!(telemetry.error_count, 1);
        assert_eq!(telemetry.commit, "abc123");
    }

    #[test]
    fn test_corruption_runs_even_on_syntax_error() {
        let artifact = parse(",x = 1\n");
        assert_eq!(artifact.comma_corruptions().len(), 1);
        assert!(artifact.comma_corruptions()[0]
            .message
            .contains("Line starts with comma"));
    }

    #[test]
    fn test_empty_and_garbage_input() {
        let empty = parse("");
        assert_eq!(empty.element_count(), 0);
        assert!(empty.syntax_errors().is_empty());

        let garbage = parse("\u{0}\u{1}\u{fffd}((((\n]]]");
        assert_eq!(garbage.element_count(), 0);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let code = "\
class A(B):
    def m(self, x=1):
        pass

def f(*args, **kw):
    pass
";
        let first = parse(code);
        let second = parse(code);
        assert_eq!(first.functions(), second.functions());
        assert_eq!(first.classes(), second.classes());
    }
}
