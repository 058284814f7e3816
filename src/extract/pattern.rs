//! Regex strategy: line-anchored patterns that survive broken syntax
//!
//! Cannot see past one level of nesting and cannot validate syntax, so every
//! element carries a reduced confidence.

use super::params::{split_parameters, split_top_level};
use super::{
    detect_comma_corruption, strip_string_literal, ClassSignature, FileArtifact, FunctionSignature,
    ImportStatement, ParserStrategy, ParserTelemetry, ParserType,
};
use regex::{Captures, Regex};
use std::sync::LazyLock;

const IMPORT_CONFIDENCE: f64 = 0.9;
const DEFINITION_CONFIDENCE: f64 = 0.8;
const METHOD_CONFIDENCE: f64 = 0.7;

static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+([A-Za-z0-9_.][A-Za-z0-9_.,\s]*)").unwrap());

static FROM_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*from\s+([A-Za-z0-9_.]+)\s+import\s+\(?\s*([A-Za-z0-9_.,\s*]+)").unwrap()
});

/// Module-level definitions start at column 0
static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(([^)]*)\)(?:\s*->\s*([^:]+?))?\s*:",
    )
    .unwrap()
});

static METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^( *)(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(([^)]*)\)(?:\s*->\s*([^:]+?))?\s*:",
    )
    .unwrap()
});

static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^( *)class\s+([A-Za-z_][A-Za-z0-9_]*)\s*(?:\(([^)]*)\))?\s*:").unwrap()
});

/// Extracts signatures with regular expressions
#[derive(Debug, Default)]
pub struct RegexStrategy;

impl RegexStrategy {
    pub fn new() -> Self {
        Self
    }

    fn extract_imports(&self, lines: &[&str]) -> Vec<ImportStatement> {
        let mut imports = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            let lineno = idx + 1;
            if let Some(caps) = FROM_IMPORT_RE.captures(line) {
                let names = split_names(&caps[2]);
                imports.push(ImportStatement {
                    module: caps[1].trim_start_matches('.').to_string(),
                    names,
                    is_from_import: true,
                    lineno,
                    confidence: IMPORT_CONFIDENCE,
                    parser_source: ParserType::Regex,
                });
            } else if let Some(caps) = IMPORT_RE.captures(line) {
                for module in split_names(&caps[1]) {
                    imports.push(ImportStatement {
                        module: module.clone(),
                        names: vec![module],
                        is_from_import: false,
                        lineno,
                        confidence: IMPORT_CONFIDENCE,
                        parser_source: ParserType::Regex,
                    });
                }
            }
        }

        imports
    }

    fn extract_functions(&self, lines: &[&str]) -> Vec<FunctionSignature> {
        lines
            .iter()
            .enumerate()
            .filter_map(|(idx, line)| {
                let caps = FUNCTION_RE.captures(line)?;
                Some(build_function(&caps, 1, lines, idx, DEFINITION_CONFIDENCE, false))
            })
            .collect()
    }

    fn extract_classes(&self, lines: &[&str]) -> Vec<ClassSignature> {
        let mut classes = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            let Some(caps) = CLASS_RE.captures(line) else {
                continue;
            };
            let indent = caps[1].len();
            let mut class = ClassSignature::new(
                &caps[2],
                idx + 1,
                DEFINITION_CONFIDENCE,
                ParserType::Regex,
            );

            if let Some(bases) = caps.get(3) {
                class.bases = split_top_level(bases.as_str(), ',')
                    .into_iter()
                    .map(str::trim)
                    .filter(|b| !b.is_empty() && !b.contains('='))
                    .map(str::to_string)
                    .collect();
            }
            class.decorators = preceding_decorators(lines, idx);
            class.docstring = docstring_after(lines, idx);
            class.methods = self.scan_methods(lines, idx, indent);

            classes.push(class);
        }

        classes
    }

    /// Methods sit exactly four spaces deeper than their class
    fn scan_methods(
        &self,
        lines: &[&str],
        class_idx: usize,
        class_indent: usize,
    ) -> Vec<FunctionSignature> {
        let mut methods = Vec::new();

        for (idx, line) in lines.iter().enumerate().skip(class_idx + 1) {
            if line.trim().is_empty() {
                continue;
            }
            if indentation(line) <= class_indent {
                break;
            }
            if let Some(caps) = METHOD_RE.captures(line) {
                if caps[1].len() == class_indent + 4 {
                    methods.push(build_function(&caps, 2, lines, idx, METHOD_CONFIDENCE, true));
                }
            }
        }

        methods
    }
}

/// Build a signature from captures laid out as name, params, return type
/// starting at group `first`
fn build_function(
    caps: &Captures,
    first: usize,
    lines: &[&str],
    idx: usize,
    confidence: f64,
    is_method: bool,
) -> FunctionSignature {
    let mut func = FunctionSignature::new(&caps[first], idx + 1, confidence, ParserType::Regex);
    let params = split_parameters(&caps[first + 1], is_method);
    func.args = params.args;
    func.kwargs = params.kwargs;
    func.return_annotation = caps.get(first + 2).map(|m| m.as_str().trim().to_string());
    func.decorators = preceding_decorators(lines, idx);
    func.docstring = docstring_after(lines, idx);
    func
}

/// Comma-separated names with any `as` alias dropped
fn split_names(text: &str) -> Vec<String> {
    text.split(',')
        .filter_map(|piece| piece.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// The next line, when it opens a triple-quoted string
fn docstring_after(lines: &[&str], idx: usize) -> Option<String> {
    let next = lines.get(idx + 1)?.trim();
    if next.starts_with("\"\"\"") || next.starts_with("'''") {
        Some(strip_string_literal(next).trim().to_string())
    } else {
        None
    }
}

/// `@decorator` lines directly above a definition, in source order
fn preceding_decorators(lines: &[&str], idx: usize) -> Vec<String> {
    let mut decorators: Vec<String> = lines[..idx]
        .iter()
        .rev()
        .map(|l| l.trim())
        .take_while(|l| l.starts_with('@'))
        .map(|l| l.trim_start_matches('@').to_string())
        .collect();
    decorators.reverse();
    decorators
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

impl ParserStrategy for RegexStrategy {
    fn parser_type(&self) -> ParserType {
        ParserType::Regex
    }

    fn parse(
        &mut self,
        content: &str,
        file_path: &str,
        commit: &str,
    ) -> (FileArtifact, ParserTelemetry) {
        let telemetry = ParserTelemetry::start(ParserType::Regex, file_path, commit);
        let lines: Vec<&str> = content
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .collect();

        let imports = self.extract_imports(&lines);
        let functions = self.extract_functions(&lines);
        let classes = self.extract_classes(&lines);
        let comma_corruptions = detect_comma_corruption(content, ParserType::Regex);

        let artifact = FileArtifact::builder(file_path)
            .functions(functions)
            .classes(classes)
            .imports(imports)
            .comma_corruptions(comma_corruptions)
            .build();

        let telemetry = telemetry.finish(
            0.9,
            0.8,
            artifact.element_count(),
            artifact.comma_corruptions().len(),
        );
        let artifact = artifact.into_builder().telemetry(telemetry.clone()).build();

        (artifact, telemetry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> FileArtifact {
        RegexStrategy::new().parse(source, "mod.py", "HEAD").0
    }

    #[test]
    fn test_imports() {
        let artifact =
            parse("import os, sys as system\nfrom .pkg import a, b as c\nfrom x import *\n");
        let imports = artifact.imports();

        assert_eq!(imports.len(), 4);
        assert_eq!(imports[0].module, "os");
        assert_eq!(imports[1].module, "sys");
        assert_eq!(imports[2].module, "pkg");
        assert_eq!(imports[2].names, vec!["a", "b"]);
        assert_eq!(imports[3].names, vec!["*"]);
        assert!(imports.iter().all(|i| i.confidence == 0.9));
    }

    #[test]
    fn test_module_functions_and_docstring() {
        let code = "\
@timed
async def load(path: str, *, strict=True) -> Dict[str, int]:
    \"\"\"Load it.\"\"\"

    def inner(x):
        pass
";
        let artifact = parse(code);

        assert_eq!(artifact.functions().len(), 1);
        let func = &artifact.functions()[0];
        assert_eq!(func.name, "load");
        assert_eq!(func.args, vec!["path"]);
        assert_eq!(func.kwargs, vec![("strict".to_string(), Some("True".to_string()))]);
        assert_eq!(func.return_annotation.as_deref(), Some("Dict[str, int]"));
        assert_eq!(func.docstring.as_deref(), Some("Load it."));
        assert_eq!(func.decorators, vec!["timed"]);
        assert_eq!(func.confidence, 0.8);
    }

    #[test]
    fn test_class_method_scan_stops_at_dedent() {
        let code = r#"
class Handler(Base, metaclass=Meta):
    def handle(self, request):
        def nested(self):
            pass

    async def close(self):
        pass

def after(self):
    pass

    class Inner:
        def method(self):
            pass
"#;
        let artifact = parse(code);

        let classes: Vec<&str> = artifact.classes().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(classes, vec!["Handler", "Inner"]);

        let handler = &artifact.classes()[0];
        assert_eq!(handler.bases, vec!["Base"]);
        let methods: Vec<&str> = handler.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(methods, vec!["handle", "close"]);
        assert_eq!(handler.methods[0].args, vec!["request"]);
        assert_eq!(handler.methods[0].confidence, 0.7);

        assert_eq!(artifact.classes()[1].methods[0].name, "method");
        assert_eq!(artifact.functions()[0].name, "after");
    }

    #[test]
    fn test_survives_broken_syntax() {
        let code = "import os\ndef ok(a):\n    x = (1,, 2\nclass Broken(:\ndef fine():\n    pass\n";
        let (artifact, telemetry) = RegexStrategy::new().parse(code, "broken.py", "c1");

        let names: Vec<&str> = artifact.functions().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["ok", "fine"]);
        assert_eq!(artifact.comma_corruptions().len(), 1);
        assert_eq!(telemetry.success_rate, 0.9);
        assert_eq!(telemetry.confidence_score, 0.8);
        assert_eq!(telemetry.elements_extracted, 3);
        assert!(artifact.telemetry().contains_key(&ParserType::Regex));
    }
}
