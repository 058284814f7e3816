//! Text strategy: a last resort for sources too damaged for the regex patterns
//!
//! Walks lines once, keeping an indentation stack of the enclosing `class`,
//! `def` and compound-statement scopes. Blank lines, comments and the inside of triple-quoted
//! strings never open or close a scope.

use super::params::{split_parameters, split_top_level};
use super::{
    detect_comma_corruption, ClassSignature, FileArtifact, FunctionSignature, ImportStatement,
    ParserStrategy, ParserTelemetry, ParserType,
};

const IMPORT_CONFIDENCE: f64 = 0.6;
const CLASS_CONFIDENCE: f64 = 0.6;
const FUNCTION_CONFIDENCE: f64 = 0.5;

/// An open block on the scope stack
#[derive(Debug, Clone, Copy)]
enum Scope {
    /// Index into the collected classes
    Class(usize),
    Function,
    /// `if`, `try`, `with`, loops and the like
    Block,
}

const BLOCK_KEYWORDS: [&str; 11] = [
    "if", "elif", "else", "try", "except", "finally", "with", "for", "while", "match", "case",
];

/// Extracts signatures from prefixes and indentation alone
#[derive(Debug, Default)]
pub struct TextStrategy;

/// Mutable state of one scan
#[derive(Default)]
struct Scan {
    functions: Vec<FunctionSignature>,
    classes: Vec<ClassSignature>,
    imports: Vec<ImportStatement>,
    scopes: Vec<(usize, Scope)>,
    decorators: Vec<String>,
    /// Closing delimiter of the triple-quoted string we are inside
    open_string: Option<&'static str>,
}

impl TextStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Scan {
    fn line(&mut self, raw: &str, lineno: usize) {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        let stripped = line.trim();

        if let Some(delimiter) = self.open_string {
            if stripped.contains(delimiter) {
                self.open_string = None;
            }
            return;
        }
        if stripped.is_empty() || stripped.starts_with('#') {
            return;
        }

        let indent = line.len() - line.trim_start().len();
        while self.scopes.last().is_some_and(|(depth, _)| *depth >= indent) {
            self.scopes.pop();
        }

        if let Some(decorator) = stripped.strip_prefix('@') {
            self.decorators.push(decorator.trim().to_string());
        } else if let Some(rest) = stripped.strip_prefix("class ") {
            self.class(rest, indent, lineno);
        } else if let Some(rest) = stripped
            .strip_prefix("def ")
            .or_else(|| stripped.strip_prefix("async def "))
        {
            self.function(rest, indent, lineno);
        } else if let Some(rest) = stripped.strip_prefix("import ") {
            self.decorators.clear();
            self.plain_import(rest, lineno);
        } else if let Some(rest) = stripped.strip_prefix("from ") {
            self.decorators.clear();
            self.from_import(rest, lineno);
        } else {
            self.decorators.clear();
            if opens_block(stripped) {
                self.scopes.push((indent, Scope::Block));
            }
        }

        self.open_string = opened_string(stripped);
    }

    fn class(&mut self, rest: &str, indent: usize, lineno: usize) {
        let name = identifier(rest);
        if name.is_empty() {
            return;
        }

        let mut class = ClassSignature::new(name, lineno, CLASS_CONFIDENCE, ParserType::Text);
        class.decorators = std::mem::take(&mut self.decorators);
        if let Some(bases) = parenthesised(rest) {
            class.bases = split_top_level(bases, ',')
                .into_iter()
                .map(str::trim)
                .filter(|b| !b.is_empty() && !b.contains('='))
                .map(str::to_string)
                .collect();
        }

        self.scopes.push((indent, Scope::Class(self.classes.len())));
        self.classes.push(class);
    }

    fn function(&mut self, rest: &str, indent: usize, lineno: usize) {
        let name = identifier(rest);
        let decorators = std::mem::take(&mut self.decorators);
        if name.is_empty() {
            return;
        }

        let parent = self.owner();
        self.scopes.push((indent, Scope::Function));

        let is_method = matches!(parent, Some(Scope::Class(_)));
        let mut func = FunctionSignature::new(name, lineno, FUNCTION_CONFIDENCE, ParserType::Text);
        let params = split_parameters(parenthesised(rest).unwrap_or(""), is_method);
        func.args = params.args;
        func.kwargs = params.kwargs;
        func.return_annotation = return_annotation(rest);
        func.decorators = decorators;

        match parent {
            None => self.functions.push(func),
            Some(Scope::Class(idx)) => self.classes[idx].methods.push(func),
            Some(Scope::Function | Scope::Block) => {}
        }
    }

    /// Scope a new `def` belongs to
    ///
    /// Blocks at module level are transparent. A block inside a class or
    /// function hides the definition from both.
    fn owner(&self) -> Option<Scope> {
        let mut enclosing = self.scopes.iter().rev().map(|(_, scope)| *scope);
        match enclosing.next()? {
            Scope::Block if enclosing.all(|scope| matches!(scope, Scope::Block)) => None,
            scope => Some(scope),
        }
    }

    fn plain_import(&mut self, rest: &str, lineno: usize) {
        for piece in rest.split(',') {
            let Some(module) = piece.split_whitespace().next() else {
                continue;
            };
            self.imports.push(ImportStatement {
                module: module.to_string(),
                names: vec![module.to_string()],
                is_from_import: false,
                lineno,
                confidence: IMPORT_CONFIDENCE,
                parser_source: ParserType::Text,
            });
        }
    }

    fn from_import(&mut self, rest: &str, lineno: usize) {
        let Some((module, names)) = rest.split_once(" import ") else {
            return;
        };
        let names = names
            .trim_matches(|c: char| c == '(' || c == ')' || c.is_whitespace())
            .split(',')
            .filter_map(|n| n.split_whitespace().next())
            .map(|n| n.trim_end_matches(')').to_string())
            .filter(|n| !n.is_empty())
            .collect();

        self.imports.push(ImportStatement {
            module: module.trim().trim_start_matches('.').to_string(),
            names,
            is_from_import: true,
            lineno,
            confidence: IMPORT_CONFIDENCE,
            parser_source: ParserType::Text,
        });
    }
}

/// Leading identifier of a definition header
fn identifier(text: &str) -> &str {
    let text = text.trim_start();
    let end = text
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    &text[..end]
}

/// Whether a line starts a compound statement with an indented body
fn opens_block(stripped: &str) -> bool {
    let head = stripped.strip_prefix("async ").unwrap_or(stripped);
    let keyword = identifier(head);
    BLOCK_KEYWORDS.contains(&keyword) && stripped.trim_end().ends_with(':')
}

/// Text inside the first parenthesis pair, tolerating a missing close
fn parenthesised(text: &str) -> Option<&str> {
    let open = text.find('(')?;
    let inner = &text[open + 1..];
    Some(match inner.rfind(')') {
        Some(close) => &inner[..close],
        None => inner.trim_end_matches(':'),
    })
}

fn return_annotation(text: &str) -> Option<String> {
    let (_, after) = text.rsplit_once("->")?;
    let annotation = after.trim().trim_end_matches(':').trim();
    (!annotation.is_empty()).then(|| annotation.to_string())
}

/// Delimiter of a triple-quoted string left open at the end of `line`
fn opened_string(line: &str) -> Option<&'static str> {
    let first = ["\"\"\"", "'''"]
        .into_iter()
        .filter_map(|d| line.find(d).map(|pos| (pos, d)))
        .min_by_key(|(pos, _)| *pos)?;
    let (_, delimiter) = first;
    (line.matches(delimiter).count() % 2 == 1).then_some(delimiter)
}

impl ParserStrategy for TextStrategy {
    fn parser_type(&self) -> ParserType {
        ParserType::Text
    }

    fn parse(
        &mut self,
        content: &str,
        file_path: &str,
        commit: &str,
    ) -> (FileArtifact, ParserTelemetry) {
        let telemetry = ParserTelemetry::start(ParserType::Text, file_path, commit);

        let mut scan = Scan::default();
        for (idx, line) in content.split('\n').enumerate() {
            scan.line(line, idx + 1);
        }
        let comma_corruptions = detect_comma_corruption(content, ParserType::Text);

        let artifact = FileArtifact::builder(file_path)
            .functions(scan.functions)
            .classes(scan.classes)
            .imports(scan.imports)
            .comma_corruptions(comma_corruptions)
            .build();

        let telemetry = telemetry.finish(
            0.7,
            0.6,
            artifact.element_count(),
            artifact.comma_corruptions().len(),
        );
        let artifact = artifact.into_builder().telemetry(telemetry.clone()).build();

        (artifact, telemetry)
    }
}
