//! Structural extraction from Python sources
//!
//! This module turns the text of one Python file at one commit into a
//! [`FileArtifact`]:
//! - Function, class, method and import signatures
//! - Syntax errors and comma-corruption markers
//! - Per-strategy parser telemetry
//!
//! Three strategies of decreasing reliability implement [`ParserStrategy`];
//! [`ParserChain`] decides which of them produce the final artifact.

pub mod chain;
pub mod corruption;
pub mod heuristic;
pub mod params;
pub mod pattern;
pub mod syntax;

pub use chain::{ParserChain, ParserSelection};
pub use corruption::detect_comma_corruption;
pub use heuristic::TextStrategy;
pub use pattern::RegexStrategy;
pub use syntax::AstStrategy;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Compute a stable hash for content
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Parser strategies, ordered by descending reliability
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserType {
    Ast,
    Regex,
    Text,
}

impl ParserType {
    /// All parser types, most reliable first
    pub const ALL: [ParserType; 3] = [ParserType::Ast, ParserType::Regex, ParserType::Text];

    /// Confidence attached to comma-corruption records found by this parser
    pub fn corruption_confidence(&self) -> f64 {
        match self {
            ParserType::Ast => 1.0,
            ParserType::Regex => 0.9,
            ParserType::Text => 0.7,
        }
    }
}

impl std::fmt::Display for ParserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParserType::Ast => write!(f, "ast"),
            ParserType::Regex => write!(f, "regex"),
            ParserType::Text => write!(f, "text"),
        }
    }
}

/// Telemetry for a single parse attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserTelemetry {
    pub parser_type: ParserType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Fraction of the parse considered successful (0.0 - 1.0)
    pub success_rate: f64,
    pub elements_extracted: usize,
    pub corruption_count: usize,
    pub error_count: usize,
    /// Confidence in the extracted elements (0.0 - 1.0)
    pub confidence_score: f64,
    pub file_path: String,
    pub commit: String,
    pub errors: Vec<String>,
}

impl ParserTelemetry {
    /// Begin recording a parse attempt
    pub(crate) fn start(parser_type: ParserType, file_path: &str, commit: &str) -> Self {
        let now = Utc::now();
        Self {
            parser_type,
            start_time: now,
            end_time: now,
            success_rate: 0.0,
            elements_extracted: 0,
            corruption_count: 0,
            error_count: 0,
            confidence_score: 0.0,
            file_path: file_path.to_string(),
            commit: commit.to_string(),
            errors: Vec::new(),
        }
    }

    /// Close the attempt with the given outcome
    pub(crate) fn finish(
        mut self,
        success_rate: f64,
        confidence_score: f64,
        elements_extracted: usize,
        corruption_count: usize,
    ) -> Self {
        self.end_time = Utc::now();
        self.success_rate = success_rate;
        self.confidence_score = confidence_score;
        self.elements_extracted = elements_extracted;
        self.corruption_count = corruption_count;
        self
    }

    /// Record an internal failure
    pub(crate) fn record_error(&mut self, message: impl Into<String>) {
        self.error_count += 1;
        self.errors.push(message.into());
    }

    /// Parse duration in milliseconds
    pub fn parse_time_ms(&self) -> f64 {
        let elapsed = self.end_time - self.start_time;
        elapsed
            .num_microseconds()
            .map(|us| us as f64 / 1000.0)
            .unwrap_or_else(|| elapsed.num_milliseconds() as f64)
    }
}

/// A function or method signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    /// Positional parameter names, in order
    ///
    /// Positional-only parameters (before `/`) are included; the separator
    /// itself is not recorded.
    pub args: Vec<String>,
    /// Keyword-only parameters with their default source text
    pub kwargs: Vec<(String, Option<String>)>,
    /// Decorator expressions without the leading `@`
    pub decorators: Vec<String>,
    pub docstring: Option<String>,
    pub return_annotation: Option<String>,
    pub lineno: usize,
    pub confidence: f64,
    pub parser_source: ParserType,
}

impl FunctionSignature {
    /// Create a signature with no parameters or metadata
    pub fn new(name: &str, lineno: usize, confidence: f64, parser_source: ParserType) -> Self {
        Self {
            name: name.to_string(),
            args: Vec::new(),
            kwargs: Vec::new(),
            decorators: Vec::new(),
            docstring: None,
            return_annotation: None,
            lineno,
            confidence,
            parser_source,
        }
    }

    /// Whether the callable interface differs from another signature
    pub fn interface_differs(&self, other: &FunctionSignature) -> bool {
        self.args != other.args
            || self.kwargs != other.kwargs
            || self.return_annotation != other.return_annotation
    }
}

/// A class signature with its directly nested methods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSignature {
    pub name: String,
    pub bases: Vec<String>,
    pub decorators: Vec<String>,
    pub docstring: Option<String>,
    pub methods: Vec<FunctionSignature>,
    pub lineno: usize,
    pub confidence: f64,
    pub parser_source: ParserType,
}

impl ClassSignature {
    /// Create a class signature with no bases or methods
    pub fn new(name: &str, lineno: usize, confidence: f64, parser_source: ParserType) -> Self {
        Self {
            name: name.to_string(),
            bases: Vec::new(),
            decorators: Vec::new(),
            docstring: None,
            methods: Vec::new(),
            lineno,
            confidence,
            parser_source,
        }
    }

    /// Look up a method by name
    pub fn method(&self, name: &str) -> Option<&FunctionSignature> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// An `import` or `from ... import` statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportStatement {
    pub module: String,
    pub names: Vec<String>,
    pub is_from_import: bool,
    pub lineno: usize,
    pub confidence: f64,
    pub parser_source: ParserType,
}

/// A parse failure recorded as data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntaxIssue {
    pub message: String,
    pub lineno: usize,
    pub confidence: f64,
    pub parser_source: ParserType,
}

impl SyntaxIssue {
    /// Key used when diffing issues between revisions
    pub fn key(&self) -> String {
        format!("{}: {}", self.lineno, self.message)
    }
}

/// A line matching one of the comma-corruption heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommaCorruption {
    pub message: String,
    pub lineno: usize,
    pub confidence: f64,
    pub parser_source: ParserType,
}

impl CommaCorruption {
    /// Key used when diffing corruptions between revisions
    pub fn key(&self) -> String {
        format!("{}: {}", self.lineno, self.message)
    }
}

/// Structural summary of one Python file at one commit
///
/// Built once through [`ArtifactBuilder`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileArtifact {
    path: String,
    functions: Vec<FunctionSignature>,
    classes: Vec<ClassSignature>,
    imports: Vec<ImportStatement>,
    syntax_errors: Vec<SyntaxIssue>,
    comma_corruptions: Vec<CommaCorruption>,
    telemetry: BTreeMap<ParserType, ParserTelemetry>,
}

impl FileArtifact {
    /// Start building an artifact for the given path
    pub fn builder(path: &str) -> ArtifactBuilder {
        ArtifactBuilder {
            artifact: FileArtifact {
                path: path.to_string(),
                functions: Vec::new(),
                classes: Vec::new(),
                imports: Vec::new(),
                syntax_errors: Vec::new(),
                comma_corruptions: Vec::new(),
                telemetry: BTreeMap::new(),
            },
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Module-level functions
    pub fn functions(&self) -> &[FunctionSignature] {
        &self.functions
    }

    pub fn classes(&self) -> &[ClassSignature] {
        &self.classes
    }

    pub fn imports(&self) -> &[ImportStatement] {
        &self.imports
    }

    pub fn syntax_errors(&self) -> &[SyntaxIssue] {
        &self.syntax_errors
    }

    pub fn comma_corruptions(&self) -> &[CommaCorruption] {
        &self.comma_corruptions
    }

    pub fn telemetry(&self) -> &BTreeMap<ParserType, ParserTelemetry> {
        &self.telemetry
    }

    /// Number of named elements (functions, classes, methods and imports)
    pub fn element_count(&self) -> usize {
        self.functions.len()
            + self.classes.len()
            + self.classes.iter().map(|c| c.methods.len()).sum::<usize>()
            + self.imports.len()
    }

    /// Whether any syntax error or comma corruption was recorded
    pub fn is_corrupted(&self) -> bool {
        !self.syntax_errors.is_empty() || !self.comma_corruptions.is_empty()
    }

    /// The strategy whose elements this artifact carries
    ///
    /// This is the least reliable strategy that was attempted, since the chain
    /// only escalates when a more reliable one falls short.
    pub fn selected_parser(&self) -> Option<ParserType> {
        self.telemetry.keys().next_back().copied()
    }

    /// Reopen the artifact to fold in results from another attempt
    pub(crate) fn into_builder(self) -> ArtifactBuilder {
        ArtifactBuilder { artifact: self }
    }
}

/// Accumulates the parts of a [`FileArtifact`]
#[derive(Debug)]
pub struct ArtifactBuilder {
    artifact: FileArtifact,
}

impl ArtifactBuilder {
    pub fn function(mut self, function: FunctionSignature) -> Self {
        self.artifact.functions.push(function);
        self
    }

    pub fn functions(mut self, functions: Vec<FunctionSignature>) -> Self {
        self.artifact.functions.extend(functions);
        self
    }

    pub fn class(mut self, class: ClassSignature) -> Self {
        self.artifact.classes.push(class);
        self
    }

    pub fn classes(mut self, classes: Vec<ClassSignature>) -> Self {
        self.artifact.classes.extend(classes);
        self
    }

    pub fn imports(mut self, imports: Vec<ImportStatement>) -> Self {
        self.artifact.imports.extend(imports);
        self
    }

    pub fn syntax_errors(mut self, errors: Vec<SyntaxIssue>) -> Self {
        self.artifact.syntax_errors.extend(errors);
        self
    }

    pub fn comma_corruptions(mut self, corruptions: Vec<CommaCorruption>) -> Self {
        self.artifact.comma_corruptions.extend(corruptions);
        self
    }

    pub fn telemetry(mut self, telemetry: ParserTelemetry) -> Self {
        self.artifact
            .telemetry
            .insert(telemetry.parser_type, telemetry);
        self
    }

    pub fn build(self) -> FileArtifact {
        self.artifact
    }
}

/// Contract shared by the AST, regex and text strategies
///
/// `parse` never fails: internal problems are recorded in the returned
/// telemetry and a best-effort (possibly empty) artifact is still produced.
pub trait ParserStrategy {
    /// Which strategy this is
    fn parser_type(&self) -> ParserType;

    /// Extract an artifact from the content of `file_path` at `commit`
    fn parse(
        &mut self,
        content: &str,
        file_path: &str,
        commit: &str,
    ) -> (FileArtifact, ParserTelemetry);
}

/// Strip quotes and string prefixes from a Python string literal
pub(crate) fn strip_string_literal(literal: &str) -> String {
    let body = literal.trim_start_matches(|c: char| {
        matches!(c, 'r' | 'R' | 'u' | 'U' | 'b' | 'B' | 'f' | 'F')
    });
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(rest) = body.strip_prefix(quote) {
            return rest.strip_suffix(quote).unwrap_or(rest).to_string();
        }
    }
    body.to_string()
}

/// Normalise docstring indentation the way `inspect.cleandoc` does
pub(crate) fn clean_docstring(raw: &str) -> String {
    let expanded = raw.replace('\t', "        ");
    let lines: Vec<&str> = expanded.lines().collect();
    if lines.is_empty() {
        return String::new();
    }

    let margin = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = Vec::with_capacity(lines.len());
    cleaned.push(lines[0].trim().to_string());
    for line in lines.iter().skip(1) {
        let trimmed = match line.get(..margin) {
            Some(prefix) if prefix.trim().is_empty() => &line[margin..],
            _ => line.trim_start(),
        };
        cleaned.push(trimmed.trim_end().to_string());
    }

    while cleaned.first().is_some_and(|l| l.trim().is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|l| l.trim().is_empty()) {
        cleaned.pop();
    }

    cleaned.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_string_literal() {
        assert_eq!(strip_string_literal("\"\"\"doc\"\"\""), "doc");
        assert_eq!(strip_string_literal("r'raw'"), "raw");
        assert_eq!(strip_string_literal("'''open"), "open");
    }

    #[test]
    fn test_clean_docstring() {
        let raw = "Summary line.\n\n        Details here.\n          indented\n    ";
        assert_eq!(
            clean_docstring(raw),
            "Summary line.\n\nDetails here.\n  indented"
        );
        assert_eq!(clean_docstring("  doc  "), "doc");
    }

    #[test]
    fn test_artifact_builder_keeps_path_and_counts() {
        let mut class = ClassSignature::new("Service", 3, 1.0, ParserType::Ast);
        class
            .methods
            .push(FunctionSignature::new("run", 4, 1.0, ParserType::Ast));

        let artifact = FileArtifact::builder("pkg/service.py")
            .function(FunctionSignature::new("main", 10, 1.0, ParserType::Ast))
            .class(class)
            .build();

        assert_eq!(artifact.path(), "pkg/service.py");
        assert_eq!(artifact.element_count(), 3);
        assert!(!artifact.is_corrupted());
    }

    #[test]
    fn test_telemetry_duration_is_non_negative() {
        let telemetry =
            ParserTelemetry::start(ParserType::Text, "a.py", "HEAD").finish(0.7, 0.6, 2, 0);
        assert!(telemetry.parse_time_ms() >= 0.0);
        assert_eq!(telemetry.elements_extracted, 2);
    }

    #[test]
    fn test_interface_differs() {
        let mut a = FunctionSignature::new("f", 1, 1.0, ParserType::Ast);
        let mut b = a.clone();
        assert!(!a.interface_differs(&b));
        b.return_annotation = Some("int".to_string());
        assert!(a.interface_differs(&b));
        a.return_annotation = Some("int".to_string());
        a.lineno = 40;
        assert!(!a.interface_differs(&b));
    }
}
