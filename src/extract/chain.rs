//! Strategy selection
//!
//! Escalates from the AST strategy to the regex strategy on a syntax error,
//! and from regex to text when regex finds suspiciously few elements for the
//! number of definition-looking lines in the file.

use super::{AstStrategy, FileArtifact, ParserStrategy, RegexStrategy, TextStrategy};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Line prefixes that anchor a definition or import
const ANCHOR_PREFIXES: [&str; 5] = ["def ", "async def ", "class ", "import ", "from "];

/// Which strategies a [`ParserChain`] may use
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ParserSelection {
    /// AST first, escalating to regex and then text
    #[default]
    Auto,
    Ast,
    Regex,
    Text,
}

impl std::fmt::Display for ParserSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParserSelection::Auto => write!(f, "auto"),
            ParserSelection::Ast => write!(f, "ast"),
            ParserSelection::Regex => write!(f, "regex"),
            ParserSelection::Text => write!(f, "text"),
        }
    }
}

/// Runs the configured strategies over one file's content
pub struct ParserChain {
    selection: ParserSelection,
    text_fallback_ratio: f64,
    ast: AstStrategy,
    regex: RegexStrategy,
    text: TextStrategy,
}

impl ParserChain {
    /// Create a chain with the given selection policy
    ///
    /// `text_fallback_ratio` is the minimum number of regex elements per
    /// anchor line below which the text strategy is tried.
    pub fn new(selection: ParserSelection, text_fallback_ratio: f64) -> Result<Self> {
        Ok(Self {
            selection,
            text_fallback_ratio,
            ast: AstStrategy::new()?,
            regex: RegexStrategy::new(),
            text: TextStrategy::new(),
        })
    }

    pub fn selection(&self) -> ParserSelection {
        self.selection
    }

    /// Produce the artifact for `content`
    pub fn parse(&mut self, content: &str, file_path: &str, commit: &str) -> FileArtifact {
        match self.selection {
            ParserSelection::Ast => self.ast.parse(content, file_path, commit).0,
            ParserSelection::Regex => self.regex.parse(content, file_path, commit).0,
            ParserSelection::Text => self.text.parse(content, file_path, commit).0,
            ParserSelection::Auto => self.parse_auto(content, file_path, commit),
        }
    }

    fn parse_auto(&mut self, content: &str, file_path: &str, commit: &str) -> FileArtifact {
        let (ast, ast_telemetry) = self.ast.parse(content, file_path, commit);
        if ast.syntax_errors().is_empty() {
            return ast;
        }
        debug!(
            "{}@{}: syntax error at line {}, falling back to regex",
            file_path,
            commit,
            ast.syntax_errors()[0].lineno
        );

        let (regex, _) = self.regex.parse(content, file_path, commit);
        let anchors = count_anchor_lines(content);
        let threshold = self.text_fallback_ratio * anchors as f64;

        let chosen = if (regex.element_count() as f64) < threshold {
            info!(
                "{}@{}: regex found {} elements for {} anchor lines, falling back to text",
                file_path,
                commit,
                regex.element_count(),
                anchors
            );
            let (text, _) = self.text.parse(content, file_path, commit);
            let mut builder = text.into_builder();
            for telemetry in regex.telemetry().values() {
                builder = builder.telemetry(telemetry.clone());
            }
            builder
        } else {
            regex.into_builder()
        };

        chosen
            .syntax_errors(ast.syntax_errors().to_vec())
            .telemetry(ast_telemetry)
            .build()
    }
}

/// Lines that look like the start of a definition or import
pub fn count_anchor_lines(content: &str) -> usize {
    content
        .lines()
        .map(str::trim)
        .filter(|line| ANCHOR_PREFIXES.iter().any(|p| line.starts_with(p)))
        .count()
}
