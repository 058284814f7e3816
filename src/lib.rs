//! semdiff - Multi-strategy semantic diff of Python sources across Git commits
//!
//! This library parses Python files with a chain of strategies (tree-sitter,
//! line regexes, indentation heuristics), compares them across commits,
//! locates the commit that introduced corruption, and exports the findings as
//! an RDF model.

pub mod cli;
pub mod diff;
pub mod extract;
pub mod rdf;
pub mod repo;
pub mod validation;

/// Re-export commonly used types
pub use diff::{analyze_semantic_differences, SemanticDiffAnalyzer, StructuralDiff, TripleDiff};
pub use extract::{FileArtifact, ParserChain, ParserSelection};
pub use rdf::{Graph, Triple};
pub use repo::{AnalyzerConfig, GitRepository};

/// Application-wide error type
pub use anyhow::Result;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "semdiff";
