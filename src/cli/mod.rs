//! CLI interface using clap
//!
//! Provides the command-line interface for semdiff

mod commands;

pub use commands::*;

use crate::diff::CompareMethod;
use crate::extract::ParserSelection;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// semdiff - Semantic diff of Python sources across Git commits
#[derive(Parser, Debug)]
#[command(name = "semdiff")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the repository (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    pub path: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json)
    #[arg(short = 'o', long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compare one Python file between two commits
    Compare(CompareArgs),

    /// Compare several Python files between two commits
    Batch(BatchArgs),

    /// Compare every tracked Python file between two commits
    Commits(CommitsArgs),

    /// Find the commit that introduced corruption
    Bisect(BisectArgs),

    /// Report functions and classes lost between HEAD and its parent
    Loss,

    /// Corruption search, functional loss and model export
    Run,

    /// Parse a working-tree file or directory
    Parse(ParseArgs),

    /// Run the BFG9K validation phases over a JSON document
    Validate(ValidateArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Arguments for compare command
#[derive(Parser, Debug)]
pub struct CompareArgs {
    /// First commit to compare (e.g., HEAD)
    pub commit1: String,

    /// Second commit to compare
    pub commit2: String,

    /// Path of the Python file within the repository
    pub artifact_path: String,

    /// Analysis method
    #[arg(short, long, value_enum, default_value_t = CompareMethod::Semantic)]
    pub method: CompareMethod,
}

/// Arguments for batch command
#[derive(Parser, Debug)]
pub struct BatchArgs {
    /// First commit to compare (e.g., HEAD)
    pub commit1: String,

    /// Second commit to compare
    pub commit2: String,

    /// Paths of the Python files (defaults to every tracked Python file)
    pub artifact_paths: Vec<String>,

    /// Analysis method
    #[arg(short, long, value_enum, default_value_t = CompareMethod::Semantic)]
    pub method: CompareMethod,
}

/// Arguments for commits command
#[derive(Parser, Debug)]
pub struct CommitsArgs {
    pub commit1: String,

    pub commit2: String,

    /// Write the resulting model as Turtle
    #[arg(short, long)]
    pub save: Option<PathBuf>,
}

/// Arguments for bisect command
#[derive(Parser, Debug)]
pub struct BisectArgs {
    /// Known-good commit (defaults to the configured start commit)
    #[arg(short, long)]
    pub start: Option<String>,

    /// Branch or commit to search toward (defaults to the configured target)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Probe every commit in order instead of bisecting
    #[arg(long)]
    pub linear: bool,
}

/// Arguments for parse command
#[derive(Parser, Debug)]
pub struct ParseArgs {
    /// File or directory to parse
    pub target: PathBuf,

    /// Strategy selection (defaults to the configured one)
    #[arg(long, value_enum)]
    pub parser: Option<ParserSelection>,
}

/// Arguments for validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// JSON document describing the validation request
    pub file: PathBuf,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// Get a configuration value
    #[arg(long)]
    pub get: Option<String>,

    /// Reset to defaults
    #[arg(long)]
    pub reset: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_defaults_to_semantic() {
        let cli = Cli::parse_from(["semdiff", "compare", "HEAD", "HEAD~1", "pkg/mod.py"]);
        let Commands::Compare(args) = cli.command else {
            panic!("expected compare");
        };
        assert_eq!(args.method, CompareMethod::Semantic);
        assert_eq!(args.artifact_path, "pkg/mod.py");
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "semdiff", "compare", "a", "b", "x.py", "--method", "basic", "-o", "json", "-p",
            "/tmp/repo",
        ]);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.path, "/tmp/repo");
        if let Commands::Compare(args) = cli.command {
            assert_eq!(args.method, CompareMethod::Basic);
        }
    }

    #[test]
    fn test_bisect_and_parse_flags() {
        let cli = Cli::parse_from(["semdiff", "bisect", "--start", "v1", "--linear"]);
        if let Commands::Bisect(args) = cli.command {
            assert_eq!(args.start.as_deref(), Some("v1"));
            assert!(args.target.is_none());
            assert!(args.linear);
        }

        let cli = Cli::parse_from(["semdiff", "parse", "src", "--parser", "regex"]);
        if let Commands::Parse(args) = cli.command {
            assert_eq!(args.parser, Some(ParserSelection::Regex));
        }
    }

    #[test]
    fn test_rejects_unknown_method() {
        let result =
            Cli::try_parse_from(["semdiff", "compare", "a", "b", "x.py", "--method", "fuzzy"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_batch_paths_are_optional() {
        let cli =
            Cli::parse_from(["semdiff", "batch", "HEAD", "HEAD~1", "a.py", "b.py", "-m", "basic"]);
        let Commands::Batch(args) = cli.command else {
            panic!("expected batch");
        };
        assert_eq!(args.artifact_paths, vec!["a.py", "b.py"]);
        assert_eq!(args.method, CompareMethod::Basic);

        let cli = Cli::parse_from(["semdiff", "batch", "HEAD", "HEAD~1"]);
        let Commands::Batch(args) = cli.command else {
            panic!("expected batch");
        };
        assert!(args.artifact_paths.is_empty());
        assert_eq!(args.method, CompareMethod::Semantic);
    }
}
