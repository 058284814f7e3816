//! Command implementations

use super::{BatchArgs, BisectArgs, CompareArgs, ParseArgs};
use crate::diff::{
    AnalysisReport, ArtifactComparison, BatchComparison, BisectMode, CommitPairReport,
    ComparisonOutcome, CorruptionSearch, FileComparison, FunctionalLossSummary,
    SemanticDiffAnalyzer, TripleComparison,
};
use crate::extract::{FileArtifact, ParserChain};
use crate::repo::{AnalyzerConfig, GitRepository};
use crate::validation::{Bfg9kPhase, Bfg9kValidator, PhaseVerdict};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const RULE: &str = "================================================================================";

/// Repository root containing `path`, or `path` itself outside a repository
pub fn config_root(path: &Path) -> PathBuf {
    match GitRepository::open(path) {
        Ok(repo) => repo.root().to_path_buf(),
        Err(_) => path.to_path_buf(),
    }
}

/// Compare one file between two commits
pub fn compare(path: &Path, args: &CompareArgs) -> Result<FileComparison> {
    let mut analyzer = SemanticDiffAnalyzer::new(path)?;
    analyzer.compare_file(&args.artifact_path, &args.commit1, &args.commit2, args.method)
}

/// Compare a list of files between two commits
pub fn batch(path: &Path, args: &BatchArgs) -> Result<BatchComparison> {
    let mut analyzer = SemanticDiffAnalyzer::new(path)?;
    analyzer.compare_files(&args.artifact_paths, &args.commit1, &args.commit2, args.method)
}

/// Compare every tracked file between two commits
pub fn commits(
    path: &Path,
    commit1: &str,
    commit2: &str,
    save: Option<&Path>,
) -> Result<CommitPairReport> {
    let mut analyzer = SemanticDiffAnalyzer::new(path)?;
    let report = analyzer.analyze_commit_pair(commit1, commit2)?;
    if let Some(output) = save {
        analyzer.save_model(output)?;
    }
    Ok(report)
}

/// Search for the commit that introduced corruption
pub fn bisect(path: &Path, args: &BisectArgs) -> Result<CorruptionSearch> {
    let repo = GitRepository::open(path)?;
    let mut config = AnalyzerConfig::load_or_default(repo.root())?;
    if args.linear {
        config.bisect = BisectMode::Linear;
    }
    let start = args.start.clone().unwrap_or_else(|| config.start_commit.clone());
    let target = args.target.clone().unwrap_or_else(|| config.target_branch.clone());

    let mut analyzer = SemanticDiffAnalyzer::with_config(repo, config)?;
    analyzer.find_corruption_introduction(&start, &target)
}

/// Functional loss between HEAD and HEAD~1
pub fn loss(path: &Path) -> Result<FunctionalLossSummary> {
    let mut analyzer = SemanticDiffAnalyzer::new(path)?;
    analyzer.analyze_functional_loss()
}

/// Full analysis with model export
pub fn run(path: &Path) -> Result<AnalysisReport> {
    let mut analyzer = SemanticDiffAnalyzer::new(path)?;
    analyzer.run_analysis()
}

/// Parse a working-tree file, or every Python file under a directory
pub fn parse(path: &Path, args: &ParseArgs) -> Result<Vec<FileArtifact>> {
    let config = AnalyzerConfig::load_or_default(&config_root(path))?;
    let selection = args.parser.unwrap_or(config.parser);
    let mut chain = ParserChain::new(selection, config.text_fallback_ratio)?;

    let target = &args.target;
    if !target.exists() {
        anyhow::bail!("Target not found: {:?}", target);
    }

    let files: Vec<PathBuf> = if target.is_dir() {
        WalkDir::new(target)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|file| file.extension().is_some_and(|ext| ext == "py"))
            .filter(|file| {
                let relative = file.strip_prefix(target).unwrap_or(file);
                !config.should_ignore(&relative.to_string_lossy())
            })
            .collect()
    } else {
        vec![target.clone()]
    };

    let mut artifacts = Vec::with_capacity(files.len());
    for file in files {
        let content = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read {:?}", file))?;
        let name = file.to_string_lossy();
        artifacts.push(chain.parse(&content, &name, "WORKTREE"));
    }
    Ok(artifacts)
}

/// Run the BFG9K phases over a JSON document
pub fn validate(path: &Path, file: &Path) -> Result<Vec<PhaseVerdict>> {
    let config = AnalyzerConfig::load_or_default(&config_root(path))?;
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {:?}", file))?;
    let data: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON in {:?}", file))?;

    let mut validator = Bfg9kValidator::from_settings(&config.validation);
    Ok(validator.run(&data)?)
}

/// Print any report as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "None".to_string()
    } else {
        items.join(", ")
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

/// Print a file comparison in the fixed text layout
pub fn print_comparison_text(comparison: &FileComparison, path: &str) {
    println!("\n{}", RULE);
    println!("SEMANTIC DIFF ANALYSIS FOR {}", path);
    println!("{}", RULE);

    if let Some(error) = comparison.error() {
        println!("Error: {}", error);
        return;
    }

    match comparison {
        FileComparison::Basic(ComparisonOutcome::Completed(result)) => print_basic(result),
        FileComparison::Semantic(ComparisonOutcome::Completed(result)) => print_semantic(result),
        _ => {}
    }
    println!("{}", RULE);
}

/// Print every comparison of a batch followed by a tally
pub fn print_batch_text(batch: &BatchComparison) {
    for (path, comparison) in &batch.artifacts {
        print_comparison_text(comparison, path);
    }

    let failed = batch.failures().count();
    println!(
        "\n{} artifact(s) compared between {} and {} ({}), {} failed",
        batch.artifacts.len(),
        batch.commit1,
        batch.commit2,
        batch.method,
        failed
    );
}

fn print_basic(result: &ArtifactComparison) {
    let diff = &result.diff;
    println!(
        "Comparing {} between {} and {}",
        result.artifact_path, result.commit1, result.commit2
    );
    println!("\nAdded functions: {}", list_or_none(&diff.added_functions));
    println!("Removed functions: {}", list_or_none(&diff.removed_functions));
    println!("Modified functions: {}", list_or_none(&diff.modified_functions));
    println!("\nAdded classes: {}", list_or_none(&diff.added_classes));
    println!("Removed classes: {}", list_or_none(&diff.removed_classes));
    println!("Modified classes: {}", list_or_none(&diff.modified_classes));
    for (class, methods) in &diff.removed_methods {
        println!("Removed methods of {}: {}", class, methods.join(", "));
    }

    println!("\nSyntax errors fixed: {}", diff.syntax_errors_fixed.len());
    println!("Syntax errors introduced: {}", diff.syntax_errors_introduced.len());
    println!("Comma corruptions fixed: {}", diff.comma_corruptions_fixed.len());
    println!("Comma corruptions introduced: {}", diff.comma_corruptions_introduced.len());

    println!("\nFunctional loss detected: {}", yes_no(diff.functional_loss));
    println!("Corruption detected: {}", yes_no(diff.corruption_detected));
    println!("Line similarity: {:.2}", result.line_similarity);

    println!("\nSemantic model saved to: {}", result.model_path);
}

fn print_semantic(result: &TripleComparison) {
    let diff = &result.diff;
    println!(
        "Comparing {} between {} and {}",
        result.artifact_path, result.commit1, result.commit2
    );
    println!("Triple count in {}: {}", result.commit1, result.triple_count1);
    println!("Triple count in {}: {}", result.commit2, result.triple_count2);
    println!("Similarity score: {:.2}", diff.similarity_score);

    println!("\nUnchanged triples: {}", diff.unchanged.len());
    println!("Modified triples: {}", diff.modified.len());
    println!("Added triples: {}", diff.added.len());
    println!("Removed triples: {}", diff.removed.len());

    if !diff.modified.is_empty() {
        println!("\nModified triples (sample):");
        let sample = &diff.modified[..diff.modified.len().min(5)];
        for (i, modified) in sample.iter().enumerate() {
            let changes: Vec<String> = modified.changes.iter().map(|c| c.to_string()).collect();
            println!("  Original: {}", modified.original);
            println!("  Modified: {}", modified.modified);
            println!("  Changes: {}", changes.join(", "));
            if i + 1 < sample.len() {
                println!();
            }
        }
    }
}

/// Print a commit pair report
pub fn print_commit_pair_text(report: &CommitPairReport) {
    println!("Commit pair: {} vs {}", report.commit1, report.commit2);
    println!("  Files analyzed: {}", report.files_analyzed);
    println!("  Files with corruption: {}", report.files_with_corruption);
    println!("  Files with functional loss: {}", report.files_with_functional_loss);
    println!("  Syntax errors: {}", report.total_syntax_errors);
    println!("  Comma corruptions: {}", report.total_comma_corruptions);

    let changed: Vec<_> = report.file_diffs.iter().filter(|d| !d.is_empty()).collect();
    if changed.is_empty() {
        println!("\nNo structural changes.");
        return;
    }

    println!();
    for diff in changed {
        let marker = if diff.functional_loss { "!" } else { "~" };
        println!("{} {}", marker, diff.path);
        if !diff.removed_functions.is_empty() {
            println!("    removed functions: {}", diff.removed_functions.join(", "));
        }
        if !diff.removed_classes.is_empty() {
            println!("    removed classes: {}", diff.removed_classes.join(", "));
        }
        for (class, methods) in &diff.removed_methods {
            println!("    removed methods of {}: {}", class, methods.join(", "));
        }
        if !diff.added_functions.is_empty() {
            println!("    added functions: {}", diff.added_functions.join(", "));
        }
        if !diff.modified_functions.is_empty() {
            println!("    modified functions: {}", diff.modified_functions.join(", "));
        }
        if diff.corruption_detected {
            println!("    corruption in {}", report.commit2);
        }
    }
}

/// Print a corruption search result
pub fn print_search_text(search: &CorruptionSearch) {
    if search.corruption_found {
        println!("✓ Corruption found: {}", search.message);
    } else {
        println!("✗ No corruption found: {}", search.message);
    }
    println!("  Probes: {} ({} search)", search.probes.len(), search.mode);
    for probe in search.probes.iter().filter(|p| p.corrupted) {
        let short = probe.commit.get(..8).unwrap_or(&probe.commit);
        println!("  {} corrupted: {}", short, probe.corrupted_files.join(", "));
    }
}

/// Print a functional loss summary
pub fn print_loss_text(loss: &FunctionalLossSummary) {
    println!("Files analyzed: {}", loss.total_files_analyzed);
    println!("Files with functional loss: {}", loss.files_with_functional_loss);
    println!("Total functions lost: {}", loss.total_functions_lost);
    println!("Total classes lost: {}", loss.total_classes_lost);
    println!("Total methods lost: {}", loss.total_methods_lost);

    if loss.files_with_loss.is_empty() {
        return;
    }

    println!("\nFiles with functional loss:");
    for file in &loss.files_with_loss {
        println!("\n{}:", file.path);
        if !file.lost_functions.is_empty() {
            println!("  Lost functions:");
            for function in &file.lost_functions {
                println!("    - {}", function);
            }
        }
        if !file.lost_classes.is_empty() {
            println!("  Lost classes:");
            for class in &file.lost_classes {
                println!("    - {}", class);
            }
        }
        for (class, methods) in &file.lost_methods {
            println!("  Lost methods of {}:", class);
            for method in methods {
                println!("    - {}", method);
            }
        }
    }
}

/// Print the result of a full run
pub fn print_analysis_text(report: &AnalysisReport) {
    println!("\n{}", RULE);
    println!("CORRUPTION ANALYSIS RESULTS");
    println!("{}", RULE);
    print_search_text(&report.corruption_analysis);

    println!("\n{}", RULE);
    println!("FUNCTIONAL LOSS ANALYSIS RESULTS");
    println!("{}", RULE);
    print_loss_text(&report.functional_loss_analysis);

    println!("\nSemantic model saved to: {}", report.model_path);
}

/// Print parsed artifacts
pub fn print_artifacts_text(artifacts: &[FileArtifact]) {
    if artifacts.is_empty() {
        println!("No Python files found.");
        return;
    }

    for artifact in artifacts {
        let parser = artifact
            .selected_parser()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let methods: usize = artifact.classes().iter().map(|c| c.methods.len()).sum();
        println!(
            "{} [{}]: {} functions, {} classes, {} methods, {} imports",
            artifact.path(),
            parser,
            artifact.functions().len(),
            artifact.classes().len(),
            methods,
            artifact.imports().len()
        );
        for issue in artifact.syntax_errors() {
            println!("  syntax error: line {}", issue.key());
        }
        for corruption in artifact.comma_corruptions() {
            println!("  comma corruption: line {}", corruption.key());
        }
    }

    let corrupted = artifacts.iter().filter(|a| a.is_corrupted()).count();
    println!("\n{} file(s) parsed, {} corrupted", artifacts.len(), corrupted);
}

/// Print BFG9K verdicts
pub fn print_verdicts_text(verdicts: &[PhaseVerdict]) {
    for verdict in verdicts {
        let icon = if verdict.valid { "✓" } else { "✗" };
        match verdict.similarity_score {
            Some(score) => println!(
                "{} {}: {} (score {:.2}{})",
                icon,
                verdict.phase,
                verdict.detail,
                score,
                if verdict.cache_hit { ", cached" } else { "" }
            ),
            None => println!("{} {}: {}", icon, verdict.phase, verdict.detail),
        }
    }

    let passed = verdicts.iter().all(|v| v.valid) && verdicts.len() == Bfg9kPhase::ALL.len();
    println!(
        "\nValidation {}",
        if passed { "passed" } else { "failed" }
    );
}
