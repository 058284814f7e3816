//! Repository-level semantic diff analysis
//!
//! Ties the Git layer, the parser chain and the RDF model together.

use super::bisect::{self, CorruptionProbe, CorruptionSearch};
use super::triples::analyze_semantic_differences;
use super::{
    compare_artifacts, ArtifactComparison, CommitPairReport, ComparisonOutcome,
    FunctionalLossSummary, StructuralDiff, TripleComparison,
};
use crate::extract::{FileArtifact, ParserChain};
use crate::rdf::projection::project_diff;
use crate::rdf::{Graph, Projector, Triple};
use crate::repo::{AnalyzerConfig, GitRepository};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How two revisions of one file are compared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CompareMethod {
    /// Signature diff, with the model written to Turtle
    Basic,
    /// Triple-level diff of commit-neutral projections
    #[default]
    Semantic,
}

impl fmt::Display for CompareMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareMethod::Basic => write!(f, "basic"),
            CompareMethod::Semantic => write!(f, "semantic"),
        }
    }
}

/// Result of [`SemanticDiffAnalyzer::compare_file`]
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FileComparison {
    Basic(ComparisonOutcome<ArtifactComparison>),
    Semantic(ComparisonOutcome<TripleComparison>),
}

impl FileComparison {
    pub fn error(&self) -> Option<&str> {
        match self {
            FileComparison::Basic(outcome) => outcome.error(),
            FileComparison::Semantic(outcome) => outcome.error(),
        }
    }
}

/// Result of [`SemanticDiffAnalyzer::compare_files`], keyed by artifact path
#[derive(Debug, Clone, Serialize)]
pub struct BatchComparison {
    pub commit1: String,
    pub commit2: String,
    pub method: CompareMethod,
    pub artifacts: BTreeMap<String, FileComparison>,
}

impl BatchComparison {
    /// Paths whose comparison did not complete
    pub fn failures(&self) -> impl Iterator<Item = &str> {
        self.artifacts
            .iter()
            .filter(|(_, comparison)| comparison.error().is_some())
            .map(|(path, _)| path.as_str())
    }
}

/// Combined result of a full run
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub corruption_analysis: CorruptionSearch,
    pub functional_loss_analysis: FunctionalLossSummary,
    pub model_path: String,
}

/// Analyzes Python files of one repository across commits
pub struct SemanticDiffAnalyzer {
    repo: GitRepository,
    config: AnalyzerConfig,
    chain: ParserChain,
    current_branch: String,
    model: Graph,
}

impl SemanticDiffAnalyzer {
    /// Open the repository at `path` with its stored configuration
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = GitRepository::open(path)?;
        let config = AnalyzerConfig::load_or_default(repo.root())?;
        Self::with_config(repo, config)
    }

    /// Create an analyzer with an explicit configuration
    pub fn with_config(repo: GitRepository, config: AnalyzerConfig) -> Result<Self> {
        let chain = ParserChain::new(config.parser, config.text_fallback_ratio)
            .context("Failed to initialize parser chain")?;
        let current_branch = repo.current_branch()?;
        debug!("Analyzer on branch {} at {:?}", current_branch, repo.root());

        Ok(Self {
            repo,
            config,
            chain,
            current_branch,
            model: Graph::new(),
        })
    }

    pub fn repository(&self) -> &GitRepository {
        &self.repo
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Branch checked out when the analyzer was created
    pub fn current_branch(&self) -> &str {
        &self.current_branch
    }

    /// Accumulated RDF model
    pub fn model(&self) -> &Graph {
        &self.model
    }

    /// Discard the accumulated model
    pub fn reset_model(&mut self) {
        self.model = Graph::new();
    }

    /// Hand over the accumulated model, leaving an empty one behind
    pub fn take_model(&mut self) -> Graph {
        std::mem::take(&mut self.model)
    }

    /// Tracked Python files not matched by an ignore pattern
    pub fn get_python_files(&self) -> Result<Vec<String>> {
        let files = self.repo.python_files()?;
        Ok(files
            .into_iter()
            .filter(|path| !self.config.should_ignore(path))
            .collect())
    }

    /// Content of `path` at `commit`, empty when the file does not exist there
    pub fn get_file_content(&self, path: &str, commit: &str) -> Result<String> {
        Ok(self.repo.file_content(path, commit)?)
    }

    /// Parse `path` at `commit`; `None` when there is nothing to parse
    pub fn analyze_file(&mut self, path: &str, commit: &str) -> Result<Option<FileArtifact>> {
        let content = self.get_file_content(path, commit)?;
        Ok(self.analyze_content(&content, path, commit))
    }

    fn analyze_content(
        &mut self,
        content: &str,
        path: &str,
        commit: &str,
    ) -> Option<FileArtifact> {
        if content.is_empty() {
            debug!("{} is empty or missing at {}", path, commit);
            return None;
        }
        Some(self.chain.parse(content, path, commit))
    }

    /// Structural diff of `current` against `previous`
    pub fn compare_artifacts(
        &self,
        current: &FileArtifact,
        previous: &FileArtifact,
    ) -> StructuralDiff {
        compare_artifacts(current, previous)
    }

    /// Compare every tracked file between two commits
    ///
    /// Files missing from either commit are skipped. Every compared pair is
    /// added to the model.
    pub fn analyze_commit_pair(
        &mut self,
        commit1: &str,
        commit2: &str,
    ) -> Result<CommitPairReport> {
        info!("Analyzing commit pair {} and {}", commit1, commit2);
        let mut report = CommitPairReport::new(commit1, commit2);

        for path in self.get_python_files()? {
            let current = self.analyze_file(&path, commit1)?;
            let previous = self.analyze_file(&path, commit2)?;
            let (Some(current), Some(previous)) = (current, previous) else {
                debug!("Skipping {}: not present in both commits", path);
                continue;
            };

            let diff = compare_artifacts(&current, &previous);
            self.add_diff_to_model(&current, &previous, &diff, commit1, commit2);
            report.record(&current, &previous, diff);
        }

        info!(
            "Analyzed {} files: {} with corruption, {} with functional loss",
            report.files_analyzed, report.files_with_corruption, report.files_with_functional_loss
        );
        Ok(report)
    }

    /// Locate the commit between `start` and `target` that introduced corruption
    pub fn find_corruption_introduction(
        &mut self,
        start: &str,
        target: &str,
    ) -> Result<CorruptionSearch> {
        info!("Starting corruption search from {} towards {}", start, target);

        let commits = self
            .repo
            .commits_between(start, target)
            .with_context(|| format!("Failed to list commits between {} and {}", start, target))?;
        let mode = self.config.bisect;

        let result = bisect::search(start, target, &commits, mode, |commit| self.probe(commit))?;

        match result.commit.clone() {
            Some(commit) => {
                let details = self.repo.commit_details(&commit)?.to_string();
                info!("Corruption located at {}", details);
                Ok(result.with_details(details))
            }
            None => Ok(result),
        }
    }

    /// Whether any Python file in the tree of `commit` is corrupted
    fn probe(&mut self, commit: &str) -> Result<CorruptionProbe> {
        let mut corrupted = Vec::new();
        for path in self.repo.python_files_at(commit)? {
            if self.config.should_ignore(&path) {
                continue;
            }
            let content = self.repo.file_content(&path, commit)?;
            if let Some(artifact) = self.analyze_content(&content, &path, commit) {
                if artifact.is_corrupted() {
                    corrupted.push(path);
                }
            }
        }
        Ok(CorruptionProbe::new(commit, corrupted))
    }

    /// Functional loss between HEAD and its parent
    pub fn analyze_functional_loss(&mut self) -> Result<FunctionalLossSummary> {
        info!("Analyzing functional loss between HEAD and previous commit");
        let report = self.analyze_commit_pair("HEAD", "HEAD~1")?;
        Ok(FunctionalLossSummary::from(&report))
    }

    /// Add both artifacts and the diff node to the model
    pub fn add_diff_to_model(
        &mut self,
        current: &FileArtifact,
        previous: &FileArtifact,
        diff: &StructuralDiff,
        commit1: &str,
        commit2: &str,
    ) {
        project_diff(&mut self.model, current, previous, diff, commit1, commit2);
    }

    /// Compare one file between two commits
    pub fn compare_file(
        &mut self,
        path: &str,
        commit1: &str,
        commit2: &str,
        method: CompareMethod,
    ) -> Result<FileComparison> {
        info!(
            "Analyzing differences for {} between {} and {} ({})",
            path, commit1, commit2, method
        );
        Ok(match method {
            CompareMethod::Basic => {
                FileComparison::Basic(self.compare_basic(path, commit1, commit2)?)
            }
            CompareMethod::Semantic => {
                FileComparison::Semantic(self.compare_semantic(path, commit1, commit2)?)
            }
        })
    }

    /// Compare several files between two commits
    ///
    /// An empty `paths` compares every tracked Python file. A file that cannot
    /// be compared is recorded as a failed outcome and the batch continues.
    pub fn compare_files(
        &mut self,
        paths: &[String],
        commit1: &str,
        commit2: &str,
        method: CompareMethod,
    ) -> Result<BatchComparison> {
        let paths = if paths.is_empty() {
            self.get_python_files()?
        } else {
            paths.to_vec()
        };
        info!("Comparing {} artifacts between {} and {}", paths.len(), commit1, commit2);

        let mut artifacts = BTreeMap::new();
        for path in paths {
            let comparison = self.compare_file(&path, commit1, commit2, method)?;
            if let Some(error) = comparison.error() {
                warn!("{}", error);
            }
            artifacts.insert(path, comparison);
        }

        Ok(BatchComparison {
            commit1: commit1.to_string(),
            commit2: commit2.to_string(),
            method,
            artifacts,
        })
    }

    fn compare_basic(
        &mut self,
        path: &str,
        commit1: &str,
        commit2: &str,
    ) -> Result<ComparisonOutcome<ArtifactComparison>> {
        let content1 = self.get_file_content(path, commit1)?;
        let content2 = self.get_file_content(path, commit2)?;

        let current = self.analyze_content(&content1, path, commit1);
        let previous = self.analyze_content(&content2, path, commit2);
        let (Some(current), Some(previous)) = (current, previous) else {
            warn!("Failed to analyze {} at one or both commits", path);
            return Ok(failed(
                format!("Failed to analyze {} at one or both commits", path),
                commit1,
                commit2,
                path,
            ));
        };

        let diff = compare_artifacts(&current, &previous);
        self.add_diff_to_model(&current, &previous, &diff, commit1, commit2);

        let output_dir = self.config.output_dir_in(self.repo.root());
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;
        let model_path = output_dir.join(model_file_name(path, commit1, commit2));
        self.save_model(&model_path)?;

        let line_similarity =
            similar::TextDiff::from_lines(content2.as_str(), content1.as_str()).ratio() as f64;

        Ok(ComparisonOutcome::Completed(ArtifactComparison {
            diff,
            commit1: commit1.to_string(),
            commit2: commit2.to_string(),
            artifact_path: path.to_string(),
            line_similarity,
            model_path: model_path.display().to_string(),
        }))
    }

    fn compare_semantic(
        &mut self,
        path: &str,
        commit1: &str,
        commit2: &str,
    ) -> Result<ComparisonOutcome<TripleComparison>> {
        let triples1 = self.extract_triples(path, commit1)?;
        let triples2 = self.extract_triples(path, commit2)?;

        if triples1.is_empty() || triples2.is_empty() {
            warn!("Failed to extract triples from {} at one or both commits", path);
            return Ok(failed(
                format!("Failed to extract triples from {} at one or both commits", path),
                commit1,
                commit2,
                path,
            ));
        }

        let diff = analyze_semantic_differences(&triples1, &triples2);
        debug!("Triple similarity for {}: {:.2}", path, diff.similarity_score);

        Ok(ComparisonOutcome::Completed(TripleComparison {
            diff,
            commit1: commit1.to_string(),
            commit2: commit2.to_string(),
            artifact_path: path.to_string(),
            triple_count1: triples1.len(),
            triple_count2: triples2.len(),
        }))
    }

    /// Flattened triples of a commit-neutral projection of `path` at `commit`
    ///
    /// Everything reachable from the file node is returned, including the
    /// blank nodes for arguments, decorators and imports. A file missing at
    /// `commit` yields none.
    pub fn extract_triples(&mut self, path: &str, commit: &str) -> Result<Vec<Triple>> {
        let Some(artifact) = self.analyze_file(path, commit)? else {
            return Ok(Vec::new());
        };

        let mut graph = Graph::new();
        let file = Projector::neutral().project_artifact(&artifact, &mut graph);

        Ok(graph.triples_reachable_from(file.as_str()))
    }

    /// Write the accumulated model as Turtle
    pub fn save_model(&self, path: &Path) -> Result<()> {
        self.model.save_turtle(path)?;
        info!("Semantic model saved to {:?} ({} statements)", path, self.model.len());
        Ok(())
    }

    /// Corruption search, functional loss and model export in one pass
    pub fn run_analysis(&mut self) -> Result<AnalysisReport> {
        info!("Starting semantic diff analysis");

        let start = self.config.start_commit.clone();
        let target = self.config.target_branch.clone();
        let corruption_analysis = self.find_corruption_introduction(&start, &target)?;
        let functional_loss_analysis = self.analyze_functional_loss()?;

        let model_path = self.model_path();
        if let Some(parent) = model_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory {:?}", parent))?;
        }
        self.save_model(&model_path)?;

        Ok(AnalysisReport {
            corruption_analysis,
            functional_loss_analysis,
            model_path: model_path.display().to_string(),
        })
    }

    fn model_path(&self) -> PathBuf {
        self.config
            .output_dir_in(self.repo.root())
            .join(&self.config.model_file)
    }
}

fn failed<T>(error: String, commit1: &str, commit2: &str, path: &str) -> ComparisonOutcome<T> {
    ComparisonOutcome::Failed {
        error,
        commit1: commit1.to_string(),
        commit2: commit2.to_string(),
        artifact_path: path.to_string(),
    }
}

/// `semantic_diff_{basename}_{commit1}_{commit2}.ttl` with unsafe characters replaced
fn model_file_name(path: &str, commit1: &str, commit2: &str) -> String {
    let basename = Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    format!(
        "semantic_diff_{}_{}_{}.ttl",
        basename,
        sanitize(commit1),
        sanitize(commit2)
    )
}

fn sanitize(revision: &str) -> String {
    revision
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '~' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
