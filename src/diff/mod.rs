//! Semantic diff engine
//!
//! This module compares Python artifacts across commits by:
//! - Diffing signatures by name (structural diff)
//! - Diffing flattened RDF triples (triple-level diff)
//! - Searching history for the commit that introduced corruption

mod analyzer;
mod bisect;
mod triples;

pub use analyzer::{
    AnalysisReport, BatchComparison, CompareMethod, FileComparison, SemanticDiffAnalyzer,
};
pub use bisect::{BisectMode, CorruptionProbe, CorruptionSearch};
pub use triples::{analyze_semantic_differences, Change, ModifiedTriple, TripleDiff};

use crate::extract::FileArtifact;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Differences between two revisions of one file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StructuralDiff {
    pub path: String,
    pub added_functions: Vec<String>,
    pub removed_functions: Vec<String>,
    /// Same name, different args, kwargs or return annotation
    pub modified_functions: Vec<String>,
    pub added_classes: Vec<String>,
    pub removed_classes: Vec<String>,
    /// Same name, different bases or method set
    pub modified_classes: Vec<String>,
    /// Methods gone from classes present in both revisions
    pub removed_methods: BTreeMap<String, Vec<String>>,
    pub syntax_errors_fixed: Vec<String>,
    pub syntax_errors_introduced: Vec<String>,
    pub comma_corruptions_fixed: Vec<String>,
    pub comma_corruptions_introduced: Vec<String>,
    /// Any function, class or method was removed
    pub functional_loss: bool,
    /// The previous revision had a syntax error or comma corruption
    pub corruption_detected: bool,
}

impl StructuralDiff {
    /// Whether nothing at all changed
    pub fn is_empty(&self) -> bool {
        self.added_functions.is_empty()
            && self.removed_functions.is_empty()
            && self.modified_functions.is_empty()
            && self.added_classes.is_empty()
            && self.removed_classes.is_empty()
            && self.modified_classes.is_empty()
            && self.syntax_errors_fixed.is_empty()
            && self.syntax_errors_introduced.is_empty()
            && self.comma_corruptions_fixed.is_empty()
            && self.comma_corruptions_introduced.is_empty()
    }
}

/// Index by name; a later definition shadows an earlier one, the first
/// occurrence fixes the order
fn by_name<'a, T, F>(items: &'a [T], name: F) -> (Vec<&'a str>, BTreeMap<&'a str, &'a T>)
where
    F: Fn(&'a T) -> &'a str,
{
    let mut order = Vec::new();
    let mut index = BTreeMap::new();
    for item in items {
        let key = name(item);
        if index.insert(key, item).is_none() {
            order.push(key);
        }
    }
    (order, index)
}

/// Sorted set difference of rendered keys
fn only_in(left: &BTreeSet<String>, right: &BTreeSet<String>) -> Vec<String> {
    left.difference(right).cloned().collect()
}

/// Compare `current` against the older `previous` revision of the same file
pub fn compare_artifacts(current: &FileArtifact, previous: &FileArtifact) -> StructuralDiff {
    let mut diff = StructuralDiff {
        path: current.path().to_string(),
        ..Default::default()
    };

    let (current_order, current_funcs) = by_name(current.functions(), |f| f.name.as_str());
    let (previous_order, previous_funcs) = by_name(previous.functions(), |f| f.name.as_str());

    for name in &current_order {
        match previous_funcs.get(name) {
            None => diff.added_functions.push(name.to_string()),
            Some(prev) if current_funcs[name].interface_differs(prev) => {
                diff.modified_functions.push(name.to_string())
            }
            Some(_) => {}
        }
    }
    for name in &previous_order {
        if !current_funcs.contains_key(name) {
            diff.removed_functions.push(name.to_string());
        }
    }

    let (current_order, current_classes) = by_name(current.classes(), |c| c.name.as_str());
    let (previous_order, previous_classes) = by_name(previous.classes(), |c| c.name.as_str());

    for name in &current_order {
        let Some(prev) = previous_classes.get(name) else {
            diff.added_classes.push(name.to_string());
            continue;
        };
        let class = current_classes[name];

        let current_methods: BTreeSet<&str> =
            class.methods.iter().map(|m| m.name.as_str()).collect();
        let previous_methods: BTreeSet<&str> =
            prev.methods.iter().map(|m| m.name.as_str()).collect();

        let removed: Vec<String> = prev
            .methods
            .iter()
            .map(|m| m.name.as_str())
            .filter(|m| !current_methods.contains(m))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();

        if class.bases != prev.bases
            || class.methods.len() != prev.methods.len()
            || current_methods != previous_methods
        {
            diff.modified_classes.push(name.to_string());
        }
        if !removed.is_empty() {
            diff.removed_methods.insert(name.to_string(), removed);
        }
    }
    for name in &previous_order {
        if !current_classes.contains_key(name) {
            diff.removed_classes.push(name.to_string());
        }
    }

    let current_errors: BTreeSet<String> =
        current.syntax_errors().iter().map(|e| e.key()).collect();
    let previous_errors: BTreeSet<String> =
        previous.syntax_errors().iter().map(|e| e.key()).collect();
    diff.syntax_errors_fixed = only_in(&previous_errors, &current_errors);
    diff.syntax_errors_introduced = only_in(&current_errors, &previous_errors);

    let current_commas: BTreeSet<String> =
        current.comma_corruptions().iter().map(|c| c.key()).collect();
    let previous_commas: BTreeSet<String> =
        previous.comma_corruptions().iter().map(|c| c.key()).collect();
    diff.comma_corruptions_fixed = only_in(&previous_commas, &current_commas);
    diff.comma_corruptions_introduced = only_in(&current_commas, &previous_commas);

    diff.functional_loss = !diff.removed_functions.is_empty()
        || !diff.removed_classes.is_empty()
        || !diff.removed_methods.is_empty();
    diff.corruption_detected = previous.is_corrupted();

    diff
}

/// Aggregate over every tracked file for one pair of commits
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommitPairReport {
    pub commit1: String,
    pub commit2: String,
    pub files_analyzed: usize,
    pub files_with_corruption: usize,
    pub files_with_functional_loss: usize,
    /// Syntax errors across both revisions of every analyzed file
    pub total_syntax_errors: usize,
    pub total_comma_corruptions: usize,
    pub file_diffs: Vec<StructuralDiff>,
}

impl CommitPairReport {
    pub fn new(commit1: &str, commit2: &str) -> Self {
        Self {
            commit1: commit1.to_string(),
            commit2: commit2.to_string(),
            ..Default::default()
        }
    }

    /// Fold one file's comparison into the totals
    pub fn record(
        &mut self,
        current: &FileArtifact,
        previous: &FileArtifact,
        diff: StructuralDiff,
    ) {
        self.files_analyzed += 1;
        if diff.corruption_detected {
            self.files_with_corruption += 1;
        }
        if diff.functional_loss {
            self.files_with_functional_loss += 1;
        }
        self.total_syntax_errors += current.syntax_errors().len() + previous.syntax_errors().len();
        self.total_comma_corruptions +=
            current.comma_corruptions().len() + previous.comma_corruptions().len();
        self.file_diffs.push(diff);
    }
}

/// What one file lost between two commits
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileLoss {
    pub path: String,
    pub lost_functions: Vec<String>,
    pub lost_classes: Vec<String>,
    pub lost_methods: BTreeMap<String, Vec<String>>,
}

/// Functional loss between HEAD and its parent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionalLossSummary {
    pub total_files_analyzed: usize,
    pub files_with_functional_loss: usize,
    pub total_functions_lost: usize,
    pub total_classes_lost: usize,
    pub total_methods_lost: usize,
    pub files_with_loss: Vec<FileLoss>,
}

impl From<&CommitPairReport> for FunctionalLossSummary {
    fn from(report: &CommitPairReport) -> Self {
        let diffs = &report.file_diffs;
        Self {
            total_files_analyzed: report.files_analyzed,
            files_with_functional_loss: report.files_with_functional_loss,
            total_functions_lost: diffs.iter().map(|d| d.removed_functions.len()).sum(),
            total_classes_lost: diffs.iter().map(|d| d.removed_classes.len()).sum(),
            total_methods_lost: diffs
                .iter()
                .flat_map(|d| d.removed_methods.values())
                .map(Vec::len)
                .sum(),
            files_with_loss: diffs
                .iter()
                .filter(|d| d.functional_loss)
                .map(|d| FileLoss {
                    path: d.path.clone(),
                    lost_functions: d.removed_functions.clone(),
                    lost_classes: d.removed_classes.clone(),
                    lost_methods: d.removed_methods.clone(),
                })
                .collect(),
        }
    }
}

/// Result of the basic (structural) file comparison
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactComparison {
    #[serde(flatten)]
    pub diff: StructuralDiff,
    pub commit1: String,
    pub commit2: String,
    pub artifact_path: String,
    /// Ratio of matching lines between the two revisions (0.0 - 1.0)
    pub line_similarity: f64,
    /// Turtle file written for this comparison
    pub model_path: String,
}

/// Result of the semantic (triple-level) file comparison
#[derive(Debug, Clone, Serialize)]
pub struct TripleComparison {
    #[serde(flatten)]
    pub diff: TripleDiff,
    pub commit1: String,
    pub commit2: String,
    pub artifact_path: String,
    pub triple_count1: usize,
    pub triple_count2: usize,
}

/// A file comparison, or the reason it could not be made
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ComparisonOutcome<T> {
    Completed(T),
    Failed {
        error: String,
        commit1: String,
        commit2: String,
        artifact_path: String,
    },
}

impl<T> ComparisonOutcome<T> {
    pub fn error(&self) -> Option<&str> {
        match self {
            ComparisonOutcome::Completed(_) => None,
            ComparisonOutcome::Failed { error, .. } => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{AstStrategy, ParserStrategy};

    fn artifact(source: &str) -> FileArtifact {
        AstStrategy::new().unwrap().parse(source, "svc.py", "HEAD").0
    }

    #[test]
    fn test_removed_function_is_functional_loss() {
        let previous = artifact("def foo():\n    pass\n\ndef bar():\n    pass\n");
        let current = artifact("def foo():\n    pass\n");

        let diff = compare_artifacts(&current, &previous);
        assert_eq!(diff.removed_functions, vec!["bar"]);
        assert!(diff.functional_loss);
        assert!(diff.added_functions.is_empty());
    }

    #[test]
    fn test_identical_content_yields_empty_diff() {
        let source = "\
import os

class A(B):
    def m(self):
        pass

def f(x, *, y=1):
    pass
";
        let diff = compare_artifacts(&artifact(source), &artifact(source));
        assert!(diff.is_empty());
        assert!(!diff.functional_loss);
        assert!(!diff.corruption_detected);
        assert_eq!(diff.path, "svc.py");
    }

    #[test]
    fn test_modified_functions_and_classes() {
        let previous = artifact(
            "\
def f(a):
    pass

def g(a) -> int:
    pass

class K(Base):
    def keep(self):
        pass
    def drop(self):
        pass

class Same:
    pass
",
        );
        let current = artifact(
            "\
def f(a, b):
    pass

def g(a) -> int:
    return 1

def h():
    pass

class K(Base):
    def keep(self):
        pass
    def added(self):
        pass

class Same:
    pass
",
        );

        let diff = compare_artifacts(&current, &previous);
        assert_eq!(diff.modified_functions, vec!["f"]);
        assert_eq!(diff.added_functions, vec!["h"]);
        assert_eq!(diff.modified_classes, vec!["K"]);
        assert_eq!(diff.removed_methods.get("K"), Some(&vec!["drop".to_string()]));
        assert!(diff.functional_loss);
    }

    #[test]
    fn test_added_method_is_modification_without_loss() {
        let previous = artifact("class K:\n    def a(self):\n        pass\n");
        let current =
            artifact("class K:\n    def a(self):\n        pass\n    def b(self):\n        pass\n");

        let diff = compare_artifacts(&current, &previous);
        assert_eq!(diff.modified_classes, vec!["K"]);
        assert!(diff.removed_methods.is_empty());
        assert!(!diff.functional_loss);
    }

    #[test]
    fn test_corruption_sets() {
        let previous = artifact("x = 1\n,y = 2\n");
        let current = artifact("x = 1\ny = 2\nz = (,3)\n");

        let diff = compare_artifacts(&current, &previous);
        assert!(diff.corruption_detected);
        assert_eq!(diff.comma_corruptions_fixed, vec!["2: Line starts with comma: ,y = 2"]);
        assert_eq!(
            diff.comma_corruptions_introduced,
            vec!["3: Comma after opening parenthesis: z = (,3)"]
        );
        assert_eq!(previous.syntax_errors().len(), 1);
        assert_eq!(current.syntax_errors().len(), 1);

        let reverse = compare_artifacts(&previous, &current);
        assert!(reverse.corruption_detected);
    }

    #[test]
    fn test_commit_pair_report_totals() {
        let previous = artifact("def a():\n    pass\n\ns = \"a,,b\"\n");
        let current = artifact("def b():\n    pass\n");
        let diff = compare_artifacts(&current, &previous);

        let mut report = CommitPairReport::new("HEAD", "HEAD~1");
        report.record(&current, &previous, diff);

        assert_eq!(report.files_analyzed, 1);
        assert_eq!(report.files_with_corruption, 1);
        assert_eq!(report.total_syntax_errors, 0);
        assert_eq!(report.total_comma_corruptions, 1);

        let summary = FunctionalLossSummary::from(&report);
        assert_eq!(summary.files_with_functional_loss, 1);
        assert_eq!(summary.files_with_loss[0].path, "svc.py");
    }

    #[test]
    fn test_failed_outcome_serialises_as_error_object() {
        let outcome: ComparisonOutcome<StructuralDiff> = ComparisonOutcome::Failed {
            error: "Failed to analyze a.py at one or both commits".to_string(),
            commit1: "HEAD".to_string(),
            commit2: "HEAD~1".to_string(),
            artifact_path: "a.py".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["error"], "Failed to analyze a.py at one or both commits");
        assert_eq!(outcome.error(), Some("Failed to analyze a.py at one or both commits"));
    }
}
