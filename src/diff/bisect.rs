//! Search history for the commit that introduced corruption
//!
//! The search assumes corruption is monotonic: once a commit is corrupted,
//! every later commit is too. The assumption is checked against the probes
//! taken, and a violation falls back to a linear scan.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// How commits between start and target are searched
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BisectMode {
    #[default]
    Binary,
    Linear,
}

impl fmt::Display for BisectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BisectMode::Binary => write!(f, "binary"),
            BisectMode::Linear => write!(f, "linear"),
        }
    }
}

/// Corruption state of one commit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorruptionProbe {
    pub commit: String,
    pub corrupted: bool,
    /// Python files with syntax issues or comma corruption
    pub corrupted_files: Vec<String>,
}

impl CorruptionProbe {
    pub fn new(commit: &str, corrupted_files: Vec<String>) -> Self {
        Self {
            commit: commit.to_string(),
            corrupted: !corrupted_files.is_empty(),
            corrupted_files,
        }
    }
}

/// Outcome of a corruption search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorruptionSearch {
    pub corruption_found: bool,
    pub commit: Option<String>,
    /// `{short} {author} {YYYY-MM-DD} {summary}` of the located commit
    pub commit_details: Option<String>,
    pub message: String,
    /// Probes in the order they were taken
    pub probes: Vec<CorruptionProbe>,
    /// Mode that produced the answer
    pub mode: BisectMode,
}

impl CorruptionSearch {
    fn not_found(
        start: &str,
        target: &str,
        probes: Vec<CorruptionProbe>,
        mode: BisectMode,
    ) -> Self {
        Self {
            corruption_found: false,
            commit: None,
            commit_details: None,
            message: format!("No corruption found between {} and {}", start, target),
            probes,
            mode,
        }
    }

    /// Attach the one-line description of the located commit
    pub fn with_details(mut self, details: String) -> Self {
        if !self.corruption_found {
            return self;
        }
        // the start commit is always probed first
        let at_start = self.probes.first().map(|p| &p.commit) == self.commit.as_ref();
        if !at_start {
            self.message = format!("Corruption introduced in commit: {}", details);
        }
        self.commit_details = Some(details);
        self
    }
}

/// Caches probe results so no commit is analyzed twice
struct Prober<F> {
    probe: F,
    cache: HashMap<String, bool>,
    taken: Vec<CorruptionProbe>,
}

impl<F> Prober<F>
where
    F: FnMut(&str) -> Result<CorruptionProbe>,
{
    fn corrupted(&mut self, commit: &str) -> Result<bool> {
        if let Some(&corrupted) = self.cache.get(commit) {
            return Ok(corrupted);
        }
        let result = (self.probe)(commit)?;
        debug!(
            "Probed {}: {}",
            commit,
            if result.corrupted { "corrupted" } else { "clean" }
        );
        let corrupted = result.corrupted;
        self.cache.insert(commit.to_string(), corrupted);
        self.taken.push(result);
        Ok(corrupted)
    }

    fn cached(&self, commit: &str) -> Option<bool> {
        self.cache.get(commit).copied()
    }
}

/// Locate the first corrupted commit
///
/// `commits` lists `start..target` oldest first. `probe` reports the
/// corruption state of one commit and is called at most once per commit.
pub fn search<F>(
    start: &str,
    target: &str,
    commits: &[String],
    mode: BisectMode,
    probe: F,
) -> Result<CorruptionSearch>
where
    F: FnMut(&str) -> Result<CorruptionProbe>,
{
    let mut prober = Prober {
        probe,
        cache: HashMap::new(),
        taken: Vec::new(),
    };

    if prober.corrupted(start)? {
        info!("Corruption already present in {}", start);
        return Ok(CorruptionSearch {
            corruption_found: true,
            commit: Some(start.to_string()),
            commit_details: None,
            message: format!("Corruption found in commit {}", start),
            probes: prober.taken,
            mode,
        });
    }

    if commits.is_empty() {
        warn!("No commits found between {} and {}", start, target);
        return Ok(CorruptionSearch::not_found(start, target, prober.taken, mode));
    }

    info!("Found {} commits to check", commits.len());

    let (found, used) = match mode {
        BisectMode::Linear => (linear(commits, &mut prober)?, BisectMode::Linear),
        BisectMode::Binary => {
            let found = binary(commits, &mut prober)?;
            if is_monotonic(commits, &prober) {
                (found, BisectMode::Binary)
            } else {
                warn!("Corruption is not monotonic across the probed commits; scanning linearly");
                (linear(commits, &mut prober)?, BisectMode::Linear)
            }
        }
    };

    Ok(match found {
        Some(index) => {
            let commit = &commits[index];
            CorruptionSearch {
                corruption_found: true,
                commit: Some(commit.clone()),
                commit_details: None,
                message: format!("Corruption introduced in commit: {}", commit),
                probes: prober.taken,
                mode: used,
            }
        }
        None => CorruptionSearch::not_found(start, target, prober.taken, used),
    })
}

fn binary<F>(commits: &[String], prober: &mut Prober<F>) -> Result<Option<usize>>
where
    F: FnMut(&str) -> Result<CorruptionProbe>,
{
    let (mut left, mut right) = (0, commits.len());
    while left < right {
        let mid = (left + right) / 2;
        info!(
            "Checking commit {}/{}: {}",
            mid + 1,
            commits.len(),
            short(&commits[mid])
        );
        if prober.corrupted(&commits[mid])? {
            right = mid;
        } else {
            left = mid + 1;
        }
    }

    let found = (left < commits.len()).then_some(left);
    if let Some(index) = found {
        // the tip must stay corrupted for the answer to hold
        let tip = &commits[commits.len() - 1];
        if index + 1 < commits.len() {
            prober.corrupted(tip)?;
        }
    }
    Ok(found)
}

fn linear<F>(commits: &[String], prober: &mut Prober<F>) -> Result<Option<usize>>
where
    F: FnMut(&str) -> Result<CorruptionProbe>,
{
    for (index, commit) in commits.iter().enumerate() {
        if prober.corrupted(commit)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

/// No clean probe may follow a corrupted one
fn is_monotonic<F>(commits: &[String], prober: &Prober<F>) -> bool
where
    F: FnMut(&str) -> Result<CorruptionProbe>,
{
    let mut seen_corrupted = false;
    for commit in commits {
        match prober.cached(commit) {
            Some(true) => seen_corrupted = true,
            Some(false) if seen_corrupted => return false,
            _ => {}
        }
    }
    true
}

fn short(commit: &str) -> &str {
    commit.get(..8).unwrap_or(commit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn history(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("c{}", i)).collect()
    }

    /// Probe that reports the listed commits as corrupted and counts calls
    fn probe_for<'a>(
        corrupted: &'a HashSet<String>,
        calls: &'a mut Vec<String>,
    ) -> impl FnMut(&str) -> Result<CorruptionProbe> + 'a {
        move |commit| {
            calls.push(commit.to_string());
            let files = if corrupted.contains(commit) {
                vec!["pkg/mod.py".to_string()]
            } else {
                Vec::new()
            };
            Ok(CorruptionProbe::new(commit, files))
        }
    }

    fn corrupted_from(commits: &[String], first: usize) -> HashSet<String> {
        commits[first..].iter().cloned().collect()
    }

    #[test]
    fn test_binary_finds_first_corrupted() {
        let commits = history(16);
        let corrupted = corrupted_from(&commits, 11);
        let mut calls = Vec::new();

        let result = search(
            "base",
            "main",
            &commits,
            BisectMode::Binary,
            probe_for(&corrupted, &mut calls),
        )
        .unwrap();

        assert!(result.corruption_found);
        assert_eq!(result.commit.as_deref(), Some("c11"));
        assert_eq!(result.mode, BisectMode::Binary);
        assert!(result.message.contains("c11"));
        // start + log2(16) steps + tip check
        assert!(calls.len() <= 6, "too many probes: {:?}", calls);
        let unique: HashSet<_> = calls.iter().collect();
        assert_eq!(unique.len(), calls.len());
    }

    #[test]
    fn test_linear_mode_agrees() {
        let commits = history(7);
        let corrupted = corrupted_from(&commits, 3);
        let mut calls = Vec::new();

        let result = search(
            "base",
            "main",
            &commits,
            BisectMode::Linear,
            probe_for(&corrupted, &mut calls),
        )
        .unwrap();

        assert_eq!(result.commit.as_deref(), Some("c3"));
        assert_eq!(result.mode, BisectMode::Linear);
        assert_eq!(calls, vec!["base", "c0", "c1", "c2", "c3"]);
    }

    #[test]
    fn test_corrupted_start_short_circuits() {
        let commits = history(4);
        let corrupted: HashSet<String> = ["base".to_string()].into_iter().collect();
        let mut calls = Vec::new();

        let result = search(
            "base",
            "main",
            &commits,
            BisectMode::Binary,
            probe_for(&corrupted, &mut calls),
        )
        .unwrap();

        assert!(result.corruption_found);
        assert_eq!(result.commit.as_deref(), Some("base"));
        assert_eq!(result.message, "Corruption found in commit base");
        assert_eq!(calls, vec!["base"]);
    }

    #[test]
    fn test_clean_history() {
        let commits = history(5);
        let corrupted = HashSet::new();
        let mut calls = Vec::new();

        let result = search(
            "base",
            "main",
            &commits,
            BisectMode::Binary,
            probe_for(&corrupted, &mut calls),
        )
        .unwrap();

        assert!(!result.corruption_found);
        assert_eq!(result.commit, None);
        assert_eq!(result.message, "No corruption found between base and main");
    }

    #[test]
    fn test_no_commits_in_range() {
        let corrupted = HashSet::new();
        let mut calls = Vec::new();

        let result = search(
            "base",
            "main",
            &[],
            BisectMode::Binary,
            probe_for(&corrupted, &mut calls),
        )
        .unwrap();

        assert!(!result.corruption_found);
        assert_eq!(calls, vec!["base"]);
    }

    #[test]
    fn test_non_monotonic_falls_back_to_linear() {
        let commits = history(8);
        // corruption fixed again at the tip
        let corrupted: HashSet<String> = ["c2", "c3", "c4", "c5", "c6"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut calls = Vec::new();

        let result = search(
            "base",
            "main",
            &commits,
            BisectMode::Binary,
            probe_for(&corrupted, &mut calls),
        )
        .unwrap();

        assert_eq!(result.mode, BisectMode::Linear);
        assert_eq!(result.commit.as_deref(), Some("c2"));
        let unique: HashSet<_> = calls.iter().collect();
        assert_eq!(unique.len(), calls.len());
    }

    #[test]
    fn test_with_details_rewrites_message() {
        let commits = history(2);
        let corrupted = corrupted_from(&commits, 1);
        let mut calls = Vec::new();

        let result = search(
            "base",
            "main",
            &commits,
            BisectMode::Binary,
            probe_for(&corrupted, &mut calls),
        )
        .unwrap()
        .with_details("abc1234 Ada 2024-01-02 Break things".to_string());

        assert_eq!(
            result.message,
            "Corruption introduced in commit: abc1234 Ada 2024-01-02 Break things"
        );
        assert!(result.commit_details.is_some());
    }
}
