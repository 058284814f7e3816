//! Git repository access
//!
//! This module handles every Git operation the analyzer needs:
//! - Opening a repository and resolving the current branch
//! - Listing tracked Python files
//! - Reading file content as stored in a given commit
//! - Walking the commit range between two revisions

mod config;

pub use config::{AnalyzerConfig, ValidationSettings, CONFIG_DIR};

use chrono::DateTime;
use git2::{ObjectType, Repository as GitRepo, Sort, TreeWalkMode, TreeWalkResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures talking to Git
#[derive(Debug, Error)]
pub enum GitError {
    /// No usable repository at the requested location
    #[error("no Git repository found at {path:?}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    /// A revision that does not name a commit
    #[error("cannot resolve revision '{revision}'")]
    Revision {
        revision: String,
        #[source]
        source: git2::Error,
    },

    #[error("git operation failed")]
    Git(#[from] git2::Error),
}

/// Metadata of one commit, as printed in bisection reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitInfo {
    pub id: String,
    pub short_id: String,
    pub author: String,
    /// Commit date as `YYYY-MM-DD`
    pub date: String,
    pub summary: String,
}

impl std::fmt::Display for CommitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {} {}", self.short_id, self.author, self.date, self.summary)
    }
}

/// A Git repository being analyzed
pub struct GitRepository {
    repo: GitRepo,
    root: PathBuf,
}

impl GitRepository {
    /// Open the repository containing `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let path = path.as_ref();
        let repo = GitRepo::discover(path).map_err(|source| GitError::Unavailable {
            path: path.to_path_buf(),
            source,
        })?;

        let root = match repo.workdir() {
            Some(dir) => dir.to_path_buf(),
            None => repo.path().to_path_buf(),
        };

        Ok(Self { repo, root })
    }

    /// Working directory root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Short name of the checked-out branch, or `HEAD` when detached or unborn
    pub fn current_branch(&self) -> Result<String, GitError> {
        match self.repo.head() {
            Ok(head) if head.is_branch() => Ok(head.shorthand().unwrap_or("HEAD").to_string()),
            Ok(_) => Ok("HEAD".to_string()),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok("HEAD".to_string()),
            Err(e) => Err(e.into()),
        }
    }

    /// Full id of the commit HEAD points at
    pub fn head_commit(&self) -> Result<String, GitError> {
        Ok(self.resolve("HEAD")?.id().to_string())
    }

    /// `*.py` paths in the index, sorted
    pub fn python_files(&self) -> Result<Vec<String>, GitError> {
        let index = self.repo.index()?;
        let mut files: Vec<String> = index
            .iter()
            .filter_map(|entry| String::from_utf8(entry.path).ok())
            .filter(|path| path.ends_with(".py"))
            .collect();
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// `*.py` paths in the tree of `commit`, sorted
    pub fn python_files_at(&self, commit: &str) -> Result<Vec<String>, GitError> {
        let tree = self.resolve(commit)?.tree()?;
        let mut files = Vec::new();

        tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name().filter(|n| n.ends_with(".py")) {
                    files.push(format!("{}{}", dir, name));
                }
            }
            TreeWalkResult::Ok
        })?;

        files.sort();
        Ok(files)
    }

    /// Content of `path` as stored in `commit`
    ///
    /// A path absent from the commit yields an empty string; an unresolvable
    /// revision is an error.
    pub fn file_content(&self, path: &str, commit: &str) -> Result<String, GitError> {
        let tree = self.resolve(commit)?.tree()?;

        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(_) => return Ok(String::new()),
        };

        let object = entry.to_object(&self.repo)?;
        Ok(match object.as_blob() {
            Some(blob) => String::from_utf8_lossy(blob.content()).into_owned(),
            None => String::new(),
        })
    }

    /// Commits reachable from `target` but not from `start`, oldest first
    pub fn commits_between(&self, start: &str, target: &str) -> Result<Vec<String>, GitError> {
        let start = self.resolve(start)?.id();
        let target = self.resolve(target)?.id();

        let mut walk = self.repo.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
        walk.push(target)?;
        walk.hide(start)?;

        walk.map(|oid| oid.map(|id| id.to_string()).map_err(GitError::from))
            .collect()
    }

    /// Author, date and summary of `commit`
    pub fn commit_details(&self, commit: &str) -> Result<CommitInfo, GitError> {
        let commit = self.resolve(commit)?;
        let id = commit.id().to_string();
        let short_id = commit
            .as_object()
            .short_id()
            .ok()
            .and_then(|buf| buf.as_str().map(str::to_string))
            .unwrap_or_else(|| id.chars().take(7).collect());

        let date = DateTime::from_timestamp(commit.time().seconds(), 0)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let author = commit.author().name().unwrap_or("unknown").to_string();

        Ok(CommitInfo {
            id,
            short_id,
            author,
            date,
            summary: commit.summary().unwrap_or("").to_string(),
        })
    }

    fn resolve(&self, revision: &str) -> Result<git2::Commit<'_>, GitError> {
        self.repo
            .revparse_single(revision)
            .and_then(|o| o.peel_to_commit())
            .map_err(|source| GitError::Revision {
                revision: revision.to_string(),
                source,
            })
    }
}

/// Match a repository path against an ignore pattern
///
/// `**` spans any number of directories while `*` and `?` stay within one
/// path segment. A pattern without `/` is matched against the file name.
pub(crate) fn glob_match(pattern: &str, path: &str) -> bool {
    let path_segments: Vec<&str> = path.split('/').collect();
    if !pattern.contains('/') {
        return path_segments
            .last()
            .is_some_and(|name| segment_match(pattern, name));
    }

    let pattern_segments: Vec<&str> = pattern.trim_start_matches('/').split('/').collect();
    segments_match(&pattern_segments, &path_segments)
}

fn segments_match(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", rest)) => (0..=path.len()).any(|skip| segments_match(rest, &path[skip..])),
        Some((first, rest)) => path
            .split_first()
            .is_some_and(|(name, tail)| segment_match(first, name) && segments_match(rest, tail)),
    }
}

/// Wildcard match of a single segment, backtracking to the last `*`
fn segment_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match star {
                Some((star_p, star_n)) => {
                    p = star_p + 1;
                    n = star_n + 1;
                    star = Some((star_p, star_n + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
