//! Analyzer configuration stored in `.semdiff/config.toml`

use super::glob_match;
use crate::diff::BisectMode;
use crate::extract::ParserSelection;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding the configuration, relative to the repository root
pub const CONFIG_DIR: &str = ".semdiff";

/// Configuration for one analyzed repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Strategy selection for `analyze_file`
    #[serde(default)]
    pub parser: ParserSelection,

    /// Regex elements per anchor line below which the text strategy runs
    #[serde(default = "default_text_fallback_ratio")]
    pub text_fallback_ratio: f64,

    /// Patterns to ignore (glob patterns)
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// Branch the corruption search walks toward
    #[serde(default = "default_target_branch")]
    pub target_branch: String,

    /// Known-good revision the corruption search starts from
    #[serde(default = "default_start_commit")]
    pub start_commit: String,

    /// Directory for Turtle output
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// File name of the accumulated model written by a full run
    #[serde(default = "default_model_file")]
    pub model_file: String,

    #[serde(default)]
    pub bisect: BisectMode,

    #[serde(default)]
    pub validation: ValidationSettings,
}

/// Settings for the BFG9K validator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// Minimum score for the similarity phase to pass (0.0 - 1.0)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

fn default_text_fallback_ratio() -> f64 {
    0.5
}

fn default_ignore_patterns() -> Vec<String> {
    vec![
        ".git/**".to_string(),
        ".semdiff/**".to_string(),
        "build/**".to_string(),
        "dist/**".to_string(),
        ".venv/**".to_string(),
        "venv/**".to_string(),
    ]
}

fn default_target_branch() -> String {
    "main".to_string()
}

fn default_start_commit() -> String {
    "HEAD~1".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_model_file() -> String {
    "semantic_diff_model.ttl".to_string()
}

fn default_similarity_threshold() -> f64 {
    0.85
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            parser: ParserSelection::default(),
            text_fallback_ratio: default_text_fallback_ratio(),
            ignore_patterns: default_ignore_patterns(),
            target_branch: default_target_branch(),
            start_commit: default_start_commit(),
            output_dir: default_output_dir(),
            model_file: default_model_file(),
            bisect: BisectMode::default(),
            validation: ValidationSettings::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Path of the configuration file under `repo_root`
    pub fn path(repo_root: &Path) -> PathBuf {
        repo_root.join(CONFIG_DIR).join("config.toml")
    }

    /// Load configuration from the repository or return defaults
    pub fn load_or_default(repo_root: &Path) -> Result<Self> {
        let config_path = Self::path(repo_root);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
            let config: AnalyzerConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the repository
    pub fn save(&self, repo_root: &Path) -> Result<()> {
        let config_dir = repo_root.join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create {:?}", config_dir))?;

        let config_path = Self::path(repo_root);
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Check if a path should be ignored
    pub fn should_ignore(&self, path: &str) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| glob_match(pattern, path))
    }

    /// Output directory resolved against the repository root
    pub fn output_dir_in(&self, repo_root: &Path) -> PathBuf {
        if self.output_dir.is_absolute() {
            self.output_dir.clone()
        } else {
            repo_root.join(&self.output_dir)
        }
    }

    /// Look up a single setting by key, formatted for display
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "parser" => self.parser.to_string(),
            "text_fallback_ratio" => self.text_fallback_ratio.to_string(),
            "ignore_patterns" => self.ignore_patterns.join(", "),
            "target_branch" => self.target_branch.clone(),
            "start_commit" => self.start_commit.clone(),
            "output_dir" => self.output_dir.display().to_string(),
            "model_file" => self.model_file.clone(),
            "bisect" => self.bisect.to_string(),
            "validation.similarity_threshold" => self.validation.similarity_threshold.to_string(),
            _ => return None,
        };
        Some(value)
    }
}
