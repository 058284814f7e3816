//! semdiff - Semantic diff of Python sources across Git commits
//!
//! Detects functional loss and syntax/comma corruption between revisions and
//! exports the findings as an RDF model.

use anyhow::Result;
use semdiff::cli::{
    batch, bisect, commits, compare, config_root, loss, parse, print_analysis_text,
    print_artifacts_text, print_batch_text, print_commit_pair_text, print_comparison_text,
    print_json, print_loss_text, print_search_text, print_verdicts_text, run, validate, Cli,
    Commands, ConfigArgs, OutputFormat,
};
use semdiff::repo::AnalyzerConfig;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Setup logging; stdout is reserved for reports
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match execute(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: &Cli) -> Result<ExitCode> {
    let repo_path = Path::new(&cli.path);
    let json = cli.format == OutputFormat::Json;

    match &cli.command {
        Commands::Compare(args) => {
            let comparison = compare(repo_path, args)?;
            if json {
                print_json(&comparison)?;
            } else {
                print_comparison_text(&comparison, &args.artifact_path);
            }
            if comparison.error().is_some() {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Batch(args) => {
            let result = batch(repo_path, args)?;
            if json {
                print_json(&result)?;
            } else {
                print_batch_text(&result);
            }
            if result.failures().next().is_some() {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Commits(args) => {
            let report = commits(repo_path, &args.commit1, &args.commit2, args.save.as_deref())?;
            if json {
                print_json(&report)?;
            } else {
                print_commit_pair_text(&report);
            }
        }

        Commands::Bisect(args) => {
            let search = bisect(repo_path, args)?;
            if json {
                print_json(&search)?;
            } else {
                print_search_text(&search);
            }
        }

        Commands::Loss => {
            let summary = loss(repo_path)?;
            if json {
                print_json(&summary)?;
            } else {
                print_loss_text(&summary);
            }
        }

        Commands::Run => {
            let report = run(repo_path)?;
            if json {
                print_json(&report)?;
            } else {
                print_analysis_text(&report);
            }
        }

        Commands::Parse(args) => {
            let artifacts = parse(repo_path, args)?;
            if json {
                print_json(&artifacts)?;
            } else {
                print_artifacts_text(&artifacts);
            }
        }

        Commands::Validate(args) => {
            let verdicts = validate(repo_path, &args.file)?;
            if json {
                print_json(&verdicts)?;
            } else {
                print_verdicts_text(&verdicts);
            }
            if !verdicts.last().is_some_and(|v| v.valid) {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Config(args) => {
            handle_config(repo_path, args)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Handle config command
fn handle_config(path: &Path, args: &ConfigArgs) -> Result<()> {
    let root = config_root(path);

    if args.reset {
        AnalyzerConfig::default().save(&root)?;
        println!("✓ Configuration reset to defaults");
        return Ok(());
    }

    let config = AnalyzerConfig::load_or_default(&root)?;

    if let Some(ref key) = args.get {
        match config.get(key) {
            Some(value) => println!("{}", value),
            None => anyhow::bail!("Unknown config key: {}", key),
        }
        return Ok(());
    }

    println!("semdiff Configuration");
    println!("=====================\n");
    println!("Config file: {:?}", AnalyzerConfig::path(&root));
    println!("Parser: {}", config.parser);
    println!("Text fallback ratio: {}", config.text_fallback_ratio);
    println!("Start commit: {}", config.start_commit);
    println!("Target branch: {}", config.target_branch);
    println!("Bisect mode: {}", config.bisect);
    println!("Output directory: {}", config.output_dir.display());
    println!("Model file: {}", config.model_file);
    println!("Similarity threshold: {}", config.validation.similarity_threshold);

    println!("\nIgnore patterns:");
    for pattern in &config.ignore_patterns {
        println!("  - {}", pattern);
    }

    Ok(())
}
