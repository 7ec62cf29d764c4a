//! Command-line surface of the `rater` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use rater_core::{CompletionWindow, EncodeOptions};
use rater_engine::{ResultPaths, RunConfig, DEFAULT_MODEL};
use rater_logging::LogDestination;

#[derive(Debug, Parser)]
#[command(
    name = "rater",
    version,
    about = "Score UI screenshots in bulk through a remote batch job",
    long_about = None
)]
pub struct Args {
    /// File with one image URL per line; blank lines are skipped.
    #[arg(long, value_name = "FILE", required_unless_present = "resume")]
    pub urls: Option<PathBuf>,

    /// Where the line-delimited job artifact is written.
    #[arg(long, value_name = "PATH", default_value = "batch_input.jsonl")]
    pub artifact: PathBuf,

    /// Output results file [default: <artifact stem>_output.jsonl]
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// Error results file [default: <artifact stem>_errors.jsonl]
    #[arg(long, value_name = "PATH")]
    pub err: Option<PathBuf>,

    /// Model named in every request.
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Completion window requested for the job (24h or 48h).
    #[arg(long, value_name = "WINDOW", default_value = "24h")]
    pub window: CompletionWindow,

    /// Seconds between status queries.
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 15,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll: u64,

    /// Track an existing batch instead of submitting a new one.
    #[arg(long, value_name = "BATCH_ID")]
    pub resume: Option<String>,

    /// Fail when the same URL appears more than once.
    #[arg(long)]
    pub strict_unique: bool,

    /// Give up waiting after this many seconds; the job keeps running remotely.
    #[arg(long, value_name = "SECS")]
    pub max_wait: Option<u64>,

    /// Write the artifact and exit without contacting the service.
    #[arg(long, conflicts_with = "resume")]
    pub build_only: bool,

    /// Also write logs to this file.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log debug output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn run_config(&self) -> RunConfig {
        let mut config = RunConfig::new(&self.artifact);
        config.encode = EncodeOptions {
            strict_unique: self.strict_unique,
        };
        config.artifact.model = self.model.clone();
        config.window = self.window;
        config.poll.interval = Duration::from_secs(self.poll);
        config.poll.max_wait = self.max_wait.map(Duration::from_secs);

        let defaults = ResultPaths::beside_artifact(&self.artifact);
        config.results = ResultPaths {
            output: self.out.clone().unwrap_or(defaults.output),
            errors: self.err.clone().unwrap_or(defaults.errors),
        };
        config
    }

    pub fn log_destination(&self) -> LogDestination {
        match &self.log_file {
            Some(path) => LogDestination::Both(path.clone()),
            None => LogDestination::Terminal,
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}

/// One target per non-blank line, trimmed.
pub fn read_targets(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read URL list {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
