//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

/// weibo-pulse - public-opinion monitoring for Weibo events
///
/// Collects one day of Weibo posts about an event, labels their sentiment
/// and topics with a local Ollama model, and writes per-topic statistics,
/// summaries and a Markdown/JSON report.
///
/// Examples:
///   weibo-pulse
///   weibo-pulse --keyword "#金价上涨#" --date 2025-03-01
///   weibo-pulse --input output/run_20250301120000/posts.csv --no-summary
///   weibo-pulse --keyword 油价 --date 2025-03-01 --collect-only
///   weibo-pulse --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Event keyword; skips the intake conversation
    ///
    /// May be given more than once. The first keyword is searched.
    #[arg(short, long = "keyword", value_name = "KEYWORD", requires = "date")]
    pub keywords: Vec<String>,

    /// Day to collect (YYYY-MM-DD), used with --keyword
    #[arg(short, long, value_name = "DATE", requires = "keywords")]
    pub date: Option<NaiveDate>,

    /// Analyze an existing posts.csv instead of collecting
    #[arg(short, long, value_name = "FILE", conflicts_with_all = ["keywords", "collect_only"])]
    pub input: Option<PathBuf>,

    /// Stop after collection
    #[arg(long)]
    pub collect_only: bool,

    /// Skip the summarizer calls
    #[arg(long)]
    pub no_summary: bool,

    /// Run the sentiment and topic analyzers one after the other
    #[arg(long)]
    pub sequential: bool,

    /// Ollama model to use
    ///
    /// Can also be set via WEIBO_PULSE_MODEL env var or .weibo-pulse.toml config.
    #[arg(short, long, env = "WEIBO_PULSE_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Weibo session cookie sent with search requests
    #[arg(long, env = "WEIBO_COOKIE", hide_env_values = true)]
    pub cookie: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .weibo-pulse.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory receiving one run_<timestamp> folder per run
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Records per model call
    #[arg(long, value_name = "NUM")]
    pub batch_size: Option<usize>,

    /// Search pages per one-hour window
    #[arg(long, value_name = "NUM")]
    pub max_pages: Option<u32>,

    /// Temperature for LLM responses (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Model request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Report format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .weibo-pulse.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        if self.batch_size == Some(0) {
            return Err("Batch size must be at least 1".to_string());
        }

        if self.max_pages == Some(0) {
            return Err("Max pages must be at least 1".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.keywords.iter().any(|k| k.trim().trim_matches('#').is_empty()) {
            return Err("Keywords must not be empty".to_string());
        }

        if let Some(ref input) = self.input {
            if !input.is_file() {
                return Err(format!("Input file does not exist: {}", input.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is `general.verbose` from the config file; `--quiet`
    /// still wins over it.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            keywords: Vec::new(),
            date: None,
            input: None,
            collect_only: false,
            no_summary: false,
            sequential: false,
            model: None,
            ollama_url: None,
            cookie: None,
            config: None,
            output_dir: None,
            batch_size: None,
            max_pages: None,
            temperature: None,
            timeout: None,
            format: OutputFormat::Markdown,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_non_interactive() {
        let args = Args::try_parse_from([
            "weibo-pulse",
            "--keyword",
            "#金价上涨#",
            "--keyword",
            "黄金",
            "--date",
            "2025-03-01",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(args.keywords, vec!["#金价上涨#", "黄金"]);
        assert_eq!(args.date, NaiveDate::from_ymd_opt(2025, 3, 1));
        assert_eq!(args.format, OutputFormat::Json);
    }

    #[test]
    fn test_keyword_requires_date() {
        assert!(Args::try_parse_from(["weibo-pulse", "--keyword", "油价"]).is_err());
        assert!(Args::try_parse_from(["weibo-pulse", "--date", "2025-03-01"]).is_err());
        assert!(Args::try_parse_from(["weibo-pulse", "--keyword", "油价", "--date", "03/01"]).is_err());
    }

    #[test]
    fn test_input_conflicts_with_collect_only() {
        assert!(
            Args::try_parse_from(["weibo-pulse", "--input", "posts.csv", "--collect-only"]).is_err()
        );
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_ranges() {
        let mut args = make_args();
        args.temperature = Some(1.5);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.batch_size = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.ollama_url = Some("localhost:11434".to_string());
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.input = Some(PathBuf::from("/nonexistent/posts.csv"));
        assert!(args.validate().is_err());

        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(false), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(false), tracing::Level::ERROR);
    }

    #[test]
    fn test_config_verbose_raises_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);
        assert_eq!(args.log_level(false), tracing::Level::INFO);

        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }
}
