//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.weibo-pulse.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = ".weibo-pulse.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Collector settings.
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Batch analysis settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Optional prompt override files.
    #[serde(default)]
    pub prompts: PromptsConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory that receives one `run_<timestamp>` folder per run.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            verbose: false,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Ollama model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,

    /// Retries after the first failed attempt.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Base delay of the exponential back-off.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_model_timeout(),
            retries: default_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

fn default_model() -> String {
    "qwen2.5:14b".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_model_timeout() -> u64 {
    300
}

fn default_retries() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    1000
}

/// Weibo search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Search endpoint.
    #[serde(default = "default_search_url")]
    pub search_url: String,

    /// Page ceiling per one-hour window.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Logged-in session cookie. Weibo search returns little without one.
    #[serde(default)]
    pub cookie: Option<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Page request timeout in seconds.
    #[serde(default = "default_search_timeout")]
    pub timeout_seconds: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            search_url: default_search_url(),
            max_pages: default_max_pages(),
            cookie: None,
            user_agent: default_user_agent(),
            timeout_seconds: default_search_timeout(),
        }
    }
}

fn default_search_url() -> String {
    "https://s.weibo.com/weibo".to_string()
}

fn default_max_pages() -> u32 {
    50
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string()
}

fn default_search_timeout() -> u64 {
    30
}

/// Batch analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Records per model call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Run the sentiment and topic analyzers at the same time.
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            parallel: true,
        }
    }
}

fn default_batch_size() -> usize {
    crate::analysis::DEFAULT_BATCH_SIZE
}

fn default_true() -> bool {
    true
}

/// Prompt override files. Unset entries use the built-in prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default)]
    pub coordinator: Option<PathBuf>,
    #[serde(default)]
    pub sentiment: Option<PathBuf>,
    #[serde(default)]
    pub topic: Option<PathBuf>,
    #[serde(default)]
    pub summarizer_sentiment: Option<PathBuf>,
    #[serde(default)]
    pub summarizer_topic: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings. Only values
    /// given on the command line (or through their env vars) override.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }

        if let Some(ref cookie) = args.cookie {
            self.collector.cookie = Some(cookie.clone());
        }
        if let Some(max_pages) = args.max_pages {
            self.collector.max_pages = max_pages;
        }

        if let Some(batch_size) = args.batch_size {
            self.analysis.batch_size = batch_size;
        }
        if args.sequential {
            self.analysis.parallel = false;
        }

        if let Some(ref dir) = args.output_dir {
            self.general.output_dir = dir.clone();
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.analysis.batch_size == 0 {
            return Err("Batch size must be at least 1".to_string());
        }
        if self.collector.max_pages == 0 {
            return Err("Max pages must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.model.temperature) {
            return Err("Temperature must be between 0.0 and 1.0".to_string());
        }
        if !self.model.ollama_url.starts_with("http://")
            && !self.model.ollama_url.starts_with("https://")
        {
            return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
        }
        if self.model.timeout_seconds == 0 || self.collector.timeout_seconds == 0 {
            return Err("Timeout must be at least 1 second".to_string());
        }
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
