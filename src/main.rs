//! weibo-pulse - public-opinion monitoring for Weibo events
//!
//! A CLI tool that collects one day of Weibo posts about an event, labels
//! them with a local Ollama model in fixed-size batches, and aggregates
//! sentiment per topic into CSV tables, summaries and a report.
//!
//! Exit codes:
//!   0 - Success (or the operator left the intake dialogue)
//!   1 - Runtime error (config, I/O, client setup, etc.)

mod agent;
mod analysis;
mod cli;
mod collector;
mod config;
mod intake;
mod models;
mod pipeline;
mod report;

use agent::{ClientConfig, OllamaClient, PromptSet};
use anyhow::{Context, Result};
use cli::Args;
use collector::{WeiboSearch, WeiboSearchConfig};
use config::{Config, CONFIG_FILE_NAME};
use models::{Platform, QuerySpec};
use pipeline::{Pipeline, RunInput, RunSettings};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration before logging so the file can turn on verbose output
    let loaded = load_config(&args);
    let config_verbose = loaded
        .as_ref()
        .map(|(config, _)| config.general.verbose)
        .unwrap_or(false);

    // Initialize logging
    init_logging(args.log_level(config_verbose));

    info!("weibo-pulse v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    let result = match loaded {
        Ok((config, source)) => {
            match source {
                ConfigSource::Explicit(path) => info!("Loaded config from: {}", path.display()),
                ConfigSource::Default => info!("Loaded default config from {}", CONFIG_FILE_NAME),
                ConfigSource::Builtin => debug!("No config file found, using defaults"),
                ConfigSource::Fallback(e) => warn!("Failed to load config: {}", e),
            }
            run(args, config).await
        }
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!("Run failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .weibo-pulse.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to set the model, Weibo cookie, batch size and prompt files.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete workflow: intake, collection, analysis, report.
async fn run(args: Args, mut config: Config) -> Result<()> {
    config.merge_with_args(&args);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let prompts = PromptSet::load(&config.prompts);

    let model = OllamaClient::new(ClientConfig {
        ollama_url: config.model.ollama_url.clone(),
        model_name: config.model.name.clone(),
        temperature: config.model.temperature,
        timeout_seconds: config.model.timeout_seconds,
        retries: config.model.retries,
        backoff_base_ms: config.model.backoff_base_ms,
    })
    .context("Failed to create Ollama client")?;
    println!(
        "🤖 Model: {} at {}",
        model.model_name(),
        config.model.ollama_url
    );

    if config.collector.cookie.is_none() {
        warn!("No Weibo cookie configured; search results may be empty");
    }
    let search = WeiboSearch::new(WeiboSearchConfig {
        search_url: config.collector.search_url.clone(),
        cookie: config.collector.cookie.clone(),
        user_agent: config.collector.user_agent.clone(),
        timeout_seconds: config.collector.timeout_seconds,
        retries: config.model.retries,
        backoff_base_ms: config.model.backoff_base_ms,
    })
    .context("Failed to create search client")?;

    // Step 1: decide what to analyze
    let input = if let Some(path) = args.input.clone() {
        RunInput::File(path)
    } else if let Some(date) = args.date {
        RunInput::Collect(QuerySpec {
            keywords: args.keywords.clone(),
            start_date: date,
            platform: Platform::Weibo,
        })
    } else {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        match RunInput::from_intake(&model, &prompts.coordinator, stdin.lock(), &mut stdout).await? {
            Some(input) => input,
            None => {
                println!("👋 No request completed, nothing to do.");
                return Ok(());
            }
        }
    };

    let settings = RunSettings {
        output_dir: config.general.output_dir.clone(),
        model_name: config.model.name.clone(),
        batch_size: config.analysis.batch_size,
        max_pages: config.collector.max_pages,
        parallel: config.analysis.parallel,
        collect_only: args.collect_only,
        summarize: !args.no_summary,
        format: args.format,
        show_progress: !args.quiet,
    };

    // Step 2: run the pipeline
    let outcome = Pipeline::new(&model, &search, &prompts, &settings)
        .run(input)
        .await?;

    // Print summary
    if let (true, Some(stats)) = (args.collect_only, outcome.collect) {
        println!(
            "\n✅ Collection complete! {} posts saved to: {}",
            stats.kept,
            outcome.paths.posts.display()
        );
    }

    if let Some(report) = outcome.report {
        let totals = report.sentiment;
        println!("\n📊 Run Summary:");
        println!("   Posts analyzed: {}", outcome.records);
        println!(
            "   - 🟢 Positive: {} | ⚪ Neutral: {} | 🔴 Negative: {}",
            totals.positive, totals.neutral, totals.negative
        );
        for row in outcome.aggregate.iter().take(5) {
            println!("   - {}: {} mentions", row.topic, row.total);
        }
        println!("   Duration: {:.1}s", report.metadata.duration_seconds);
        println!(
            "\n✅ Run complete! Report saved to: {}",
            outcome.paths.report.display()
        );
    }

    Ok(())
}

/// Where the configuration came from.
enum ConfigSource {
    Explicit(std::path::PathBuf),
    Default,
    Builtin,
    /// The default file exists but could not be loaded.
    Fallback(anyhow::Error),
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so the outcome is reported by the caller.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigSource::Explicit(config_path.clone())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigSource::Default)),
        Ok(None) => Ok((Config::default(), ConfigSource::Builtin)),
        Err(e) => Ok((Config::default(), ConfigSource::Fallback(e))),
    }
}
