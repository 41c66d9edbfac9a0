//! Run orchestration.
//!
//! collect (or load) → sentiment + topic batches → merge → aggregate →
//! summaries → report. Every table of a run lands in its own
//! `run_<timestamp>` directory.

use crate::agent::{ChatModel, PromptSet};
use crate::analysis::{
    aggregate, merge, BatchAnalyzer, BatchOutcome, SentimentAnalysis, TopicAnalysis,
};
use crate::cli::OutputFormat;
use crate::intake;
use crate::collector::{CollectStats, SearchSource, WindowedCollector};
use crate::models::{
    AggregateRow, MergedRow, QuerySpec, RawRecord, SentimentRow, SentimentTotals, TopicRow,
    TopicVocabulary,
};
use crate::report::{
    summarize_run, write_report, CsvSink, Report, ReportMetadata, Summaries, TopicCount,
};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, Utc};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Where the records of a run come from.
#[derive(Debug, Clone)]
pub enum RunInput {
    /// Collect one day of posts for a validated request.
    Collect(QuerySpec),
    /// Analyze a previously collected `posts.csv`.
    File(PathBuf),
}

impl RunInput {
    /// Hold the intake dialogue and turn its request into a collection run.
    ///
    /// `None` when the operator left before the request was complete.
    pub async fn from_intake<M, R, W>(
        model: &M,
        coordinator_prompt: &str,
        input: R,
        output: &mut W,
    ) -> Result<Option<Self>>
    where
        M: ChatModel + ?Sized,
        R: BufRead,
        W: Write,
    {
        let spec = intake::run_intake(model, coordinator_prompt, input, output).await?;
        Ok(spec.map(RunInput::Collect))
    }
}

/// Resolved settings of one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub output_dir: PathBuf,
    pub model_name: String,
    pub batch_size: usize,
    pub max_pages: u32,
    pub parallel: bool,
    pub collect_only: bool,
    pub summarize: bool,
    pub format: OutputFormat,
    pub show_progress: bool,
}

/// File layout of one run directory.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dir: PathBuf,
    pub posts: PathBuf,
    pub sentiment: PathBuf,
    pub topics: PathBuf,
    pub merged: PathBuf,
    pub aggregate: PathBuf,
    pub report: PathBuf,
}

impl RunPaths {
    pub fn new(dir: PathBuf, format: OutputFormat) -> Self {
        Self {
            posts: dir.join("posts.csv"),
            sentiment: dir.join("sentiment_analysis_output.csv"),
            topics: dir.join("topic_modelling_output.csv"),
            merged: dir.join("merged_output.csv"),
            aggregate: dir.join("aggregated_topic_sentiment.csv"),
            report: dir.join(format!("report.{}", format.extension())),
            dir,
        }
    }

    /// Create a fresh `run_<YYYYmmddHHMMSS>` directory under `output_dir`.
    ///
    /// A numeric suffix is added if a run already used the same second.
    pub fn create(output_dir: &Path, started: NaiveDateTime, format: OutputFormat) -> Result<Self> {
        let base = format!("run_{}", started.format("%Y%m%d%H%M%S"));
        let mut dir = output_dir.join(&base);
        let mut suffix = 1;
        while dir.exists() {
            suffix += 1;
            dir = output_dir.join(format!("{}_{}", base, suffix));
        }

        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create run directory {}", dir.display()))?;
        Ok(Self::new(dir, format))
    }
}

/// What a run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub paths: RunPaths,
    pub collect: Option<CollectStats>,
    pub records: usize,
    pub aggregate: Vec<AggregateRow>,
    pub report: Option<Report>,
}

/// The full pipeline over a model and a search source.
pub struct Pipeline<'a, M: ChatModel + ?Sized, S: SearchSource + ?Sized> {
    model: &'a M,
    source: &'a S,
    prompts: &'a PromptSet,
    settings: &'a RunSettings,
}

impl<'a, M: ChatModel + ?Sized, S: SearchSource + ?Sized> Pipeline<'a, M, S> {
    pub fn new(
        model: &'a M,
        source: &'a S,
        prompts: &'a PromptSet,
        settings: &'a RunSettings,
    ) -> Self {
        Self {
            model,
            source,
            prompts,
            settings,
        }
    }

    pub async fn run(&self, input: RunInput) -> Result<RunOutcome> {
        let started = Instant::now();
        let paths = RunPaths::create(
            &self.settings.output_dir,
            Local::now().naive_local(),
            self.settings.format,
        )?;
        info!("Run directory: {}", paths.dir.display());

        // Step 1: records
        let (subject, keyword, date, collect, records) = match input {
            RunInput::Collect(spec) => {
                let keyword = spec.primary_keyword();
                println!(
                    "📥 Collecting Weibo posts for \"{}\" on {}...",
                    keyword, spec.start_date
                );
                let sink = CsvSink::<RawRecord>::new(&paths.posts);
                let mut collector = WindowedCollector::new(self.source, self.settings.max_pages);
                let stats = collector.collect_day(&keyword, spec.start_date, &sink).await?;
                let records = sink.read_all()?;
                println!(
                    "   Kept {} posts from {} pages ({} pages failed)",
                    records.len(),
                    stats.pages_fetched,
                    stats.pages_failed
                );
                (
                    spec.subject().to_string(),
                    keyword,
                    Some(spec.start_date),
                    Some(stats),
                    records,
                )
            }
            RunInput::File(path) => {
                println!("📂 Loading posts from {}", path.display());
                let records = CsvSink::<RawRecord>::new(&path).read_all()?;
                let label = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "posts".to_string());
                (label.clone(), label, None, None, records)
            }
        };

        if self.settings.collect_only {
            println!("✅ Collection complete: {}", paths.posts.display());
            return Ok(RunOutcome {
                paths,
                collect,
                records: records.len(),
                aggregate: Vec::new(),
                report: None,
            });
        }

        if records.is_empty() {
            warn!("No posts to analyze");
        }

        // Step 2: batch analysis
        println!(
            "\n🔬 Analyzing {} posts in batches of {}...",
            records.len(),
            self.settings.batch_size
        );
        let (sentiment, topics) = self.analyze(&records, &paths).await?;

        // Step 3: join and aggregate
        let sentiment_rows = CsvSink::<SentimentRow>::new(&paths.sentiment).read_all()?;
        let topic_rows = CsvSink::<TopicRow>::new(&paths.topics).read_all()?;

        let merged = merge(topic_rows, &sentiment_rows);
        CsvSink::<MergedRow>::new(&paths.merged).append(&merged)?;

        let table = aggregate(&merged);
        CsvSink::<AggregateRow>::new(&paths.aggregate).append(&table)?;
        println!("📊 {} topics aggregated", table.len());

        // Step 4: summaries
        let summaries = if self.settings.summarize {
            println!("\n📝 Writing summaries...");
            summarize_run(
                self.model,
                self.prompts,
                &subject,
                &sentiment.stats,
                &topics.stats,
                &table,
            )
            .await
        } else {
            Summaries::default()
        };

        // Step 5: report
        let report = Report {
            metadata: ReportMetadata {
                subject,
                keyword,
                date,
                generated_at: Utc::now(),
                model_used: self.settings.model_name.clone(),
                run_dir: paths.dir.display().to_string(),
                records_analyzed: records.len(),
                batch_size: self.settings.batch_size,
                sentiment_batches: sentiment.batches,
                sentiment_failed: sentiment.failed_batches,
                topic_batches: topics.batches,
                topic_failed: topics.failed_batches,
                duration_seconds: started.elapsed().as_secs_f64(),
            },
            sentiment: sentiment.stats,
            topics: topic_counts(&topics.stats),
            aggregate: table.clone(),
            summaries,
        };
        write_report(&report, self.settings.format, &paths.report)?;

        Ok(RunOutcome {
            paths,
            collect,
            records: records.len(),
            aggregate: table,
            report: Some(report),
        })
    }

    /// Run both analyzers over the same records, concurrently when enabled.
    async fn analyze(
        &self,
        records: &[RawRecord],
        paths: &RunPaths,
    ) -> Result<(BatchOutcome<SentimentTotals>, BatchOutcome<TopicVocabulary>)> {
        let sentiment_sink = CsvSink::<SentimentRow>::new(&paths.sentiment);
        let topic_sink = CsvSink::<TopicRow>::new(&paths.topics);

        let sentiment = BatchAnalyzer::new(
            self.model,
            SentimentAnalysis,
            &self.prompts.sentiment,
            self.settings.batch_size,
        );
        let topic = BatchAnalyzer::new(
            self.model,
            TopicAnalysis,
            &self.prompts.topic,
            self.settings.batch_size,
        );

        let bars = MultiProgress::with_draw_target(if self.settings.show_progress {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        });
        let sentiment_bar = bars.add(batch_bar("sentiment"));
        let topic_bar = bars.add(batch_bar("topics"));

        if self.settings.parallel {
            let (sentiment, topics) = futures::join!(
                sentiment.run(records, &sentiment_sink, &sentiment_bar),
                topic.run(records, &topic_sink, &topic_bar),
            );
            Ok((sentiment?, topics?))
        } else {
            let sentiment = sentiment.run(records, &sentiment_sink, &sentiment_bar).await?;
            let topics = topic.run(records, &topic_sink, &topic_bar).await?;
            Ok((sentiment, topics))
        }
    }
}

fn batch_bar(label: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:>10} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar.set_prefix(label);
    bar
}

/// Vocabulary counts, most frequent first.
fn topic_counts(vocabulary: &TopicVocabulary) -> Vec<TopicCount> {
    let mut counts: Vec<TopicCount> = vocabulary
        .counts()
        .into_iter()
        .map(|(topic, count)| TopicCount {
            topic: topic.to_string(),
            count,
        })
        .collect();
    counts.sort_by_key(|t| std::cmp::Reverse(t.count));
    counts
}
