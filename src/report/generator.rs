//! Markdown and JSON report generation.
//!
//! This module renders the final public-opinion report of a run from the
//! collected statistics and the summaries.

use crate::analysis::aggregator::{labelled_mentions, most_negative_topic, top_topics};
use crate::models::{AggregateRow, Sentiment, SentimentTotals};
use crate::report::summary::{Summaries, ABSENT};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How many topics the overview lists.
const TOP_TOPICS: usize = 10;

/// Run information shown at the top of the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Event label as the operator gave it.
    pub subject: String,
    /// Keyword actually searched.
    pub keyword: String,
    /// Collected day, if the posts were collected in this run.
    pub date: Option<NaiveDate>,
    pub generated_at: DateTime<Utc>,
    pub model_used: String,
    pub run_dir: String,
    pub records_analyzed: usize,
    pub batch_size: usize,
    pub sentiment_batches: usize,
    pub sentiment_failed: usize,
    pub topic_batches: usize,
    pub topic_failed: usize,
    pub duration_seconds: f64,
}

/// One topic with its occurrence count across all batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicCount {
    pub topic: String,
    pub count: usize,
}

/// Everything the final report shows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub sentiment: SentimentTotals,
    pub topics: Vec<TopicCount>,
    pub aggregate: Vec<AggregateRow>,
    pub summaries: Summaries,
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "# Public Opinion Report: {}\n\n",
        report.metadata.subject
    ));

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_sentiment_section(&report.sentiment));
    output.push_str(&generate_topics_section(&report.topics));
    output.push_str(&generate_aggregate_section(&report.aggregate));
    output.push_str(&generate_summaries_section(&report.summaries));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Keyword:** `{}`\n", metadata.keyword));
    if let Some(date) = metadata.date {
        section.push_str(&format!("- **Collected Day:** {}\n", date));
    }
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!("- **Run Directory:** `{}`\n", metadata.run_dir));
    section.push_str(&format!(
        "- **Posts Analyzed:** {}\n",
        metadata.records_analyzed
    ));
    section.push_str(&format!(
        "- **Batches:** {} sentiment, {} topic (size {})\n",
        metadata.sentiment_batches, metadata.topic_batches, metadata.batch_size
    ));
    if metadata.sentiment_failed + metadata.topic_failed > 0 {
        section.push_str(&format!(
            "- **Batches Skipped:** {} sentiment, {} topic\n",
            metadata.sentiment_failed, metadata.topic_failed
        ));
    }
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// Generate the sentiment breakdown.
fn generate_sentiment_section(totals: &SentimentTotals) -> String {
    let mut section = String::new();
    let total = totals.total();

    section.push_str("## Sentiment\n\n");
    section.push_str(&format!(
        "| {} Positive | {} Neutral | {} Negative | **Total** |\n",
        Sentiment::Positive.emoji(),
        Sentiment::Neutral.emoji(),
        Sentiment::Negative.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} ({:.1}%) | {} ({:.1}%) | {} ({:.1}%) | **{}** |\n\n",
        totals.positive,
        percent(totals.positive, total),
        totals.neutral,
        percent(totals.neutral, total),
        totals.negative,
        percent(totals.negative, total),
        total
    ));

    section
}

/// Generate the most-discussed topics list.
fn generate_topics_section(topics: &[TopicCount]) -> String {
    let mut section = String::new();

    section.push_str("## Top Topics\n\n");

    if topics.is_empty() {
        section.push_str("No topics were identified.\n\n");
        return section;
    }

    let mut sorted: Vec<&TopicCount> = topics.iter().collect();
    sorted.sort_by_key(|t| std::cmp::Reverse(t.count));

    for (i, topic) in sorted.iter().take(TOP_TOPICS).enumerate() {
        section.push_str(&format!("{}. {} ({})\n", i + 1, topic.topic, topic.count));
    }
    section.push('\n');

    section
}

/// Generate the per-topic sentiment table.
fn generate_aggregate_section(rows: &[AggregateRow]) -> String {
    let mut section = String::new();

    section.push_str("## Sentiment by Topic\n\n");

    if rows.is_empty() {
        section.push_str("No labelled topics to aggregate.\n\n");
        return section;
    }

    section.push_str("| Topic | 🔴 Negative | ⚪ Neutral | 🟢 Positive | Total |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---:|\n");
    for row in rows {
        section.push_str(&format!(
            "| {} | {} | {} | {} | **{}** |\n",
            row.topic, row.negative, row.neutral, row.positive, row.total
        ));
    }
    section.push('\n');

    section.push_str(&format!(
        "*{} topics, {} labelled mentions.*\n\n",
        rows.len(),
        labelled_mentions(rows)
    ));

    if let Some(top) = top_topics(rows, 1).first() {
        section.push_str(&format!(
            "- **Most discussed:** {} ({} mentions)\n",
            top.topic, top.total
        ));
    }
    if let Some(negative) = most_negative_topic(rows) {
        section.push_str(&format!(
            "- **Most negative:** {} ({:.0}% negative)\n",
            negative.topic,
            percent(negative.negative, negative.total)
        ));
    }
    section.push('\n');

    section
}

/// Generate the summaries. Missing summaries render as `无`.
fn generate_summaries_section(summaries: &Summaries) -> String {
    let mut section = String::new();

    section.push_str("## Summaries\n\n");
    for (title, text) in [
        ("Event Summary", &summaries.event),
        ("Sentiment Summary", &summaries.sentiment),
        ("Topic Summary", &summaries.topics),
    ] {
        section.push_str(&format!("### {}\n\n", title));
        section.push_str(text.as_deref().unwrap_or(ABSENT));
        section.push_str("\n\n");
    }

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    format!(
        "---\n\n*Report generated by weibo-pulse v{}*\n",
        env!("CARGO_PKG_VERSION")
    )
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Render the report in `format` and write it to `path`.
pub fn write_report(report: &Report, format: crate::cli::OutputFormat, path: &Path) -> Result<()> {
    let content = match format {
        crate::cli::OutputFormat::Json => generate_json_report(report)?,
        crate::cli::OutputFormat::Markdown => generate_markdown_report(report),
    };

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}
