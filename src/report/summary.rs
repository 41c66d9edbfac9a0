//! Summarizer driver.
//!
//! Each summary is one fresh-context model call whose reply is kept as
//! opaque prose.

use crate::agent::{ask_once, strip_code_fence, ChatModel, ModelError, PromptSet};
use crate::analysis::aggregator::render_table;
use crate::models::{AggregateRow, SentimentTotals, TopicVocabulary};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Rendered in place of a summary that could not be produced.
pub const ABSENT: &str = "无";

/// The three summaries of a run. `None` means skipped or failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summaries {
    pub sentiment: Option<String>,
    pub topics: Option<String>,
    pub event: Option<String>,
}

pub fn sentiment_request(subject: &str, totals: &SentimentTotals) -> String {
    format!(
        "Event: {}\nSentiment statistics over {} posts:\n- positive: {}\n- neutral: {}\n- negative: {}\nSummarize the public mood.",
        subject,
        totals.total(),
        totals.positive,
        totals.neutral,
        totals.negative
    )
}

pub fn topic_request(subject: &str, vocabulary: &TopicVocabulary) -> String {
    let mut lines = vec![
        format!("Event: {}", subject),
        "Topics and how many posts discuss them:".to_string(),
    ];

    if vocabulary.is_empty() {
        lines.push(format!("- {}", ABSENT));
    }
    for (topic, count) in vocabulary.counts() {
        lines.push(format!("- {}: {}", topic, count));
    }

    lines.push("Summarize what people are discussing.".to_string());
    lines.join("\n")
}

pub fn event_request(
    subject: &str,
    sentiment_summary: Option<&str>,
    topic_summary: Option<&str>,
    table: &[AggregateRow],
) -> String {
    let table_text = if table.is_empty() {
        ABSENT.to_string()
    } else {
        render_table(table)
    };

    format!(
        "Event: {}\n\nSentiment summary:\n{}\n\nTopic summary:\n{}\n\nSentiment per topic:\n{}\n\nWrite the overall public-opinion summary for this event.",
        subject,
        sentiment_summary.unwrap_or(ABSENT),
        topic_summary.unwrap_or(ABSENT),
        table_text
    )
}

/// One summarizer call: fresh context, fence stripped, reply kept verbatim.
pub async fn summarize<M: ChatModel + ?Sized>(
    model: &M,
    system_prompt: &str,
    request: &str,
) -> Result<String, ModelError> {
    let reply = ask_once(model, system_prompt, request).await?;
    Ok(strip_code_fence(&reply))
}

/// Produce all three summaries. A failed call leaves its slot empty.
pub async fn summarize_run<M: ChatModel + ?Sized>(
    model: &M,
    prompts: &PromptSet,
    subject: &str,
    totals: &SentimentTotals,
    vocabulary: &TopicVocabulary,
    table: &[AggregateRow],
) -> Summaries {
    let sentiment = attempt(
        "sentiment",
        summarize(model, &prompts.summarizer_sentiment, &sentiment_request(subject, totals)).await,
    );
    let topics = attempt(
        "topic",
        summarize(model, &prompts.summarizer_topic, &topic_request(subject, vocabulary)).await,
    );

    let request = event_request(subject, sentiment.as_deref(), topics.as_deref(), table);
    let event = attempt(
        "event",
        summarize(model, &prompts.summarizer_topic, &request).await,
    );

    Summaries {
        sentiment,
        topics,
        event,
    }
}

fn attempt(kind: &str, result: Result<String, ModelError>) -> Option<String> {
    match result {
        Ok(text) if !text.is_empty() => {
            info!(kind, "summary ready");
            Some(text)
        }
        Ok(_) => {
            warn!(kind, "summary came back empty");
            None
        }
        Err(e) => {
            warn!(kind, error = %e, "summary failed");
            None
        }
    }
}
