//! Sentiment classification batches.

use crate::analysis::batch::{AnalysisKind, BatchReply};
use crate::models::{RawRecord, Sentiment, SentimentRow, SentimentTotals};
use serde::Deserialize;

/// One entry of the `analyses` array. A missing or `null` label is `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SentimentItem {
    #[serde(default)]
    pub sentiment: Option<String>,
}

/// Labels each record positive / neutral / negative and sums the model's
/// per-batch summary counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentimentAnalysis;

impl AnalysisKind for SentimentAnalysis {
    type Item = SentimentItem;
    type Row = SentimentRow;
    type Stats = SentimentTotals;

    const NAME: &'static str = "sentiment";

    fn render_query(&self, numbered: &str, _stats: &SentimentTotals) -> String {
        numbered.to_string()
    }

    fn to_row(
        &self,
        record: &RawRecord,
        batch: usize,
        position: usize,
        item: Option<&SentimentItem>,
    ) -> SentimentRow {
        let sentiment = item
            .and_then(|i| i.sentiment.as_deref())
            .map(normalize_label)
            .unwrap_or_default();

        SentimentRow {
            record_id: record.seq,
            batch,
            position,
            body: record.body.clone(),
            sentiment,
        }
    }

    fn fold(&self, stats: &mut SentimentTotals, reply: &BatchReply<SentimentItem>) {
        if let Some(ref summary) = reply.summary {
            stats.add(summary);
        }
    }
}

/// Canonical label for known values, the trimmed text otherwise.
fn normalize_label(label: &str) -> String {
    match Sentiment::from_label(label) {
        Some(sentiment) => sentiment.as_str().to_string(),
        None => label.trim().to_string(),
    }
}
