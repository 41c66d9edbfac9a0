//! Data models for the opinion pipeline.
//!
//! This module contains the core data structures shared by the collector,
//! the analyzers, the aggregator and the report generator.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Platform an event was published on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    /// The only platform the collector can search.
    Weibo,
    /// Anything else the operator named.
    Other(String),
}

impl Platform {
    /// Interpret a free-text platform name (case-insensitive).
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "weibo" | "微博" => Platform::Weibo,
            other => Platform::Other(other.to_string()),
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, Platform::Weibo)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Weibo => write!(f, "weibo"),
            Platform::Other(s) => write!(f, "{}", s),
        }
    }
}

/// A validated collection request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Event keywords in the order the model returned them.
    pub keywords: Vec<String>,
    /// Calendar day to collect.
    pub start_date: NaiveDate,
    /// Platform (always [`Platform::Weibo`] once validated).
    pub platform: Platform,
}

impl QuerySpec {
    /// The search keyword: the first keyword without its `#` delimiters.
    pub fn primary_keyword(&self) -> String {
        self.keywords
            .first()
            .map(|k| k.trim().trim_matches('#').to_string())
            .unwrap_or_default()
    }

    /// The subject label used in summaries (first keyword as given).
    pub fn subject(&self) -> &str {
        self.keywords.first().map(String::as_str).unwrap_or("")
    }
}

/// One collected post, as persisted in `posts.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Run-wide sequence number, unique across windows and pages.
    pub seq: u64,
    pub page: u32,
    pub author: String,
    pub published_text: String,
    #[serde(default)]
    pub published_at: Option<NaiveDateTime>,
    pub source: String,
    pub reposts: String,
    pub comments: String,
    pub likes: String,
    pub body: String,
}

/// Sentiment label attached to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    /// Parse a model label. Returns `None` for anything unrecognised.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "positive" | "积极" | "正面" => Some(Sentiment::Positive),
            "neutral" | "中性" => Some(Sentiment::Neutral),
            "negative" | "消极" | "负面" => Some(Sentiment::Negative),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Sentiment::Positive => "🟢",
            Sentiment::Neutral => "⚪",
            Sentiment::Negative => "🔴",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running three-way sentiment totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentTotals {
    #[serde(default)]
    pub positive: usize,
    #[serde(default)]
    pub neutral: usize,
    #[serde(default)]
    pub negative: usize,
}

impl SentimentTotals {
    pub fn total(&self) -> usize {
        self.positive + self.neutral + self.negative
    }

    /// Fold another batch's counts into this one.
    pub fn add(&mut self, other: &SentimentTotals) {
        self.positive += other.positive;
        self.neutral += other.neutral;
        self.negative += other.negative;
    }
}

/// Global topic vocabulary, deduplicated in order of first appearance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicVocabulary {
    topics: Vec<String>,
    counts: HashMap<String, usize>,
}

impl TopicVocabulary {
    /// Record one occurrence of `topic`. Returns `true` if it was new.
    pub fn observe(&mut self, topic: &str) -> bool {
        let topic = topic.trim();
        if topic.is_empty() {
            return false;
        }

        match self.counts.get_mut(topic) {
            Some(count) => {
                *count += 1;
                false
            }
            None => {
                self.counts.insert(topic.to_string(), 1);
                self.topics.push(topic.to_string());
                true
            }
        }
    }

    /// Topics in first-seen order.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn count(&self, topic: &str) -> usize {
        self.counts.get(topic).copied().unwrap_or(0)
    }

    /// `(topic, occurrences)` pairs in first-seen order.
    pub fn counts(&self) -> Vec<(&str, usize)> {
        self.topics
            .iter()
            .map(|t| (t.as_str(), self.count(t)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }
}

/// Per-record sentiment output row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentRow {
    pub record_id: u64,
    pub batch: usize,
    pub position: usize,
    pub body: String,
    pub sentiment: String,
}

/// Per-record topic output row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRow {
    pub record_id: u64,
    pub batch: usize,
    pub position: usize,
    pub body: String,
    pub topics: String,
}

/// Topic row joined with its record's sentiment label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedRow {
    pub record_id: u64,
    pub batch: usize,
    pub position: usize,
    pub topics: String,
    pub sentiment: String,
}

/// Per-topic sentiment distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub topic: String,
    pub negative: usize,
    pub neutral: usize,
    pub positive: usize,
    pub total: usize,
}

impl AggregateRow {
    pub fn new(topic: String) -> Self {
        Self {
            topic,
            negative: 0,
            neutral: 0,
            positive: 0,
            total: 0,
        }
    }

    /// Count one record with the given label.
    pub fn record(&mut self, sentiment: Sentiment) {
        match sentiment {
            Sentiment::Negative => self.negative += 1,
            Sentiment::Neutral => self.neutral += 1,
            Sentiment::Positive => self.positive += 1,
        }
        self.total = self.negative + self.neutral + self.positive;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_from_name() {
        assert_eq!(Platform::from_name("Weibo"), Platform::Weibo);
        assert_eq!(Platform::from_name(" 微博 "), Platform::Weibo);
        assert_eq!(
            Platform::from_name("抖音"),
            Platform::Other("抖音".to_string())
        );
        assert!(!Platform::from_name("douyin").is_supported());
    }

    #[test]
    fn test_primary_keyword_strips_hashtags() {
        let spec = QuerySpec {
            keywords: vec!["#金价上涨#".to_string(), "黄金".to_string()],
            start_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            platform: Platform::Weibo,
        };
        assert_eq!(spec.primary_keyword(), "金价上涨");
        assert_eq!(spec.subject(), "#金价上涨#");
    }

    #[test]
    fn test_sentiment_from_label() {
        assert_eq!(Sentiment::from_label("Positive"), Some(Sentiment::Positive));
        assert_eq!(Sentiment::from_label(" negative "), Some(Sentiment::Negative));
        assert_eq!(Sentiment::from_label("中性"), Some(Sentiment::Neutral));
        assert_eq!(Sentiment::from_label(""), None);
        assert_eq!(Sentiment::from_label("mixed"), None);
    }

    #[test]
    fn test_sentiment_totals_add() {
        let mut totals = SentimentTotals::default();
        totals.add(&SentimentTotals {
            positive: 2,
            neutral: 3,
            negative: 5,
        });
        totals.add(&SentimentTotals {
            positive: 1,
            neutral: 0,
            negative: 0,
        });
        assert_eq!(totals.positive, 3);
        assert_eq!(totals.total(), 11);
    }

    #[test]
    fn test_topic_vocabulary_first_seen_order() {
        let mut vocab = TopicVocabulary::default();
        assert!(vocab.observe("物价"));
        assert!(vocab.observe("就业"));
        assert!(!vocab.observe(" 物价 "));
        assert!(!vocab.observe("   "));

        assert_eq!(vocab.topics(), &["物价".to_string(), "就业".to_string()]);
        assert_eq!(vocab.count("物价"), 2);
        assert_eq!(vocab.counts(), vec![("物价", 2), ("就业", 1)]);
    }

    #[test]
    fn test_aggregate_row_total() {
        let mut row = AggregateRow::new("物价".to_string());
        row.record(Sentiment::Negative);
        row.record(Sentiment::Negative);
        row.record(Sentiment::Positive);
        assert_eq!(row.negative, 2);
        assert_eq!(row.total, row.negative + row.neutral + row.positive);
    }
}
