//! Topic/sentiment aggregation and statistics.
//!
//! This module joins the two analyzer outputs on the global record id and
//! computes the per-topic sentiment distribution.

use crate::models::{AggregateRow, MergedRow, Sentiment, SentimentRow, TopicRow};
use std::collections::HashMap;

/// Left-join topic rows with the sentiment label of the same record.
///
/// Topic rows without a sentiment row get an empty label. If a record has
/// several sentiment rows, the first one wins.
pub fn merge(topic_rows: Vec<TopicRow>, sentiment_rows: &[SentimentRow]) -> Vec<MergedRow> {
    let mut labels: HashMap<u64, &str> = HashMap::new();
    for row in sentiment_rows {
        labels.entry(row.record_id).or_insert(row.sentiment.as_str());
    }

    topic_rows
        .into_iter()
        .map(|row| MergedRow {
            record_id: row.record_id,
            batch: row.batch,
            position: row.position,
            sentiment: labels
                .get(&row.record_id)
                .map(|s| s.to_string())
                .unwrap_or_default(),
            topics: row.topics,
        })
        .collect()
}

/// Split a comma-separated topic field into distinct trimmed names.
pub fn split_topics(field: &str) -> Vec<&str> {
    let mut topics: Vec<&str> = Vec::new();
    for topic in field.split([',', '，']).map(str::trim) {
        if !topic.is_empty() && !topics.contains(&topic) {
            topics.push(topic);
        }
    }
    topics
}

/// Per-topic sentiment distribution, sorted by total (highest first).
///
/// Rows with an empty topic field are discarded. A topic only seen with an
/// unrecognised label still gets a row, with zero counts. Ties keep
/// first-seen order.
pub fn aggregate(rows: &[MergedRow]) -> Vec<AggregateRow> {
    let mut table: Vec<AggregateRow> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows.iter().filter(|r| !r.topics.trim().is_empty()) {
        let sentiment = Sentiment::from_label(&row.sentiment);

        for topic in split_topics(&row.topics) {
            let slot = *index.entry(topic.to_string()).or_insert_with(|| {
                table.push(AggregateRow::new(topic.to_string()));
                table.len() - 1
            });

            if let Some(sentiment) = sentiment {
                table[slot].record(sentiment);
            }
        }
    }

    table.sort_by_key(|row| std::cmp::Reverse(row.total));
    table
}

/// Sentiment counts summed over the aggregate table.
pub fn labelled_mentions(rows: &[AggregateRow]) -> usize {
    rows.iter().map(|r| r.total).sum()
}

/// Render the aggregate table as plain text for a summarizer prompt.
pub fn render_table(rows: &[AggregateRow]) -> String {
    let mut lines = vec!["topic | negative | neutral | positive | total".to_string()];

    for row in rows {
        lines.push(format!(
            "{} | {} | {} | {} | {}",
            row.topic, row.negative, row.neutral, row.positive, row.total
        ));
    }

    lines.join("\n")
}

/// Get the top N topics by total mentions.
pub fn top_topics(rows: &[AggregateRow], n: usize) -> Vec<&AggregateRow> {
    rows.iter().take(n).collect()
}

/// The topic where negative mentions make up the largest share.
pub fn most_negative_topic(rows: &[AggregateRow]) -> Option<&AggregateRow> {
    rows.iter()
        .filter(|r| r.total > 0 && r.negative > 0)
        .max_by(|a, b| {
            let share_a = a.negative as f64 / a.total as f64;
            let share_b = b.negative as f64 / b.total as f64;
            share_a
                .partial_cmp(&share_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.negative.cmp(&b.negative))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic_row(record_id: u64, batch: usize, position: usize, topics: &str) -> TopicRow {
        TopicRow {
            record_id,
            batch,
            position,
            body: format!("body {}", record_id),
            topics: topics.to_string(),
        }
    }

    fn sentiment_row(record_id: u64, batch: usize, position: usize, label: &str) -> SentimentRow {
        SentimentRow {
            record_id,
            batch,
            position,
            body: format!("body {}", record_id),
            sentiment: label.to_string(),
        }
    }

    fn merged(topics: &str, sentiment: &str) -> MergedRow {
        MergedRow {
            record_id: 0,
            batch: 1,
            position: 1,
            topics: topics.to_string(),
            sentiment: sentiment.to_string(),
        }
    }

    #[test]
    fn test_merge_uses_global_id_not_position() {
        // Same batch-local position in two batches, different records.
        let topics = vec![topic_row(1, 1, 1, "物价"), topic_row(11, 2, 1, "就业")];
        let sentiments = vec![
            sentiment_row(1, 1, 1, "negative"),
            sentiment_row(11, 2, 1, "positive"),
        ];

        let rows = merge(topics, &sentiments);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sentiment, "negative");
        assert_eq!(rows[1].sentiment, "positive");
        assert_eq!(rows[1].position, 1);
    }

    #[test]
    fn test_merge_left_join_and_first_label_wins() {
        let topics = vec![topic_row(1, 1, 1, "物价"), topic_row(2, 1, 2, "就业")];
        let sentiments = vec![
            sentiment_row(1, 1, 1, "neutral"),
            sentiment_row(1, 1, 1, "negative"),
        ];

        let rows = merge(topics, &sentiments);
        assert_eq!(rows[0].sentiment, "neutral");
        assert_eq!(rows[1].sentiment, "");
    }

    #[test]
    fn test_split_topics_dedups() {
        assert_eq!(split_topics(" 物价, 就业 ,物价,, "), vec!["物价", "就业"]);
        assert_eq!(split_topics("物价，房价"), vec!["物价", "房价"]);
        assert!(split_topics("  ").is_empty());
    }

    #[test]
    fn test_aggregate_counts_and_order() {
        let rows = vec![
            merged("物价", "negative"),
            merged("就业, 物价", "positive"),
            merged("   ", "negative"),
            merged("房价", "neutral"),
            merged("物价", "neutral"),
            merged("房价", "negative"),
            merged("就业", "mixed"),
        ];

        let table = aggregate(&rows);
        assert_eq!(table.len(), 3);
        assert_eq!(table[0].topic, "物价");
        assert_eq!(
            (table[0].negative, table[0].neutral, table[0].positive),
            (1, 1, 1)
        );
        assert_eq!(table[0].total, 3);

        // The unlabelled 就业 row adds no counts.
        assert_eq!(table[1].topic, "房价");
        assert_eq!(table[1].total, 2);
        assert_eq!(table[2].topic, "就业");
        assert_eq!(table[2].total, 1);

        for row in &table {
            assert_eq!(row.total, row.negative + row.neutral + row.positive);
        }
        assert!(table.windows(2).all(|w| w[0].total >= w[1].total));
    }

    #[test]
    fn test_aggregate_counts_repeated_topic_once_per_record() {
        let table = aggregate(&[merged("物价, 物价", "negative")]);
        assert_eq!(table[0].negative, 1);
    }

    #[test]
    fn test_aggregate_ties_keep_first_seen_order() {
        let table = aggregate(&[merged("甲", "negative"), merged("乙", "positive")]);
        assert_eq!(table[0].topic, "甲");
        assert_eq!(table[1].topic, "乙");
    }

    #[test]
    fn test_render_table() {
        let table = aggregate(&[merged("物价", "negative")]);
        let text = render_table(&table);
        assert_eq!(
            text,
            "topic | negative | neutral | positive | total\n物价 | 1 | 0 | 0 | 1"
        );
        assert_eq!(labelled_mentions(&table), 1);
    }

    #[test]
    fn test_most_negative_topic() {
        let table = aggregate(&[
            merged("物价", "negative"),
            merged("物价", "positive"),
            merged("就业", "negative"),
            merged("房价", "positive"),
        ]);
        assert_eq!(most_negative_topic(&table).unwrap().topic, "就业");
        assert!(most_negative_topic(&aggregate(&[merged("房价", "positive")])).is_none());
    }
}
