//! Topic modelling batches with a shared, growing topic vocabulary.

use crate::analysis::batch::{AnalysisKind, BatchReply};
use crate::models::{RawRecord, TopicRow, TopicVocabulary};
use serde::Deserialize;
use tracing::info;

/// One entry of the `analyses` array. A missing or `null` list is `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopicItem {
    #[serde(default)]
    pub topics: Option<Vec<String>>,
}

impl TopicItem {
    fn topics(&self) -> &[String] {
        self.topics.as_deref().unwrap_or_default()
    }
}

/// Assigns topics to each record, preferring topics already seen.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopicAnalysis;

impl AnalysisKind for TopicAnalysis {
    type Item = TopicItem;
    type Row = TopicRow;
    type Stats = TopicVocabulary;

    const NAME: &'static str = "topic";

    fn render_query(&self, numbered: &str, vocabulary: &TopicVocabulary) -> String {
        let known = if vocabulary.is_empty() {
            "(none yet)".to_string()
        } else {
            vocabulary.topics().join(", ")
        };

        format!("Current topic list: {}\n\nOpinions:\n{}", known, numbered)
    }

    fn to_row(
        &self,
        record: &RawRecord,
        batch: usize,
        position: usize,
        item: Option<&TopicItem>,
    ) -> TopicRow {
        let topics = item
            .map(|i| {
                i.topics()
                    .iter()
                    .map(|t| t.trim())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();

        TopicRow {
            record_id: record.seq,
            batch,
            position,
            body: record.body.clone(),
            topics,
        }
    }

    fn fold(&self, vocabulary: &mut TopicVocabulary, reply: &BatchReply<TopicItem>) {
        for topic in reply.analyses.iter().flat_map(|a| a.topics().iter()) {
            if vocabulary.observe(topic) {
                info!(topic = topic.trim(), known = vocabulary.len(), "new topic");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::conversation::testing::ScriptedModel;
    use crate::analysis::batch::BatchAnalyzer;
    use crate::report::sink::CsvSink;
    use indicatif::ProgressBar;
    use tempfile::TempDir;

    fn records(n: u64) -> Vec<RawRecord> {
        (1..=n)
            .map(|seq| RawRecord {
                seq,
                page: 1,
                author: "user".to_string(),
                published_text: "今天 10:00".to_string(),
                published_at: None,
                source: "无".to_string(),
                reposts: String::new(),
                comments: String::new(),
                likes: String::new(),
                body: format!("观点{}", seq),
            })
            .collect()
    }

    #[test]
    fn test_query_lists_known_topics() {
        let mut vocabulary = TopicVocabulary::default();
        let query = TopicAnalysis.render_query("1: a", &vocabulary);
        assert!(query.contains("(none yet)"));
        assert!(query.ends_with("1: a"));

        vocabulary.observe("投资");
        vocabulary.observe("消费");
        let query = TopicAnalysis.render_query("1: a", &vocabulary);
        assert!(query.starts_with("Current topic list: 投资, 消费"));
    }

    #[test]
    fn test_row_trims_and_joins_topics() {
        let record = &records(1)[0];
        let item = TopicItem {
            topics: Some(vec![" 投资 ".to_string(), "".to_string(), "黄金".to_string()]),
        };
        let row = TopicAnalysis.to_row(record, 1, 1, Some(&item));
        assert_eq!(row.topics, "投资, 黄金");
        assert_eq!(row.record_id, 1);

        let row = TopicAnalysis.to_row(record, 1, 1, None);
        assert_eq!(row.topics, "");
    }

    #[tokio::test]
    async fn test_null_topics_keep_rest_of_batch() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSink::<TopicRow>::new(dir.path().join("topics.csv"));
        let model = ScriptedModel::new([
            r#"{"analyses": [{"id": 1, "topics": null}, {"id": 2, "topics": ["物价"]}]}"#,
        ]);

        let analyzer = BatchAnalyzer::new(&model, TopicAnalysis, "sys", 2);
        let outcome = analyzer
            .run(&records(2), &sink, &ProgressBar::hidden())
            .await
            .unwrap();

        assert_eq!(outcome.failed_batches, 0);
        assert_eq!(outcome.stats.topics(), ["物价"]);

        let rows = sink.read_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].topics, "");
        assert_eq!(rows[1].topics, "物价");
    }

    #[tokio::test]
    async fn test_vocabulary_grows_across_batches() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSink::<TopicRow>::new(dir.path().join("topics.csv"));
        let model = ScriptedModel::new([
            r#"{"analyses": [{"id": 1, "topics": ["投资"]}, {"id": 2, "topics": ["投资", "消费"]}]}"#,
            r#"```json
{"analyses": [{"id": 1, "topics": ["消费", "央行"]}]}
```"#,
        ]);

        let analyzer = BatchAnalyzer::new(&model, TopicAnalysis, "sys", 2);
        let outcome = analyzer
            .run(&records(3), &sink, &ProgressBar::hidden())
            .await
            .unwrap();

        let vocabulary = outcome.stats;
        assert_eq!(vocabulary.topics(), ["投资", "消费", "央行"]);
        assert_eq!(vocabulary.count("投资"), 2);
        assert_eq!(vocabulary.count("消费"), 2);
        assert_eq!(vocabulary.count("央行"), 1);

        // The second batch sees the vocabulary built by the first.
        assert!(model.user_message(1).contains("投资, 消费"));

        let rows = sink.read_all().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].record_id, 3);
        assert_eq!(rows[2].topics, "消费, 央行");
    }
}
