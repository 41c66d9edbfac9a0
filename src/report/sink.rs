//! Append-only CSV sinks.
//!
//! Every persisted table of the pipeline is a [`CsvSink`]: rows are appended
//! and the header row is written exactly once, when the file is first created.

use crate::models::{AggregateRow, MergedRow, RawRecord, SentimentRow, TopicRow};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::OpenOptions;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// A row type with a fixed CSV header.
pub trait SinkRow: Serialize + DeserializeOwned {
    const HEADER: &'static [&'static str];
}

impl SinkRow for RawRecord {
    const HEADER: &'static [&'static str] = &[
        "seq",
        "page",
        "author",
        "published_text",
        "published_at",
        "source",
        "reposts",
        "comments",
        "likes",
        "body",
    ];
}

impl SinkRow for SentimentRow {
    const HEADER: &'static [&'static str] =
        &["record_id", "batch", "position", "body", "sentiment"];
}

impl SinkRow for TopicRow {
    const HEADER: &'static [&'static str] = &["record_id", "batch", "position", "body", "topics"];
}

impl SinkRow for MergedRow {
    const HEADER: &'static [&'static str] =
        &["record_id", "batch", "position", "topics", "sentiment"];
}

impl SinkRow for AggregateRow {
    const HEADER: &'static [&'static str] = &["topic", "negative", "neutral", "positive", "total"];
}

/// A UTF-8 CSV file that only ever grows.
#[derive(Debug, Clone)]
pub struct CsvSink<T> {
    path: PathBuf,
    _row: PhantomData<fn() -> T>,
}

impl<T: SinkRow> CsvSink<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _row: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `rows`, writing the header first if the file does not exist yet.
    ///
    /// Returns the number of rows written. Appending nothing to an existing
    /// file leaves it untouched.
    pub fn append(&self, rows: &[T]) -> Result<usize> {
        let exists = self.path.exists();
        if exists && rows.is_empty() {
            return Ok(0);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory {}", parent.display())
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if !exists {
            writer
                .write_record(T::HEADER)
                .with_context(|| format!("Failed to write header to {}", self.path.display()))?;
        }

        for row in rows {
            writer
                .serialize(row)
                .with_context(|| format!("Failed to append row to {}", self.path.display()))?;
        }

        writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;

        Ok(rows.len())
    }

    /// Read every row back. A missing file reads as empty.
    pub fn read_all(&self) -> Result<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        reader
            .deserialize()
            .collect::<Result<Vec<T>, csv::Error>>()
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    /// Number of data rows (header excluded).
    #[cfg(test)]
    pub fn row_count(&self) -> Result<usize> {
        if !self.path.exists() {
            return Ok(0);
        }

        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let mut count = 0;
        for record in reader.records() {
            record.with_context(|| format!("Failed to parse {}", self.path.display()))?;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(record_id: u64, sentiment: &str) -> SentimentRow {
        SentimentRow {
            record_id,
            batch: 1,
            position: record_id as usize,
            body: format!("正文 {}, 含逗号", record_id),
            sentiment: sentiment.to_string(),
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSink::<SentimentRow>::new(dir.path().join("out.csv"));

        assert_eq!(sink.append(&[row(1, "positive")]).unwrap(), 1);
        assert_eq!(sink.append(&[row(2, "negative"), row(3, "")]).unwrap(), 2);

        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content.matches("record_id,batch").count(), 1);
        assert!(content.starts_with("record_id,batch,position,body,sentiment\n"));

        let rows = sink.read_all().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].body, "正文 1, 含逗号");
        assert_eq!(rows[2].sentiment, "");
    }

    #[test]
    fn test_empty_append_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSink::<SentimentRow>::new(dir.path().join("out.csv"));

        sink.append(&[row(1, "neutral")]).unwrap();
        let before = std::fs::read_to_string(sink.path()).unwrap();

        assert_eq!(sink.append(&[]).unwrap(), 0);
        assert_eq!(sink.append(&[]).unwrap(), 0);

        let after = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(before, after);
        assert_eq!(sink.row_count().unwrap(), 1);
    }

    #[test]
    fn test_first_empty_append_creates_header_only() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSink::<AggregateRow>::new(dir.path().join("nested/agg.csv"));

        sink.append(&[]).unwrap();
        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content, "topic,negative,neutral,positive,total\n");
        assert!(sink.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSink::<TopicRow>::new(dir.path().join("absent.csv"));
        assert!(sink.read_all().unwrap().is_empty());
        assert_eq!(sink.row_count().unwrap(), 0);
    }

    #[test]
    fn test_raw_record_round_trip_keeps_optional_time() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSink::<RawRecord>::new(dir.path().join("posts.csv"));
        let record = RawRecord {
            seq: 7,
            page: 3,
            author: "小明".to_string(),
            published_text: "今天 10:05".to_string(),
            published_at: None,
            source: "无".to_string(),
            reposts: "转发".to_string(),
            comments: "评论".to_string(),
            likes: "赞".to_string(),
            body: "第一行\n第二行".to_string(),
        };

        sink.append(std::slice::from_ref(&record)).unwrap();
        assert_eq!(sink.read_all().unwrap(), vec![record]);
    }
}
