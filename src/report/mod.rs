//! Persisted tables, summaries and the final report.

pub mod generator;
pub mod sink;
pub mod summary;

pub use generator::{write_report, Report, ReportMetadata, TopicCount};
pub use sink::CsvSink;
pub use summary::{summarize_run, Summaries};
