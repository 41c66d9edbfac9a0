//! Batch analysis and aggregation.
//!
//! Sentiment and topic analysis share the batch protocol in [`batch`]; the
//! aggregator joins their outputs into per-topic statistics.

pub mod aggregator;
pub mod batch;
pub mod sentiment;
pub mod topic;

pub use aggregator::{aggregate, merge};
pub use batch::{BatchAnalyzer, BatchOutcome, DEFAULT_BATCH_SIZE};
pub use sentiment::SentimentAnalysis;
pub use topic::TopicAnalysis;
