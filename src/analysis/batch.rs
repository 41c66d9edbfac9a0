//! Chunked batch analysis.
//!
//! A record set is cut into fixed-size batches. Each batch is rendered as
//! numbered lines, sent to the model in a fresh context, and the structured
//! reply is written back one row per record. What the rows look like and
//! which running statistics are kept depends on the [`AnalysisKind`].

use crate::agent::{ask_once, strip_code_fence, ChatModel};
use crate::models::{RawRecord, SentimentTotals};
use crate::report::sink::{CsvSink, SinkRow};
use anyhow::Result;
use indicatif::ProgressBar;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::ops::Range;
use tracing::{debug, info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Parsed model reply for one batch.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchReply<I> {
    /// One entry per batch position, in order.
    pub analyses: Vec<I>,
    /// Label counts reported by the model (sentiment replies only).
    #[serde(default)]
    pub summary: Option<SentimentTotals>,
}

/// One flavour of batch analysis.
pub trait AnalysisKind {
    /// Per-position analysis entry in the model reply.
    type Item: DeserializeOwned;
    /// Row persisted per record.
    type Row: SinkRow;
    /// Running statistics folded across batches.
    type Stats: Default;

    const NAME: &'static str;

    /// Build the user message for a batch from its numbered lines.
    fn render_query(&self, numbered: &str, stats: &Self::Stats) -> String;

    fn to_row(
        &self,
        record: &RawRecord,
        batch: usize,
        position: usize,
        item: Option<&Self::Item>,
    ) -> Self::Row;

    fn fold(&self, stats: &mut Self::Stats, reply: &BatchReply<Self::Item>);
}

/// Result of one analyzer run.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome<S> {
    pub stats: S,
    pub batches: usize,
    pub failed_batches: usize,
    pub mismatched_batches: usize,
    pub rows_written: usize,
}

/// Contiguous index ranges of at most `batch_size` records.
pub fn plan_batches(len: usize, batch_size: usize) -> Vec<Range<usize>> {
    let size = batch_size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

/// Render `"<position>: <body>"` lines, positions starting at 1.
pub fn render_numbered(records: &[RawRecord]) -> String {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}: {}", i + 1, r.body.replace(['\r', '\n'], " ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs one [`AnalysisKind`] over a record set.
pub struct BatchAnalyzer<'a, M: ChatModel + ?Sized, K: AnalysisKind> {
    model: &'a M,
    kind: K,
    system_prompt: &'a str,
    batch_size: usize,
}

impl<'a, M: ChatModel + ?Sized, K: AnalysisKind> BatchAnalyzer<'a, M, K> {
    pub fn new(model: &'a M, kind: K, system_prompt: &'a str, batch_size: usize) -> Self {
        Self {
            model,
            kind,
            system_prompt,
            batch_size,
        }
    }

    /// Analyze `records` batch by batch, appending rows to `sink`.
    ///
    /// Model-call and parse failures skip the batch; only sink I/O errors
    /// are returned.
    pub async fn run(
        &self,
        records: &[RawRecord],
        sink: &CsvSink<K::Row>,
        progress: &ProgressBar,
    ) -> Result<BatchOutcome<K::Stats>> {
        let plan = plan_batches(records.len(), self.batch_size);
        progress.set_length(plan.len() as u64);

        let mut outcome = BatchOutcome::<K::Stats>::default();

        for (index, range) in plan.into_iter().enumerate() {
            let batch_no = index + 1;
            let batch = &records[range];
            outcome.batches += 1;

            match self.analyze_batch(batch_no, batch, &mut outcome.stats).await {
                Some(BatchResult { rows, mismatched }) => {
                    outcome.rows_written += sink.append(&rows)?;
                    if mismatched {
                        outcome.mismatched_batches += 1;
                    }
                }
                None => outcome.failed_batches += 1,
            }

            progress.inc(1);
        }

        progress.finish_and_clear();
        info!(
            kind = K::NAME,
            batches = outcome.batches,
            failed = outcome.failed_batches,
            mismatched = outcome.mismatched_batches,
            rows = outcome.rows_written,
            output = %sink.path().display(),
            "batch analysis finished"
        );

        Ok(outcome)
    }

    async fn analyze_batch(
        &self,
        batch_no: usize,
        batch: &[RawRecord],
        stats: &mut K::Stats,
    ) -> Option<BatchResult<K::Row>> {
        let query = self.kind.render_query(&render_numbered(batch), stats);

        let reply = match ask_once(self.model, self.system_prompt, &query).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(kind = K::NAME, batch = batch_no, error = %e, "model call failed, skipping batch");
                return None;
            }
        };

        let cleaned = strip_code_fence(&reply);
        debug!(kind = K::NAME, batch = batch_no, reply = %cleaned, "model reply");

        let parsed: BatchReply<K::Item> = match serde_json::from_str(&cleaned) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(kind = K::NAME, batch = batch_no, error = %e, "unparseable model reply, skipping batch");
                return None;
            }
        };

        let mismatched = parsed.analyses.len() != batch.len();
        if mismatched {
            warn!(
                kind = K::NAME,
                batch = batch_no,
                expected = batch.len(),
                got = parsed.analyses.len(),
                "analysis count does not match batch size"
            );
        }

        let rows = batch
            .iter()
            .enumerate()
            .map(|(i, record)| {
                self.kind
                    .to_row(record, batch_no, i + 1, parsed.analyses.get(i))
            })
            .collect();

        self.kind.fold(stats, &parsed);

        Some(BatchResult { rows, mismatched })
    }
}

struct BatchResult<R> {
    rows: Vec<R>,
    mismatched: bool,
}
