//! Time-windowed collection.
//!
//! A day is split into 24 one-hour [`TimeWindow`]s. For each window the
//! [`WindowedCollector`] walks the search result pages, keeps the posts whose
//! publish time falls in the window and whose body contains the keyword, and
//! appends them to the raw-record sink page by page.

use crate::collector::search::{SearchItem, SearchSource};
use crate::collector::timestamp;
use crate::models::RawRecord;
use crate::report::sink::CsvSink;
use anyhow::Result;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use std::fmt;
use tracing::{debug, info, warn};

/// Marker separating publish time from the client label in a card's footer.
const SOURCE_MARKER: &str = "来自";
const UNKNOWN_SOURCE: &str = "无";

/// A closed time interval `[start, end]` with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    /// Returns `None` unless `start < end`.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// The 24 contiguous one-hour windows of `date`.
    pub fn hours_of_day(date: NaiveDate) -> Vec<TimeWindow> {
        let midnight = date.and_time(NaiveTime::MIN);
        (0..24)
            .filter_map(|hour| {
                TimeWindow::new(
                    midnight + TimeDelta::hours(hour),
                    midnight + TimeDelta::hours(hour + 1),
                )
            })
            .collect()
    }

    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        instant >= self.start && instant <= self.end
    }

    /// Search `timescope` parameter, e.g. `custom:2025-03-01-10:2025-03-01-11`.
    pub fn timescope(&self) -> String {
        format!(
            "custom:{}:{}",
            self.start.format("%Y-%m-%d-%H"),
            self.end.format("%Y-%m-%d-%H")
        )
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} → {}",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M")
        )
    }
}

/// Counters from one collection run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub windows: usize,
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub kept: usize,
    pub out_of_window: usize,
    pub unparsed_time: usize,
    pub missing_keyword: usize,
}

/// Why a candidate item was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    UnparsedTime,
    OutOfWindow,
    MissingKeyword,
}

/// Pages a search source over time windows and persists matching posts.
pub struct WindowedCollector<'a, S: SearchSource + ?Sized> {
    source: &'a S,
    max_pages: u32,
    next_seq: u64,
    clock: fn() -> NaiveDateTime,
}

impl<'a, S: SearchSource + ?Sized> WindowedCollector<'a, S> {
    pub fn new(source: &'a S, max_pages: u32) -> Self {
        Self {
            source,
            max_pages,
            next_seq: 1,
            clock: local_now,
        }
    }

    /// Use a fixed reference clock for relative timestamps.
    #[cfg(test)]
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    /// Collect all 24 hourly windows of `date`.
    pub async fn collect_day(
        &mut self,
        keyword: &str,
        date: NaiveDate,
        sink: &CsvSink<RawRecord>,
    ) -> Result<CollectStats> {
        let mut stats = CollectStats::default();
        for window in TimeWindow::hours_of_day(date) {
            self.collect_window(keyword, &window, sink, &mut stats).await?;
        }

        info!(
            keyword,
            kept = stats.kept,
            pages = stats.pages_fetched,
            failed_pages = stats.pages_failed,
            "collection finished"
        );
        Ok(stats)
    }

    /// Collect one window, every page up to the page ceiling.
    ///
    /// Empty pages do not end the loop: sparse pages can precede dense ones.
    pub async fn collect_window(
        &mut self,
        keyword: &str,
        window: &TimeWindow,
        sink: &CsvSink<RawRecord>,
        stats: &mut CollectStats,
    ) -> Result<()> {
        stats.windows += 1;

        for page in 1..=self.max_pages {
            debug!(%window, page, "fetching search page");

            let items = match self.source.fetch_page(keyword, window, page).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(%window, page, error = %e, "search page failed, skipping");
                    stats.pages_failed += 1;
                    continue;
                }
            };
            stats.pages_fetched += 1;

            let now = (self.clock)();
            let mut buffer = Vec::new();
            for item in items {
                match self.accept(item, keyword, window, page, now) {
                    Ok(record) => buffer.push(record),
                    Err(Rejection::UnparsedTime) => stats.unparsed_time += 1,
                    Err(Rejection::OutOfWindow) => stats.out_of_window += 1,
                    Err(Rejection::MissingKeyword) => stats.missing_keyword += 1,
                }
            }

            stats.kept += buffer.len();
            let written = sink.append(&buffer)?;
            if written > 0 {
                debug!(%window, page, written, "page saved");
            }
        }

        Ok(())
    }

    fn accept(
        &mut self,
        item: SearchItem,
        keyword: &str,
        window: &TimeWindow,
        page: u32,
        now: NaiveDateTime,
    ) -> Result<RawRecord, Rejection> {
        let (published_text, source) = split_time_and_source(&item.from_text);

        let published_at =
            timestamp::normalize(&published_text, now).ok_or(Rejection::UnparsedTime)?;
        if !window.contains(published_at) {
            return Err(Rejection::OutOfWindow);
        }

        if !item.body.contains(keyword) {
            return Err(Rejection::MissingKeyword);
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        Ok(RawRecord {
            seq,
            page,
            author: item.author,
            published_text,
            published_at: Some(published_at),
            source,
            reposts: item.reposts,
            comments: item.comments,
            likes: item.likes,
            body: item.body,
        })
    }
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Split a card footer into `(publish time text, source label)`.
pub fn split_time_and_source(from_text: &str) -> (String, String) {
    match from_text.split_once(SOURCE_MARKER) {
        Some((time, source)) => {
            let source = source.trim();
            let source = if source.is_empty() {
                UNKNOWN_SOURCE
            } else {
                source
            };
            (time.trim().to_string(), source.to_string())
        }
        None => (from_text.trim().to_string(), UNKNOWN_SOURCE.to_string()),
    }
}
