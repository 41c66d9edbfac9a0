//! Publish-time normalization.
//!
//! Weibo renders publish times in several relative and absolute forms.
//! [`normalize`] tries a fixed table of patterns in priority order and
//! resolves the first match against a reference "now".

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::debug;

static FULL_DATE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})年(\d{1,2})月(\d{1,2})日\s*(\d{1,2}):(\d{1,2})")
        .expect("valid full date regex")
});

static MONTH_DAY_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})月(\d{1,2})日\s*(\d{1,2}):(\d{1,2})").expect("valid month-day regex")
});

static TODAY_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"今天\s*(\d{1,2}):(\d{1,2})").expect("valid today regex"));

static MINUTES_AGO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*分钟前").expect("valid minutes-ago regex"));

static HOURS_AGO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*小时前").expect("valid hours-ago regex"));

const JUST_NOW: &str = "刚刚";
const TODAY: &str = "今天";

/// Which pattern produced a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeForm {
    FullDateTime,
    MonthDayTime,
    JustNow,
    IsoDateTime,
    IsoDate,
    Today,
    MinutesAgo,
    HoursAgo,
}

/// Normalize `text` to an absolute instant, relative to `now`.
///
/// Returns `None` when no form matches or the matched fields are not a valid
/// date; callers exclude such records rather than failing.
pub fn normalize(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let parsed = normalize_with_form(text, now).map(|(dt, _)| dt);
    debug!(raw = text, parsed = ?parsed, "normalized publish time");
    parsed
}

/// Like [`normalize`], also reporting which form matched.
pub fn normalize_with_form(text: &str, now: NaiveDateTime) -> Option<(NaiveDateTime, TimeForm)> {
    let text = text.trim();

    if let Some(caps) = FULL_DATE_TIME.captures(text) {
        let dt = date_time(
            num(&caps, 1)?,
            num(&caps, 2)?,
            num(&caps, 3)?,
            num(&caps, 4)?,
            num(&caps, 5)?,
        )?;
        return Some((dt, TimeForm::FullDateTime));
    }

    // The year is implied; posts from late December read in January drift a year.
    if let Some(caps) = MONTH_DAY_TIME.captures(text) {
        let dt = date_time(
            now.year(),
            num(&caps, 1)?,
            num(&caps, 2)?,
            num(&caps, 3)?,
            num(&caps, 4)?,
        )?;
        return Some((dt, TimeForm::MonthDayTime));
    }

    if text.contains(JUST_NOW) {
        return Some((now, TimeForm::JustNow));
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M") {
        return Some((dt, TimeForm::IsoDateTime));
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some((date.and_time(NaiveTime::MIN), TimeForm::IsoDate));
    }

    if text.contains(TODAY) {
        let dt = match TODAY_TIME.captures(text) {
            Some(caps) => {
                let time = NaiveTime::from_hms_opt(num(&caps, 1)?, num(&caps, 2)?, 0)?;
                now.date().and_time(time)
            }
            None => now,
        };
        return Some((dt, TimeForm::Today));
    }

    if let Some(caps) = MINUTES_AGO.captures(text) {
        let delta = TimeDelta::try_minutes(num(&caps, 1)?)?;
        return Some((now.checked_sub_signed(delta)?, TimeForm::MinutesAgo));
    }

    if let Some(caps) = HOURS_AGO.captures(text) {
        let delta = TimeDelta::try_hours(num(&caps, 1)?)?;
        return Some((now.checked_sub_signed(delta)?, TimeForm::HoursAgo));
    }

    None
}

fn num<T: std::str::FromStr>(caps: &Captures<'_>, index: usize) -> Option<T> {
    caps.get(index)?.as_str().parse().ok()
}

fn date_time(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)
}
