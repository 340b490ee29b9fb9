//! Chart publication dates and weekly date ranges.
//!
//! Every chart is published on a Saturday. Dates entering the system are
//! rounded onto that weekday before anything else happens, and a range is
//! always rounded with a single direction so consecutive runs never skip or
//! repeat a publication week.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Date of the first published chart.
pub const OLDEST_CHART_DATE: NaiveDate = match NaiveDate::from_ymd_opt(1958, 8, 4) {
    Some(date) => date,
    None => panic!("invalid oldest chart date"),
};

const DAYS_PER_WEEK: u64 = 7;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateRangeError {
    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange { start: ChartDate, end: ChartDate },
}

/// Direction used to move a date onto the publication weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekdayRounding {
    /// Most recent Saturday on or before the date. Never asks for an
    /// unpublished chart.
    #[default]
    Backward,
    /// First Saturday on or after the date.
    Forward,
}

/// A calendar date that always falls on the publication weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChartDate(NaiveDate);

impl ChartDate {
    pub const PUBLICATION_WEEKDAY: Weekday = Weekday::Sat;

    /// Round `date` onto the publication weekday.
    pub fn normalize(date: NaiveDate, rounding: WeekdayRounding) -> Self {
        // Saturday is day 6 counting from Sunday.
        let from_sunday = date.weekday().num_days_from_sunday() as u64;
        match rounding {
            WeekdayRounding::Backward => Self(date - Days::new((from_sunday + 1) % DAYS_PER_WEEK)),
            WeekdayRounding::Forward => Self(date + Days::new(6 - from_sunday)),
        }
    }

    /// Wrap a date that is already a Saturday.
    pub fn from_publication_date(date: NaiveDate) -> Option<Self> {
        (date.weekday() == Self::PUBLICATION_WEEKDAY).then_some(Self(date))
    }

    /// The latest chart that has been published as of `today`.
    pub fn most_recent(today: NaiveDate) -> Self {
        Self::normalize(today, WeekdayRounding::Backward)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// The following publication date.
    pub fn next_week(&self) -> Self {
        Self(self.0 + Days::new(DAYS_PER_WEEK))
    }

    /// Number of whole weeks from `self` to `other`.
    pub fn weeks_until(&self, other: ChartDate) -> i64 {
        (other.0 - self.0).num_days() / DAYS_PER_WEEK as i64
    }

    /// `YYYY-MM-DD`, the form used in chart URLs and in the store.
    pub fn to_iso(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    pub fn parse_iso(s: &str) -> Option<Self> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(Self::from_publication_date)
    }
}

impl fmt::Display for ChartDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Inclusive range of publication dates, one per week.
///
/// Both ends are normalized inside [`DateRange::new`]; the range itself holds
/// no iteration state, so [`DateRange::dates`] can be called any number of
/// times and always yields the same sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: ChartDate,
    end: ChartDate,
}

impl DateRange {
    pub fn new(
        start: NaiveDate,
        end: NaiveDate,
        rounding: WeekdayRounding,
    ) -> Result<Self, DateRangeError> {
        let start = ChartDate::normalize(start, rounding);
        let end = ChartDate::normalize(end, rounding);
        if start > end {
            return Err(DateRangeError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> ChartDate {
        self.start
    }

    pub fn end(&self) -> ChartDate {
        self.end
    }

    /// Number of charts published in the range.
    pub fn chart_count(&self) -> usize {
        self.start.weeks_until(self.end) as usize + 1
    }

    pub fn dates(&self) -> ChartDates {
        ChartDates {
            next: Some(self.start),
            end: self.end,
        }
    }
}

/// Iterator over the weeks of a [`DateRange`].
#[derive(Debug, Clone)]
pub struct ChartDates {
    next: Option<ChartDate>,
    end: ChartDate,
}

impl Iterator for ChartDates {
    type Item = ChartDate;

    fn next(&mut self) -> Option<ChartDate> {
        let current = self.next?;
        self.next = Some(current.next_week()).filter(|d| *d <= self.end);
        Some(current)
    }
}

/// Weekly publication dates between `start` and `end`, both rounded backward.
pub fn generate(start: NaiveDate, end: NaiveDate) -> Result<Vec<ChartDate>, DateRangeError> {
    Ok(DateRange::new(start, end, WeekdayRounding::Backward)?
        .dates()
        .collect())
}
