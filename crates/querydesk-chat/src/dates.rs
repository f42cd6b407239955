//! Relative timeframes: classifier time intents to absolute date ranges.
//!
//! The classifier never emits concrete dates for relative requests ("last
//! week", "month to date"). It names a preset, and the range is computed
//! here from a fixed `today`, so the same turn on the same day always
//! produces the same filter.

use std::fmt;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Day count used by `last_n_days` when the classifier gives none.
pub const DEFAULT_LAST_N_DAYS: u64 = 7;

/// A timeframe as the classifier describes it, before any date math.
///
/// Kept loosely typed so a bad preset drops only the date filter, not the
/// whole message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeIntent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    /// Date field the range applies to; the first date dimension if absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl TimeIntent {
    pub fn preset(preset: &str) -> Self {
        Self {
            preset: Some(preset.to_string()),
            ..Self::default()
        }
    }

    pub fn last_n_days(n: u64) -> Self {
        Self {
            n: Some(Value::from(n)),
            ..Self::preset("last_n_days")
        }
    }

    pub fn absolute(start: &str, end: &str) -> Self {
        Self {
            start: Some(start.to_string()),
            end: Some(end.to_string()),
            ..Self::preset("absolute")
        }
    }

    pub fn on(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    /// Compute the inclusive range this intent covers as of `today`.
    pub fn resolve(&self, today: NaiveDate) -> Result<DateRange, DateRangeError> {
        let preset = self
            .preset
            .as_deref()
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .ok_or(DateRangeError::MissingPreset)?;

        let (start, end) = match preset.as_str() {
            "today" => (today, today),
            "yesterday" => {
                let day = today.pred_opt().ok_or(DateRangeError::OutOfRange)?;
                (day, day)
            }
            "last_n_days" => {
                let n = self.day_count()?;
                let start = today
                    .checked_sub_days(Days::new(n - 1))
                    .ok_or(DateRangeError::OutOfRange)?;
                (start, today)
            }
            "mtd" => (month_start(today)?, today),
            "qtd" => (quarter_start(today)?, today),
            "ytd" => (ymd(today.year(), 1, 1)?, today),
            "prev_month" => {
                let end = month_start(today)?
                    .pred_opt()
                    .ok_or(DateRangeError::OutOfRange)?;
                (month_start(end)?, end)
            }
            "prev_quarter" => {
                let end = quarter_start(today)?
                    .pred_opt()
                    .ok_or(DateRangeError::OutOfRange)?;
                (quarter_start(end)?, end)
            }
            "prev_year" => {
                let year = today.year() - 1;
                (ymd(year, 1, 1)?, ymd(year, 12, 31)?)
            }
            "absolute" => {
                let (Some(start), Some(end)) = (self.start.as_deref(), self.end.as_deref()) else {
                    return Err(DateRangeError::MissingBounds);
                };
                (parse_date(start)?, parse_date(end)?)
            }
            _ => return Err(DateRangeError::UnsupportedPreset(preset)),
        };

        Ok(DateRange::new(start, end))
    }

    fn day_count(&self) -> Result<u64, DateRangeError> {
        match &self.n {
            None | Some(Value::Null) => Ok(DEFAULT_LAST_N_DAYS),
            Some(Value::Number(n)) => match n.as_u64() {
                Some(n) if n >= 1 => Ok(n),
                _ => Err(DateRangeError::InvalidDayCount(n.to_string())),
            },
            Some(other) => Err(DateRangeError::InvalidDayCount(other.to_string())),
        }
    }
}

/// Inclusive date range; `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Reversed bounds are swapped.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Filter syntax: `2025-09-23 to 2025-09-29`.
    pub fn filter_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// Why a time intent could not become a date range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateRangeError {
    #[error("time intent has no preset")]
    MissingPreset,
    #[error("unsupported date preset '{0}'")]
    UnsupportedPreset(String),
    #[error("last_n_days needs a whole number of days of at least 1, got {0}")]
    InvalidDayCount(String),
    #[error("absolute range needs both start and end")]
    MissingBounds,
    #[error("'{0}' is not a YYYY-MM-DD date")]
    InvalidDate(String),
    #[error("date range falls outside the supported calendar")]
    OutOfRange,
}

fn ymd(year: i32, month: u32, day: u32) -> Result<NaiveDate, DateRangeError> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or(DateRangeError::OutOfRange)
}

fn month_start(date: NaiveDate) -> Result<NaiveDate, DateRangeError> {
    ymd(date.year(), date.month(), 1)
}

fn quarter_start(date: NaiveDate) -> Result<NaiveDate, DateRangeError> {
    ymd(date.year(), (date.month() - 1) / 3 * 3 + 1, 1)
}

fn parse_date(raw: &str) -> Result<NaiveDate, DateRangeError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| DateRangeError::InvalidDate(raw.to_string()))
}
