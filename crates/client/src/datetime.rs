//! Datetime interval resolution.
//!
//! Search datetimes can be given as instants, RFC 3339 strings, truncated
//! dates (`2017`, `2017-06`, `2017-06-10`), open-ended ranges, or sequences of
//! up to two of those. [resolve_datetime] turns all of them into the single
//! interval string sent to the server.

use crate::{Error, Result};
use chrono::{
    DateTime, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeDelta,
    TimeZone, Utc,
};

/// The open-range sentinel.
pub const OPEN: &str = "..";

/// One side of a datetime interval.
#[derive(Debug, Clone, PartialEq)]
pub enum DatetimeComponent {
    /// An open end, either `..` or an absent value.
    Open,

    /// An exact instant.
    Instant(DateTime<Utc>),

    /// A string to be parsed.
    Text(String),
}

/// Anything that can be resolved into a search datetime.
///
/// # Examples
///
/// ```
/// use stac_client::DatetimeLike;
///
/// let _: DatetimeLike = "2017/2018".into();
/// let _: DatetimeLike = ["2017-06", "2017-07"].into();
/// let _: DatetimeLike = ("2020-01-01T00:00:00Z", None::<&str>).into();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum DatetimeLike {
    /// An exact instant.
    Instant(DateTime<Utc>),

    /// A single string, split on `/` into components.
    Text(String),

    /// An already-split list of components.
    Components(Vec<DatetimeComponent>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Precision {
    Year,
    Month,
    Day,
}

/// A resolved component: its start (or literal value) and, for truncated
/// dates, the last second of the period.
#[derive(Debug, PartialEq)]
struct Resolved {
    start: String,
    end: Option<String>,
}

/// Resolves a datetime into its wire-format interval string.
///
/// Returns `None` if there are no components.
///
/// # Examples
///
/// ```
/// use stac_client::resolve_datetime;
///
/// assert_eq!(
///     resolve_datetime("2017").unwrap().unwrap(),
///     "2017-01-01T00:00:00Z/2017-12-31T23:59:59Z"
/// );
/// assert_eq!(
///     resolve_datetime(["2017-06", "2017-07"]).unwrap().unwrap(),
///     "2017-06-01T00:00:00Z/2017-07-31T23:59:59Z"
/// );
/// assert_eq!(
///     resolve_datetime("2020-01-01T00:00:00Z/..").unwrap().unwrap(),
///     "2020-01-01T00:00:00Z/.."
/// );
/// ```
pub fn resolve_datetime(datetime: impl Into<DatetimeLike>) -> Result<Option<String>> {
    let components = match datetime.into() {
        DatetimeLike::Instant(instant) => return Ok(Some(format_instant(&instant))),
        DatetimeLike::Text(s) => s
            .split('/')
            .map(|s| DatetimeComponent::Text(s.to_string()))
            .collect(),
        DatetimeLike::Components(components) => components,
    };
    match components.as_slice() {
        [] => Ok(None),
        [component] => {
            let resolved = resolve_component(component)?;
            match resolved.end {
                Some(end) => Ok(Some(format!("{}/{}", resolved.start, end))),
                None => Ok(Some(resolved.start)),
            }
        }
        [first, second] => {
            let start = resolve_component(first)?.start;
            let second = resolve_component(second)?;
            Ok(Some(format!(
                "{}/{}",
                start,
                second.end.unwrap_or(second.start)
            )))
        }
        _ => Err(Error::TooManyDatetimeComponents(components.len())),
    }
}

fn resolve_component(component: &DatetimeComponent) -> Result<Resolved> {
    match component {
        DatetimeComponent::Open => Ok(Resolved {
            start: OPEN.to_string(),
            end: None,
        }),
        DatetimeComponent::Instant(instant) => Ok(Resolved {
            start: format_instant(instant),
            end: None,
        }),
        DatetimeComponent::Text(s) if s == OPEN => Ok(Resolved {
            start: OPEN.to_string(),
            end: None,
        }),
        DatetimeComponent::Text(s) => resolve_text(s),
    }
}

fn resolve_text(s: &str) -> Result<Resolved> {
    let invalid = || Error::InvalidDatetime(s.to_string());
    if s.len() > 10 {
        if !matches!(s.as_bytes().get(10), Some(b'T' | b't')) {
            return Err(invalid());
        }
        return if DateTime::parse_from_rfc3339(s).is_ok() {
            Ok(Resolved {
                start: s.to_string(),
                end: None,
            })
        } else {
            // No offset means UTC.
            let start = format!("{s}Z");
            DateTime::parse_from_rfc3339(&start).map_err(|_| invalid())?;
            Ok(Resolved { start, end: None })
        };
    }
    let (date, precision) = match s.len() {
        4 => (format!("{s}-01-01"), Precision::Year),
        7 => (format!("{s}-01"), Precision::Month),
        10 => (s.to_string(), Precision::Day),
        _ => return Err(invalid()),
    };
    let is_full_date = date.bytes().enumerate().all(|(i, b)| match i {
        4 | 7 => b == b'-',
        _ => b.is_ascii_digit(),
    });
    if !is_full_date {
        return Err(invalid());
    }
    let start = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| invalid())?;
    expand(s, start, precision)
}

fn expand(s: &str, date: NaiveDate, precision: Precision) -> Result<Resolved> {
    let invalid = || Error::InvalidDatetime(s.to_string());
    let start = date.and_time(NaiveTime::MIN);
    let next = match precision {
        Precision::Year => start.checked_add_months(Months::new(12)),
        Precision::Month => start.checked_add_months(Months::new(1)),
        Precision::Day => start.checked_add_days(Days::new(1)),
    }
    .ok_or_else(invalid)?;
    let end = next
        .checked_sub_signed(TimeDelta::seconds(1))
        .ok_or_else(invalid)?;
    Ok(Resolved {
        start: format_naive(&start),
        end: Some(format_naive(&end)),
    })
}

fn format_naive(datetime: &NaiveDateTime) -> String {
    format_instant(&Utc.from_utc_datetime(datetime))
}

fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl From<&str> for DatetimeComponent {
    fn from(s: &str) -> DatetimeComponent {
        DatetimeComponent::Text(s.to_string())
    }
}

impl From<String> for DatetimeComponent {
    fn from(s: String) -> DatetimeComponent {
        DatetimeComponent::Text(s)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for DatetimeComponent {
    fn from(datetime: DateTime<Tz>) -> DatetimeComponent {
        DatetimeComponent::Instant(datetime.with_timezone(&Utc))
    }
}

impl From<NaiveDateTime> for DatetimeComponent {
    fn from(datetime: NaiveDateTime) -> DatetimeComponent {
        DatetimeComponent::Instant(Utc.from_utc_datetime(&datetime))
    }
}

impl<T: Into<DatetimeComponent>> From<Option<T>> for DatetimeComponent {
    fn from(value: Option<T>) -> DatetimeComponent {
        value.map(Into::into).unwrap_or(DatetimeComponent::Open)
    }
}

impl From<&str> for DatetimeLike {
    fn from(s: &str) -> DatetimeLike {
        DatetimeLike::Text(s.to_string())
    }
}

impl From<String> for DatetimeLike {
    fn from(s: String) -> DatetimeLike {
        DatetimeLike::Text(s)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for DatetimeLike {
    fn from(datetime: DateTime<Tz>) -> DatetimeLike {
        DatetimeLike::Instant(datetime.with_timezone(&Utc))
    }
}

impl From<NaiveDateTime> for DatetimeLike {
    fn from(datetime: NaiveDateTime) -> DatetimeLike {
        DatetimeLike::Instant(Utc.from_utc_datetime(&datetime))
    }
}

impl<T: Into<DatetimeComponent>> From<Vec<T>> for DatetimeLike {
    fn from(components: Vec<T>) -> DatetimeLike {
        DatetimeLike::Components(components.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<DatetimeComponent>, const N: usize> From<[T; N]> for DatetimeLike {
    fn from(components: [T; N]) -> DatetimeLike {
        DatetimeLike::Components(components.into_iter().map(Into::into).collect())
    }
}

impl<A: Into<DatetimeComponent>, B: Into<DatetimeComponent>> From<(A, B)> for DatetimeLike {
    fn from((start, end): (A, B)) -> DatetimeLike {
        DatetimeLike::Components(vec![start.into(), end.into()])
    }
}
