use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::dataset::{value_as_str, Row};
use crate::error::Error;

const DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y, %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

/// Parse a sensor timestamp.
///
/// Accepts the logger's `DD/MM/YYYY HH:mm:ss` (optionally with a comma after
/// the date), ISO-8601 with or without `T`, fractional seconds or a UTC offset,
/// and bare dates. Offsets are dropped: the wall-clock time is kept as-is.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.naive_local());
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }
    None
}

/// Parse the timestamp stored under `key` in a row.
pub fn row_timestamp(row: &Row, key: &str) -> Option<NaiveDateTime> {
    row.get(key)
        .and_then(value_as_str)
        .and_then(|s| parse_timestamp(&s))
}

/// Time aggregation applied to trend series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    All,
    Daily,
    Weekly,
    Monthly,
}

impl FromStr for Aggregation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Aggregation::All),
            "daily" => Ok(Aggregation::Daily),
            "weekly" => Ok(Aggregation::Weekly),
            "monthly" => Ok(Aggregation::Monthly),
            _ => Err(Error::InvalidAggregation(s.to_string())),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Aggregation::All => "all",
            Aggregation::Daily => "daily",
            Aggregation::Weekly => "weekly",
            Aggregation::Monthly => "monthly",
        };
        f.write_str(name)
    }
}

/// Key of the bucket a timestamp falls into. Keys sort chronologically.
pub fn bucket_key(ts: &NaiveDateTime, agg: Aggregation) -> String {
    match agg {
        Aggregation::All => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        Aggregation::Daily => ts.format("%Y-%m-%d").to_string(),
        Aggregation::Weekly => {
            let week = ts.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        Aggregation::Monthly => ts.format("%Y-%m").to_string(),
    }
}

/// Human readable label for a bucket key produced by [`bucket_key`].
///
/// Weekly keys become the Monday to Sunday date span of the ISO week and monthly
/// keys the month name and year. Unparseable keys are returned unchanged.
pub fn bucket_label(key: &str, agg: Aggregation) -> String {
    match agg {
        Aggregation::All | Aggregation::Daily => key.to_string(),
        Aggregation::Weekly => {
            let parsed = key.split_once("-W").and_then(|(year, week)| {
                let year = year.parse().ok()?;
                let week = week.parse().ok()?;
                NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
            });
            match parsed {
                Some(start) => {
                    let end = start + Duration::days(6);
                    format!("{} – {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"))
                }
                None => key.to_string(),
            }
        }
        Aggregation::Monthly => match NaiveDate::parse_from_str(&format!("{key}-01"), "%Y-%m-%d") {
            Ok(date) => date.format("%B %Y").to_string(),
            Err(_) => key.to_string(),
        },
    }
}

/// Distinct `YYYY-MM` months present in the rows, sorted.
pub fn month_choices(rows: &[Row], time_key: &str) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row_timestamp(row, time_key))
        .map(|ts| ts.format("%Y-%m").to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Rows whose timestamp falls within `[start 00:00:00, end 23:59:59.999]`.
/// Rows without a parseable timestamp are dropped.
pub fn filter_range(rows: &[Row], time_key: &str, start: NaiveDate, end: NaiveDate) -> Vec<Row> {
    let from = start.and_time(NaiveTime::MIN);
    let to = end.and_time(NaiveTime::MIN) + Duration::days(1);
    rows.iter()
        .filter(|row| {
            row_timestamp(row, time_key)
                .map(|ts| ts >= from && ts < to)
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Stable sort by timestamp, ascending. Rows without a parseable timestamp
/// sort first.
pub fn sort_by_time(rows: &mut [Row], time_key: &str) {
    rows.sort_by(|a, b| {
        match (row_timestamp(a, time_key), row_timestamp(b, time_key)) {
            (Some(a), Some(b)) => a.cmp(&b),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    fn row(time: &str) -> Row {
        let mut row = Row::new();
        row.insert("Timestamp".to_string(), json!(time));
        row
    }

    #[test]
    fn parses_logger_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 7, 9)
            .unwrap();
        assert_eq!(ts("05/03/2024 14:07:09"), expected);
        assert_eq!(ts("05/03/2024, 14:07:09"), expected);
        assert_eq!(ts("2024-03-05 14:07:09"), expected);
        assert_eq!(ts("2024-03-05T14:07:09"), expected);
        assert_eq!(ts("2024-03-05T14:07:09Z"), expected);
        assert_eq!(ts("  2024-03-05T14:07:09+08:00 "), expected);
    }

    #[test]
    fn parses_bare_dates() {
        let midnight = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_time(NaiveTime::MIN);
        assert_eq!(ts("2024-01-31"), midnight);
        assert_eq!(ts("31/01/2024"), midnight);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("7.25").is_none());
        assert!(parse_timestamp("32/01/2024 00:00:00").is_none());
    }

    #[test]
    fn aggregation_from_str() {
        assert_eq!("Weekly".parse::<Aggregation>().unwrap(), Aggregation::Weekly);
        assert_eq!("all".parse::<Aggregation>().unwrap(), Aggregation::All);
        assert!("hourly".parse::<Aggregation>().is_err());
    }

    #[test]
    fn bucket_keys() {
        let t = ts("2024-12-30 08:00:00");
        assert_eq!(bucket_key(&t, Aggregation::All), "2024-12-30 08:00:00");
        assert_eq!(bucket_key(&t, Aggregation::Daily), "2024-12-30");
        // 2024-12-30 is in ISO week 1 of 2025.
        assert_eq!(bucket_key(&t, Aggregation::Weekly), "2025-W01");
        assert_eq!(bucket_key(&t, Aggregation::Monthly), "2024-12");
    }

    #[test]
    fn bucket_labels() {
        assert_eq!(
            bucket_label("2025-W01", Aggregation::Weekly),
            "2024-12-30 – 2025-01-05"
        );
        assert_eq!(bucket_label("2024-03", Aggregation::Monthly), "March 2024");
        assert_eq!(bucket_label("2024-03-05", Aggregation::Daily), "2024-03-05");
        assert_eq!(bucket_label("bogus", Aggregation::Weekly), "bogus");
    }

    #[test]
    fn months_are_distinct_and_sorted() {
        let rows = vec![
            row("05/03/2024 10:00:00"),
            row("2024-01-02 00:00:00"),
            row("not a date"),
            row("2024-03-30 23:00:00"),
        ];
        assert_eq!(month_choices(&rows, "Timestamp"), vec!["2024-01", "2024-03"]);
    }

    #[test]
    fn range_is_inclusive_of_whole_end_day() {
        let rows = vec![
            row("2024-03-04 23:59:59"),
            row("2024-03-05 00:00:00"),
            row("2024-03-06 23:59:59"),
            row("2024-03-07 00:00:00"),
            row(""),
        ];
        let start = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        let kept = filter_range(&rows, "Timestamp", start, end);
        assert_eq!(kept, vec![rows[1].clone(), rows[2].clone()]);
    }

    #[test]
    fn sorts_by_real_time() {
        let mut rows = vec![
            row("10/01/2024 00:00:00"),
            row("09/01/2024 12:00:00"),
            row("garbage"),
        ];
        sort_by_time(&mut rows, "Timestamp");
        assert_eq!(rows[0], row("garbage"));
        assert_eq!(rows[1], row("09/01/2024 12:00:00"));
        assert_eq!(rows[2], row("10/01/2024 00:00:00"));
    }
}
