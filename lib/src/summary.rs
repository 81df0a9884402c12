use std::collections::BTreeMap;
use std::io::Write;

use chrono::NaiveDateTime;
use serde::Serialize;
use tabwriter::TabWriter;

use crate::dataset::{guess_time_key, numeric_columns, value_as_f64, Row, Schema};
use crate::timeseries::row_timestamp;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    /// Value of the most recent row that has one.
    pub latest: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

/// Compact description of a dataset, small enough to hand to an LLM.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub rows: usize,
    pub time_range: Option<TimeRange>,
    pub columns: BTreeMap<String, ColumnSummary>,
}

/// Summarize every numeric column of `rows`.
///
/// "latest" is the value from the row with the newest timestamp. Without a
/// timestamp column, or when no row carrying the value has a parseable
/// timestamp, it is the last such row in input order.
pub fn summarize(rows: &[Row], schema: &Schema) -> DatasetSummary {
    let time_key = guess_time_key(schema);
    let stamps: Vec<Option<NaiveDateTime>> = rows
        .iter()
        .map(|r| time_key.as_deref().and_then(|key| row_timestamp(r, key)))
        .collect();

    let mut columns = BTreeMap::new();
    for column in numeric_columns(schema) {
        let readings: Vec<(Option<NaiveDateTime>, f64)> = rows
            .iter()
            .zip(&stamps)
            .filter_map(|(r, ts)| Some((*ts, r.get(&column).and_then(value_as_f64)?)))
            .filter(|(_, v)| v.is_finite())
            .collect();
        if let Some(summary) = summarize_readings(&readings) {
            columns.insert(column, summary);
        }
    }

    let time_range = {
        let mut known = stamps.iter().flatten().copied();
        known.next().map(|first| {
            let (start, end) = known.fold((first, first), |(lo, hi), ts| (lo.min(ts), hi.max(ts)));
            TimeRange {
                start: start.format("%Y-%m-%d %H:%M:%S").to_string(),
                end: end.format("%Y-%m-%d %H:%M:%S").to_string(),
            }
        })
    };

    DatasetSummary {
        rows: rows.len(),
        time_range,
        columns,
    }
}

// Newest timestamped reading; later rows win ties.
fn latest_reading(readings: &[(Option<NaiveDateTime>, f64)]) -> Option<f64> {
    let newest = readings
        .iter()
        .filter_map(|(ts, v)| ts.map(|ts| (ts, *v)))
        .fold(None, |best: Option<(NaiveDateTime, f64)>, (ts, v)| match best {
            Some((b, _)) if b > ts => best,
            _ => Some((ts, v)),
        });
    newest
        .map(|(_, v)| v)
        .or_else(|| readings.last().map(|(_, v)| *v))
}

fn summarize_readings(readings: &[(Option<NaiveDateTime>, f64)]) -> Option<ColumnSummary> {
    let count = readings.len();
    if count == 0 {
        return None;
    }
    let values = readings.iter().map(|(_, v)| *v);
    let n = count as f64;
    let mean = values.clone().sum::<f64>() / n;
    let variance = values.clone().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(ColumnSummary {
        count,
        min: values.clone().fold(f64::INFINITY, f64::min),
        max: values.fold(f64::NEG_INFINITY, f64::max),
        mean,
        std_dev: variance.sqrt(),
        latest: latest_reading(readings),
    })
}

/// Write a summary as an aligned text table.
pub fn report_text(summary: &DatasetSummary, w: &mut dyn Write) -> eyre::Result<()> {
    let mut tw = TabWriter::new(w);

    writeln!(tw, "Rows\t{}", summary.rows)?;
    if let Some(range) = &summary.time_range {
        writeln!(tw, "Time range\t{} .. {}", range.start, range.end)?;
    }
    writeln!(tw)?;
    writeln!(tw, "Column\tCount\tMin\tMean\tMax\tStd dev\tLatest")?;
    for (name, c) in &summary.columns {
        let latest = c
            .latest
            .map(|v| format!("{v:.2}"))
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            tw,
            "{}\t{}\t{:.2}\t{:.2}\t{:.2}\t{:.2}\t{}",
            name, c.count, c.min, c.mean, c.max, c.std_dev, latest
        )?;
    }
    tw.flush()?;
    Ok(())
}

pub fn report_json(summary: &DatasetSummary, w: &mut dyn Write) -> eyre::Result<()> {
    serde_json::to_writer_pretty(&mut *w, summary)?;
    writeln!(w)?;
    Ok(())
}
