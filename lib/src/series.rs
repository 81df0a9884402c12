use std::collections::BTreeMap;

use serde::Serialize;

use crate::dataset::{value_as_f64, value_as_str, Row, SENSOR_KEYS};
use crate::lttb::{self, Point};
use crate::timeseries::{bucket_key, bucket_label, parse_timestamp, Aggregation};

/// Maximum number of raw points collected before downsampling.
pub const RAW_LIMIT: usize = 100_000;

/// Default number of points handed to a chart.
pub const DRAW_LIMIT: usize = 2_000;

pub const HISTOGRAM_BINS: usize = 20;

/// Upper bound on histogram bins; larger requests are capped.
pub const MAX_HISTOGRAM_BINS: usize = 1_000;

/// Map two numeric columns of `rows` to plot points.
///
/// Rows where either value is missing, non-numeric or non-finite are
/// skipped. Collection stops once `raw_limit` points have been kept.
pub fn scatter_points(rows: &[Row], x_key: &str, y_key: &str, raw_limit: usize) -> Vec<Point> {
    rows.iter()
        .filter_map(|row| {
            let x = row.get(x_key).and_then(value_as_f64)?;
            let y = row.get(y_key).and_then(value_as_f64)?;
            (x.is_finite() && y.is_finite()).then_some(Point::new(x, y))
        })
        .take(raw_limit)
        .collect()
}

/// [`scatter_points`] followed by LTTB downsampling to `threshold` points.
pub fn scatter(rows: &[Row], x_key: &str, y_key: &str, threshold: usize) -> Vec<Point> {
    let points = scatter_points(rows, x_key, y_key, RAW_LIMIT);
    lttb::downsample(&points, threshold)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    /// Sortable bucket key, or the raw timestamp for [`Aggregation::All`].
    pub bucket: String,
    pub label: String,
    pub value: f64,
    /// Number of readings behind `value`.
    pub count: usize,
}

/// Time series of one parameter, optionally averaged per day, ISO week or
/// month.
///
/// Readings with an unparseable timestamp or a non-numeric value are
/// dropped. Without aggregation every reading is returned in time order and
/// labelled with its original timestamp text.
pub fn trend(rows: &[Row], time_key: &str, param: &str, agg: Aggregation) -> Vec<TrendPoint> {
    let mut readings: Vec<_> = rows
        .iter()
        .filter_map(|row| {
            let raw = row.get(time_key).and_then(value_as_str)?;
            let ts = parse_timestamp(&raw)?;
            let value = row.get(param).and_then(value_as_f64)?;
            (!value.is_nan()).then_some((ts, raw, value))
        })
        .collect();
    readings.sort_by_key(|(ts, _, _)| *ts);

    if agg == Aggregation::All {
        return readings
            .into_iter()
            .map(|(ts, raw, value)| TrendPoint {
                bucket: bucket_key(&ts, agg),
                label: raw,
                value,
                count: 1,
            })
            .collect();
    }

    let mut buckets: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for (ts, _, value) in &readings {
        let entry = buckets.entry(bucket_key(ts, agg)).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    buckets
        .into_iter()
        .map(|(bucket, (sum, count))| TrendPoint {
            label: bucket_label(&bucket, agg),
            bucket,
            value: sum / count as f64,
            count,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bin {
    /// Lower edge of the bin.
    pub start: f64,
    pub count: usize,
}

/// Equal-width histogram of `values` over `[min, max]`.
///
/// The maximum lands in the last bin. When every value is equal the bin
/// width falls back to 1. `bins` is capped at [`MAX_HISTOGRAM_BINS`].
pub fn histogram(values: &[f64], bins: usize) -> Vec<Bin> {
    let bins = bins.min(MAX_HISTOGRAM_BINS);
    let values: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let step = match (max - min) / bins as f64 {
        s if s > 0.0 => s,
        _ => 1.0,
    };

    let mut counts = vec![0usize; bins];
    for v in values {
        let idx = (((v - min) / step).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| Bin {
            start: min + i as f64 * step,
            count,
        })
        .collect()
}

/// Numeric values of one column.
pub fn column_values(rows: &[Row], key: &str) -> Vec<f64> {
    rows.iter()
        .filter_map(|row| row.get(key).and_then(value_as_f64))
        .filter(|v| v.is_finite())
        .collect()
}

/// Keep rows where at least one sensor parameter reads a non-zero number.
/// Loggers emit all-zero rows while a sensor is disconnected.
pub fn sensor_filter(rows: Vec<Row>) -> Vec<Row> {
    rows.into_iter()
        .filter(|row| {
            SENSOR_KEYS.iter().any(|k| {
                row.get(*k)
                    .and_then(value_as_f64)
                    .is_some_and(|v| !v.is_nan() && v != 0.0)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn scatter_skips_bad_rows() {
        let rows = vec![
            row(&[("a", json!(1)), ("b", json!("2.5"))]),
            row(&[("a", json!("x")), ("b", json!(1))]),
            row(&[("a", json!(2))]),
            row(&[("a", json!("inf")), ("b", json!(1))]),
            row(&[("a", json!(3)), ("b", json!(4))]),
        ];
        let points = scatter_points(&rows, "a", "b", RAW_LIMIT);
        assert_eq!(points, vec![Point::new(1.0, 2.5), Point::new(3.0, 4.0)]);
    }

    #[test]
    fn scatter_respects_raw_limit() {
        let rows: Vec<Row> = (0..10)
            .map(|i| row(&[("a", json!(i)), ("b", json!(i * 2))]))
            .collect();
        let points = scatter_points(&rows, "a", "b", 4);
        assert_eq!(points.len(), 4);
        assert_eq!(points[3], Point::new(3.0, 6.0));
    }

    #[test]
    fn scatter_downsamples() {
        let rows: Vec<Row> = (0..5_000)
            .map(|i| row(&[("a", json!(i)), ("b", json!((i % 17) as f64))]))
            .collect();
        let points = scatter(&rows, "a", "b", DRAW_LIMIT);
        assert_eq!(points.len(), DRAW_LIMIT);
        assert_eq!(points[0], Point::new(0.0, 0.0));
        assert_eq!(points[DRAW_LIMIT - 1].x, 4_999.0);
    }

    fn readings() -> Vec<Row> {
        vec![
            row(&[("t", json!("02/01/2024 08:00:00")), ("pH", json!(8.0))]),
            row(&[("t", json!("01/01/2024 08:00:00")), ("pH", json!("7.0"))]),
            row(&[("t", json!("01/01/2024 20:00:00")), ("pH", json!(7.5))]),
            row(&[("t", json!("bad")), ("pH", json!(1.0))]),
            row(&[("t", json!("03/02/2024 08:00:00")), ("pH", json!(""))]),
            row(&[("t", json!("04/02/2024 08:00:00")), ("pH", json!(6.0))]),
        ]
    }

    #[test]
    fn trend_without_aggregation_is_time_ordered() {
        let points = trend(&readings(), "t", "pH", Aggregation::All);
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![7.0, 7.5, 8.0, 6.0]);
        assert_eq!(points[0].label, "01/01/2024 08:00:00");
        assert_eq!(points[0].bucket, "2024-01-01 08:00:00");
    }

    #[test]
    fn trend_daily_means() {
        let points = trend(&readings(), "t", "pH", Aggregation::Daily);
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].bucket, "2024-01-01");
        assert_eq!(points[0].value, 7.25);
        assert_eq!(points[0].count, 2);
        assert_eq!(points[2].bucket, "2024-02-04");
    }

    #[test]
    fn trend_monthly_labels() {
        let points = trend(&readings(), "t", "pH", Aggregation::Monthly);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].label, "January 2024");
        assert!((points[0].value - 7.5).abs() < 1e-12);
        assert_eq!(points[1].label, "February 2024");
    }

    #[test]
    fn trend_missing_column_is_empty() {
        assert!(trend(&readings(), "t", "DO", Aggregation::Weekly).is_empty());
        assert!(trend(&readings(), "time", "pH", Aggregation::All).is_empty());
    }

    #[test]
    fn histogram_bins() {
        let values: Vec<f64> = (0..=100).map(|v| v as f64).collect();
        let bins = histogram(&values, 20);
        assert_eq!(bins.len(), 20);
        assert_eq!(bins[0].start, 0.0);
        assert_eq!(bins[1].start, 5.0);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 101);
        // 95..=100 all land in the last bin.
        assert_eq!(bins[19].count, 6);
    }

    #[test]
    fn histogram_caps_bin_count() {
        let bins = histogram(&[0.0, 1.0], 10_000_000_000);
        assert_eq!(bins.len(), MAX_HISTOGRAM_BINS);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 2);
        assert_eq!(bins.last().unwrap().count, 1);
    }

    #[test]
    fn histogram_constant_and_empty() {
        let bins = histogram(&[3.0, 3.0, 3.0], HISTOGRAM_BINS);
        assert_eq!(bins[0].count, 3);
        assert_eq!(bins[1].start, 4.0);
        assert!(histogram(&[], HISTOGRAM_BINS).is_empty());
        assert!(histogram(&[f64::NAN], HISTOGRAM_BINS).is_empty());
    }

    #[test]
    fn drops_all_zero_rows() {
        let rows = vec![
            row(&[("pH_Sensor", json!(0)), ("DO_Sensor", json!("0.00"))]),
            row(&[("pH_Sensor", json!(0)), ("DO_Sensor", json!("6.1"))]),
            row(&[("Timestamp", json!("x"))]),
        ];
        let kept = sensor_filter(rows.clone());
        assert_eq!(kept, vec![rows[1].clone()]);
    }
}
