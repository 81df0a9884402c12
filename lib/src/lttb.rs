use serde::{Deserialize, Serialize};

/// A single plot coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point { x, y }
    }
}

/// Largest Triangle Three Buckets (LTTB) downsampling algorithm.
///
/// Reduces a slice of points, ordered along x, to `threshold` points while
/// preserving the visual shape of the series. The first and last points are
/// always kept and the relative order of the input is preserved.
///
/// Returns a copy of the input if `threshold == 0`, `threshold >= points.len()`
/// or the input has two points or fewer. Coordinates must be finite; callers
/// filter NaN and infinities before calling.
pub fn downsample(points: &[Point], threshold: usize) -> Vec<Point> {
    match select(points, threshold) {
        Some(indices) => indices.into_iter().map(|i| points[i]).collect(),
        None => points.to_vec(),
    }
}

/// Like [`downsample`], but returns the indices of the selected points in
/// the input instead of the points themselves.
pub fn downsample_indices(points: &[Point], threshold: usize) -> Vec<usize> {
    select(points, threshold).unwrap_or_else(|| (0..points.len()).collect())
}

// None means no reduction applies and the whole input is kept.
fn select(points: &[Point], threshold: usize) -> Option<Vec<usize>> {
    let n = points.len();
    if threshold == 0 || threshold >= n || n <= 2 {
        return None;
    }

    let mut sampled = Vec::with_capacity(threshold.max(2));
    sampled.push(0);

    // With threshold < 2 there are no interior buckets and only the
    // endpoints survive.
    let buckets = threshold.saturating_sub(2);
    let bucket_size = (n - 2) as f64 / buckets as f64;
    let bound = |k: usize| ((k as f64 * bucket_size).floor() as usize + 1).min(n - 1);

    let mut a = 0usize;

    for i in 0..buckets {
        // Centroid of the next bucket, a proxy for where the series goes.
        let next_start = bound(i + 1);
        let next_end = (((i + 2) as f64 * bucket_size).floor() as usize + 1).min(n);
        let next_len = next_end.saturating_sub(next_start).max(1) as f64;
        let (sum_x, sum_y) = points[next_start..next_end.max(next_start)]
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        let (avg_x, avg_y) = (sum_x / next_len, sum_y / next_len);

        let start = bound(i);
        let end = bound(i + 1);
        let pa = points[a];
        let mut max_area = -1.0f64;
        let mut next_a = start;

        for (j, p) in points.iter().enumerate().take(end).skip(start) {
            let area = ((pa.x - p.x) * (avg_y - p.y) - (avg_x - p.x) * (pa.y - p.y)).abs();
            if area > max_area {
                max_area = area;
                next_a = j;
            }
        }

        sampled.push(next_a);
        a = next_a;
    }

    sampled.push(n - 1);
    Some(sampled)
}
