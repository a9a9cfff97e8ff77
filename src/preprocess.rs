use crate::series::{Point, TimeSeries};

/// Smoothing and differencing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessParams {
    pub smooth_window: usize,
    pub diff_order: usize,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            smooth_window: 1,
            diff_order: 1,
        }
    }
}

/// A transformed series and the number of leading raw points it lost.
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    pub series: TimeSeries,
    pub offset: usize,
}

/// Centered moving average clamped to the sequence bounds.
pub fn moving_avg(vals: &[f64], window: usize) -> Vec<f64> {
    let k = window.max(1);
    if k <= 1 {
        return vals.to_vec();
    }
    let half = (k - 1) / 2;
    (0..vals.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = vals.len().min(start + k);
            let slice = &vals[start..end];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Apply `order` passes of first differencing.
pub fn difference(vals: &[f64], order: usize) -> Vec<f64> {
    let mut out = vals.to_vec();
    for _ in 0..order {
        if out.is_empty() {
            break;
        }
        out = out.windows(2).map(|w| w[1] - w[0]).collect();
    }
    out
}

/// Smooth then difference a series.
///
/// The output keeps the trailing timestamps of the input, so the returned
/// offset is the number of leading raw points that no longer have a
/// counterpart.
pub fn preprocess(series: &TimeSeries, params: PreprocessParams) -> Processed {
    let vals = series.values();
    let smoothed = moving_avg(&vals, params.smooth_window);
    let processed = difference(&smoothed, params.diff_order);

    let offset = series.points.len().saturating_sub(processed.len());
    let points = series.points[offset..]
        .iter()
        .zip(processed)
        .map(|(p, v)| Point { t: p.t, v })
        .collect();

    Processed {
        series: series.with_points(points),
        offset,
    }
}
