/// Descriptive statistics of one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentStats {
    pub mean: f64,
    pub var: f64,
    pub ols: f64,
    pub sen: f64,
}

impl SegmentStats {
    /// Compute the statistics of a segment, indexed from 0.
    pub fn from_values(vals: &[f64]) -> Self {
        Self {
            mean: compute_mean(vals),
            var: compute_var(vals),
            ols: compute_ols_slope(vals),
            sen: compute_sen_slope(vals),
        }
    }
}

pub fn compute_mean(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return 0.0;
    }
    vals.iter().sum::<f64>() / vals.len() as f64
}

/// Sample variance (n - 1 denominator), 0 below two values.
pub fn compute_var(vals: &[f64]) -> f64 {
    let n_vals = vals.len();
    if n_vals < 2 {
        return 0.0;
    }
    let mean = compute_mean(vals);
    vals.iter().map(|&val| (val - mean).powi(2)).sum::<f64>() / (n_vals - 1) as f64
}

/// Least-squares slope of the values regressed on their index.
pub fn compute_ols_slope(vals: &[f64]) -> f64 {
    let n_vals = vals.len();
    if n_vals < 2 {
        return 0.0;
    }
    let mean_x = (n_vals - 1) as f64 / 2.0;
    let mean_y = compute_mean(vals);
    let (num, den) = vals
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, &val)| {
            let dx = i as f64 - mean_x;
            (num + dx * (val - mean_y), den + dx * dx)
        });
    if den == 0.0 { 0.0 } else { num / den }
}

/// Sen's slope: median of all pairwise slopes between values.
pub fn compute_sen_slope(vals: &[f64]) -> f64 {
    let n_vals = vals.len();
    let mut slopes = Vec::with_capacity(n_vals * n_vals.saturating_sub(1) / 2);
    for i in 0..n_vals {
        for j in (i + 1)..n_vals {
            slopes.push((vals[j] - vals[i]) / (j - i) as f64);
        }
    }
    compute_median(&mut slopes).unwrap_or(0.0)
}

/// Median of the values, sorting them in place. Even counts average the
/// two central values.
pub fn compute_median(vals: &mut [f64]) -> Option<f64> {
    if vals.is_empty() {
        return None;
    }
    vals.sort_by(f64::total_cmp);
    let mid = vals.len() / 2;
    if vals.len() % 2 == 1 {
        Some(vals[mid])
    } else {
        Some((vals[mid - 1] + vals[mid]) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn mean_and_sample_variance() {
        let vals = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(compute_mean(&vals), 5.0);
        assert_abs_diff_eq!(compute_var(&vals), 32.0 / 7.0, epsilon = 1e-12);
        assert_eq!(compute_var(&[3.0]), 0.0);
        assert_eq!(compute_mean(&[]), 0.0);
    }

    #[test]
    fn ols_slope_of_constant_is_zero() {
        assert_eq!(compute_ols_slope(&[4.0, 4.0, 4.0, 4.0]), 0.0);
        assert_eq!(compute_ols_slope(&[4.0]), 0.0);
        assert_abs_diff_eq!(compute_ols_slope(&[1.0, 3.0, 5.0, 7.0]), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn sen_slope_of_line_is_exact() {
        assert_eq!(compute_sen_slope(&[1.0, 3.0, 5.0]), 2.0);
        assert_eq!(compute_sen_slope(&[1.0]), 0.0);
    }

    #[test]
    fn sen_slope_ignores_outlier() {
        let vals = [0.0, 1.0, 2.0, 100.0, 4.0];
        let mut slopes = vec![];
        for i in 0..vals.len() {
            for j in (i + 1)..vals.len() {
                slopes.push((vals[j] - vals[i]) / (j - i) as f64);
            }
        }
        assert_eq!(slopes.len(), 10);
        assert_eq!(compute_sen_slope(&vals), compute_median(&mut slopes).unwrap());
        assert_eq!(compute_sen_slope(&vals), 1.0);
        assert!(compute_ols_slope(&vals) > 10.0);
    }

    #[test]
    fn median_of_even_count_averages_center() {
        assert_eq!(compute_median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(compute_median(&mut [5.0, 1.0, 3.0]), Some(3.0));
        assert_eq!(compute_median(&mut Vec::new()), None);
    }

    #[test]
    fn segment_stats_bundle() {
        let stats = SegmentStats::from_values(&[1.0, 3.0, 5.0]);
        assert_eq!(stats.mean, 3.0);
        assert_eq!(stats.var, 4.0);
        assert_abs_diff_eq!(stats.ols, 2.0, epsilon = 1e-12);
        assert_eq!(stats.sen, 2.0);
    }
}
