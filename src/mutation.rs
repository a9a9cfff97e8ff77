use crate::align::split_segments;
use crate::detect::Method;
use crate::series::TimeSeries;
use crate::stats::SegmentStats;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;

/// Detection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectParams {
    pub method: Method,
    pub min_seg_len: usize,
}

impl DetectParams {
    pub const MIN_SEG_LEN_RANGE: (usize, usize) = (1, 1000);

    /// Create parameters, clamping the minimum segment length into range.
    pub fn new(method: Method, min_seg_len: usize) -> Self {
        let (lo, hi) = Self::MIN_SEG_LEN_RANGE;
        Self {
            method,
            min_seg_len: min_seg_len.clamp(lo, hi),
        }
    }
}

impl Default for DetectParams {
    fn default() -> Self {
        Self::new(Method::default(), 5)
    }
}

/// Detected breakpoint of one lake and its segment statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationPoint {
    pub lake_id: String,
    pub year: i32,
    /// Breakpoint index in the raw series, or in the processed series when
    /// no raw series could be aligned.
    pub index: usize,
    pub pre_avg: f64,
    pub post_avg: f64,
    pub pre_ols: f64,
    pub post_ols: f64,
    pub pre_sen: f64,
    pub post_sen: f64,
    pub pre_var: f64,
    pub post_var: f64,
}

/// Detect the mutation point of one processed series.
///
/// Returns `None` when the method finds no breakpoint or no split is viable.
pub fn analyze_series(
    processed: &TimeSeries,
    raw: Option<&TimeSeries>,
    params: DetectParams,
) -> Option<MutationPoint> {
    let vals = processed.values();
    let idx = params.method.detect(&vals, params.min_seg_len)?;
    let year = processed.years()[idx];

    let segments = split_segments(processed, idx, raw)?;
    let pre = SegmentStats::from_values(&segments.pre);
    let post = SegmentStats::from_values(&segments.post);

    Some(MutationPoint {
        lake_id: processed.id.clone(),
        year,
        index: segments.index,
        pre_avg: pre.mean,
        post_avg: post.mean,
        pre_ols: pre.ols,
        post_ols: post.ols,
        pre_sen: pre.sen,
        post_sen: post.sen,
        pre_var: pre.var,
        post_var: post.var,
    })
}

/// Detect mutation points of a batch, matching raw series by id.
///
/// Series are analyzed in parallel; the output keeps the input order and
/// omits series without a breakpoint.
pub fn detect_mutations(
    processed: &[TimeSeries],
    raw: &[TimeSeries],
    params: DetectParams,
) -> Vec<MutationPoint> {
    let raw_by_id: HashMap<&str, &TimeSeries> =
        raw.iter().map(|series| (series.id.as_str(), series)).collect();

    processed
        .par_iter()
        .filter_map(|series| {
            let raw = raw_by_id.get(series.id.as_str()).copied();
            let found = analyze_series(series, raw, params);
            if found.is_none() {
                log::debug!("{:?}: no breakpoint", series.id);
            }
            found
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::{PreprocessParams, preprocess};
    use crate::series::{Point, year_start};
    use approx::assert_abs_diff_eq;

    fn make_series(id: &str, vals: &[f64]) -> TimeSeries {
        let points = vals
            .iter()
            .enumerate()
            .map(|(i, &v)| Point {
                t: year_start(1990 + i as i32).unwrap(),
                v,
            })
            .collect();
        TimeSeries {
            id: id.to_string(),
            label: id.to_string(),
            lat: f64::NAN,
            lon: f64::NAN,
            points,
        }
    }

    const STEP: [f64; 10] = [0.1, -0.2, 0.3, 0.0, -0.1, 0.2, 9.8, 10.1, 10.2, 9.9];

    #[test]
    fn step_is_detected_on_raw_series() {
        let series = make_series("a", &STEP);
        let params = DetectParams::new(Method::Pettitt, 2);
        let point = analyze_series(&series, None, params).unwrap();
        assert_eq!(point.lake_id, "a");
        assert_eq!(point.index, 5);
        assert_eq!(point.year, 1995);
        assert_abs_diff_eq!(point.pre_avg, 0.05, epsilon = 1e-12);
        assert_abs_diff_eq!(point.post_avg, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn raw_statistics_follow_the_aligned_index() {
        let raw = make_series("a", &STEP);
        let params = PreprocessParams {
            smooth_window: 3,
            diff_order: 0,
        };
        let processed = preprocess(&raw, params).series;
        let detect = DetectParams::new(Method::SeqTAvg, 2);
        let point = analyze_series(&processed, Some(&raw), detect).unwrap();

        let idx = Method::SeqTAvg.detect(&processed.values(), 2).unwrap();
        assert_eq!(point.index, idx);
        let pre = SegmentStats::from_values(&STEP[..=idx]);
        assert_eq!(point.pre_avg, pre.mean);
        assert_eq!(point.pre_var, pre.var);
    }

    #[test]
    fn batch_keeps_order_and_skips_flat_series() {
        let processed = vec![
            make_series("flat", &[1.0; 10]),
            make_series("b", &STEP),
            make_series("c", &STEP.map(|v| -v)),
        ];
        let points = detect_mutations(&processed, &[], DetectParams::new(Method::Pettitt, 2));
        let ids: Vec<_> = points.iter().map(|p| p.lake_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn min_segment_length_is_clamped() {
        assert_eq!(DetectParams::new(Method::Pettitt, 0).min_seg_len, 1);
        assert_eq!(DetectParams::new(Method::Pettitt, 5000).min_seg_len, 1000);
        assert_eq!(DetectParams::default().min_seg_len, 5);
    }

    #[test]
    fn mutation_point_serializes_camel_case() {
        let point = analyze_series(
            &make_series("a", &STEP),
            None,
            DetectParams::new(Method::Pettitt, 2),
        )
        .unwrap();
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["lakeId"], "a");
        assert_eq!(json["index"], 5);
        assert!(json.get("preSen").is_some());
        assert!(json.get("postVar").is_some());
    }
}
