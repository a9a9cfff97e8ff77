//! Single changepoint detection.
//!
//! Every detector returns the index of the last point of the left segment,
//! or `None` when the sequence has no admissible breakpoint.

use crate::stats::{compute_mean, compute_ols_slope, compute_sen_slope, compute_var};
use serde::{Deserialize, Serialize};
use std::fmt;

pub trait Detector {
    /// Find the breakpoint of `vals` with at least `min_seg_len` points on each side.
    fn detect(&self, vals: &[f64], min_seg_len: usize) -> Option<usize>;
}

/// Changepoint detection method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Method {
    #[default]
    Pettitt,
    SeqTAvg,
    SeqTOls,
    SeqTSen,
}

impl Method {
    /// Resolve a method name, falling back to [`Method::Pettitt`] for unknown names.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "pettitt" | "" => Method::Pettitt,
            "seq-t-avg" => Method::SeqTAvg,
            "seq-t-ols" => Method::SeqTOls,
            "seq-t-sen" => Method::SeqTSen,
            other => {
                log::warn!("unknown method {other:?}, using pettitt");
                Method::Pettitt
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Method::Pettitt => "pettitt",
            Method::SeqTAvg => "seq-t-avg",
            Method::SeqTOls => "seq-t-ols",
            Method::SeqTSen => "seq-t-sen",
        }
    }

    pub fn detector(self) -> Box<dyn Detector + Send + Sync> {
        match self {
            Method::Pettitt => Box::new(Pettitt),
            Method::SeqTAvg => Box::new(Sequential(welch_stat)),
            Method::SeqTOls => Box::new(Sequential(|left: &[f64], right: &[f64]| {
                (compute_ols_slope(right) - compute_ols_slope(left)).abs()
            })),
            Method::SeqTSen => Box::new(Sequential(|left: &[f64], right: &[f64]| {
                (compute_sen_slope(right) - compute_sen_slope(left)).abs()
            })),
        }
    }

    /// Run the method's detector, rejecting indices outside the sequence.
    pub fn detect(self, vals: &[f64], min_seg_len: usize) -> Option<usize> {
        self.detector()
            .detect(vals, min_seg_len.max(1))
            .filter(|&idx| idx < vals.len())
    }
}

impl From<String> for Method {
    fn from(name: String) -> Self {
        Method::from_name(&name)
    }
}

impl From<Method> for String {
    fn from(method: Method) -> Self {
        method.name().to_string()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pettitt's rank-based test.
pub struct Pettitt;

impl Detector for Pettitt {
    fn detect(&self, vals: &[f64], min_seg_len: usize) -> Option<usize> {
        let n_vals = vals.len();
        if n_vals < 2 {
            return None;
        }

        // K(t) - K(t-1) is the sum of sign(x_t - x_j) over every j != t.
        let mut k_stat: i64 = 0;
        let mut k_max: i64 = 0;
        let mut change_idx = None;
        for (t, &x_t) in vals.iter().enumerate() {
            k_stat += vals
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != t)
                .map(|(_, &x_j)| sign(x_t - x_j))
                .sum::<i64>();
            if k_stat.abs() > k_max.abs() {
                k_max = k_stat;
                change_idx = Some(t);
            }
        }

        change_idx.filter(|&t| t + 1 >= min_seg_len && n_vals - t - 1 >= min_seg_len)
    }
}

fn sign(diff: f64) -> i64 {
    if diff > 0.0 {
        1
    } else if diff < 0.0 {
        -1
    } else {
        0
    }
}

/// Sequential scan maximizing a two-segment statistic.
pub struct Sequential<F>(pub F);

impl<F> Detector for Sequential<F>
where
    F: Fn(&[f64], &[f64]) -> f64,
{
    fn detect(&self, vals: &[f64], min_seg_len: usize) -> Option<usize> {
        let n_vals = vals.len();
        let min_seg_len = min_seg_len.max(1);
        if n_vals < 2 * min_seg_len {
            return None;
        }

        let mut best_stat = f64::NEG_INFINITY;
        let mut best_idx = None;
        for t in (min_seg_len - 1)..=(n_vals - min_seg_len - 1) {
            let stat = (self.0)(&vals[..=t], &vals[t + 1..]);
            if stat > best_stat {
                best_stat = stat;
                best_idx = Some(t);
            }
        }
        best_idx
    }
}

/// Welch two-sample statistic for a shift in mean.
fn welch_stat(left: &[f64], right: &[f64]) -> f64 {
    let se = (compute_var(left) / left.len() as f64 + compute_var(right) / right.len() as f64).sqrt();
    if se > 0.0 {
        (compute_mean(right) - compute_mean(left)).abs() / se
    } else {
        0.0
    }
}
