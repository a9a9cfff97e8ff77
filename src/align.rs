//! Realignment of processed breakpoints onto raw observations.
//!
//! Smoothing and differencing shift a series against its raw timeline, so a
//! breakpoint found on processed data is mapped back by timestamp before the
//! segment statistics are computed.

use crate::series::{Point, TimeSeries};

/// Pre/post values around a breakpoint and the index they were split at.
#[derive(Debug, Clone, PartialEq)]
pub struct Segments {
    pub index: usize,
    pub pre: Vec<f64>,
    pub post: Vec<f64>,
}

impl Segments {
    /// Split `vals` after `idx`, if both sides are non-empty.
    fn split(vals: &[f64], idx: usize) -> Option<Self> {
        if idx + 1 >= vals.len() {
            return None;
        }
        Some(Self {
            index: idx,
            pre: vals[..=idx].to_vec(),
            post: vals[idx + 1..].to_vec(),
        })
    }
}

/// Map the processed point at `idx` to an index into `raw`.
///
/// Tries, in order: an exact timestamp match, the offset between the first
/// processed timestamp and its raw match, and the nearest raw timestamp.
/// The nearest match has no distance cutoff.
pub fn align_index(processed: &[Point], idx: usize, raw: &[Point]) -> Option<usize> {
    let t = processed.get(idx)?.t;

    if let Some(raw_idx) = raw.iter().position(|p| p.t == t) {
        return Some(raw_idx);
    }

    let first_t = processed.first()?.t;
    if let Some(offset) = raw.iter().position(|p| p.t == first_t) {
        return Some(offset + idx);
    }

    raw.iter()
        .enumerate()
        .min_by_key(|(_, p)| (p.t - t).num_milliseconds().unsigned_abs())
        .map(|(raw_idx, _)| raw_idx)
}

/// Split around a processed breakpoint, on raw values when they line up.
///
/// Falls back to the processed values when no raw series is given or the
/// mapped raw index leaves either side empty. Returns `None` when the
/// processed split is not viable either.
pub fn split_segments(
    processed: &TimeSeries,
    idx: usize,
    raw: Option<&TimeSeries>,
) -> Option<Segments> {
    let raw_split = raw
        .filter(|raw| !raw.points.is_empty())
        .and_then(|raw| {
            let raw_idx = align_index(&processed.points, idx, &raw.points)?;
            Segments::split(&raw.values(), raw_idx)
        });
    if raw_split.is_some() {
        return raw_split;
    }

    log::debug!("{:?}: using processed values around {idx}", processed.id);
    Segments::split(&processed.values(), idx)
}
