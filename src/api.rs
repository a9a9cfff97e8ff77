//! Request bodies and response envelopes of the three pipeline stages.
//!
//! Bodies arrive as untyped JSON and are resolved into typed requests once,
//! here. Every response carries an `error` slot: `null` on success, or a
//! message with an empty result list when the whole request failed.

use crate::error::RequestError;
use crate::ingest::{Aggregation, ingest_table};
use crate::mutation::{DetectParams, MutationPoint, detect_mutations};
use crate::preprocess::{PreprocessParams, preprocess};
use crate::series::{TimeSeries, normalize};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub series: Vec<TimeSeries>,
    pub error: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessResponse {
    pub processed_series: Vec<TimeSeries>,
    pub error: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    pub mutation_points: Vec<MutationPoint>,
    pub error: Option<String>,
    pub detail: Option<Value>,
}

/// Body of a detect request.
///
/// The legacy shape is a bare array of processed series; the paired shape
/// also carries the raw series the statistics should be computed on. A
/// `rawSeries` that is not an array counts as empty.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DetectRequest {
    Legacy(Vec<Value>),
    #[serde(rename_all = "camelCase")]
    Paired {
        processed_series: Vec<Value>,
        #[serde(default)]
        raw_series: Option<Value>,
    },
}

impl DetectRequest {
    pub fn from_body(body: Value) -> Result<Self, RequestError> {
        serde_json::from_value(body).map_err(|_| {
            RequestError::Malformed(
                "body must be an array of processed series or an object with processedSeries/rawSeries"
                    .to_string(),
            )
        })
    }

    fn into_parts(self) -> (Vec<Value>, Vec<Value>) {
        match self {
            DetectRequest::Legacy(processed) => (processed, Vec::new()),
            DetectRequest::Paired {
                processed_series,
                raw_series,
            } => {
                let raw_series = match raw_series {
                    Some(Value::Array(raw_series)) => raw_series,
                    _ => Vec::new(),
                };
                (processed_series, raw_series)
            }
        }
    }
}

pub fn ingest(
    text: &str,
    id_column: &str,
    agg: Aggregation,
    clip_range: Option<(i32, i32)>,
) -> IngestResponse {
    match ingest_table(text, id_column, agg, clip_range) {
        Ok(series) => IngestResponse {
            series,
            error: None,
            detail: None,
        },
        Err(err) => IngestResponse {
            series: Vec::new(),
            error: Some(err.to_string()),
            detail: Some(describe(&err)),
        },
    }
}

/// Normalize and preprocess every candidate of a preprocess body.
///
/// # Errors
/// Returns [`RequestError::Malformed`] if the body is not an array.
pub fn preprocess_batch(
    body: Value,
    params: PreprocessParams,
) -> Result<Vec<TimeSeries>, RequestError> {
    let candidates = match body {
        Value::Array(candidates) => candidates,
        other => {
            return Err(RequestError::Malformed(format!(
                "body must be an array of series, got {}",
                kind(&other)
            )));
        }
    };

    let processed: Vec<TimeSeries> = candidates
        .par_iter()
        .filter_map(normalize)
        .filter_map(|series| {
            let processed = preprocess(&series, params);
            if processed.series.points.is_empty() {
                log::debug!("{:?}: nothing left after differencing", series.id);
                return None;
            }
            log::debug!("{:?}: offset by {} points", series.id, processed.offset);
            Some(processed.series)
        })
        .collect();
    log::info!(
        "preprocessed {} of {} series",
        processed.len(),
        candidates.len()
    );

    Ok(processed)
}

pub fn preprocess_request(body: Value, params: PreprocessParams) -> PreprocessResponse {
    match preprocess_batch(body, params) {
        Ok(processed_series) => PreprocessResponse {
            processed_series,
            error: None,
            detail: None,
        },
        Err(err) => PreprocessResponse {
            processed_series: Vec::new(),
            error: Some(err.to_string()),
            detail: Some(describe(&err)),
        },
    }
}

/// Detect mutation points for every processed series of a detect request.
///
/// # Errors
/// Returns a [`RequestError`] if the body has the wrong shape or no
/// processed series survives normalization.
pub fn detect_batch(
    request: DetectRequest,
    params: DetectParams,
) -> Result<Vec<MutationPoint>, RequestError> {
    let (processed, raw) = request.into_parts();

    let processed: Vec<TimeSeries> = processed.par_iter().filter_map(normalize).collect();
    if processed.is_empty() {
        return Err(RequestError::NoValidSeries);
    }
    let raw: Vec<TimeSeries> = raw.par_iter().filter_map(normalize).collect();

    let mutation_points = detect_mutations(&processed, &raw, params);
    log::info!(
        "found {} mutation points in {} series using {}",
        mutation_points.len(),
        processed.len(),
        params.method
    );

    Ok(mutation_points)
}

pub fn detect_request(body: Value, params: DetectParams) -> DetectResponse {
    match DetectRequest::from_body(body).and_then(|request| detect_batch(request, params)) {
        Ok(mutation_points) => DetectResponse {
            mutation_points,
            error: None,
            detail: Some(json!({
                "mutationMethod": params.method.name(),
                "minSegmentLength": params.min_seg_len,
            })),
        },
        Err(err) => DetectResponse {
            mutation_points: Vec::new(),
            error: Some(err.to_string()),
            detail: Some(Value::String(describe(&err))),
        },
    }
}

fn describe<E: std::fmt::Debug>(err: &E) -> String {
    format!("{err:?}")
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
