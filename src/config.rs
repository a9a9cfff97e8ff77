use crate::detect::Method;
use crate::ingest::Aggregation;
use crate::mutation::DetectParams;
use crate::preprocess::PreprocessParams;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Pipeline configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub ingest: IngestConfig,
    pub preprocess: PreprocessConfig,
    pub detect: DetectConfig,
}

/// Table ingestion parameters.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Header of the column holding the lake id.
    pub id_column: String,
    /// Aggregation of the date columns within a target year.
    pub agg: Aggregation,
    /// Inclusive range of years to keep.
    pub clip_range: Option<(i32, i32)>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            id_column: "lake_id".to_string(),
            agg: Aggregation::default(),
            clip_range: None,
        }
    }
}

/// Smoothing and differencing parameters.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreprocessConfig {
    /// Length of the moving-average window.
    pub smooth_window: usize,
    /// Number of differencing passes.
    pub diff_order: usize,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        let params = PreprocessParams::default();
        Self {
            smooth_window: params.smooth_window,
            diff_order: params.diff_order,
        }
    }
}

/// Changepoint detection parameters.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectConfig {
    /// Detection method.
    pub method: Method,
    /// Minimum number of points on each side of a breakpoint.
    pub min_seg_len: usize,
}

impl Default for DetectConfig {
    fn default() -> Self {
        let params = DetectParams::default();
        Self {
            method: params.method,
            min_seg_len: params.min_seg_len,
        }
    }
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded; missing sections and fields take their
    /// defaults. Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.ingest.id_column.trim().is_empty() {
            bail!("id column must not be empty");
        }
        if let Some((start, end)) = self.ingest.clip_range {
            check_num(end, start..).context("invalid clip range")?;
        }

        check_num(self.preprocess.smooth_window, 1..=1000).context("invalid smoothing window")?;
        check_num(self.preprocess.diff_order, 0..=100).context("invalid differencing order")?;

        Ok(())
    }

    pub fn preprocess_params(&self) -> PreprocessParams {
        PreprocessParams {
            smooth_window: self.preprocess.smooth_window,
            diff_order: self.preprocess.diff_order,
        }
    }

    /// Detection parameters, with the minimum segment length clamped into range.
    pub fn detect_params(&self) -> DetectParams {
        DetectParams::new(self.detect.method, self.detect.min_seg_len)
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}
