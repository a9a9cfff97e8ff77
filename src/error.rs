//! Request-level errors.
//!
//! Anything here aborts a whole stage. Item-level problems (a bad cell, a
//! series without valid points, a series without a breakpoint) never become
//! errors; they are dropped where they occur.

use thiserror::Error;

/// Errors raised while reading the header of a wide table.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// The requested id column is not in the header row.
    #[error("table does not contain the id column {0:?}")]
    MissingIdColumn(String),

    /// No header besides the id column parses as a date.
    #[error("no time columns detected in the table header")]
    NoTimeColumns,

    /// Time columns exist but none of them falls into the requested period.
    #[error("no time columns fall into the {0} aggregation period")]
    NoTargetYears(String),

    /// The underlying CSV reader failed.
    #[error("failed to read table: {0}")]
    Csv(String),
}

/// Errors raised while interpreting a preprocess or detect request body.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    /// The body has the wrong shape.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// Normalization left nothing to work on.
    #[error("no valid processed time series provided")]
    NoValidSeries,
}
