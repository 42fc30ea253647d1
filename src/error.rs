//! Error taxonomy for the boundary-facing parts of the core.
//!
//! Structural-invariant violations inside the pipeline (mismatched array
//! lengths, non-monotone time, an empty interval) are programmer bugs in the
//! caller and are reported by panicking with a precise message, not by these
//! types — see the invariant checks in [`crate::calculator`] and
//! [`crate::types`]. These enums cover the genuinely recoverable boundary:
//! reading and writing tabular files.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CsvLoadError {
    #[error("failed to open sample record file: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required column: {0}")]
    MissingColumn(&'static str),

    #[error("no data rows after header")]
    Empty,
}

#[derive(Debug, Error)]
pub enum CsvWriteError {
    #[error("failed to write metrics record file: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv write error: {0}")]
    Csv(#[from] csv::Error),
}
