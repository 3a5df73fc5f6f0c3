//! Error handling for congestion processing.
//!
//! Everything in here is fatal: structural problems with the source file,
//! I/O and snapshot failures, bad configuration. Per-cell parse problems and
//! table-level validation findings are not errors; they are collected in the
//! [`ValidationReport`](crate::pipeline::validate::ValidationReport).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CongestionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Manifest serialization error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Could not decode {path} as UTF-8 or {encoding}")]
    Encoding { path: PathBuf, encoding: String },

    #[error("Input exceeds the {what} limit: {actual} > {max}")]
    InputTooLarge {
        what: &'static str,
        actual: u64,
        max: u64,
    },

    #[error("Required column '{canonical}' not found in header row [{headers}]")]
    MissingColumn { canonical: String, headers: String },

    #[error("Column '{canonical}' matches more than one header: [{matches}]")]
    AmbiguousColumn { canonical: String, matches: String },

    #[error("Malformed time-slot header '{header}': {reason}")]
    TimeHeader { header: String, reason: String },

    #[error("Time slot {slot} appears twice (headers '{first}' and '{second}')")]
    DuplicateTimeSlot {
        slot: String,
        first: String,
        second: String,
    },

    #[error("Time-slot schedule incomplete: {found} of {expected} slots present, missing [{missing}]")]
    IncompleteSchedule {
        found: usize,
        expected: usize,
        missing: String,
    },

    #[error("Malformed {column} in data row {row}: '{value}'")]
    MalformedIdentifier {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Snapshot error at {path}: {reason}")]
    Snapshot { path: PathBuf, reason: String },

    #[error("Query error: {message}")]
    Query { message: String },
}

impl CongestionError {
    /// Whether this error describes a problem with the shape of the source
    /// file rather than the environment.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            CongestionError::Csv(_)
                | CongestionError::SourceNotFound { .. }
                | CongestionError::Encoding { .. }
                | CongestionError::InputTooLarge { .. }
                | CongestionError::MissingColumn { .. }
                | CongestionError::AmbiguousColumn { .. }
                | CongestionError::TimeHeader { .. }
                | CongestionError::DuplicateTimeSlot { .. }
                | CongestionError::IncompleteSchedule { .. }
                | CongestionError::MalformedIdentifier { .. }
        )
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn time_header(header: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TimeHeader {
            header: header.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    pub(crate) fn snapshot(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Snapshot {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CongestionError>;
