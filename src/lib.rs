//! Subway Congestion Library
//!
//! Converts the wide-format Seoul subway congestion export (one row per
//! line, station, day type and direction; one column per half-hour slot)
//! into a validated long-format table with one row per observation.
//!
//! This library provides tools for:
//! - Decoding UTF-8 or CP949 exports with input size limits
//! - Mapping raw Korean headers onto canonical column names
//! - Parsing `5시30분` style time headers into ordered time slots
//! - Cleaning and reshaping cell values with derived congestion features
//! - Validating the result and computing summary statistics
//! - Caching the table as an atomically written Parquet snapshot
//! - Dashboard-style queries over the snapshot

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod reader;
pub mod schema;
pub mod snapshot;
pub mod store;

// Re-export commonly used types
pub use config::{CompressionAlgorithm, NegativePolicy, PipelineConfig};
pub use error::{CongestionError, Result};
pub use models::{CongestionLevel, LongObservation, LongTable, TimePeriod, TimeSlot};
pub use pipeline::validate::{Statistics, ValidationReport};
pub use pipeline::{Pipeline, PipelineOutput};
pub use query::{CongestionQuery, DayFilter, QueryFilter};
pub use store::{CongestionStore, LoadOutcome};
