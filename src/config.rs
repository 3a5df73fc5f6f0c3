//! Configuration management and validation.
//!
//! Holds every policy knob of the pipeline: input decoding and limits,
//! raw header aliases, value-cleaning policy, schedule strictness, the
//! derivation table (congestion thresholds and time-period ranges) and
//! snapshot writing options. All of it is serde-serializable so it can be
//! loaded from TOML and asserted on directly in tests.

use crate::constants::{self, SERVICE_DAY_END_MINUTES};
use crate::error::{CongestionError, Result};
use crate::models::{CongestionLevel, TimePeriod, TimeSlot};
use encoding_rs::Encoding;
use polars::prelude::ParquetCompression;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Supported compression algorithms for the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// Snappy compression - good balance of speed and compression
    Snappy,
    /// ZSTD compression - better compression ratio, slower
    Zstd,
    /// LZ4 compression - fastest, lower compression ratio
    Lz4,
    /// No compression
    Uncompressed,
}

impl CompressionAlgorithm {
    /// Convert to polars ParquetCompression type
    pub fn to_polars_compression(&self) -> ParquetCompression {
        match self {
            CompressionAlgorithm::Snappy => ParquetCompression::Snappy,
            CompressionAlgorithm::Zstd => ParquetCompression::Zstd(None),
            CompressionAlgorithm::Lz4 => ParquetCompression::Lz4Raw,
            CompressionAlgorithm::Uncompressed => ParquetCompression::Uncompressed,
        }
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = CongestionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "snappy" => Ok(Self::Snappy),
            "zstd" => Ok(Self::Zstd),
            "lz4" => Ok(Self::Lz4),
            "none" | "uncompressed" => Ok(Self::Uncompressed),
            other => Err(CongestionError::configuration(format!(
                "unknown compression '{}' (expected snappy, zstd, lz4 or none)",
                other
            ))),
        }
    }
}

/// Source decoding and size limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Legacy encoding used when the file is not valid UTF-8
    pub encoding: String,
    pub max_bytes: u64,
    pub max_rows: usize,
    pub max_columns: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            encoding: constants::DEFAULT_ENCODING.to_string(),
            max_bytes: constants::DEFAULT_MAX_INPUT_BYTES,
            max_rows: constants::DEFAULT_MAX_ROWS,
            max_columns: constants::DEFAULT_MAX_COLUMNS,
        }
    }
}

impl InputConfig {
    /// Resolve the configured label to an encoding.
    ///
    /// Windows code-page names are not WHATWG labels, so the common Korean
    /// aliases are mapped by hand before falling back to `for_label`.
    pub fn legacy_encoding(&self) -> Result<&'static Encoding> {
        let label = self.encoding.trim().to_ascii_lowercase();
        let encoding = match label.as_str() {
            "cp949" | "ms949" | "uhc" => Some(encoding_rs::EUC_KR),
            "utf-8-sig" | "utf8-sig" => Some(encoding_rs::UTF_8),
            other => Encoding::for_label(other.as_bytes()),
        };
        encoding.ok_or_else(|| {
            CongestionError::configuration(format!("unknown text encoding '{}'", self.encoding))
        })
    }
}

/// Raw header labels accepted for each identifying column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnAliases {
    pub day_type: Vec<String>,
    pub line: Vec<String>,
    pub station_sequence: Vec<String>,
    pub station_name: Vec<String>,
    pub direction: Vec<String>,
}

fn owned(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|s| s.to_string()).collect()
}

impl Default for ColumnAliases {
    fn default() -> Self {
        Self {
            day_type: owned(constants::aliases::DAY_TYPE),
            line: owned(constants::aliases::LINE),
            station_sequence: owned(constants::aliases::STATION_SEQUENCE),
            station_name: owned(constants::aliases::STATION_NAME),
            direction: owned(constants::aliases::DIRECTION),
        }
    }
}

impl ColumnAliases {
    /// Canonical name paired with its aliases, in identity-field order
    pub fn entries(&self) -> [(&'static str, &[String]); 5] {
        use crate::constants::columns;
        [
            (columns::DAY_TYPE, self.day_type.as_slice()),
            (columns::LINE, self.line.as_slice()),
            (columns::STATION_SEQUENCE, self.station_sequence.as_slice()),
            (columns::STATION_NAME, self.station_name.as_slice()),
            (columns::DIRECTION, self.direction.as_slice()),
        ]
    }
}

/// What to do with a cell that parses to a negative number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegativePolicy {
    /// Store 0.0 and report a validation violation
    Reject,
    /// Store 0.0 silently
    Clamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Tokens meaning "no reading", compared case-insensitively after trimming
    pub missing_markers: Vec<String>,
    pub negative_policy: NegativePolicy,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            missing_markers: owned(constants::DEFAULT_MISSING_MARKERS),
            negative_policy: NegativePolicy::Reject,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Require all 39 canonical slots to be present in the header row
    pub require_full_schedule: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            require_full_schedule: true,
        }
    }
}

/// Cut points of the congestion-level buckets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CongestionThresholds {
    /// Lowest value classified as medium
    pub medium_from: f64,
    /// Lowest value classified as high
    pub high_from: f64,
}

impl Default for CongestionThresholds {
    fn default() -> Self {
        Self {
            medium_from: constants::DEFAULT_MEDIUM_THRESHOLD,
            high_from: constants::DEFAULT_HIGH_THRESHOLD,
        }
    }
}

impl CongestionThresholds {
    /// Bucket a value. NaN lands in `Low`.
    pub fn level(&self, value: f64) -> CongestionLevel {
        if value >= self.high_from {
            CongestionLevel::High
        } else if value >= self.medium_from {
            CongestionLevel::Medium
        } else {
            CongestionLevel::Low
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.medium_from.is_finite() || !self.high_from.is_finite() {
            return Err(CongestionError::configuration(
                "congestion thresholds must be finite",
            ));
        }
        if self.medium_from < 0.0 || self.medium_from >= self.high_from {
            return Err(CongestionError::configuration(format!(
                "congestion thresholds must satisfy 0 <= medium ({}) < high ({})",
                self.medium_from, self.high_from
            )));
        }
        Ok(())
    }
}

/// Half-open minute range `[from_minute, to_minute)` assigned to one period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRange {
    pub period: TimePeriod,
    pub from_minute: u16,
    pub to_minute: u16,
}

impl PeriodRange {
    const fn hours(period: TimePeriod, from_hour: u16, to_hour: u16) -> Self {
        Self {
            period,
            from_minute: from_hour * 60,
            to_minute: to_hour * 60,
        }
    }

    pub fn contains(&self, minute: u16) -> bool {
        self.from_minute <= minute && minute < self.to_minute
    }
}

/// Partition of the service-day minute domain `[0, 25:00)` into named periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePeriodTable {
    pub ranges: Vec<PeriodRange>,
}

impl Default for TimePeriodTable {
    fn default() -> Self {
        use TimePeriod::*;
        Self {
            ranges: vec![
                PeriodRange::hours(LateNight, 0, 5),
                PeriodRange::hours(MorningCommute, 5, 9),
                PeriodRange::hours(LateMorning, 9, 12),
                PeriodRange::hours(Lunch, 12, 14),
                PeriodRange::hours(Afternoon, 14, 18),
                PeriodRange::hours(EveningCommute, 18, 21),
                PeriodRange::hours(Evening, 21, 24),
                PeriodRange::hours(LateNight, 24, 25),
            ],
        }
    }
}

impl TimePeriodTable {
    /// Period of a slot. Total once [`validate`](Self::validate) has passed;
    /// an uncovered minute falls back to `LateNight`.
    pub fn classify(&self, slot: TimeSlot) -> TimePeriod {
        let minute = slot.minutes();
        self.ranges
            .iter()
            .find(|range| range.contains(minute))
            .map(|range| range.period)
            .unwrap_or(TimePeriod::LateNight)
    }

    /// Ranges must be non-empty, non-overlapping and tile `[0, 25:00)` exactly
    pub fn validate(&self) -> Result<()> {
        let mut ranges = self.ranges.clone();
        ranges.sort_by_key(|r| r.from_minute);

        let mut cursor = 0u16;
        for range in &ranges {
            if range.from_minute >= range.to_minute {
                return Err(CongestionError::configuration(format!(
                    "time period {} has an empty range [{}, {})",
                    range.period.code(),
                    range.from_minute,
                    range.to_minute
                )));
            }
            if range.from_minute < cursor {
                return Err(CongestionError::configuration(format!(
                    "time period {} overlaps the previous range at minute {}",
                    range.period.code(),
                    range.from_minute
                )));
            }
            if range.from_minute > cursor {
                return Err(CongestionError::configuration(format!(
                    "minutes [{}, {}) are not covered by any time period",
                    cursor, range.from_minute
                )));
            }
            cursor = range.to_minute;
        }

        if cursor != SERVICE_DAY_END_MINUTES {
            return Err(CongestionError::configuration(format!(
                "time periods end at minute {} instead of {}",
                cursor, SERVICE_DAY_END_MINUTES
            )));
        }
        Ok(())
    }
}

/// Explicit policy table for the derived columns
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivationPolicy {
    pub thresholds: CongestionThresholds,
    pub time_periods: TimePeriodTable,
}

impl DerivationPolicy {
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        self.time_periods.validate()
    }
}

/// Snapshot writing options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub compression: CompressionAlgorithm,
    /// Order rows by line key, station, direction, day type and slot before writing
    pub sort_by_line_then_station: bool,
    /// Write column statistics for query pruning
    pub enable_statistics: bool,
    /// Rows per row group (None lets polars decide)
    pub row_group_size: Option<usize>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            compression: CompressionAlgorithm::Snappy,
            sort_by_line_then_station: true,
            enable_statistics: true,
            row_group_size: None,
        }
    }
}

/// Global configuration for a pipeline run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub input: InputConfig,
    pub columns: ColumnAliases,
    pub cleaning: CleaningConfig,
    pub schedule: ScheduleConfig,
    pub derivation: DerivationPolicy,
    pub snapshot: SnapshotConfig,
}

impl PipelineConfig {
    /// Load configuration from a TOML file; missing sections keep their defaults
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text).map_err(|e| match e {
            CongestionError::Configuration { message } => CongestionError::configuration(
                format!("{}: {}", path.display(), message),
            ),
            other => other,
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PipelineConfig =
            toml::from_str(text).map_err(|e| CongestionError::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the legacy source encoding
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.input.encoding = encoding.into();
        self
    }

    /// Set the snapshot compression
    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.snapshot.compression = compression;
        self
    }

    /// Set the negative-value policy
    pub fn with_negative_policy(mut self, policy: NegativePolicy) -> Self {
        self.cleaning.negative_policy = policy;
        self
    }

    /// Accept header rows that carry only part of the schedule
    pub fn with_partial_schedule(mut self) -> Self {
        self.schedule.require_full_schedule = false;
        self
    }

    /// Replace the derivation policy
    pub fn with_derivation(mut self, derivation: DerivationPolicy) -> Self {
        self.derivation = derivation;
        self
    }

    /// Set the input row limit
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.input.max_rows = max_rows;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.input.legacy_encoding()?;
        if self.input.max_rows == 0 || self.input.max_columns == 0 || self.input.max_bytes == 0 {
            return Err(CongestionError::configuration(
                "input limits must be greater than zero",
            ));
        }
        for (canonical, aliases) in self.columns.entries() {
            if aliases.iter().all(|a| a.trim().is_empty()) {
                return Err(CongestionError::configuration(format!(
                    "no header alias configured for column '{}'",
                    canonical
                )));
            }
        }
        if self.snapshot.row_group_size == Some(0) {
            return Err(CongestionError::configuration(
                "snapshot row_group_size must be greater than zero",
            ));
        }
        self.derivation.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_default_thresholds() {
        let thresholds = CongestionThresholds::default();
        assert_eq!(thresholds.medium_from, 80.0);
        assert_eq!(thresholds.high_from, 130.0);
        assert_eq!(thresholds.level(79.9), CongestionLevel::Low);
        assert_eq!(thresholds.level(80.0), CongestionLevel::Medium);
        assert_eq!(thresholds.level(129.9), CongestionLevel::Medium);
        assert_eq!(thresholds.level(130.0), CongestionLevel::High);
        assert_eq!(thresholds.level(f64::NAN), CongestionLevel::Low);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let thresholds = CongestionThresholds {
            medium_from: 130.0,
            high_from: 80.0,
        };
        assert!(thresholds.validate().is_err());

        let thresholds = CongestionThresholds {
            medium_from: 50.0,
            high_from: f64::INFINITY,
        };
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn test_default_period_table() {
        let table = TimePeriodTable::default();
        table.validate().unwrap();

        let at = |h, m| table.classify(TimeSlot::new(h, m).unwrap());
        assert_eq!(at(5, 30), TimePeriod::MorningCommute);
        assert_eq!(at(8, 30), TimePeriod::MorningCommute);
        assert_eq!(at(9, 0), TimePeriod::LateMorning);
        assert_eq!(at(12, 0), TimePeriod::Lunch);
        assert_eq!(at(14, 0), TimePeriod::Afternoon);
        assert_eq!(at(18, 0), TimePeriod::EveningCommute);
        assert_eq!(at(21, 30), TimePeriod::Evening);
        assert_eq!(at(24, 0), TimePeriod::LateNight);
        assert_eq!(at(24, 30), TimePeriod::LateNight);
        assert_eq!(at(3, 0), TimePeriod::LateNight);
    }

    #[test]
    fn test_period_table_gap_and_overlap_rejected() {
        let mut gap = TimePeriodTable::default();
        gap.ranges.retain(|r| r.period != TimePeriod::Lunch);
        assert!(gap.validate().is_err());

        let mut overlap = TimePeriodTable::default();
        overlap.ranges[1].to_minute += 30;
        assert!(overlap.validate().is_err());

        let mut short = TimePeriodTable::default();
        short.ranges.pop();
        assert!(short.validate().is_err());
    }

    #[test]
    fn test_encoding_labels() {
        let mut input = InputConfig::default();
        assert_eq!(input.legacy_encoding().unwrap(), encoding_rs::EUC_KR);

        input.encoding = "UTF-8".to_string();
        assert_eq!(input.legacy_encoding().unwrap(), encoding_rs::UTF_8);

        input.encoding = "klingon".to_string();
        assert!(input.legacy_encoding().is_err());
    }

    #[test]
    fn test_compression_parsing() {
        assert_eq!(
            "ZSTD".parse::<CompressionAlgorithm>().unwrap(),
            CompressionAlgorithm::Zstd
        );
        assert_eq!(
            "none".parse::<CompressionAlgorithm>().unwrap(),
            CompressionAlgorithm::Uncompressed
        );
        assert!("gzip9".parse::<CompressionAlgorithm>().is_err());
    }

    #[test]
    fn test_toml_overrides_keep_defaults() {
        let text = r#"
            [input]
            encoding = "euc-kr"

            [derivation.thresholds]
            medium_from = 50.0
            high_from = 70.0

            [snapshot]
            compression = "zstd"
        "#;
        let config = PipelineConfig::from_toml_str(text).unwrap();
        assert_eq!(config.input.encoding, "euc-kr");
        assert_eq!(config.input.max_rows, constants::DEFAULT_MAX_ROWS);
        assert_eq!(config.derivation.thresholds.medium_from, 50.0);
        assert_eq!(config.derivation.time_periods, TimePeriodTable::default());
        assert_eq!(config.snapshot.compression, CompressionAlgorithm::Zstd);
        assert!(config.snapshot.sort_by_line_then_station);
    }

    #[test]
    fn test_toml_with_bad_policy_rejected() {
        let text = r#"
            [derivation.thresholds]
            medium_from = 90.0
            high_from = 90.0
        "#;
        assert!(PipelineConfig::from_toml_str(text).is_err());
    }
}
