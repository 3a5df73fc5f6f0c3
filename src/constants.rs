//! Application constants for the congestion processor
//!
//! Canonical column names, default raw-header aliases, the time-slot
//! schedule, derivation defaults and input limits.

// =============================================================================
// Canonical Column Names
// =============================================================================

/// Column names of the normalized long table and the Parquet snapshot
pub mod columns {
    pub const DAY_TYPE: &str = "day_type";
    pub const LINE: &str = "line";
    pub const STATION_SEQUENCE: &str = "station_sequence";
    pub const STATION_NAME: &str = "station_name";
    pub const DIRECTION: &str = "direction";
    pub const TIME_SLOT: &str = "time_slot";
    pub const CONGESTION_VALUE: &str = "congestion_value";
    pub const CONGESTION_LEVEL: &str = "congestion_level";
    pub const TIME_PERIOD: &str = "time_period";
    pub const LINE_SORT_KEY: &str = "line_sort_key";

    /// Snapshot column order
    pub const ALL: &[&str] = &[
        LINE,
        STATION_SEQUENCE,
        STATION_NAME,
        DAY_TYPE,
        DIRECTION,
        TIME_SLOT,
        CONGESTION_VALUE,
        CONGESTION_LEVEL,
        TIME_PERIOD,
        LINE_SORT_KEY,
    ];
}

// =============================================================================
// Raw Header Aliases
// =============================================================================

/// Raw labels used by the Seoul Metro export for each identifying column
pub mod aliases {
    pub const DAY_TYPE: &[&str] = &["요일구분", "요일"];
    pub const LINE: &[&str] = &["호선"];
    pub const STATION_SEQUENCE: &[&str] = &["역번호"];
    pub const STATION_NAME: &[&str] = &["출발역", "역명"];
    pub const DIRECTION: &[&str] = &["상하구분", "방향"];
}

// =============================================================================
// Day Types
// =============================================================================

pub const DAY_WEEKDAY: &str = "평일";
pub const DAY_SATURDAY: &str = "토요일";
pub const DAY_SUNDAY: &str = "일요일";

// =============================================================================
// Time-Slot Schedule
// =============================================================================

/// Number of slots in the canonical schedule
pub const CANONICAL_SLOT_COUNT: usize = 39;

/// First slot of the service day (05:30), in minutes since 00:00
pub const FIRST_SLOT_MINUTES: u16 = 5 * 60 + 30;

/// Spacing between consecutive slots
pub const SLOT_STEP_MINUTES: u16 = 30;

/// Hour value the raw "0시" labels are carried as, so that the past-midnight
/// tail sorts after 23:30
pub const PAST_MIDNIGHT_HOUR: u8 = 24;

/// Exclusive upper bound of the service-day minute domain (25:00)
pub const SERVICE_DAY_END_MINUTES: u16 = 25 * 60;

// =============================================================================
// Value Cleaning
// =============================================================================

/// Placeholder tokens treated as "no reading" (compared case-insensitively)
pub const DEFAULT_MISSING_MARKERS: &[&str] = &["-", "NA", "N/A", "nan", "null"];

// =============================================================================
// Derivation Defaults
// =============================================================================

/// Values at or above this are "medium" (보통)
pub const DEFAULT_MEDIUM_THRESHOLD: f64 = 80.0;

/// Values at or above this are "high" (혼잡)
pub const DEFAULT_HIGH_THRESHOLD: f64 = 130.0;

/// Numeric line labels must be below this to keep their own number as key
pub const MAX_NUMERIC_LINE_KEY: i64 = 10_000;

/// First key handed to non-numeric line labels
pub const NON_NUMERIC_LINE_KEY_BASE: i64 = MAX_NUMERIC_LINE_KEY;

// =============================================================================
// Input Limits
// =============================================================================

/// Default legacy encoding of the source export
pub const DEFAULT_ENCODING: &str = "cp949";

pub const DEFAULT_MAX_INPUT_BYTES: u64 = 256 * 1024 * 1024;
pub const DEFAULT_MAX_ROWS: usize = 200_000;
pub const DEFAULT_MAX_COLUMNS: usize = 128;

// =============================================================================
// Snapshot
// =============================================================================

/// File name used when no output path is given
pub const DEFAULT_SNAPSHOT_FILE_NAME: &str = "subway_congestion.parquet";

/// Directory under the user data directory holding default snapshots
pub const DEFAULT_DATA_DIR_NAME: &str = "subway-congestion";

/// Suffix appended to the snapshot path for the JSON manifest
pub const MANIFEST_SUFFIX: &str = "manifest.json";

/// Manifest layout version, bumped when the snapshot schema changes
pub const MANIFEST_VERSION: u32 = 1;
