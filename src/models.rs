//! Core data structures for congestion processing.
//!
//! Defines the raw and wide table arenas, the time-slot type, the derived
//! categorical enums and the long-format observation that every later
//! consumer works with.

use crate::constants::{
    CANONICAL_SLOT_COUNT, FIRST_SLOT_MINUTES, PAST_MIDNIGHT_HOUR, SLOT_STEP_MINUTES,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A clock-time slot label, stored as minutes since 00:00 of the service day.
///
/// Past-midnight slots keep hours of 24 (`24:00`, `24:30`) so that ordering
/// by minutes follows the service day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSlot {
    minutes: u16,
}

impl TimeSlot {
    /// Build a slot from an hour in `0..=24` and a minute in `0..60`
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour > PAST_MIDNIGHT_HOUR || minute >= 60 {
            return None;
        }
        Some(Self {
            minutes: u16::from(hour) * 60 + u16::from(minute),
        })
    }

    pub fn hour(&self) -> u8 {
        (self.minutes / 60) as u8
    }

    pub fn minute(&self) -> u8 {
        (self.minutes % 60) as u8
    }

    pub fn minutes(&self) -> u16 {
        self.minutes
    }

    /// Whether this slot belongs to the 39-slot published schedule
    pub fn is_canonical(&self) -> bool {
        let last = FIRST_SLOT_MINUTES + (CANONICAL_SLOT_COUNT as u16 - 1) * SLOT_STEP_MINUTES;
        self.minutes >= FIRST_SLOT_MINUTES
            && self.minutes <= last
            && (self.minutes - FIRST_SLOT_MINUTES) % SLOT_STEP_MINUTES == 0
    }

    /// The 39 published slots in schedule order: 05:30, 06:00, ... 24:30
    pub fn canonical_schedule() -> Vec<TimeSlot> {
        (0..CANONICAL_SLOT_COUNT as u16)
            .map(|i| TimeSlot {
                minutes: FIRST_SLOT_MINUTES + i * SLOT_STEP_MINUTES,
            })
            .collect()
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeSlot {
    type Err = String;

    /// Parse the canonical `HH:MM` form
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hour, minute) = s
            .split_once(':')
            .ok_or_else(|| format!("'{}' is not in HH:MM form", s))?;
        let hour: u8 = hour
            .trim()
            .parse()
            .map_err(|_| format!("invalid hour in '{}'", s))?;
        let minute: u8 = minute
            .trim()
            .parse()
            .map_err(|_| format!("invalid minute in '{}'", s))?;
        TimeSlot::new(hour, minute).ok_or_else(|| format!("'{}' is outside 00:00-24:59", s))
    }
}

impl TryFrom<String> for TimeSlot {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeSlot> for String {
    fn from(slot: TimeSlot) -> Self {
        slot.to_string()
    }
}

/// Congestion bucket, ordered low < medium < high
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CongestionLevel {
    Low,
    Medium,
    High,
}

impl CongestionLevel {
    pub const ALL: [CongestionLevel; 3] = [Self::Low, Self::Medium, Self::High];

    /// Code stored in the snapshot
    pub fn code(&self) -> &'static str {
        match self {
            CongestionLevel::Low => "low",
            CongestionLevel::Medium => "medium",
            CongestionLevel::High => "high",
        }
    }

    /// Label shown to riders
    pub fn label(&self) -> &'static str {
        match self {
            CongestionLevel::Low => "여유",
            CongestionLevel::Medium => "보통",
            CongestionLevel::High => "혼잡",
        }
    }
}

impl FromStr for CongestionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.code() == s || level.label() == s)
            .ok_or_else(|| format!("unknown congestion level '{}'", s))
    }
}

/// Named time-of-day bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePeriod {
    MorningCommute,
    LateMorning,
    Lunch,
    Afternoon,
    EveningCommute,
    Evening,
    LateNight,
}

impl TimePeriod {
    pub const ALL: [TimePeriod; 7] = [
        Self::MorningCommute,
        Self::LateMorning,
        Self::Lunch,
        Self::Afternoon,
        Self::EveningCommute,
        Self::Evening,
        Self::LateNight,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            TimePeriod::MorningCommute => "morning_commute",
            TimePeriod::LateMorning => "late_morning",
            TimePeriod::Lunch => "lunch",
            TimePeriod::Afternoon => "afternoon",
            TimePeriod::EveningCommute => "evening_commute",
            TimePeriod::Evening => "evening",
            TimePeriod::LateNight => "late_night",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimePeriod::MorningCommute => "출근시간",
            TimePeriod::LateMorning => "오전",
            TimePeriod::Lunch => "점심시간",
            TimePeriod::Afternoon => "오후",
            TimePeriod::EveningCommute => "퇴근시간",
            TimePeriod::Evening => "저녁",
            TimePeriod::LateNight => "심야",
        }
    }
}

impl FromStr for TimePeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|period| period.code() == s || period.label() == s)
            .ok_or_else(|| format!("unknown time period '{}'", s))
    }
}

/// Decoded CSV contents: the header row plus a row-major cell arena
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    cells: Vec<Option<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            cells: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn row_count(&self) -> usize {
        if self.headers.is_empty() {
            0
        } else {
            self.cells.len() / self.headers.len()
        }
    }

    /// Append one record, padding or truncating to the header width
    pub fn push_row<I>(&mut self, cells: I)
    where
        I: IntoIterator<Item = Option<String>>,
    {
        let width = self.width();
        let start = self.cells.len();
        self.cells.extend(cells.into_iter().take(width));
        self.cells.resize(start + width, None);
    }

    pub fn row(&self, index: usize) -> &[Option<String>] {
        let width = self.width();
        &self.cells[index * width..(index + 1) * width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Option<String>]> {
        (0..self.row_count()).map(move |i| self.row(i))
    }
}

/// Identifying fields of one wide row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowIdentity {
    pub day_type: String,
    pub line: String,
    pub station_sequence: u32,
    pub station_name: String,
    pub direction: String,
}

impl RowIdentity {
    /// Key of this row's observation at `slot`
    pub fn key_at(&self, slot: TimeSlot) -> ObservationKey {
        ObservationKey {
            line: self.line.clone(),
            station_sequence: self.station_sequence,
            station_name: self.station_name.clone(),
            direction: self.direction.clone(),
            day_type: self.day_type.clone(),
            time_slot: slot,
        }
    }
}

/// Cleaned wide table: one identity per row and a flat `rows x slots` value arena.
///
/// `slots` is in canonical schedule order; `values[row * slots.len() + slot]`.
#[derive(Debug, Clone, Default)]
pub struct WideTable {
    pub slots: Vec<TimeSlot>,
    pub identities: Vec<RowIdentity>,
    pub values: Vec<f64>,
}

impl WideTable {
    pub fn row_count(&self) -> usize {
        self.identities.len()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn value(&self, row: usize, slot: usize) -> f64 {
        self.values[row * self.slots.len() + slot]
    }

    pub fn row_values(&self, row: usize) -> &[f64] {
        let n = self.slots.len();
        &self.values[row * n..(row + 1) * n]
    }
}

/// Uniqueness key of a long observation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObservationKey {
    pub line: String,
    pub station_sequence: u32,
    pub station_name: String,
    pub direction: String,
    pub day_type: String,
    pub time_slot: TimeSlot,
}

impl fmt::Display for ObservationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} {} / {} / {} @ {}",
            self.line,
            self.station_sequence,
            self.station_name,
            self.direction,
            self.day_type,
            self.time_slot
        )
    }
}

/// One station/time-slot reading in the long table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongObservation {
    pub line: String,
    pub station_sequence: u32,
    pub station_name: String,
    pub day_type: String,
    pub direction: String,
    pub time_slot: TimeSlot,
    pub congestion_value: f64,
    pub congestion_level: CongestionLevel,
    pub time_period: TimePeriod,
    pub line_sort_key: i64,
}

impl LongObservation {
    pub fn key(&self) -> ObservationKey {
        ObservationKey {
            line: self.line.clone(),
            station_sequence: self.station_sequence,
            station_name: self.station_name.clone(),
            direction: self.direction.clone(),
            day_type: self.day_type.clone(),
            time_slot: self.time_slot,
        }
    }
}

/// Final long-format table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LongTable {
    pub observations: Vec<LongObservation>,
}

impl LongTable {
    pub fn new(observations: Vec<LongObservation>) -> Self {
        Self { observations }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LongObservation> {
        self.observations.iter()
    }

    /// Copy ordered by (line_sort_key, station_sequence, direction, day_type, time_slot)
    pub fn sorted_by_line(&self) -> LongTable {
        let mut observations = self.observations.clone();
        observations.sort_by(|a, b| {
            a.line_sort_key
                .cmp(&b.line_sort_key)
                .then_with(|| a.station_sequence.cmp(&b.station_sequence))
                .then_with(|| a.direction.cmp(&b.direction))
                .then_with(|| a.day_type.cmp(&b.day_type))
                .then_with(|| a.time_slot.cmp(&b.time_slot))
        });
        LongTable { observations }
    }
}

impl<'a> IntoIterator for &'a LongTable {
    type Item = &'a LongObservation;
    type IntoIter = std::slice::Iter<'a, LongObservation>;

    fn into_iter(self) -> Self::IntoIter {
        self.observations.iter()
    }
}
