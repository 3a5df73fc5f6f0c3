//! Time-slot header parsing.
//!
//! The export labels its slot columns as `5시30분`, `6시00분`, ... `0시30분`.
//! These become canonical `HH:MM` slots, with the `0시` tail carried as hour
//! 24 so the service day orders correctly. Header problems are fatal: the
//! slot schema of the file must be exact.

use crate::constants::{CANONICAL_SLOT_COUNT, PAST_MIDNIGHT_HOUR};
use crate::error::{CongestionError, Result};
use crate::models::TimeSlot;
use crate::pipeline::normalize::TimeHeader;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

static KOREAN_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})\s*시\s*(?:(\d{1,2})\s*분)?$").expect("static time label pattern")
});

static CLOCK_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2}):(\d{2})$").expect("static clock pattern"));

/// A slot column of the source file after parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotColumn {
    /// Position in the raw table
    pub column: usize,
    /// Header as written in the file
    pub header: String,
    pub slot: TimeSlot,
}

/// Slot columns of the file in canonical schedule order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSchedule {
    pub columns: Vec<SlotColumn>,
}

impl SlotSchedule {
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn slots(&self) -> Vec<TimeSlot> {
        self.columns.iter().map(|c| c.slot).collect()
    }
}

/// Parse one header into a slot.
///
/// Accepts `<h>시<mm>분`, `<h>시` and `HH:MM`. Hour 0 becomes 24; hours above
/// 24 and minutes of 60 or more are rejected, as is any slot outside the
/// published schedule.
pub fn parse_time_label(header: &str) -> Result<TimeSlot> {
    let label = header.trim();
    let captures = KOREAN_LABEL
        .captures(label)
        .or_else(|| CLOCK_LABEL.captures(label))
        .ok_or_else(|| {
            CongestionError::time_header(header, "expected '<hour>시<minute>분' or 'HH:MM'")
        })?;

    let hour: u8 = captures[1]
        .parse()
        .map_err(|_| CongestionError::time_header(header, "hour is not a number"))?;
    let minute: u8 = match captures.get(2) {
        Some(m) => m
            .as_str()
            .parse()
            .map_err(|_| CongestionError::time_header(header, "minute is not a number"))?,
        None => 0,
    };

    let hour = if hour == 0 { PAST_MIDNIGHT_HOUR } else { hour };
    let slot = TimeSlot::new(hour, minute).ok_or_else(|| {
        CongestionError::time_header(header, format!("{}:{:02} is not a clock time", hour, minute))
    })?;

    if !slot.is_canonical() {
        return Err(CongestionError::time_header(
            header,
            format!("{} is not one of the published 30-minute slots", slot),
        ));
    }
    Ok(slot)
}

/// Parse every time header, reject duplicates and order the result by slot
pub fn build_schedule(headers: &[TimeHeader], require_full: bool) -> Result<SlotSchedule> {
    let mut seen: HashMap<TimeSlot, &str> = HashMap::new();
    let mut columns = Vec::with_capacity(headers.len());

    for header in headers {
        let slot = parse_time_label(&header.label)?;
        if let Some(first) = seen.insert(slot, &header.label) {
            return Err(CongestionError::DuplicateTimeSlot {
                slot: slot.to_string(),
                first: first.to_string(),
                second: header.label.clone(),
            });
        }
        columns.push(SlotColumn {
            column: header.column,
            header: header.label.clone(),
            slot,
        });
    }

    if columns.is_empty() {
        return Err(CongestionError::IncompleteSchedule {
            found: 0,
            expected: CANONICAL_SLOT_COUNT,
            missing: "all".to_string(),
        });
    }

    if require_full && columns.len() != CANONICAL_SLOT_COUNT {
        let missing: Vec<String> = TimeSlot::canonical_schedule()
            .into_iter()
            .filter(|slot| !seen.contains_key(slot))
            .map(|slot| slot.to_string())
            .collect();
        return Err(CongestionError::IncompleteSchedule {
            found: columns.len(),
            expected: CANONICAL_SLOT_COUNT,
            missing: missing.join(", "),
        });
    }

    columns.sort_by_key(|c| c.slot);
    debug!(
        "Parsed {} time-slot headers ({} .. {})",
        columns.len(),
        columns[0].slot,
        columns[columns.len() - 1].slot
    );
    Ok(SlotSchedule { columns })
}

/// Raw header label for a canonical slot, as the export writes it
pub fn raw_label(slot: TimeSlot) -> String {
    let hour = if slot.hour() == PAST_MIDNIGHT_HOUR {
        0
    } else {
        slot.hour()
    };
    format!("{}시{:02}분", hour, slot.minute())
}
