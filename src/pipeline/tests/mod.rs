//! Scenario tests for the pipeline
//!
//! Fixtures are built as CSV text in the layout of the Seoul Metro export.

pub mod error_handling;

use crate::models::TimeSlot;
use crate::pipeline::time_label::raw_label;

pub(crate) const IDENTITY_HEADERS: [&str; 5] = ["요일구분", "호선", "역번호", "출발역", "상하구분"];

/// Full export header row: identifying columns then the 39 slot labels
pub(crate) fn export_headers() -> Vec<String> {
    IDENTITY_HEADERS
        .iter()
        .map(|h| h.to_string())
        .chain(TimeSlot::canonical_schedule().into_iter().map(raw_label))
        .collect()
}

/// Schedule index of an `HH:MM` slot
pub(crate) fn slot_index(slot: &str) -> usize {
    let slot: TimeSlot = slot.parse().unwrap();
    TimeSlot::canonical_schedule()
        .iter()
        .position(|s| *s == slot)
        .unwrap()
}

/// One data row: five identity cells then one cell per slot
pub(crate) fn data_row(identity: [&str; 5], cells: &[String]) -> String {
    identity
        .iter()
        .map(|c| c.to_string())
        .chain(cells.iter().cloned())
        .collect::<Vec<_>>()
        .join(",")
}

/// 39 cells of "0" with selected slots overridden
pub(crate) fn cells_with(overrides: &[(&str, &str)]) -> Vec<String> {
    let mut cells = vec!["0".to_string(); 39];
    for (slot, value) in overrides {
        cells[slot_index(slot)] = value.to_string();
    }
    cells
}

pub(crate) fn csv_text(headers: &[String], rows: &[String]) -> String {
    let mut text = headers.join(",");
    text.push('\n');
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    text
}

/// The two-row reference export: one silent row and one row peaking at 21:30
pub(crate) fn two_row_export() -> String {
    csv_text(
        &export_headers(),
        &[
            data_row(["평일", "1호선", "150", "서울역", "상선"], &cells_with(&[])),
            data_row(
                ["평일", "2호선", "201", "시청", "내선"],
                &cells_with(&[("21:30", "150.0")]),
            ),
        ],
    )
}
