//! Wide-to-long pivot.
//!
//! The long table is never built from copied rows: each long row is
//! addressed by a [`PivotKey`] into the wide arena, and the deriver
//! materializes observations from those keys.

use crate::models::{RowIdentity, TimeSlot, WideTable};
use tracing::debug;

/// Address of one cell of the wide arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PivotKey {
    pub row: usize,
    pub slot: usize,
}

/// One long row, borrowed from the wide table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotCell<'a> {
    pub key: PivotKey,
    pub identity: &'a RowIdentity,
    pub time_slot: TimeSlot,
    pub value: f64,
}

/// Expands a wide table into row-major pivot cells
#[derive(Debug, Clone, Copy)]
pub struct Reshaper<'a> {
    wide: &'a WideTable,
}

impl<'a> Reshaper<'a> {
    pub fn new(wide: &'a WideTable) -> Self {
        Self { wide }
    }

    /// Number of long rows the expansion yields
    pub fn expected_rows(&self) -> usize {
        self.wide.row_count() * self.wide.slot_count()
    }

    /// Keys grouped by wide row, then by slot in schedule order
    pub fn keys(self) -> impl Iterator<Item = PivotKey> + 'a {
        let slots = self.wide.slot_count();
        (0..self.wide.row_count())
            .flat_map(move |row| (0..slots).map(move |slot| PivotKey { row, slot }))
    }

    pub fn cell(&self, key: PivotKey) -> PivotCell<'a> {
        PivotCell {
            key,
            identity: &self.wide.identities[key.row],
            time_slot: self.wide.slots[key.slot],
            value: self.wide.value(key.row, key.slot),
        }
    }

    pub fn cells(self) -> impl Iterator<Item = PivotCell<'a>> + 'a {
        debug!(
            "Pivoting {} rows x {} slots into {} long rows",
            self.wide.row_count(),
            self.wide.slot_count(),
            self.expected_rows()
        );
        self.keys().map(move |key| self.cell(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(station_sequence: u32) -> RowIdentity {
        RowIdentity {
            day_type: "평일".to_string(),
            line: "2호선".to_string(),
            station_sequence,
            station_name: format!("역{}", station_sequence),
            direction: "내선".to_string(),
        }
    }

    fn fixture(rows: u32) -> WideTable {
        let slots = TimeSlot::canonical_schedule();
        let identities: Vec<RowIdentity> = (0..rows).map(|r| identity(200 + r)).collect();
        let values = (0..rows as usize * slots.len())
            .map(|i| if i < slots.len() { 0.0 } else { i as f64 })
            .collect();
        WideTable {
            slots,
            identities,
            values,
        }
    }

    #[test]
    fn test_three_rows_expand_to_rows_times_slots() {
        let wide = fixture(3);
        let reshaper = Reshaper::new(&wide);

        assert_eq!(reshaper.expected_rows(), 3 * 39);
        assert_eq!(reshaper.cells().count(), 3 * 39);
    }

    #[test]
    fn test_all_zero_rows_are_kept() {
        let wide = fixture(3);
        let zero_rows = Reshaper::new(&wide)
            .cells()
            .filter(|cell| cell.key.row == 0)
            .inspect(|cell| assert_eq!(cell.value, 0.0))
            .count();
        assert_eq!(zero_rows, 39);
    }

    #[test]
    fn test_order_is_row_then_schedule() {
        let wide = fixture(2);
        let cells: Vec<PivotCell> = Reshaper::new(&wide).cells().collect();

        assert_eq!(cells[0].key, PivotKey { row: 0, slot: 0 });
        assert_eq!(cells[0].time_slot.to_string(), "05:30");
        assert_eq!(cells[38].time_slot.to_string(), "24:30");
        assert_eq!(cells[39].key, PivotKey { row: 1, slot: 0 });
        assert_eq!(cells[39].identity.station_sequence, 201);
        assert!(cells.windows(2).all(|w| w[0].key < w[1].key));
    }

    #[test]
    fn test_values_address_the_arena() {
        let wide = fixture(2);
        let reshaper = Reshaper::new(&wide);
        let cell = reshaper.cell(PivotKey { row: 1, slot: 4 });
        assert_eq!(cell.value, wide.value(1, 4));
        assert_eq!(cell.value, (39 + 4) as f64);
    }

    #[test]
    fn test_empty_table() {
        let wide = WideTable {
            slots: TimeSlot::canonical_schedule(),
            ..Default::default()
        };
        assert_eq!(Reshaper::new(&wide).cells().count(), 0);
    }
}
