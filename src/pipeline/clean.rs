//! Occupancy value cleaning.
//!
//! Turns raw cell text into non-negative floats. Missing readings become 0.0
//! without comment; malformed tokens become 0.0 and are reported as parse
//! issues; negative readings become 0.0 and are reported as violations
//! unless the configured policy is to clamp. No row is ever dropped.

use crate::config::{CleaningConfig, NegativePolicy};
use crate::error::{CongestionError, Result};
use crate::models::{RowIdentity, WideTable};
use crate::pipeline::normalize::NormalizedTable;
use crate::pipeline::time_label::SlotSchedule;
use crate::pipeline::validate::{ParseIssue, ValidationIssue};
use tracing::{debug, warn};

/// Interpretation of one raw cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellValue {
    Reading(f64),
    Missing,
    Malformed,
    Negative(f64),
}

impl CellValue {
    /// Value stored in the wide table
    pub fn stored(&self) -> f64 {
        match self {
            CellValue::Reading(v) => *v,
            CellValue::Missing | CellValue::Malformed | CellValue::Negative(_) => 0.0,
        }
    }
}

/// Wide table plus the findings collected while cleaning it
#[derive(Debug, Clone)]
pub struct CleanedTable {
    pub wide: WideTable,
    pub parse_issues: Vec<ParseIssue>,
    pub violations: Vec<ValidationIssue>,
}

#[derive(Debug, Clone)]
pub struct ValueCleaner {
    missing_markers: Vec<String>,
    negative_policy: NegativePolicy,
}

impl ValueCleaner {
    pub fn new(config: &CleaningConfig) -> Self {
        Self {
            missing_markers: config
                .missing_markers
                .iter()
                .map(|m| m.trim().to_string())
                .collect(),
            negative_policy: config.negative_policy,
        }
    }

    /// Classify a raw cell.
    ///
    /// Whitespace is trimmed and one trailing `%` is dropped, so `" 83.5% "`
    /// reads as 83.5. Non-finite parses count as malformed.
    pub fn classify(&self, raw: Option<&str>) -> CellValue {
        let text = raw.map(str::trim).unwrap_or("");
        if text.is_empty()
            || self
                .missing_markers
                .iter()
                .any(|marker| marker.eq_ignore_ascii_case(text))
        {
            return CellValue::Missing;
        }

        let number = text
            .strip_suffix('%')
            .map(str::trim_end)
            .unwrap_or(text);

        match number.parse::<f64>() {
            Ok(v) if !v.is_finite() => CellValue::Malformed,
            Ok(v) if v < 0.0 => CellValue::Negative(v),
            // folds -0.0 into 0.0
            Ok(v) if v == 0.0 => CellValue::Reading(0.0),
            Ok(v) => CellValue::Reading(v),
            Err(_) => CellValue::Malformed,
        }
    }

    /// Stored value for a raw cell
    pub fn clean(&self, raw: &str) -> f64 {
        self.classify(Some(raw)).stored()
    }

    /// Clean every slot cell of the normalized table into a wide arena
    pub fn clean_table(
        &self,
        table: &NormalizedTable,
        schedule: &SlotSchedule,
    ) -> Result<CleanedTable> {
        let rows = table.raw.row_count();
        let mut wide = WideTable {
            slots: schedule.slots(),
            identities: Vec::with_capacity(rows),
            values: Vec::with_capacity(rows * schedule.len()),
        };
        let mut parse_issues = Vec::new();
        let mut violations = Vec::new();

        for (index, cells) in table.raw.rows().enumerate() {
            let row = index + 1;
            let identity = identity(table, cells, row)?;

            for column in &schedule.columns {
                let raw = cells[column.column].as_deref();
                let value = self.classify(raw);
                match value {
                    CellValue::Malformed => parse_issues.push(ParseIssue::MalformedCell {
                        row,
                        time_slot: column.slot,
                        raw: raw.unwrap_or_default().to_string(),
                    }),
                    CellValue::Negative(v) => match self.negative_policy {
                        NegativePolicy::Reject => violations.push(ValidationIssue::NegativeValue {
                            key: identity.key_at(column.slot),
                            value: v,
                        }),
                        NegativePolicy::Clamp => {
                            debug!("Clamped {} to 0.0 at row {} slot {}", v, row, column.slot)
                        }
                    },
                    CellValue::Reading(_) | CellValue::Missing => {}
                }
                wide.values.push(value.stored());
            }
            wide.identities.push(identity);
        }

        if !parse_issues.is_empty() {
            warn!(
                "{} malformed cells replaced with 0.0",
                parse_issues.len()
            );
        }
        if !violations.is_empty() {
            warn!("{} negative cells rejected", violations.len());
        }
        debug!(
            "Cleaned {} rows x {} slots",
            wide.row_count(),
            wide.slot_count()
        );

        Ok(CleanedTable {
            wide,
            parse_issues,
            violations,
        })
    }
}

fn identity(table: &NormalizedTable, cells: &[Option<String>], row: usize) -> Result<RowIdentity> {
    let text = |column: usize| cells[column].as_deref().unwrap_or_default().trim().to_string();
    let ids = &table.identity;

    let sequence_text = text(ids.station_sequence);
    let station_sequence =
        sequence_text
            .parse::<u32>()
            .map_err(|_| CongestionError::MalformedIdentifier {
                row,
                column: crate::constants::columns::STATION_SEQUENCE,
                value: sequence_text.clone(),
            })?;

    Ok(RowIdentity {
        day_type: text(ids.day_type),
        line: text(ids.line),
        station_sequence,
        station_name: text(ids.station_name),
        direction: text(ids.direction),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnAliases;
    use crate::models::{RawTable, TimeSlot};
    use crate::pipeline::normalize::ColumnNormalizer;
    use crate::pipeline::time_label::build_schedule;

    fn cleaner() -> ValueCleaner {
        ValueCleaner::new(&CleaningConfig::default())
    }

    #[test]
    fn test_clean_basic_values() {
        let cleaner = cleaner();
        assert_eq!(cleaner.clean(""), 0.0);
        assert_eq!(cleaner.clean("   "), 0.0);
        assert_eq!(cleaner.clean(" 83.5 "), 83.5);
        assert_eq!(cleaner.clean("150"), 150.0);
        assert_eq!(cleaner.clean("0"), 0.0);
    }

    #[test]
    fn test_percent_suffix_is_stripped() {
        let cleaner = cleaner();
        assert_eq!(cleaner.clean("83.5%"), 83.5);
        assert_eq!(cleaner.classify(Some(" 83.5 % ")), CellValue::Reading(83.5));
        assert_eq!(cleaner.classify(Some("83.5%%")), CellValue::Malformed);
    }

    #[test]
    fn test_missing_markers() {
        let cleaner = cleaner();
        for marker in ["-", "NA", "n/a", "NaN", "null", "  "] {
            assert_eq!(cleaner.classify(Some(marker)), CellValue::Missing, "{}", marker);
        }
        assert_eq!(cleaner.classify(None), CellValue::Missing);
    }

    #[test]
    fn test_malformed_tokens() {
        let cleaner = cleaner();
        for token in ["abc", "12,5", "inf", "1.2.3"] {
            assert_eq!(cleaner.classify(Some(token)), CellValue::Malformed, "{}", token);
            assert_eq!(cleaner.clean(token), 0.0);
        }
    }

    #[test]
    fn test_negative_values_rejected() {
        let cleaner = cleaner();
        assert_eq!(cleaner.classify(Some("-3.5")), CellValue::Negative(-3.5));
        assert_eq!(cleaner.clean("-3.5"), 0.0);
        assert_eq!(cleaner.classify(Some("-0")), CellValue::Reading(0.0));
        assert!(cleaner.clean("-0").is_sign_positive());
    }

    #[test]
    fn test_idempotent_on_clean_values() {
        let cleaner = cleaner();
        for raw in ["", " 83.5 ", "150", "0.1", "99.99999", "-7", "junk", "42%"] {
            let once = cleaner.clean(raw);
            let twice = cleaner.clean(&once.to_string());
            assert_eq!(once, twice, "re-cleaning {} changed the value", raw);
        }
    }

    fn normalized(rows: &[&[&str]]) -> (NormalizedTable, SlotSchedule) {
        let headers = ["요일구분", "호선", "역번호", "출발역", "상하구분", "6시00분", "5시30분"];
        let mut raw = RawTable::new(headers.iter().map(|h| h.to_string()).collect());
        for row in rows {
            raw.push_row(row.iter().map(|c| (!c.is_empty()).then(|| c.to_string())));
        }
        let table = ColumnNormalizer::new(ColumnAliases::default())
            .normalize(raw)
            .unwrap();
        let schedule = build_schedule(&table.time_headers, false).unwrap();
        (table, schedule)
    }

    #[test]
    fn test_clean_table_uses_schedule_order() {
        let (table, schedule) = normalized(&[&["평일", "2호선", "201", "시청", "내선", "60.5", "20"]]);
        let cleaned = cleaner().clean_table(&table, &schedule).unwrap();

        let wide = &cleaned.wide;
        assert_eq!(wide.slots, vec![TimeSlot::new(5, 30).unwrap(), TimeSlot::new(6, 0).unwrap()]);
        assert_eq!(wide.row_values(0), &[20.0, 60.5]);
        assert_eq!(wide.identities[0].station_sequence, 201);
        assert_eq!(wide.identities[0].direction, "내선");
        assert!(cleaned.parse_issues.is_empty());
        assert!(cleaned.violations.is_empty());
    }

    #[test]
    fn test_clean_table_collects_findings_and_keeps_rows() {
        let (table, schedule) = normalized(&[
            &["평일", "1호선", "150", "서울역", "상선", "oops", ""],
            &["토요일", "1호선", "150", "서울역", "상선", "-4", "12"],
        ]);
        let cleaned = cleaner().clean_table(&table, &schedule).unwrap();

        assert_eq!(cleaned.wide.row_count(), 2);
        assert_eq!(cleaned.wide.values, vec![0.0, 0.0, 12.0, 0.0]);

        assert_eq!(
            cleaned.parse_issues,
            vec![ParseIssue::MalformedCell {
                row: 1,
                time_slot: TimeSlot::new(6, 0).unwrap(),
                raw: "oops".to_string(),
            }]
        );
        match cleaned.violations.as_slice() {
            [ValidationIssue::NegativeValue { key, value }] => {
                assert_eq!(key.day_type, "토요일");
                assert_eq!(key.time_slot.to_string(), "06:00");
                assert_eq!(*value, -4.0);
            }
            other => panic!("Expected one NegativeValue, got {:?}", other),
        }
    }

    #[test]
    fn test_clamp_policy_reports_nothing() {
        let (table, schedule) = normalized(&[&["평일", "1호선", "150", "서울역", "상선", "-4", "12"]]);
        let config = CleaningConfig {
            negative_policy: NegativePolicy::Clamp,
            ..Default::default()
        };
        let cleaned = ValueCleaner::new(&config)
            .clean_table(&table, &schedule)
            .unwrap();
        assert!(cleaned.violations.is_empty());
        assert_eq!(cleaned.wide.values, vec![12.0, 0.0]);
    }

    #[test]
    fn test_malformed_station_sequence_is_fatal() {
        let (table, schedule) = normalized(&[&["평일", "1호선", "15O", "서울역", "상선", "1", "2"]]);
        let err = cleaner().clean_table(&table, &schedule).unwrap_err();
        assert!(err.is_structural());
        assert!(matches!(err, CongestionError::MalformedIdentifier { row: 1, .. }));
    }
}
