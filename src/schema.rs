//! Snapshot schema.
//!
//! Converts the long table to and from a Polars `DataFrame` and checks that
//! a frame read back from disk carries exactly the expected columns and
//! dtypes. Categorical columns are stored as their string codes.

use crate::constants::columns;
use crate::error::{CongestionError, Result};
use crate::models::{CongestionLevel, LongObservation, LongTable, TimePeriod, TimeSlot};
use polars::prelude::*;
use std::path::Path;
use tracing::debug;

/// Expected dtype of every snapshot column, in snapshot order
pub fn snapshot_dtypes() -> [(&'static str, DataType); 10] {
    [
        (columns::LINE, DataType::String),
        (columns::STATION_SEQUENCE, DataType::UInt32),
        (columns::STATION_NAME, DataType::String),
        (columns::DAY_TYPE, DataType::String),
        (columns::DIRECTION, DataType::String),
        (columns::TIME_SLOT, DataType::String),
        (columns::CONGESTION_VALUE, DataType::Float64),
        (columns::CONGESTION_LEVEL, DataType::String),
        (columns::TIME_PERIOD, DataType::String),
        (columns::LINE_SORT_KEY, DataType::Int64),
    ]
}

fn text_values<'a>(
    rows: &'a [LongObservation],
    field: impl Fn(&'a LongObservation) -> &'a str,
) -> Vec<&'a str> {
    rows.iter().map(field).collect()
}

/// Build the snapshot frame from a long table
pub fn table_to_frame(table: &LongTable) -> Result<DataFrame> {
    let rows = table.observations.as_slice();

    let line = text_values(rows, |o| o.line.as_str());
    let station_name = text_values(rows, |o| o.station_name.as_str());
    let day_type = text_values(rows, |o| o.day_type.as_str());
    let direction = text_values(rows, |o| o.direction.as_str());
    let level = text_values(rows, |o| o.congestion_level.code());
    let period = text_values(rows, |o| o.time_period.code());
    let time_slot: Vec<String> = rows.iter().map(|o| o.time_slot.to_string()).collect();
    let station_sequence: Vec<u32> = rows.iter().map(|o| o.station_sequence).collect();
    let value: Vec<f64> = rows.iter().map(|o| o.congestion_value).collect();
    let line_sort_key: Vec<i64> = rows.iter().map(|o| o.line_sort_key).collect();

    let df = DataFrame::new(vec![
        Column::new(columns::LINE.into(), line),
        Column::new(columns::STATION_SEQUENCE.into(), station_sequence),
        Column::new(columns::STATION_NAME.into(), station_name),
        Column::new(columns::DAY_TYPE.into(), day_type),
        Column::new(columns::DIRECTION.into(), direction),
        Column::new(columns::TIME_SLOT.into(), time_slot),
        Column::new(columns::CONGESTION_VALUE.into(), value),
        Column::new(columns::CONGESTION_LEVEL.into(), level),
        Column::new(columns::TIME_PERIOD.into(), period),
        Column::new(columns::LINE_SORT_KEY.into(), line_sort_key),
    ])?;
    debug!("Built snapshot frame with {} rows", df.height());
    Ok(df)
}

/// Reject a frame with missing columns or unexpected dtypes
pub fn verify_frame_schema(df: &DataFrame, path: &Path) -> Result<()> {
    for (name, expected) in snapshot_dtypes() {
        let column = df.column(name).map_err(|_| {
            CongestionError::snapshot(path, format!("missing column '{}'", name))
        })?;
        if column.dtype() != &expected {
            return Err(CongestionError::snapshot(
                path,
                format!(
                    "column '{}' has dtype {} instead of {}",
                    name,
                    column.dtype(),
                    expected
                ),
            ));
        }
    }
    Ok(())
}

fn non_null<T>(value: Option<T>, name: &str, row: usize, path: &Path) -> Result<T> {
    value.ok_or_else(|| {
        CongestionError::snapshot(path, format!("null in column '{}' at row {}", name, row))
    })
}

fn parse_code<T: std::str::FromStr<Err = String>>(
    text: &str,
    name: &str,
    path: &Path,
) -> Result<T> {
    text.parse()
        .map_err(|e: String| CongestionError::snapshot(path, format!("column '{}': {}", name, e)))
}

/// Rebuild the long table from a snapshot frame; `path` names the source in errors
pub fn frame_to_table(df: &DataFrame, path: &Path) -> Result<LongTable> {
    verify_frame_schema(df, path)?;

    let text = |name: &str| -> Result<StringChunked> {
        Ok(df.column(name)?.as_materialized_series().str()?.clone())
    };
    let line = text(columns::LINE)?;
    let station_name = text(columns::STATION_NAME)?;
    let day_type = text(columns::DAY_TYPE)?;
    let direction = text(columns::DIRECTION)?;
    let time_slot = text(columns::TIME_SLOT)?;
    let level = text(columns::CONGESTION_LEVEL)?;
    let period = text(columns::TIME_PERIOD)?;
    let station_sequence = df
        .column(columns::STATION_SEQUENCE)?
        .as_materialized_series()
        .u32()?
        .clone();
    let value = df
        .column(columns::CONGESTION_VALUE)?
        .as_materialized_series()
        .f64()?
        .clone();
    let line_sort_key = df
        .column(columns::LINE_SORT_KEY)?
        .as_materialized_series()
        .i64()?
        .clone();

    let mut observations = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let slot_text = non_null(time_slot.get(row), columns::TIME_SLOT, row, path)?;
        let level_text = non_null(level.get(row), columns::CONGESTION_LEVEL, row, path)?;
        let period_text = non_null(period.get(row), columns::TIME_PERIOD, row, path)?;

        observations.push(LongObservation {
            line: non_null(line.get(row), columns::LINE, row, path)?.to_string(),
            station_sequence: non_null(
                station_sequence.get(row),
                columns::STATION_SEQUENCE,
                row,
                path,
            )?,
            station_name: non_null(station_name.get(row), columns::STATION_NAME, row, path)?
                .to_string(),
            day_type: non_null(day_type.get(row), columns::DAY_TYPE, row, path)?.to_string(),
            direction: non_null(direction.get(row), columns::DIRECTION, row, path)?.to_string(),
            time_slot: parse_code::<TimeSlot>(slot_text, columns::TIME_SLOT, path)?,
            congestion_value: non_null(value.get(row), columns::CONGESTION_VALUE, row, path)?,
            congestion_level: parse_code::<CongestionLevel>(
                level_text,
                columns::CONGESTION_LEVEL,
                path,
            )?,
            time_period: parse_code::<TimePeriod>(period_text, columns::TIME_PERIOD, path)?,
            line_sort_key: non_null(line_sort_key.get(row), columns::LINE_SORT_KEY, row, path)?,
        });
    }

    Ok(LongTable::new(observations))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LongTable {
        LongTable::new(vec![
            LongObservation {
                line: "2호선".to_string(),
                station_sequence: 201,
                station_name: "시청".to_string(),
                day_type: "평일".to_string(),
                direction: "내선".to_string(),
                time_slot: TimeSlot::new(21, 30).unwrap(),
                congestion_value: 150.0,
                congestion_level: CongestionLevel::High,
                time_period: TimePeriod::Evening,
                line_sort_key: 2,
            },
            LongObservation {
                line: "경의중앙선".to_string(),
                station_sequence: 1201,
                station_name: "서울역".to_string(),
                day_type: "일요일".to_string(),
                direction: "하선".to_string(),
                time_slot: TimeSlot::new(24, 0).unwrap(),
                congestion_value: 3.5,
                congestion_level: CongestionLevel::Low,
                time_period: TimePeriod::LateNight,
                line_sort_key: 10_000,
            },
        ])
    }

    #[test]
    fn test_frame_layout() {
        let df = table_to_frame(&sample()).unwrap();
        assert_eq!(df.height(), 2);
        let names: Vec<&str> = df.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, columns::ALL);
        verify_frame_schema(&df, Path::new("memory")).unwrap();

        let slot = df.column(columns::TIME_SLOT).unwrap().get(1).unwrap();
        assert_eq!(slot, AnyValue::String("24:00"));
        let level = df.column(columns::CONGESTION_LEVEL).unwrap().get(0).unwrap();
        assert_eq!(level, AnyValue::String("high"));
    }

    #[test]
    fn test_frame_converts_back() {
        let table = sample();
        let df = table_to_frame(&table).unwrap();
        assert_eq!(frame_to_table(&df, Path::new("memory")).unwrap(), table);
    }

    #[test]
    fn test_wrong_dtype_rejected() {
        let mut df = table_to_frame(&sample()).unwrap();
        df.with_column(Column::new(
            columns::STATION_SEQUENCE.into(),
            vec![201i64, 1201],
        ))
        .unwrap();

        match verify_frame_schema(&df, Path::new("snap.parquet")) {
            Err(CongestionError::Snapshot { reason, .. }) => {
                assert!(reason.contains("station_sequence"));
            }
            other => panic!("Expected Snapshot error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_column_rejected() {
        let df = table_to_frame(&sample())
            .unwrap()
            .drop(columns::TIME_PERIOD)
            .unwrap();
        assert!(frame_to_table(&df, Path::new("snap.parquet")).is_err());
    }

    #[test]
    fn test_unknown_level_code_rejected() {
        let mut df = table_to_frame(&sample()).unwrap();
        df.with_column(Column::new(
            columns::CONGESTION_LEVEL.into(),
            vec!["high", "packed"],
        ))
        .unwrap();
        let err = frame_to_table(&df, Path::new("snap.parquet")).unwrap_err();
        assert!(err.to_string().contains("packed"));
    }
}
