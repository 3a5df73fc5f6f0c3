//! Structural failures abort the run

use super::*;
use crate::config::{CongestionThresholds, DerivationPolicy, PipelineConfig};
use crate::error::CongestionError;
use crate::pipeline::Pipeline;
use crate::reader::parse_csv_text;
use std::path::Path;

fn run_err(text: &str) -> CongestionError {
    let config = PipelineConfig::default();
    let raw = parse_csv_text(text, &config.input).unwrap();
    Pipeline::new(config).unwrap().run_table(raw).unwrap_err()
}

fn one_row(headers: &[String]) -> String {
    let cells = vec!["1".to_string(); headers.len() - 5];
    csv_text(
        headers,
        &[data_row(["평일", "1호선", "150", "서울역", "상선"], &cells)],
    )
}

#[test]
fn test_missing_identity_column() {
    let mut headers = export_headers();
    headers[4] = "비고".to_string();

    match run_err(&one_row(&headers)) {
        CongestionError::MissingColumn { canonical, .. } => assert_eq!(canonical, "direction"),
        other => panic!("Expected MissingColumn error, got {:?}", other),
    }
}

#[test]
fn test_unrecognized_extra_column_is_a_bad_time_header() {
    let mut headers = export_headers();
    headers.push("비고".to_string());

    match run_err(&one_row(&headers)) {
        CongestionError::TimeHeader { header, .. } => assert_eq!(header, "비고"),
        other => panic!("Expected TimeHeader error, got {:?}", other),
    }
}

#[test]
fn test_duplicate_time_header() {
    let mut headers = export_headers();
    headers[6] = "5시30분".to_string();

    let err = run_err(&one_row(&headers));
    assert!(err.is_structural());
    assert!(matches!(err, CongestionError::DuplicateTimeSlot { .. }));
}

#[test]
fn test_missing_time_slot() {
    let mut headers = export_headers();
    headers.truncate(headers.len() - 1);

    match run_err(&one_row(&headers)) {
        CongestionError::IncompleteSchedule { found, missing, .. } => {
            assert_eq!(found, 38);
            assert_eq!(missing, "24:30");
        }
        other => panic!("Expected IncompleteSchedule error, got {:?}", other),
    }
}

#[test]
fn test_malformed_station_sequence() {
    let text = csv_text(
        &export_headers(),
        &[
            data_row(["평일", "1호선", "150", "서울역", "상선"], &cells_with(&[])),
            data_row(["평일", "1호선", "", "시청", "상선"], &cells_with(&[])),
        ],
    );

    match run_err(&text) {
        CongestionError::MalformedIdentifier { row, column, .. } => {
            assert_eq!(row, 2);
            assert_eq!(column, "station_sequence");
        }
        other => panic!("Expected MalformedIdentifier error, got {:?}", other),
    }
}

#[test]
fn test_missing_source_file() {
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let err = pipeline
        .run_file(Path::new("/nonexistent/subway.csv"))
        .unwrap_err();
    assert!(matches!(err, CongestionError::SourceNotFound { .. }));
}

#[test]
fn test_row_limit_enforced_before_transform() {
    let text = two_row_export();
    let config = PipelineConfig::default().with_max_rows(1);
    let err = parse_csv_text(&text, &config.input).unwrap_err();
    assert!(matches!(err, CongestionError::InputTooLarge { .. }));
}

#[test]
fn test_invalid_policy_rejected_at_construction() {
    let derivation = DerivationPolicy {
        thresholds: CongestionThresholds {
            medium_from: 100.0,
            high_from: 100.0,
        },
        ..Default::default()
    };
    let config = PipelineConfig::default().with_derivation(derivation);

    match Pipeline::new(config) {
        Err(CongestionError::Configuration { message }) => {
            assert!(message.contains("thresholds"));
        }
        other => panic!("Expected Configuration error, got {:?}", other),
    }
}
