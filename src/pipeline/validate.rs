//! Final-table validation and summary statistics.
//!
//! Findings are reported and never fixed. Statistics are computed whether or
//! not validation passed.

use crate::models::{LongTable, ObservationKey, TimeSlot};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Recoverable problem with a single source cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseIssue {
    /// Cell text that is neither a number nor a missing marker; stored as 0.0
    MalformedCell {
        /// 1-based data row of the source file
        row: usize,
        time_slot: TimeSlot,
        raw: String,
    },
}

/// Invariant violated by the final table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    NonFiniteValue {
        key: ObservationKey,
    },
    NegativeValue {
        key: ObservationKey,
        value: f64,
    },
    DuplicateKey {
        key: ObservationKey,
        occurrences: usize,
    },
    OutOfDomainSlot {
        key: ObservationKey,
    },
    RowCountMismatch {
        expected: usize,
        actual: usize,
    },
}

impl ValidationIssue {
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationIssue::NonFiniteValue { .. } => "non_finite_value",
            ValidationIssue::NegativeValue { .. } => "negative_value",
            ValidationIssue::DuplicateKey { .. } => "duplicate_key",
            ValidationIssue::OutOfDomainSlot { .. } => "out_of_domain_slot",
            ValidationIssue::RowCountMismatch { .. } => "row_count_mismatch",
        }
    }
}

/// The busiest observation in the table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub station_name: String,
    pub line: String,
    pub time_slot: TimeSlot,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_rows: usize,
    pub line_count: usize,
    /// Distinct station names, across lines
    pub station_count: usize,
    pub mean: Option<f64>,
    pub max: Option<f64>,
    pub min: Option<f64>,
    /// Sample standard deviation (n - 1)
    pub std_dev: Option<f64>,
    pub peak: Option<Peak>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub statistics: Statistics,
    pub parse_issues: Vec<ParseIssue>,
    pub violations: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Prepend the findings collected while cleaning cells
    pub fn merge_cleaning(
        &mut self,
        parse_issues: Vec<ParseIssue>,
        violations: Vec<ValidationIssue>,
    ) {
        self.parse_issues.splice(0..0, parse_issues);
        self.violations.splice(0..0, violations);
    }

    /// Violation counts by kind, in first-seen order
    pub fn violation_counts(&self) -> Vec<(&'static str, usize)> {
        let mut counts: Vec<(&'static str, usize)> = Vec::new();
        for issue in &self.violations {
            match counts.iter_mut().find(|(kind, _)| *kind == issue.kind()) {
                Some((_, n)) => *n += 1,
                None => counts.push((issue.kind(), 1)),
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    pub fn validate(&self, table: &LongTable, expected_rows: usize) -> ValidationReport {
        let mut violations = Vec::new();

        if table.len() != expected_rows {
            violations.push(ValidationIssue::RowCountMismatch {
                expected: expected_rows,
                actual: table.len(),
            });
        }

        let mut seen: HashMap<ObservationKey, usize> = HashMap::with_capacity(table.len());
        let mut first_seen = Vec::new();

        for observation in table {
            let value = observation.congestion_value;
            if !value.is_finite() {
                violations.push(ValidationIssue::NonFiniteValue {
                    key: observation.key(),
                });
            } else if value < 0.0 {
                violations.push(ValidationIssue::NegativeValue {
                    key: observation.key(),
                    value,
                });
            }
            if !observation.time_slot.is_canonical() {
                violations.push(ValidationIssue::OutOfDomainSlot {
                    key: observation.key(),
                });
            }

            let count = seen.entry(observation.key()).or_insert(0);
            *count += 1;
            if *count == 2 {
                first_seen.push(observation.key());
            }
        }

        for key in first_seen {
            let occurrences = seen[&key];
            violations.push(ValidationIssue::DuplicateKey { key, occurrences });
        }

        let statistics = compute_statistics(table);
        if violations.is_empty() {
            debug!("Validated {} rows, no violations", table.len());
        } else {
            warn!(
                "Validation found {} violations in {} rows",
                violations.len(),
                table.len()
            );
        }

        ValidationReport {
            statistics,
            parse_issues: Vec::new(),
            violations,
        }
    }
}

pub fn compute_statistics(table: &LongTable) -> Statistics {
    let lines: HashSet<&str> = table.iter().map(|o| o.line.as_str()).collect();
    let stations: HashSet<&str> = table.iter().map(|o| o.station_name.as_str()).collect();

    let finite: Vec<f64> = table
        .iter()
        .map(|o| o.congestion_value)
        .filter(|v| v.is_finite())
        .collect();
    let n = finite.len();

    let mean = (n > 0).then(|| finite.iter().sum::<f64>() / n as f64);
    let std_dev = match mean {
        Some(mean) if n >= 2 => {
            let sum_sq: f64 = finite.iter().map(|v| (v - mean).powi(2)).sum();
            Some((sum_sq / (n - 1) as f64).sqrt())
        }
        _ => None,
    };
    let min = finite.iter().copied().reduce(f64::min);

    let mut peak: Option<Peak> = None;
    for observation in table {
        let value = observation.congestion_value;
        if !value.is_finite() {
            continue;
        }
        if peak.as_ref().is_none_or(|p| value > p.value) {
            peak = Some(Peak {
                station_name: observation.station_name.clone(),
                line: observation.line.clone(),
                time_slot: observation.time_slot,
                value,
            });
        }
    }

    Statistics {
        total_rows: table.len(),
        line_count: lines.len(),
        station_count: stations.len(),
        mean,
        max: peak.as_ref().map(|p| p.value),
        min,
        std_dev,
        peak,
    }
}
