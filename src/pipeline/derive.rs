//! Derived columns.
//!
//! Adds the congestion level, time period and line ordering key to each
//! pivoted cell. All three are total functions of the configured
//! [`DerivationPolicy`].

use crate::config::DerivationPolicy;
use crate::constants::{MAX_NUMERIC_LINE_KEY, NON_NUMERIC_LINE_KEY_BASE};
use crate::models::{LongObservation, LongTable, WideTable};
use crate::pipeline::reshape::Reshaper;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;
use tracing::debug;

static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(?:호선)?$").expect("static line pattern"));

/// Numeric part of a numbered line label (`"2호선"`, `"7"`), if below the
/// numeric key ceiling
pub fn numbered_line(label: &str) -> Option<i64> {
    NUMBERED_LINE
        .captures(label.trim())
        .and_then(|c| c[1].parse::<i64>().ok())
        .filter(|n| *n < MAX_NUMERIC_LINE_KEY)
}

/// Ordering keys for a set of line labels.
///
/// Numbered lines sort by their number; named lines (`경의중앙선`,
/// `신분당선`, ...) follow in lexicographic order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineKeys {
    keys: HashMap<String, i64>,
}

impl LineKeys {
    pub fn from_labels<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut keys = HashMap::new();
        let mut named = BTreeSet::new();

        for label in labels {
            match numbered_line(label) {
                Some(number) => {
                    keys.insert(label.to_string(), number);
                }
                None => {
                    named.insert(label.to_string());
                }
            }
        }

        for (rank, label) in named.into_iter().enumerate() {
            keys.insert(label, NON_NUMERIC_LINE_KEY_BASE + rank as i64);
        }

        Self { keys }
    }

    pub fn get(&self, label: &str) -> Option<i64> {
        self.keys.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Builds the long table from a cleaned wide table
#[derive(Debug, Clone)]
pub struct FeatureDeriver {
    policy: DerivationPolicy,
}

impl FeatureDeriver {
    pub fn new(policy: DerivationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DerivationPolicy {
        &self.policy
    }

    pub fn derive(&self, wide: &WideTable) -> LongTable {
        let line_keys = LineKeys::from_labels(wide.identities.iter().map(|id| id.line.as_str()));
        let reshaper = Reshaper::new(wide);
        let periods: Vec<_> = wide
            .slots
            .iter()
            .map(|slot| self.policy.time_periods.classify(*slot))
            .collect();

        let mut observations = Vec::with_capacity(reshaper.expected_rows());
        for cell in reshaper.cells() {
            let identity = cell.identity;
            observations.push(LongObservation {
                line: identity.line.clone(),
                station_sequence: identity.station_sequence,
                station_name: identity.station_name.clone(),
                day_type: identity.day_type.clone(),
                direction: identity.direction.clone(),
                time_slot: cell.time_slot,
                congestion_value: cell.value,
                congestion_level: self.policy.thresholds.level(cell.value),
                time_period: periods[cell.key.slot],
                line_sort_key: line_keys
                    .get(&identity.line)
                    .unwrap_or(NON_NUMERIC_LINE_KEY_BASE),
            });
        }

        debug!(
            "Derived {} observations across {} lines",
            observations.len(),
            line_keys.len()
        );
        LongTable::new(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CongestionThresholds;
    use crate::models::{CongestionLevel, RowIdentity, TimePeriod, TimeSlot};

    #[test]
    fn test_numbered_lines() {
        assert_eq!(numbered_line("2호선"), Some(2));
        assert_eq!(numbered_line(" 9 "), Some(9));
        assert_eq!(numbered_line("10호선"), Some(10));
        assert_eq!(numbered_line("경의중앙선"), None);
        assert_eq!(numbered_line("2호선 지선"), None);
        assert_eq!(numbered_line("12345"), None);
    }

    #[test]
    fn test_line_keys_put_named_lines_after_numbers() {
        let keys = LineKeys::from_labels(["신분당선", "2호선", "경의중앙선", "1호선", "2호선"]);
        assert_eq!(keys.len(), 4);
        assert_eq!(keys.get("1호선"), Some(1));
        assert_eq!(keys.get("2호선"), Some(2));
        assert_eq!(keys.get("경의중앙선"), Some(10_000));
        assert_eq!(keys.get("신분당선"), Some(10_001));
        assert_eq!(keys.get("공항철도"), None);
    }

    #[test]
    fn test_level_is_monotonic() {
        let thresholds = CongestionThresholds::default();
        let values: Vec<f64> = (0..=400).map(|v| v as f64 * 0.5).collect();
        let levels: Vec<CongestionLevel> = values.iter().map(|v| thresholds.level(*v)).collect();
        assert!(levels.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(levels.first(), Some(&CongestionLevel::Low));
        assert_eq!(levels.last(), Some(&CongestionLevel::High));
    }

    #[test]
    fn test_every_canonical_slot_has_exactly_one_period() {
        let table = DerivationPolicy::default().time_periods;
        for slot in TimeSlot::canonical_schedule() {
            let covering = table
                .ranges
                .iter()
                .filter(|range| range.contains(slot.minutes()))
                .count();
            assert_eq!(covering, 1, "slot {} covered {} times", slot, covering);
        }
    }

    #[test]
    fn test_derive_fills_every_column() {
        let identity = |line: &str, seq| RowIdentity {
            day_type: "평일".to_string(),
            line: line.to_string(),
            station_sequence: seq,
            station_name: "시청".to_string(),
            direction: "내선".to_string(),
        };
        let wide = WideTable {
            slots: vec![TimeSlot::new(8, 0).unwrap(), TimeSlot::new(24, 30).unwrap()],
            identities: vec![identity("2호선", 201), identity("경의중앙선", 1)],
            values: vec![135.0, 10.0, 85.0, 0.0],
        };

        let long = FeatureDeriver::new(DerivationPolicy::default()).derive(&wide);
        assert_eq!(long.len(), 4);

        let first = &long.observations[0];
        assert_eq!(first.line, "2호선");
        assert_eq!(first.congestion_level, CongestionLevel::High);
        assert_eq!(first.time_period, TimePeriod::MorningCommute);
        assert_eq!(first.line_sort_key, 2);

        let late = &long.observations[1];
        assert_eq!(late.time_slot.to_string(), "24:30");
        assert_eq!(late.time_period, TimePeriod::LateNight);
        assert_eq!(late.congestion_level, CongestionLevel::Low);

        let named = &long.observations[2];
        assert_eq!(named.congestion_level, CongestionLevel::Medium);
        assert_eq!(named.line_sort_key, 10_000);
    }
}
