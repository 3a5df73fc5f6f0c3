//! Column normalization.
//!
//! Maps the raw header labels of the export onto the five canonical
//! identifying columns and hands every other column on as a time-slot
//! header. Only labels are touched; cell contents pass through unchanged.

use crate::config::ColumnAliases;
use crate::error::{CongestionError, Result};
use crate::models::RawTable;
use tracing::debug;

/// Raw column positions of the identifying fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityColumns {
    pub day_type: usize,
    pub line: usize,
    pub station_sequence: usize,
    pub station_name: usize,
    pub direction: usize,
}

/// A column that is not an identifying field and is expected to be a time slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeHeader {
    pub column: usize,
    pub label: String,
}

/// Raw table with its header row resolved
#[derive(Debug, Clone)]
pub struct NormalizedTable {
    pub raw: RawTable,
    pub identity: IdentityColumns,
    pub time_headers: Vec<TimeHeader>,
}

impl NormalizedTable {
    /// Header row after renaming: canonical names for identifying columns,
    /// raw labels for the rest
    pub fn canonical_headers(&self) -> Vec<String> {
        use crate::constants::columns;

        let mut headers = self.raw.headers.clone();
        headers[self.identity.day_type] = columns::DAY_TYPE.to_string();
        headers[self.identity.line] = columns::LINE.to_string();
        headers[self.identity.station_sequence] = columns::STATION_SEQUENCE.to_string();
        headers[self.identity.station_name] = columns::STATION_NAME.to_string();
        headers[self.identity.direction] = columns::DIRECTION.to_string();
        headers
    }
}

/// Resolves raw header labels against the configured aliases
#[derive(Debug, Clone)]
pub struct ColumnNormalizer {
    aliases: ColumnAliases,
}

impl ColumnNormalizer {
    pub fn new(aliases: ColumnAliases) -> Self {
        Self { aliases }
    }

    pub fn normalize(&self, raw: RawTable) -> Result<NormalizedTable> {
        let headers: Vec<&str> = raw
            .headers
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim())
            .collect();

        let mut resolved = [0usize; 5];
        let mut claimed = vec![false; headers.len()];

        for (slot, (canonical, aliases)) in self.aliases.entries().into_iter().enumerate() {
            let matches: Vec<usize> = headers
                .iter()
                .enumerate()
                .filter(|(_, header)| aliases.iter().any(|alias| alias.trim() == **header))
                .map(|(index, _)| index)
                .collect();

            match matches.as_slice() {
                [] => {
                    return Err(CongestionError::MissingColumn {
                        canonical: canonical.to_string(),
                        headers: headers.join(", "),
                    });
                }
                [index] if !claimed[*index] => {
                    claimed[*index] = true;
                    resolved[slot] = *index;
                    debug!("Column '{}' -> {}", headers[*index], canonical);
                }
                _ => {
                    return Err(CongestionError::AmbiguousColumn {
                        canonical: canonical.to_string(),
                        matches: matches
                            .iter()
                            .map(|&i| headers[i])
                            .collect::<Vec<_>>()
                            .join(", "),
                    });
                }
            }
        }

        let time_headers = headers
            .iter()
            .enumerate()
            .filter(|(index, _)| !claimed[*index])
            .map(|(column, label)| TimeHeader {
                column,
                label: label.to_string(),
            })
            .collect();

        let [day_type, line, station_sequence, station_name, direction] = resolved;
        Ok(NormalizedTable {
            raw,
            identity: IdentityColumns {
                day_type,
                line,
                station_sequence,
                station_name,
                direction,
            },
            time_headers,
        })
    }
}
