//! Source file loading.
//!
//! Reads the congestion export from disk, enforces the input limits,
//! decodes the text and splits it into a [`RawTable`]. Nothing here looks at
//! what the columns mean; that starts in the pipeline's normalizer.

use crate::config::InputConfig;
use crate::error::{CongestionError, Result};
use crate::models::RawTable;
use encoding_rs::Encoding;
use std::borrow::Cow;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Load and split the source CSV
pub fn read_raw_table(path: &Path, input: &InputConfig) -> Result<RawTable> {
    if !path.exists() {
        return Err(CongestionError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }

    let size = fs::metadata(path)?.len();
    if size > input.max_bytes {
        return Err(CongestionError::InputTooLarge {
            what: "file size",
            actual: size,
            max: input.max_bytes,
        });
    }

    let bytes = fs::read(path)?;
    let legacy = input.legacy_encoding()?;
    let text = decode_source(&bytes, legacy).ok_or_else(|| CongestionError::Encoding {
        path: path.to_path_buf(),
        encoding: legacy.name().to_string(),
    })?;

    let table = parse_csv_text(&text, input)?;
    info!(
        "Read {} rows x {} columns from {}",
        table.row_count(),
        table.width(),
        path.display()
    );
    Ok(table)
}

/// Decode source bytes.
///
/// UTF-8 (with or without BOM) is tried first: CP949 text practically never
/// forms valid UTF-8, while the reverse guess can silently produce mojibake.
/// Returns `None` when the legacy decoder hits malformed sequences.
pub fn decode_source<'a>(bytes: &'a [u8], legacy: &'static Encoding) -> Option<Cow<'a, str>> {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        debug!("Source has a UTF-8 byte order mark");
        return std::str::from_utf8(rest).ok().map(Cow::Borrowed);
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        debug!("Source decoded as UTF-8");
        return Some(Cow::Borrowed(text));
    }

    let (text, had_errors) = legacy.decode_without_bom_handling(bytes);
    if had_errors {
        return None;
    }
    debug!("Source decoded as {}", legacy.name());
    Some(text)
}

/// Split decoded CSV text into a raw table, enforcing the row and column limits
pub fn parse_csv_text(text: &str, input: &InputConfig) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    if headers.len() > input.max_columns {
        return Err(CongestionError::InputTooLarge {
            what: "column count",
            actual: headers.len() as u64,
            max: input.max_columns as u64,
        });
    }

    let mut table = RawTable::new(headers);
    for record in reader.records() {
        // Ragged rows surface here as csv::Error (UnequalLengths)
        let record = record?;
        if table.row_count() >= input.max_rows {
            return Err(CongestionError::InputTooLarge {
                what: "row count",
                actual: table.row_count() as u64 + 1,
                max: input.max_rows as u64,
            });
        }
        table.push_row(
            record
                .iter()
                .map(|cell| (!cell.is_empty()).then(|| cell.to_string())),
        );
    }

    Ok(table)
}
