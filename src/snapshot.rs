//! Parquet snapshot writing and reading.
//!
//! The snapshot is written to a temporary file next to its destination and
//! renamed into place, so readers never observe a half-written file. A JSON
//! manifest beside it records what the snapshot was built from.

use crate::config::SnapshotConfig;
use crate::constants::{MANIFEST_SUFFIX, MANIFEST_VERSION, columns};
use crate::error::{CongestionError, Result};
use crate::models::LongTable;
use crate::pipeline::validate::ValidationReport;
use crate::schema::{frame_to_table, table_to_frame, verify_frame_schema};
use crate::store::SourceFingerprint;

use chrono::{DateTime, Utc};
use polars::prelude::{
    DataFrame, IntoLazy, LazyFrame, ParquetWriter as PolarsParquetWriter, SortMultipleOptions,
    StatisticsOptions, col,
};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Sidecar describing a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub version: u32,
    pub source: SourceFingerprint,
    /// Digest of the transformation settings the snapshot was built with
    pub config_digest: String,
    pub wide_rows: usize,
    pub rows: usize,
    pub created_at: DateTime<Utc>,
    pub report: ValidationReport,
}

impl SnapshotManifest {
    pub fn new(
        source: SourceFingerprint,
        config_digest: String,
        wide_rows: usize,
        report: ValidationReport,
    ) -> Self {
        Self {
            version: MANIFEST_VERSION,
            source,
            config_digest,
            wide_rows,
            rows: report.statistics.total_rows,
            created_at: Utc::now(),
            report,
        }
    }
}

/// `<snapshot>.manifest.json`
pub fn manifest_path(snapshot: &Path) -> PathBuf {
    let mut name: OsString = snapshot.as_os_str().to_owned();
    name.push(".");
    name.push(MANIFEST_SUFFIX);
    PathBuf::from(name)
}

/// Writes long tables as Parquet snapshots
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    output_path: PathBuf,
    config: SnapshotConfig,
}

impl SnapshotWriter {
    pub fn new(output_path: PathBuf, config: SnapshotConfig) -> Self {
        Self {
            output_path,
            config,
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Write the table and return the number of rows written
    pub fn write(&self, table: &LongTable) -> Result<usize> {
        let df = table_to_frame(table)?;

        let mut df = if self.config.sort_by_line_then_station {
            debug!("Sorting snapshot by line key, station, direction, day type and slot");
            df.lazy()
                .sort_by_exprs(
                    [
                        col(columns::LINE_SORT_KEY),
                        col(columns::STATION_SEQUENCE),
                        col(columns::DIRECTION),
                        col(columns::DAY_TYPE),
                        col(columns::TIME_SLOT),
                    ],
                    SortMultipleOptions::default().with_maintain_order(true),
                )
                .collect()?
        } else {
            df
        };

        let rows = df.height();
        let parent = self.parent_dir()?;
        let mut temp = NamedTempFile::new_in(&parent)?;

        let statistics = if self.config.enable_statistics {
            StatisticsOptions::full()
        } else {
            StatisticsOptions::empty()
        };
        PolarsParquetWriter::new(&mut temp)
            .with_compression(self.config.compression.to_polars_compression())
            .with_statistics(statistics)
            .with_row_group_size(self.config.row_group_size)
            .finish(&mut df)
            .map_err(|e| {
                CongestionError::snapshot(&self.output_path, format!("failed to write parquet: {}", e))
            })?;

        temp.as_file().sync_all()?;
        temp.persist(&self.output_path).map_err(|e| {
            CongestionError::snapshot(&self.output_path, format!("failed to move into place: {}", e))
        })?;

        info!(
            "Wrote {} rows to {} ({:?})",
            rows,
            self.output_path.display(),
            self.config.compression
        );
        Ok(rows)
    }

    /// Write the manifest next to the snapshot
    pub fn write_manifest(&self, manifest: &SnapshotManifest) -> Result<PathBuf> {
        let path = manifest_path(&self.output_path);
        let mut temp = NamedTempFile::new_in(self.parent_dir()?)?;
        serde_json::to_writer_pretty(&mut temp, manifest)?;
        temp.write_all(b"\n")?;
        temp.persist(&path).map_err(|e| {
            CongestionError::snapshot(&path, format!("failed to move manifest into place: {}", e))
        })?;
        debug!("Wrote manifest {}", path.display());
        Ok(path)
    }

    fn parent_dir(&self) -> Result<PathBuf> {
        let parent = match self.output_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;
        Ok(parent)
    }
}

/// Lazily scan a snapshot
pub fn scan_snapshot(path: &Path) -> Result<LazyFrame> {
    if !path.exists() {
        return Err(CongestionError::snapshot(path, "snapshot file does not exist"));
    }
    Ok(LazyFrame::scan_parquet(path, Default::default())?)
}

/// Read a snapshot into memory, checking its schema
pub fn load_frame(path: &Path) -> Result<DataFrame> {
    let df = scan_snapshot(path)?.collect()?;
    verify_frame_schema(&df, path)?;
    debug!("Loaded {} rows from {}", df.height(), path.display());
    Ok(df)
}

/// Read a snapshot back into a long table
pub fn read_snapshot(path: &Path) -> Result<LongTable> {
    let df = load_frame(path)?;
    frame_to_table(&df, path)
}

/// Read the manifest of a snapshot
pub fn read_manifest(snapshot: &Path) -> Result<SnapshotManifest> {
    let path = manifest_path(snapshot);
    let text = fs::read_to_string(&path)?;
    let manifest: SnapshotManifest = serde_json::from_str(&text)?;
    if manifest.version != MANIFEST_VERSION {
        return Err(CongestionError::snapshot(
            &path,
            format!(
                "manifest version {} is not supported (expected {})",
                manifest.version, MANIFEST_VERSION
            ),
        ));
    }
    Ok(manifest)
}
