//! Snapshot-backed cache of the final table.
//!
//! [`CongestionStore`] is the consumer entry point. It hands out one shared,
//! immutable table per source version and only re-runs the pipeline when
//! the source content or the transformation settings change:
//!
//! 1. the in-memory entry is reused while the source length and mtime match;
//! 2. otherwise the source is hashed, and a matching in-memory entry or
//!    on-disk snapshot manifest is reused;
//! 3. otherwise the pipeline runs and a new snapshot is written.

use crate::config::PipelineConfig;
use crate::error::{CongestionError, Result};
use crate::models::LongTable;
use crate::pipeline::Pipeline;
use crate::pipeline::validate::ValidationReport;
use crate::snapshot::{SnapshotManifest, SnapshotWriter, read_manifest, read_snapshot};

use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};

/// Identity and content hash of a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFingerprint {
    pub len: u64,
    /// Modification time in nanoseconds since the epoch, when the platform has one
    pub modified_ns: Option<i64>,
    pub sha256: String,
}

impl SourceFingerprint {
    /// Stat and hash a file
    pub fn of(path: &Path) -> Result<Self> {
        let (len, modified_ns) = source_identity(path)?;
        let mut hasher = Sha256::new();
        io::copy(&mut File::open(path)?, &mut hasher)?;
        Ok(Self {
            len,
            modified_ns,
            sha256: format!("{:x}", hasher.finalize()),
        })
    }

    fn same_identity(&self, identity: (u64, Option<i64>)) -> bool {
        self.modified_ns.is_some() && (self.len, self.modified_ns) == identity
    }
}

fn source_identity(path: &Path) -> Result<(u64, Option<i64>)> {
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => CongestionError::SourceNotFound {
            path: path.to_path_buf(),
        },
        _ => CongestionError::Io(e),
    })?;
    let modified_ns = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_nanos()).ok());
    Ok((metadata.len(), modified_ns))
}

/// Digest of every setting that changes the content of the table
pub fn config_digest(config: &PipelineConfig) -> Result<String> {
    let settings = serde_json::to_vec(&(
        &config.input.encoding,
        &config.columns,
        &config.cleaning,
        &config.schedule,
        &config.derivation,
    ))?;
    Ok(format!("{:x}", Sha256::digest(&settings)))
}

/// Where the table handed out by the last refresh came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// In-memory entry still matched the source
    Memory,
    /// Existing snapshot on disk matched the source
    Snapshot,
    /// Pipeline ran and a new snapshot was written
    Rebuilt,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    fingerprint: SourceFingerprint,
    table: Arc<LongTable>,
    report: Arc<ValidationReport>,
}

/// Cached, re-entrant access to the transformed table
#[derive(Debug)]
pub struct CongestionStore {
    source: PathBuf,
    writer: SnapshotWriter,
    config: PipelineConfig,
    config_digest: String,
    progress: Option<ProgressBar>,
    entry: RwLock<Option<CacheEntry>>,
}

impl CongestionStore {
    pub fn new(source: PathBuf, snapshot: PathBuf, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let config_digest = config_digest(&config)?;
        Ok(Self {
            source,
            writer: SnapshotWriter::new(snapshot, config.snapshot.clone()),
            config,
            config_digest,
            progress: None,
            entry: RwLock::new(None),
        })
    }

    /// Forward pipeline stage names to a spinner on rebuilds
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn source_path(&self) -> &Path {
        &self.source
    }

    pub fn snapshot_path(&self) -> &Path {
        self.writer.output_path()
    }

    /// The final table for the current source
    pub fn load(&self) -> Result<Arc<LongTable>> {
        Ok(self.fresh_entry()?.0.table)
    }

    /// The validation report and statistics for the current source
    pub fn statistics(&self) -> Result<Arc<ValidationReport>> {
        Ok(self.fresh_entry()?.0.report)
    }

    /// Bring the cache up to date and say how
    pub fn refresh(&self) -> Result<LoadOutcome> {
        Ok(self.fresh_entry()?.1)
    }

    /// Re-run the pipeline and rewrite the snapshot regardless of freshness
    pub fn rebuild(&self) -> Result<Arc<LongTable>> {
        let mut guard = self.write_guard();
        let fingerprint = SourceFingerprint::of(&self.source)?;
        let entry = self.build(fingerprint)?;
        *guard = Some(entry.clone());
        Ok(entry.table)
    }

    /// Drop the in-memory entry; the snapshot on disk is kept
    pub fn invalidate(&self) {
        if self.write_guard().take().is_some() {
            debug!("Invalidated cached table for {}", self.source.display());
        }
    }

    pub fn is_cached(&self) -> bool {
        self.read_guard().is_some()
    }

    fn fresh_entry(&self) -> Result<(CacheEntry, LoadOutcome)> {
        let identity = source_identity(&self.source)?;

        if let Some(entry) = self.read_guard().as_ref() {
            if entry.fingerprint.same_identity(identity) {
                debug!("Cache hit for {}", self.source.display());
                return Ok((entry.clone(), LoadOutcome::Memory));
            }
        }

        let mut guard = self.write_guard();
        let fingerprint = SourceFingerprint::of(&self.source)?;

        if let Some(entry) = guard.as_mut() {
            if entry.fingerprint.sha256 == fingerprint.sha256 {
                debug!("Source touched but content unchanged: {}", self.source.display());
                entry.fingerprint = fingerprint;
                return Ok((entry.clone(), LoadOutcome::Memory));
            }
        }

        let (entry, outcome) = match self.reuse_snapshot(&fingerprint) {
            Some(entry) => (entry, LoadOutcome::Snapshot),
            None => (self.build(fingerprint)?, LoadOutcome::Rebuilt),
        };
        *guard = Some(entry.clone());
        Ok((entry, outcome))
    }

    /// Load the on-disk snapshot if its manifest matches the source and settings
    fn reuse_snapshot(&self, fingerprint: &SourceFingerprint) -> Option<CacheEntry> {
        let snapshot = self.snapshot_path();
        let manifest = match read_manifest(snapshot) {
            Ok(manifest) => manifest,
            Err(e) => {
                debug!("No usable manifest for {}: {}", snapshot.display(), e);
                return None;
            }
        };

        if manifest.source.sha256 != fingerprint.sha256 {
            debug!("Snapshot {} was built from other content", snapshot.display());
            return None;
        }
        if manifest.config_digest != self.config_digest {
            debug!("Snapshot {} was built with other settings", snapshot.display());
            return None;
        }

        match read_snapshot(snapshot) {
            Ok(table) if table.len() == manifest.rows => {
                info!("Reusing snapshot {}", snapshot.display());
                Some(CacheEntry {
                    fingerprint: fingerprint.clone(),
                    table: Arc::new(table),
                    report: Arc::new(manifest.report),
                })
            }
            Ok(table) => {
                warn!(
                    "Snapshot {} has {} rows but its manifest says {}; rebuilding",
                    snapshot.display(),
                    table.len(),
                    manifest.rows
                );
                None
            }
            Err(e) => {
                warn!("Snapshot {} unreadable ({}); rebuilding", snapshot.display(), e);
                None
            }
        }
    }

    fn build(&self, fingerprint: SourceFingerprint) -> Result<CacheEntry> {
        info!("Building table from {}", self.source.display());
        let mut pipeline = Pipeline::new(self.config.clone())?;
        if let Some(pb) = &self.progress {
            pipeline = pipeline.with_progress(pb.clone());
        }
        let output = pipeline.run_file(&self.source)?;

        self.writer.write(&output.table)?;
        let manifest = SnapshotManifest::new(
            fingerprint.clone(),
            self.config_digest.clone(),
            output.wide_rows,
            output.report,
        );
        self.writer.write_manifest(&manifest)?;

        // Serve rows in snapshot order so memory and disk hits agree
        let table = if self.config.snapshot.sort_by_line_then_station {
            output.table.sorted_by_line()
        } else {
            output.table
        };

        Ok(CacheEntry {
            fingerprint,
            table: Arc::new(table),
            report: Arc::new(manifest.report),
        })
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Option<CacheEntry>> {
        self.entry.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Option<CacheEntry>> {
        self.entry.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const SOURCE: &str = "a,b\n1,2\n";

    #[test]
    fn test_fingerprint_hashes_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("source.csv");
        fs::write(&path, SOURCE).unwrap();

        let fingerprint = SourceFingerprint::of(&path).unwrap();
        assert_eq!(fingerprint.len, SOURCE.len() as u64);
        assert_eq!(fingerprint.sha256.len(), 64);
        assert_eq!(
            fingerprint.sha256,
            format!("{:x}", Sha256::digest(SOURCE.as_bytes()))
        );

        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"3,4\n").unwrap();
        drop(file);
        assert_ne!(SourceFingerprint::of(&path).unwrap().sha256, fingerprint.sha256);
    }

    #[test]
    fn test_fingerprint_of_missing_source() {
        let err = SourceFingerprint::of(Path::new("/nonexistent/source.csv")).unwrap_err();
        assert!(matches!(err, CongestionError::SourceNotFound { .. }));
    }

    #[test]
    fn test_config_digest_tracks_derivation_only() {
        let base = PipelineConfig::default();
        let digest = config_digest(&base).unwrap();

        let recompressed = base
            .clone()
            .with_compression(crate::config::CompressionAlgorithm::Zstd);
        assert_eq!(config_digest(&recompressed).unwrap(), digest);

        let mut stricter = base.clone();
        stricter.derivation.thresholds.high_from = 120.0;
        assert_ne!(config_digest(&stricter).unwrap(), digest);
    }

    #[test]
    fn test_store_rejects_invalid_config() {
        let mut config = PipelineConfig::default();
        config.derivation.thresholds.medium_from = -1.0;
        let result = CongestionStore::new("a.csv".into(), "a.parquet".into(), config);
        assert!(matches!(result, Err(CongestionError::Configuration { .. })));
    }
}
