//! Transformation pipeline.
//!
//! Runs the stages in order: column normalization, time-label parsing,
//! value cleaning, reshape with derived features, validation. Structural
//! problems abort with a [`CongestionError`](crate::error::CongestionError);
//! cell-level and table-level findings travel with the result in the
//! [`ValidationReport`].

pub mod clean;
pub mod derive;
pub mod normalize;
pub mod reshape;
pub mod time_label;
pub mod validate;

#[cfg(test)]
pub mod tests;

use self::{
    clean::ValueCleaner,
    derive::FeatureDeriver,
    normalize::ColumnNormalizer,
    reshape::Reshaper,
    time_label::build_schedule,
    validate::{ValidationReport, Validator},
};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::models::{LongTable, RawTable};
use crate::reader::read_raw_table;

use indicatif::ProgressBar;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub table: LongTable,
    pub report: ValidationReport,
    /// Data rows in the source file
    pub wide_rows: usize,
    pub elapsed_ms: u128,
}

/// Wide CSV to long table transformer
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    progress: Option<ProgressBar>,
}

impl Pipeline {
    /// Create a pipeline, validating the configuration up front
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            progress: None,
        })
    }

    /// Report stage names on a progress spinner
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read the source file and transform it
    pub fn run_file(&self, path: &Path) -> Result<PipelineOutput> {
        self.stage(format!("Reading {}", path.display()));
        let raw = read_raw_table(path, &self.config.input)?;
        self.run_table(raw)
    }

    /// Transform an already-split table
    pub fn run_table(&self, raw: RawTable) -> Result<PipelineOutput> {
        let start = Instant::now();
        let wide_rows = raw.row_count();

        self.stage("Normalizing columns");
        let normalized = ColumnNormalizer::new(self.config.columns.clone()).normalize(raw)?;

        self.stage("Parsing time slots");
        let schedule = build_schedule(
            &normalized.time_headers,
            self.config.schedule.require_full_schedule,
        )?;

        self.stage("Cleaning values");
        let cleaned = ValueCleaner::new(&self.config.cleaning).clean_table(&normalized, &schedule)?;
        drop(normalized);

        self.stage("Reshaping");
        let expected_rows = Reshaper::new(&cleaned.wide).expected_rows();
        let table = FeatureDeriver::new(self.config.derivation.clone()).derive(&cleaned.wide);
        debug!(
            "Reshaped {} wide rows into {} long rows",
            wide_rows,
            table.len()
        );

        self.stage("Validating");
        let mut report = Validator.validate(&table, expected_rows);
        report.merge_cleaning(cleaned.parse_issues, cleaned.violations);

        let elapsed_ms = start.elapsed().as_millis();
        info!(
            "Pipeline produced {} rows from {} source rows in {}ms ({} parse issues, {} violations)",
            table.len(),
            wide_rows,
            elapsed_ms,
            report.parse_issues.len(),
            report.violations.len()
        );

        Ok(PipelineOutput {
            table,
            report,
            wide_rows,
            elapsed_ms,
        })
    }

    fn stage(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("Stage: {}", message);
        if let Some(pb) = &self.progress {
            pb.set_message(message);
        }
    }
}
