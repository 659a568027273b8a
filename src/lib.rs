#![doc = include_str!("../README.md")]

pub mod alerts;
pub mod classify;
pub mod config;
pub mod load;
pub mod metrics;
pub mod usd;
pub mod workbook;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use std::{
    io,
    path::{Path, PathBuf},
};

use crate::alerts::{Alert, Severity};
use crate::config::Config;
use crate::load::LoadFailure;

/// A fatal pipeline failure.
///
/// Only two things abort a run: having no usable input at all, and failing
/// to persist the workbook. Everything in between (an unreadable file, a
/// missing column, a mangled row) degrades and is reported in the
/// [`RunSummary`] instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not read source directory {dir:?}")]
    ReadDir {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no usable input: no CSV file in {dir:?} matched a report category")]
    NoInputFiles { dir: PathBuf },
    #[error("could not write workbook to {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },
}

/// Alert totals per severity.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct AlertCounts {
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
}

impl AlertCounts {
    fn tally(alerts: &[Alert]) -> Self {
        let mut counts = Self::default();
        for alert in alerts {
            match alert.severity {
                Severity::Critical => counts.critical += 1,
                Severity::Warning => counts.warning += 1,
                Severity::Info => counts.info += 1,
            }
        }
        counts
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.critical + self.warning + self.info
    }
}

/// What one pipeline run did: how much input it found and used, what it had
/// to skip or zero out, and where the workbook went.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    /// CSV files that matched a report category.
    pub files_matched: usize,
    /// Matched files that actually loaded.
    pub files_loaded: usize,
    /// CSV files whose names matched no category.
    pub files_skipped: Vec<PathBuf>,
    /// Matched files that failed to load (unreadable, missing columns).
    pub load_failures: Vec<LoadFailure>,
    pub rows_loaded: usize,
    /// Count of malformed fields zeroed out during loading.
    pub row_warnings: u32,
    pub products: usize,
    pub alerts: AlertCounts,
    pub output: PathBuf,
}

/// Runs the whole pipeline: discover CSVs under `source`, load and join
/// them, derive metrics and alerts, and write the dashboard workbook to
/// `output` (overwriting it if present).
///
/// This is the one operation front-ends call; the console binary is a thin
/// adapter over it, and a GUI would be another.
///
/// # Errors
///
/// Returns [`PipelineError`] when the source directory cannot be read, when
/// no CSV file matches any report category, or when the workbook cannot be
/// written. Per-file and per-row problems do not error; see the counts and
/// lists on [`RunSummary`].
pub fn run(source: &Path, output: &Path, config: &Config) -> Result<RunSummary, PipelineError> {
    info!("scanning {} for seller CSV exports", source.display());
    let files = classify::discover(source).map_err(|e| PipelineError::ReadDir {
        dir: source.to_path_buf(),
        source: e,
    })?;
    if files.matched_count() == 0 {
        return Err(PipelineError::NoInputFiles {
            dir: source.to_path_buf(),
        });
    }

    let tables = load::load_all(&files);
    let metrics = metrics::compute(&tables);
    let alerts = alerts::evaluate(&metrics, config);
    workbook::write(&metrics, &alerts, config, output).map_err(|e| PipelineError::Write {
        path: output.to_path_buf(),
        source: e,
    })?;

    let rows_loaded = tables.row_count();
    Ok(RunSummary {
        files_matched: files.matched_count(),
        files_loaded: tables.files_loaded,
        files_skipped: files.skipped,
        load_failures: tables.failures,
        rows_loaded,
        row_warnings: tables.row_warnings,
        products: metrics.totals.products,
        alerts: AlertCounts::tally(&alerts),
        output: output.to_path_buf(),
    })
}
