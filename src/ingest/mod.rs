//! Multi-file CSV ingestion and column standardization.
//!
//! Collaborator surface: reads monthly extracts from a file or directory,
//! normalizes headers, applies a configurable rename map, and stacks
//! everything into one frame. Schema consistency across files is the
//! exporting system's responsibility; a stacking failure is reported, not
//! patched.

use once_cell::sync::Lazy;
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{ProcessingError, Result, ResultExt};
use crate::utils::numeric_values;

static HEADER_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid header regex"));

/// Lowercase a header, trim it, and collapse separator runs to single
/// underscores.
pub fn normalize_header(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    let replaced = HEADER_SEPARATORS.replace_all(&lower, "_");
    replaced.trim_matches('_').to_string()
}

/// Reads monthly extracts into a single frame.
#[derive(Debug, Clone, Default)]
pub struct RecordReader {
    rename_map: HashMap<String, String>,
    recursive: bool,
}

impl RecordReader {
    /// Create a reader with no rename map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map normalized source-system column names to canonical names.
    pub fn with_rename_map(mut self, map: HashMap<String, String>) -> Self {
        self.rename_map = map;
        self
    }

    /// Search subdirectories when the input is a directory.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Read a CSV file, or every CSV file under a directory, into one
    /// frame with standardized column names.
    pub fn read_path(&self, path: &Path) -> Result<DataFrame> {
        let df = if path.is_dir() {
            let files = self.discover(path);
            if files.is_empty() {
                return Err(ProcessingError::NoInputFiles(path.display().to_string()));
            }
            info!("Reading {} files from {}", files.len(), path.display());

            let mut combined = self.standardize(read_file(&files[0])?)?;
            debug!("{}: {} rows", files[0].display(), combined.height());
            for file in &files[1..] {
                let df = self.standardize(read_file(file)?)?;
                debug!("{}: {} rows", file.display(), df.height());
                combined = combined.vstack(&df).map_err(|e| {
                    ProcessingError::IngestionFailed(format!(
                        "schema mismatch stacking '{}': {e}",
                        file.display()
                    ))
                })?;
            }
            combined
        } else {
            self.standardize(read_file(path)?)?
        };

        check_reporting_periods(&df)?;
        info!(
            rows = df.height(),
            columns = df.width(),
            "Ingestion complete"
        );
        Ok(df)
    }

    fn discover(&self, dir: &Path) -> Vec<PathBuf> {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        files
    }

    /// Normalize every header and apply the rename map.
    fn standardize(&self, mut df: DataFrame) -> Result<DataFrame> {
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        for name in names {
            let normalized = normalize_header(&name);
            let target = self
                .rename_map
                .get(&normalized)
                .cloned()
                .unwrap_or(normalized);
            if target != name {
                debug!("Renaming column '{}' to '{}'", name, target);
                df.rename(&name, target.as_str().into())?;
            }
        }
        Ok(df)
    }
}

fn read_file(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .context(format!("opening '{}'", path.display()))?
        .finish()
        .context(format!("reading '{}'", path.display()))
}

/// Warn about rows whose month falls outside the reporting calendar.
fn check_reporting_periods(df: &DataFrame) -> Result<()> {
    let Ok(month) = df.column("month") else {
        return Ok(());
    };
    let (values, _) = numeric_values(month.as_materialized_series())?;
    let invalid = values
        .iter()
        .filter(|v| v.is_some_and(|m| !(1.0..=12.0).contains(&m)))
        .count();
    if invalid > 0 {
        warn!("{} rows report a month outside 1..=12", invalid);
    }
    Ok(())
}
