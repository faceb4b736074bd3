//! Administrative-level aggregation and CSV export.
//!
//! Collaborator surface: consumes the pipeline's output as read-only data,
//! sums declared count fields by administrative unit and calendar period
//! (nulls are excluded from the sums), and serializes frames to disk.
//! Duplicate (unit, period) rows are summed over, never deduplicated.

use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;

/// Aggregates count fields over administrative units and periods.
///
/// Value fields are an explicit, declared list; ratio indicators are not
/// summable and should be re-derived on the aggregate instead.
#[derive(Debug, Clone)]
pub struct Aggregator {
    admin_levels: Vec<String>,
    value_fields: Vec<String>,
}

impl Aggregator {
    /// Create an aggregator over the given admin-level columns and count
    /// fields.
    pub fn new(admin_levels: Vec<String>, value_fields: Vec<String>) -> Self {
        Self {
            admin_levels,
            value_fields,
        }
    }

    /// Sum value fields per admin unit and month.
    pub fn monthly(&self, df: &DataFrame) -> Result<DataFrame> {
        self.aggregate(df, &["year", "month"])
    }

    /// Sum value fields per admin unit and year.
    pub fn yearly(&self, df: &DataFrame) -> Result<DataFrame> {
        self.aggregate(df, &["year"])
    }

    fn aggregate(&self, df: &DataFrame, period: &[&str]) -> Result<DataFrame> {
        let mut key_names: Vec<String> = self.admin_levels.clone();
        key_names.extend(period.iter().map(|s| s.to_string()));

        let keys: Vec<Expr> = key_names.iter().map(|name| col(name.as_str())).collect();
        let sums: Vec<Expr> = self
            .value_fields
            .iter()
            .map(|field| col(field.as_str()).sum())
            .collect();

        let aggregated = df.clone().lazy().group_by(keys).agg(sums).collect()?;

        // Stable output order regardless of group_by internals.
        let by: Vec<PlSmallStr> = key_names
            .iter()
            .map(|name| PlSmallStr::from(name.as_str()))
            .collect();
        let aggregated = aggregated.sort(by, SortMultipleOptions::default())?;

        debug!(
            "Aggregated {} rows to {} ({:?})",
            df.height(),
            aggregated.height(),
            period
        );
        Ok(aggregated)
    }
}

/// Write a frame as CSV under `dir`, creating the directory if needed.
pub fn write_csv(df: &mut DataFrame, dir: &Path, file_name: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{file_name}.csv"));
    let mut file = fs::File::create(&path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(df)?;
    info!("Wrote {}", path.display());
    Ok(path)
}
