//! Routine Health Data Cleaning Pipeline
//!
//! A batch cleaning and aggregation library for routine health-facility
//! reporting data, built with Rust and Polars.
//!
//! # Overview
//!
//! Monthly per-facility extracts are read once per run and pushed through
//! two stages:
//!
//! - **Outlier Correction**: per reporting unit, values outside the Tukey
//!   fences (Q1 - 1.5*IQR, Q3 + 1.5*IQR) of the unit's own distribution
//!   are flagged and replaced by the unit median
//! - **Indicator Derivation**: age/pregnancy strata are rolled up into
//!   grouped sums, and safe ratios (e.g. test positivity) are appended
//!
//! Ingestion (multi-file CSV, header standardization) and aggregation
//! (admin-level monthly/yearly rollups, CSV export) wrap the two stages as
//! collaborators with no algorithmic content of their own.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use rhis_processing::{Aggregator, Pipeline, PipelineConfig, RecordReader};
//!
//! // Load monthly extracts from a directory
//! let df = RecordReader::new().read_path("data/".as_ref())?;
//!
//! // Clean and derive with the default malaria indicator set
//! let report = Pipeline::builder()
//!     .config(PipelineConfig::default())
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .process(df)?;
//!
//! println!("{} outliers replaced", report.summary.outliers_replaced);
//!
//! // Roll up to district level
//! let aggregator = Aggregator::new(
//!     vec!["adm1".into(), "adm2".into()],
//!     vec!["conf".into(), "test".into()],
//! );
//! let monthly = aggregator.monthly(&report.data)?;
//! ```
//!
//! # Missingness conventions
//!
//! Missing values never silently become zero during detection: they are
//! excluded from outlier statistics and are never flagged. Derivation uses
//! two deliberately different rules, preserved for compatibility with
//! downstream consumers: grouped sums treat missing sources as zero (a row
//! with every source missing sums to zero), while a ratio is missing
//! whenever its denominator is missing, zero or negative. See
//! [`indicators::safe_divide`].
//!
//! # Configuration
//!
//! Use [`PipelineConfig`] to declare the grouping key, target fields and
//! indicator definitions, either in code or from a JSON file:
//!
//! ```rust,ignore
//! use rhis_processing::{OutlierRule, PipelineConfig};
//!
//! let config = PipelineConfig::builder()
//!     .group_key("facility_id")
//!     .outlier_fields(["conf_u5", "conf_ov5"])
//!     .outlier_rule(OutlierRule::ReplaceMedian)
//!     .iqr_multiplier(1.5)
//!     .build()?;
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod indicators;
pub mod ingest;
pub mod pipeline;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use aggregate::{write_csv, Aggregator};
pub use config::{ConfigValidationError, OutlierRule, PipelineConfig, PipelineConfigBuilder};
pub use error::{ProcessingError, Result as ProcessingResult, ResultExt};
pub use indicators::{
    default_indicator_set, safe_divide, IndicatorDeriver, IndicatorSet, RatioIndicator,
    VariableGroup,
};
pub use ingest::{normalize_header, RecordReader};
pub use pipeline::{
    ClosureProgressReporter, OutlierCorrector, Pipeline, PipelineBuilder, ProcessingStage,
    ProgressReporter, ProgressUpdate, RunReport,
};
pub use types::{ActionType, FieldOutlierSummary, ProcessingAction, RunSummary};
