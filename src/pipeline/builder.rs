//! Main cleaning pipeline module.
//!
//! This module provides the core `Pipeline` struct and builder for
//! orchestrating a cleaning run: schema validation, per-unit outlier
//! correction, then indicator derivation.

use polars::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::config::PipelineConfig;
use crate::error::{ProcessingError, Result};
use crate::indicators::IndicatorDeriver;
use crate::pipeline::outliers::{OutlierCorrector, FLAG_SUFFIX};
use crate::pipeline::progress::{
    ClosureProgressReporter, ProcessingStage, ProgressReporter, ProgressUpdate,
};
use crate::types::{ActionType, ProcessingAction, RunSummary};

/// Result of a cleaning run.
#[derive(Debug)]
pub struct RunReport {
    /// The corrected and extended dataset, rows in input order.
    pub data: DataFrame,
    /// Counts and audit trail of what the run did.
    pub summary: RunSummary,
    /// Ordered human-readable processing steps.
    pub steps: Vec<String>,
}

/// The cleaning pipeline.
///
/// Use [`Pipeline::builder()`] to create a pipeline with custom
/// configuration.
///
/// # Example
///
/// ```rust,ignore
/// use rhis_processing::{Pipeline, PipelineConfig};
///
/// let report = Pipeline::builder()
///     .config(PipelineConfig::default())
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .process(df)?;
///
/// println!("{} outliers replaced", report.summary.outliers_replaced);
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

// The pipeline may run on a background thread.
static_assertions::assert_impl_all!(Pipeline: Send);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// The configuration this pipeline runs with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process a dataset through the cleaning pipeline.
    ///
    /// Configuration errors (unknown columns, cyclic indicator
    /// definitions) fail the run before any record is touched. Per-value
    /// problems never fail the run; they are reported in the summary.
    pub fn process(&self, df: DataFrame) -> Result<RunReport> {
        match self.process_internal(df) {
            Ok(report) => {
                self.report_progress(ProgressUpdate::complete("Cleaning run complete"));
                Ok(report)
            }
            Err(e) => {
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    /// Report progress if a reporter is configured.
    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn process_internal(&self, df: DataFrame) -> Result<RunReport> {
        let start_time = Instant::now();

        info!(
            rows = df.height(),
            columns = df.width(),
            "Starting cleaning run"
        );
        self.report_progress(ProgressUpdate::new(
            ProcessingStage::Initializing,
            0.0,
            "Starting cleaning run",
        ));

        let mut summary = RunSummary::new();
        summary.rows = df.height();
        let mut steps: Vec<String> = Vec::new();

        // Step 1: validate everything against the schema before touching
        // any record.
        self.report_progress(ProgressUpdate::new(
            ProcessingStage::SchemaValidation,
            0.0,
            "Validating configuration against input schema",
        ));

        let schema: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        if !schema.contains(&self.config.group_key) {
            return Err(ProcessingError::ColumnNotFound(self.config.group_key.clone()));
        }
        for field in &self.config.outlier_fields {
            if !schema.contains(field) {
                return Err(ProcessingError::ColumnNotFound(field.clone()));
            }
        }
        let deriver = IndicatorDeriver::new(&self.config.indicators, &schema)?;
        steps.push(format!(
            "Validated {} outlier targets and {} indicator definitions against the input schema",
            self.config.outlier_fields.len(),
            deriver.derived_count(),
        ));

        // Step 2: outlier correction, one target field at a time.
        let corrector = OutlierCorrector::new(&self.config.group_key)
            .with_multiplier(self.config.iqr_multiplier)
            .with_rule(self.config.outlier_rule);

        let total_fields = self.config.outlier_fields.len();
        let mut df = df;
        for (index, field) in self.config.outlier_fields.iter().enumerate() {
            self.report_progress(ProgressUpdate::with_items(
                ProcessingStage::OutlierCorrection,
                index,
                total_fields,
                format!("Screening '{field}'"),
            ));

            let (corrected, field_summary) = corrector.correct_field(&df, field)?;
            df = corrected;

            if field_summary.flagged > 0 {
                steps.push(format!(
                    "Replaced {} out-of-range values in '{}' across {} reporting units",
                    field_summary.replaced, field, field_summary.groups
                ));
                summary.add_action(
                    ProcessingAction::new(
                        ActionType::OutlierCorrected,
                        field,
                        format!("Flagged {} values", field_summary.flagged),
                    )
                    .with_details(format!(
                        "fence multiplier {}, {} units with statistics, {} without",
                        self.config.iqr_multiplier,
                        field_summary.groups,
                        field_summary.empty_groups
                    )),
                );
            } else {
                debug!("No outliers in '{}'", field);
            }
            if field_summary.values_coerced > 0 {
                summary.add_warning(format!(
                    "{} non-numeric entries in '{}' treated as missing",
                    field_summary.values_coerced, field
                ));
            }
            summary.record_field(field_summary);
        }

        // Step 3: derive grouped sums and ratios.
        self.report_progress(ProgressUpdate::new(
            ProcessingStage::IndicatorDerivation,
            0.0,
            "Deriving indicators",
        ));

        let (mut df, coerced) = deriver.derive(&df)?;
        summary.values_coerced += coerced;
        summary.derived_fields = deriver.derived_count();
        if coerced > 0 {
            summary.add_warning(format!(
                "{coerced} non-numeric source entries treated as missing during derivation"
            ));
            summary.add_action(ProcessingAction::new(
                ActionType::ValuesCoerced,
                "dataset",
                format!("{coerced} source entries coerced to missing"),
            ));
        }
        steps.push(format!(
            "Derived {} indicator fields",
            deriver.derived_count()
        ));
        summary.add_action(ProcessingAction::new(
            ActionType::IndicatorDerived,
            "dataset",
            format!("Appended {} derived fields", deriver.derived_count()),
        ));

        // The flag columns are transient diagnostics unless configured to
        // stay in the output.
        if !self.config.keep_flags {
            for field in &self.config.outlier_fields {
                df = df.drop(&format!("{field}{FLAG_SUFFIX}"))?;
            }
            steps.push("Dropped transient outlier flag columns".to_string());
        }

        summary.duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            outliers_replaced = summary.outliers_replaced,
            derived_fields = summary.derived_fields,
            duration_ms = summary.duration_ms,
            "Cleaning run complete"
        );

        Ok(RunReport {
            data: df,
            summary,
            steps,
        })
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a progress reporter.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a closure to receive progress updates.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Build the pipeline, validating the configuration.
    pub fn build(self) -> Result<Pipeline> {
        let config = self.config.unwrap_or_default();
        config
            .validate()
            .map_err(|e| ProcessingError::InvalidConfig(e.to_string()))?;
        Ok(Pipeline {
            config,
            progress_reporter: self.progress_reporter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{IndicatorSet, RatioIndicator, VariableGroup};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_frame() -> DataFrame {
        df![
            "hf_id" => ["A", "A", "A", "A", "A", "B"],
            "year" => [2023, 2023, 2023, 2023, 2023, 2023],
            "month" => [1, 2, 3, 4, 5, 1],
            "conf_u5" => [10.0, 12.0, 11.0, 9.0, 100.0, 7.0],
            "test_u5" => [20.0, 25.0, 22.0, 18.0, 21.0, 15.0],
        ]
        .unwrap()
    }

    fn sample_config() -> PipelineConfig {
        PipelineConfig::builder()
            .outlier_fields(["conf_u5"])
            .indicators(IndicatorSet {
                groups: vec![
                    VariableGroup::new("conf", &["conf_u5"]),
                    VariableGroup::new("test", &["test_u5"]),
                ],
                ratios: vec![RatioIndicator::new("test_positivity", "conf", "test")],
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_process_corrects_and_derives() {
        let pipeline = Pipeline::builder()
            .config(sample_config())
            .build()
            .unwrap();
        let report = pipeline.process(sample_frame()).unwrap();

        assert_eq!(report.summary.rows, 6);
        assert_eq!(report.summary.outliers_flagged, 1);
        assert_eq!(report.summary.outliers_replaced, 1);
        assert_eq!(report.summary.derived_fields, 3);

        let conf: Vec<Option<f64>> = report
            .data
            .column("conf")
            .unwrap()
            .as_materialized_series()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        // The implausible 100 became the unit median of 11.
        assert_eq!(conf[4], Some(11.0));
        // Facility B's single observation is untouched.
        assert_eq!(conf[5], Some(7.0));
    }

    #[test]
    fn test_flag_columns_dropped_by_default() {
        let pipeline = Pipeline::builder()
            .config(sample_config())
            .build()
            .unwrap();
        let report = pipeline.process(sample_frame()).unwrap();
        assert!(report.data.column("conf_u5_outlier").is_err());
    }

    #[test]
    fn test_flag_columns_kept_when_configured() {
        let config = PipelineConfig::builder()
            .outlier_fields(["conf_u5"])
            .indicators(IndicatorSet::default())
            .keep_flags(true)
            .build()
            .unwrap();
        let pipeline = Pipeline::builder().config(config).build().unwrap();
        let report = pipeline.process(sample_frame()).unwrap();
        assert!(report.data.column("conf_u5_outlier").is_ok());
    }

    #[test]
    fn test_missing_group_key_fails_fast() {
        let config = PipelineConfig::builder()
            .group_key("nonexistent")
            .outlier_fields(["conf_u5"])
            .indicators(IndicatorSet::default())
            .build()
            .unwrap();
        let pipeline = Pipeline::builder().config(config).build().unwrap();
        let err = pipeline.process(sample_frame()).unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }

    #[test]
    fn test_missing_outlier_target_fails_fast() {
        let config = PipelineConfig::builder()
            .outlier_fields(["not_a_column"])
            .indicators(IndicatorSet::default())
            .build()
            .unwrap();
        let pipeline = Pipeline::builder().config(config).build().unwrap();
        let err = pipeline.process(sample_frame()).unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }

    #[test]
    fn test_progress_reaches_completion() {
        let updates = Arc::new(AtomicUsize::new(0));
        let updates_clone = updates.clone();
        let saw_complete = Arc::new(AtomicUsize::new(0));
        let saw_complete_clone = saw_complete.clone();

        let pipeline = Pipeline::builder()
            .config(sample_config())
            .on_progress(move |update| {
                updates_clone.fetch_add(1, Ordering::SeqCst);
                if update.stage == ProcessingStage::Complete {
                    saw_complete_clone.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build()
            .unwrap();

        pipeline.process(sample_frame()).unwrap();
        assert!(updates.load(Ordering::SeqCst) >= 3);
        assert_eq!(saw_complete.load(Ordering::SeqCst), 1);
    }
}
