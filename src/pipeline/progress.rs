//! Progress reporting for the cleaning pipeline.
//!
//! The pipeline is a synchronous batch transformation, but it may run on a
//! background thread with a UI or log consumer attached; updates carry the
//! current stage plus weighted overall progress.

use serde::{Deserialize, Serialize};

/// Stages of the cleaning pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    /// Pipeline is initializing
    Initializing,
    /// Validating indicator definitions and target fields against the schema
    SchemaValidation,
    /// Detecting and correcting outliers per reporting unit
    OutlierCorrection,
    /// Deriving grouped sums and ratio indicators
    IndicatorDerivation,
    /// Pipeline completed successfully
    Complete,
    /// Pipeline failed with an error
    Failed,
}

impl ProcessingStage {
    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::SchemaValidation => "Validating Schema",
            Self::OutlierCorrection => "Correcting Outliers",
            Self::IndicatorDerivation => "Deriving Indicators",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    /// Weight of this stage in the overall pipeline (0.0 - 1.0). The main
    /// processing stages sum to ~1.0; terminal states carry no weight.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Initializing => 0.05,
            Self::SchemaValidation => 0.10,
            Self::OutlierCorrection => 0.50,
            Self::IndicatorDerivation => 0.35,
            Self::Complete => 0.0,
            Self::Failed => 0.0,
        }
    }

    /// Cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Initializing => 0.0,
            Self::SchemaValidation => 0.05,
            Self::OutlierCorrection => 0.15,
            Self::IndicatorDerivation => 0.65,
            Self::Complete => 1.0,
            Self::Failed => 0.0,
        }
    }
}

/// A progress update emitted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Current pipeline stage
    pub stage: ProcessingStage,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    /// Human-readable message describing current activity
    pub message: String,

    /// Items processed in the current stage (for iterative operations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    /// Total items in the current stage (for iterative operations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    /// Creates a new progress update for a stage.
    pub fn new(stage: ProcessingStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    /// Creates a new progress update with item counts.
    pub fn with_items(
        stage: ProcessingStage,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let stage_progress = if total > 0 {
            current as f32 / total as f32
        } else {
            0.0
        };
        let mut update = Self::new(stage, stage_progress, message);
        update.items_processed = Some(current);
        update.items_total = Some(total);
        update
    }

    /// Creates a completion progress update.
    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            stage: ProcessingStage::Complete,
            progress: 1.0,
            stage_progress: 1.0,
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    /// Creates a failed progress update.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            stage: ProcessingStage::Failed,
            progress: 0.0,
            stage_progress: 0.0,
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }
}

/// Trait for receiving progress updates during processing.
///
/// Implementations must be `Send + Sync` so the pipeline can run on a
/// background thread. Updates may be frequent (once per target field);
/// implementations should be efficient and non-blocking.
pub trait ProgressReporter: Send + Sync {
    /// Called when progress is made during processing.
    fn report(&self, update: ProgressUpdate);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    /// Creates a new closure-based progress reporter.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);
