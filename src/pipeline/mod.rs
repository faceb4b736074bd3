//! Pipeline module.
//!
//! The cleaning pipeline and its supporting components.

mod builder;
pub mod outliers;
pub mod progress;

pub use builder::{Pipeline, PipelineBuilder, RunReport};
pub use outliers::OutlierCorrector;
pub use progress::{ClosureProgressReporter, ProcessingStage, ProgressReporter, ProgressUpdate};
