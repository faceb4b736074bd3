//! Run summary and audit types.
//!
//! These types record what a cleaning run did to the data. They are
//! serializable so the CLI can persist them next to the exported datasets.

use serde::{Deserialize, Serialize};

/// Per-field result of a single outlier-correction pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldOutlierSummary {
    /// Target field name.
    pub field: String,
    /// Reporting units with at least one usable value.
    pub groups: usize,
    /// Reporting units whose values were all missing (no statistics, no flags).
    pub empty_groups: usize,
    /// Values flagged as outliers.
    pub flagged: usize,
    /// Flagged values replaced by their unit median.
    pub replaced: usize,
    /// Populated entries coerced to missing because they were not numeric.
    pub values_coerced: usize,
}

/// Summary of a full cleaning run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Total execution time in milliseconds.
    pub duration_ms: u64,
    /// Number of records processed.
    pub rows: usize,
    /// Total values flagged as outliers across all target fields.
    pub outliers_flagged: usize,
    /// Total flagged values replaced by their unit median.
    pub outliers_replaced: usize,
    /// Total populated entries coerced to missing across all stages.
    pub values_coerced: usize,
    /// Number of derived fields appended (groups plus ratios).
    pub derived_fields: usize,
    /// Per-field outlier results.
    pub field_summaries: Vec<FieldOutlierSummary>,
    /// Ordered audit trail of actions taken.
    pub actions: Vec<ProcessingAction>,
    /// Warnings generated during the run.
    pub warnings: Vec<String>,
}

impl RunSummary {
    /// Create a new empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of one outlier-correction pass.
    pub fn record_field(&mut self, field: FieldOutlierSummary) {
        self.outliers_flagged += field.flagged;
        self.outliers_replaced += field.replaced;
        self.values_coerced += field.values_coerced;
        self.field_summaries.push(field);
    }

    /// Add an action to the audit trail.
    pub fn add_action(&mut self, action: ProcessingAction) {
        self.actions.push(action);
    }

    /// Add a warning to the summary.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Fraction of checked values that were flagged, across all target
    /// fields. Zero when nothing was checked.
    pub fn flagged_rate(&self) -> f64 {
        let checked = self.rows * self.field_summaries.len();
        if checked == 0 {
            0.0
        } else {
            self.outliers_flagged as f64 / checked as f64
        }
    }
}

/// A single action taken during processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingAction {
    /// Type of action performed.
    pub action_type: ActionType,
    /// Target of the action (field name or "dataset").
    pub target: String,
    /// Human-readable description of the action.
    pub description: String,
    /// Additional details (e.g. counts, replacement values).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ProcessingAction {
    /// Create a new processing action.
    pub fn new(
        action_type: ActionType,
        target: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            action_type,
            target: target.into(),
            description: description.into(),
            details: None,
        }
    }

    /// Add details to the action.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Types of actions that can be taken during processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Out-of-range values were replaced or flagged in a field.
    OutlierCorrected,
    /// Derived indicator columns were appended.
    IndicatorDerived,
    /// Non-numeric entries were recorded as missing.
    ValuesCoerced,
}

impl ActionType {
    /// Get a human-readable display name for the action type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OutlierCorrected => "Outlier Corrected",
            Self::IndicatorDerived => "Indicator Derived",
            Self::ValuesCoerced => "Values Coerced",
        }
    }
}
