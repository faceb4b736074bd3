//! Configuration types for the cleaning pipeline.
//!
//! Field lists are declared explicitly and resolved once at configuration
//! time; nothing is selected by runtime type introspection. Configurations
//! round-trip through JSON so runs can be driven from files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ProcessingError, Result};
use crate::indicators::{default_indicator_set, IndicatorSet};

/// What to do with a value flagged as an outlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutlierRule {
    /// Replace the value with its reporting-unit median
    #[default]
    ReplaceMedian,
    /// Keep the raw value, only append the flag column
    FlagOnly,
}

/// Configuration for the cleaning pipeline.
///
/// Use [`PipelineConfig::builder()`] for a fluent setup, or deserialize
/// from JSON with [`PipelineConfig::from_json_file()`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Column identifying the reporting unit; partitions outlier statistics.
    /// Default: "hf_id"
    pub group_key: String,

    /// Numeric fields screened for outliers, each corrected independently.
    /// Default: the raw source fields of the indicator set
    pub outlier_fields: Vec<String>,

    /// What to do with flagged values.
    /// Default: ReplaceMedian
    pub outlier_rule: OutlierRule,

    /// Fence multiplier k in (Q1 - k*IQR, Q3 + k*IQR). Must be positive.
    /// Default: 1.5
    pub iqr_multiplier: f64,

    /// Whether the diagnostic `<field>_outlier` columns stay in the output.
    /// Default: false (they are transient diagnostics)
    pub keep_flags: bool,

    /// Variable groups and ratio indicators to derive.
    /// Default: the malaria routine-reporting set
    pub indicators: IndicatorSet,

    /// Administrative-level columns used by downstream aggregation.
    /// Default: ["adm1", "adm2"]
    pub admin_levels: Vec<String>,

    /// Output directory for cleaned data and aggregates.
    /// Default: "output"
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let indicators = default_indicator_set();
        Self {
            group_key: "hf_id".to_string(),
            outlier_fields: indicators.source_fields(),
            outlier_rule: OutlierRule::default(),
            iqr_multiplier: 1.5,
            keep_flags: false,
            indicators,
            admin_levels: vec!["adm1".to_string(), "adm2".to_string()],
            output_dir: PathBuf::from("output"),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Load and validate a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&raw)?;
        config
            .validate()
            .map_err(|e| ProcessingError::InvalidConfig(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration and return errors if invalid.
    ///
    /// Schema-dependent checks (unknown columns, cycles) happen later,
    /// when the pipeline sees the data.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if self.group_key.trim().is_empty() {
            return Err(ConfigValidationError::EmptyGroupKey);
        }

        if !self.iqr_multiplier.is_finite() || self.iqr_multiplier <= 0.0 {
            return Err(ConfigValidationError::InvalidMultiplier(
                self.iqr_multiplier,
            ));
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Group key must not be empty")]
    EmptyGroupKey,

    #[error("Invalid IQR multiplier: {0} (must be a positive, finite number)")]
    InvalidMultiplier(f64),
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    group_key: Option<String>,
    outlier_fields: Option<Vec<String>>,
    outlier_rule: Option<OutlierRule>,
    iqr_multiplier: Option<f64>,
    keep_flags: Option<bool>,
    indicators: Option<IndicatorSet>,
    admin_levels: Option<Vec<String>>,
    output_dir: Option<PathBuf>,
}

impl PipelineConfigBuilder {
    /// Set the reporting-unit column used to partition outlier statistics.
    pub fn group_key(mut self, key: impl Into<String>) -> Self {
        self.group_key = Some(key.into());
        self
    }

    /// Set the fields screened for outliers.
    pub fn outlier_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outlier_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Set the rule applied to flagged values.
    pub fn outlier_rule(mut self, rule: OutlierRule) -> Self {
        self.outlier_rule = Some(rule);
        self
    }

    /// Set the fence multiplier.
    pub fn iqr_multiplier(mut self, multiplier: f64) -> Self {
        self.iqr_multiplier = Some(multiplier);
        self
    }

    /// Keep or drop the diagnostic flag columns in the output.
    pub fn keep_flags(mut self, keep: bool) -> Self {
        self.keep_flags = Some(keep);
        self
    }

    /// Set the indicator definitions.
    pub fn indicators(mut self, set: IndicatorSet) -> Self {
        self.indicators = Some(set);
        self
    }

    /// Set the administrative-level columns for aggregation.
    pub fn admin_levels<I, S>(mut self, levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.admin_levels = Some(levels.into_iter().map(Into::into).collect());
        self
    }

    /// Set the output directory.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> std::result::Result<PipelineConfig, ConfigValidationError> {
        let defaults = PipelineConfig::default();
        let indicators = self.indicators.unwrap_or(defaults.indicators);
        let outlier_fields = self
            .outlier_fields
            .unwrap_or_else(|| indicators.source_fields());

        let config = PipelineConfig {
            group_key: self.group_key.unwrap_or(defaults.group_key),
            outlier_fields,
            outlier_rule: self.outlier_rule.unwrap_or_default(),
            iqr_multiplier: self.iqr_multiplier.unwrap_or(1.5),
            keep_flags: self.keep_flags.unwrap_or(false),
            indicators,
            admin_levels: self.admin_levels.unwrap_or(defaults.admin_levels),
            output_dir: self.output_dir.unwrap_or(defaults.output_dir),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.group_key, "hf_id");
        assert_eq!(config.iqr_multiplier, 1.5);
        assert_eq!(config.outlier_rule, OutlierRule::ReplaceMedian);
        assert!(!config.keep_flags);
        // Outlier targets default to the raw sources of the indicator set.
        assert!(config.outlier_fields.contains(&"conf_u5".to_string()));
        assert!(!config.outlier_fields.contains(&"conf".to_string()));
    }

    #[test]
    fn test_builder_custom_values() {
        let config = PipelineConfig::builder()
            .group_key("facility")
            .outlier_fields(["conf", "test"])
            .outlier_rule(OutlierRule::FlagOnly)
            .iqr_multiplier(3.0)
            .keep_flags(true)
            .admin_levels(["region"])
            .build()
            .unwrap();

        assert_eq!(config.group_key, "facility");
        assert_eq!(config.outlier_fields, vec!["conf", "test"]);
        assert_eq!(config.outlier_rule, OutlierRule::FlagOnly);
        assert_eq!(config.iqr_multiplier, 3.0);
        assert!(config.keep_flags);
        assert_eq!(config.admin_levels, vec!["region"]);
    }

    #[test]
    fn test_validation_rejects_empty_group_key() {
        let result = PipelineConfig::builder().group_key("  ").build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::EmptyGroupKey
        ));
    }

    #[test]
    fn test_validation_rejects_bad_multiplier() {
        let result = PipelineConfig::builder().iqr_multiplier(0.0).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidMultiplier(_)
        ));

        let result = PipelineConfig::builder().iqr_multiplier(f64::NAN).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.group_key, back.group_key);
        assert_eq!(config.outlier_fields, back.outlier_fields);
        assert_eq!(config.indicators, back.indicators);
    }

    #[test]
    fn test_config_from_json() {
        // The shape a run configuration file takes.
        let json = r#"{
            "group_key": "facility_id",
            "outlier_fields": ["conf_u5", "conf_ov5"],
            "outlier_rule": "FlagOnly",
            "iqr_multiplier": 2.0,
            "keep_flags": true,
            "indicators": {
                "groups": [{"name": "conf", "sources": ["conf_u5", "conf_ov5"]}],
                "ratios": []
            },
            "admin_levels": ["district"],
            "output_dir": "cleaned"
        }"#;

        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.group_key, "facility_id");
        assert_eq!(config.outlier_rule, OutlierRule::FlagOnly);
        assert_eq!(config.iqr_multiplier, 2.0);
        assert_eq!(config.indicators.groups.len(), 1);
        assert_eq!(config.output_dir.to_str().unwrap(), "cleaned");
    }
}
