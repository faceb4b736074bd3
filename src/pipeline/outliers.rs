//! Group-wise outlier detection and correction.
//!
//! For each target field, records are partitioned by reporting unit and a
//! value is flagged when it falls strictly outside the Tukey fences of its
//! own partition (Q1 - k*IQR, Q3 + k*IQR). Flagged values are replaced by
//! the partition median. Quartiles use linear interpolation between order
//! statistics (the "type 7" convention: position p * (n - 1) over the
//! sorted sample); other conventions produce different fences, so the
//! choice is pinned by tests.
//!
//! Correction returns a new frame and never mutates its input. Missing
//! values are excluded from the statistics and are never flagged, and a
//! partition with no usable values corrects nothing.

use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::config::OutlierRule;
use crate::error::{ProcessingError, Result};
use crate::types::FieldOutlierSummary;
use crate::utils::{numeric_values, string_values};

/// Suffix of the diagnostic flag column appended per corrected field.
pub const FLAG_SUFFIX: &str = "_outlier";

/// Quantile of a sorted, non-empty sample by linear interpolation between
/// order statistics.
pub(crate) fn quantile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let position = p * (sorted.len() - 1) as f64;
    let below = position.floor() as usize;
    let above = position.ceil() as usize;
    if below == above {
        return Some(sorted[below]);
    }
    let fraction = position - below as f64;
    Some(sorted[below] + (sorted[above] - sorted[below]) * fraction)
}

/// Robust statistics of one partition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GroupStats {
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl GroupStats {
    /// Compute statistics from a sorted, non-empty sample.
    fn from_sorted(sorted: &[f64], multiplier: f64) -> Option<Self> {
        let q1 = quantile_sorted(sorted, 0.25)?;
        let median = quantile_sorted(sorted, 0.5)?;
        let q3 = quantile_sorted(sorted, 0.75)?;
        let iqr = q3 - q1;
        Some(Self {
            median,
            q1,
            q3,
            lower: q1 - multiplier * iqr,
            upper: q3 + multiplier * iqr,
        })
    }

    /// Whether a value lies strictly outside the fences.
    fn is_outlier(&self, value: f64) -> bool {
        value > self.upper || value < self.lower
    }
}

/// Detects and corrects out-of-range values per reporting unit.
#[derive(Debug, Clone)]
pub struct OutlierCorrector {
    group_key: String,
    multiplier: f64,
    rule: OutlierRule,
}

impl OutlierCorrector {
    /// Create a corrector partitioning by the given key, with the standard
    /// 1.5 fence multiplier and median replacement.
    pub fn new(group_key: impl Into<String>) -> Self {
        Self {
            group_key: group_key.into(),
            multiplier: 1.5,
            rule: OutlierRule::default(),
        }
    }

    /// Override the fence multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Override the correction rule.
    pub fn with_rule(mut self, rule: OutlierRule) -> Self {
        self.rule = rule;
        self
    }

    /// Correct one target field.
    ///
    /// Returns a copy of the frame where flagged values are replaced by
    /// their partition median (unless the rule is flag-only), with a
    /// boolean `<field>_outlier` column appended. Rows with a missing
    /// group key belong to no partition and pass through unchanged.
    pub fn correct_field(
        &self,
        df: &DataFrame,
        field: &str,
    ) -> Result<(DataFrame, FieldOutlierSummary)> {
        let key_column = df
            .column(&self.group_key)
            .map_err(|_| ProcessingError::ColumnNotFound(self.group_key.clone()))?;
        let keys = string_values(key_column.as_materialized_series())?;

        let value_column = df
            .column(field)
            .map_err(|_| ProcessingError::ColumnNotFound(field.to_string()))?;
        let (values, values_coerced) = numeric_values(value_column.as_materialized_series())?;
        if values_coerced > 0 {
            warn!(
                "{} non-numeric entries in '{}' treated as missing",
                values_coerced, field
            );
        }

        // First pass gathers partition membership.
        let mut distinct_keys: HashSet<&str> = HashSet::new();
        let mut partitions: HashMap<&str, Vec<f64>> = HashMap::new();
        for (key, value) in keys.iter().zip(values.iter()) {
            if let Some(key) = key.as_deref() {
                distinct_keys.insert(key);
                if let Some(value) = value {
                    partitions.entry(key).or_default().push(*value);
                }
            }
        }

        let empty_groups = distinct_keys.len() - partitions.len();
        let mut stats: HashMap<&str, GroupStats> = HashMap::with_capacity(partitions.len());
        for (key, mut sample) in partitions {
            sample.sort_by(|a, b| a.total_cmp(b));
            if let Some(group_stats) = GroupStats::from_sorted(&sample, self.multiplier) {
                stats.insert(key, group_stats);
            }
        }

        // Second pass applies the fences.
        let mut corrected: Vec<Option<f64>> = Vec::with_capacity(values.len());
        let mut flags: Vec<bool> = Vec::with_capacity(values.len());
        let mut flagged = 0usize;
        let mut replaced = 0usize;
        for (key, value) in keys.iter().zip(values.iter()) {
            let group_stats = key.as_deref().and_then(|k| stats.get(k));
            match (value, group_stats) {
                (Some(v), Some(s)) if s.is_outlier(*v) => {
                    flags.push(true);
                    flagged += 1;
                    match self.rule {
                        OutlierRule::ReplaceMedian => {
                            corrected.push(Some(s.median));
                            replaced += 1;
                        }
                        OutlierRule::FlagOnly => corrected.push(Some(*v)),
                    }
                }
                _ => {
                    flags.push(false);
                    corrected.push(*value);
                }
            }
        }

        debug!(
            "'{}': {} of {} values flagged across {} reporting units",
            field,
            flagged,
            values.len(),
            stats.len()
        );

        let mut out = df.clone();
        out.replace(field, Series::new(field.into(), corrected.as_slice()))?;
        let flag_name = format!("{field}{FLAG_SUFFIX}");
        out.with_column(
            BooleanChunked::from_slice(flag_name.as_str().into(), &flags).into_series(),
        )?;

        let summary = FieldOutlierSummary {
            field: field.to_string(),
            groups: stats.len(),
            empty_groups,
            flagged,
            replaced,
            values_coerced,
        };
        Ok((out, summary))
    }
}
