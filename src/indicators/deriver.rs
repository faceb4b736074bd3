//! Indicator derivation over a cleaned dataset.
//!
//! Derivation is a pure, row-wise transformation: original columns are
//! preserved and one new column is appended (or overwritten) per
//! definition, so re-deriving an already-derived frame is a no-op.
//!
//! Missingness follows two deliberately different conventions, preserved
//! for compatibility with downstream consumers:
//!
//! - group sums are "sums of available values": a missing source
//!   contributes zero, and a row where every source is missing sums to
//!   zero, not missing;
//! - ratios are undefined unless the denominator is present and strictly
//!   positive, so "no testing" stays distinguishable from "zero
//!   positivity".

use polars::prelude::*;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::Result;
use crate::indicators::definitions::{DerivedField, IndicatorSet};
use crate::utils::numeric_values;

/// Divide `numerator` by `denominator` if the division is meaningful.
///
/// Returns `Some(n / d)` when the denominator is present and strictly
/// positive, with a missing numerator treated as zero (numerators are
/// typically derived sums, which are never missing). Returns `None` when
/// the denominator is missing, zero or negative.
pub fn safe_divide(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match denominator {
        Some(d) if d > 0.0 => Some(numerator.unwrap_or(0.0) / d),
        _ => None,
    }
}

/// Applies an [`IndicatorSet`] to a dataset.
///
/// Construction validates the definitions against the schema and resolves
/// their evaluation order, so a deriver that exists can always run.
#[derive(Debug, Clone)]
pub struct IndicatorDeriver {
    order: Vec<DerivedField>,
}

impl IndicatorDeriver {
    /// Build a deriver for the given definitions and input schema.
    ///
    /// Fails fast on unknown source columns, duplicate derived names and
    /// dependency cycles, before any record is processed.
    pub fn new(set: &IndicatorSet, schema: &[String]) -> Result<Self> {
        set.validate(schema)?;
        Ok(Self {
            order: set.evaluation_order()?,
        })
    }

    /// Build a deriver validated against a frame's columns.
    pub fn from_frame(set: &IndicatorSet, df: &DataFrame) -> Result<Self> {
        let schema: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self::new(set, &schema)
    }

    /// Number of fields this deriver appends.
    pub fn derived_count(&self) -> usize {
        self.order.len()
    }

    /// Derive all configured fields, returning an extended copy of the
    /// frame and the number of source entries coerced to missing.
    pub fn derive(&self, df: &DataFrame) -> Result<(DataFrame, usize)> {
        let mut out = df.clone();
        let height = out.height();
        let mut columns: HashMap<String, Vec<Option<f64>>> = HashMap::new();
        let mut coerced_total = 0usize;

        for def in &self.order {
            for dep in def.dependencies() {
                if !columns.contains_key(dep) {
                    let col = out.column(dep)?;
                    let (values, coerced) = numeric_values(col.as_materialized_series())?;
                    if coerced > 0 {
                        warn!("{} non-numeric entries in '{}' treated as missing", coerced, dep);
                    }
                    coerced_total += coerced;
                    columns.insert(dep.to_string(), values);
                }
            }

            let values = match def {
                DerivedField::Group(group) => {
                    let mut sums = vec![0.0f64; height];
                    for source in &group.sources {
                        let source_values = &columns[source.as_str()];
                        for (sum, value) in sums.iter_mut().zip(source_values) {
                            if let Some(value) = value {
                                *sum += value;
                            }
                        }
                    }
                    sums.into_iter().map(Some).collect::<Vec<Option<f64>>>()
                }
                DerivedField::Ratio(ratio) => {
                    let numerators = &columns[ratio.numerator.as_str()];
                    let denominators = &columns[ratio.denominator.as_str()];
                    numerators
                        .iter()
                        .zip(denominators)
                        .map(|(n, d)| safe_divide(*n, *d))
                        .collect()
                }
            };

            debug!("Derived '{}'", def.name());
            out.with_column(Series::new(def.name().into(), values.as_slice()))?;
            columns.insert(def.name().to_string(), values);
        }

        Ok((out, coerced_total))
    }
}
