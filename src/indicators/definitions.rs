//! Indicator definitions: variable groups and ratio indicators.
//!
//! Definitions are static configuration, independent of any particular
//! dataset. They are validated once against the input schema before any
//! record is processed: an unknown source column or a dependency cycle is
//! a fatal configuration error, never a per-record failure.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{ProcessingError, Result};

/// A named list of source fields summed row-wise into one derived field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableGroup {
    /// Name of the derived field.
    pub name: String,
    /// Source fields contributing to the sum.
    pub sources: Vec<String>,
}

impl VariableGroup {
    /// Create a new variable group.
    pub fn new(name: impl Into<String>, sources: &[&str]) -> Self {
        Self {
            name: name.into(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A derived ratio of two fields, raw or derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioIndicator {
    /// Name of the derived field.
    pub name: String,
    /// Numerator field; a missing value contributes zero.
    pub numerator: String,
    /// Denominator field; the result is missing unless this is strictly
    /// positive.
    pub denominator: String,
}

impl RatioIndicator {
    /// Create a new ratio indicator.
    pub fn new(
        name: impl Into<String>,
        numerator: impl Into<String>,
        denominator: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            numerator: numerator.into(),
            denominator: denominator.into(),
        }
    }
}

/// The full set of indicator definitions for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    /// Row-wise sum groups.
    #[serde(default)]
    pub groups: Vec<VariableGroup>,
    /// Safe-division ratios.
    #[serde(default)]
    pub ratios: Vec<RatioIndicator>,
}

/// One definition in resolved evaluation order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DerivedField {
    Group(VariableGroup),
    Ratio(RatioIndicator),
}

impl DerivedField {
    /// Name of the field this definition produces.
    pub(crate) fn name(&self) -> &str {
        match self {
            Self::Group(group) => &group.name,
            Self::Ratio(ratio) => &ratio.name,
        }
    }

    /// Fields this definition reads, raw or derived.
    pub(crate) fn dependencies(&self) -> Vec<&str> {
        match self {
            Self::Group(group) => group.sources.iter().map(String::as_str).collect(),
            Self::Ratio(ratio) => vec![&ratio.numerator, &ratio.denominator],
        }
    }
}

impl IndicatorSet {
    /// Check whether the set defines anything at all.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.ratios.is_empty()
    }

    /// Names of all derived fields, in declaration order.
    pub fn derived_names(&self) -> Vec<&str> {
        self.groups
            .iter()
            .map(|g| g.name.as_str())
            .chain(self.ratios.iter().map(|r| r.name.as_str()))
            .collect()
    }

    /// Raw source fields the set reads from the input data, in declaration
    /// order without duplicates. Dependencies satisfied by another
    /// definition in the set are excluded.
    pub fn source_fields(&self) -> Vec<String> {
        let derived: HashSet<&str> = self.derived_names().into_iter().collect();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for def in self.definitions() {
            for dep in def.dependencies() {
                if !derived.contains(dep) && seen.insert(dep.to_string()) {
                    out.push(dep.to_string());
                }
            }
        }
        out
    }

    /// Validate the definitions against the input schema.
    ///
    /// Fails on duplicate derived names, on a dependency that is neither a
    /// schema column nor another derived field, and on dependency cycles.
    pub fn validate(&self, schema: &[String]) -> Result<()> {
        let mut names = HashSet::new();
        for name in self.derived_names() {
            if !names.insert(name) {
                return Err(ProcessingError::InvalidConfig(format!(
                    "derived field '{name}' is defined more than once"
                )));
            }
        }

        let columns: HashSet<&str> = schema.iter().map(String::as_str).collect();
        for def in self.definitions() {
            for dep in def.dependencies() {
                if !columns.contains(dep) && !names.contains(dep) {
                    return Err(ProcessingError::ColumnNotFound(dep.to_string()));
                }
            }
        }

        self.evaluation_order().map(|_| ())
    }

    /// Resolve a deterministic evaluation order over the definitions.
    ///
    /// Every definition is scheduled after the definitions it depends on;
    /// dependencies on raw columns impose no ordering. Declaration order is
    /// preserved among definitions that are ready at the same time. A cycle
    /// is a fatal configuration error naming the unresolvable definitions.
    pub(crate) fn evaluation_order(&self) -> Result<Vec<DerivedField>> {
        let mut remaining: Vec<DerivedField> = self.definitions();
        let derived: HashSet<String> = remaining
            .iter()
            .map(|def| def.name().to_string())
            .collect();

        let mut available: HashSet<String> = HashSet::new();
        let mut order = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let ready = remaining.iter().position(|def| {
                def.dependencies()
                    .iter()
                    .all(|dep| !derived.contains(*dep) || available.contains(*dep))
            });
            match ready {
                Some(idx) => {
                    let def = remaining.remove(idx);
                    available.insert(def.name().to_string());
                    order.push(def);
                }
                None => {
                    let stuck: Vec<&str> = remaining.iter().map(|def| def.name()).collect();
                    return Err(ProcessingError::CyclicDefinition(stuck.join(", ")));
                }
            }
        }

        Ok(order)
    }

    fn definitions(&self) -> Vec<DerivedField> {
        self.groups
            .iter()
            .cloned()
            .map(DerivedField::Group)
            .chain(self.ratios.iter().cloned().map(DerivedField::Ratio))
            .collect()
    }
}

static DEFAULT_SET: Lazy<IndicatorSet> = Lazy::new(|| IndicatorSet {
    groups: vec![
        VariableGroup::new("allout", &["allout_u5", "allout_ov5"]),
        VariableGroup::new("susp", &["susp_u5", "susp_ov5", "susp_preg"]),
        VariableGroup::new("test", &["test_u5", "test_ov5", "test_preg"]),
        VariableGroup::new("conf", &["conf_u5", "conf_ov5", "conf_preg"]),
        VariableGroup::new("maltreat", &["maltreat_u5", "maltreat_ov5", "maltreat_preg"]),
    ],
    ratios: vec![RatioIndicator::new("test_positivity", "conf", "test")],
});

/// The conventional indicator set for malaria routine reporting: age and
/// pregnancy strata rolled up into all-cause outpatient, suspected, tested,
/// confirmed and treated totals, plus test positivity.
pub fn default_indicator_set() -> IndicatorSet {
    DEFAULT_SET.clone()
}
