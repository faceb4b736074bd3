//! Integration tests for the cleaning pipeline.
//!
//! These tests verify end-to-end behavior over fixture extracts: outlier
//! replacement per reporting unit, indicator derivation, aggregation and
//! export.

use polars::prelude::*;
use pretty_assertions::assert_eq;
use rhis_processing::{
    write_csv, Aggregator, IndicatorSet, Pipeline, PipelineConfig, RatioIndicator, RecordReader,
    VariableGroup,
};
use std::path::PathBuf;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_fixture(filename: &str) -> DataFrame {
    RecordReader::new()
        .read_path(&fixtures_path().join(filename))
        .expect("Failed to read fixture")
}

fn fixture_indicator_set() -> IndicatorSet {
    IndicatorSet {
        groups: vec![
            VariableGroup::new("test", &["test_u5", "test_ov5", "test_preg"]),
            VariableGroup::new("conf", &["conf_u5", "conf_ov5", "conf_preg"]),
        ],
        ratios: vec![RatioIndicator::new("test_positivity", "conf", "test")],
    }
}

fn fixture_config() -> PipelineConfig {
    PipelineConfig::builder()
        .outlier_fields([
            "test_u5", "test_ov5", "test_preg", "conf_u5", "conf_ov5", "conf_preg",
        ])
        .indicators(fixture_indicator_set())
        .build()
        .unwrap()
}

fn column_f64(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .cast(&DataType::Float64)
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .collect()
}

// ============================================================================
// End-to-End Cleaning
// ============================================================================

#[test]
fn test_end_to_end_outlier_replacement() {
    let df = load_fixture("facility_monthly.csv");

    let report = Pipeline::builder()
        .config(fixture_config())
        .build()
        .unwrap()
        .process(df)
        .unwrap();

    // Facility A reported [10, 12, 11, 9, 100]; the 100 is outside the
    // unit fences and becomes the unit median of 11.
    let conf_u5 = column_f64(&report.data, "conf_u5");
    assert_eq!(conf_u5[4], Some(11.0));
    assert_eq!(&conf_u5[0..4], &[Some(10.0), Some(12.0), Some(11.0), Some(9.0)]);

    // Facility B has a single period; a one-value group flags nothing.
    assert_eq!(conf_u5[5], Some(7.0));

    assert_eq!(report.summary.outliers_flagged, 1);
    assert_eq!(report.summary.outliers_replaced, 1);

    // Flag columns are transient and dropped by default.
    assert!(report.data.column("conf_u5_outlier").is_err());
}

#[test]
fn test_end_to_end_boundary_value_survives() {
    let df = load_fixture("facility_monthly.csv");

    let report = Pipeline::builder()
        .config(fixture_config())
        .build()
        .unwrap()
        .process(df)
        .unwrap();

    // Facility A's test_u5 sample is [20, 25, 22, 18, 21]: Q1 = 20,
    // Q3 = 22, so the upper fence is exactly 25. A value on the fence is
    // not an outlier.
    let test_u5 = column_f64(&report.data, "test_u5");
    assert_eq!(test_u5[1], Some(25.0));
}

#[test]
fn test_end_to_end_derived_indicators() {
    let df = load_fixture("facility_monthly.csv");

    let report = Pipeline::builder()
        .config(fixture_config())
        .build()
        .unwrap()
        .process(df)
        .unwrap();

    let test = column_f64(&report.data, "test");
    let conf = column_f64(&report.data, "conf");
    let positivity = column_f64(&report.data, "test_positivity");

    // Row 0: test = 20 + 10 + 1, conf = 10 + 3 + 0.
    assert_eq!(test[0], Some(31.0));
    assert_eq!(conf[0], Some(13.0));
    assert_eq!(positivity[0], Some(13.0 / 31.0));

    // Row 4: the corrected conf_u5 (11) feeds the derived sum.
    assert_eq!(conf[4], Some(13.0));

    // Facility B's missing conf_ov5 contributes zero to the sum.
    assert_eq!(conf[5], Some(7.0));
    assert_eq!(positivity[5], Some(0.35));
}

#[test]
fn test_ratio_is_missing_without_testing() {
    // A facility that confirmed cases without reporting any tests: the
    // positivity is missing, not zero and not infinite.
    let df = df![
        "hf_id" => ["A", "A", "A"],
        "tested" => [Some(0.0), None, Some(10.0)],
        "confirmed" => [5.0, 3.0, 2.0],
    ]
    .unwrap();

    let config = PipelineConfig::builder()
        .outlier_fields(["confirmed"])
        .indicators(IndicatorSet {
            groups: vec![],
            ratios: vec![RatioIndicator::new("positivity", "confirmed", "tested")],
        })
        .build()
        .unwrap();

    let report = Pipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .process(df)
        .unwrap();

    let positivity = column_f64(&report.data, "positivity");
    assert_eq!(positivity, vec![None, None, Some(0.2)]);
}

#[test]
fn test_record_order_is_preserved_and_statistics_are_order_independent() {
    let forward = df![
        "hf_id" => ["A", "B", "A", "A", "A", "A"],
        "conf_u5" => [10.0, 7.0, 12.0, 11.0, 9.0, 100.0],
    ]
    .unwrap();
    let reversed = df![
        "hf_id" => ["A", "A", "A", "A", "B", "A"],
        "conf_u5" => [100.0, 9.0, 11.0, 12.0, 7.0, 10.0],
    ]
    .unwrap();

    let config = PipelineConfig::builder()
        .outlier_fields(["conf_u5"])
        .indicators(IndicatorSet::default())
        .build()
        .unwrap();

    let report_a = Pipeline::builder()
        .config(config.clone())
        .build()
        .unwrap()
        .process(forward)
        .unwrap();
    let report_b = Pipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .process(reversed)
        .unwrap();

    assert_eq!(
        report_a.summary.outliers_flagged,
        report_b.summary.outliers_flagged
    );

    // Each output keeps its own input order; the correction follows the
    // record, not the group.
    assert_eq!(column_f64(&report_a.data, "conf_u5")[5], Some(11.0));
    assert_eq!(column_f64(&report_b.data, "conf_u5")[0], Some(11.0));
    assert_eq!(column_f64(&report_a.data, "conf_u5")[1], Some(7.0));
    assert_eq!(column_f64(&report_b.data, "conf_u5")[4], Some(7.0));
}

// ============================================================================
// Configuration Failures
// ============================================================================

#[test]
fn test_cyclic_definitions_rejected_before_processing() {
    let df = load_fixture("facility_monthly.csv");

    let config = PipelineConfig::builder()
        .outlier_fields(["conf_u5"])
        .indicators(IndicatorSet {
            groups: vec![
                VariableGroup::new("a", &["b"]),
                VariableGroup::new("b", &["a"]),
            ],
            ratios: vec![],
        })
        .build()
        .unwrap();

    let err = Pipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .process(df)
        .unwrap_err();
    assert_eq!(err.error_code(), "CYCLIC_DEFINITION");
}

#[test]
fn test_unknown_source_rejected_before_processing() {
    let df = load_fixture("facility_monthly.csv");

    let config = PipelineConfig::builder()
        .outlier_fields(["conf_u5"])
        .indicators(IndicatorSet {
            groups: vec![VariableGroup::new("conf", &["conf_u5", "no_such_field"])],
            ratios: vec![],
        })
        .build()
        .unwrap();

    let err = Pipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .process(df)
        .unwrap_err();
    assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
}

// ============================================================================
// Aggregation and Export
// ============================================================================

#[test]
fn test_cleaned_data_aggregates_by_admin_level() {
    let df = load_fixture("facility_monthly.csv");

    let report = Pipeline::builder()
        .config(fixture_config())
        .build()
        .unwrap()
        .process(df)
        .unwrap();

    let aggregator = Aggregator::new(vec!["adm1".to_string()], vec!["conf".to_string()]);

    let monthly = aggregator.monthly(&report.data).unwrap();
    // North has five months, South one.
    assert_eq!(monthly.height(), 6);

    let yearly = aggregator.yearly(&report.data).unwrap();
    assert_eq!(yearly.height(), 2);

    // North 2023: conf sums over the corrected values
    // (13 + 17 + 13 + 13 + 13); South 2023: 7.
    assert_eq!(
        column_f64(&yearly, "conf"),
        vec![Some(69.0), Some(7.0)]
    );
}

#[test]
fn test_duplicate_periods_are_tolerated_and_summed() {
    // Two rows for facility A in the same month survive cleaning and are
    // summed by aggregation.
    let df = df![
        "hf_id" => ["A", "A"],
        "adm1" => ["North", "North"],
        "year" => [2023, 2023],
        "month" => [1, 1],
        "conf_u5" => [4.0, 6.0],
    ]
    .unwrap();

    let config = PipelineConfig::builder()
        .outlier_fields(["conf_u5"])
        .indicators(IndicatorSet::default())
        .build()
        .unwrap();

    let report = Pipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .process(df)
        .unwrap();
    assert_eq!(report.data.height(), 2);

    let aggregator = Aggregator::new(vec!["adm1".to_string()], vec!["conf_u5".to_string()]);
    let monthly = aggregator.monthly(&report.data).unwrap();
    assert_eq!(monthly.height(), 1);
    assert_eq!(column_f64(&monthly, "conf_u5"), vec![Some(10.0)]);
}

#[test]
fn test_export_roundtrip() {
    let df = load_fixture("facility_monthly.csv");

    let report = Pipeline::builder()
        .config(fixture_config())
        .build()
        .unwrap()
        .process(df)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let mut cleaned = report.data.clone();
    let path = write_csv(&mut cleaned, dir.path(), "cleaned_facility_monthly").unwrap();

    let reloaded = RecordReader::new().read_path(&path).unwrap();
    assert_eq!(reloaded.height(), report.data.height());
    assert!(reloaded.column("test_positivity").is_ok());
}
