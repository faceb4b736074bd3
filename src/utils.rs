//! Shared helpers for dtype checks and numeric coercion.
//!
//! Upstream extracts are messy: count columns arrive as strings with
//! thousands separators, or carry markers that cannot be parsed at all.
//! Values that cannot be read as numbers are recorded as missing rather
//! than aborting the run, and the number of such coercions is reported.

use polars::prelude::*;

use crate::error::Result;

/// Characters commonly used in numeric formatting that should be stripped.
pub const NUMERIC_FORMAT_CHARS: [char; 2] = [',', ' '];

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Clean a string for numeric parsing by removing formatting characters.
pub fn clean_numeric_string(s: &str) -> String {
    let mut result = s.trim().to_string();
    for c in NUMERIC_FORMAT_CHARS {
        result = result.replace(c, "");
    }
    result
}

/// Try to parse a string as a numeric value (f64).
pub fn parse_numeric_string(s: &str) -> Option<f64> {
    let cleaned = clean_numeric_string(s);
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Materialize a column as `f64` values.
///
/// Returns the values in row order plus the number of populated entries
/// that had to be coerced to missing because they were not numeric (text
/// that does not parse, non-finite floats, or an unsupported dtype).
pub fn numeric_values(series: &Series) -> Result<(Vec<Option<f64>>, usize)> {
    let mut coerced = 0usize;

    if is_numeric_dtype(series.dtype()) {
        let cast = series.cast(&DataType::Float64)?;
        let ca = cast.f64()?;
        let mut out = Vec::with_capacity(ca.len());
        for opt_val in ca.into_iter() {
            match opt_val {
                Some(val) if val.is_finite() => out.push(Some(val)),
                Some(_) => {
                    coerced += 1;
                    out.push(None);
                }
                None => out.push(None),
            }
        }
        return Ok((out, coerced));
    }

    if series.dtype() == &DataType::String {
        let ca = series.str()?;
        let mut out = Vec::with_capacity(ca.len());
        for opt_val in ca.into_iter() {
            match opt_val {
                None => out.push(None),
                Some(raw) => {
                    let trimmed = raw.trim();
                    if trimmed.is_empty() {
                        out.push(None);
                    } else if let Some(parsed) = parse_numeric_string(trimmed) {
                        out.push(Some(parsed));
                    } else {
                        coerced += 1;
                        out.push(None);
                    }
                }
            }
        }
        return Ok((out, coerced));
    }

    // Unsupported dtype: every populated entry counts as coerced.
    let coerced = series.len() - series.null_count();
    Ok((vec![None; series.len()], coerced))
}

/// Materialize a column as string values, casting non-string dtypes.
///
/// Used for grouping keys, which may arrive as integer codes.
pub fn string_values(series: &Series) -> Result<Vec<Option<String>>> {
    let cast = series.cast(&DataType::String)?;
    let ca = cast.str()?;
    Ok(ca
        .into_iter()
        .map(|opt_val| opt_val.map(|s| s.to_string()))
        .collect())
}
