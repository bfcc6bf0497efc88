//! Chart mapping: flatten composite group keys, resolve axis fields, and
//! select a chart type for a set of result rows.
//!
//! Grouping stages conventionally emit the group key under the identity
//! field. When that key is composite (an object or array), its members are
//! flattened into synthetic `_id_*` columns so they become independently
//! addressable, and axis references to the literal identity field are
//! redirected to the first synthetic column. Axis substitution is
//! best-effort: a field still missing after the heuristics is a reported
//! error, never a silent default.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::intent::{ChartType, QueryIntent};
use crate::{COUNT_FIELD, FLATTEN_PREFIX, ID_FIELD};

/// Errors that abort chart generation.
#[derive(Debug, Error)]
pub enum ChartError {
    /// Pipeline execution returned no rows.
    #[error("no data available to visualize")]
    EmptyResult,

    /// The resolved x-axis field is absent from the result columns.
    #[error("x-axis field '{0}' not found in the results")]
    MissingXAxis(String),

    /// The resolved y-axis field is absent from the result columns.
    #[error("y-axis field '{0}' not found in the results")]
    MissingYAxis(String),
}

/// The resolved rendering contract for one query.
///
/// Carries everything a presentation surface needs: resolved axis fields,
/// a confirmed chart type, a title, and the flattened row set. Never
/// persisted beyond the interaction's history.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSpec {
    pub chart_type: ChartType,
    pub x_field: String,
    /// Absent means count semantics (e.g. histogram bins).
    pub y_field: Option<String>,
    pub title: String,
    pub rows: Vec<Value>,
}

/// Map result rows and the originating intent onto a [`ChartSpec`].
pub fn map_chart(rows: &[Value], intent: &QueryIntent) -> Result<ChartSpec, ChartError> {
    if rows.is_empty() {
        return Err(ChartError::EmptyResult);
    }

    let rows = flatten_rows(rows);

    // X axis: redirect a literal identity reference to the first synthetic
    // column when flattening consumed the original field.
    let mut x_field = intent.x_axis.clone();
    if x_field == ID_FIELD && !column_present(&rows, ID_FIELD) {
        if let Some(synthetic) = first_synthetic_column(&rows) {
            x_field = synthetic;
        }
    }

    // Y axis: a missing or unset field falls back to the conventional count
    // column when one exists.
    let mut y_field = intent.y_axis.clone();
    let y_unresolved = y_field
        .as_deref()
        .is_none_or(|y| !column_present(&rows, y));
    if y_unresolved && column_present(&rows, COUNT_FIELD) {
        y_field = Some(COUNT_FIELD.to_string());
    }

    if !column_present(&rows, &x_field) {
        return Err(ChartError::MissingXAxis(x_field));
    }
    if let Some(y) = &y_field {
        if !column_present(&rows, y) {
            return Err(ChartError::MissingYAxis(y.clone()));
        }
    }

    // Honor a recognized chart type; anything else renders as a bar chart.
    let chart_type = match intent.chart_type {
        ChartType::Other => ChartType::Bar,
        recognized => recognized,
    };

    let title = if intent.title.trim().is_empty() {
        format!("{} by {}", y_field.as_deref().unwrap_or("Value"), x_field)
    } else {
        intent.title.clone()
    };

    Ok(ChartSpec {
        chart_type,
        x_field,
        y_field,
        title,
        rows,
    })
}

// ============================================================================
// Row Normalization
// ============================================================================

/// Flatten composite identity fields across a row set.
pub fn flatten_rows(rows: &[Value]) -> Vec<Value> {
    rows.iter().map(flatten_row).collect()
}

/// Flatten a composite identity field into synthetic scalar columns.
///
/// Object members become `_id_<key>`, array members `_id_<index>`; the
/// original composite field is removed. Every member produces exactly one
/// synthetic column. Rows without a composite identity pass through
/// unchanged.
fn flatten_row(row: &Value) -> Value {
    let Some(obj) = row.as_object() else {
        return row.clone();
    };

    let composite = matches!(
        obj.get(ID_FIELD),
        Some(Value::Object(_)) | Some(Value::Array(_))
    );
    if !composite {
        return row.clone();
    }

    let mut flat = Map::new();
    for (key, value) in obj {
        match (key.as_str(), value) {
            (ID_FIELD, Value::Object(members)) => {
                for (member, member_value) in members {
                    flat.insert(format!("{FLATTEN_PREFIX}{member}"), member_value.clone());
                }
            }
            (ID_FIELD, Value::Array(items)) => {
                for (index, item) in items.iter().enumerate() {
                    flat.insert(format!("{FLATTEN_PREFIX}{index}"), item.clone());
                }
            }
            _ => {
                flat.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(flat)
}

/// Whether a column is present in every row.
fn column_present(rows: &[Value], field: &str) -> bool {
    !rows.is_empty()
        && rows
            .iter()
            .all(|row| row.as_object().is_some_and(|obj| obj.contains_key(field)))
}

/// First synthetic flattened column, in flattening order.
fn first_synthetic_column(rows: &[Value]) -> Option<String> {
    rows.iter().find_map(|row| {
        row.as_object().and_then(|obj| {
            obj.keys()
                .find(|key| key.starts_with(FLATTEN_PREFIX))
                .cloned()
        })
    })
}

// ============================================================================
// Heuristic Chart Type Selection
// ============================================================================

/// Broad classification of a result column for chart selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
    Categorical,
    Temporal,
    Numerical,
}

/// Suggest a chart type from the shape of the data.
///
/// Usable independently of an intent (e.g. for suggestion UIs). Low
/// cardinality categoricals suggest pie (bar when no y field), temporal
/// x suggests line, numerical x suggests scatter against a numerical y and
/// histogram otherwise. Defaults to bar whenever the fields are unusable.
pub fn suggest_chart_type(rows: &[Value], x_field: &str, y_field: Option<&str>) -> ChartType {
    if rows.is_empty() || !column_present(rows, x_field) {
        return ChartType::Bar;
    }
    let y_field = y_field.filter(|y| column_present(rows, y));

    let x_values = column_values(rows, x_field);
    let x_cardinality = distinct_count(&x_values);

    match infer_field_class(&x_values) {
        FieldClass::Categorical => {
            if x_cardinality <= 10 && y_field.is_some() {
                ChartType::Pie
            } else {
                ChartType::Bar
            }
        }
        FieldClass::Temporal => ChartType::Line,
        FieldClass::Numerical => {
            let y_numerical = y_field
                .map(|y| infer_field_class(&column_values(rows, y)) == FieldClass::Numerical);
            if y_numerical == Some(true) {
                ChartType::Scatter
            } else {
                ChartType::Histogram
            }
        }
    }
}

/// Classify a column's values as categorical, temporal, or numerical.
///
/// Numeric columns with at most 20 distinct values read as categorical
/// despite their native representation. String values that all parse as
/// dates or datetimes read as temporal.
pub fn infer_field_class(values: &[&Value]) -> FieldClass {
    let non_null: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();
    if non_null.is_empty() {
        return FieldClass::Categorical;
    }

    if non_null.iter().all(|v| v.is_number()) {
        let distinct = distinct_count(&non_null);
        return if distinct <= 20 {
            FieldClass::Categorical
        } else {
            FieldClass::Numerical
        };
    }

    if non_null
        .iter()
        .all(|v| v.as_str().is_some_and(parses_as_temporal))
    {
        return FieldClass::Temporal;
    }

    FieldClass::Categorical
}

/// Whether a string parses as a common date or datetime representation.
fn parses_as_temporal(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || NaiveDate::parse_from_str(s, "%Y/%m/%d").is_ok()
}

/// Non-null values of one column across all rows.
fn column_values<'a>(rows: &'a [Value], field: &str) -> Vec<&'a Value> {
    rows.iter()
        .filter_map(|row| row.as_object().and_then(|obj| obj.get(field)))
        .filter(|v| !v.is_null())
        .collect()
}

fn distinct_count(values: &[&Value]) -> usize {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<HashSet<_>>()
        .len()
}

// ============================================================================
// Tests
// ============================================================================
