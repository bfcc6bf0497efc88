//! Pipeline safety: shape validation and the deterministic fallback.
//!
//! The guard checks stage shape and operator identity only. Operator
//! arguments are passed through untouched; argument-level sanitization is an
//! explicit non-goal of this layer. There is no terminal failure here: an
//! invalid pipeline is replaced by a fallback derived from the intent, so
//! the caller always has something safe and bounded to run.

use serde_json::{Value, json};
use tracing::warn;

use crate::FALLBACK_LIMIT;
use crate::intent::{ChartType, QueryIntent};

/// Allowed pipeline stage operators.
pub const STAGE_OPERATORS: [&str; 10] = [
    "$match", "$group", "$sort", "$project", "$limit", "$skip", "$unwind", "$lookup", "$count",
    "$sum",
];

/// Check a pipeline's shape: non-empty, every stage a mapping, every stage
/// carrying at least one allowed operator key.
pub fn is_valid_pipeline(pipeline: &[Value]) -> bool {
    if pipeline.is_empty() {
        return false;
    }

    pipeline.iter().all(|stage| {
        stage
            .as_object()
            .is_some_and(|obj| obj.keys().any(|key| STAGE_OPERATORS.contains(&key.as_str())))
    })
}

/// Return the intent's pipeline when shape-valid, otherwise a deterministic
/// fallback derived from the intent.
///
/// Idempotent on valid pipelines: securing a secured pipeline yields the
/// same stage sequence.
pub fn secure(intent: &QueryIntent) -> Vec<Value> {
    if is_valid_pipeline(&intent.aggregation_pipeline) {
        return intent.aggregation_pipeline.clone();
    }

    warn!(
        collection = %intent.collection,
        "pipeline failed shape validation, substituting fallback"
    );
    fallback_pipeline(intent)
}

/// Derive the fallback pipeline from the intent, never from the rejected
/// pipeline.
///
/// A grouping chart (bar, line, pie) with a named x-axis falls back to
/// group-by-x with a member count, sorted ascending by group key. Anything
/// else falls back to match-all capped at [`FALLBACK_LIMIT`] documents.
pub fn fallback_pipeline(intent: &QueryIntent) -> Vec<Value> {
    let grouping_chart = matches!(
        intent.chart_type,
        ChartType::Bar | ChartType::Line | ChartType::Pie
    );

    if grouping_chart && !intent.x_axis.is_empty() {
        return vec![
            json!({"$group": {"_id": format!("${}", intent.x_axis), "count": {"$sum": 1}}}),
            json!({"$sort": {"_id": 1}}),
        ];
    }

    vec![json!({"$match": {}}), json!({"$limit": FALLBACK_LIMIT})]
}

// ============================================================================
// Tests
// ============================================================================
