//! Intent resolution: one LLM call turning free text plus a field profile
//! into a structured [`QueryIntent`].
//!
//! Resolution is a single untrusted black-box step. The response is parsed
//! against the structural contract and nothing more; all safety work on the
//! produced pipeline happens in [`crate::guard`]. There is no retry loop and
//! no multi-turn correction: any failure aborts the current query.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::llm::{LlmClient, LlmError};
use crate::profile::FieldProfile;

/// Errors that prevent a query from being interpreted.
///
/// All variants are terminal for the current query: the caller must not
/// proceed to pipeline execution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The reasoning backend could not be reached or returned no usable text.
    #[error("reasoning backend failed: {0}")]
    Llm(#[from] LlmError),

    /// The response did not match the intent contract.
    #[error("response did not match the intent contract: {0}")]
    Contract(String),
}

/// Closed set of renderable chart types.
///
/// The model is asked to pick one of the named variants; anything else
/// parses to [`ChartType::Other`], which renders as a bar chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Scatter,
    Pie,
    Histogram,
    #[serde(other)]
    Other,
}

/// Structured interpretation of one natural-language query.
///
/// Produced once per user query and immutable afterwards. The pipeline is an
/// ordered sequence of JSON stage mappings; stage order is significant and
/// preserved end-to-end. Treated as an untrusted tagged record: operator
/// names are validated in [`crate::guard`] and the chart-type tag is closed
/// by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryIntent {
    /// Target collection name as echoed by the model.
    pub collection: String,
    /// Operation kind tag (e.g. "aggregate").
    pub operation_type: String,
    /// Ordered aggregation pipeline stages.
    pub aggregation_pipeline: Vec<Value>,
    /// Requested chart type.
    pub chart_type: ChartType,
    /// Field to use for the x-axis.
    pub x_axis: String,
    /// Field or derived metric for the y-axis. Absent or blank means a
    /// count-style metric resolved later by the chart mapper.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub y_axis: Option<String>,
    /// Display title. Blank titles are synthesized by the chart mapper.
    #[serde(default)]
    pub title: String,
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|s| !s.trim().is_empty()))
}

/// System prompt describing the required output contract.
const INTENT_SYSTEM_PROMPT: &str = r#"You are an expert in MongoDB and data visualization. Translate a natural language question about a MongoDB collection into an aggregation pipeline and a chart choice.

Respond with ONLY a JSON object (no markdown, no explanation) matching this structure:
{
  "collection": "the collection to query",
  "operation_type": "the type of operation (aggregate, find, etc.)",
  "aggregation_pipeline": [{"$group": {"_id": "$field", "count": {"$sum": 1}}}],
  "chart_type": "one of: bar, line, scatter, pie, histogram",
  "x_axis": "field to use for the x-axis",
  "y_axis": "field or derived metric for the y-axis, or empty string for a plain count",
  "title": "chart title"
}

Rules:
- aggregation_pipeline is an ordered array of stage objects; only use the operators $match, $group, $sort, $project, $limit, $skip, $unwind, $lookup, $count, $sum
- Only reference fields that appear in the collection schema
- Pick the chart type best suited to the shape of the result"#;

/// Resolve a natural-language query into a [`QueryIntent`].
///
/// Builds one prompt embedding the collection name, the serialized profile,
/// and the user's text, invokes the reasoning backend exactly once, and
/// parses the response against the structural contract.
pub async fn resolve(
    llm: &dyn LlmClient,
    query: &str,
    collection: &str,
    profile: &FieldProfile,
) -> Result<QueryIntent, ResolveError> {
    let schema_json =
        serde_json::to_string(profile).map_err(|e| ResolveError::Contract(e.to_string()))?;

    let user = format!(
        "Collection name: {collection}\nCollection schema: {schema_json}\n\nUser query: {query}"
    );

    debug!(%collection, "requesting intent resolution");
    let completion = llm.complete(INTENT_SYSTEM_PROMPT, &user).await?;

    let cleaned = strip_markdown_fences(&completion.text);
    let intent: QueryIntent = serde_json::from_str(&cleaned).map_err(|e| {
        ResolveError::Contract(format!("{e}; response: {}", completion.text.trim()))
    })?;

    debug!(chart_type = ?intent.chart_type, stages = intent.aggregation_pipeline.len(), "intent resolved");
    Ok(intent)
}

/// Strip markdown code fences from LLM output.
pub fn strip_markdown_fences(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        let after_first_fence = trimmed
            .find('\n')
            .map(|i| &trimmed[i + 1..])
            .unwrap_or(trimmed);
        if let Some(end) = after_first_fence.rfind("```") {
            return after_first_fence[..end].trim().to_string();
        }
    }
    trimmed.to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::profile::{FieldKind, FieldProfile};
    use serde_json::json;

    fn sample_profile() -> FieldProfile {
        FieldProfile::from([
            ("category".to_string(), FieldKind::String),
            ("qty".to_string(), FieldKind::Integer),
        ])
    }

    const VALID_RESPONSE: &str = r#"{
        "collection": "orders",
        "operation_type": "aggregate",
        "aggregation_pipeline": [{"$group": {"_id": "$category", "count": {"$sum": 1}}}],
        "chart_type": "bar",
        "x_axis": "_id",
        "y_axis": "count",
        "title": "Orders by category"
    }"#;

    #[tokio::test]
    async fn test_resolve_success() {
        let mock = MockLlmClient::new(vec![VALID_RESPONSE.to_string()]);

        let intent = resolve(&mock, "orders per category", "orders", &sample_profile())
            .await
            .unwrap();
        assert_eq!(intent.collection, "orders");
        assert_eq!(intent.chart_type, ChartType::Bar);
        assert_eq!(intent.x_axis, "_id");
        assert_eq!(intent.y_axis.as_deref(), Some("count"));
        assert_eq!(intent.aggregation_pipeline.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_with_markdown_fences() {
        let fenced = format!("```json\n{VALID_RESPONSE}\n```");
        let mock = MockLlmClient::new(vec![fenced]);

        let intent = resolve(&mock, "orders per category", "orders", &sample_profile())
            .await
            .unwrap();
        assert_eq!(intent.title, "Orders by category");
    }

    #[tokio::test]
    async fn test_resolve_malformed_response() {
        let mock = MockLlmClient::new(vec!["not json at all".to_string()]);

        let err = resolve(&mock, "whatever", "orders", &sample_profile())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Contract(_)));
    }

    #[tokio::test]
    async fn test_resolve_incomplete_response() {
        // Missing x_axis and chart_type.
        let mock = MockLlmClient::new(vec![
            r#"{"collection": "orders", "operation_type": "aggregate", "aggregation_pipeline": []}"#
                .to_string(),
        ]);

        let err = resolve(&mock, "whatever", "orders", &sample_profile())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Contract(_)));
    }

    #[test]
    fn test_unknown_chart_type_parses_to_other() {
        let intent: QueryIntent = serde_json::from_value(json!({
            "collection": "orders",
            "operation_type": "aggregate",
            "aggregation_pipeline": [{"$match": {}}],
            "chart_type": "treemap",
            "x_axis": "category",
            "y_axis": "qty",
            "title": ""
        }))
        .unwrap();
        assert_eq!(intent.chart_type, ChartType::Other);
    }

    #[test]
    fn test_blank_y_axis_becomes_none() {
        let intent: QueryIntent = serde_json::from_value(json!({
            "collection": "orders",
            "operation_type": "aggregate",
            "aggregation_pipeline": [{"$match": {}}],
            "chart_type": "histogram",
            "x_axis": "qty",
            "y_axis": "",
            "title": ""
        }))
        .unwrap();
        assert!(intent.y_axis.is_none());
    }

    #[test]
    fn test_pipeline_order_preserved() {
        let intent: QueryIntent = serde_json::from_value(json!({
            "collection": "orders",
            "operation_type": "aggregate",
            "aggregation_pipeline": [
                {"$match": {"qty": {"$gt": 1}}},
                {"$group": {"_id": "$category"}},
                {"$sort": {"_id": 1}}
            ],
            "chart_type": "bar",
            "x_axis": "_id",
            "y_axis": null,
            "title": ""
        }))
        .unwrap();

        let keys: Vec<&str> = intent
            .aggregation_pipeline
            .iter()
            .map(|s| s.as_object().unwrap().keys().next().unwrap().as_str())
            .collect();
        assert_eq!(keys, vec!["$match", "$group", "$sort"]);
    }

    // --- strip_markdown_fences ---

    #[test]
    fn test_strip_no_fences() {
        assert_eq!(strip_markdown_fences("hello"), "hello");
    }

    #[test]
    fn test_strip_json_fences() {
        assert_eq!(strip_markdown_fences("```json\n{}\n```"), "{}");
    }

    #[test]
    fn test_strip_bare_fences() {
        assert_eq!(strip_markdown_fences("```\nfoo\n```"), "foo");
    }
}
