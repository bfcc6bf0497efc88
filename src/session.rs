//! Per-session context: store and LLM handles, the active collection, a
//! per-collection profile cache, and the query history.
//!
//! One user query triggers one profiling read (cached until the collection
//! changes), one resolver call, one pipeline execution, and one chart
//! mapping, in strict sequence. No retries anywhere; every failure is a
//! terminal outcome for that request and the user resubmits.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::DEFAULT_SAMPLE_SIZE;
use crate::chart::{ChartSpec, map_chart};
use crate::error::ChartQueryError;
use crate::guard;
use crate::intent::{self, QueryIntent};
use crate::llm::LlmClient;
use crate::profile::{self, FieldProfile};
use crate::store::DocumentStore;

/// Append-only record of one submitted query.
///
/// Records the pipeline that was attempted, so the audit trail survives
/// execution or mapping failures. Never mutated or removed within a session.
#[derive(Debug, Clone, Serialize)]
pub struct QueryHistoryEntry {
    pub query: String,
    pub pipeline: Vec<Value>,
    pub intent: QueryIntent,
}

/// State for one user session against one database.
pub struct Session {
    store: Arc<dyn DocumentStore>,
    llm: Arc<dyn LlmClient>,
    collection: Option<String>,
    profiles: HashMap<String, FieldProfile>,
    history: Vec<QueryHistoryEntry>,
}

impl Session {
    pub fn new(store: Arc<dyn DocumentStore>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            store,
            llm,
            collection: None,
            profiles: HashMap::new(),
            history: Vec::new(),
        }
    }

    /// Switch the active collection, profiling it on first selection.
    ///
    /// The profile is cached for the lifetime of the session; re-selecting a
    /// collection reuses the snapshot rather than re-sampling.
    pub async fn select_collection(&mut self, name: &str) {
        if !self.profiles.contains_key(name) {
            let profile =
                profile::profile(self.store.as_ref(), name, DEFAULT_SAMPLE_SIZE).await;
            if profile.is_empty() {
                warn!(collection = %name, "no schema detected, resolution quality degraded");
            }
            self.profiles.insert(name.to_string(), profile);
        }
        self.collection = Some(name.to_string());
    }

    /// Field profile of the active collection, if one is selected.
    pub fn active_profile(&self) -> Option<&FieldProfile> {
        self.collection
            .as_deref()
            .and_then(|name| self.profiles.get(name))
    }

    /// Query history in submission order.
    pub fn history(&self) -> &[QueryHistoryEntry] {
        &self.history
    }

    /// Run one natural-language query end to end.
    ///
    /// Sequence: resolve intent, secure the pipeline, record the attempt,
    /// execute, map to a chart. The history entry is written before
    /// execution so later-stage failures still leave an audit trail.
    pub async fn run(&mut self, query: &str) -> Result<ChartSpec, ChartQueryError> {
        let collection = self
            .collection
            .clone()
            .ok_or(ChartQueryError::NoCollection)?;
        let profile = self.profiles.get(&collection).cloned().unwrap_or_default();

        let intent = intent::resolve(self.llm.as_ref(), query, &collection, &profile).await?;
        let pipeline = guard::secure(&intent);
        debug!(stages = pipeline.len(), "pipeline secured");

        self.history.push(QueryHistoryEntry {
            query: query.to_string(),
            pipeline: pipeline.clone(),
            intent: intent.clone(),
        });

        // Always execute against the session's selected collection; the
        // intent's echoed collection name is untrusted.
        let rows = self.store.aggregate(&collection, &pipeline).await?;
        info!(rows = rows.len(), %collection, "pipeline executed");

        let spec = map_chart(&rows, &intent)?;
        Ok(spec)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::ChartType;
    use crate::llm::MockLlmClient;
    use crate::store::MockStore;
    use serde_json::json;

    const BAR_INTENT: &str = r#"{
        "collection": "orders",
        "operation_type": "aggregate",
        "aggregation_pipeline": [{"$group": {"_id": "$category", "count": {"$sum": 1}}}],
        "chart_type": "bar",
        "x_axis": "_id",
        "y_axis": "count",
        "title": "Orders by category"
    }"#;

    fn sample_docs() -> Vec<Value> {
        vec![
            json!({"_id": 1, "category": "A", "qty": 5}),
            json!({"_id": 2, "category": "B", "qty": 3}),
        ]
    }

    fn grouped_rows() -> Vec<Value> {
        vec![
            json!({"_id": "A", "count": 5}),
            json!({"_id": "B", "count": 3}),
        ]
    }

    fn session_with(store: MockStore, responses: Vec<String>) -> Session {
        Session::new(
            Arc::new(store),
            Arc::new(MockLlmClient::new(responses)),
        )
    }

    #[tokio::test]
    async fn test_run_happy_path() {
        let store = MockStore::new(sample_docs(), grouped_rows());
        let mut session = session_with(store, vec![BAR_INTENT.to_string()]);
        session.select_collection("orders").await;

        let spec = session.run("orders per category").await.unwrap();
        assert_eq!(spec.chart_type, ChartType::Bar);
        assert_eq!(spec.x_field, "_id");
        assert_eq!(spec.rows.len(), 2);

        let history = session.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].query, "orders per category");
        assert_eq!(history[0].pipeline.len(), 1);
    }

    #[tokio::test]
    async fn test_run_without_collection_fails() {
        let store = MockStore::new(vec![], vec![]);
        let mut session = session_with(store, vec![]);

        let err = session.run("anything").await.unwrap_err();
        assert!(matches!(err, ChartQueryError::NoCollection));
    }

    #[tokio::test]
    async fn test_run_resolution_failure_executes_nothing() {
        let store = MockStore::new(sample_docs(), grouped_rows());
        let mut session = session_with(store, vec!["garbage".to_string()]);
        session.select_collection("orders").await;

        let err = session.run("orders per category").await.unwrap_err();
        assert!(matches!(err, ChartQueryError::Resolution(_)));
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_run_invalid_pipeline_falls_back_silently() {
        let response = r#"{
            "collection": "orders",
            "operation_type": "aggregate",
            "aggregation_pipeline": [{"$out": "evil"}],
            "chart_type": "bar",
            "x_axis": "category",
            "y_axis": "",
            "title": ""
        }"#;
        let store = MockStore::new(sample_docs(), grouped_rows());
        let mut session = session_with(store, vec![response.to_string()]);
        session.select_collection("orders").await;

        session.run("orders per category").await.unwrap();

        // The recorded and executed pipeline is the fallback, not the
        // rejected one.
        let recorded = &session.history()[0].pipeline;
        assert_eq!(
            *recorded,
            vec![
                json!({"$group": {"_id": "$category", "count": {"$sum": 1}}}),
                json!({"$sort": {"_id": 1}}),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_execution_failure_keeps_history() {
        let mut store = MockStore::new(sample_docs(), grouped_rows());
        store.fail_aggregate = true;
        let mut session = session_with(store, vec![BAR_INTENT.to_string()]);
        session.select_collection("orders").await;

        let err = session.run("orders per category").await.unwrap_err();
        assert!(matches!(err, ChartQueryError::Execution(_)));
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_run_chart_failure_keeps_history() {
        // Execution succeeds but the y field never appears in the rows.
        let response = r#"{
            "collection": "orders",
            "operation_type": "aggregate",
            "aggregation_pipeline": [{"$match": {}}],
            "chart_type": "bar",
            "x_axis": "category",
            "y_axis": "total",
            "title": ""
        }"#;
        let rows = vec![json!({"category": "A", "qty": 5})];
        let store = MockStore::new(sample_docs(), rows);
        let mut session = session_with(store, vec![response.to_string()]);
        session.select_collection("orders").await;

        let err = session.run("totals per category").await.unwrap_err();
        assert!(matches!(err, ChartQueryError::Chart(_)));
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_profile_cached_per_collection() {
        let store = MockStore::new(sample_docs(), grouped_rows());
        let mut session = session_with(store, vec![]);

        session.select_collection("orders").await;
        let first = session.active_profile().unwrap().clone();

        // Re-selecting reuses the snapshot.
        session.select_collection("orders").await;
        assert_eq!(*session.active_profile().unwrap(), first);
        assert_eq!(session.profiles.len(), 1);
    }
}
