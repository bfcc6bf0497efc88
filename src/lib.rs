//! mongo-chart — natural-language charting over a MongoDB database.
//!
//! One user query flows through a fixed sequence: profile the selected
//! collection ([`profile`]), resolve the free text into a structured
//! [`intent::QueryIntent`] via one LLM call ([`intent`]), validate the
//! intent's aggregation pipeline or substitute a deterministic fallback
//! ([`guard`]), execute it against the store ([`store`]), and map the
//! result rows onto a renderable [`chart::ChartSpec`] ([`chart`]).
//! [`session`] ties the sequence together and keeps per-session state.

pub mod chart;
pub mod error;
pub mod guard;
pub mod intent;
pub mod llm;
pub mod profile;
pub mod session;
pub mod store;

/// Reserved identity field. Excluded from field profiles; grouping stages
/// conventionally emit their group key under it.
pub const ID_FIELD: &str = "_id";

/// Prefix for the synthetic columns produced by flattening a composite
/// group key.
pub const FLATTEN_PREFIX: &str = "_id_";

/// Conventional column name for count-style aggregation output.
pub const COUNT_FIELD: &str = "count";

/// Default number of documents drawn per profiling pass.
pub const DEFAULT_SAMPLE_SIZE: usize = 100;

/// Document cap applied by the match-all fallback pipeline.
pub const FALLBACK_LIMIT: i64 = 100;

/// Resolve the MongoDB connection string from the environment.
pub fn resolve_mongo_uri() -> Option<String> {
    std::env::var("MONGO_URI").ok()
}

/// Resolve the database name from the environment.
pub fn resolve_db_name() -> Option<String> {
    std::env::var("MONGO_DB_NAME").ok()
}
