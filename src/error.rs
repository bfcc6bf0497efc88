//! Top-level error taxonomy for a single chart request.

use thiserror::Error;

use crate::chart::ChartError;
use crate::intent::ResolveError;
use crate::store::StoreError;

/// Terminal outcome of one chart request.
///
/// Each variant maps to the boundary where the failure originated. Pipeline
/// validation failure is deliberately absent: an invalid pipeline shape is
/// silently replaced by the deterministic fallback and never surfaces here.
#[derive(Debug, Error)]
pub enum ChartQueryError {
    /// The store is unreachable or rejected the connection.
    #[error("connection failed: {0}")]
    Connection(String),

    /// No collection has been selected for this session.
    #[error("no collection selected")]
    NoCollection,

    /// The natural-language query could not be interpreted. Nothing was
    /// executed against the store.
    #[error("failed to interpret query: {0}")]
    Resolution(#[from] ResolveError),

    /// The store rejected the pipeline at execution time.
    #[error("failed to execute pipeline: {0}")]
    Execution(#[from] StoreError),

    /// The result rows could not be mapped onto a chart.
    #[error("failed to generate chart: {0}")]
    Chart(#[from] ChartError),
}
