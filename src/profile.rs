//! Field profiling: sample a collection and infer per-field semantic kinds.
//!
//! A profile is a snapshot built once per collection per profiling pass. It
//! is embedded into the intent-resolution prompt so the model knows which
//! fields exist and roughly what they hold. An unreachable or empty
//! collection yields an empty profile, which is a valid (if degraded) state.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::ID_FIELD;
use crate::store::DocumentStore;

/// Inferred semantic kind of a field across a whole sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Integer,
    Float,
    Number,
    String,
    Boolean,
    Array,
    Object,
    Mixed,
    Unknown,
}

impl FieldKind {
    /// Lowercase tag, matching the serialized form embedded in prompts.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Number => "number",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Mixed => "mixed",
            Self::Unknown => "unknown",
        }
    }
}

/// Mapping from field name to inferred kind. Insertion order follows the
/// first appearance of each field across the sample. The reserved identity
/// field is never present.
pub type FieldProfile = IndexMap<String, FieldKind>;

/// Classify one field's sampled values.
///
/// Classification is whole-sample: a single value of a differing kind
/// downgrades the field to [`FieldKind::Mixed`], never to an "optional"
/// variant. Null values are ignored; a field with no non-null values is
/// [`FieldKind::Unknown`].
pub fn classify_values(values: &[&Value]) -> FieldKind {
    let non_null: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();
    if non_null.is_empty() {
        return FieldKind::Unknown;
    }

    if non_null.iter().all(|v| v.is_i64() || v.is_u64()) {
        FieldKind::Integer
    } else if non_null.iter().all(|v| v.is_f64()) {
        FieldKind::Float
    } else if non_null.iter().all(|v| v.is_number()) {
        FieldKind::Number
    } else if non_null.iter().all(|v| v.is_string()) {
        FieldKind::String
    } else if non_null.iter().all(|v| v.is_boolean()) {
        FieldKind::Boolean
    } else if non_null.iter().all(|v| v.is_array()) {
        FieldKind::Array
    } else if non_null.iter().all(|v| v.is_object()) {
        FieldKind::Object
    } else {
        FieldKind::Mixed
    }
}

/// Build a profile from already-sampled documents.
///
/// Takes the union of field names across all documents (excluding the
/// identity field) and classifies each field over the values present in the
/// documents that carry it.
pub fn profile_documents(docs: &[Value]) -> FieldProfile {
    let mut fields: Vec<String> = Vec::new();
    for doc in docs {
        let Some(obj) = doc.as_object() else { continue };
        for key in obj.keys() {
            if key != ID_FIELD && !fields.contains(key) {
                fields.push(key.clone());
            }
        }
    }

    let mut profile = FieldProfile::new();
    for field in fields {
        let values: Vec<&Value> = docs
            .iter()
            .filter_map(|doc| doc.as_object().and_then(|obj| obj.get(&field)))
            .collect();
        profile.insert(field, classify_values(&values));
    }
    profile
}

/// Profile a collection by sampling up to `sample_size` documents.
///
/// Read-only; the only output is the returned profile. Failure to sample is
/// non-fatal and yields an empty profile.
pub async fn profile(
    store: &dyn DocumentStore,
    collection: &str,
    sample_size: usize,
) -> FieldProfile {
    let docs = match store.sample(collection, sample_size).await {
        Ok(docs) => docs,
        Err(e) => {
            warn!(%collection, "failed to sample collection for profiling: {e}");
            return FieldProfile::new();
        }
    };

    if docs.is_empty() {
        warn!(%collection, "collection is empty, profile unavailable");
        return FieldProfile::new();
    }

    profile_documents(&docs)
}

// ============================================================================
// Tests
// ============================================================================
