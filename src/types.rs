use serde::{Deserialize, Serialize};

/// A scalar metadata value. Mirrors the server's accepted metadata value
/// types: string, 32-bit integer, 32-bit float, and bool. `serde_json::Value`
/// is used as the wire representation but construction is validated against
/// this closed set at the API boundary (see [`crate::filters`] and
/// [`crate::recordset`]).
pub type Scalar = serde_json::Value;

/// A mapping of metadata field names to scalar values.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

pub type Document = String;
pub type Documents = Vec<Document>;

/// A fixed-length numeric vector. The server echoes back whichever numeric
/// kind was stored; this crate always produces and consumes `f32`, the kind
/// every code path here (builder validation, default embedder, wire
/// serialization) agrees on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Embedding {
    Float32(Vec<f32>),
    Int32(Vec<i32>),
}

impl Embedding {
    pub fn len(&self) -> usize {
        match self {
            Embedding::Float32(v) => v.len(),
            Embedding::Int32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_f32(&self) -> Vec<f32> {
        match self {
            Embedding::Float32(v) => v.clone(),
            Embedding::Int32(v) => v.iter().map(|x| *x as f32).collect(),
        }
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(value: Vec<f32>) -> Self {
        Embedding::Float32(value)
    }
}

impl From<Vec<i32>> for Embedding {
    fn from(value: Vec<i32>) -> Self {
        Embedding::Int32(value)
    }
}

pub type Embeddings = Vec<Embedding>;

/// Selects which fields to include in `get`/`query` responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeField {
    Documents,
    Metadatas,
    Embeddings,
    Distances,
    Uris,
}

pub fn default_get_include() -> Vec<IncludeField> {
    vec![IncludeField::Documents, IncludeField::Metadatas]
}

pub fn default_query_include() -> Vec<IncludeField> {
    vec![
        IncludeField::Documents,
        IncludeField::Metadatas,
        IncludeField::Distances,
    ]
}

/// One input/output row: id, optional document/uri, optional metadata,
/// optional embedding.
///
/// Invariants (enforced by [`crate::recordset::RecordSet::build_and_validate`]):
/// `id` is non-empty; at least one of `document`, `uri`, or `embedding` is
/// present; `metadata` values conform to the scalar set.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_embedding(mut self, embedding: impl Into<Embedding>) -> Self {
        self.embedding = Some(embedding.into());
        self
    }
}

/// Result shape for similarity queries: one entry per query, per field.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub ids: Vec<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<Vec<Option<Document>>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<Vec<Vec<Embedding>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distances: Option<Vec<Vec<f32>>>,
    /// Echo of the submitted query texts, for observability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_texts: Option<Vec<String>>,
    /// Echo of the embeddings generated for `query_texts`, for observability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_embeddings: Option<Vec<Embedding>>,
}

/// Result shape for `get`/`peek` calls: one flat set of rows.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GetResult {
    pub ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<Option<Document>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadatas: Option<Vec<Option<Metadata>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<Vec<Embedding>>,
}

/// Tenant record returned by admin APIs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Tenant {
    pub name: String,
}

/// Database record returned by admin APIs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Database {
    pub id: Option<String>,
    pub name: String,
    pub tenant: String,
}

/// Server-reported capability/limit bag, fetched once during preflight.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PreflightChecks {
    #[serde(default)]
    pub max_batch_size: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_len_and_conversion() {
        let e: Embedding = vec![1.0_f32, 2.0, 3.0].into();
        assert_eq!(e.len(), 3);
        assert!(!e.is_empty());

        let i: Embedding = vec![1_i32, 2, 3].into();
        assert_eq!(i.as_f32(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn record_builder() {
        let rec = Record::new("id-1")
            .with_document("hello")
            .with_embedding(vec![0.1_f32]);
        assert_eq!(rec.id, "id-1");
        assert_eq!(rec.document.as_deref(), Some("hello"));
        assert!(rec.embedding.is_some());
    }
}
