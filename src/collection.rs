//! Collection handle (§4.6): CRUD methods build JSON bodies and hit
//! collection-scoped endpoints, with predicate serialization going through
//! [`crate::filters`]. Validation follows a build-then-submit staging shape
//! (length checks, at-least-one-selector-on-delete) before anything is sent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};

use crate::embedding::EmbeddingFunction;
use crate::error::{ChromiumError, Result};
use crate::filters::{serialize_where, serialize_where_document, DocFilter, Filter};
use crate::http::{request_json, request_unit};
use crate::ids::{ContentHashId, IdGenerator};
use crate::recordset::RecordSet;
use crate::session::Session;
use crate::types::{
    default_get_include, default_query_include, Embedding, GetResult, IncludeField, Metadata, QueryResult, Record,
};

/// A handle to one server-side collection. Cheap to clone-by-reference (it
/// holds `Arc`s throughout); closing one handle, or the `Client` that
/// produced it, closes every handle sharing that client.
pub struct Collection<Ef: EmbeddingFunction> {
    session: Arc<Session>,
    client_closed: Arc<AtomicBool>,
    closed: AtomicBool,
    id: String,
    name: std::sync::Mutex<String>,
    metadata: Metadata,
    embedding_function: Option<Ef>,
    id_generator: Arc<dyn IdGenerator>,
}

impl<Ef: EmbeddingFunction> Collection<Ef> {
    pub(crate) fn new(
        session: Arc<Session>,
        client_closed: Arc<AtomicBool>,
        id: String,
        name: String,
        metadata: Metadata,
        embedding_function: Option<Ef>,
    ) -> Self {
        Self {
            session,
            client_closed,
            closed: AtomicBool::new(false),
            id,
            name: std::sync::Mutex::new(name),
            metadata,
            embedding_function,
            id_generator: Arc::new(ContentHashId),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> String {
        self.name.lock().unwrap().clone()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(embedder) = &self.embedding_function {
            embedder.close();
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.client_closed.load(Ordering::SeqCst) {
            Err(ChromiumError::client("client has been closed"))
        } else if self.closed.load(Ordering::SeqCst) {
            Err(ChromiumError::client("collection has been closed"))
        } else {
            Ok(())
        }
    }

    fn path(&self, suffix: &str) -> String {
        format!(
            "api/v2/tenants/{}/databases/{}/collections/{}/{suffix}",
            self.session.tenant(),
            self.session.database(),
            self.id
        )
    }

    /// Rename the collection on the server and reflect it locally.
    pub async fn modify_name(&self, new_name: &str) -> Result<()> {
        self.check_open()?;
        let body = json!({ "new_name": new_name });
        request_unit(self.session.backend().as_ref(), Method::PUT, &self.path(""), &[], Some(&body)).await?;
        *self.name.lock().unwrap() = new_name.to_string();
        Ok(())
    }

    async fn build_records(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        let mut set = RecordSet::new(self.id_generator.clone());
        set.extend(records);
        let embedder: Option<&dyn EmbeddingFunction> = self.embedding_function.as_ref().map(|e| e as _);
        set.build_and_validate(embedder).await
    }

    pub async fn add(&self, records: Vec<Record>) -> Result<()> {
        self.check_open()?;
        let built = self.build_records(records).await?;
        let body = records_to_wire(&built);
        request_unit(self.session.backend().as_ref(), Method::POST, &self.path("add"), &[], Some(&body)).await
    }

    pub async fn upsert(&self, records: Vec<Record>) -> Result<()> {
        self.check_open()?;
        let built = self.build_records(records).await?;
        let body = records_to_wire(&built);
        request_unit(self.session.backend().as_ref(), Method::POST, &self.path("upsert"), &[], Some(&body)).await
    }

    /// Updates existing rows. Unlike `add`/`upsert`, a missing embedding is
    /// left absent rather than generated: an update is expected to touch
    /// only the fields the caller actually supplied.
    pub async fn update(&self, records: Vec<Record>) -> Result<()> {
        self.check_open()?;
        for record in &records {
            if record.id.is_empty() {
                return Err(ChromiumError::validation("update requires a non-empty id on every record"));
            }
        }
        let body = records_to_wire(&records);
        request_unit(self.session.backend().as_ref(), Method::POST, &self.path("update"), &[], Some(&body)).await
    }

    pub async fn delete(
        &self,
        ids: Option<Vec<String>>,
        filter: Option<Filter>,
        document_filter: Option<DocFilter>,
    ) -> Result<()> {
        self.check_open()?;
        if ids.is_none() && filter.is_none() && document_filter.is_none() {
            return Err(ChromiumError::validation(
                "delete requires at least one of ids, where, or where_document",
            ));
        }
        let mut body = serde_json::Map::new();
        if let Some(ids) = ids {
            body.insert("ids".to_string(), json!(ids));
        }
        if let Some(filter) = filter {
            body.insert("where".to_string(), serialize_where(&filter));
        }
        if let Some(doc_filter) = document_filter {
            body.insert("where_document".to_string(), serialize_where_document(&doc_filter));
        }
        request_unit(
            self.session.backend().as_ref(),
            Method::POST,
            &self.path("delete"),
            &[],
            Some(&Value::Object(body)),
        )
        .await
    }

    pub async fn count(&self) -> Result<u64> {
        self.check_open()?;
        request_json(self.session.backend().as_ref(), Method::GET, &self.path("count"), &[], None).await
    }

    pub async fn get(&self, params: GetParams) -> Result<GetResult> {
        self.check_open()?;
        let mut body = serde_json::Map::new();
        if let Some(ids) = params.ids {
            body.insert("ids".to_string(), json!(ids));
        }
        if let Some(filter) = params.filter {
            body.insert("where".to_string(), serialize_where(&filter));
        }
        if let Some(doc_filter) = params.document_filter {
            body.insert("where_document".to_string(), serialize_where_document(&doc_filter));
        }
        if let Some(limit) = params.limit {
            body.insert("limit".to_string(), json!(limit));
        }
        if let Some(offset) = params.offset {
            body.insert("offset".to_string(), json!(offset));
        }
        body.insert("include".to_string(), json!(params.include));

        request_json(
            self.session.backend().as_ref(),
            Method::POST,
            &self.path("get"),
            &[],
            Some(&Value::Object(body)),
        )
        .await
    }

    pub async fn peek(&self, limit: u32) -> Result<GetResult> {
        self.get(GetParams {
            limit: Some(limit),
            ..GetParams::default()
        })
        .await
    }

    /// Runs a similarity query. Embeddings take precedence: if both
    /// `query_embeddings` and `query_texts` are supplied, the texts are
    /// still embedded and echoed back (§8 scenario 6), but the embeddings
    /// actually searched are the merged list with the explicit ones first.
    /// The result carries one row per query input, in that same order, and
    /// callers must not assume a single leading row (§9 Open Question).
    pub async fn query(&self, params: QueryParams) -> Result<QueryResult> {
        self.check_open()?;
        if params.query_embeddings.is_none() && params.query_texts.is_none() {
            return Err(ChromiumError::validation(
                "query requires at least one of query_embeddings or query_texts",
            ));
        }

        let mut generated_embeddings = None;
        let mut all_embeddings: Vec<Embedding> = params.query_embeddings.clone().unwrap_or_default();

        if let Some(texts) = &params.query_texts {
            let embedder = self.embedding_function.as_ref().ok_or_else(|| {
                ChromiumError::client("query_texts requires an embedding function bound to the collection")
            })?;
            let mut generated = Vec::with_capacity(texts.len());
            for text in texts {
                generated.push(embedder.embed_query(text).await?);
            }
            all_embeddings.extend(generated.clone());
            generated_embeddings = Some(generated);
        }

        if all_embeddings.is_empty() {
            return Err(ChromiumError::validation("query produced no embeddings to search with"));
        }

        let mut body = serde_json::Map::new();
        body.insert("query_embeddings".to_string(), json!(all_embeddings));
        body.insert("n_results".to_string(), json!(params.n_results));
        if let Some(filter) = &params.filter {
            body.insert("where".to_string(), serialize_where(filter));
        }
        if let Some(doc_filter) = &params.document_filter {
            body.insert("where_document".to_string(), serialize_where_document(doc_filter));
        }
        body.insert("include".to_string(), json!(params.include));

        let mut result: QueryResult = request_json(
            self.session.backend().as_ref(),
            Method::POST,
            &self.path("query"),
            &[],
            Some(&Value::Object(body)),
        )
        .await?;

        result.query_texts = params.query_texts;
        result.generated_embeddings = generated_embeddings;
        Ok(result)
    }
}

fn records_to_wire(records: &[Record]) -> Value {
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    let documents: Vec<Option<&str>> = records.iter().map(|r| r.document.as_deref()).collect();
    let metadatas: Vec<Option<&Metadata>> = records.iter().map(|r| r.metadata.as_ref()).collect();
    let embeddings: Vec<Option<&Embedding>> = records.iter().map(|r| r.embedding.as_ref()).collect();
    json!({
        "ids": ids,
        "documents": documents,
        "metadatas": metadatas,
        "embeddings": embeddings,
    })
}

#[derive(Default)]
pub struct GetParams {
    pub ids: Option<Vec<String>>,
    pub filter: Option<Filter>,
    pub document_filter: Option<DocFilter>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub include: Vec<IncludeField>,
}

impl GetParams {
    pub fn new() -> Self {
        Self {
            include: default_get_include(),
            ..Default::default()
        }
    }
}

pub struct QueryParams {
    pub query_embeddings: Option<Vec<Embedding>>,
    pub query_texts: Option<Vec<String>>,
    pub n_results: u32,
    pub filter: Option<Filter>,
    pub document_filter: Option<DocFilter>,
    pub include: Vec<IncludeField>,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            query_embeddings: None,
            query_texts: None,
            n_results: 10,
            filter: None,
            document_filter: None,
            include: default_query_include(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingFunction for StubEmbedder {
        async fn embed_documents(&self, docs: &[String]) -> Result<Vec<Embedding>> {
            Ok(docs.iter().map(|_| Embedding::Float32(vec![0.1, 0.2])).collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn test_collection() -> Collection<StubEmbedder> {
        let backend = crate::http::HttpTransport::new(crate::http::HttpTransportOptions {
            base_url: url::Url::parse("https://example.com").unwrap(),
            default_headers: Vec::new(),
            credentials: None,
            tls_root_certificate_path: None,
            tls_insecure_skip_verify: false,
            http_client: None,
            request_timeout: std::time::Duration::from_secs(5),
        })
        .unwrap();
        let session = Arc::new(Session::new(Arc::new(backend), "t".into(), "d".into()));
        Collection::new(
            session,
            Arc::new(AtomicBool::new(false)),
            "col-1".into(),
            "docs".into(),
            Metadata::new(),
            Some(StubEmbedder),
        )
    }

    #[tokio::test]
    async fn delete_requires_a_selector() {
        let collection = test_collection();
        let err = collection.delete(None, None, None).await.unwrap_err();
        assert!(matches!(err, ChromiumError::ValidationFailure(_)));
    }

    #[tokio::test]
    async fn query_requires_embeddings_or_texts() {
        let collection = test_collection();
        let err = collection
            .query(QueryParams {
                query_embeddings: None,
                query_texts: None,
                ..QueryParams::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChromiumError::ValidationFailure(_)));
    }

    #[test]
    fn close_blocks_further_checks() {
        let collection = test_collection();
        assert!(collection.check_open().is_ok());
        collection.close();
        assert!(collection.check_open().is_err());
    }

    #[test]
    fn client_close_cascades_to_collection() {
        let collection = test_collection();
        collection.client_closed.store(true, Ordering::SeqCst);
        assert!(collection.check_open().is_err());
    }
}
