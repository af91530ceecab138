//! Shared scaffolding for the integration suite: every test here runs
//! against an in-process mock HTTP server (`wiremock`) standing in for a
//! real server, rather than requiring a live deployment reachable over the
//! network.

use std::time::Duration;

use async_trait::async_trait;
use chromium_rs::{ChromiumError, ClientConfig, Embedding, Embeddings, EmbeddingFunction};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TENANT: &str = "default_tenant";
pub const DATABASE: &str = "default_database";

/// Build a `ClientConfig` pointed at a mock server with a short timeout, so
/// a hung mock fails a test fast instead of stalling the suite.
pub fn test_config(server: &MockServer) -> ClientConfig {
    ClientConfig {
        base_url: url::Url::parse(&server.uri()).unwrap(),
        tenant: TENANT.to_string(),
        database: DATABASE.to_string(),
        default_headers: Vec::new(),
        credentials: None,
        tls_root_certificate_path: None,
        tls_insecure_skip_verify: false,
        http_client: None,
        request_timeout: Duration::from_secs(5),
        debug: false,
    }
}

/// Mount the three checks `Session::ensure_tenant_and_database` performs: a
/// modern server version, a successful tenant lookup, a successful database
/// lookup, then the preflight capability bag. Several `Client` methods
/// (collection listing, creation, ...) trigger this path before doing
/// anything else.
pub async fn mount_preflight(server: &MockServer) {
    mount_version(server, "0.6.0").await;
    Mock::given(method("GET"))
        .and(path(format!("/api/v2/tenants/{TENANT}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": TENANT,
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/v2/tenants/{TENANT}/databases/{DATABASE}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "db-1",
            "name": DATABASE,
            "tenant": TENANT,
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pre-flight-checks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "max_batch_size": 100,
        })))
        .mount(server)
        .await;
}

pub async fn mount_version(server: &MockServer, version: &str) {
    Mock::given(method("GET"))
        .and(path("/api/v2/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(version)))
        .mount(server)
        .await;
}

pub fn collections_path() -> String {
    format!("/api/v2/tenants/{TENANT}/databases/{DATABASE}/collections")
}

pub fn collection_path(id: &str, suffix: &str) -> String {
    format!("{}/{id}/{suffix}", collections_path())
}

/// Embedding function that should never actually be invoked; tests that
/// provide it expect every ingested record to already carry an embedding.
pub struct DummyEmbedding;

#[async_trait]
impl EmbeddingFunction for DummyEmbedding {
    async fn embed_documents(&self, _docs: &[String]) -> Result<Embeddings, ChromiumError> {
        Err(ChromiumError::client("DummyEmbedding should not be called"))
    }

    fn dimension(&self) -> usize {
        3
    }
}

/// Embedding function returning a fixed-value vector of the configured
/// dimension for every document or query text it's given.
pub struct ConstantEmbedding {
    pub value: f32,
    pub dim: usize,
}

#[async_trait]
impl EmbeddingFunction for ConstantEmbedding {
    async fn embed_documents(&self, docs: &[String]) -> Result<Embeddings, ChromiumError> {
        Ok(docs
            .iter()
            .map(|_| Embedding::Float32(vec![self.value; self.dim]))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}
