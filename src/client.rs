//! Top-level entry point (§4.5, §4.6): a single HTTP-backed `Client` that
//! owns a [`Session`] and hands out [`Collection`] handles. Closing the
//! client marks every collection it produced as closed too, rather than
//! leaving them pointing at a torn-down connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};

use crate::collection::Collection;
use crate::config::{ClientConfig, DistanceSpace};
use crate::embedding::EmbeddingFunction;
use crate::error::{ChromiumError, Result};
use crate::http::{request_json, request_unit, HttpBackend, HttpTransport, HttpTransportOptions};
use crate::session::Session;
use crate::types::{Database, Tenant};

/// Connected client for one tenant/database pair.
pub struct Client {
    session: Arc<Session>,
    closed: Arc<AtomicBool>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let tenant = config.tenant.clone();
        let database = config.database.clone();
        let debug = config.debug;

        let backend: Arc<dyn HttpBackend> = Arc::new(HttpTransport::new(HttpTransportOptions {
            base_url: config.base_url,
            default_headers: config.default_headers,
            credentials: config.credentials,
            tls_root_certificate_path: config.tls_root_certificate_path,
            tls_insecure_skip_verify: config.tls_insecure_skip_verify,
            http_client: config.http_client,
            request_timeout: config.request_timeout,
        })?);

        if debug {
            tracing::debug!(tenant = %tenant, database = %database, "chromium client constructed");
        }

        Ok(Self {
            session: Arc::new(Session::new(backend, tenant, database)),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn from_config(config: ClientConfig) -> Result<Self> {
        Self::new(config)
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(ChromiumError::client("client has been closed"))
        } else {
            Ok(())
        }
    }

    /// Mark this client and every collection handle it produced as closed.
    /// Further calls on any of them return a client error instead of
    /// issuing a request against a connection the caller has given up.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub async fn heartbeat(&self) -> Result<Value> {
        self.check_open()?;
        request_json(self.session.backend().as_ref(), Method::GET, "api/v2/heartbeat", &[], None).await
    }

    pub async fn version(&self) -> Result<String> {
        self.check_open()?;
        self.session.server_version().await.map(str::to_string)
    }

    pub async fn reset(&self) -> Result<()> {
        self.check_open()?;
        request_unit(self.session.backend().as_ref(), Method::POST, "api/v2/reset", &[], None).await
    }

    pub async fn create_tenant(&self, name: &str) -> Result<()> {
        self.check_open()?;
        let body = json!({ "name": name });
        request_unit(self.session.backend().as_ref(), Method::POST, "api/v2/tenants", &[], Some(&body)).await
    }

    pub async fn get_tenant(&self, name: &str) -> Result<Tenant> {
        self.check_open()?;
        let path = format!("api/v2/tenants/{name}");
        request_json(self.session.backend().as_ref(), Method::GET, &path, &[], None).await
    }

    pub async fn create_database(&self, name: &str, tenant: Option<&str>) -> Result<()> {
        self.check_open()?;
        let tenant = tenant.unwrap_or_else(|| self.session.tenant());
        let path = format!("api/v2/tenants/{tenant}/databases");
        let body = json!({ "name": name });
        request_unit(self.session.backend().as_ref(), Method::POST, &path, &[], Some(&body)).await
    }

    pub async fn get_database(&self, name: &str, tenant: Option<&str>) -> Result<Database> {
        self.check_open()?;
        let tenant = tenant.unwrap_or_else(|| self.session.tenant());
        let path = format!("api/v2/tenants/{tenant}/databases/{name}");
        request_json(self.session.backend().as_ref(), Method::GET, &path, &[], None).await
    }

    fn collections_path(&self) -> String {
        format!(
            "api/v2/tenants/{}/databases/{}/collections",
            self.session.tenant(),
            self.session.database()
        )
    }

    pub async fn list_collection_names(&self) -> Result<Vec<String>> {
        self.check_open()?;
        self.session.ensure_tenant_and_database().await?;
        let summaries: Vec<CollectionSummary> =
            request_json(self.session.backend().as_ref(), Method::GET, &self.collections_path(), &[], None).await?;
        Ok(summaries.into_iter().map(|s| s.name).collect())
    }

    pub async fn count_collections(&self) -> Result<u64> {
        self.check_open()?;
        self.session.ensure_tenant_and_database().await?;
        let path = format!("{}/count", self.collections_path());
        request_json(self.session.backend().as_ref(), Method::GET, &path, &[], None).await
    }

    /// Create a collection. `metadata` is never mutated in place: the
    /// distance space key is written into a freshly cloned map so the
    /// caller's own metadata object is unaffected by the call (§9 Open
    /// Question: non-aliasing metadata copy).
    pub async fn create_collection<Ef: EmbeddingFunction + 'static>(
        &self,
        name: &str,
        metadata: Option<crate::types::Metadata>,
        distance_space: Option<DistanceSpace>,
        embedding_function: Option<Ef>,
    ) -> Result<Collection<Ef>> {
        self.check_open()?;
        self.session.ensure_tenant_and_database().await?;

        let mut effective_metadata = metadata.unwrap_or_default();
        if let Some(space) = distance_space {
            effective_metadata.insert("hnsw:space".to_string(), json!(space.as_str()));
        }

        let body = json!({
            "name": name,
            "metadata": effective_metadata,
            "get_or_create": false,
        });
        let summary: CollectionSummary = request_json(
            self.session.backend().as_ref(),
            Method::POST,
            &self.collections_path(),
            &[],
            Some(&body),
        )
        .await?;

        Ok(Collection::new(
            self.session.clone(),
            self.closed.clone(),
            summary.id,
            summary.name,
            summary.metadata.unwrap_or_default(),
            embedding_function,
        ))
    }

    pub async fn get_collection<Ef: EmbeddingFunction + 'static>(
        &self,
        name: &str,
        embedding_function: Option<Ef>,
    ) -> Result<Collection<Ef>> {
        self.check_open()?;
        self.session.ensure_tenant_and_database().await?;

        let path = format!("{}/{name}", self.collections_path());
        let summary: CollectionSummary =
            request_json(self.session.backend().as_ref(), Method::GET, &path, &[], None).await?;

        Ok(Collection::new(
            self.session.clone(),
            self.closed.clone(),
            summary.id,
            summary.name,
            summary.metadata.unwrap_or_default(),
            embedding_function,
        ))
    }

    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        self.check_open()?;
        self.session.ensure_tenant_and_database().await?;
        let path = format!("{}/{name}", self.collections_path());
        request_unit(self.session.backend().as_ref(), Method::DELETE, &path, &[], None).await
    }
}

#[derive(serde::Deserialize)]
struct CollectionSummary {
    id: String,
    name: String,
    #[serde(default)]
    metadata: Option<crate::types::Metadata>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn close_marks_client_and_shared_flag() {
        let config = ClientConfig {
            base_url: Url::parse("https://example.com").unwrap(),
            tenant: "t".into(),
            database: "d".into(),
            default_headers: Vec::new(),
            credentials: None,
            tls_root_certificate_path: None,
            tls_insecure_skip_verify: false,
            http_client: None,
            request_timeout: std::time::Duration::from_secs(5),
            debug: false,
        };
        let client = Client::new(config).unwrap();
        assert!(client.check_open().is_ok());
        client.close();
        assert!(client.check_open().is_err());
        assert!(client.closed.load(Ordering::SeqCst));
    }
}
