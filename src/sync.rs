//! Blocking wrapper over the async [`Client`]/[`Collection`] API: each
//! method owns a `tokio::runtime::Runtime` and calls `block_on` so callers
//! in a synchronous context don't need to bring their own executor.

use std::sync::Arc;

use tokio::runtime::Runtime;

use crate::client::Client;
use crate::collection::{Collection, GetParams, QueryParams};
use crate::config::{ClientConfig, DistanceSpace};
use crate::embedding::EmbeddingFunction;
use crate::error::{ChromiumError, Result};
use crate::filters::{DocFilter, Filter};
use crate::types::{Database, GetResult, Metadata, QueryResult, Record, Tenant};

fn new_runtime() -> Result<Runtime> {
    Runtime::new().map_err(|e| ChromiumError::Other(anyhow::anyhow!("failed to create tokio runtime: {e}")))
}

/// Blocking entry point. Constructs its own single-threaded runtime and
/// drives every call through it.
pub struct SyncClient {
    rt: Runtime,
    inner: Client,
}

impl SyncClient {
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        Ok(Self {
            rt: new_runtime()?,
            inner: Client::new(config)?,
        })
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self {
            rt: new_runtime()?,
            inner: Client::from_env()?,
        })
    }

    pub fn close(&self) {
        self.inner.close();
    }

    pub fn heartbeat(&self) -> Result<serde_json::Value> {
        self.rt.block_on(self.inner.heartbeat())
    }

    pub fn version(&self) -> Result<String> {
        self.rt.block_on(self.inner.version())
    }

    pub fn reset(&self) -> Result<()> {
        self.rt.block_on(self.inner.reset())
    }

    pub fn create_tenant(&self, name: &str) -> Result<()> {
        self.rt.block_on(self.inner.create_tenant(name))
    }

    pub fn get_tenant(&self, name: &str) -> Result<Tenant> {
        self.rt.block_on(self.inner.get_tenant(name))
    }

    pub fn create_database(&self, name: &str, tenant: Option<&str>) -> Result<()> {
        self.rt.block_on(self.inner.create_database(name, tenant))
    }

    pub fn get_database(&self, name: &str, tenant: Option<&str>) -> Result<Database> {
        self.rt.block_on(self.inner.get_database(name, tenant))
    }

    pub fn list_collection_names(&self) -> Result<Vec<String>> {
        self.rt.block_on(self.inner.list_collection_names())
    }

    pub fn count_collections(&self) -> Result<u64> {
        self.rt.block_on(self.inner.count_collections())
    }

    pub fn create_collection<Ef: EmbeddingFunction + 'static>(
        &self,
        name: &str,
        metadata: Option<Metadata>,
        distance_space: Option<DistanceSpace>,
        embedding_function: Option<Ef>,
    ) -> Result<SyncCollection<Ef>> {
        let collection = self
            .rt
            .block_on(self.inner.create_collection(name, metadata, distance_space, embedding_function))?;
        Ok(SyncCollection { handle: Arc::new(self.rt.handle().clone()), inner: collection })
    }

    pub fn get_collection<Ef: EmbeddingFunction + 'static>(
        &self,
        name: &str,
        embedding_function: Option<Ef>,
    ) -> Result<SyncCollection<Ef>> {
        let collection = self.rt.block_on(self.inner.get_collection(name, embedding_function))?;
        Ok(SyncCollection { handle: Arc::new(self.rt.handle().clone()), inner: collection })
    }

    pub fn delete_collection(&self, name: &str) -> Result<()> {
        self.rt.block_on(self.inner.delete_collection(name))
    }
}

/// Blocking mirror of [`Collection`]. Shares its parent [`SyncClient`]'s
/// runtime handle rather than spawning a second runtime per collection.
pub struct SyncCollection<Ef: EmbeddingFunction> {
    handle: Arc<tokio::runtime::Handle>,
    inner: Collection<Ef>,
}

impl<Ef: EmbeddingFunction> SyncCollection<Ef> {
    pub fn id(&self) -> &str {
        self.inner.id()
    }

    pub fn name(&self) -> String {
        self.inner.name()
    }

    pub fn metadata(&self) -> &Metadata {
        self.inner.metadata()
    }

    pub fn close(&self) {
        self.inner.close();
    }

    pub fn modify_name(&self, new_name: &str) -> Result<()> {
        self.handle.block_on(self.inner.modify_name(new_name))
    }

    pub fn add(&self, records: Vec<Record>) -> Result<()> {
        self.handle.block_on(self.inner.add(records))
    }

    pub fn upsert(&self, records: Vec<Record>) -> Result<()> {
        self.handle.block_on(self.inner.upsert(records))
    }

    pub fn update(&self, records: Vec<Record>) -> Result<()> {
        self.handle.block_on(self.inner.update(records))
    }

    pub fn delete(&self, ids: Option<Vec<String>>, filter: Option<Filter>, document_filter: Option<DocFilter>) -> Result<()> {
        self.handle.block_on(self.inner.delete(ids, filter, document_filter))
    }

    pub fn count(&self) -> Result<u64> {
        self.handle.block_on(self.inner.count())
    }

    pub fn get(&self, params: GetParams) -> Result<GetResult> {
        self.handle.block_on(self.inner.get(params))
    }

    pub fn peek(&self, limit: u32) -> Result<GetResult> {
        self.handle.block_on(self.inner.peek(limit))
    }

    pub fn query(&self, params: QueryParams) -> Result<QueryResult> {
        self.handle.block_on(self.inner.query(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn from_config_builds_a_runtime_backed_client() {
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
        let client = SyncClient::from_config(config).unwrap();
        client.close();
    }
}
