use std::env;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client as ReqwestClient;
use url::Url;

use crate::error::{ChromiumError, Result};
use crate::http::CredentialsProvider;

/// Distance space used by the server's vector index. The reserved
/// `hnsw:space` metadata key on `Collection::create` is normalized
/// (lower-cased) to one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DistanceSpace {
    L2,
    Cosine,
    InnerProduct,
}

impl DistanceSpace {
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceSpace::L2 => "l2",
            DistanceSpace::Cosine => "cosine",
            DistanceSpace::InnerProduct => "ip",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "l2" => Some(DistanceSpace::L2),
            "cosine" => Some(DistanceSpace::Cosine),
            "ip" | "inner_product" => Some(DistanceSpace::InnerProduct),
            _ => None,
        }
    }
}

/// Client connection configuration (§4.5). Constructed directly, via
/// [`ClientConfig::from_env`], or via [`ClientConfigBuilder`].
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub tenant: String,
    pub database: String,
    pub default_headers: Vec<(String, String)>,
    pub credentials: Option<Arc<dyn CredentialsProvider>>,
    pub tls_root_certificate_path: Option<std::path::PathBuf>,
    pub tls_insecure_skip_verify: bool,
    pub http_client: Option<ReqwestClient>,
    pub request_timeout: Duration,
    pub debug: bool,
}

pub const DEFAULT_TENANT: &str = "default_tenant";
pub const DEFAULT_DATABASE: &str = "default_database";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

impl ClientConfig {
    /// Build configuration from environment variables: `CHROMA_URL` or the
    /// `CHROMA_CLOUD_*` preset (§6).
    pub fn from_env() -> Result<Self> {
        if let Ok(api_key) = env::var("CHROMA_CLOUD_API_KEY") {
            let host = env::var("CHROMA_CLOUD_HOST")
                .unwrap_or_else(|_| "https://api.trychroma.com".to_string());
            let tenant = env::var("CHROMA_CLOUD_TENANT").unwrap_or_else(|_| DEFAULT_TENANT.into());
            let database =
                env::var("CHROMA_CLOUD_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.into());
            let base_url = parse_url(&host)?;
            return Ok(Self {
                base_url,
                tenant,
                database,
                default_headers: Vec::new(),
                credentials: Some(Arc::new(crate::http::VendorToken(api_key))),
                tls_root_certificate_path: None,
                tls_insecure_skip_verify: false,
                http_client: None,
                request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
                debug: parse_env_bool("CHROMIUM_DEBUG"),
            });
        }

        let base_url = parse_url(&require_env("CHROMA_URL")?)?;
        Ok(Self {
            base_url,
            tenant: DEFAULT_TENANT.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            default_headers: Vec::new(),
            credentials: None,
            tls_root_certificate_path: None,
            tls_insecure_skip_verify: false,
            http_client: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            debug: parse_env_bool("CHROMIUM_DEBUG"),
        })
    }

    /// Validate mutually-exclusive options (§4.5): a user-supplied HTTP
    /// client may not be combined with TLS root certificate injection or
    /// insecure-skip-verify.
    pub fn validate(&self) -> Result<()> {
        if self.http_client.is_some()
            && (self.tls_root_certificate_path.is_some() || self.tls_insecure_skip_verify)
        {
            return Err(ChromiumError::client(
                "http_client is mutually exclusive with tls_root_certificate_path and tls_insecure_skip_verify",
            ));
        }
        Ok(())
    }
}

/// Chainable builder for [`ClientConfig`].
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new(base_url: Url) -> Self {
        Self {
            config: ClientConfig {
                base_url,
                tenant: DEFAULT_TENANT.to_string(),
                database: DEFAULT_DATABASE.to_string(),
                default_headers: Vec::new(),
                credentials: None,
                tls_root_certificate_path: None,
                tls_insecure_skip_verify: false,
                http_client: None,
                request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
                debug: false,
            },
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self {
            config: ClientConfig::from_env()?,
        })
    }

    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.config.tenant = tenant.into();
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.database = database.into();
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.push((key.into(), value.into()));
        self
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialsProvider>) -> Self {
        self.config.credentials = Some(credentials);
        self
    }

    pub fn tls_root_certificate_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config.tls_root_certificate_path = Some(path.into());
        self
    }

    pub fn tls_insecure_skip_verify(mut self, insecure: bool) -> Self {
        self.config.tls_insecure_skip_verify = insecure;
        self
    }

    pub fn http_client(mut self, client: ReqwestClient) -> Self {
        self.config.http_client = Some(client);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| ChromiumError::client(format!("invalid base url {raw}: {e}")))
}

fn require_env(key: &str) -> Result<String> {
    env::var(key).map_err(|_| ChromiumError::client(format!("missing env: {key}")))
}

fn parse_env_bool(key: &str) -> bool {
    env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
        .unwrap_or(false)
}
