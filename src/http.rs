//! JSON-over-HTTP transport: a narrow trait gates the concrete client so
//! higher layers (`session`, `collection`, `client`) depend on the trait,
//! not on `reqwest` directly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ChromiumError, Result};

/// Injects one of the three orthogonal authentication schemes the server
/// accepts (§6: Basic, Bearer, vendor header) onto an outgoing request.
pub trait CredentialsProvider: Send + Sync {
    fn apply(&self, builder: RequestBuilder) -> RequestBuilder;
}

/// `Authorization: Basic base64(user:password)`.
pub struct BasicAuth {
    pub user: String,
    pub password: String,
}

impl CredentialsProvider for BasicAuth {
    fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(&self.user, Some(&self.password))
    }
}

/// `Authorization: Bearer <token>`.
pub struct BearerToken(pub String);

impl CredentialsProvider for BearerToken {
    fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.0)
    }
}

/// The hosted cloud vendor header, `X-Chroma-Token: <token>`.
pub struct VendorToken(pub String);

impl CredentialsProvider for VendorToken {
    fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("X-Chroma-Token", &self.0)
    }
}

/// Minimal HTTP backend abstraction. `request` returns the raw status and a
/// parsed JSON body (`Value::Null` for an empty response); callers classify
/// non-2xx responses with [`normalize_error`].
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<(StatusCode, Value)>;

    fn base_url(&self) -> &Url;
}

/// Construction options for [`HttpTransport`], mirroring the option bag in
/// §4.5: a user-supplied client is mutually exclusive with TLS root
/// certificate injection and with insecure-skip-verify.
pub struct HttpTransportOptions {
    pub base_url: Url,
    pub default_headers: Vec<(String, String)>,
    pub credentials: Option<Arc<dyn CredentialsProvider>>,
    pub tls_root_certificate_path: Option<std::path::PathBuf>,
    pub tls_insecure_skip_verify: bool,
    pub http_client: Option<ReqwestClient>,
    pub request_timeout: Duration,
}

/// reqwest-backed [`HttpBackend`] implementation.
pub struct HttpTransport {
    client: ReqwestClient,
    base_url: Url,
    credentials: Option<Arc<dyn CredentialsProvider>>,
    default_headers: Vec<(String, String)>,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(options: HttpTransportOptions) -> Result<Self> {
        if options.http_client.is_some()
            && (options.tls_root_certificate_path.is_some() || options.tls_insecure_skip_verify)
        {
            return Err(ChromiumError::client(
                "a user-supplied http client is mutually exclusive with tls_root_certificate_path and tls_insecure_skip_verify",
            ));
        }

        let client = match options.http_client {
            Some(client) => client,
            None => {
                let mut builder = ReqwestClient::builder().timeout(options.request_timeout);
                if options.tls_insecure_skip_verify {
                    builder = builder.danger_accept_invalid_certs(true);
                }
                if let Some(path) = &options.tls_root_certificate_path {
                    let pem = std::fs::read(path).map_err(|e| {
                        ChromiumError::client(format!(
                            "failed to read tls root certificate at {}: {e}",
                            path.display()
                        ))
                    })?;
                    let cert = reqwest::Certificate::from_pem(&pem)
                        .map_err(|e| ChromiumError::client(format!("invalid tls root certificate: {e}")))?;
                    builder = builder.add_root_certificate(cert);
                }
                builder
                    .build()
                    .map_err(|e| ChromiumError::client(format!("failed to build http client: {e}")))?
            }
        };

        Ok(Self {
            client,
            base_url: options.base_url,
            credentials: options.credentials,
            default_headers: options.default_headers,
            request_timeout: options.request_timeout,
        })
    }
}

#[async_trait]
impl HttpBackend for HttpTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<(StatusCode, Value)> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ChromiumError::client(format!("invalid request path {path}: {e}")))?;

        tracing::debug!(method = %method, url = %url, "chromium http request");

        let mut builder = self
            .client
            .request(method.clone(), url.clone())
            .timeout(self.request_timeout);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        for (key, value) in &self.default_headers {
            builder = builder.header(key, value);
        }
        if let Some(credentials) = &self.credentials {
            builder = credentials.apply(builder);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        tracing::debug!(method = %method, url = %url, status = status.as_u16(), "chromium http response");

        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok((status, value))
    }

    fn base_url(&self) -> &Url {
        &self.base_url
    }
}

/// Structured error body shape used by servers >= 0.5.6.
#[derive(serde::Deserialize)]
struct StructuredError {
    error: Option<String>,
    message: Option<String>,
}

/// Normalize a non-2xx HTTP response into the crate's error taxonomy.
/// Attempts the structured `{error, message}` shape first; falls back to
/// matching known substrings in the message text for servers that predate
/// the structured contract (< 0.5.6), per §4.1.
pub fn normalize_error(status: StatusCode, body: &Value) -> ChromiumError {
    let status_u16 = status.as_u16();

    let structured: Option<StructuredError> = serde_json::from_value(body.clone()).ok();
    let message = structured
        .as_ref()
        .and_then(|s| s.message.clone())
        .or_else(|| body.as_str().map(str::to_string))
        .unwrap_or_else(|| status.to_string());
    let identifier = structured.and_then(|s| s.error);

    if let Some(id) = identifier.as_deref() {
        match id {
            "InvalidArgumentError" => {
                return ChromiumError::InvalidArgument {
                    message,
                    http_status: Some(status_u16),
                    server_identifier: Some(id.to_string()),
                };
            }
            "NotFoundError" => {
                return ChromiumError::NotFound {
                    message,
                    http_status: Some(status_u16),
                    server_identifier: Some(id.to_string()),
                };
            }
            "UniqueConstraintError" => {
                return ChromiumError::Conflict {
                    message,
                    http_status: Some(status_u16),
                    server_identifier: Some(id.to_string()),
                };
            }
            "InvalidCollection" => {
                return ChromiumError::InvalidCollection {
                    message,
                    http_status: Some(status_u16),
                    server_identifier: Some(id.to_string()),
                };
            }
            _ => {}
        }
    }

    match status {
        StatusCode::NOT_FOUND => ChromiumError::NotFound {
            message,
            http_status: Some(status_u16),
            server_identifier: identifier,
        },
        StatusCode::CONFLICT => ChromiumError::Conflict {
            message,
            http_status: Some(status_u16),
            server_identifier: identifier,
        },
        StatusCode::BAD_REQUEST => ChromiumError::InvalidArgument {
            message,
            http_status: Some(status_u16),
            server_identifier: identifier,
        },
        s if s.is_server_error() => normalize_legacy_server_error(status_u16, &message),
        _ => ChromiumError::Server {
            message,
            http_status: Some(status_u16),
        },
    }
}

fn normalize_legacy_server_error(status: u16, message: &str) -> ChromiumError {
    let lower = message.to_lowercase();
    if lower.contains("not found") {
        return ChromiumError::NotFound {
            message: message.to_string(),
            http_status: Some(status),
            server_identifier: None,
        };
    }
    if lower.contains("unique constraint") || lower.contains("already exists") {
        return ChromiumError::Conflict {
            message: message.to_string(),
            http_status: Some(status),
            server_identifier: None,
        };
    }
    if lower.contains("invalid collection") {
        return ChromiumError::InvalidCollection {
            message: message.to_string(),
            http_status: Some(status),
            server_identifier: None,
        };
    }
    if lower.contains("invalid argument") {
        return ChromiumError::InvalidArgument {
            message: message.to_string(),
            http_status: Some(status),
            server_identifier: None,
        };
    }
    ChromiumError::Server {
        message: message.to_string(),
        http_status: Some(status),
    }
}

/// Issue a request and deserialize a successful JSON body; non-2xx
/// responses are normalized through [`normalize_error`].
pub async fn request_json<B, T>(
    backend: &B,
    method: Method,
    path: &str,
    query: &[(&str, &str)],
    body: Option<&Value>,
) -> Result<T>
where
    B: HttpBackend + ?Sized,
    T: DeserializeOwned,
{
    let (status, value) = backend.request(method, path, query, body).await?;
    if status.is_success() {
        serde_json::from_value(value).map_err(ChromiumError::Serialization)
    } else {
        Err(normalize_error(status, &value))
    }
}

/// Issue a request and discard a successful body (endpoints that return an
/// empty object or no content on success).
pub async fn request_unit<B>(
    backend: &B,
    method: Method,
    path: &str,
    query: &[(&str, &str)],
    body: Option<&Value>,
) -> Result<()>
where
    B: HttpBackend + ?Sized,
{
    let (status, value) = backend.request(method, path, query, body).await?;
    if status.is_success() {
        Ok(())
    } else {
        Err(normalize_error(status, &value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structured_error_maps_by_identifier() {
        let body = json!({"error": "NotFoundError", "message": "collection missing"});
        let err = normalize_error(StatusCode::INTERNAL_SERVER_ERROR, &body);
        assert!(matches!(err, ChromiumError::NotFound { .. }));
    }

    #[test]
    fn legacy_server_error_matches_message_text() {
        let body = json!("Collection not found: foo");
        let err = normalize_error(StatusCode::INTERNAL_SERVER_ERROR, &body);
        assert!(matches!(err, ChromiumError::NotFound { .. }));
    }

    #[test]
    fn unrecognized_server_error_falls_back_to_server_category() {
        let body = json!({"message": "boom"});
        let err = normalize_error(StatusCode::INTERNAL_SERVER_ERROR, &body);
        assert!(matches!(err, ChromiumError::Server { .. }));
    }

    #[test]
    fn status_only_maps_standard_categories() {
        let body = Value::Null;
        assert!(matches!(
            normalize_error(StatusCode::NOT_FOUND, &body),
            ChromiumError::NotFound { .. }
        ));
        assert!(matches!(
            normalize_error(StatusCode::CONFLICT, &body),
            ChromiumError::Conflict { .. }
        ));
        assert!(matches!(
            normalize_error(StatusCode::BAD_REQUEST, &body),
            ChromiumError::InvalidArgument { .. }
        ));
    }
}
