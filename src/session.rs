//! Server session: lazy, idempotent preflight against a connected server
//! (§4.5). An HTTP backend has no connection-time handshake to piggyback
//! on, so the usual eager bootstrap becomes a set of independently
//! memoized checks, each run by the first caller that actually needs the
//! fact it produces.
//!
//! Each check (`server_version`, `preflight_checks`, tenant/database
//! existence) runs at most once per `Session` on success; a failed attempt
//! is retried on the next call rather than poisoning the session forever.

use std::sync::Arc;

use reqwest::Method;
use tokio::sync::{Mutex, OnceCell};

use crate::error::Result;
use crate::http::{request_json, HttpBackend};
use crate::types::{Database, PreflightChecks, Tenant};

/// The version a server must be at or above to expose tenant/database
/// scoping; older servers operate against an implicit default of each.
const MIN_VERSION_WITH_TENANTS: (u64, u64, u64) = (0, 4, 15);

pub struct Session {
    backend: Arc<dyn HttpBackend>,
    tenant: String,
    database: String,
    version: OnceCell<String>,
    preflight: OnceCell<PreflightChecks>,
    tenant_database_checked: Mutex<bool>,
}

impl Session {
    pub fn new(backend: Arc<dyn HttpBackend>, tenant: String, database: String) -> Self {
        Self {
            backend,
            tenant,
            database,
            version: OnceCell::new(),
            preflight: OnceCell::new(),
            tenant_database_checked: Mutex::new(false),
        }
    }

    pub fn backend(&self) -> &Arc<dyn HttpBackend> {
        &self.backend
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Fetch and memoize the server version string (scenario: preflight
    /// runs at most once per session, §8).
    pub async fn server_version(&self) -> Result<&str> {
        self.version
            .get_or_try_init(|| async { request_json(&*self.backend, Method::GET, "api/v2/version", &[], None).await })
            .await
            .map(|s| s.as_str())
    }

    /// Fetch and memoize the server's capability/limit bag.
    pub async fn preflight_checks(&self) -> Result<&PreflightChecks> {
        self.preflight
            .get_or_try_init(|| async {
                request_json(&*self.backend, Method::GET, "api/v2/pre-flight-checks", &[], None).await
            })
            .await
    }

    /// Verify the configured tenant and database exist, then fetch the
    /// preflight capability bag, if the connected server version is new
    /// enough to have the tenant/database concept at all (§4.5 step 2:
    /// tenant, then database, then preflight bag, as three separate calls).
    /// Memoized on success; a transient failure (network blip, server
    /// momentarily down) is retried on the next call rather than cached.
    pub async fn ensure_tenant_and_database(&self) -> Result<()> {
        let mut checked = self.tenant_database_checked.lock().await;
        if *checked {
            return Ok(());
        }

        let version = self.server_version().await?;
        if !supports_tenant_scoping(version) {
            *checked = true;
            return Ok(());
        }

        let tenant_path = format!("api/v2/tenants/{}", self.tenant);
        request_json::<_, Tenant>(&*self.backend, Method::GET, &tenant_path, &[], None).await?;

        let database_path = format!("api/v2/tenants/{}/databases/{}", self.tenant, self.database);
        request_json::<_, Database>(&*self.backend, Method::GET, &database_path, &[], None).await?;

        self.preflight_checks().await?;

        *checked = true;
        Ok(())
    }
}

fn supports_tenant_scoping(version: &str) -> bool {
    let Some(parsed) = parse_loose_semver(version) else {
        // Can't parse a version string at all: assume a modern server
        // rather than silently skipping a check that matters.
        return true;
    };
    parsed >= MIN_VERSION_WITH_TENANTS
}

/// Parses `MAJOR.MINOR.PATCH[-...]`, ignoring any pre-release/build suffix,
/// since server version strings aren't guaranteed to be strict semver.
fn parse_loose_semver(version: &str) -> Option<(u64, u64, u64)> {
    let core = version.split(['-', '+']).next().unwrap_or(version);
    let mut parts = core.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().unwrap_or("0").parse().ok()?;
    let patch = parts.next().unwrap_or("0").parse().ok()?;
    Some((major, minor, patch))
}
