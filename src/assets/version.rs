//! Version tag normalization and `latest` resolution (§4.4.1 step 1).

use semver::Version;

use crate::error::{ChromiumError, Result};

const MAX_TAG_LEN: usize = 128;
const VENDOR_PREFIX: &str = "rust-v";

/// Normalize a caller- or environment-supplied version tag. `"latest"` is
/// passed through unchanged; anything else must parse as semver once a
/// leading `rust-v` or bare `v` prefix is stripped.
pub fn normalize_tag(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Err(ChromiumError::validation("version tag must not be empty"));
    }
    if raw.len() > MAX_TAG_LEN {
        return Err(ChromiumError::validation(format!(
            "version tag exceeds {MAX_TAG_LEN} characters"
        )));
    }
    if raw == "latest" {
        return Ok(raw.to_string());
    }
    let stripped = strip_known_prefix(raw);
    Version::parse(stripped)
        .map_err(|e| ChromiumError::validation(format!("invalid version tag {raw:?}: {e}")))?;
    Ok(stripped.to_string())
}

fn strip_known_prefix(raw: &str) -> &str {
    raw.strip_prefix(VENDOR_PREFIX)
        .or_else(|| raw.strip_prefix('v'))
        .unwrap_or(raw)
}

/// Resolve `"latest"` to a concrete version by trying, in order, the
/// `latest.json` pointer on each mirror and finally the upstream release
/// listing. Each attempt's failure is folded into the final error so the
/// caller can see why every source was rejected.
pub async fn resolve_latest(
    mirrors: &[url::Url],
    github_repo: &str,
    github_token: Option<&str>,
    http: &reqwest::Client,
) -> Result<String> {
    let mut causes = Vec::new();

    for mirror in mirrors {
        match fetch_latest_json(http, mirror).await {
            Ok(tag) => return normalize_tag(&tag),
            Err(e) => causes.push(format!("{mirror}: {e}")),
        }
    }

    match fetch_latest_from_releases(http, github_repo, github_token).await {
        Ok(tag) => return normalize_tag(&tag),
        Err(e) => causes.push(format!("releases listing: {e}")),
    }

    Err(ChromiumError::client(format!(
        "failed to resolve latest asset version from any source: {}",
        causes.join(" | ")
    )))
}

#[derive(serde::Deserialize)]
struct LatestJson {
    tag: String,
}

async fn fetch_latest_json(http: &reqwest::Client, mirror: &url::Url) -> Result<String> {
    let url = mirror
        .join("latest.json")
        .map_err(|e| ChromiumError::client(format!("invalid mirror url: {e}")))?;
    let response = http.get(url).send().await?;
    if !response.status().is_success() {
        return Err(ChromiumError::Transport {
            message: format!("latest.json fetch returned {}", response.status()),
            cause: None,
        });
    }
    let parsed: LatestJson = response
        .json()
        .await
        .map_err(|e| ChromiumError::Transport { message: e.to_string(), cause: None })?;
    Ok(parsed.tag)
}

#[derive(serde::Deserialize)]
struct Release {
    tag_name: String,
}

async fn fetch_latest_from_releases(
    http: &reqwest::Client,
    repo: &str,
    token: Option<&str>,
) -> Result<String> {
    let url = format!("https://api.github.com/repos/{repo}/releases");
    let mut request = http.get(&url).header("User-Agent", "chromium-rs");
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(ChromiumError::Transport {
            message: format!("releases listing returned {}", response.status()),
            cause: None,
        });
    }
    let releases: Vec<Release> = response
        .json()
        .await
        .map_err(|e| ChromiumError::Transport { message: e.to_string(), cause: None })?;
    releases
        .into_iter()
        .map(|r| r.tag_name)
        .find(|tag| tag.starts_with(VENDOR_PREFIX))
        .ok_or_else(|| ChromiumError::client("no vendor-prefixed tag found in releases listing"))
}
