//! Native asset manager (§4.4.1, §4.4.3, §9): resolves, verifies, downloads,
//! and caches the two artifacts the default embedder depends on.
//!
//! Two native shared libraries (a tokenizer and a tensor runtime) plus a
//! model are the conceptual artifacts this subsystem bootstraps.
//! `tokenizers` is a pure-Rust crate here, so
//! there is nothing to download for it; its place is taken by the model
//! bundle, which ships a `tokenizer.json` configuration alongside
//! `model.onnx` the way public model repositories commonly package both
//! together. The tensor runtime keeps its native-library shape: `ort` loads
//! a downloaded `libonnxruntime` dynamically. So two artifact families are
//! managed here: `onnxruntime` (a single shared library, §4.4.1 resolves it
//! by exact platform filename) and `embedding-model` (an archive containing
//! the model and tokenizer config, extracted in full).

pub mod cache;
pub mod download;
pub mod extract;
pub mod lock;
pub mod mirror;
pub mod verify;
pub mod version;

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{ChromiumError, Result};
use extract::ExtractTarget;
use verify::SignatureVerifier;

/// What this crate needs to resolve and verify a release asset: where to
/// look, whose signature to trust, and who to attribute the build to.
#[derive(Clone)]
pub struct AssetManagerConfig {
    pub primary_mirror: String,
    pub fallback_mirror: String,
    pub github_repo: String,
    pub expected_oidc_issuer: String,
    /// Template for the expected certificate SAN identity, with `{repo}` and
    /// `{tag}` placeholders, e.g.
    /// `https://github.com/{repo}/.github/workflows/release.yml@refs/tags/{tag}`.
    pub identity_template: String,
    pub signature_verifier: Arc<dyn SignatureVerifier>,
    pub http_client: reqwest::Client,
    pub github_token: Option<String>,
}

pub struct ResolvedAsset {
    pub path: PathBuf,
    pub version: String,
}

/// Resolve the ONNX Runtime shared library for the current platform,
/// downloading and verifying it into the cache if it is not already there.
pub async fn prepare_runtime_library(
    config: &AssetManagerConfig,
    version_override: Option<String>,
    compiled_default_version: &str,
) -> Result<ResolvedAsset> {
    let platform = cache::platform_tag();
    let lib_filename = runtime_library_filename(&platform);
    let archive_filename = format!("onnxruntime-{platform}.tar.gz");
    prepare_asset(
        config,
        "onnxruntime",
        version_override,
        compiled_default_version,
        &archive_filename,
        download::MAX_LIBRARY_BYTES,
        ExtractTarget::SingleFile { expected_basename: &lib_filename },
    )
    .await
}

/// Resolve the embedding model bundle (`model.onnx` + `tokenizer.json`),
/// downloading and verifying it into the cache if it is not already there.
/// Returns the directory containing the extracted files.
pub async fn prepare_model_bundle(
    config: &AssetManagerConfig,
    version_override: Option<String>,
    compiled_default_version: &str,
) -> Result<ResolvedAsset> {
    let platform = cache::platform_tag();
    let filename = format!("embedding-model-{platform}.tar.gz");
    prepare_asset(
        config,
        "embedding-model",
        version_override,
        compiled_default_version,
        &filename,
        download::MAX_ARCHIVE_BYTES,
        ExtractTarget::AllRegularFiles,
    )
    .await
}

fn runtime_library_filename(platform: &str) -> String {
    if platform.contains("windows") {
        "onnxruntime.dll".to_string()
    } else if platform.contains("darwin") || platform.contains("macos") {
        "libonnxruntime.dylib".to_string()
    } else {
        "libonnxruntime.so".to_string()
    }
}

async fn prepare_asset(
    config: &AssetManagerConfig,
    family: &str,
    version_override: Option<String>,
    compiled_default_version: &str,
    asset_filename: &str,
    max_bytes: u64,
    extract_target: ExtractTarget<'_>,
) -> Result<ResolvedAsset> {
    let mirrors = mirror::build_mirror_list(&[config.primary_mirror.clone(), config.fallback_mirror.clone()]);
    if mirrors.is_empty() {
        return Err(ChromiumError::client("no usable https mirrors configured for asset download"));
    }

    let raw_tag = version_override.unwrap_or_else(|| compiled_default_version.to_string());
    let tag = version::normalize_tag(&raw_tag)?;
    let resolved_version = if tag == "latest" {
        version::resolve_latest(
            &mirrors,
            &config.github_repo,
            config.github_token.as_deref(),
            &config.http_client,
        )
        .await?
    } else {
        tag
    };

    let platform = cache::platform_tag();
    let dest_dir = cache::artifact_dir(family, &resolved_version, &platform);
    cache::ensure_dir_0700(&dest_dir)?;

    let expected_output = match &extract_target {
        ExtractTarget::SingleFile { expected_basename } => dest_dir.join(expected_basename),
        ExtractTarget::AllRegularFiles => dest_dir.join("model.onnx"),
    };
    if expected_output.exists() {
        return Ok(ResolvedAsset { path: dest_dir, version: resolved_version });
    }

    let lock_path = dest_dir.join(".lock");
    let _guard = lock::acquire(&lock_path).await?;

    if expected_output.exists() {
        return Ok(ResolvedAsset { path: dest_dir, version: resolved_version });
    }

    let mut causes = Vec::new();
    for mirror_url in &mirrors {
        match fetch_verify_extract(
            config,
            mirror_url,
            &resolved_version,
            asset_filename,
            &dest_dir,
            max_bytes,
            match &extract_target {
                ExtractTarget::SingleFile { expected_basename } => {
                    ExtractTarget::SingleFile { expected_basename }
                }
                ExtractTarget::AllRegularFiles => ExtractTarget::AllRegularFiles,
            },
        )
        .await
        {
            Ok(()) => return Ok(ResolvedAsset { path: dest_dir, version: resolved_version }),
            Err(e) => causes.push(format!("{mirror_url}: {e}")),
        }
    }

    Err(ChromiumError::client(format!(
        "failed to prepare asset {asset_filename} ({family} {resolved_version}) from any mirror: {}",
        causes.join(" | ")
    )))
}

async fn fetch_verify_extract(
    config: &AssetManagerConfig,
    mirror_url: &url::Url,
    version: &str,
    asset_filename: &str,
    dest_dir: &std::path::Path,
    max_bytes: u64,
    extract_target: ExtractTarget<'_>,
) -> Result<()> {
    let base = mirror_url
        .join(&format!("{version}/"))
        .map_err(|e| ChromiumError::client(format!("invalid release path: {e}")))?;
    let sums_url = base
        .join("SHA256SUMS")
        .map_err(|e| ChromiumError::client(format!("invalid checksum url: {e}")))?;
    let sig_url = base
        .join("SHA256SUMS.sig")
        .map_err(|e| ChromiumError::client(format!("invalid signature url: {e}")))?;
    let cert_url = base
        .join("SHA256SUMS.pem")
        .map_err(|e| ChromiumError::client(format!("invalid certificate url: {e}")))?;

    let (sums_bytes, sig_bytes, cert_bytes) = tokio::try_join!(
        download::fetch_metadata(&config.http_client, &sums_url),
        download::fetch_metadata(&config.http_client, &sig_url),
        download::fetch_metadata(&config.http_client, &cert_url),
    )?;

    let identity = config
        .identity_template
        .replace("{repo}", &config.github_repo)
        .replace("{tag}", version);
    config.signature_verifier.verify(
        &sums_bytes,
        &sig_bytes,
        &cert_bytes,
        &config.expected_oidc_issuer,
        &identity,
    )?;

    let sums_text = String::from_utf8(sums_bytes)
        .map_err(|_| ChromiumError::Corrupted("SHA256SUMS manifest is not valid utf-8".to_string()))?;
    let entries = verify::parse_checksums(&sums_text)?;
    let entry = entries
        .iter()
        .find(|e| e.filename == asset_filename)
        .ok_or_else(|| ChromiumError::client(format!("no checksum entry for {asset_filename}")))?;

    let asset_url = base
        .join(asset_filename)
        .map_err(|e| ChromiumError::client(format!("invalid asset url: {e}")))?;
    let download_client = download::build_download_client()?;
    let archive_path = dest_dir.join(format!("{asset_filename}.src"));
    download::download_to_file(&download_client, &asset_url, &archive_path, max_bytes).await?;

    let bytes = tokio::fs::read(&archive_path)
        .await
        .map_err(|e| ChromiumError::Other(anyhow::anyhow!("failed to read downloaded archive: {e}")))?;
    if let Err(e) = verify::verify_sha256(&bytes, &entry.sha256_hex) {
        let _ = tokio::fs::remove_file(&archive_path).await;
        return Err(e);
    }

    let result = extract::extract_gzip_tar(&archive_path, dest_dir, extract_target);
    let _ = std::fs::remove_file(&archive_path);
    result.map(|_| ())
}
