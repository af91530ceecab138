//! Byte-limited, retrying artifact download (§4.4.1 step 5).
//!
//! A dedicated `reqwest::Client` with a custom redirect policy rejects any
//! hop that would downgrade `https` to `http`; declared and actual body size
//! are each checked against a per-artifact-type cap so a misconfigured or
//! hostile mirror cannot exhaust disk space.

use std::path::Path;

use futures_util::StreamExt;
use reqwest::{redirect, Client, Url};
use tokio::io::AsyncWriteExt;

use crate::error::{ChromiumError, Result};

pub const MAX_LIBRARY_BYTES: u64 = 200 * 1024 * 1024;
pub const MAX_ARCHIVE_BYTES: u64 = 500 * 1024 * 1024;
pub const MAX_METADATA_BYTES: u64 = 5 * 1024 * 1024;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: std::time::Duration = std::time::Duration::from_millis(250);
const MAX_REDIRECTS: usize = 5;

/// Build a client dedicated to asset downloads: redirects are followed up to
/// a small bound, and an `https -> http` hop is rejected outright.
pub fn build_download_client() -> Result<Client> {
    Client::builder()
        .redirect(redirect::Policy::custom(|attempt| {
            let downgraded = attempt
                .previous()
                .last()
                .map(|prev| prev.scheme() == "https")
                .unwrap_or(false)
                && attempt.url().scheme() == "http";
            if downgraded {
                attempt.error("refusing to follow an https -> http redirect")
            } else if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else {
                attempt.follow()
            }
        }))
        .build()
        .map_err(|e| ChromiumError::client(format!("failed to build download client: {e}")))
}

/// Fetch a small metadata document (checksum manifest, signature,
/// certificate) entirely into memory, capped at [`MAX_METADATA_BYTES`].
pub async fn fetch_metadata(client: &Client, url: &Url) -> Result<Vec<u8>> {
    let response = client.get(url.clone()).send().await?;
    if !response.status().is_success() {
        return Err(ChromiumError::Transport {
            message: format!("metadata fetch {url} returned {}", response.status()),
            cause: None,
        });
    }
    if let Some(len) = response.content_length() {
        check_against_limit(len, MAX_METADATA_BYTES)?;
    }
    let bytes = response.bytes().await?;
    check_against_limit(bytes.len() as u64, MAX_METADATA_BYTES)?;
    Ok(bytes.to_vec())
}

/// Stream a download to `dest`, retrying transient failures, capped at
/// `max_bytes`. Written atomically via a temp file + rename.
pub async fn download_to_file(client: &Client, url: &Url, dest: &Path, max_bytes: u64) -> Result<()> {
    let tmp_path = dest.with_extension("download-tmp");
    let mut last_err = None;

    for attempt in 1..=MAX_ATTEMPTS {
        match try_download_once(client, url, &tmp_path, max_bytes).await {
            Ok(()) => {
                tokio::fs::rename(&tmp_path, dest).await.map_err(|e| {
                    ChromiumError::Other(anyhow::anyhow!("failed to finalize download: {e}"))
                })?;
                return Ok(());
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                let retryable = e.is_retryable();
                last_err = Some(e);
                if !retryable || attempt == MAX_ATTEMPTS {
                    break;
                }
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| ChromiumError::client("download failed with no attempts made")))
}

async fn try_download_once(client: &Client, url: &Url, tmp_path: &Path, max_bytes: u64) -> Result<()> {
    let response = client.get(url.clone()).send().await?;

    if !response.status().is_success() {
        return Err(ChromiumError::Transport {
            message: format!("download of {url} returned {}", response.status()),
            cause: None,
        });
    }

    let declared_len = response.content_length();
    if let Some(len) = declared_len {
        check_against_limit(len, max_bytes)?;
    }

    let mut file = tokio::fs::File::create(tmp_path).await.map_err(|e| {
        ChromiumError::Other(anyhow::anyhow!("failed to create temp file {}: {e}", tmp_path.display()))
    })?;

    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        written += chunk.len() as u64;
        check_against_limit(written, max_bytes)?;
        file.write_all(&chunk).await.map_err(|e| {
            ChromiumError::Other(anyhow::anyhow!("failed to write download chunk: {e}"))
        })?;
    }
    file.flush().await.ok();

    if let Some(len) = declared_len {
        if written != len {
            return Err(ChromiumError::Corrupted(format!(
                "downloaded {written} bytes, server declared {len}"
            )));
        }
    }
    Ok(())
}

fn check_against_limit(len: u64, max: u64) -> Result<()> {
    if len > max {
        Err(ChromiumError::IntegrityLimit(format!(
            "size {len} bytes exceeds limit of {max} bytes"
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_client_builds_successfully() {
        build_download_client().unwrap();
    }

    #[test]
    fn limit_check_rejects_oversized_length() {
        let err = check_against_limit(MAX_LIBRARY_BYTES + 1, MAX_LIBRARY_BYTES).unwrap_err();
        assert!(matches!(err, ChromiumError::IntegrityLimit(_)));
    }

    #[test]
    fn limit_check_allows_exact_boundary() {
        check_against_limit(MAX_METADATA_BYTES, MAX_METADATA_BYTES).unwrap();
    }
}
