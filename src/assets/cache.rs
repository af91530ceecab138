//! On-disk cache layout (§4.4.1 step 7, §6 filesystem layout):
//! `${HOME}/.cache/chroma/<artifact-family>/<version>/<platform>/<filename>`,
//! with owner-only directory permissions.

use std::path::{Path, PathBuf};

use crate::error::{ChromiumError, Result};

/// Root of the asset cache. Overridable via `CHROMIUM_ASSET_CACHE_DIR` for
/// tests and sandboxed environments where `$HOME` is not writable.
pub fn cache_root() -> PathBuf {
    if let Ok(dir) = std::env::var("CHROMIUM_ASSET_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".cache/chroma")
}

pub fn artifact_dir(family: &str, version: &str, platform: &str) -> PathBuf {
    cache_root().join(family).join(version).join(platform)
}

/// Create `path` (and parents) and restrict it to owner-only access.
pub fn ensure_dir_0700(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| {
        ChromiumError::Other(anyhow::anyhow!(
            "failed to create cache directory {}: {e}",
            path.display()
        ))
    })?;
    set_dir_permissions(path)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).map_err(|e| {
        ChromiumError::Other(anyhow::anyhow!(
            "failed to set permissions on {}: {e}",
            path.display()
        ))
    })
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// `<arch>-<os>[-musl]` platform tag used as a cache path segment and in
/// release asset filenames.
pub fn platform_tag() -> String {
    let arch = std::env::consts::ARCH;
    let os = std::env::consts::OS;
    if os == "linux" && is_musl() {
        format!("{arch}-{os}-musl")
    } else {
        format!("{arch}-{os}")
    }
}

fn is_musl() -> bool {
    if Path::new("/etc/alpine-release").exists() {
        return true;
    }
    let Ok(output) = std::process::Command::new("ldd").arg("--version").output() else {
        return false;
    };
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text.to_lowercase().contains("musl")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_dir_follows_expected_layout() {
        unsafe {
            std::env::set_var("CHROMIUM_ASSET_CACHE_DIR", "/tmp/chromium-cache-test");
        }
        let dir = artifact_dir("onnxruntime", "1.2.3", "x86_64-linux");
        assert_eq!(
            dir,
            PathBuf::from("/tmp/chromium-cache-test/onnxruntime/1.2.3/x86_64-linux")
        );
        unsafe {
            std::env::remove_var("CHROMIUM_ASSET_CACHE_DIR");
        }
    }

    #[test]
    fn platform_tag_is_non_empty() {
        assert!(!platform_tag().is_empty());
    }
}
