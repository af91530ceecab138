//! Streaming gzip→tar extraction with per-entry byte caps (§4.4.1 step 6).

use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;

use crate::error::{ChromiumError, Result};

pub const MAX_ENTRY_BYTES: u64 = 500 * 1024 * 1024;

/// What to pull out of the archive: a single named file (the shared library
/// case) or every regular file (the model bundle case, which ships a model
/// file alongside a tokenizer configuration).
pub enum ExtractTarget<'a> {
    SingleFile { expected_basename: &'a str },
    AllRegularFiles,
}

/// Extract matching entries from a `.tar.gz` archive into `dest_dir`,
/// rejecting any entry that declares a size over [`MAX_ENTRY_BYTES`] and
/// truncating the actual read at that bound regardless of what the header
/// claims. Returns the paths written.
pub fn extract_gzip_tar(
    archive_path: &Path,
    dest_dir: &Path,
    target: ExtractTarget,
) -> Result<Vec<PathBuf>> {
    let file = std::fs::File::open(archive_path).map_err(|e| {
        ChromiumError::Other(anyhow::anyhow!(
            "failed to open archive {}: {e}",
            archive_path.display()
        ))
    })?;
    std::fs::create_dir_all(dest_dir).map_err(|e| {
        ChromiumError::Other(anyhow::anyhow!(
            "failed to create extraction directory {}: {e}",
            dest_dir.display()
        ))
    })?;

    let decoder = GzDecoder::new(file);
    let mut archive = Archive::new(decoder);
    let entries = archive
        .entries()
        .map_err(|e| ChromiumError::Corrupted(format!("failed to read tar entries: {e}")))?;

    let mut extracted = Vec::new();
    for entry in entries {
        let mut entry = entry.map_err(|e| ChromiumError::Corrupted(format!("malformed tar entry: {e}")))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let entry_path = entry
            .path()
            .map_err(|e| ChromiumError::Corrupted(format!("malformed tar entry path: {e}")))?
            .into_owned();
        let basename = entry_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        if basename.is_empty() {
            continue;
        }

        let should_extract = match &target {
            ExtractTarget::SingleFile { expected_basename } => basename == *expected_basename,
            ExtractTarget::AllRegularFiles => true,
        };
        if !should_extract {
            continue;
        }

        let declared_size = entry.header().size().unwrap_or(0);
        if declared_size > MAX_ENTRY_BYTES {
            return Err(ChromiumError::IntegrityLimit(format!(
                "tar entry {basename} declares {declared_size} bytes, exceeds per-entry limit of {MAX_ENTRY_BYTES}"
            )));
        }

        let out_path = dest_dir.join(&basename);
        let mut out_file = std::fs::File::create(&out_path).map_err(|e| {
            ChromiumError::Other(anyhow::anyhow!(
                "failed to create extracted file {}: {e}",
                out_path.display()
            ))
        })?;
        let mut limited = entry.take(MAX_ENTRY_BYTES);
        std::io::copy(&mut limited, &mut out_file)
            .map_err(|e| ChromiumError::Other(anyhow::anyhow!("failed to extract {basename}: {e}")))?;

        set_owner_only_permissions(&out_path)?;
        extracted.push(out_path);

        if matches!(target, ExtractTarget::SingleFile { .. }) {
            break;
        }
    }

    if extracted.is_empty() {
        return Err(ChromiumError::Corrupted(
            "archive did not contain the expected file(s)".to_string(),
        ));
    }
    Ok(extracted)
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(|e| {
        ChromiumError::Other(anyhow::anyhow!(
            "failed to set permissions on {}: {e}",
            path.display()
        ))
    })
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *contents).unwrap();
        }
        let tar_bytes = builder.into_inner().unwrap();

        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn extracts_single_named_file() {
        let dir = std::env::temp_dir().join(format!("chromium-extract-test-{}", std::process::id()));
        let archive_path = dir.join("archive.tar.gz");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(&archive_path, build_archive(&[("libonnxruntime.so", b"binary")])).unwrap();

        let dest = dir.join("out");
        let extracted = extract_gzip_tar(
            &archive_path,
            &dest,
            ExtractTarget::SingleFile { expected_basename: "libonnxruntime.so" },
        )
        .unwrap();

        assert_eq!(extracted.len(), 1);
        assert_eq!(std::fs::read(&extracted[0]).unwrap(), b"binary");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn extracts_all_regular_files_for_model_bundle() {
        let dir = std::env::temp_dir().join(format!("chromium-extract-test-bundle-{}", std::process::id()));
        let archive_path = dir.join("bundle.tar.gz");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            &archive_path,
            build_archive(&[("model.onnx", b"onnx-bytes"), ("tokenizer.json", b"{}")]),
        )
        .unwrap();

        let dest = dir.join("out");
        let extracted = extract_gzip_tar(&archive_path, &dest, ExtractTarget::AllRegularFiles).unwrap();
        assert_eq!(extracted.len(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_expected_file_is_corrupted_error() {
        let dir = std::env::temp_dir().join(format!("chromium-extract-test-missing-{}", std::process::id()));
        let archive_path = dir.join("archive.tar.gz");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(&archive_path, build_archive(&[("other.bin", b"x")])).unwrap();

        let dest = dir.join("out");
        let err = extract_gzip_tar(
            &archive_path,
            &dest,
            ExtractTarget::SingleFile { expected_basename: "libonnxruntime.so" },
        )
        .unwrap_err();
        assert!(matches!(err, ChromiumError::Corrupted(_)));
        std::fs::remove_dir_all(&dir).ok();
    }
}
