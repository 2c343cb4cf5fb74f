//! Extraction of repository archives
//!
//! The hosting platform wraps the tree in a single top-level directory named
//! after the commit (`owner-name-<sha>/`). That directory is the repository
//! root handed to the agent.

use metamorph_core::{MetamorphError, Result};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

/// Extract a zip archive into `dest` on the blocking pool
///
/// Returns the path of the archive's top-level directory.
pub async fn extract_archive(bytes: Vec<u8>, dest: PathBuf) -> Result<PathBuf> {
    tokio::task::spawn_blocking(move || extract_archive_blocking(&bytes, &dest))
        .await
        .map_err(|e| MetamorphError::Other(format!("Archive extraction task failed: {}", e)))?
}

/// Extract a zip archive into `dest` and locate its top-level directory
pub fn extract_archive_blocking(bytes: &[u8], dest: &Path) -> Result<PathBuf> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| MetamorphError::MalformedArchive(format!("Unreadable zip: {}", e)))?;

    debug!("Extracting {} archive entries into {:?}", archive.len(), dest);

    archive
        .extract(dest)
        .map_err(|e| MetamorphError::MalformedArchive(format!("Extraction failed: {}", e)))?;

    let root = top_level_dir(dest)?;
    info!("Extracted repository to {:?}", root);
    Ok(root)
}

/// First top-level directory under `dest`, in name order
fn top_level_dir(dest: &Path) -> Result<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(dest)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect();

    dirs.sort();

    if dirs.len() > 1 {
        debug!("Archive has {} top-level directories, using the first", dirs.len());
    }

    dirs.into_iter()
        .next()
        .ok_or_else(|| MetamorphError::MalformedArchive("No folder found in archive".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn build_zip(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, content) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extracts_into_commit_directory() {
        let dest = TempDir::new().unwrap();
        let bytes = build_zip(&[
            ("acme-widgets-1a2b3c/src/a.go", "package a\n"),
            ("acme-widgets-1a2b3c/README.md", "# widgets\n"),
        ]);

        let root = extract_archive_blocking(&bytes, dest.path()).unwrap();

        assert_eq!(root, dest.path().join("acme-widgets-1a2b3c"));
        assert_eq!(
            std::fs::read_to_string(root.join("src/a.go")).unwrap(),
            "package a\n"
        );
    }

    #[test]
    fn test_no_top_level_directory_is_malformed() {
        let dest = TempDir::new().unwrap();
        let bytes = build_zip(&[("README.md", "flat")]);

        let err = extract_archive_blocking(&bytes, dest.path()).unwrap_err();
        assert!(matches!(err, MetamorphError::MalformedArchive(_)));
    }

    #[test]
    fn test_garbage_bytes_are_malformed() {
        let dest = TempDir::new().unwrap();
        let err = extract_archive_blocking(b"<html>not a zip</html>", dest.path()).unwrap_err();
        assert!(matches!(err, MetamorphError::MalformedArchive(_)));
    }

    #[test]
    fn test_multiple_top_level_directories_picks_first_by_name() {
        let dest = TempDir::new().unwrap();
        let bytes = build_zip(&[("zeta/a.txt", "z"), ("alpha/b.txt", "a")]);

        let root = extract_archive_blocking(&bytes, dest.path()).unwrap();
        assert_eq!(root, dest.path().join("alpha"));
    }

    #[tokio::test]
    async fn test_async_extract() {
        let dest = TempDir::new().unwrap();
        let bytes = build_zip(&[("repo-abc/x.txt", "x")]);

        let root = extract_archive(bytes, dest.path().to_path_buf()).await.unwrap();
        assert!(root.join("x.txt").is_file());
    }
}
