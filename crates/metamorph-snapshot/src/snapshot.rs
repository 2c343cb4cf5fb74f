//! Text snapshots of a working tree
//!
//! A snapshot maps forward-slash relative paths to file text. Entries whose
//! name starts with `.` are pruned (directories are not descended), files
//! that are not valid UTF-8 are treated as binary and skipped, and symlinks
//! are never followed. None of these cases is an error.

use metamorph_core::{FileSnapshot, MetamorphError, Result, SnapshotEntry};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// SHA-256 of `content`, hex encoded
pub fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether an entry name is hidden and must be excluded
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

fn is_hidden(entry: &DirEntry) -> bool {
    // The root itself may live under a dot-named temp dir
    entry.depth() > 0 && is_hidden_name(&entry.file_name().to_string_lossy())
}

/// Capture a snapshot of `root` on the blocking pool
pub async fn capture(root: PathBuf) -> Result<FileSnapshot> {
    tokio::task::spawn_blocking(move || capture_blocking(&root))
        .await
        .map_err(|e| MetamorphError::Other(format!("Snapshot task failed: {}", e)))?
}

/// Capture a snapshot of `root`
pub fn capture_blocking(root: &Path) -> Result<FileSnapshot> {
    if !root.is_dir() {
        return Err(MetamorphError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("snapshot root {} is not a directory", root.display()),
        )));
    }

    let mut snapshot = FileSnapshot::new();
    let mut skipped = 0usize;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                skipped += 1;
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let Some(rel) = relative_path(root, entry.path()) else {
            debug!("Skipping non UTF-8 path {:?}", entry.path());
            skipped += 1;
            continue;
        };

        let bytes = match std::fs::read(entry.path()) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Skipping unreadable file {}: {}", rel, e);
                skipped += 1;
                continue;
            }
        };

        match String::from_utf8(bytes) {
            Ok(content) => {
                let digest = content_digest(&content);
                snapshot.insert(rel, SnapshotEntry { content, digest });
            }
            Err(_) => {
                debug!("Skipping binary file {}", rel);
                skipped += 1;
            }
        }
    }

    info!(
        "Captured snapshot of {:?}: {} files ({} skipped)",
        root,
        snapshot.len(),
        skipped
    );

    Ok(snapshot)
}

/// `path` relative to `root`, joined with `/`
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
