//! # metamorph-snapshot
//!
//! Everything a healing run does on the local filesystem:
//! - Request-scoped working areas that delete themselves
//! - Extraction of the hosting platform's zip archives
//! - Text snapshots of a file tree (hidden and binary files skipped)
//! - Change detection between two snapshots

mod archive;
mod diff;
mod snapshot;
mod working_area;

pub use archive::{extract_archive, extract_archive_blocking};
pub use diff::{detect_changes, detect_removed};
pub use snapshot::{capture, capture_blocking, content_digest, is_hidden_name};
pub use working_area::WorkingArea;
