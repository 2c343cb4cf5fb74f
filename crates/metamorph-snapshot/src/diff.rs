//! Change detection between two snapshots

use metamorph_core::{ChangeKind, ChangeSet, FileChange, FileSnapshot};

/// Paths added or modified in `after` relative to `before`
///
/// Paths that disappeared are not part of the result; see [`detect_removed`].
pub fn detect_changes(before: &FileSnapshot, after: &FileSnapshot) -> ChangeSet {
    let mut changes = ChangeSet::new();

    for (path, entry) in after.iter() {
        let kind = match before.get(path) {
            None => ChangeKind::Added,
            Some(old) if old.digest != entry.digest => ChangeKind::Modified,
            Some(_) => continue,
        };

        changes.insert(
            path,
            FileChange {
                kind,
                content: entry.content.clone(),
            },
        );
    }

    changes
}

/// Paths present in `before` but missing from `after`
pub fn detect_removed(before: &FileSnapshot, after: &FileSnapshot) -> Vec<String> {
    before
        .paths()
        .filter(|path| !after.contains(path))
        .map(str::to_string)
        .collect()
}
