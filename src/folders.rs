//! Subject folder resolution
//!
//! Input paths are either subject folders (holding artifacts directly) or parent
//! folders whose immediate subfolders are subjects.

use crate::schema::has_artifacts;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Expand `paths` into the sorted, de-duplicated set of subject folders
pub fn resolve_folders<P: AsRef<Path>>(paths: &[P]) -> Vec<PathBuf> {
    let mut subjects = BTreeSet::new();

    for path in paths {
        let path = path.as_ref();
        if !path.is_dir() {
            debug!(path = %path.display(), "skipping non-directory input");
            continue;
        }

        if has_artifacts(path) {
            subjects.insert(path.to_path_buf());
            continue;
        }

        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot list folder");
                continue;
            }
        };

        for entry in entries.flatten() {
            let sub = entry.path();
            if sub.is_dir() && has_artifacts(&sub) {
                subjects.insert(sub);
            }
        }
    }

    subjects.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn subject(parent: &Path, name: &str) -> PathBuf {
        let folder = parent.join(name);
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("data.json"), "{}").unwrap();
        folder
    }

    #[test]
    fn test_parent_folder_expands_to_subjects() {
        let dir = tempfile::tempdir().unwrap();
        let b = subject(dir.path(), "B_1");
        let a = subject(dir.path(), "A_1");
        fs::create_dir(dir.path().join("empty_subject")).unwrap();

        assert_eq!(resolve_folders(&[dir.path()]), vec![a, b]);
    }

    #[test]
    fn test_subject_folder_used_directly() {
        let dir = tempfile::tempdir().unwrap();
        let a = subject(dir.path(), "A_1");
        // Nested folders of a subject are not searched
        subject(&a, "nested_1");

        assert_eq!(resolve_folders(&[a.clone()]), vec![a]);
    }

    #[test]
    fn test_duplicates_and_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let a = subject(dir.path(), "A_1");
        let missing = dir.path().join("missing");

        let resolved = resolve_folders(&[a.clone(), dir.path().to_path_buf(), missing]);
        assert_eq!(resolved, vec![a]);
    }
}
