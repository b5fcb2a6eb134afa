//! Directory-backed reference photo store.
//!
//! Enrolled subjects are plain files: `<dir>/<subject>.jpg`. A missing
//! file means no reference is enrolled; any other read failure is an
//! infrastructure fault that the reference gate degrades to "not
//! evaluated".

use std::path::PathBuf;
use veridoc_core::{RecognitionError, ReferenceStore};

pub struct DirReferenceStore {
    dir: PathBuf,
}

impl DirReferenceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

/// Subject ids become file names; anything that could escape the store
/// directory is treated as not enrolled.
fn valid_subject_id(subject_id: &str) -> bool {
    !subject_id.is_empty()
        && subject_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl ReferenceStore for DirReferenceStore {
    fn fetch(&self, subject_id: &str) -> Result<Option<Vec<u8>>, RecognitionError> {
        if !valid_subject_id(subject_id) {
            tracing::debug!(subject_id, "subject id not usable as a reference key");
            return Ok(None);
        }

        let path = self.dir.join(format!("{subject_id}.jpg"));
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(RecognitionError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> (PathBuf, DirReferenceStore) {
        let dir = std::env::temp_dir().join(format!("veridoc-refs-{}-{tag}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        (dir.clone(), DirReferenceStore::new(dir))
    }

    #[test]
    fn test_fetch_enrolled_reference() {
        let (dir, store) = temp_store("hit");
        std::fs::write(dir.join("subject-1.jpg"), b"jpegbytes").unwrap();

        let bytes = store.fetch("subject-1").unwrap().unwrap();
        assert_eq!(bytes, b"jpegbytes");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_fetch_missing_is_none() {
        let (dir, store) = temp_store("miss");
        assert!(store.fetch("nobody").unwrap().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_traversal_ids_are_not_enrolled() {
        let (dir, store) = temp_store("traversal");
        assert!(store.fetch("../etc/passwd").unwrap().is_none());
        assert!(store.fetch("").unwrap().is_none());
        assert!(store.fetch("a/b").unwrap().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_valid_ids() {
        assert!(valid_subject_id("user-42_A"));
        assert!(!valid_subject_id("user 42"));
        assert!(!valid_subject_id("user.42"));
    }
}
