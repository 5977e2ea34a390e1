//! Reconciliation of a single text file.
//!
//! A [`TextFile`] is both what the orchestrator asks for and what we report
//! back. The [`Reconciler`] makes the file on disk match the former and
//! reads it back to produce the latter.

mod error;
mod reconciler;
mod storage;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use error::ReconcileError;
pub use reconciler::Reconciler;
pub use storage::{LocalFilesystem, Storage, FILE_MODE};

/// The two properties of a managed text file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextFile {
    /// Where the file lives. Must be absolute.
    pub path: PathBuf,
    /// The entire content of the file.
    pub content: String,
}

impl TextFile {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        TextFile {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Reject locations that cannot be managed: empty or relative paths.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        validate_path(&self.path)
    }
}

pub(crate) fn validate_path(path: &Path) -> Result<(), ReconcileError> {
    if path.as_os_str().is_empty() {
        return Err(ReconcileError::invalid_input(None, "path must not be empty"));
    }
    if !path.is_absolute() {
        return Err(ReconcileError::invalid_input(
            Some(path),
            "path must be absolute",
        ));
    }
    Ok(())
}

/// What [`Reconciler::read`] found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Present(TextFile),
    /// Nothing exists at the location; it was removed behind our back.
    Absent,
}

impl ReadOutcome {
    pub fn is_absent(&self) -> bool {
        matches!(self, ReadOutcome::Absent)
    }

    pub fn present(self) -> Option<TextFile> {
        match self {
            ReadOutcome::Present(file) => Some(file),
            ReadOutcome::Absent => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_properties() {
        let file: TextFile = serde_json::from_value(json!({
            "path": "/tmp/a.txt",
            "content": "hello",
        }))
        .unwrap();
        assert_eq!(file, TextFile::new("/tmp/a.txt", "hello"));
    }

    #[test]
    fn decode_rejects_unknown_property() {
        let r = serde_json::from_value::<TextFile>(json!({
            "path": "/tmp/a.txt",
            "content": "hello",
            "mode": "0755",
        }));
        assert!(r.is_err());
    }

    #[test]
    fn decode_rejects_missing_content() {
        let r = serde_json::from_value::<TextFile>(json!({ "path": "/tmp/a.txt" }));
        assert!(r.is_err());
    }

    #[test]
    fn validate_paths() {
        assert!(TextFile::new("/tmp/a.txt", "").validate().is_ok());

        let e = TextFile::new("", "x").validate().unwrap_err();
        assert!(matches!(e, ReconcileError::InvalidInput { location: None, .. }));

        let e = TextFile::new("a.txt", "x").validate().unwrap_err();
        assert!(matches!(
            e,
            ReconcileError::InvalidInput { location: Some(ref p), .. } if p == Path::new("a.txt")
        ));
    }
}
