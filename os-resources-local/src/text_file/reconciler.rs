use std::io;
use std::path::Path;

use super::{validate_path, LocalFilesystem, ReadOutcome, ReconcileError, Storage, TextFile};

/// Performs the four lifecycle operations on one text file at a time.
///
/// Holds no state between calls, so a single value can serve concurrent
/// operations on different files.
#[derive(Debug, Clone, Default)]
pub struct Reconciler<S = LocalFilesystem> {
    storage: S,
}

impl Reconciler<LocalFilesystem> {
    pub fn local() -> Self {
        Reconciler {
            storage: LocalFilesystem,
        }
    }
}

impl<S: Storage> Reconciler<S> {
    pub fn new(storage: S) -> Self {
        Reconciler { storage }
    }

    /// Write `desired.content` to `desired.path`, overwriting anything that
    /// is already there.
    pub fn create(&self, desired: &TextFile) -> Result<TextFile, ReconcileError> {
        desired.validate()?;
        self.write(desired)?;
        tracing::debug!(path = %desired.path.display(), bytes = desired.content.len(), "wrote file");
        Ok(desired.clone())
    }

    /// Report what is currently at `path`.
    ///
    /// A missing file is [`ReadOutcome::Absent`]; every other failure is a
    /// [`ReconcileError::ReadFailure`].
    pub fn read(&self, path: &Path) -> Result<ReadOutcome, ReconcileError> {
        validate_path(path)?;
        let bytes = match self.storage.read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "file is gone");
                return Ok(ReadOutcome::Absent);
            }
            Err(source) => {
                return Err(ReconcileError::ReadFailure {
                    location: path.to_path_buf(),
                    source,
                })
            }
        };
        let content = String::from_utf8(bytes).map_err(|e| ReconcileError::ReadFailure {
            location: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, e.utf8_error()),
        })?;
        Ok(ReadOutcome::Present(TextFile {
            path: path.to_path_buf(),
            content,
        }))
    }

    /// Bring the file from `current` to `desired`.
    ///
    /// The content is always rewritten in full. When the path changes, the
    /// new file is written first and the old one removed afterwards, so a
    /// failed write leaves the old file in place. Two different paths that
    /// name the same file are not a move.
    pub fn update(
        &self,
        desired: &TextFile,
        current: &TextFile,
    ) -> Result<TextFile, ReconcileError> {
        desired.validate()?;
        self.write(desired)?;
        let moved = desired.path != current.path && !self.same_file(desired, current)?;
        let unchanged = !moved && desired.content == current.content;
        tracing::debug!(
            path = %desired.path.display(),
            previous = %current.path.display(),
            moved,
            unchanged,
            "rewrote file"
        );
        if moved {
            self.delete(&current.path)?;
        }
        Ok(desired.clone())
    }

    /// Remove the file at `path`. Succeeds if it is already gone.
    pub fn delete(&self, path: &Path) -> Result<(), ReconcileError> {
        validate_path(path)?;
        match self.storage.remove(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "file was already gone");
                Ok(())
            }
            Err(source) => Err(ReconcileError::DeleteFailure {
                location: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Checked after `desired` was written, so an error concerns the old
    /// location, which is left alone.
    fn same_file(&self, desired: &TextFile, current: &TextFile) -> Result<bool, ReconcileError> {
        validate_path(&current.path)?;
        self.storage
            .same_file(&desired.path, &current.path)
            .map_err(|source| ReconcileError::DeleteFailure {
                location: current.path.clone(),
                source,
            })
    }

    fn write(&self, file: &TextFile) -> Result<(), ReconcileError> {
        self.storage
            .write(&file.path, file.content.as_bytes())
            .map_err(|source| ReconcileError::WriteFailure {
                location: file.path.clone(),
                source,
            })
    }
}
