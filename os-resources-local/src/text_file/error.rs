use std::io;
use std::path::{Path, PathBuf};

use os_resource::schema::v0;

/// Why a lifecycle operation on a text file failed.
///
/// A missing file is not an error for [`super::Reconciler::read`] or
/// [`super::Reconciler::delete`], so `NotFound` never shows up in
/// `ReadFailure` or `DeleteFailure`.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Could not write file at {}: {source}", .location.display())]
    WriteFailure {
        location: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not read file at {}: {source}", .location.display())]
    ReadFailure {
        location: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not delete file at {}: {source}", .location.display())]
    DeleteFailure {
        location: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid input{}: {reason}", .location.as_ref().map(|l| format!(" for {}", l.display())).unwrap_or_default())]
    InvalidInput {
        location: Option<PathBuf>,
        reason: String,
    },
}

impl ReconcileError {
    pub(crate) fn invalid_input(location: Option<&Path>, reason: impl Into<String>) -> Self {
        ReconcileError::InvalidInput {
            location: location.map(Path::to_path_buf),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> v0::ResourceErrorKind {
        match self {
            ReconcileError::WriteFailure { .. } => v0::ResourceErrorKind::WriteFailure,
            ReconcileError::ReadFailure { .. } => v0::ResourceErrorKind::ReadFailure,
            ReconcileError::DeleteFailure { .. } => v0::ResourceErrorKind::DeleteFailure,
            ReconcileError::InvalidInput { .. } => v0::ResourceErrorKind::InvalidInput,
        }
    }

    pub fn location(&self) -> Option<&Path> {
        match self {
            ReconcileError::WriteFailure { location, .. }
            | ReconcileError::ReadFailure { location, .. }
            | ReconcileError::DeleteFailure { location, .. } => Some(location),
            ReconcileError::InvalidInput { location, .. } => location.as_deref(),
        }
    }

    /// The underlying cause, without the location prefix.
    pub fn cause(&self) -> String {
        match self {
            ReconcileError::WriteFailure { source, .. }
            | ReconcileError::ReadFailure { source, .. }
            | ReconcileError::DeleteFailure { source, .. } => source.to_string(),
            ReconcileError::InvalidInput { reason, .. } => reason.clone(),
        }
    }
}

impl From<&ReconcileError> for v0::ResourceError {
    fn from(e: &ReconcileError) -> Self {
        v0::ResourceError {
            kind: e.kind(),
            location: e.location().map(|l| l.display().to_string()),
            cause: e.cause(),
        }
    }
}

impl From<ReconcileError> for v0::ResourceError {
    fn from(e: ReconcileError) -> Self {
        v0::ResourceError::from(&e)
    }
}
