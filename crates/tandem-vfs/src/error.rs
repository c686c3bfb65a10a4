//! Error types for storage operations.
//!
//! Every device operation reports failures as a [`FileError`]: a user-facing
//! message plus a system detail string, tagged with a kind so callers can
//! branch on the few cases that matter (target already existing, source
//! locked, cross-device move, timeout). Cancellation is not a file error;
//! it travels as the separate [`Cancelled`] marker.

use std::io;

/// Classification of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileErrorKind {
    /// Anything without special handling.
    General,
    /// Create-new semantics violated: the target already exists.
    TargetExisting,
    /// Source cannot be read due to an exclusive lock.
    FileLocked,
    /// Rename across non-equivalent devices or unsupported filesystems.
    MoveUnsupported,
    /// Existence check did not come back in time.
    Timeout,
}

/// A failed storage operation: user-facing message + system detail.
#[derive(Debug, Clone)]
pub struct FileError {
    pub message: String,
    pub detail: String,
    pub kind: FileErrorKind,
}

impl FileError {
    pub fn new(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: detail.into(),
            kind: FileErrorKind::General,
        }
    }

    pub fn target_existing(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: FileErrorKind::TargetExisting,
            ..Self::new(message, detail)
        }
    }

    pub fn file_locked(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: FileErrorKind::FileLocked,
            ..Self::new(message, detail)
        }
    }

    pub fn move_unsupported(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: FileErrorKind::MoveUnsupported,
            ..Self::new(message, detail)
        }
    }

    pub fn timeout(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: FileErrorKind::Timeout,
            ..Self::new(message, detail)
        }
    }

    /// Wrap an io::Error, classifying the kinds we branch on later.
    pub fn from_io(message: impl Into<String>, err: &io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::AlreadyExists => FileErrorKind::TargetExisting,
            io::ErrorKind::WouldBlock => FileErrorKind::FileLocked,
            io::ErrorKind::TimedOut => FileErrorKind::Timeout,
            _ => FileErrorKind::General,
        };
        Self {
            message: message.into(),
            detail: err.to_string(),
            kind,
        }
    }

    pub fn is_target_existing(&self) -> bool {
        self.kind == FileErrorKind::TargetExisting
    }

    pub fn is_move_unsupported(&self) -> bool {
        self.kind == FileErrorKind::MoveUnsupported
    }
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} ({})", self.message, self.detail)
        }
    }
}

impl std::error::Error for FileError {}

/// The user (or host) aborted via the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Result of an operation that takes a progress callback: it can fail like
/// any storage operation, or be cut short by the callback.
#[derive(Debug)]
pub enum OpError {
    File(FileError),
    Cancelled,
}

impl From<FileError> for OpError {
    fn from(err: FileError) -> Self {
        OpError::File(err)
    }
}

impl From<Cancelled> for OpError {
    fn from(_: Cancelled) -> Self {
        OpError::Cancelled
    }
}

impl std::fmt::Display for OpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpError::File(err) => err.fmt(f),
            OpError::Cancelled => Cancelled.fmt(f),
        }
    }
}

impl std::error::Error for OpError {}
