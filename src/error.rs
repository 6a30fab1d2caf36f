//! Wire-stable error kinds for the storage engine.
//!
//! Each variant's `Display` text is the exact string a caller on the
//! other side of the drive's programmatic surface sees — callers
//! should match on the variant, not the string, but the string is kept
//! stable regardless.

use thiserror::Error;

/// Every error the storage engine can return to a caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriveError {
    #[error("Invalid object's name.")]
    InvalidName,

    #[error("Invalid path.")]
    InvalidPath,

    #[error("Object is a file.")]
    PathToFile,

    #[error("Object is a directory.")]
    PathToDir,

    #[error("Missing permissions.")]
    PermissionError,

    #[error("File is too big.")]
    FileTooBig,

    #[error("Cannot rename this object.")]
    CannotRename,

    #[error("This name is already in use.")]
    NameInUse,

    #[error("Out of memory.")]
    OutOfMemory,

    #[error("Broken memory trace.")]
    BrokenMemory,

    #[error("Invalid memory address.")]
    InvalidMemAddr,

    #[error("File is locked due to ongoing operation.")]
    FileLocked,

    /// Not part of the wire-stable set: an unexpected failure reaching
    /// the chat platform itself. The client's own retry policy is
    /// assumed to have already been exhausted — retries are never
    /// performed automatically by this engine.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<crate::platform::PlatformError> for DriveError {
    fn from(err: crate::platform::PlatformError) -> Self {
        DriveError::Internal(err.0)
    }
}

/// Result alias used throughout the engine.
pub type DriveResult<T> = Result<T, DriveError>;

/// Raised when a structural invariant is violated badly enough that the
/// drive can no longer safely continue serving the backing server. Not
/// part of the wire-stable [`DriveError`] set: a panic ends the
/// drive's lifecycle rather than answering one operation.
#[derive(Debug, Error, Clone)]
#[error("drive panic: {reason}")]
pub struct DrivePanic {
    pub reason: String,
}

impl DrivePanic {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Internal plumbing error threading through the allocator, buckets,
/// and tree: either an ordinary [`DriveError`] destined for the caller,
/// or a [`DrivePanic`] that should additionally poison the owning
/// drive. Not exposed on the public surface — `Drive`'s own methods
/// collapse this back down to [`DriveResult`], flagging panics to the
/// registry as a side effect.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error(transparent)]
    Drive(#[from] DriveError),
    #[error(transparent)]
    Panic(#[from] DrivePanic),
}

impl From<crate::platform::PlatformError> for EngineError {
    fn from(err: crate::platform::PlatformError) -> Self {
        EngineError::Drive(DriveError::Internal(err.0))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
