//! Error types for kernel lifecycle operations.
//!
//! Only the init/start sequence reports recoverable errors; blocking
//! operations resolve to a [`Msg`](crate::types::Msg) and usage violations
//! halt via the `checks` machinery.

/// Kernel lifecycle error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OsError {
    /// OS not initialized
    NotInit,
    /// OS is already running
    AlreadyRunning,
    /// OS is not running
    NotRunning,
    /// No application thread created before start
    NoAppThread,
}

/// Result type alias for kernel lifecycle operations
pub type OsResult<T> = Result<T, OsError>;
