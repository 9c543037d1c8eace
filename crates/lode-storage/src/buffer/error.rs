//! Buffer pool errors.
//!
//! Only genuine failures surface here. Expected negative outcomes -
//! capacity exhaustion, stale page ids, double unpins - are reported
//! through `Option`/`bool` returns on the pool itself, never as errors.

use thiserror::Error;

use crate::disk::DiskError;

/// Result type for buffer pool operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors that can occur during buffer pool operations.
#[derive(Debug, Error)]
pub enum BufferError {
    /// A frame id outside the configured pool was handed to the replacer.
    #[error("invalid frame ID: {frame_id}")]
    InvalidFrameId {
        /// The offending frame id.
        frame_id: usize,
    },

    /// Attempted to remove a pinned (non-evictable) frame from the
    /// replacer.
    #[error("frame {frame_id} is pinned and cannot be removed from the replacer")]
    FrameNotEvictable {
        /// The offending frame id.
        frame_id: usize,
    },

    /// Disk I/O failed during a read, write-back, or flush.
    #[error("disk I/O failed: {0}")]
    Disk(#[from] DiskError),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// What was wrong with the configuration.
        message: String,
    },
}

impl BufferError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid frame ID error.
    pub fn invalid_frame(frame_id: usize) -> Self {
        Self::InvalidFrameId { frame_id }
    }

    /// Returns true if this error indicates a caller bug rather than an
    /// environmental failure.
    pub fn is_caller_bug(&self) -> bool {
        matches!(
            self,
            Self::InvalidFrameId { .. } | Self::FrameNotEvictable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = BufferError::invalid_frame(42);
        assert!(matches!(
            err,
            BufferError::InvalidFrameId { frame_id: 42 }
        ));
    }

    #[test]
    fn test_is_caller_bug() {
        assert!(BufferError::invalid_frame(1).is_caller_bug());
        assert!(BufferError::FrameNotEvictable { frame_id: 1 }.is_caller_bug());
        assert!(!BufferError::config("bad").is_caller_bug());
    }
}
