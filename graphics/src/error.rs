//! Graphics error types.

use thiserror::Error;

/// Errors that can occur in the graphics system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphicsError {
    /// Failed to create a device object (buffer, vertex array).
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// The device could not provide storage of the requested size.
    #[error("out of GPU memory (requested {requested} bytes)")]
    OutOfMemory {
        /// Requested allocation size in bytes.
        requested: u64,
    },
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// A handle created by one backend was passed to another.
    #[error("handle {0} does not belong to this backend")]
    BackendMismatch(String),
    /// Mapping a buffer range into host memory failed.
    #[error("failed to map buffer range: {0}")]
    MapFailed(String),
    /// `Layout::attribute_at` was called with an index past the end.
    #[error("attribute index {index} out of range (layout has {len} attributes)")]
    AttributeIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of attributes in the layout.
        len: usize,
    },
    /// No attribute with the requested name exists in the layout.
    #[error("attribute '{0}' not found in layout")]
    AttributeNotFound(String),
    /// A record did not match the layout stride.
    #[error("record size mismatch: expected {expected} bytes, got {actual}")]
    RecordSizeMismatch {
        /// Expected size in bytes (the layout stride, or a multiple of it).
        expected: usize,
        /// Size actually supplied.
        actual: usize,
    },
    /// An instance index was outside the live range.
    #[error("instance index {index} out of range (count is {count})")]
    InstanceIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Current number of live records.
        count: usize,
    },
}

impl GraphicsError {
    /// Whether this error reports a failed device allocation.
    ///
    /// Hosts use this to degrade gracefully (skip an effect) instead of aborting.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }
}
