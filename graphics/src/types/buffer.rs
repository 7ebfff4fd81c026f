//! Buffer types and descriptors.

use bitflags::bitflags;

/// Usage hint handed to the driver when buffer storage is specified.
///
/// The hint only affects where the driver places the storage; every buffer
/// can be written and copied regardless of the hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DrawHint {
    /// Written once, drawn many times.
    Static,
    /// Rewritten repeatedly, drawn many times.
    #[default]
    Dynamic,
    /// Written once, drawn a few times.
    Stream,
}

/// Binding point a buffer is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Per-vertex / per-instance attribute source.
    Array,
    /// Element indices of the bound vertex array.
    ElementArray,
    /// Source of a device-to-device copy.
    CopyRead,
    /// Destination of a device-to-device copy.
    CopyWrite,
}

bitflags! {
    /// Access requested when mapping a buffer range into host memory.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapAccess: u32 {
        /// The mapped bytes reflect the current device contents.
        const READ = 1 << 0;
        /// Bytes modified through the mapping are written back on unmap.
        const WRITE = 1 << 1;
    }
}

impl MapAccess {
    /// Read and write access.
    pub const READ_WRITE: Self = Self::READ.union(Self::WRITE);
}

impl Default for MapAccess {
    fn default() -> Self {
        Self::READ_WRITE
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Driver usage hint.
    pub hint: DrawHint,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, hint: DrawHint) -> Self {
        Self {
            label: None,
            size,
            hint,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Replace the size, keeping label and hint.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }
}
