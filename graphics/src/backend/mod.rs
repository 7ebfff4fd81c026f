//! GPU backend abstraction layer.
//!
//! This module provides the narrow device surface the rest of the crate is
//! written against: raw buffer and vertex-array handles plus a trait with the
//! handful of driver calls needed to allocate, fill, copy, map and bind them.
//!
//! # Available Backends
//!
//! - `dummy` (default): host-memory emulation, for tests and headless runs
//! - `gl-backend`: OpenGL 3.3+ via `glow`
//!
//! # Threading
//!
//! A graphics context belongs to one thread. Backends are therefore not
//! required to be `Send` or `Sync`, and the device that owns one is shared
//! through `Rc`.

#[cfg(feature = "dummy")]
pub mod dummy;

#[cfg(feature = "gl-backend")]
pub mod gl;

use crate::binder::AttributeBinding;
use crate::error::GraphicsError;
use crate::types::{BufferTarget, DrawHint, MapAccess};

#[cfg(feature = "dummy")]
pub use dummy::DummyBackend;

#[cfg(feature = "gl-backend")]
pub use gl::GlBackend;

/// Raw handle to a device buffer.
///
/// The handle carries no ownership; [`crate::resources::Buffer`] is the owning wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuBuffer {
    /// Dummy backend buffer id.
    Dummy(u64),
    /// OpenGL buffer object.
    #[cfg(feature = "gl-backend")]
    Gl(glow::Buffer),
}

/// Raw handle to a vertex array object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVertexArray {
    /// Dummy backend vertex array id.
    Dummy(u64),
    /// OpenGL vertex array object.
    #[cfg(feature = "gl-backend")]
    Gl(glow::VertexArray),
}

/// GPU backend trait for abstracting different graphics APIs.
///
/// All calls are synchronous and must be issued from the thread that owns
/// the graphics context.
pub trait GpuBackend: 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Create a fresh buffer handle with no storage.
    fn create_buffer(&self) -> Result<GpuBuffer, GraphicsError>;

    /// Release a buffer handle and its storage.
    fn destroy_buffer(&self, buffer: &GpuBuffer);

    /// (Re)specify the storage of a buffer.
    ///
    /// With `data == None` the contents are undefined; otherwise `data.len()`
    /// must equal `size`.
    fn allocate_buffer(
        &self,
        buffer: &GpuBuffer,
        size: u64,
        hint: DrawHint,
        data: Option<&[u8]>,
    ) -> Result<(), GraphicsError>;

    /// Upload host bytes at `offset`.
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8])
        -> Result<(), GraphicsError>;

    /// Device-to-device copy of `size` bytes starting at `offset` in both buffers.
    fn copy_buffer(
        &self,
        src: &GpuBuffer,
        dst: &GpuBuffer,
        offset: u64,
        size: u64,
    ) -> Result<(), GraphicsError>;

    /// Map `size` bytes at `offset` into host memory for the duration of `f`.
    ///
    /// The mapping is released before this returns.
    fn map_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        size: u64,
        access: MapAccess,
        f: &mut dyn FnMut(&mut [u8]),
    ) -> Result<(), GraphicsError>;

    /// Attach a buffer (or nothing) to a binding point.
    fn bind_buffer(&self, target: BufferTarget, buffer: Option<&GpuBuffer>)
        -> Result<(), GraphicsError>;

    /// Create a vertex array object.
    fn create_vertex_array(&self) -> Result<GpuVertexArray, GraphicsError>;

    /// Release a vertex array object.
    fn destroy_vertex_array(&self, vertex_array: &GpuVertexArray);

    /// Make a vertex array current (or unbind with `None`).
    fn bind_vertex_array(&self, vertex_array: Option<&GpuVertexArray>)
        -> Result<(), GraphicsError>;

    /// Program one attribute slot of the current vertex array against the
    /// buffer currently bound to [`BufferTarget::Array`].
    fn set_vertex_attribute(&self, binding: &AttributeBinding) -> Result<(), GraphicsError>;

    /// Disable one attribute location of the current vertex array, so it no
    /// longer reads from any buffer.
    fn disable_vertex_attribute(&self, location: u32) -> Result<(), GraphicsError>;
}
