//! Graphics device.
//!
//! The [`GraphicsDevice`] is the main interface for creating GPU resources.
//! It owns the backend, validates requests against its [`DeviceParameters`]
//! and keeps count of the resources that are alive.

use std::cell::Cell;
use std::rc::Rc;

use crate::backend::{GpuBackend, GpuBuffer, GpuVertexArray};
use crate::error::GraphicsError;
use crate::layout::Layout;
use crate::resources::{Buffer, IndexBuffer, InstanceBuffer, VertexArray, VertexBuffer};
use crate::types::{BufferDescriptor, DrawHint};

/// Configuration of a graphics device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceParameters {
    /// Debug label for the device.
    pub label: Option<String>,
    /// Largest single buffer the device will allocate, in bytes.
    pub max_buffer_size: u64,
    /// Number of attribute slots per vertex array.
    pub max_vertex_attributes: u32,
    /// Usage hint for buffers created without an explicit one.
    pub default_draw_hint: DrawHint,
}

impl Default for DeviceParameters {
    fn default() -> Self {
        Self {
            label: None,
            max_buffer_size: 1 << 30, // 1 GB
            max_vertex_attributes: 16,
            default_draw_hint: DrawHint::Dynamic,
        }
    }
}

impl DeviceParameters {
    /// Default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the maximum buffer size in bytes.
    pub fn with_max_buffer_size(mut self, size: u64) -> Self {
        self.max_buffer_size = size;
        self
    }

    /// Set the number of attribute slots per vertex array.
    pub fn with_max_vertex_attributes(mut self, count: u32) -> Self {
        self.max_vertex_attributes = count;
        self
    }

    /// Set the default draw hint.
    pub fn with_default_draw_hint(mut self, hint: DrawHint) -> Self {
        self.default_draw_hint = hint;
        self
    }
}

/// A graphics device for creating GPU resources.
///
/// # Thread Safety
///
/// The device wraps a graphics context, which belongs to a single thread.
/// It is shared through `Rc` and is neither `Send` nor `Sync`.
///
/// # Example
///
/// ```
/// use glcore_graphics::{DeviceParameters, GraphicsDevice};
///
/// let device = GraphicsDevice::dummy(DeviceParameters::new().with_label("headless"));
/// assert_eq!(device.buffer_count(), 0);
/// ```
pub struct GraphicsDevice {
    backend: Rc<dyn GpuBackend>,
    parameters: DeviceParameters,
    live_buffers: Cell<usize>,
    live_vertex_arrays: Cell<usize>,
    allocated_bytes: Cell<u64>,
}

impl GraphicsDevice {
    /// Create a device over an arbitrary backend.
    pub fn new(backend: Rc<dyn GpuBackend>, parameters: DeviceParameters) -> Rc<Self> {
        log::info!(
            "Creating GraphicsDevice {:?} on {}",
            parameters.label,
            backend.name()
        );
        Rc::new(Self {
            backend,
            parameters,
            live_buffers: Cell::new(0),
            live_vertex_arrays: Cell::new(0),
            allocated_bytes: Cell::new(0),
        })
    }

    /// Create a device on a fresh [`DummyBackend`](crate::backend::DummyBackend).
    #[cfg(feature = "dummy")]
    pub fn dummy(parameters: DeviceParameters) -> Rc<Self> {
        Self::new(Rc::new(crate::backend::DummyBackend::new()), parameters)
    }

    /// Create a device on a live OpenGL context.
    ///
    /// # Safety
    ///
    /// `context` must be current on the calling thread for the whole lifetime
    /// of the device and of every resource created from it.
    #[cfg(feature = "gl-backend")]
    pub unsafe fn from_glow(context: glow::Context, parameters: DeviceParameters) -> Rc<Self> {
        Self::new(
            Rc::new(unsafe { crate::backend::GlBackend::new(context) }),
            parameters,
        )
    }

    /// Get the backend.
    pub fn backend(&self) -> &dyn GpuBackend {
        self.backend.as_ref()
    }

    /// Get the device parameters.
    pub fn parameters(&self) -> &DeviceParameters {
        &self.parameters
    }

    /// Get the device label.
    pub fn label(&self) -> Option<&str> {
        self.parameters.label.as_deref()
    }

    /// Create a buffer and specify its storage.
    ///
    /// With `data == None` the contents are undefined; otherwise `data.len()`
    /// must equal `descriptor.size`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::OutOfMemory`] if the size exceeds
    /// [`DeviceParameters::max_buffer_size`] or the backend cannot allocate,
    /// and [`GraphicsError::InvalidParameter`] for a zero size.
    pub fn create_buffer(
        self: &Rc<Self>,
        descriptor: &BufferDescriptor,
        data: Option<&[u8]>,
    ) -> Result<Buffer, GraphicsError> {
        self.validate_size(descriptor.size)?;

        let raw = self.backend.create_buffer()?;
        if let Err(err) = self
            .backend
            .allocate_buffer(&raw, descriptor.size, descriptor.hint, data)
        {
            self.backend.destroy_buffer(&raw);
            return Err(err);
        }

        self.live_buffers.set(self.live_buffers.get() + 1);
        self.allocated_bytes
            .set(self.allocated_bytes.get() + descriptor.size);

        log::trace!(
            "GraphicsDevice: created buffer {:?}, size={}",
            descriptor.label,
            descriptor.size
        );

        Ok(Buffer::new(Rc::clone(self), raw, descriptor.clone()))
    }

    /// Create a vertex buffer from raw bytes.
    pub fn create_vertex_buffer(
        self: &Rc<Self>,
        data: &[u8],
        layout: impl Into<std::sync::Arc<Layout>>,
    ) -> Result<VertexBuffer, GraphicsError> {
        VertexBuffer::new(self, data, layout, self.parameters.default_draw_hint)
    }

    /// Create an index buffer.
    pub fn create_index_buffer(
        self: &Rc<Self>,
        indices: &[u32],
    ) -> Result<IndexBuffer, GraphicsError> {
        IndexBuffer::new(self, indices)
    }

    /// Create an empty instance buffer for records of `layout`.
    pub fn create_instance_buffer(
        self: &Rc<Self>,
        layout: impl Into<std::sync::Arc<Layout>>,
    ) -> Result<InstanceBuffer, GraphicsError> {
        InstanceBuffer::new(self, layout, &[])
    }

    /// Create a vertex array object.
    pub fn create_vertex_array(self: &Rc<Self>) -> Result<VertexArray, GraphicsError> {
        VertexArray::new(self)
    }

    /// Number of live buffers created by this device.
    pub fn buffer_count(&self) -> usize {
        self.live_buffers.get()
    }

    /// Number of live vertex arrays created by this device.
    pub fn vertex_array_count(&self) -> usize {
        self.live_vertex_arrays.get()
    }

    /// Total storage of all live buffers, in bytes.
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes.get()
    }

    pub(crate) fn validate_size(&self, size: u64) -> Result<(), GraphicsError> {
        if size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }
        if size > self.parameters.max_buffer_size {
            log::warn!(
                "GraphicsDevice: buffer size {} exceeds maximum {}",
                size,
                self.parameters.max_buffer_size
            );
            return Err(GraphicsError::OutOfMemory { requested: size });
        }
        Ok(())
    }

    pub(crate) fn create_raw_vertex_array(&self) -> Result<GpuVertexArray, GraphicsError> {
        let raw = self.backend.create_vertex_array()?;
        self.live_vertex_arrays
            .set(self.live_vertex_arrays.get() + 1);
        Ok(raw)
    }

    pub(crate) fn release_vertex_array(&self, raw: &GpuVertexArray) {
        self.backend.destroy_vertex_array(raw);
        self.live_vertex_arrays
            .set(self.live_vertex_arrays.get().saturating_sub(1));
    }

    pub(crate) fn resize_accounting(&self, old_size: u64, new_size: u64) {
        self.allocated_bytes
            .set(self.allocated_bytes.get() - old_size + new_size);
    }

    pub(crate) fn release_buffer(&self, raw: &GpuBuffer, size: u64) {
        self.backend.destroy_buffer(raw);
        self.live_buffers
            .set(self.live_buffers.get().saturating_sub(1));
        self.allocated_bytes
            .set(self.allocated_bytes.get().saturating_sub(size));
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("backend", &self.backend.name())
            .field("parameters", &self.parameters)
            .field("buffers", &self.live_buffers.get())
            .finish()
    }
}

// A device is bound to the thread owning its graphics context
static_assertions::assert_not_impl_any!(GraphicsDevice: Send, Sync);
