//! Per-vertex buffer with its record layout.

use std::rc::Rc;
use std::sync::Arc;

use bytemuck::Pod;

use crate::binder::AttributeSource;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::layout::Layout;
use crate::resources::buffer::{check_view_type, Buffer};
use crate::types::{BufferDescriptor, DrawHint, StepMode};

/// A buffer of vertices laid out according to a [`Layout`].
///
/// Unlike [`InstanceBuffer`](crate::InstanceBuffer) it does not grow
/// record by record; [`set_data`](Self::set_data) replaces the whole contents
/// while keeping the same handle, so existing bindings stay valid.
#[derive(Debug)]
pub struct VertexBuffer {
    buffer: Buffer,
    layout: Arc<Layout>,
}

impl VertexBuffer {
    /// Upload `data` as vertices of `layout`.
    pub fn new(
        device: &Rc<GraphicsDevice>,
        data: &[u8],
        layout: impl Into<Arc<Layout>>,
        hint: DrawHint,
    ) -> Result<Self, GraphicsError> {
        let layout = layout.into();
        check_vertex_data(&layout, data)?;

        let mut descriptor = BufferDescriptor::new(data.len() as u64, hint);
        descriptor.label = layout.label().map(str::to_string);
        let buffer = device.create_buffer(&descriptor, Some(data))?;

        Ok(Self { buffer, layout })
    }

    /// Replace the vertex data.
    pub fn set_data(&mut self, data: &[u8]) -> Result<(), GraphicsError> {
        check_vertex_data(&self.layout, data)?;
        if data.len() as u64 == self.buffer.size() {
            self.buffer.write(0, data)
        } else {
            self.buffer.reallocate(data.len() as u64, Some(data))
        }
    }

    /// Number of vertices stored.
    pub fn vertex_count(&self) -> usize {
        (self.buffer.size() / self.layout.stride() as u64) as usize
    }

    /// Run `f` over every vertex reinterpreted as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::InvalidParameter`] if the stride is not a
    /// multiple of `size_of::<T>()`.
    pub fn view<T: Pod, R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R, GraphicsError> {
        check_view_type::<T>(self.layout.stride() as u64)?;
        self.buffer.view(0, self.buffer.size(), f)
    }

    /// Run `f` over every vertex reinterpreted as mutable `T`, writing the
    /// changes back when it returns.
    pub fn apply<T: Pod, R>(&mut self, f: impl FnOnce(&mut [T]) -> R) -> Result<R, GraphicsError> {
        check_view_type::<T>(self.layout.stride() as u64)?;
        self.buffer.apply(0, self.buffer.size(), f)
    }

    /// The underlying buffer.
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Vertex layout.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }
}

fn check_vertex_data(layout: &Layout, data: &[u8]) -> Result<(), GraphicsError> {
    let stride = layout.stride() as usize;
    if stride == 0 {
        return Err(GraphicsError::InvalidParameter(
            "vertex layout has no attributes".to_string(),
        ));
    }
    if data.is_empty() || data.len() % stride != 0 {
        return Err(GraphicsError::RecordSizeMismatch {
            expected: stride,
            actual: data.len(),
        });
    }
    Ok(())
}

impl AttributeSource for VertexBuffer {
    fn attribute_buffer(&self) -> Option<&Buffer> {
        Some(&self.buffer)
    }

    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn step_mode(&self) -> StepMode {
        StepMode::Vertex
    }
}
