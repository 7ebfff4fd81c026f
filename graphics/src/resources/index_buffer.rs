//! Element index buffer.

use std::rc::Rc;

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::Buffer;
use crate::types::BufferDescriptor;

/// A buffer of `u32` vertex indices.
#[derive(Debug)]
pub struct IndexBuffer {
    buffer: Buffer,
    count: usize,
}

impl IndexBuffer {
    /// Upload `indices`. The list must not be empty.
    pub fn new(device: &Rc<GraphicsDevice>, indices: &[u32]) -> Result<Self, GraphicsError> {
        if indices.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "index buffer needs at least one index".to_string(),
            ));
        }
        let bytes: &[u8] = bytemuck::cast_slice(indices);
        let hint = device.parameters().default_draw_hint;
        let descriptor = BufferDescriptor::new(bytes.len() as u64, hint).with_label("indices");
        let buffer = device.create_buffer(&descriptor, Some(bytes))?;

        Ok(Self {
            buffer,
            count: indices.len(),
        })
    }

    /// Number of indices.
    pub fn count(&self) -> usize {
        self.count
    }

    /// The underlying buffer.
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }
}
