//! GPU resources.
//!
//! This module contains the GPU resource types that are created by [`GraphicsDevice`]:
//! - [`Buffer`] - move-only device buffer, released on drop
//! - [`InstanceBuffer`] - growable store of per-instance records
//! - [`VertexBuffer`] - per-vertex data with its layout
//! - [`IndexBuffer`] - `u32` element indices
//! - [`VertexArray`] - array object tying the above together for drawing
//!
//! Resources hold an `Rc` to their parent device and must stay on the thread
//! that owns the graphics context.
//!
//! [`GraphicsDevice`]: crate::GraphicsDevice

mod buffer;
mod index_buffer;
mod instance_buffer;
mod vertex_array;
mod vertex_buffer;

pub use buffer::Buffer;
pub use index_buffer::IndexBuffer;
pub use instance_buffer::{next_capacity, InstanceBuffer};
pub use vertex_array::VertexArray;
pub use vertex_buffer::VertexBuffer;
