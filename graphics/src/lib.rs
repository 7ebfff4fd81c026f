//! # glcore Graphics
//!
//! GPU-side storage for instanced rendering on top of an OpenGL-style device.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`Layout`] - Tightly packed description of a vertex or instance record
//! - [`InstanceBuffer`] - Growable GPU array of per-instance records with swap-removal
//! - [`AttributeBinder`] - Maps a layout onto the attribute slots of a vertex array
//! - [`VertexArray`] - Owns the buffers of one draw and keeps instance bindings fresh
//! - [`GpuBackend`] - Trait for device implementations: OpenGL (`gl-backend`) and Dummy
//!   (for testing)
//!
//! ## Example
//!
//! ```
//! use glcore_graphics::{
//!     Attribute, DeviceParameters, GraphicsDevice, InstanceBuffer, Layout, VertexArray,
//! };
//!
//! let device = GraphicsDevice::dummy(DeviceParameters::default());
//! let layout = Layout::new([Attribute::vec3("offset"), Attribute::vec4("color")]);
//!
//! let mut vao = VertexArray::new(&device).unwrap();
//! vao.set_instance_buffer(InstanceBuffer::new(&device, layout, &[]).unwrap())
//!     .unwrap();
//!
//! vao.update_instances(|instances| {
//!     instances.add_record(&[0.0f32, 1.0, 0.0, 1.0, 0.5, 0.5, 1.0]).unwrap();
//! })
//! .unwrap();
//! assert_eq!(vao.instance_count(), 1);
//! ```

pub mod backend;
pub mod binder;
pub mod device;
pub mod error;
pub mod layout;
pub mod resources;
pub mod types;

// Re-export main types for convenience
#[cfg(feature = "dummy")]
pub use backend::DummyBackend;
#[cfg(feature = "gl-backend")]
pub use backend::GlBackend;
pub use backend::{GpuBackend, GpuBuffer, GpuVertexArray};
pub use binder::{AttributeBinder, AttributeBinding, AttributeSource};
pub use device::{DeviceParameters, GraphicsDevice};
pub use error::GraphicsError;
pub use layout::{Attribute, Layout, LayoutBuilder};
pub use resources::{Buffer, IndexBuffer, InstanceBuffer, VertexArray, VertexBuffer};
pub use types::{
    AttributeKind, BufferDescriptor, BufferTarget, DrawHint, MapAccess, ScalarType, StepMode,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// Only logs the version; devices need no global setup.
pub fn init() {
    log::info!("glcore Graphics v{} initialized", VERSION);
}
