//! Common types and descriptors for graphics resources.
//!
//! This module contains the attribute kind set, usage hints, binding targets
//! and descriptor structs used throughout the graphics system.

mod attribute;
mod buffer;

pub use attribute::{AttributeKind, ScalarType, StepMode};
pub use buffer::{BufferDescriptor, BufferTarget, DrawHint, MapAccess};
