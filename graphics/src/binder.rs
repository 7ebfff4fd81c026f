//! Attribute binding.
//!
//! The [`AttributeBinder`] walks a [`Layout`] and programs one attribute slot
//! per attribute of a vertex array object, pointing each slot at the right
//! offset of a buffer. Slots are numbered by the caller: binding returns the
//! next free slot, so several buffers bound to the same vertex array continue
//! numbering where the previous one stopped.
//!
//! Matrices and arrays occupy one slot number but span one hardware location
//! per column. The binder rejects layouts whose columns would run into the
//! next attribute's slot or past the device limit;
//! [`location_end`] gives the first location a following buffer may use.
//!
//! Bindings reference a specific buffer handle. When an
//! [`InstanceBuffer`](crate::resources::InstanceBuffer) reallocates, its
//! handle changes and every binding made against the old one is stale; the
//! owner must bind again (see [`VertexArray`](crate::resources::VertexArray),
//! which does this automatically).

use std::ops::Range;

use crate::backend::GpuVertexArray;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::layout::Layout;
use crate::resources::Buffer;
use crate::types::{AttributeKind, ScalarType, StepMode};

/// Descriptor for one programmed attribute slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeBinding {
    /// Attribute slot (shader location).
    pub slot: u32,
    /// Total scalar components, including array elements.
    pub component_count: u32,
    /// Type of each scalar component.
    pub scalar_type: ScalarType,
    /// Distance in bytes between consecutive records.
    pub stride: u32,
    /// Byte offset of the attribute within a record.
    pub offset: u32,
    /// Per-vertex or per-instance advance.
    pub step_mode: StepMode,
    /// Kind of each element.
    pub kind: AttributeKind,
    /// Number of array elements.
    pub element_count: u32,
}

/// One column of an attribute as consumed by hardware (at most 4 components).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeColumn {
    /// Hardware attribute location.
    pub location: u32,
    /// Components in this column.
    pub components: u32,
    /// Byte offset of this column within a record.
    pub offset: u32,
}

impl AttributeBinding {
    /// Whether the slot advances once per instance.
    pub fn is_per_instance(&self) -> bool {
        self.step_mode == StepMode::Instance
    }

    /// Hardware locations the binding occupies, starting at its slot.
    pub fn locations(&self) -> Range<u32> {
        let count = self.kind.columns() * self.element_count;
        self.slot..self.slot.saturating_add(count)
    }

    /// Split the binding into hardware columns at consecutive locations.
    ///
    /// Vectors and scalars yield a single column per element; matrices yield
    /// one `vec4` column per matrix column.
    pub fn columns(&self) -> impl Iterator<Item = AttributeColumn> + '_ {
        let components = self.kind.column_components();
        let column_size = components * self.scalar_type.size();
        let count = self.locations().len() as u32;
        (0..count).map(move |i| AttributeColumn {
            location: self.slot + i,
            components,
            offset: self.offset + i * column_size,
        })
    }
}

/// Compute the binding descriptors for every attribute of `layout`.
///
/// The first attribute gets `starting_slot`; each following attribute takes the next slot.
pub fn attribute_bindings(
    layout: &Layout,
    step_mode: StepMode,
    starting_slot: u32,
) -> Vec<AttributeBinding> {
    layout
        .iter()
        .zip(starting_slot..)
        .map(|(attr, slot)| {
            let (components, scalar_type) = attr.kind().decompose();
            AttributeBinding {
                slot,
                component_count: components * attr.element_count(),
                scalar_type,
                stride: layout.stride(),
                offset: attr.offset(),
                step_mode,
                kind: attr.kind(),
                element_count: attr.element_count(),
            }
        })
        .collect()
}

/// First location past every column of `layout` bound at `starting_slot`.
///
/// This is at least the slot number returned by binding, and larger when the
/// last attribute is a matrix or an array.
pub fn location_end(layout: &Layout, starting_slot: u32) -> u32 {
    let slot_end = starting_slot.saturating_add(layout.len() as u32);
    attribute_bindings(layout, StepMode::Vertex, starting_slot)
        .last()
        .map_or(slot_end, |binding| binding.locations().end.max(slot_end))
}

/// Something that can feed attributes: a buffer, the layout of its records
/// and how it advances.
pub trait AttributeSource {
    /// The device buffer, or `None` if no storage has been allocated yet.
    fn attribute_buffer(&self) -> Option<&Buffer>;

    /// Layout of one record.
    fn layout(&self) -> &Layout;

    /// Per-vertex or per-instance advance.
    fn step_mode(&self) -> StepMode;
}

/// Programs attribute slots of one vertex array.
pub struct AttributeBinder<'a> {
    device: &'a GraphicsDevice,
    vertex_array: &'a GpuVertexArray,
}

impl<'a> AttributeBinder<'a> {
    /// Create a binder targeting `vertex_array`.
    pub fn new(device: &'a GraphicsDevice, vertex_array: &'a GpuVertexArray) -> Self {
        Self {
            device,
            vertex_array,
        }
    }

    /// Bind every attribute of `layout` against `buffer`, starting at `starting_slot`.
    ///
    /// Returns the next free slot.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::InvalidParameter`] if a matrix or array
    /// attribute would spill into the next attribute's slot, if the locations
    /// would exceed the device's attribute limit, or any backend error.
    pub fn bind_buffer(
        &self,
        buffer: &Buffer,
        layout: &Layout,
        step_mode: StepMode,
        starting_slot: u32,
    ) -> Result<u32, GraphicsError> {
        let bindings = self.plan(layout, step_mode, starting_slot)?;
        let backend = self.device.backend();

        backend.bind_vertex_array(Some(self.vertex_array))?;
        buffer.bind(crate::types::BufferTarget::Array)?;

        for binding in &bindings {
            log::trace!(
                "AttributeBinder: slot {} <- {} x{} offset={} stride={} {:?}",
                binding.slot,
                binding.kind,
                binding.element_count,
                binding.offset,
                binding.stride,
                binding.step_mode
            );
            backend.set_vertex_attribute(binding)?;
        }

        Ok(starting_slot + bindings.len() as u32)
    }

    /// Bind an [`AttributeSource`], starting at `starting_slot`.
    ///
    /// A source without storage reserves its slots but programs nothing; it
    /// must be bound again once storage exists.
    pub fn bind_source(
        &self,
        source: &dyn AttributeSource,
        starting_slot: u32,
    ) -> Result<u32, GraphicsError> {
        match source.attribute_buffer() {
            Some(buffer) => {
                self.bind_buffer(buffer, source.layout(), source.step_mode(), starting_slot)
            }
            None => {
                let bindings = self.plan(source.layout(), source.step_mode(), starting_slot)?;
                log::debug!(
                    "AttributeBinder: source has no storage yet, reserving slots {}..{}",
                    starting_slot,
                    starting_slot + bindings.len() as u32
                );
                Ok(starting_slot + bindings.len() as u32)
            }
        }
    }

    fn plan(
        &self,
        layout: &Layout,
        step_mode: StepMode,
        starting_slot: u32,
    ) -> Result<Vec<AttributeBinding>, GraphicsError> {
        let bindings = attribute_bindings(layout, step_mode, starting_slot);
        for (binding, next) in bindings.iter().zip(bindings.iter().skip(1)) {
            let locations = binding.locations();
            if locations.end > next.slot {
                return Err(GraphicsError::InvalidParameter(format!(
                    "{} at slot {} spans locations {}..{} and overlaps slot {}; \
                     declare matrix and array attributes last",
                    binding.kind, binding.slot, locations.start, locations.end, next.slot
                )));
            }
        }

        let limit = self.device.parameters().max_vertex_attributes;
        let end = location_end(layout, starting_slot);
        if end > limit {
            return Err(GraphicsError::InvalidParameter(format!(
                "attribute locations {starting_slot}..{end} exceed the device limit of {limit}"
            )));
        }
        Ok(bindings)
    }
}
