//! Vertex array object.
//!
//! A [`VertexArray`] owns the buffers that feed one draw: any number of
//! per-vertex buffers, at most one [`InstanceBuffer`] and an optional
//! [`IndexBuffer`]. Attribute slots are numbered across all of them in the
//! order the buffers are attached.
//!
//! Because the vertex array owns its instance buffer, it can see every
//! reallocation and re-establish the stale per-instance bindings itself. All
//! mutation of the instance buffer goes through
//! [`update_instances`](VertexArray::update_instances) for that reason.
//! Locations the instance buffer no longer feeds are disabled, so the array
//! never keeps reading from a buffer it gave away.

use std::ops::Range;
use std::rc::Rc;

use crate::backend::{GpuBuffer, GpuVertexArray};
use crate::binder::{location_end, AttributeBinder, AttributeSource};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::{IndexBuffer, InstanceBuffer, VertexBuffer};
use crate::types::BufferTarget;

/// Locations reserved for the instance buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InstanceSlots {
    base: u32,
    end: u32,
}

/// An array object binding vertex, instance and index buffers together.
pub struct VertexArray {
    device: Rc<GraphicsDevice>,
    raw: GpuVertexArray,
    vertex_buffers: Vec<VertexBuffer>,
    instances: Option<InstanceBuffer>,
    instance_slots: Option<InstanceSlots>,
    // Buffer handle and generation the instance attributes were last bound against
    bound_instances: Option<(GpuBuffer, u64)>,
    // Locations currently enabled and reading from the instance buffer
    instance_locations: Range<u32>,
    index_buffer: Option<IndexBuffer>,
    next_slot: u32,
}

impl VertexArray {
    /// Create an empty vertex array.
    pub fn new(device: &Rc<GraphicsDevice>) -> Result<Self, GraphicsError> {
        let raw = device.create_raw_vertex_array()?;
        Ok(Self {
            device: Rc::clone(device),
            raw,
            vertex_buffers: Vec::new(),
            instances: None,
            instance_slots: None,
            bound_instances: None,
            instance_locations: 0..0,
            index_buffer: None,
            next_slot: 0,
        })
    }

    /// Get the raw backend handle.
    pub fn raw(&self) -> &GpuVertexArray {
        &self.raw
    }

    /// The next unassigned attribute slot.
    ///
    /// This is past every column of the attached buffers, so a matrix or array
    /// declared last moves it by more than one.
    pub fn next_slot(&self) -> u32 {
        self.next_slot
    }

    /// First slot of the per-instance attributes, if an instance buffer was ever attached.
    pub fn instance_slot(&self) -> Option<u32> {
        self.instance_slots.map(|slots| slots.base)
    }

    /// Attached vertex buffers in attachment order.
    pub fn vertex_buffers(&self) -> &[VertexBuffer] {
        &self.vertex_buffers
    }

    /// The attached instance buffer.
    pub fn instances(&self) -> Option<&InstanceBuffer> {
        self.instances.as_ref()
    }

    /// The attached index buffer.
    pub fn index_buffer(&self) -> Option<&IndexBuffer> {
        self.index_buffer.as_ref()
    }

    /// Number of indices to draw, or 0 without an index buffer.
    pub fn index_count(&self) -> usize {
        self.index_buffer.as_ref().map_or(0, IndexBuffer::count)
    }

    /// Number of instances to draw, or 0 without an instance buffer.
    pub fn instance_count(&self) -> usize {
        self.instances.as_ref().map_or(0, InstanceBuffer::count)
    }

    /// Attach a per-vertex buffer; its attributes take the next free slots.
    ///
    /// Returns the slot of its first attribute.
    pub fn add_vertex_buffer(&mut self, vertices: VertexBuffer) -> Result<u32, GraphicsError> {
        let first = self.next_slot;
        self.binder().bind_source(&vertices, first)?;
        self.next_slot = location_end(vertices.layout(), first);
        self.vertex_buffers.push(vertices);
        Ok(first)
    }

    /// Attach an instance buffer, returning the one it replaces.
    ///
    /// A replacement reuses the slots of the previous instance buffer when its
    /// columns fit in them; otherwise it takes the next free slots. Locations
    /// the replacement does not use are disabled.
    pub fn set_instance_buffer(
        &mut self,
        instances: InstanceBuffer,
    ) -> Result<Option<InstanceBuffer>, GraphicsError> {
        let base = match self.instance_slots {
            Some(slots) if location_end(instances.layout(), slots.base) <= slots.end => slots.base,
            _ => self.next_slot,
        };

        self.binder().bind_source(&instances, base)?;
        let end = location_end(instances.layout(), base);
        if base == self.next_slot {
            self.next_slot = end;
            self.instance_slots = Some(InstanceSlots { base, end });
        }
        let programmed = if instances.buffer().is_some() {
            base..end
        } else {
            base..base
        };
        self.retire_instance_locations(programmed)?;
        self.bound_instances = instances
            .buffer()
            .map(|buffer| (*buffer.raw(), instances.generation()));

        log::debug!(
            "VertexArray: instance buffer {:?} bound at slots {}..{}",
            instances.label(),
            base,
            end
        );
        Ok(self.instances.replace(instances))
    }

    /// Detach the instance buffer.
    ///
    /// Its slots stay reserved for the next instance buffer but are disabled
    /// until then.
    pub fn clear_instance_buffer(&mut self) -> Result<Option<InstanceBuffer>, GraphicsError> {
        self.retire_instance_locations(0..0)?;
        self.bound_instances = None;
        Ok(self.instances.take())
    }

    /// Attach an index buffer, returning the one it replaces.
    pub fn set_index_buffer(
        &mut self,
        indices: IndexBuffer,
    ) -> Result<Option<IndexBuffer>, GraphicsError> {
        self.device.backend().bind_vertex_array(Some(&self.raw))?;
        indices.buffer().bind(BufferTarget::ElementArray)?;
        Ok(self.index_buffer.replace(indices))
    }

    /// Mutate the instance buffer, then refresh stale bindings.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::InvalidParameter`] if no instance buffer is
    /// attached, or the error from rebinding.
    pub fn update_instances<R>(
        &mut self,
        f: impl FnOnce(&mut InstanceBuffer) -> R,
    ) -> Result<R, GraphicsError> {
        let instances = self.instances.as_mut().ok_or_else(|| {
            GraphicsError::InvalidParameter("vertex array has no instance buffer".to_string())
        })?;
        let result = f(instances);
        self.refresh_instance_binding()?;
        Ok(result)
    }

    /// Make this vertex array current.
    pub fn bind(&self) -> Result<(), GraphicsError> {
        self.device.backend().bind_vertex_array(Some(&self.raw))
    }

    /// Clear the current vertex array.
    pub fn unbind(&self) -> Result<(), GraphicsError> {
        self.device.backend().bind_vertex_array(None)
    }

    fn binder(&self) -> AttributeBinder<'_> {
        AttributeBinder::new(&self.device, &self.raw)
    }

    fn refresh_instance_binding(&mut self) -> Result<(), GraphicsError> {
        let (Some(instances), Some(slots)) = (&self.instances, self.instance_slots) else {
            return Ok(());
        };
        let current = instances
            .buffer()
            .map(|buffer| (*buffer.raw(), instances.generation()));
        if current == self.bound_instances {
            return Ok(());
        }

        let end = location_end(instances.layout(), slots.base);
        if end > slots.end {
            return Err(GraphicsError::InvalidParameter(format!(
                "instance layout needs locations {}..{end}, only {}..{} are reserved",
                slots.base, slots.base, slots.end
            )));
        }

        log::debug!(
            "VertexArray: instance buffer {:?} changed (generation {}), rebinding from slot {}",
            instances.label(),
            instances.generation(),
            slots.base
        );
        self.binder().bind_source(instances, slots.base)?;
        let programmed = if current.is_some() {
            slots.base..end
        } else {
            slots.base..slots.base
        };
        self.bound_instances = current;
        self.retire_instance_locations(programmed)
    }

    /// Disable instance locations outside `keep` and record `keep` as enabled.
    fn retire_instance_locations(&mut self, keep: Range<u32>) -> Result<(), GraphicsError> {
        let stale: Vec<u32> = self
            .instance_locations
            .clone()
            .filter(|location| !keep.contains(location))
            .collect();
        if !stale.is_empty() {
            let backend = self.device.backend();
            backend.bind_vertex_array(Some(&self.raw))?;
            for &location in &stale {
                backend.disable_vertex_attribute(location)?;
            }
            log::debug!("VertexArray: disabled instance locations {stale:?}");
        }
        self.instance_locations = keep;
        Ok(())
    }
}

impl Drop for VertexArray {
    fn drop(&mut self) {
        log::trace!("Dropping VertexArray {:?}", self.raw);
        self.device.release_vertex_array(&self.raw);
    }
}

impl std::fmt::Debug for VertexArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexArray")
            .field("raw", &self.raw)
            .field("vertex_buffers", &self.vertex_buffers.len())
            .field("instances", &self.instances)
            .field("index_count", &self.index_count())
            .field("next_slot", &self.next_slot)
            .finish()
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::device::DeviceParameters;
    use crate::layout::{Attribute, Layout};
    use crate::types::{DrawHint, StepMode};

    fn setup() -> (Rc<DummyBackend>, Rc<GraphicsDevice>) {
        let backend = Rc::new(DummyBackend::new());
        let device = GraphicsDevice::new(backend.clone(), DeviceParameters::default());
        (backend, device)
    }

    fn quad(device: &Rc<GraphicsDevice>) -> VertexBuffer {
        VertexBuffer::new(
            device,
            &[0u8; 4 * 20],
            Layout::new([Attribute::vec3("pos"), Attribute::vec2("uv")]),
            DrawHint::Static,
        )
        .unwrap()
    }

    #[test]
    fn test_slots_continue_across_buffers() {
        let (backend, device) = setup();
        let mut vao = VertexArray::new(&device).unwrap();

        assert_eq!(vao.add_vertex_buffer(quad(&device)).unwrap(), 0);
        let instances =
            InstanceBuffer::new(&device, Layout::new([Attribute::vec4("tint")]), &[0u8; 16])
                .unwrap();
        vao.set_instance_buffer(instances).unwrap();

        assert_eq!(vao.instance_slot(), Some(2));
        assert_eq!(vao.next_slot(), 3);

        let attributes = backend.vertex_array_attributes(vao.raw());
        assert_eq!(attributes.len(), 3);
        assert_eq!(attributes[2].0.slot, 2);
        assert_eq!(attributes[2].0.step_mode, StepMode::Instance);
        assert_eq!(attributes[0].0.step_mode, StepMode::Vertex);
    }

    #[test]
    fn test_empty_instance_buffer_reserves_slots() {
        let (backend, device) = setup();
        let mut vao = VertexArray::new(&device).unwrap();
        let instances =
            InstanceBuffer::new(&device, Layout::new([Attribute::vec3("offset")]), &[]).unwrap();

        vao.set_instance_buffer(instances).unwrap();
        assert_eq!(vao.next_slot(), 1);
        assert!(backend.vertex_array_attributes(vao.raw()).is_empty());

        vao.update_instances(|i| i.add(&[0u8; 12])).unwrap().unwrap();
        let attributes = backend.vertex_array_attributes(vao.raw());
        assert_eq!(attributes.len(), 1);
        assert_eq!(Some(&attributes[0].1), vao.instances().unwrap().buffer().map(|b| b.raw()));
    }

    #[test]
    fn test_replacing_instance_buffer_reuses_slots() {
        let (_backend, device) = setup();
        let mut vao = VertexArray::new(&device).unwrap();
        let layout = Layout::new([Attribute::vec3("offset"), Attribute::float("scale")]);

        let first = InstanceBuffer::new(&device, layout.clone(), &[0u8; 16]).unwrap();
        assert!(vao.set_instance_buffer(first).unwrap().is_none());
        let second = InstanceBuffer::new(&device, layout, &[0u8; 32]).unwrap();
        let previous = vao.set_instance_buffer(second).unwrap();

        assert_eq!(previous.map(|p| p.count()), Some(1));
        assert_eq!(vao.instance_slot(), Some(0));
        assert_eq!(vao.next_slot(), 2);
        assert_eq!(vao.instance_count(), 2);
    }

    #[test]
    fn test_matrix_columns_push_next_slot() {
        let (backend, device) = setup();
        let mut vao = VertexArray::new(&device).unwrap();
        let layout = Layout::new([Attribute::vec4("tint"), Attribute::mat4("model")]);
        let instances = InstanceBuffer::new(&device, layout, &[0u8; 80]).unwrap();

        vao.set_instance_buffer(instances).unwrap();
        assert_eq!(vao.next_slot(), 5);
        assert_eq!(vao.add_vertex_buffer(quad(&device)).unwrap(), 5);

        let slots: Vec<u32> = backend
            .vertex_array_attributes(vao.raw())
            .iter()
            .map(|(binding, _)| binding.slot)
            .collect();
        assert_eq!(slots, vec![0, 1, 5, 6]);
    }

    #[test]
    fn test_smaller_replacement_disables_unused_slots() {
        let (backend, device) = setup();
        let mut vao = VertexArray::new(&device).unwrap();
        let pair = Layout::new([Attribute::vec3("offset"), Attribute::float("scale")]);
        let first = InstanceBuffer::new(&device, pair, &[0u8; 16]).unwrap();
        vao.set_instance_buffer(first).unwrap();
        assert_eq!(backend.vertex_array_attributes(vao.raw()).len(), 2);

        let tint = Layout::new([Attribute::vec4("tint")]);
        let single = InstanceBuffer::new(&device, tint, &[0u8; 16]).unwrap();
        let raw = *single.buffer().unwrap().raw();
        let previous = vao.set_instance_buffer(single).unwrap();

        let attributes = backend.vertex_array_attributes(vao.raw());
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].0.slot, 0);
        assert_eq!(attributes[0].1, raw);
        assert_eq!(vao.next_slot(), 2);
        drop(previous);
    }

    #[test]
    fn test_clear_disables_instance_slots() {
        let (backend, device) = setup();
        let mut vao = VertexArray::new(&device).unwrap();
        vao.add_vertex_buffer(quad(&device)).unwrap();
        let layout = Layout::new([Attribute::vec3("offset")]);
        let instances = InstanceBuffer::new(&device, layout.clone(), &[0u8; 12]).unwrap();
        vao.set_instance_buffer(instances).unwrap();
        assert_eq!(backend.vertex_array_attributes(vao.raw()).len(), 3);

        let detached = vao.clear_instance_buffer().unwrap();
        assert!(detached.is_some());
        let attributes = backend.vertex_array_attributes(vao.raw());
        assert_eq!(attributes.len(), 2);
        assert!(attributes.iter().all(|(binding, _)| !binding.is_per_instance()));

        let again = InstanceBuffer::new(&device, layout, &[0u8; 12]).unwrap();
        vao.set_instance_buffer(again).unwrap();
        assert_eq!(vao.instance_slot(), Some(2));
        assert_eq!(backend.vertex_array_attributes(vao.raw()).len(), 3);
    }

    #[test]
    fn test_taking_storage_disables_instance_slots() {
        let (backend, device) = setup();
        let mut vao = VertexArray::new(&device).unwrap();
        let layout = Layout::new([Attribute::vec3("offset")]);
        let instances = InstanceBuffer::new(&device, layout, &[0u8; 24]).unwrap();
        vao.set_instance_buffer(instances).unwrap();

        let moved = vao.update_instances(|i| i.take()).unwrap();
        assert_eq!(moved.count(), 2);
        assert!(backend.vertex_array_attributes(vao.raw()).is_empty());
    }

    #[test]
    fn test_update_without_instances() {
        let (_backend, device) = setup();
        let mut vao = VertexArray::new(&device).unwrap();
        let result = vao.update_instances(|i| i.count());
        assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
    }

    #[test]
    fn test_index_buffer_recorded_on_vertex_array() {
        let (backend, device) = setup();
        let mut vao = VertexArray::new(&device).unwrap();
        let indices = IndexBuffer::new(&device, &[0, 1, 2]).unwrap();
        let raw = *indices.buffer().raw();

        vao.set_index_buffer(indices).unwrap();
        assert_eq!(vao.index_count(), 3);
        assert_eq!(backend.vertex_array_index_buffer(vao.raw()), Some(raw));
    }

    #[test]
    fn test_bind_unbind() {
        let (backend, device) = setup();
        let vao = VertexArray::new(&device).unwrap();
        vao.bind().unwrap();
        assert_eq!(backend.bound_vertex_array(), Some(*vao.raw()));
        vao.unbind().unwrap();
        assert_eq!(backend.bound_vertex_array(), None);
    }
}
