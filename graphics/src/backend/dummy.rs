//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to a driver. It keeps buffer storage in host
//! memory and records binding state, so the behaviour of the resource types
//! (growth, copies, swap-removal, attribute binding) can be observed without
//! GPU hardware.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use crate::binder::AttributeBinding;
use crate::error::GraphicsError;
use crate::types::{BufferTarget, DrawHint, MapAccess};

use super::{GpuBackend, GpuBuffer, GpuVertexArray};

/// Counters of the calls a [`DummyBackend`] has served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DummyStats {
    /// `allocate_buffer` calls.
    pub allocations: u64,
    /// `write_buffer` calls.
    pub writes: u64,
    /// `copy_buffer` calls.
    pub copies: u64,
    /// `map_buffer` calls.
    pub maps: u64,
    /// Buffers released through `destroy_buffer`.
    pub destroyed_buffers: u64,
}

#[derive(Debug, Default)]
struct DummyVertexArray {
    attributes: BTreeMap<u32, (AttributeBinding, u64)>,
    index_buffer: Option<u64>,
}

#[derive(Debug, Default)]
struct DummyState {
    next_id: u64,
    buffers: HashMap<u64, Vec<u8>>,
    vertex_arrays: HashMap<u64, DummyVertexArray>,
    bound_buffers: HashMap<BufferTarget, u64>,
    bound_vertex_array: Option<u64>,
    stats: DummyStats,
}

impl DummyState {
    fn current_vertex_array(&mut self) -> Result<&mut DummyVertexArray, GraphicsError> {
        let id = self
            .bound_vertex_array
            .ok_or_else(|| GraphicsError::InvalidParameter("no vertex array bound".into()))?;
        self.vertex_arrays.get_mut(&id).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("dummy vertex array {id} does not exist"))
        })
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn allocated_bytes(&self) -> u64 {
        self.buffers.values().map(|b| b.len() as u64).sum()
    }

    fn storage(&mut self, id: u64) -> Result<&mut Vec<u8>, GraphicsError> {
        self.buffers.get_mut(&id).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("dummy buffer {id} does not exist"))
        })
    }
}

/// Dummy GPU backend.
#[derive(Debug, Default)]
pub struct DummyBackend {
    state: RefCell<DummyState>,
    memory_limit: Option<u64>,
}

impl DummyBackend {
    /// Create a new dummy backend with unlimited memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dummy backend whose total storage may not exceed `bytes`.
    ///
    /// Allocations past the limit fail with [`GraphicsError::OutOfMemory`].
    pub fn with_memory_limit(bytes: u64) -> Self {
        Self {
            state: RefCell::default(),
            memory_limit: Some(bytes),
        }
    }

    /// Snapshot of the call counters.
    pub fn stats(&self) -> DummyStats {
        self.state.borrow().stats
    }

    /// Number of buffers currently alive.
    pub fn live_buffer_count(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    /// Number of vertex arrays currently alive.
    pub fn live_vertex_array_count(&self) -> usize {
        self.state.borrow().vertex_arrays.len()
    }

    /// Total bytes of storage currently allocated.
    pub fn allocated_bytes(&self) -> u64 {
        self.state.borrow().allocated_bytes()
    }

    /// Copy of a buffer's storage, or `None` if the handle is not alive.
    pub fn buffer_contents(&self, buffer: &GpuBuffer) -> Option<Vec<u8>> {
        let id = dummy_buffer_id(buffer).ok()?;
        self.state.borrow().buffers.get(&id).cloned()
    }

    /// Attribute slots programmed on a vertex array, in slot order, with the
    /// buffer each slot reads from.
    pub fn vertex_array_attributes(
        &self,
        vertex_array: &GpuVertexArray,
    ) -> Vec<(AttributeBinding, GpuBuffer)> {
        let Ok(id) = dummy_vertex_array_id(vertex_array) else {
            return Vec::new();
        };
        self.state
            .borrow()
            .vertex_arrays
            .get(&id)
            .map(|vao| {
                vao.attributes
                    .values()
                    .map(|(binding, buffer)| (*binding, GpuBuffer::Dummy(*buffer)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Index buffer attached to a vertex array.
    pub fn vertex_array_index_buffer(&self, vertex_array: &GpuVertexArray) -> Option<GpuBuffer> {
        let id = dummy_vertex_array_id(vertex_array).ok()?;
        self.state
            .borrow()
            .vertex_arrays
            .get(&id)
            .and_then(|vao| vao.index_buffer)
            .map(GpuBuffer::Dummy)
    }

    /// Buffer currently attached to `target`.
    pub fn bound_buffer(&self, target: BufferTarget) -> Option<GpuBuffer> {
        self.state
            .borrow()
            .bound_buffers
            .get(&target)
            .copied()
            .map(GpuBuffer::Dummy)
    }

    /// Vertex array currently bound.
    pub fn bound_vertex_array(&self) -> Option<GpuVertexArray> {
        self.state
            .borrow()
            .bound_vertex_array
            .map(GpuVertexArray::Dummy)
    }

    fn check_range(
        len: usize,
        offset: u64,
        size: u64,
    ) -> Result<std::ops::Range<usize>, GraphicsError> {
        let end = offset.checked_add(size).filter(|&end| end <= len as u64);
        match end {
            Some(end) => Ok(offset as usize..end as usize),
            None => Err(GraphicsError::InvalidParameter(format!(
                "range {offset}+{size} exceeds buffer size {len}"
            ))),
        }
    }
}

fn dummy_buffer_id(buffer: &GpuBuffer) -> Result<u64, GraphicsError> {
    match buffer {
        GpuBuffer::Dummy(id) => Ok(*id),
        #[cfg(feature = "gl-backend")]
        other => Err(GraphicsError::BackendMismatch(format!("{other:?}"))),
    }
}

fn dummy_vertex_array_id(vertex_array: &GpuVertexArray) -> Result<u64, GraphicsError> {
    match vertex_array {
        GpuVertexArray::Dummy(id) => Ok(*id),
        #[cfg(feature = "gl-backend")]
        other => Err(GraphicsError::BackendMismatch(format!("{other:?}"))),
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn create_buffer(&self) -> Result<GpuBuffer, GraphicsError> {
        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        state.buffers.insert(id, Vec::new());
        log::trace!("DummyBackend: create_buffer -> {id}");
        Ok(GpuBuffer::Dummy(id))
    }

    fn destroy_buffer(&self, buffer: &GpuBuffer) {
        let Ok(id) = dummy_buffer_id(buffer) else {
            log::warn!("DummyBackend: destroy_buffer called with foreign handle {buffer:?}");
            return;
        };
        let mut state = self.state.borrow_mut();
        if state.buffers.remove(&id).is_some() {
            state.stats.destroyed_buffers += 1;
            state.bound_buffers.retain(|_, bound| *bound != id);
            log::trace!("DummyBackend: destroy_buffer {id}");
        }
    }

    fn allocate_buffer(
        &self,
        buffer: &GpuBuffer,
        size: u64,
        hint: DrawHint,
        data: Option<&[u8]>,
    ) -> Result<(), GraphicsError> {
        let id = dummy_buffer_id(buffer)?;
        let mut state = self.state.borrow_mut();

        if let Some(limit) = self.memory_limit {
            let current = state.buffers.get(&id).map_or(0, |b| b.len() as u64);
            if state.allocated_bytes() - current + size > limit {
                log::trace!(
                    "DummyBackend: allocate_buffer {id} size={size} refused (limit {limit})"
                );
                return Err(GraphicsError::OutOfMemory { requested: size });
            }
        }

        let storage = state.storage(id)?;
        match data {
            Some(bytes) => {
                if bytes.len() as u64 != size {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "initial data is {} bytes, buffer size is {size}",
                        bytes.len()
                    )));
                }
                *storage = bytes.to_vec();
            }
            None => *storage = vec![0u8; size as usize],
        }
        state.stats.allocations += 1;
        log::trace!("DummyBackend: allocate_buffer {id} size={size} hint={hint:?}");
        Ok(())
    }

    fn write_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let id = dummy_buffer_id(buffer)?;
        let mut state = self.state.borrow_mut();
        let storage = state.storage(id)?;
        let range = Self::check_range(storage.len(), offset, data.len() as u64)?;
        storage[range].copy_from_slice(data);
        state.stats.writes += 1;
        log::trace!("DummyBackend: write_buffer {id} offset={offset} len={}", data.len());
        Ok(())
    }

    fn copy_buffer(
        &self,
        src: &GpuBuffer,
        dst: &GpuBuffer,
        offset: u64,
        size: u64,
    ) -> Result<(), GraphicsError> {
        let src_id = dummy_buffer_id(src)?;
        let dst_id = dummy_buffer_id(dst)?;
        let mut state = self.state.borrow_mut();

        let bytes = {
            let source = state.storage(src_id)?;
            let range = Self::check_range(source.len(), offset, size)?;
            source[range].to_vec()
        };
        let target = state.storage(dst_id)?;
        let range = Self::check_range(target.len(), offset, size)?;
        target[range].copy_from_slice(&bytes);

        state.stats.copies += 1;
        log::trace!("DummyBackend: copy_buffer {src_id} -> {dst_id} offset={offset} size={size}");
        Ok(())
    }

    fn map_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        size: u64,
        access: MapAccess,
        f: &mut dyn FnMut(&mut [u8]),
    ) -> Result<(), GraphicsError> {
        let id = dummy_buffer_id(buffer)?;

        // Copy out so the callback may touch other buffers on this backend.
        // Staging is word-backed so mapped pointers are 8-byte aligned like a driver's.
        let (range, mut staging) = {
            let mut state = self.state.borrow_mut();
            let storage = state.storage(id)?;
            let range = Self::check_range(storage.len(), offset, size)?;
            let mut staging = vec![0u64; range.len().div_ceil(8)];
            if access.contains(MapAccess::READ) {
                bytemuck::cast_slice_mut::<u64, u8>(&mut staging)[..range.len()]
                    .copy_from_slice(&storage[range.clone()]);
            }
            state.stats.maps += 1;
            (range, staging)
        };
        log::trace!("DummyBackend: map_buffer {id} offset={offset} size={size} access={access:?}");

        let mapped = &mut bytemuck::cast_slice_mut::<u64, u8>(&mut staging)[..range.len()];
        f(mapped);

        if access.contains(MapAccess::WRITE) {
            let mut state = self.state.borrow_mut();
            let storage = state.storage(id)?;
            storage[range].copy_from_slice(mapped);
        }
        Ok(())
    }

    fn bind_buffer(
        &self,
        target: BufferTarget,
        buffer: Option<&GpuBuffer>,
    ) -> Result<(), GraphicsError> {
        let mut state = self.state.borrow_mut();
        match buffer {
            Some(buffer) => {
                let id = dummy_buffer_id(buffer)?;
                if !state.buffers.contains_key(&id) {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "dummy buffer {id} does not exist"
                    )));
                }
                state.bound_buffers.insert(target, id);
                if target == BufferTarget::ElementArray {
                    if let Some(vao) = state.bound_vertex_array {
                        if let Some(vao) = state.vertex_arrays.get_mut(&vao) {
                            vao.index_buffer = Some(id);
                        }
                    }
                }
            }
            None => {
                state.bound_buffers.remove(&target);
            }
        }
        Ok(())
    }

    fn create_vertex_array(&self) -> Result<GpuVertexArray, GraphicsError> {
        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        state.vertex_arrays.insert(id, DummyVertexArray::default());
        log::trace!("DummyBackend: create_vertex_array -> {id}");
        Ok(GpuVertexArray::Dummy(id))
    }

    fn destroy_vertex_array(&self, vertex_array: &GpuVertexArray) {
        let Ok(id) = dummy_vertex_array_id(vertex_array) else {
            log::warn!(
                "DummyBackend: destroy_vertex_array called with foreign handle {vertex_array:?}"
            );
            return;
        };
        let mut state = self.state.borrow_mut();
        state.vertex_arrays.remove(&id);
        if state.bound_vertex_array == Some(id) {
            state.bound_vertex_array = None;
        }
        log::trace!("DummyBackend: destroy_vertex_array {id}");
    }

    fn bind_vertex_array(
        &self,
        vertex_array: Option<&GpuVertexArray>,
    ) -> Result<(), GraphicsError> {
        let mut state = self.state.borrow_mut();
        state.bound_vertex_array = match vertex_array {
            Some(vao) => {
                let id = dummy_vertex_array_id(vao)?;
                if !state.vertex_arrays.contains_key(&id) {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "dummy vertex array {id} does not exist"
                    )));
                }
                Some(id)
            }
            None => None,
        };
        Ok(())
    }

    fn set_vertex_attribute(&self, binding: &AttributeBinding) -> Result<(), GraphicsError> {
        let mut state = self.state.borrow_mut();
        let buffer = state
            .bound_buffers
            .get(&BufferTarget::Array)
            .copied()
            .ok_or_else(|| {
                GraphicsError::InvalidParameter("no buffer bound to the array target".into())
            })?;
        let vao = state.current_vertex_array()?;

        // Columns overwrite whatever previously occupied their locations.
        let locations = binding.locations();
        vao.attributes.retain(|_, (existing, _)| {
            let other = existing.locations();
            other.end <= locations.start || locations.end <= other.start
        });
        vao.attributes.insert(binding.slot, (*binding, buffer));
        Ok(())
    }

    fn disable_vertex_attribute(&self, location: u32) -> Result<(), GraphicsError> {
        let mut state = self.state.borrow_mut();
        let vao = state.current_vertex_array()?;
        vao.attributes.retain(|_, (binding, _)| !binding.locations().contains(&location));
        log::trace!("DummyBackend: disable_vertex_attribute {location}");
        Ok(())
    }
}
