//! Growable per-instance record store.
//!
//! An [`InstanceBuffer`] keeps a dense array of fixed-size records in one
//! device buffer. Records are appended at the end, overwritten in place and
//! removed by swapping the last record into the hole, so the first
//! [`count`](InstanceBuffer::count) records are always the live set.
//!
//! When an append does not fit, the store allocates a larger buffer, copies
//! the live records device-to-device and releases the old one. The buffer
//! handle changes: any attribute binding made against the old handle is stale
//! and must be re-established. [`generation`](InstanceBuffer::generation)
//! increases on every reallocation so owners can detect this.

use std::rc::Rc;
use std::sync::Arc;

use bytemuck::Pod;

use crate::binder::AttributeSource;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::layout::Layout;
use crate::resources::buffer::{check_view_type, Buffer};
use crate::types::{BufferDescriptor, StepMode};

const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;

/// Records reserved on the second allocation.
const SECOND_ALLOCATION_RECORDS: u64 = 32;

/// Capacity (in bytes) that follows `old_capacity` for records of `stride` bytes.
///
/// - an empty store gets room for one record
/// - a one-record store jumps to 32 records
/// - anything else grows by the golden ratio
///
/// ```
/// use glcore_graphics::resources::next_capacity;
///
/// assert_eq!(next_capacity(12, 0), 12);
/// assert_eq!(next_capacity(12, 12), 384);
/// assert_eq!(next_capacity(12, 384), 621);
/// ```
pub fn next_capacity(stride: u64, old_capacity: u64) -> u64 {
    if old_capacity == 0 {
        stride
    } else if old_capacity == stride {
        stride * SECOND_ALLOCATION_RECORDS
    } else {
        (old_capacity as f64 * GOLDEN_RATIO).floor() as u64
    }
}

/// A growable GPU buffer of per-instance records.
///
/// # Example
///
/// ```
/// use glcore_graphics::{Attribute, DeviceParameters, GraphicsDevice, InstanceBuffer, Layout};
///
/// let device = GraphicsDevice::dummy(DeviceParameters::default());
/// let layout = Layout::new([Attribute::vec3("offset")]);
/// let mut instances = InstanceBuffer::new(&device, layout, &[]).unwrap();
///
/// instances.add_record(&[1.0f32, 2.0, 3.0]).unwrap();
/// instances.add_record(&[4.0f32, 5.0, 6.0]).unwrap();
/// assert_eq!(instances.count(), 2);
/// assert_eq!(instances.capacity(), 12 * 32);
///
/// instances.delete(0).unwrap();
/// instances
///     .view::<[f32; 3], _>(|records| assert_eq!(records, &[[4.0, 5.0, 6.0]]))
///     .unwrap();
/// ```
pub struct InstanceBuffer {
    device: Rc<GraphicsDevice>,
    layout: Arc<Layout>,
    buffer: Option<Buffer>,
    count: usize,
    generation: u64,
    label: Option<String>,
}

impl InstanceBuffer {
    /// Create a store for records of `layout`, uploading `initial` records.
    ///
    /// `initial` must hold a whole number of records. An empty slice creates
    /// the store without any device storage.
    ///
    /// # Errors
    ///
    /// - [`GraphicsError::InvalidParameter`] if the layout is empty.
    /// - [`GraphicsError::RecordSizeMismatch`] if `initial` is not a multiple of the stride.
    /// - [`GraphicsError::OutOfMemory`] if the initial allocation fails.
    pub fn new(
        device: &Rc<GraphicsDevice>,
        layout: impl Into<Arc<Layout>>,
        initial: &[u8],
    ) -> Result<Self, GraphicsError> {
        let layout = layout.into();
        let stride = layout.stride() as usize;
        if stride == 0 {
            return Err(GraphicsError::InvalidParameter(
                "instance layout has no attributes".to_string(),
            ));
        }
        if initial.len() % stride != 0 {
            return Err(GraphicsError::RecordSizeMismatch {
                expected: stride,
                actual: initial.len(),
            });
        }

        let label = layout.label().map(str::to_string);
        let buffer = if initial.is_empty() {
            None
        } else {
            let mut descriptor = BufferDescriptor::new(
                initial.len() as u64,
                device.parameters().default_draw_hint,
            );
            descriptor.label = label.clone();
            Some(device.create_buffer(&descriptor, Some(initial))?)
        };

        Ok(Self {
            device: Rc::clone(device),
            layout,
            buffer,
            count: initial.len() / stride,
            generation: 0,
            label,
        })
    }

    /// Number of live records.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Allocated size of the backing buffer in bytes.
    pub fn capacity(&self) -> u64 {
        self.buffer.as_ref().map_or(0, Buffer::size)
    }

    /// Bytes per record.
    pub fn stride(&self) -> usize {
        self.layout.stride() as usize
    }

    /// Number of reallocations so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Record layout.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The backing buffer, if any storage has been allocated.
    pub fn buffer(&self) -> Option<&Buffer> {
        self.buffer.as_ref()
    }

    /// Debug label.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Append one record.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::RecordSizeMismatch`] if `record` is not one
    /// stride long. If growing fails the store is left unchanged.
    pub fn add(&mut self, record: &[u8]) -> Result<(), GraphicsError> {
        self.check_record(record)?;
        let stride = self.stride() as u64;
        let end = (self.count as u64 + 1) * stride;
        if end > self.capacity() {
            self.grow(end)?;
        }

        let buffer = self.storage()?;
        buffer.write(self.count as u64 * stride, record)?;
        self.count += 1;
        Ok(())
    }

    /// Append one record given as a plain-old-data value.
    pub fn add_record<T: Pod>(&mut self, record: &T) -> Result<(), GraphicsError> {
        self.add(bytemuck::bytes_of(record))
    }

    /// Overwrite the record at `index`.
    pub fn update(&mut self, index: usize, record: &[u8]) -> Result<(), GraphicsError> {
        self.check_record(record)?;
        self.check_index(index)?;
        let offset = (index * self.stride()) as u64;
        self.storage()?.write(offset, record)
    }

    /// Overwrite the record at `index` with a plain-old-data value.
    pub fn update_record<T: Pod>(&mut self, index: usize, record: &T) -> Result<(), GraphicsError> {
        self.update(index, bytemuck::bytes_of(record))
    }

    /// Remove the record at `index` by moving the last record into its slot.
    ///
    /// Record order is not preserved: whatever was last now lives at `index`.
    /// Returns `index`, or the unchanged count if `index` is out of range, in
    /// which case nothing happens.
    pub fn delete(&mut self, index: usize) -> Result<usize, GraphicsError> {
        if index >= self.count {
            log::debug!(
                "InstanceBuffer {:?}: delete({}) ignored, count is {}",
                self.label,
                index,
                self.count
            );
            return Ok(self.count);
        }

        let last = self.count - 1;
        if index != last {
            let stride = self.stride() as u64;
            let storage = self.storage()?;
            let moved = storage.read(last as u64 * stride, stride)?;
            storage.write(index as u64 * stride, &moved)?;
        }

        self.count = last;
        Ok(index)
    }

    /// Forget every record, keeping the allocation.
    pub fn clear(&mut self) {
        self.count = 0;
    }

    /// Copy the record at `index` back to the host.
    pub fn read_instance(&self, index: usize) -> Result<Vec<u8>, GraphicsError> {
        self.check_index(index)?;
        let stride = self.stride() as u64;
        self.storage()?.read(index as u64 * stride, stride)
    }

    /// Copy every live record back to the host.
    pub fn read_all(&self) -> Result<Vec<u8>, GraphicsError> {
        match &self.buffer {
            Some(buffer) if self.count > 0 => buffer.read(0, self.live_bytes()),
            _ => Ok(Vec::new()),
        }
    }

    /// Run `f` over the live records reinterpreted as `T`.
    ///
    /// The mapping lasts exactly as long as `f`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::InvalidParameter`] if the stride is not a
    /// multiple of `size_of::<T>()` or the mapping is misaligned for `T`.
    pub fn view<T: Pod, R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R, GraphicsError> {
        check_view_type::<T>(self.stride() as u64)?;
        match &self.buffer {
            Some(buffer) => buffer.view(0, self.live_bytes(), f),
            None => Ok(f(&[])),
        }
    }

    /// Run `f` over the live records reinterpreted as mutable `T`.
    ///
    /// Changes are written back when `f` returns.
    pub fn apply<T: Pod, R>(&mut self, f: impl FnOnce(&mut [T]) -> R) -> Result<R, GraphicsError> {
        check_view_type::<T>(self.stride() as u64)?;
        match &self.buffer {
            Some(buffer) => buffer.apply(0, self.live_bytes(), f),
            None => Ok(f(&mut [])),
        }
    }

    /// Move the store out, leaving `self` empty with no device storage.
    pub fn take(&mut self) -> InstanceBuffer {
        InstanceBuffer {
            device: Rc::clone(&self.device),
            layout: Arc::clone(&self.layout),
            buffer: self.buffer.take(),
            count: std::mem::take(&mut self.count),
            generation: std::mem::take(&mut self.generation),
            label: self.label.clone(),
        }
    }

    fn grow(&mut self, required: u64) -> Result<(), GraphicsError> {
        let stride = self.stride() as u64;
        let old_capacity = self.capacity();
        let mut capacity = old_capacity;
        while capacity < required {
            capacity = next_capacity(stride, capacity);
        }

        let descriptor = match &self.buffer {
            Some(old) => old.descriptor().clone().with_size(capacity),
            None => {
                let mut descriptor =
                    BufferDescriptor::new(capacity, self.device.parameters().default_draw_hint);
                descriptor.label = self.label.clone();
                descriptor
            }
        };
        let new_buffer = self.device.create_buffer(&descriptor, None)?;

        if let Some(old) = &self.buffer {
            if self.count > 0 {
                new_buffer.copy_from(old, 0, self.live_bytes())?;
            }
        }

        // Replacing drops and releases the old handle.
        self.buffer = Some(new_buffer);
        self.generation += 1;
        log::debug!(
            "resized instance buffer {:?} from {} to {} bytes",
            self.label,
            old_capacity,
            capacity
        );
        Ok(())
    }

    fn live_bytes(&self) -> u64 {
        (self.count * self.stride()) as u64
    }

    fn storage(&self) -> Result<&Buffer, GraphicsError> {
        self.buffer.as_ref().ok_or_else(|| {
            GraphicsError::InvalidParameter("instance buffer has no storage".to_string())
        })
    }

    fn check_record(&self, record: &[u8]) -> Result<(), GraphicsError> {
        if record.len() != self.stride() {
            return Err(GraphicsError::RecordSizeMismatch {
                expected: self.stride(),
                actual: record.len(),
            });
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<(), GraphicsError> {
        if index >= self.count {
            return Err(GraphicsError::InstanceIndexOutOfRange {
                index,
                count: self.count,
            });
        }
        Ok(())
    }

}

impl AttributeSource for InstanceBuffer {
    fn attribute_buffer(&self) -> Option<&Buffer> {
        self.buffer.as_ref()
    }

    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn step_mode(&self) -> StepMode {
        StepMode::Instance
    }
}

impl std::fmt::Debug for InstanceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceBuffer")
            .field("label", &self.label)
            .field("stride", &self.layout.stride())
            .field("count", &self.count)
            .field("capacity", &self.capacity())
            .field("generation", &self.generation)
            .finish()
    }
}
