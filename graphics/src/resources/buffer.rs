//! GPU buffer resource.

use std::any::type_name;
use std::rc::Rc;

use bytemuck::{Pod, PodCastError};

use crate::backend::GpuBuffer;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, BufferTarget, DrawHint, MapAccess};

/// A GPU buffer resource.
///
/// Buffers are created by [`GraphicsDevice::create_buffer`] and own their
/// device handle: dropping a `Buffer` releases it. They are move-only; there
/// is no way to obtain two owners of the same handle.
///
/// # Example
///
/// ```
/// use glcore_graphics::{BufferDescriptor, DeviceParameters, DrawHint, GraphicsDevice};
///
/// let device = GraphicsDevice::dummy(DeviceParameters::default());
/// let buffer = device
///     .create_buffer(&BufferDescriptor::new(16, DrawHint::Static), Some(&[7u8; 16]))
///     .unwrap();
/// assert_eq!(buffer.read(0, 4).unwrap(), vec![7, 7, 7, 7]);
/// ```
pub struct Buffer {
    device: Rc<GraphicsDevice>,
    raw: GpuBuffer,
    descriptor: BufferDescriptor,
}

impl Buffer {
    /// Wrap a freshly allocated handle (called by GraphicsDevice).
    pub(crate) fn new(
        device: Rc<GraphicsDevice>,
        raw: GpuBuffer,
        descriptor: BufferDescriptor,
    ) -> Self {
        Self {
            device,
            raw,
            descriptor,
        }
    }

    /// Get the parent device.
    pub fn device(&self) -> &Rc<GraphicsDevice> {
        &self.device
    }

    /// Get the raw backend handle.
    pub fn raw(&self) -> &GpuBuffer {
        &self.raw
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    /// Get the usage hint.
    pub fn hint(&self) -> DrawHint {
        self.descriptor.hint
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Upload `data` at `offset`.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        self.check_range(offset, data.len() as u64)?;
        self.device.backend().write_buffer(&self.raw, offset, data)
    }

    /// Copy `size` bytes at `offset` from `src` into the same range of this buffer.
    pub fn copy_from(&self, src: &Buffer, offset: u64, size: u64) -> Result<(), GraphicsError> {
        src.check_range(offset, size)?;
        self.check_range(offset, size)?;
        self.device
            .backend()
            .copy_buffer(&src.raw, &self.raw, offset, size)
    }

    /// Read `size` bytes at `offset` back to the host.
    pub fn read(&self, offset: u64, size: u64) -> Result<Vec<u8>, GraphicsError> {
        let mut out = Vec::with_capacity(size as usize);
        self.map_range(offset, size, MapAccess::READ, &mut |bytes| {
            out.extend_from_slice(bytes)
        })?;
        Ok(out)
    }

    /// Map a range into host memory for the duration of `f`.
    pub fn map_range(
        &self,
        offset: u64,
        size: u64,
        access: MapAccess,
        f: &mut dyn FnMut(&mut [u8]),
    ) -> Result<(), GraphicsError> {
        self.check_range(offset, size)?;
        if size == 0 {
            f(&mut []);
            return Ok(());
        }
        self.device
            .backend()
            .map_buffer(&self.raw, offset, size, access, f)
    }

    /// Run `f` over `size` bytes at `offset` reinterpreted as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::InvalidParameter`] if the range is not a whole
    /// number of `T` or the mapping is misaligned for `T`.
    pub fn view<T: Pod, R>(
        &self,
        offset: u64,
        size: u64,
        f: impl FnOnce(&[T]) -> R,
    ) -> Result<R, GraphicsError> {
        check_view_type::<T>(size)?;
        if size == 0 {
            self.check_range(offset, size)?;
            return Ok(f(&[]));
        }

        let mut f = Some(f);
        let mut outcome = None;
        self.map_range(offset, size, MapAccess::READ, &mut |bytes| {
            outcome =
                Some(bytemuck::try_cast_slice::<u8, T>(bytes).map(|v| f.take().map(|f| f(v))));
        })?;
        finish_view::<T, R>(outcome)
    }

    /// Run `f` over `size` bytes at `offset` reinterpreted as mutable `T`.
    ///
    /// Changes are written back when `f` returns.
    pub fn apply<T: Pod, R>(
        &self,
        offset: u64,
        size: u64,
        f: impl FnOnce(&mut [T]) -> R,
    ) -> Result<R, GraphicsError> {
        check_view_type::<T>(size)?;
        if size == 0 {
            self.check_range(offset, size)?;
            return Ok(f(&mut []));
        }

        let mut f = Some(f);
        let mut outcome = None;
        self.map_range(offset, size, MapAccess::READ_WRITE, &mut |bytes| {
            outcome = Some(
                bytemuck::try_cast_slice_mut::<u8, T>(bytes).map(|v| f.take().map(|f| f(v))),
            );
        })?;
        finish_view::<T, R>(outcome)
    }

    /// Attach this buffer to a binding point.
    pub fn bind(&self, target: BufferTarget) -> Result<(), GraphicsError> {
        self.device.backend().bind_buffer(target, Some(&self.raw))
    }

    /// Respecify the storage in place, keeping the handle.
    ///
    /// Previous contents are discarded.
    pub fn reallocate(&mut self, size: u64, data: Option<&[u8]>) -> Result<(), GraphicsError> {
        self.device.validate_size(size)?;
        self.device
            .backend()
            .allocate_buffer(&self.raw, size, self.descriptor.hint, data)?;
        self.device.resize_accounting(self.descriptor.size, size);
        log::trace!(
            "Buffer {:?}: storage respecified {} -> {} bytes",
            self.descriptor.label,
            self.descriptor.size,
            size
        );
        self.descriptor.size = size;
        Ok(())
    }

    fn check_range(&self, offset: u64, size: u64) -> Result<(), GraphicsError> {
        match offset.checked_add(size) {
            Some(end) if end <= self.descriptor.size => Ok(()),
            _ => Err(GraphicsError::InvalidParameter(format!(
                "range {offset}+{size} exceeds buffer size {}",
                self.descriptor.size
            ))),
        }
    }
}

/// Check that records of `stride` bytes split evenly into `T`.
pub(crate) fn check_view_type<T: Pod>(stride: u64) -> Result<(), GraphicsError> {
    let size = std::mem::size_of::<T>() as u64;
    if size == 0 || stride % size != 0 {
        return Err(GraphicsError::InvalidParameter(format!(
            "{stride} bytes is not a multiple of size_of::<{}>() = {size}",
            type_name::<T>()
        )));
    }
    Ok(())
}

fn finish_view<T, R>(outcome: Option<Result<Option<R>, PodCastError>>) -> Result<R, GraphicsError> {
    match outcome {
        Some(Ok(Some(value))) => Ok(value),
        Some(Err(err)) => Err(GraphicsError::InvalidParameter(format!(
            "cannot view mapped bytes as {}: {err}",
            type_name::<T>()
        ))),
        _ => Err(GraphicsError::MapFailed(
            "mapping callback was not invoked".to_string(),
        )),
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        log::trace!("Dropping Buffer {:?}", self.descriptor.label);
        self.device.release_buffer(&self.raw, self.descriptor.size);
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("raw", &self.raw)
            .field("size", &self.descriptor.size)
            .field("hint", &self.descriptor.hint)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_not_impl_any!(Buffer: Send, Sync, Clone);
