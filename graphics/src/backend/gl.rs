//! OpenGL backend implementation.
//!
//! Talks to a live OpenGL 3.3+ (or GLES 3.0) context through `glow`. The
//! context must be current on the thread that owns the device for as long as
//! the backend lives.
//!
//! Transfers go through the `COPY_READ`/`COPY_WRITE` binding points so that
//! allocating, copying or mapping a buffer never disturbs the `ARRAY_BUFFER`
//! or `ELEMENT_ARRAY_BUFFER` bindings a vertex array relies on.

use glow::HasContext;

use crate::binder::AttributeBinding;
use crate::error::GraphicsError;
use crate::types::{BufferTarget, DrawHint, MapAccess, ScalarType};

use super::{GpuBackend, GpuBuffer, GpuVertexArray};

/// Upper bound on queued error flags drained before an allocation.
const MAX_STALE_ERRORS: usize = 16;

const COPY_READ: u32 = convert_target(BufferTarget::CopyRead);
const COPY_WRITE: u32 = convert_target(BufferTarget::CopyWrite);

/// OpenGL backend over a `glow` context.
pub struct GlBackend {
    gl: glow::Context,
}

impl GlBackend {
    /// Wrap a `glow` context.
    ///
    /// # Safety
    ///
    /// `gl` must be current on the calling thread whenever the backend is used.
    pub unsafe fn new(gl: glow::Context) -> Self {
        log::info!("GlBackend: wrapping OpenGL context");
        Self { gl }
    }

    /// The wrapped context.
    pub fn context(&self) -> &glow::Context {
        &self.gl
    }

    /// Turn a pending `GL_OUT_OF_MEMORY` into an error.
    fn check_allocation(&self, size: u64) -> Result<(), GraphicsError> {
        match unsafe { self.gl.get_error() } {
            glow::NO_ERROR => Ok(()),
            glow::OUT_OF_MEMORY => Err(GraphicsError::OutOfMemory { requested: size }),
            code => Err(GraphicsError::ResourceCreationFailed(format!(
                "glBufferData failed with error 0x{code:04X}"
            ))),
        }
    }
}

impl std::fmt::Debug for GlBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlBackend").finish_non_exhaustive()
    }
}

fn gl_buffer(buffer: &GpuBuffer) -> Result<glow::Buffer, GraphicsError> {
    match buffer {
        GpuBuffer::Gl(buffer) => Ok(*buffer),
        other => Err(GraphicsError::BackendMismatch(format!(
            "expected an OpenGL buffer, got {other:?}"
        ))),
    }
}

fn gl_vertex_array(vertex_array: &GpuVertexArray) -> Result<glow::VertexArray, GraphicsError> {
    match vertex_array {
        GpuVertexArray::Gl(vertex_array) => Ok(*vertex_array),
        other => Err(GraphicsError::BackendMismatch(format!(
            "expected an OpenGL vertex array, got {other:?}"
        ))),
    }
}

fn gl_int(value: u64, what: &str) -> Result<i32, GraphicsError> {
    i32::try_from(value).map_err(|_| {
        GraphicsError::InvalidParameter(format!("{what} {value} does not fit a GLint"))
    })
}

fn convert_hint(hint: DrawHint) -> u32 {
    match hint {
        DrawHint::Static => glow::STATIC_DRAW,
        DrawHint::Dynamic => glow::DYNAMIC_DRAW,
        DrawHint::Stream => glow::STREAM_DRAW,
    }
}

const fn convert_target(target: BufferTarget) -> u32 {
    match target {
        BufferTarget::Array => glow::ARRAY_BUFFER,
        BufferTarget::ElementArray => glow::ELEMENT_ARRAY_BUFFER,
        BufferTarget::CopyRead => glow::COPY_READ_BUFFER,
        BufferTarget::CopyWrite => glow::COPY_WRITE_BUFFER,
    }
}

fn convert_scalar(scalar: ScalarType) -> u32 {
    match scalar {
        ScalarType::Float32 => glow::FLOAT,
    }
}

fn convert_access(access: MapAccess) -> u32 {
    let mut bits = 0;
    if access.contains(MapAccess::READ) {
        bits |= glow::MAP_READ_BIT;
    }
    if access.contains(MapAccess::WRITE) {
        bits |= glow::MAP_WRITE_BIT;
    }
    bits
}

impl GpuBackend for GlBackend {
    fn name(&self) -> &'static str {
        "OpenGL Backend"
    }

    fn create_buffer(&self) -> Result<GpuBuffer, GraphicsError> {
        let buffer = unsafe { self.gl.create_buffer() }
            .map_err(GraphicsError::ResourceCreationFailed)?;
        log::trace!("GlBackend: create_buffer -> {buffer:?}");
        Ok(GpuBuffer::Gl(buffer))
    }

    fn destroy_buffer(&self, buffer: &GpuBuffer) {
        match gl_buffer(buffer) {
            Ok(buffer) => unsafe { self.gl.delete_buffer(buffer) },
            Err(err) => log::warn!("GlBackend: destroy_buffer: {err}"),
        }
    }

    fn allocate_buffer(
        &self,
        buffer: &GpuBuffer,
        size: u64,
        hint: DrawHint,
        data: Option<&[u8]>,
    ) -> Result<(), GraphicsError> {
        let buffer = gl_buffer(buffer)?;
        let gl_size = gl_int(size, "buffer size")?;
        if let Some(bytes) = data {
            if bytes.len() as u64 != size {
                return Err(GraphicsError::InvalidParameter(format!(
                    "initial data is {} bytes, buffer size is {size}",
                    bytes.len()
                )));
            }
        }

        unsafe {
            // Clear stale errors so the check below sees only this allocation
            for _ in 0..MAX_STALE_ERRORS {
                if self.gl.get_error() == glow::NO_ERROR {
                    break;
                }
            }

            self.gl.bind_buffer(COPY_WRITE, Some(buffer));
            match data {
                Some(bytes) => self.gl.buffer_data_u8_slice(COPY_WRITE, bytes, convert_hint(hint)),
                None => self.gl.buffer_data_size(COPY_WRITE, gl_size, convert_hint(hint)),
            }
            self.gl.bind_buffer(COPY_WRITE, None);
        }

        log::trace!("GlBackend: allocate_buffer {buffer:?} size={size} hint={hint:?}");
        self.check_allocation(size)
    }

    fn write_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let buffer = gl_buffer(buffer)?;
        let offset = gl_int(offset, "write offset")?;
        unsafe {
            self.gl.bind_buffer(COPY_WRITE, Some(buffer));
            self.gl.buffer_sub_data_u8_slice(COPY_WRITE, offset, data);
            self.gl.bind_buffer(COPY_WRITE, None);
        }
        Ok(())
    }

    fn copy_buffer(
        &self,
        src: &GpuBuffer,
        dst: &GpuBuffer,
        offset: u64,
        size: u64,
    ) -> Result<(), GraphicsError> {
        let src = gl_buffer(src)?;
        let dst = gl_buffer(dst)?;
        let offset = gl_int(offset, "copy offset")?;
        let size = gl_int(size, "copy size")?;
        unsafe {
            self.gl.bind_buffer(COPY_READ, Some(src));
            self.gl.bind_buffer(COPY_WRITE, Some(dst));
            self.gl
                .copy_buffer_sub_data(COPY_READ, COPY_WRITE, offset, offset, size);
            self.gl.bind_buffer(COPY_READ, None);
            self.gl.bind_buffer(COPY_WRITE, None);
        }
        log::trace!("GlBackend: copy_buffer {src:?} -> {dst:?} offset={offset} size={size}");
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
        let buffer = gl_buffer(buffer)?;
        let gl_offset = gl_int(offset, "map offset")?;
        let gl_size = gl_int(size, "map size")?;

        unsafe {
            self.gl.bind_buffer(COPY_READ, Some(buffer));
            let ptr = self
                .gl
                .map_buffer_range(COPY_READ, gl_offset, gl_size, convert_access(access));
            if ptr.is_null() {
                self.gl.bind_buffer(COPY_READ, None);
                return Err(GraphicsError::MapFailed(format!(
                    "glMapBufferRange returned null for {size} bytes at {offset}"
                )));
            }

            // The slice must not outlive the unmap below.
            let bytes = std::slice::from_raw_parts_mut(ptr, size as usize);
            f(bytes);

            self.gl.unmap_buffer(COPY_READ);
            self.gl.bind_buffer(COPY_READ, None);
        }
        Ok(())
    }

    fn bind_buffer(
        &self,
        target: BufferTarget,
        buffer: Option<&GpuBuffer>,
    ) -> Result<(), GraphicsError> {
        let buffer = buffer.map(gl_buffer).transpose()?;
        unsafe { self.gl.bind_buffer(convert_target(target), buffer) };
        Ok(())
    }

    fn create_vertex_array(&self) -> Result<GpuVertexArray, GraphicsError> {
        let vertex_array = unsafe { self.gl.create_vertex_array() }
            .map_err(GraphicsError::ResourceCreationFailed)?;
        Ok(GpuVertexArray::Gl(vertex_array))
    }

    fn destroy_vertex_array(&self, vertex_array: &GpuVertexArray) {
        match gl_vertex_array(vertex_array) {
            Ok(vertex_array) => unsafe { self.gl.delete_vertex_array(vertex_array) },
            Err(err) => log::warn!("GlBackend: destroy_vertex_array: {err}"),
        }
    }

    fn bind_vertex_array(
        &self,
        vertex_array: Option<&GpuVertexArray>,
    ) -> Result<(), GraphicsError> {
        let vertex_array = vertex_array.map(gl_vertex_array).transpose()?;
        unsafe { self.gl.bind_vertex_array(vertex_array) };
        Ok(())
    }

    fn set_vertex_attribute(&self, binding: &AttributeBinding) -> Result<(), GraphicsError> {
        let stride = gl_int(binding.stride as u64, "stride")?;
        let data_type = convert_scalar(binding.scalar_type);

        // Hardware attributes hold at most four components; wider kinds span
        // consecutive locations.
        for column in binding.columns() {
            let offset = gl_int(column.offset as u64, "attribute offset")?;
            unsafe {
                self.gl.enable_vertex_attrib_array(column.location);
                self.gl.vertex_attrib_pointer_f32(
                    column.location,
                    column.components as i32,
                    data_type,
                    false,
                    stride,
                    offset,
                );
                self.gl
                    .vertex_attrib_divisor(column.location, binding.step_mode.divisor());
            }
        }
        Ok(())
    }

    fn disable_vertex_attribute(&self, location: u32) -> Result<(), GraphicsError> {
        unsafe { self.gl.disable_vertex_attrib_array(location) };
        log::trace!("GlBackend: disable_vertex_attribute {location}");
        Ok(())
    }
}
