//! GPU buffers backed by GL buffer objects

use std::rc::Rc;
use std::sync::Arc;

use bsf_rhi::{BufferId, BufferUsage, GpuBufferDesc, GpuBufferType, IndexType, RenderStat, RenderStats};
use glow::{Context, HasContext};
use tracing::debug;

use crate::{EvictionQueue, InitError, InitResult, RawBuffer, RenderError, RenderResult};

/// Vertex, index, uniform or storage buffer
///
/// Uploads and read-backs go through the copy targets so they never disturb
/// the vertex array or uniform bindings of the device.
pub struct GlGpuBuffer {
    gl: Rc<Context>,
    raw: RawBuffer,
    id: BufferId,
    desc: GpuBufferDesc,
    is_es: bool,
    stats: Arc<RenderStats>,
    eviction: Rc<EvictionQueue>,
}

impl GlGpuBuffer {
    pub(crate) fn new(
        gl: Rc<Context>,
        desc: GpuBufferDesc,
        initial_data: Option<&[u8]>,
        is_es: bool,
        stats: Arc<RenderStats>,
        eviction: Rc<EvictionQueue>,
    ) -> InitResult<Self> {
        if desc.buffer_type == GpuBufferType::Index && desc.index_type.is_none() {
            return Err(InitError::CreateBufferObject(
                "index buffers need an index type".to_string(),
            ));
        }

        if let Some(data) = initial_data {
            if data.len() > desc.size as usize {
                return Err(InitError::CreateBufferObject(format!(
                    "initial data of {} bytes does not fit into a buffer of {} bytes",
                    data.len(),
                    desc.size
                )));
            }
        }

        let raw = unsafe { gl.create_buffer() }.map_err(InitError::CreateBufferObject)?;
        let usage = gl_buffer_usage(desc.usage);

        unsafe {
            gl.bind_buffer(glow::COPY_WRITE_BUFFER, Some(raw));
            gl.buffer_data_size(glow::COPY_WRITE_BUFFER, desc.size as i32, usage);
            if let Some(data) = initial_data {
                gl.buffer_sub_data_u8_slice(glow::COPY_WRITE_BUFFER, 0, data);
            }
            gl.bind_buffer(glow::COPY_WRITE_BUFFER, None);
        }

        let id = BufferId::next();
        debug!("Created {:?} buffer {} ({} bytes)", desc.buffer_type, id, desc.size);
        stats.increment(RenderStat::ObjectsCreated);

        Ok(Self {
            gl,
            raw,
            id,
            desc,
            is_es,
            stats,
            eviction,
        })
    }

    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    #[inline]
    pub fn desc(&self) -> &GpuBufferDesc {
        &self.desc
    }

    #[inline]
    pub fn raw(&self) -> RawBuffer {
        self.raw
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.desc.size
    }

    /// Index width, `None` for anything but index buffers
    #[inline]
    pub fn index_type(&self) -> Option<IndexType> {
        self.desc.index_type
    }

    /// Binding target matching the buffer type
    pub fn target(&self) -> u32 {
        gl_buffer_target(self.desc.buffer_type)
    }

    /// Overwrite `data.len()` bytes starting at `offset`
    pub fn write(&self, offset: u32, data: &[u8]) -> RenderResult<()> {
        check_range(offset, data.len(), self.desc.size)?;

        unsafe {
            self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, Some(self.raw));
            self.gl
                .buffer_sub_data_u8_slice(glow::COPY_WRITE_BUFFER, offset as i32, data);
            self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, None);
        }

        self.stats.increment(RenderStat::ResourceWrites);
        Ok(())
    }

    /// Copy `out.len()` bytes starting at `offset` back from the GPU
    ///
    /// Blocks until the GPU has finished writing the buffer.
    pub fn read(&self, offset: u32, out: &mut [u8]) -> RenderResult<()> {
        check_range(offset, out.len(), self.desc.size)?;
        if out.is_empty() {
            return Ok(());
        }

        unsafe {
            self.gl.bind_buffer(glow::COPY_READ_BUFFER, Some(self.raw));
            if self.is_es {
                // ES has no glGetBufferSubData
                let ptr = self.gl.map_buffer_range(
                    glow::COPY_READ_BUFFER,
                    offset as i32,
                    out.len() as i32,
                    glow::MAP_READ_BIT,
                );
                if ptr.is_null() {
                    self.gl.bind_buffer(glow::COPY_READ_BUFFER, None);
                    return Err(RenderError::OpenGLError(format!(
                        "failed to map buffer {} for reading",
                        self.id
                    )));
                }
                std::ptr::copy_nonoverlapping(ptr, out.as_mut_ptr(), out.len());
                self.gl.unmap_buffer(glow::COPY_READ_BUFFER);
            } else {
                self.gl
                    .get_buffer_sub_data(glow::COPY_READ_BUFFER, offset as i32, out);
            }
            self.gl.bind_buffer(glow::COPY_READ_BUFFER, None);
        }

        self.stats.increment(RenderStat::ResourceReads);
        Ok(())
    }
}

impl Drop for GlGpuBuffer {
    fn drop(&mut self) {
        // VAOs referencing the buffer are evicted on the next drain
        self.eviction.push_buffer(self.id);
        unsafe { self.gl.delete_buffer(self.raw) };
        self.stats.increment(RenderStat::ObjectsDestroyed);
    }
}

impl std::fmt::Debug for GlGpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlGpuBuffer")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}

fn check_range(offset: u32, len: usize, size: u32) -> RenderResult<()> {
    let end = offset as u64 + len as u64;
    if end > size as u64 {
        return Err(RenderError::OutOfBounds(format!(
            "range {}..{} exceeds buffer size {}",
            offset, end, size
        )));
    }
    Ok(())
}

pub(crate) fn gl_buffer_usage(usage: BufferUsage) -> u32 {
    match usage {
        BufferUsage::Static => glow::STATIC_DRAW,
        BufferUsage::Dynamic => glow::DYNAMIC_DRAW,
        BufferUsage::Stream => glow::STREAM_DRAW,
    }
}

pub(crate) fn gl_buffer_target(buffer_type: GpuBufferType) -> u32 {
    match buffer_type {
        GpuBufferType::Vertex => glow::ARRAY_BUFFER,
        GpuBufferType::Index => glow::ELEMENT_ARRAY_BUFFER,
        GpuBufferType::ParamBlock => glow::UNIFORM_BUFFER,
        GpuBufferType::Standard => glow::SHADER_STORAGE_BUFFER,
    }
}

/// GL type of the indices stored in an index buffer
pub(crate) fn gl_index_type(index_type: IndexType) -> u32 {
    match index_type {
        IndexType::U16 => glow::UNSIGNED_SHORT,
        IndexType::U32 => glow::UNSIGNED_INT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_past_the_end_are_rejected() {
        assert!(check_range(0, 16, 16).is_ok());
        assert!(check_range(8, 8, 16).is_ok());
        assert!(matches!(check_range(12, 8, 16), Err(RenderError::OutOfBounds(_))));
        assert!(check_range(u32::MAX, 1, 16).is_err());
    }

    #[test]
    fn targets_follow_buffer_type() {
        assert_eq!(gl_buffer_target(GpuBufferType::Index), glow::ELEMENT_ARRAY_BUFFER);
        assert_eq!(gl_buffer_target(GpuBufferType::ParamBlock), glow::UNIFORM_BUFFER);
        assert_eq!(gl_index_type(IndexType::U16), glow::UNSIGNED_SHORT);
    }
}
