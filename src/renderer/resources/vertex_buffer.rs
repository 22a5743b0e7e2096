//! Vertex Buffer
//!
//! A [`VertexBuffer`] streams geometry to the GPU. The write strategy is
//! fixed at creation:
//!
//! | Strategy      | `map()` returns                      | `unmap()`                          |
//! |---------------|--------------------------------------|------------------------------------|
//! | `Persistent`  | an idle range of the mapped ring     | advances the cursor                |
//! | `MapRange`    | an unsynchronized mapped range       | unmaps, advances the cursor        |
//! | `SubData`     | CPU staging memory                   | `glBufferSubData` at the cursor    |
//! | `BufferData`  | CPU staging memory                   | re-specifies the whole store       |
//!
//! # Persistent ring
//!
//! ```text
//!   0                next_offset          buffer_end          buffer_size
//!   ├── in flight ───────┼──── free ───────────┼──── in flight ─────┤
//! ```
//!
//! Writes go to `[next_offset, buffer_end)`. Each frame ends with a fence
//! guarding everything written so far; a fence's `next_end` is the offset up
//! to which the ring is free once it signals. When the cursor runs into
//! `buffer_end` the oldest fence that frees enough space is waited on.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};
use smallvec::SmallVec;

use super::index_buffer::IndexBuffer;
use crate::errors::{GlError, Result};
use crate::platform::{Capabilities, GlFeatures};
use crate::renderer::core::device::{
    BufferHandle, BufferTarget, BufferUsage, DrawMode, FenceHandle, GraphicsDevice, MapAccess, StorageFlags, WaitResult,
};
use crate::renderer::core::release::{GpuResource, ReleaseQueue};
use crate::renderer::pipeline::{POSITION_ATTRIBUTE, ShaderProgram, TEXCOORD_ATTRIBUTE, UniformSlot};
use crate::renderer::settings::{PersistentBufferPolicy, RenderSettings, RingBufferTuning};
use crate::renderer::viewport::Rect;

// ============================================================================
// Vertex Layouts
// ============================================================================

/// One float attribute inside an interleaved vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttrib {
    pub index: u32,
    pub components: i32,
    /// Byte offset within the vertex.
    pub offset: usize,
}

/// Vertex types with a fixed attribute layout.
pub trait Vertex: Pod {
    const ATTRIBS: &'static [VertexAttrib];
}

/// 2D position and texture coordinate.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct GLVertex2D {
    pub position: Vec2,
    pub texcoord: Vec2,
}

impl Vertex for GLVertex2D {
    const ATTRIBS: &'static [VertexAttrib] = &[
        VertexAttrib {
            index: POSITION_ATTRIBUTE,
            components: 2,
            offset: 0,
        },
        VertexAttrib {
            index: TEXCOORD_ATTRIBUTE,
            components: 2,
            offset: 8,
        },
    ];
}

/// 3D position and texture coordinate.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct GLVertex3D {
    pub position: Vec3,
    pub texcoord: Vec2,
}

impl Vertex for GLVertex3D {
    const ATTRIBS: &'static [VertexAttrib] = &[
        VertexAttrib {
            index: POSITION_ATTRIBUTE,
            components: 3,
            offset: 0,
        },
        VertexAttrib {
            index: TEXCOORD_ATTRIBUTE,
            components: 2,
            offset: 12,
        },
    ];
}

// ============================================================================
// Draw Parameters
// ============================================================================

/// Primitive topology, including quads which are emulated with indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    Triangles,
    TriangleStrip,
    TriangleFan,
    Quads,
}

impl Primitive {
    fn draw_mode(self) -> Option<DrawMode> {
        Some(match self {
            Self::Points => DrawMode::Points,
            Self::Lines => DrawMode::Lines,
            Self::LineStrip => DrawMode::LineStrip,
            Self::LineLoop => DrawMode::LineLoop,
            Self::Triangles => DrawMode::Triangles,
            Self::TriangleStrip => DrawMode::TriangleStrip,
            Self::TriangleFan => DrawMode::TriangleFan,
            Self::Quads => return None,
        })
    }
}

/// Hardware clipping: one draw per rectangle, scissored.
#[derive(Debug, Clone, Copy)]
pub struct Clip<'a> {
    /// Rectangles in top-down framebuffer pixels.
    pub region: &'a [Rect],
    /// Height of the bound framebuffer, for the flip to bottom-up scissors.
    pub target_height: i32,
}

// ============================================================================
// Write Strategy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteStrategy {
    Persistent,
    MapRange,
    SubData,
    BufferData,
}

impl WriteStrategy {
    /// The persistent ring is only used for streaming buffers.
    #[must_use]
    pub fn select(caps: &Capabilities, settings: &RenderSettings, usage: BufferUsage) -> Self {
        let ring_capable = caps.supports(GlFeatures::BUFFER_STORAGE | GlFeatures::SYNC_FENCES);
        let persistent = usage == BufferUsage::Stream
            && ring_capable
            && match settings.persistent_buffers {
                PersistentBufferPolicy::Force => true,
                PersistentBufferPolicy::Disable => false,
                PersistentBufferPolicy::Auto => !caps.prefer_buffer_sub_data && !caps.virtual_machine,
            };
        if persistent {
            Self::Persistent
        } else if caps.supports(GlFeatures::MAP_BUFFER_RANGE) && !caps.prefer_buffer_sub_data {
            Self::MapRange
        } else if caps.prefer_buffer_sub_data {
            Self::SubData
        } else {
            Self::BufferData
        }
    }
}

/// A fence and the ring offset that becomes free once it signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferFence {
    pub fence: FenceHandle,
    pub next_end: usize,
}

/// Fixed-length history of per-frame write volumes.
#[derive(Debug, Clone)]
struct FrameSizes {
    sizes: SmallVec<[usize; 8]>,
    cursor: usize,
}

impl FrameSizes {
    fn new(len: usize) -> Self {
        Self {
            sizes: SmallVec::from_elem(0, len.max(1)),
            cursor: 0,
        }
    }

    fn push(&mut self, size: usize) {
        self.sizes[self.cursor] = size;
        self.cursor = (self.cursor + 1) % self.sizes.len();
    }

    fn average(&self) -> usize {
        self.sizes.iter().sum::<usize>() / self.sizes.len()
    }
}

// ============================================================================
// VertexBuffer
// ============================================================================

pub struct VertexBuffer {
    usage: BufferUsage,
    strategy: WriteStrategy,
    indexed_quads: bool,
    tuning: RingBufferTuning,
    fence_timeout_ns: u64,

    buffer: Option<BufferHandle>,
    buffer_size: usize,
    next_offset: usize,
    base_address: usize,
    buffer_end: usize,
    mapped: Option<usize>,
    range_access: MapAccess,
    frame_size: usize,
    frame_sizes: FrameSizes,
    fences: SmallVec<[BufferFence; 8]>,
    staging: Vec<u8>,

    attribs: SmallVec<[VertexAttrib; 4]>,
    stride: i32,
    vertex_count: i32,
    color: Vec4,
    use_color: bool,

    release: ReleaseQueue,
}

impl std::fmt::Debug for VertexBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexBuffer")
            .field("strategy", &self.strategy)
            .field("buffer_size", &self.buffer_size)
            .field("next_offset", &self.next_offset)
            .field("fences", &self.fences.len())
            .finish_non_exhaustive()
    }
}

impl VertexBuffer {
    /// Creates a buffer whose strategy follows the context's capabilities.
    /// No GPU object exists until the first write.
    #[must_use]
    pub fn new(release: ReleaseQueue, usage: BufferUsage, caps: &Capabilities, settings: &RenderSettings) -> Self {
        let mut vbo = Self::with_strategy(release, usage, WriteStrategy::select(caps, settings, usage), settings);
        vbo.indexed_quads = IndexBuffer::is_supported(caps);
        vbo
    }

    #[must_use]
    pub fn with_strategy(release: ReleaseQueue, usage: BufferUsage, strategy: WriteStrategy, settings: &RenderSettings) -> Self {
        Self {
            usage,
            strategy,
            indexed_quads: true,
            tuning: settings.ring,
            fence_timeout_ns: settings.fence_timeout_ns(),
            buffer: None,
            buffer_size: 0,
            next_offset: 0,
            base_address: 0,
            buffer_end: 0,
            mapped: None,
            range_access: MapAccess::WRITE,
            frame_size: 0,
            frame_sizes: FrameSizes::new(settings.ring.frame_history),
            fences: SmallVec::new(),
            staging: Vec::new(),
            attribs: SmallVec::from_slice(GLVertex2D::ATTRIBS),
            stride: size_of::<GLVertex2D>() as i32,
            vertex_count: 0,
            color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            use_color: false,
            release,
        }
    }

    // === Accessors ===

    #[inline]
    #[must_use]
    pub fn strategy(&self) -> WriteStrategy {
        self.strategy
    }

    #[inline]
    #[must_use]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> Option<BufferHandle> {
        self.buffer
    }

    /// Size of the GPU store in bytes.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer_size
    }

    /// Offset of the last unmapped write; attribute pointers are relative to it.
    #[inline]
    #[must_use]
    pub fn base_address(&self) -> usize {
        self.base_address
    }

    #[inline]
    #[must_use]
    pub fn next_offset(&self) -> usize {
        self.next_offset
    }

    #[inline]
    #[must_use]
    pub fn fences(&self) -> &[BufferFence] {
        &self.fences
    }

    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> i32 {
        self.vertex_count
    }

    #[inline]
    #[must_use]
    pub fn supports_indexed_quads(&self) -> bool {
        self.indexed_quads
    }

    // === Layout & State ===

    /// Interleaved layout of the data written next. `stride` is in bytes.
    pub fn set_attrib_layout(&mut self, attribs: &[VertexAttrib], stride: usize) {
        self.attribs = SmallVec::from_slice(attribs);
        self.stride = stride as i32;
    }

    pub fn set_vertex_count(&mut self, count: i32) {
        self.vertex_count = count;
    }

    /// Constant color uploaded to the bound program's `geometryColor` on
    /// [`bind_arrays`](Self::bind_arrays). Enables it as well.
    pub fn set_color(&mut self, color: Vec4) {
        self.color = color;
        self.use_color = true;
    }

    pub fn set_use_color(&mut self, enable: bool) {
        self.use_color = enable;
    }

    /// Clears per-draw state. The GPU store and the ring position are kept.
    pub fn reset(&mut self) {
        self.use_color = false;
        self.color = Vec4::new(0.0, 0.0, 0.0, 1.0);
        self.vertex_count = 0;
    }

    // === Writing ===

    /// Returns `size` writable bytes. The data becomes visible to draws
    /// after [`unmap`](Self::unmap).
    ///
    /// On a persistent ring this may wait on a fence; a timeout returns
    /// [`GlError::FenceWaitTimeout`] with nothing mapped.
    pub fn map<'a>(&'a mut self, device: &'a mut dyn GraphicsDevice, size: usize) -> Result<&'a mut [u8]> {
        if size == 0 {
            self.mapped = Some(0);
            return Ok(&mut []);
        }
        match self.strategy {
            WriteStrategy::Persistent => {
                let offset = self.idle_range(device, size)?;
                let buffer = self.buffer.ok_or(GlError::NotMapped)?;
                match device.persistent_mapping(buffer, offset, size) {
                    Some(range) => {
                        self.mapped = Some(size);
                        Ok(range)
                    }
                    None => Err(GlError::MapFailed { offset, size }),
                }
            }
            WriteStrategy::MapRange => {
                let offset = self.next_free_range(device, size)?;
                self.mapped = Some(size);
                let access = self.range_access;
                match device.map_buffer_range(BufferTarget::Array, offset, size, access) {
                    Some(range) => Ok(range),
                    None => {
                        self.mapped = None;
                        Err(GlError::MapFailed { offset, size })
                    }
                }
            }
            WriteStrategy::SubData | WriteStrategy::BufferData => {
                if self.staging.len() < size {
                    self.staging.resize(size, 0);
                }
                self.mapped = Some(size);
                Ok(&mut self.staging[..size])
            }
        }
    }

    /// Commits the bytes written through the last [`map`](Self::map).
    pub fn unmap(&mut self, device: &mut dyn GraphicsDevice) -> Result<()> {
        let size = self.mapped.take().ok_or(GlError::NotMapped)?;
        self.frame_size += size;
        if size == 0 {
            return Ok(());
        }
        match self.strategy {
            WriteStrategy::Persistent => {
                self.base_address = self.next_offset;
                self.next_offset += self.tuning.align(size);
            }
            WriteStrategy::MapRange => {
                device.bind_buffer(BufferTarget::Array, self.buffer);
                if !device.unmap_buffer(BufferTarget::Array) {
                    log::warn!("Vertex data lost while mapped ({size} bytes)");
                }
                self.base_address = self.next_offset;
                self.next_offset += self.tuning.align(size);
            }
            WriteStrategy::SubData => {
                self.ensure_buffer(device)?;
                if self.next_offset + size > self.buffer_size {
                    self.reallocate(device, size);
                    self.next_offset = 0;
                }
                device.buffer_sub_data(BufferTarget::Array, self.next_offset, &self.staging[..size]);
                self.base_address = self.next_offset;
                self.next_offset += self.tuning.align(size);
            }
            WriteStrategy::BufferData => {
                self.ensure_buffer(device)?;
                device.buffer_data(BufferTarget::Array, size, Some(&self.staging[..size]), self.usage);
                self.buffer_size = size;
                self.base_address = 0;
                self.next_offset = 0;
            }
        }
        if self.usage == BufferUsage::Static && !self.staging.is_empty() {
            self.staging = Vec::new();
        }
        Ok(())
    }

    /// Writes raw bytes as one range.
    pub fn set_data(&mut self, device: &mut dyn GraphicsDevice, data: &[u8]) -> Result<()> {
        let range = self.map(device, data.len())?;
        range.copy_from_slice(data);
        self.unmap(device)
    }

    /// Writes interleaved vertices and adopts their layout and count.
    pub fn set_vertices<V: Vertex>(&mut self, device: &mut dyn GraphicsDevice, vertices: &[V]) -> Result<()> {
        self.set_attrib_layout(V::ATTRIBS, size_of::<V>());
        self.vertex_count = vertices.len() as i32;
        self.set_data(device, bytemuck::cast_slice(vertices))
    }

    // === Drawing ===

    /// Points the attribute arrays at the last write and uploads the
    /// geometry color to `program` if one is set.
    pub fn bind_arrays(&self, device: &mut dyn GraphicsDevice, program: Option<&ShaderProgram>) {
        if self.use_color
            && let Some(program) = program
        {
            program.set_uniform(device, UniformSlot::GeometryColor, self.color);
        }
        device.bind_buffer(BufferTarget::Array, self.buffer);
        for attrib in &self.attribs {
            device.vertex_attrib_pointer(attrib.index, attrib.components, self.stride, self.base_address + attrib.offset);
            device.enable_vertex_attrib_array(attrib.index);
        }
    }

    pub fn unbind_arrays(&self, device: &mut dyn GraphicsDevice) {
        for attrib in &self.attribs {
            device.disable_vertex_attrib_array(attrib.index);
        }
        device.bind_buffer(BufferTarget::Array, None);
    }

    /// Draws `count` vertices starting at `first` from the bound arrays.
    pub fn draw(
        &self,
        device: &mut dyn GraphicsDevice,
        indices: &mut IndexBuffer,
        primitive: Primitive,
        first: i32,
        count: i32,
        clip: Option<Clip<'_>>,
    ) -> Result<()> {
        let draw_once = |device: &mut dyn GraphicsDevice| match primitive.draw_mode() {
            Some(mode) => device.draw_arrays(mode, first, count),
            None => device.draw_elements_base_vertex(DrawMode::Triangles, count * 6 / 4, 0, first),
        };

        if primitive == Primitive::Quads {
            if !self.indexed_quads {
                return Err(GlError::Unsupported("quads without base-vertex indexed draws"));
            }
            indices.bind(device)?;
            indices.accommodate(device, (count / 4) as usize)?;
        }

        match clip {
            None => draw_once(device),
            Some(clip) => {
                device.set_scissor_test(true);
                for r in clip.region {
                    device.scissor(r.x, clip.target_height - (r.y + r.height), r.width, r.height);
                    draw_once(device);
                }
                device.set_scissor_test(false);
            }
        }
        Ok(())
    }

    /// Binds, draws every vertex of the last write and unbinds.
    pub fn render(
        &self,
        device: &mut dyn GraphicsDevice,
        program: Option<&ShaderProgram>,
        indices: &mut IndexBuffer,
        primitive: Primitive,
        clip: Option<Clip<'_>>,
    ) -> Result<()> {
        self.bind_arrays(device, program);
        let result = self.draw(device, indices, primitive, 0, self.vertex_count, clip);
        self.unbind_arrays(device);
        result
    }

    // === Frame Lifecycle ===

    /// Reaps signaled fences, always keeping the newest.
    pub fn begin_frame(&mut self, device: &mut dyn GraphicsDevice) {
        if self.strategy != WriteStrategy::Persistent {
            return;
        }
        while self.fences.len() > 1 && device.fence_signaled(self.fences[0].fence) {
            let fence = self.fences.remove(0);
            device.delete_sync(fence.fence);
            self.buffer_end = fence.next_end;
        }
    }

    /// Fences this frame's writes. A ring that is too small for the recent
    /// write volume is dropped and reallocated on the next write.
    pub fn end_of_frame(&mut self, device: &mut dyn GraphicsDevice) {
        if self.strategy != WriteStrategy::Persistent || self.frame_size == 0 {
            self.frame_size = 0;
            return;
        }
        self.frame_sizes.push(std::mem::take(&mut self.frame_size));

        let average = self.frame_sizes.average();
        if average > self.buffer_size / self.tuning.realloc_threshold_div.max(1) {
            log::debug!(
                "Streaming ring too small ({} bytes, {average} bytes/frame), reallocating",
                self.buffer_size
            );
            self.drop_ring(device);
        } else if let Some(fence) = device.fence_sync() {
            self.fences.push(BufferFence {
                fence,
                next_end: self.next_offset + self.buffer_size,
            });
        }
    }

    // === Persistent Ring ===

    fn idle_range(&mut self, device: &mut dyn GraphicsDevice, size: usize) -> Result<usize> {
        if size > self.buffer_size {
            self.reallocate_ring(device, size * 2)?;
        }

        if self.next_offset + size > self.buffer_size {
            self.next_offset = 0;
            self.buffer_end = self.buffer_end.saturating_sub(self.buffer_size);
            for fence in &mut self.fences {
                fence.next_end = fence.next_end.saturating_sub(self.buffer_size);
            }
            if let Some(fence) = device.fence_sync() {
                self.fences.push(BufferFence {
                    fence,
                    next_end: self.buffer_size,
                });
            }
        }

        if self.next_offset + size > self.buffer_end {
            self.await_fence(device, self.next_offset + size)?;
        }
        Ok(self.next_offset)
    }

    /// Waits until the ring is free up to `end`.
    fn await_fence(&mut self, device: &mut dyn GraphicsDevice, end: usize) -> Result<()> {
        // a later fence covers every earlier one
        while self.fences.first().is_some_and(|f| f.next_end < end) {
            let fence = self.fences.remove(0);
            device.delete_sync(fence.fence);
        }
        let fence = *self.fences.first().ok_or(GlError::FenceWaitFailed)?;

        if !device.fence_signaled(fence.fence) {
            log::debug!("Stalling on streaming buffer fence");
            match device.client_wait_sync(fence.fence, self.fence_timeout_ns) {
                WaitResult::TimeoutExpired => {
                    log::error!("Timed out waiting for streaming buffer fence");
                    return Err(GlError::FenceWaitTimeout {
                        timeout_ns: self.fence_timeout_ns,
                    });
                }
                WaitResult::Failed => {
                    log::error!("Waiting for streaming buffer fence failed");
                    return Err(GlError::FenceWaitFailed);
                }
                WaitResult::AlreadySignaled | WaitResult::ConditionSatisfied => {}
            }
        }
        device.delete_sync(fence.fence);
        self.buffer_end = fence.next_end;
        self.fences.remove(0);
        Ok(())
    }

    fn reallocate_ring(&mut self, device: &mut dyn GraphicsDevice, size: usize) -> Result<()> {
        self.drop_ring(device);

        let min_size = (self.frame_sizes.average() * self.tuning.growth_factor).max(self.tuning.min_persistent_size);
        let size = size.max(min_size);

        let buffer = device.create_buffer()?;
        device.bind_buffer(BufferTarget::Array, Some(buffer));
        let flags = StorageFlags::DYNAMIC_STORAGE
            | StorageFlags::MAP_WRITE
            | StorageFlags::MAP_PERSISTENT
            | StorageFlags::MAP_COHERENT;
        let access = MapAccess::WRITE | MapAccess::PERSISTENT | MapAccess::COHERENT;
        let mapped = device
            .buffer_storage(BufferTarget::Array, size, flags)
            .map(|()| device.map_buffer_range(BufferTarget::Array, 0, size, access).is_some());
        match mapped {
            Ok(true) => {}
            Ok(false) => {
                device.delete_buffer(buffer);
                return Err(GlError::MapFailed { offset: 0, size });
            }
            Err(e) => {
                device.delete_buffer(buffer);
                return Err(e);
            }
        }

        log::debug!("Allocated {size} byte persistent streaming ring");
        self.buffer = Some(buffer);
        self.buffer_size = size;
        self.next_offset = 0;
        self.buffer_end = size;
        Ok(())
    }

    /// Deletes the ring and its fences.
    fn drop_ring(&mut self, device: &mut dyn GraphicsDevice) {
        for fence in self.fences.drain(..) {
            device.delete_sync(fence.fence);
        }
        if let Some(buffer) = self.buffer.take() {
            device.delete_buffer(buffer);
        }
        self.buffer_size = 0;
        self.next_offset = 0;
        self.buffer_end = 0;
    }

    // === Non-persistent Store ===

    fn ensure_buffer(&mut self, device: &mut dyn GraphicsDevice) -> Result<()> {
        if self.buffer.is_none() {
            self.buffer = Some(device.create_buffer()?);
        }
        device.bind_buffer(BufferTarget::Array, self.buffer);
        Ok(())
    }

    fn reallocate(&mut self, device: &mut dyn GraphicsDevice, size: usize) {
        let size = if self.usage == BufferUsage::Static {
            size
        } else {
            size.max(self.tuning.min_streaming_size)
        };
        device.buffer_data(BufferTarget::Array, size, None, self.usage);
        self.buffer_size = size;
    }

    /// Picks the next range for [`WriteStrategy::MapRange`]. Running off
    /// the end grows the store or orphans it and starts over at 0.
    fn next_free_range(&mut self, device: &mut dyn GraphicsDevice, size: usize) -> Result<usize> {
        self.ensure_buffer(device)?;
        self.range_access = MapAccess::WRITE | MapAccess::INVALIDATE_RANGE | MapAccess::UNSYNCHRONIZED;
        if self.next_offset + size > self.buffer_size {
            if size > self.buffer_size {
                self.reallocate(device, size);
            } else {
                self.range_access |= MapAccess::INVALIDATE_BUFFER;
                self.range_access.remove(MapAccess::UNSYNCHRONIZED);
            }
            self.next_offset = 0;
        }
        Ok(self.next_offset)
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        for fence in self.fences.drain(..) {
            self.release.push(GpuResource::Fence(fence.fence));
        }
        if let Some(buffer) = self.buffer.take() {
            self.release.push(GpuResource::Buffer(buffer));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::core::headless::HeadlessDevice;

    fn small_ring() -> RenderSettings {
        RenderSettings {
            ring: RingBufferTuning {
                min_persistent_size: 1024,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn write(vbo: &mut VertexBuffer, dev: &mut HeadlessDevice, size: usize, byte: u8) -> Result<()> {
        vbo.map(dev, size)?.fill(byte);
        vbo.unmap(dev)
    }

    #[test]
    fn map_range_round_trip() {
        let mut dev = HeadlessDevice::new();
        let mut vbo = VertexBuffer::with_strategy(ReleaseQueue::new(), BufferUsage::Stream, WriteStrategy::MapRange, &RenderSettings::default());
        let data: Vec<u8> = (0..100).collect();
        vbo.set_data(&mut dev, &data).unwrap();
        vbo.set_data(&mut dev, &data).unwrap();

        assert_eq!(vbo.capacity(), 32 * 1024);
        assert_eq!(vbo.base_address(), 104);
        let contents = dev.buffer_contents(vbo.handle().unwrap()).unwrap();
        assert_eq!(&contents[104..204], &data[..]);
    }

    #[test]
    fn ring_wrap_waits_on_fence() {
        let mut dev = HeadlessDevice::new();
        let mut vbo = VertexBuffer::with_strategy(ReleaseQueue::new(), BufferUsage::Stream, WriteStrategy::Persistent, &small_ring());
        for _ in 0..3 {
            write(&mut vbo, &mut dev, 256, 1).unwrap();
        }
        assert_eq!(vbo.next_offset(), 768);
        vbo.end_of_frame(&mut dev);
        assert_eq!(vbo.fences().len(), 1);

        vbo.begin_frame(&mut dev);
        write(&mut vbo, &mut dev, 512, 2).unwrap();
        assert_eq!(vbo.base_address(), 0);
        // the frame fence was consumed, the wrap fence guards the tail
        assert_eq!(vbo.fences().len(), 1);
        assert_eq!(vbo.fences()[0].next_end, 1024);
        assert_eq!(dev.stats().fence_waits, 1);
    }

    #[test]
    fn hung_gpu_fails_the_write_only() {
        let mut dev = HeadlessDevice::new();
        let mut vbo = VertexBuffer::with_strategy(ReleaseQueue::new(), BufferUsage::Stream, WriteStrategy::Persistent, &small_ring());
        for _ in 0..3 {
            write(&mut vbo, &mut dev, 256, 1).unwrap();
        }
        vbo.end_of_frame(&mut dev);

        dev.set_hang(true);
        let err = vbo.map(&mut dev, 512).unwrap_err();
        assert!(matches!(err, GlError::FenceWaitTimeout { .. }));
        assert!(matches!(vbo.unmap(&mut dev), Err(GlError::NotMapped)));

        dev.set_hang(false);
        write(&mut vbo, &mut dev, 512, 3).unwrap();
        assert_eq!(vbo.base_address(), 0);
    }

    #[test]
    fn oversubscribed_ring_is_reallocated() {
        let mut dev = HeadlessDevice::new();
        let mut vbo = VertexBuffer::with_strategy(ReleaseQueue::new(), BufferUsage::Stream, WriteStrategy::Persistent, &small_ring());
        // 5000 bytes through a 2000 byte ring
        for _ in 0..5 {
            write(&mut vbo, &mut dev, 1000, 0).unwrap();
        }
        assert_eq!(vbo.capacity(), 2000);
        vbo.end_of_frame(&mut dev);
        assert_eq!(vbo.capacity(), 0);
        assert!(vbo.fences().is_empty());

        write(&mut vbo, &mut dev, 100, 0).unwrap();
        assert_eq!(vbo.capacity(), 1250 * 3);
    }

    #[test]
    fn static_buffer_drops_staging_copy() {
        let mut dev = HeadlessDevice::new();
        let mut vbo = VertexBuffer::with_strategy(ReleaseQueue::new(), BufferUsage::Static, WriteStrategy::BufferData, &RenderSettings::default());
        let quad = [
            GLVertex2D {
                position: Vec2::new(0.0, 0.0),
                texcoord: Vec2::new(0.0, 0.0),
            },
            GLVertex2D {
                position: Vec2::new(1.0, 1.0),
                texcoord: Vec2::new(1.0, 1.0),
            },
        ];
        vbo.set_vertices(&mut dev, &quad).unwrap();
        assert_eq!(vbo.vertex_count(), 2);
        assert_eq!(vbo.capacity(), 32);
        assert!(vbo.staging.is_empty());
        let contents = dev.buffer_contents(vbo.handle().unwrap()).unwrap();
        assert_eq!(contents, bytemuck::cast_slice::<_, u8>(&quad[..]));
    }
}
