//! OpenGL Device (glow)
//!
//! [`GlowDevice`] implements [`GraphicsDevice`] on top of a `glow::Context`.
//! The caller creates the context (EGL, GLX, ...) and makes it current; this
//! type never switches contexts.
//!
//! Native GL object names are kept in slotmaps so that typed handles can be
//! validated before they reach the driver.

use glow::HasContext;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;

use super::device::{
    Attachment, BlitRect, BufferBits, BufferHandle, BufferTarget, BufferUsage, CompileOutcome,
    ContextInfo, DrawMode, FenceHandle, FramebufferHandle, FramebufferStatus, FramebufferTarget,
    GraphicsDevice, InternalFormat, MapAccess, PixelFormat, PixelSource, PixelStore, PixelType,
    ProgramHandle, RenderbufferFormat, RenderbufferHandle, ShaderStage, StorageFlags, Swizzle,
    TexParameter, TextureFilter, TextureHandle, TextureTarget, UniformLocation, UniformValue,
    WaitResult, WrapMode,
};
use crate::errors::{GlError, Result};

const GL_BGRA8_EXT: u32 = 0x93A1;
const GL_FRAMEBUFFER_INCOMPLETE_DIMENSIONS: u32 = 0x8CD9;
const MAX_QUEUED_ERRORS: usize = 16;

struct GlowProgram {
    program: glow::Program,
    shaders: SmallVec<[glow::Shader; 2]>,
}

struct PersistentMapping {
    ptr: *mut u8,
    offset: usize,
    len: usize,
}

struct GlowBuffer {
    buffer: glow::Buffer,
    persistent: Option<PersistentMapping>,
}

/// [`GraphicsDevice`] backed by a current OpenGL / OpenGL ES context.
pub struct GlowDevice {
    gl: glow::Context,
    info: ContextInfo,

    programs: SlotMap<ProgramHandle, GlowProgram>,
    buffers: SlotMap<BufferHandle, GlowBuffer>,
    textures: SlotMap<TextureHandle, glow::Texture>,
    framebuffers: SlotMap<FramebufferHandle, glow::Framebuffer>,
    renderbuffers: SlotMap<RenderbufferHandle, glow::Renderbuffer>,
    fences: SlotMap<FenceHandle, glow::Fence>,

    bound_buffers: FxHashMap<BufferTarget, BufferHandle>,
    draw_framebuffer: Option<FramebufferHandle>,
    vertex_array: Option<glow::VertexArray>,
}

impl GlowDevice {
    /// Wraps a context that is current on the calling thread.
    pub fn new(gl: glow::Context) -> Result<Self> {
        // SAFETY: the caller guarantees the context is current.
        let info = unsafe {
            ContextInfo {
                vendor: gl.get_parameter_string(glow::VENDOR),
                renderer: gl.get_parameter_string(glow::RENDERER),
                version: gl.get_parameter_string(glow::VERSION),
                glsl_version: gl.get_parameter_string(glow::SHADING_LANGUAGE_VERSION),
                extensions: gl.supported_extensions().iter().cloned().collect(),
            }
        };

        // Core profiles refuse attribute arrays without a bound VAO.
        let vertex_array = if gl.version().major >= 3 {
            // SAFETY: as above.
            unsafe {
                let vao = gl.create_vertex_array().map_err(GlError::ObjectCreation)?;
                gl.bind_vertex_array(Some(vao));
                Some(vao)
            }
        } else {
            None
        };

        log::debug!("GL context: {} / {} / {}", info.vendor, info.renderer, info.version);

        Ok(Self {
            gl,
            info,
            programs: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            renderbuffers: SlotMap::with_key(),
            fences: SlotMap::with_key(),
            bound_buffers: FxHashMap::default(),
            draw_framebuffer: None,
            vertex_array,
        })
    }

    /// The wrapped context, for calls this crate does not abstract.
    #[must_use]
    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    fn internal_format(&self, format: InternalFormat, immutable: bool) -> u32 {
        match format {
            InternalFormat::R8 => glow::R8,
            InternalFormat::Rg8 => glow::RG8,
            InternalFormat::Rgb8 => glow::RGB8,
            InternalFormat::Rgba8 => glow::RGBA8,
            InternalFormat::Srgb8Alpha8 => glow::SRGB8_ALPHA8,
            InternalFormat::Rgb10A2 => glow::RGB10_A2,
            InternalFormat::R16 => glow::R16,
            InternalFormat::Rg16 => glow::RG16,
            InternalFormat::Rgba16 => glow::RGBA16,
            InternalFormat::Rgba16F => glow::RGBA16F,
            InternalFormat::Bgra8 if self.info.is_gles() => {
                if immutable { GL_BGRA8_EXT } else { glow::BGRA }
            }
            InternalFormat::Bgra8 => glow::RGBA8,
            InternalFormat::Depth16 => glow::DEPTH_COMPONENT16,
            InternalFormat::Depth24 => glow::DEPTH_COMPONENT24,
            InternalFormat::Depth24Stencil8 => glow::DEPTH24_STENCIL8,
            InternalFormat::StencilIndex8 => glow::STENCIL_INDEX8,
        }
    }

    fn bound_buffer(&self, target: BufferTarget) -> Option<BufferHandle> {
        self.bound_buffers.get(&target).copied()
    }

    /// Clears the error flags and returns the first one set. Bounded, since a
    /// lost context may keep reporting `GL_CONTEXT_LOST`.
    fn drain_errors(&self) -> Option<u32> {
        let mut first = None;
        for _ in 0..MAX_QUEUED_ERRORS {
            // SAFETY: querying the error flag has no preconditions.
            let err = unsafe { self.gl.get_error() };
            if err == glow::NO_ERROR {
                break;
            }
            first.get_or_insert(err);
        }
        first
    }
}

// ─── Enum Translation ─────────────────────────────────────────────────────────

fn buffer_target(target: BufferTarget) -> u32 {
    match target {
        BufferTarget::Array => glow::ARRAY_BUFFER,
        BufferTarget::ElementArray => glow::ELEMENT_ARRAY_BUFFER,
        BufferTarget::CopyRead => glow::COPY_READ_BUFFER,
        BufferTarget::CopyWrite => glow::COPY_WRITE_BUFFER,
        BufferTarget::PixelUnpack => glow::PIXEL_UNPACK_BUFFER,
    }
}

fn buffer_usage(usage: BufferUsage) -> u32 {
    match usage {
        BufferUsage::Static => glow::STATIC_DRAW,
        BufferUsage::Dynamic => glow::DYNAMIC_DRAW,
        BufferUsage::Stream => glow::STREAM_DRAW,
    }
}

fn map_access(access: MapAccess) -> u32 {
    let table = [
        (MapAccess::READ, glow::MAP_READ_BIT),
        (MapAccess::WRITE, glow::MAP_WRITE_BIT),
        (MapAccess::INVALIDATE_RANGE, glow::MAP_INVALIDATE_RANGE_BIT),
        (MapAccess::INVALIDATE_BUFFER, glow::MAP_INVALIDATE_BUFFER_BIT),
        (MapAccess::FLUSH_EXPLICIT, glow::MAP_FLUSH_EXPLICIT_BIT),
        (MapAccess::UNSYNCHRONIZED, glow::MAP_UNSYNCHRONIZED_BIT),
        (MapAccess::PERSISTENT, glow::MAP_PERSISTENT_BIT),
        (MapAccess::COHERENT, glow::MAP_COHERENT_BIT),
    ];
    table
        .iter()
        .filter(|(flag, _)| access.contains(*flag))
        .fold(0, |bits, (_, gl)| bits | gl)
}

fn storage_flags(flags: StorageFlags) -> u32 {
    let table = [
        (StorageFlags::MAP_READ, glow::MAP_READ_BIT),
        (StorageFlags::MAP_WRITE, glow::MAP_WRITE_BIT),
        (StorageFlags::MAP_PERSISTENT, glow::MAP_PERSISTENT_BIT),
        (StorageFlags::MAP_COHERENT, glow::MAP_COHERENT_BIT),
        (StorageFlags::DYNAMIC_STORAGE, glow::DYNAMIC_STORAGE_BIT),
    ];
    table
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .fold(0, |bits, (_, gl)| bits | gl)
}

fn draw_mode(mode: DrawMode) -> u32 {
    match mode {
        DrawMode::Points => glow::POINTS,
        DrawMode::Lines => glow::LINES,
        DrawMode::LineStrip => glow::LINE_STRIP,
        DrawMode::LineLoop => glow::LINE_LOOP,
        DrawMode::Triangles => glow::TRIANGLES,
        DrawMode::TriangleStrip => glow::TRIANGLE_STRIP,
        DrawMode::TriangleFan => glow::TRIANGLE_FAN,
    }
}

fn texture_target(target: TextureTarget) -> u32 {
    match target {
        TextureTarget::Texture2D => glow::TEXTURE_2D,
        TextureTarget::Rectangle => glow::TEXTURE_RECTANGLE,
    }
}

fn pixel_format(format: PixelFormat) -> u32 {
    match format {
        PixelFormat::Red => glow::RED,
        PixelFormat::Rg => glow::RG,
        PixelFormat::Rgb => glow::RGB,
        PixelFormat::Rgba => glow::RGBA,
        PixelFormat::Bgra => glow::BGRA,
        PixelFormat::DepthComponent => glow::DEPTH_COMPONENT,
    }
}

fn pixel_type(ty: PixelType) -> u32 {
    match ty {
        PixelType::UnsignedByte => glow::UNSIGNED_BYTE,
        PixelType::UnsignedShort => glow::UNSIGNED_SHORT,
        PixelType::HalfFloat => glow::HALF_FLOAT,
        PixelType::Float => glow::FLOAT,
        PixelType::UnsignedInt2101010Rev => glow::UNSIGNED_INT_2_10_10_10_REV,
    }
}

fn texture_filter(filter: TextureFilter) -> i32 {
    (match filter {
        TextureFilter::Nearest => glow::NEAREST,
        TextureFilter::Linear => glow::LINEAR,
        TextureFilter::NearestMipmapNearest => glow::NEAREST_MIPMAP_NEAREST,
        TextureFilter::LinearMipmapNearest => glow::LINEAR_MIPMAP_NEAREST,
        TextureFilter::NearestMipmapLinear => glow::NEAREST_MIPMAP_LINEAR,
        TextureFilter::LinearMipmapLinear => glow::LINEAR_MIPMAP_LINEAR,
    }) as i32
}

fn wrap_mode(wrap: WrapMode) -> i32 {
    (match wrap {
        WrapMode::Repeat => glow::REPEAT,
        WrapMode::MirroredRepeat => glow::MIRRORED_REPEAT,
        WrapMode::ClampToEdge => glow::CLAMP_TO_EDGE,
        WrapMode::ClampToBorder => glow::CLAMP_TO_BORDER,
    }) as i32
}

fn swizzle(component: Swizzle) -> i32 {
    (match component {
        Swizzle::Red => glow::RED,
        Swizzle::Green => glow::GREEN,
        Swizzle::Blue => glow::BLUE,
        Swizzle::Alpha => glow::ALPHA,
        Swizzle::Zero => glow::ZERO,
        Swizzle::One => glow::ONE,
    }) as i32
}

fn framebuffer_target(target: FramebufferTarget) -> u32 {
    match target {
        FramebufferTarget::Framebuffer => glow::FRAMEBUFFER,
        FramebufferTarget::Draw => glow::DRAW_FRAMEBUFFER,
        FramebufferTarget::Read => glow::READ_FRAMEBUFFER,
    }
}

fn attachment(attachment: Attachment) -> u32 {
    match attachment {
        Attachment::Color0 => glow::COLOR_ATTACHMENT0,
        Attachment::Depth => glow::DEPTH_ATTACHMENT,
        Attachment::Stencil => glow::STENCIL_ATTACHMENT,
        Attachment::DepthStencil => glow::DEPTH_STENCIL_ATTACHMENT,
    }
}

fn renderbuffer_format(format: RenderbufferFormat) -> u32 {
    match format {
        RenderbufferFormat::Depth24Stencil8 => glow::DEPTH24_STENCIL8,
        RenderbufferFormat::Depth24 => glow::DEPTH_COMPONENT24,
        RenderbufferFormat::Depth16 => glow::DEPTH_COMPONENT16,
        RenderbufferFormat::StencilIndex8 => glow::STENCIL_INDEX8,
    }
}

fn buffer_bits(mask: BufferBits) -> u32 {
    let mut bits = 0;
    if mask.contains(BufferBits::COLOR) {
        bits |= glow::COLOR_BUFFER_BIT;
    }
    if mask.contains(BufferBits::DEPTH) {
        bits |= glow::DEPTH_BUFFER_BIT;
    }
    if mask.contains(BufferBits::STENCIL) {
        bits |= glow::STENCIL_BUFFER_BIT;
    }
    bits
}

fn framebuffer_status(code: u32) -> FramebufferStatus {
    match code {
        glow::FRAMEBUFFER_COMPLETE => FramebufferStatus::Complete,
        glow::FRAMEBUFFER_UNDEFINED => FramebufferStatus::Undefined,
        glow::FRAMEBUFFER_INCOMPLETE_ATTACHMENT => FramebufferStatus::IncompleteAttachment,
        glow::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT => FramebufferStatus::MissingAttachment,
        GL_FRAMEBUFFER_INCOMPLETE_DIMENSIONS => FramebufferStatus::IncompleteDimensions,
        glow::FRAMEBUFFER_INCOMPLETE_DRAW_BUFFER => FramebufferStatus::IncompleteDrawBuffer,
        glow::FRAMEBUFFER_INCOMPLETE_READ_BUFFER => FramebufferStatus::IncompleteReadBuffer,
        glow::FRAMEBUFFER_INCOMPLETE_MULTISAMPLE => FramebufferStatus::IncompleteMultisample,
        glow::FRAMEBUFFER_UNSUPPORTED => FramebufferStatus::Unsupported,
        other => FramebufferStatus::Unknown(other),
    }
}

fn pixel_unpack(source: PixelSource<'_>) -> glow::PixelUnpackData<'_> {
    match source {
        PixelSource::Slice(data) => glow::PixelUnpackData::Slice(Some(data)),
        PixelSource::Empty => glow::PixelUnpackData::Slice(None),
        PixelSource::UnpackBuffer(offset) => glow::PixelUnpackData::BufferOffset(offset as u32),
    }
}

fn debug_severity(severity: u32) -> log::Level {
    match severity {
        glow::DEBUG_SEVERITY_HIGH => log::Level::Error,
        glow::DEBUG_SEVERITY_MEDIUM => log::Level::Warn,
        glow::DEBUG_SEVERITY_LOW => log::Level::Info,
        _ => log::Level::Debug,
    }
}

// ─── GraphicsDevice ───────────────────────────────────────────────────────────

// SAFETY (all `unsafe` blocks below): every native name passed to the driver
// comes out of one of this device's slotmaps, so it was created on this
// context and has not been deleted yet. The context is current by contract.
impl GraphicsDevice for GlowDevice {
    fn context_info(&self) -> &ContextInfo {
        &self.info
    }

    // === Programs ===

    fn create_program(&mut self) -> Result<ProgramHandle> {
        let program = unsafe { self.gl.create_program() }.map_err(GlError::ObjectCreation)?;
        Ok(self.programs.insert(GlowProgram {
            program,
            shaders: SmallVec::new(),
        }))
    }

    fn compile_shader(&mut self, program: ProgramHandle, stage: ShaderStage, source: &str) -> CompileOutcome {
        let Some(p) = self.programs.get_mut(program) else {
            return CompileOutcome {
                success: false,
                log: "invalid program handle".into(),
            };
        };
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe {
            let shader = match self.gl.create_shader(kind) {
                Ok(s) => s,
                Err(log) => return CompileOutcome { success: false, log },
            };
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            let success = self.gl.get_shader_compile_status(shader);
            let log = self.gl.get_shader_info_log(shader);
            if success {
                self.gl.attach_shader(p.program, shader);
                p.shaders.push(shader);
            } else {
                self.gl.delete_shader(shader);
            }
            CompileOutcome { success, log }
        }
    }

    fn bind_attrib_location(&mut self, program: ProgramHandle, index: u32, name: &str) {
        if let Some(p) = self.programs.get(program) {
            unsafe { self.gl.bind_attrib_location(p.program, index, name) };
        }
    }

    fn bind_frag_data_location(&mut self, program: ProgramHandle, color: u32, name: &str) {
        // GLSL ES has a single implicit output.
        if self.info.is_gles() {
            return;
        }
        if let Some(p) = self.programs.get(program) {
            unsafe { self.gl.bind_frag_data_location(p.program, color, name) };
        }
    }

    fn link_program(&mut self, program: ProgramHandle) -> CompileOutcome {
        let Some(p) = self.programs.get_mut(program) else {
            return CompileOutcome {
                success: false,
                log: "invalid program handle".into(),
            };
        };
        unsafe {
            self.gl.link_program(p.program);
            let success = self.gl.get_program_link_status(p.program);
            let log = self.gl.get_program_info_log(p.program);
            for shader in p.shaders.drain(..) {
                self.gl.detach_shader(p.program, shader);
                self.gl.delete_shader(shader);
            }
            CompileOutcome { success, log }
        }
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        let native = program.and_then(|h| self.programs.get(h)).map(|p| p.program);
        unsafe { self.gl.use_program(native) };
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let p = self.programs.get(program)?;
        unsafe { self.gl.get_uniform_location(p.program, name) }.map(|l| UniformLocation(l.0))
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let loc = glow::NativeUniformLocation(location.0);
        let loc = Some(&loc);
        unsafe {
            match value {
                UniformValue::Int(v) => self.gl.uniform_1_i32(loc, v),
                UniformValue::Float(v) => self.gl.uniform_1_f32(loc, v),
                UniformValue::Vec2(v) => self.gl.uniform_2_f32(loc, v.x, v.y),
                UniformValue::Vec3(v) => self.gl.uniform_3_f32(loc, v.x, v.y, v.z),
                UniformValue::Vec4(v) => self.gl.uniform_4_f32(loc, v.x, v.y, v.z, v.w),
                UniformValue::Mat3(m) => {
                    self.gl.uniform_matrix_3_f32_slice(loc, false, &m.to_cols_array());
                }
                UniformValue::Mat4(m) => {
                    self.gl.uniform_matrix_4_f32_slice(loc, false, &m.to_cols_array());
                }
            }
        }
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if let Some(p) = self.programs.remove(program) {
            unsafe {
                for shader in p.shaders {
                    self.gl.delete_shader(shader);
                }
                self.gl.delete_program(p.program);
            }
        }
    }

    // === Buffers ===

    fn create_buffer(&mut self) -> Result<BufferHandle> {
        let buffer = unsafe { self.gl.create_buffer() }.map_err(GlError::ObjectCreation)?;
        Ok(self.buffers.insert(GlowBuffer {
            buffer,
            persistent: None,
        }))
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferHandle>) {
        let native = buffer.and_then(|h| self.buffers.get(h)).map(|b| b.buffer);
        match buffer {
            Some(h) if native.is_some() => self.bound_buffers.insert(target, h),
            _ => self.bound_buffers.remove(&target),
        };
        unsafe { self.gl.bind_buffer(buffer_target(target), native) };
    }

    fn buffer_data(&mut self, target: BufferTarget, size: usize, data: Option<&[u8]>, usage: BufferUsage) {
        let (t, u) = (buffer_target(target), buffer_usage(usage));
        unsafe {
            match data {
                Some(d) if d.len() == size => self.gl.buffer_data_u8_slice(t, d, u),
                Some(d) => {
                    self.gl.buffer_data_size(t, size as i32, u);
                    self.gl.buffer_sub_data_u8_slice(t, 0, &d[..d.len().min(size)]);
                }
                None => self.gl.buffer_data_size(t, size as i32, u),
            }
        }
        if let Some(b) = self.bound_buffer(target).and_then(|h| self.buffers.get_mut(h)) {
            b.persistent = None;
        }
    }

    fn buffer_storage(&mut self, target: BufferTarget, size: usize, flags: StorageFlags) -> Result<()> {
        unsafe {
            self.gl
                .buffer_storage(buffer_target(target), size as i32, None, storage_flags(flags));
        }
        match self.drain_errors() {
            None => Ok(()),
            Some(err) => Err(GlError::ObjectCreation(format!(
                "glBufferStorage({size}) failed: 0x{err:x}"
            ))),
        }
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]) {
        unsafe {
            self.gl
                .buffer_sub_data_u8_slice(buffer_target(target), offset as i32, data);
        }
    }

    fn map_buffer_range(
        &mut self,
        target: BufferTarget,
        offset: usize,
        len: usize,
        access: MapAccess,
    ) -> Option<&mut [u8]> {
        let ptr = unsafe {
            self.gl
                .map_buffer_range(buffer_target(target), offset as i32, len as i32, map_access(access))
        };
        if ptr.is_null() {
            log::warn!("glMapBufferRange({offset}, {len}) returned null");
            return None;
        }
        if access.contains(MapAccess::PERSISTENT) {
            if let Some(b) = self.bound_buffer(target).and_then(|h| self.buffers.get_mut(h)) {
                b.persistent = Some(PersistentMapping { ptr, offset, len });
            }
        }
        // SAFETY: the driver returned a writable mapping of `len` bytes that
        // stays valid until `unmap_buffer`, which needs `&mut self`.
        Some(unsafe { std::slice::from_raw_parts_mut(ptr, len) })
    }

    fn unmap_buffer(&mut self, target: BufferTarget) -> bool {
        if let Some(b) = self.bound_buffer(target).and_then(|h| self.buffers.get_mut(h)) {
            b.persistent = None;
        }
        unsafe { self.gl.unmap_buffer(buffer_target(target)) };
        self.drain_errors().is_none()
    }

    fn persistent_mapping(&mut self, buffer: BufferHandle, offset: usize, len: usize) -> Option<&mut [u8]> {
        let m = self.buffers.get_mut(buffer)?.persistent.as_ref()?;
        if offset < m.offset || offset + len > m.offset + m.len {
            return None;
        }
        // SAFETY: bounds checked against the live persistent mapping above.
        Some(unsafe { std::slice::from_raw_parts_mut(m.ptr.add(offset - m.offset), len) })
    }

    fn copy_buffer_sub_data(
        &mut self,
        read: BufferTarget,
        write: BufferTarget,
        read_offset: usize,
        write_offset: usize,
        size: usize,
    ) {
        unsafe {
            self.gl.copy_buffer_sub_data(
                buffer_target(read),
                buffer_target(write),
                read_offset as i32,
                write_offset as i32,
                size as i32,
            );
        }
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.bound_buffers.retain(|_, b| *b != buffer);
        if let Some(b) = self.buffers.remove(buffer) {
            unsafe { self.gl.delete_buffer(b.buffer) };
        }
    }

    // === Vertex Input & Drawing ===

    fn vertex_attrib_pointer(&mut self, index: u32, components: i32, stride: i32, offset: usize) {
        unsafe {
            self.gl
                .vertex_attrib_pointer_f32(index, components, glow::FLOAT, false, stride, offset as i32);
        }
    }

    fn enable_vertex_attrib_array(&mut self, index: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(index) };
    }

    fn disable_vertex_attrib_array(&mut self, index: u32) {
        unsafe { self.gl.disable_vertex_attrib_array(index) };
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(draw_mode(mode), first, count) };
    }

    fn draw_elements_base_vertex(&mut self, mode: DrawMode, count: i32, index_offset: usize, base_vertex: i32) {
        unsafe {
            self.gl.draw_elements_base_vertex(
                draw_mode(mode),
                count,
                glow::UNSIGNED_SHORT,
                index_offset as i32,
                base_vertex,
            );
        }
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) };
    }

    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.scissor(x, y, width, height) };
    }

    fn set_scissor_test(&mut self, enabled: bool) {
        unsafe {
            if enabled {
                self.gl.enable(glow::SCISSOR_TEST);
            } else {
                self.gl.disable(glow::SCISSOR_TEST);
            }
        }
    }

    // === Synchronization ===

    fn fence_sync(&mut self) -> Option<FenceHandle> {
        match unsafe { self.gl.fence_sync(glow::SYNC_GPU_COMMANDS_COMPLETE, 0) } {
            Ok(fence) => Some(self.fences.insert(fence)),
            Err(e) => {
                log::warn!("glFenceSync failed: {e}");
                None
            }
        }
    }

    fn fence_signaled(&mut self, fence: FenceHandle) -> bool {
        self.fences
            .get(fence)
            .is_some_and(|f| unsafe { self.gl.get_sync_status(*f) } == glow::SIGNALED)
    }

    fn client_wait_sync(&mut self, fence: FenceHandle, timeout_ns: u64) -> WaitResult {
        let Some(&f) = self.fences.get(fence) else {
            return WaitResult::Failed;
        };
        let timeout = i32::try_from(timeout_ns).unwrap_or(i32::MAX);
        match unsafe { self.gl.client_wait_sync(f, glow::SYNC_FLUSH_COMMANDS_BIT, timeout) } {
            glow::ALREADY_SIGNALED => WaitResult::AlreadySignaled,
            glow::CONDITION_SATISFIED => WaitResult::ConditionSatisfied,
            glow::TIMEOUT_EXPIRED => WaitResult::TimeoutExpired,
            _ => WaitResult::Failed,
        }
    }

    fn delete_sync(&mut self, fence: FenceHandle) {
        if let Some(f) = self.fences.remove(fence) {
            unsafe { self.gl.delete_sync(f) };
        }
    }

    fn flush(&mut self) {
        unsafe { self.gl.flush() };
    }

    fn finish(&mut self) {
        unsafe { self.gl.finish() };
    }

    // === Textures ===

    fn create_texture(&mut self) -> Result<TextureHandle> {
        let texture = unsafe { self.gl.create_texture() }.map_err(GlError::ObjectCreation)?;
        Ok(self.textures.insert(texture))
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: Option<TextureHandle>) {
        let native = texture.and_then(|h| self.textures.get(h)).copied();
        unsafe { self.gl.bind_texture(texture_target(target), native) };
    }

    fn tex_storage_2d(
        &mut self,
        target: TextureTarget,
        levels: i32,
        format: InternalFormat,
        width: i32,
        height: i32,
    ) -> Result<()> {
        let internal = self.internal_format(format, true);
        unsafe {
            self.gl
                .tex_storage_2d(texture_target(target), levels, internal, width, height);
        }
        match self.drain_errors() {
            None => Ok(()),
            Some(err) => Err(GlError::TextureAllocation(format!(
                "glTexStorage2D({width}x{height}, {format:?}) failed: 0x{err:x}"
            ))),
        }
    }

    fn tex_image_2d(
        &mut self,
        target: TextureTarget,
        level: i32,
        format: InternalFormat,
        width: i32,
        height: i32,
        pixel_format_: PixelFormat,
        pixel_type_: PixelType,
        source: PixelSource<'_>,
    ) -> Result<()> {
        let internal = self.internal_format(format, false);
        unsafe {
            self.gl.tex_image_2d(
                texture_target(target),
                level,
                internal as i32,
                width,
                height,
                0,
                pixel_format(pixel_format_),
                pixel_type(pixel_type_),
                pixel_unpack(source),
            );
        }
        match self.drain_errors() {
            None => Ok(()),
            Some(err) => Err(GlError::TextureAllocation(format!(
                "glTexImage2D({width}x{height}, {format:?}) failed: 0x{err:x}"
            ))),
        }
    }

    fn tex_sub_image_2d(
        &mut self,
        target: TextureTarget,
        level: i32,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        pixel_format_: PixelFormat,
        pixel_type_: PixelType,
        source: PixelSource<'_>,
    ) {
        unsafe {
            self.gl.tex_sub_image_2d(
                texture_target(target),
                level,
                x,
                y,
                width,
                height,
                pixel_format(pixel_format_),
                pixel_type(pixel_type_),
                pixel_unpack(source),
            );
        }
    }

    fn pixel_store(&mut self, param: PixelStore) {
        let (name, value) = match param {
            PixelStore::UnpackRowLength(v) => (glow::UNPACK_ROW_LENGTH, v),
            PixelStore::UnpackSkipPixels(v) => (glow::UNPACK_SKIP_PIXELS, v),
            PixelStore::UnpackSkipRows(v) => (glow::UNPACK_SKIP_ROWS, v),
            PixelStore::UnpackAlignment(v) => (glow::UNPACK_ALIGNMENT, v),
            PixelStore::PackAlignment(v) => (glow::PACK_ALIGNMENT, v),
        };
        unsafe { self.gl.pixel_store_i32(name, value) };
    }

    fn tex_parameter(&mut self, target: TextureTarget, param: TexParameter) {
        let t = texture_target(target);
        unsafe {
            match param {
                TexParameter::MinFilter(f) => {
                    self.gl.tex_parameter_i32(t, glow::TEXTURE_MIN_FILTER, texture_filter(f));
                }
                TexParameter::MagFilter(f) => {
                    self.gl.tex_parameter_i32(t, glow::TEXTURE_MAG_FILTER, texture_filter(f));
                }
                TexParameter::WrapS(w) => self.gl.tex_parameter_i32(t, glow::TEXTURE_WRAP_S, wrap_mode(w)),
                TexParameter::WrapT(w) => self.gl.tex_parameter_i32(t, glow::TEXTURE_WRAP_T, wrap_mode(w)),
                TexParameter::MaxLevel(l) => self.gl.tex_parameter_i32(t, glow::TEXTURE_MAX_LEVEL, l),
                TexParameter::Swizzle([r, g, b, a]) => {
                    self.gl.tex_parameter_i32(t, glow::TEXTURE_SWIZZLE_R, swizzle(r));
                    self.gl.tex_parameter_i32(t, glow::TEXTURE_SWIZZLE_G, swizzle(g));
                    self.gl.tex_parameter_i32(t, glow::TEXTURE_SWIZZLE_B, swizzle(b));
                    self.gl.tex_parameter_i32(t, glow::TEXTURE_SWIZZLE_A, swizzle(a));
                }
            }
        }
    }

    fn generate_mipmap(&mut self, target: TextureTarget) {
        unsafe { self.gl.generate_mipmap(texture_target(target)) };
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        if let Some(t) = self.textures.remove(texture) {
            unsafe { self.gl.delete_texture(t) };
        }
    }

    // === Framebuffers ===

    fn create_framebuffer(&mut self) -> Result<FramebufferHandle> {
        let fb = unsafe { self.gl.create_framebuffer() }.map_err(GlError::ObjectCreation)?;
        Ok(self.framebuffers.insert(fb))
    }

    fn bind_framebuffer(&mut self, target: FramebufferTarget, framebuffer: Option<FramebufferHandle>) {
        let native = framebuffer.and_then(|h| self.framebuffers.get(h)).copied();
        if target != FramebufferTarget::Read {
            self.draw_framebuffer = framebuffer.filter(|_| native.is_some());
        }
        unsafe { self.gl.bind_framebuffer(framebuffer_target(target), native) };
    }

    fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.draw_framebuffer
    }

    fn framebuffer_texture_2d(
        &mut self,
        target: FramebufferTarget,
        attachment_: Attachment,
        tex_target: TextureTarget,
        texture: Option<TextureHandle>,
        level: i32,
    ) {
        let native = texture.and_then(|h| self.textures.get(h)).copied();
        unsafe {
            self.gl.framebuffer_texture_2d(
                framebuffer_target(target),
                attachment(attachment_),
                texture_target(tex_target),
                native,
                level,
            );
        }
    }

    fn create_renderbuffer(&mut self) -> Result<RenderbufferHandle> {
        let rb = unsafe { self.gl.create_renderbuffer() }.map_err(GlError::ObjectCreation)?;
        Ok(self.renderbuffers.insert(rb))
    }

    fn renderbuffer_storage(&mut self, renderbuffer: RenderbufferHandle, format: RenderbufferFormat, width: i32, height: i32) {
        let Some(&rb) = self.renderbuffers.get(renderbuffer) else {
            return;
        };
        unsafe {
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, Some(rb));
            self.gl
                .renderbuffer_storage(glow::RENDERBUFFER, renderbuffer_format(format), width, height);
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, None);
        }
        if let Some(err) = self.drain_errors() {
            log::debug!("glRenderbufferStorage({format:?}) rejected: 0x{err:x}");
        }
    }

    fn framebuffer_renderbuffer(
        &mut self,
        target: FramebufferTarget,
        attachment_: Attachment,
        renderbuffer: Option<RenderbufferHandle>,
    ) {
        let native = renderbuffer.and_then(|h| self.renderbuffers.get(h)).copied();
        unsafe {
            self.gl.framebuffer_renderbuffer(
                framebuffer_target(target),
                attachment(attachment_),
                glow::RENDERBUFFER,
                native,
            );
        }
    }

    fn check_framebuffer_status(&mut self, target: FramebufferTarget) -> FramebufferStatus {
        framebuffer_status(unsafe { self.gl.check_framebuffer_status(framebuffer_target(target)) })
    }

    fn blit_framebuffer(&mut self, src: BlitRect, dst: BlitRect, mask: BufferBits, linear: bool) {
        let filter = if linear { glow::LINEAR } else { glow::NEAREST };
        unsafe {
            self.gl.blit_framebuffer(
                src.x0,
                src.y0,
                src.x1,
                src.y1,
                dst.x0,
                dst.y0,
                dst.x1,
                dst.y1,
                buffer_bits(mask),
                filter,
            );
        }
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        unsafe { self.gl.clear_color(r, g, b, a) };
    }

    fn clear(&mut self, mask: BufferBits) {
        unsafe { self.gl.clear(buffer_bits(mask)) };
    }

    fn read_pixels(&mut self, x: i32, y: i32, width: i32, height: i32, out: &mut [u8]) {
        unsafe {
            self.gl.read_pixels(
                x,
                y,
                width,
                height,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(Some(out)),
            );
        }
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if self.draw_framebuffer == Some(framebuffer) {
            self.draw_framebuffer = None;
        }
        if let Some(fb) = self.framebuffers.remove(framebuffer) {
            unsafe { self.gl.delete_framebuffer(fb) };
        }
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        if let Some(rb) = self.renderbuffers.remove(renderbuffer) {
            unsafe { self.gl.delete_renderbuffer(rb) };
        }
    }

    // === Debug ===

    fn enable_debug_output(&mut self, verbose: bool) -> bool {
        if !self.info.has_extension("GL_KHR_debug") && self.gl.version().major < 4 {
            return false;
        }
        unsafe {
            self.gl.enable(glow::DEBUG_OUTPUT);
            self.gl.debug_message_callback(move |_source, kind, id, severity, message| {
                let level = if kind == glow::DEBUG_TYPE_ERROR {
                    log::Level::Error
                } else {
                    debug_severity(severity)
                };
                if verbose || level == log::Level::Error {
                    log::log!(level, "GL debug [{id}]: {message}");
                }
            });
        }
        true
    }
}

impl Drop for GlowDevice {
    fn drop(&mut self) {
        if let Some(vao) = self.vertex_array.take() {
            // SAFETY: created in `new` on this context.
            unsafe { self.gl.delete_vertex_array(vao) };
        }
    }
}
