//! Headless Device
//!
//! A deterministic, CPU-only [`GraphicsDevice`]. It keeps buffer stores,
//! texels and framebuffer attachments in plain memory so that uploads,
//! clears, blits and read-backs can be checked byte for byte, and it models
//! GPU progress explicitly: fences signal only when
//! [`complete_gpu_work`](HeadlessDevice::complete_gpu_work) is called or a
//! client wait lets the "GPU" catch up.
//!
//! Draw calls are recorded, not rasterized.
//!
//! Driver behaviour that can be toggled for tests:
//! - [`set_hang`](HeadlessDevice::set_hang): every fence wait times out
//! - [`set_packed_depth_stencil`](HeadlessDevice::set_packed_depth_stencil):
//!   reject combined depth-stencil renderbuffers
//! - [`set_max_texture_size`](HeadlessDevice::set_max_texture_size)

use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use super::device::{
    Attachment, BlitRect, BufferBits, BufferHandle, BufferTarget, BufferUsage, CompileOutcome,
    ContextInfo, DrawMode, FenceHandle, FramebufferHandle, FramebufferStatus, FramebufferTarget,
    GraphicsDevice, InternalFormat, MapAccess, PixelFormat, PixelSource, PixelStore, PixelType,
    ProgramHandle, RenderbufferFormat, RenderbufferHandle, ShaderStage, StorageFlags, Swizzle,
    TexParameter, TextureFilter, TextureHandle, TextureTarget, UniformLocation, UniformValue,
    WaitResult, WrapMode,
};
use crate::errors::{GlError, Result};

// ─── Recorded State ───────────────────────────────────────────────────────────

/// Counters for calls whose frequency matters to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub program_binds: usize,
    pub draw_calls: usize,
    pub buffer_allocations: usize,
    pub buffer_sub_data: usize,
    pub buffer_maps: usize,
    pub fence_waits: usize,
    pub fence_timeouts: usize,
    pub framebuffer_binds: usize,
    pub blits: usize,
    pub texture_uploads: usize,
    pub unpack_buffer_uploads: usize,
}

/// One recorded draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCall {
    pub mode: DrawMode,
    pub first: i32,
    pub count: i32,
    /// `Some` for indexed draws.
    pub base_vertex: Option<i32>,
    pub program: Option<ProgramHandle>,
    pub framebuffer: Option<FramebufferHandle>,
    pub vertex_buffer: Option<BufferHandle>,
    pub scissor: Option<[i32; 4]>,
}

#[derive(Debug, Default)]
pub struct HeadlessProgram {
    pub stages: Vec<(ShaderStage, String)>,
    pub linked: bool,
    pub attrib_bindings: Vec<(u32, String)>,
    pub frag_bindings: Vec<(u32, String)>,
    uniforms: Vec<String>,
    values: FxHashMap<u32, UniformValue>,
}

#[derive(Debug, Default)]
struct HeadlessBuffer {
    data: Vec<u8>,
    immutable: bool,
    mapped: Option<(usize, usize)>,
    persistent: bool,
}

/// Texture state visible to tests.
#[derive(Debug, Clone)]
pub struct HeadlessTexture {
    pub width: i32,
    pub height: i32,
    pub format: Option<InternalFormat>,
    pub levels: i32,
    pub immutable: bool,
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub max_level: i32,
    pub swizzle: [Swizzle; 4],
    pub mipmaps_generated: bool,
    /// Level-0 texels as RGBA8, bottom row first.
    pub pixels: Vec<u8>,
}

impl Default for HeadlessTexture {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            format: None,
            levels: 0,
            immutable: false,
            min_filter: TextureFilter::NearestMipmapLinear,
            mag_filter: TextureFilter::Linear,
            wrap_s: WrapMode::Repeat,
            wrap_t: WrapMode::Repeat,
            max_level: 1000,
            swizzle: [Swizzle::Red, Swizzle::Green, Swizzle::Blue, Swizzle::Alpha],
            mipmaps_generated: false,
            pixels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttachmentRef {
    Texture(TextureHandle),
    Renderbuffer(RenderbufferHandle),
}

#[derive(Debug, Default)]
struct HeadlessFramebuffer {
    attachments: FxHashMap<Attachment, AttachmentRef>,
}

#[derive(Debug, Default)]
struct HeadlessRenderbuffer {
    size: Option<(i32, i32)>,
}

#[derive(Debug, Clone, Copy)]
struct UnpackState {
    row_length: i32,
    skip_pixels: i32,
    skip_rows: i32,
    alignment: i32,
}

impl Default for UnpackState {
    fn default() -> Self {
        Self {
            row_length: 0,
            skip_pixels: 0,
            skip_rows: 0,
            alignment: 4,
        }
    }
}

// ─── HeadlessDevice ───────────────────────────────────────────────────────────

/// Software implementation of [`GraphicsDevice`].
pub struct HeadlessDevice {
    info: ContextInfo,

    programs: SlotMap<ProgramHandle, HeadlessProgram>,
    buffers: SlotMap<BufferHandle, HeadlessBuffer>,
    textures: SlotMap<TextureHandle, HeadlessTexture>,
    framebuffers: SlotMap<FramebufferHandle, HeadlessFramebuffer>,
    renderbuffers: SlotMap<RenderbufferHandle, HeadlessRenderbuffer>,
    fences: SlotMap<FenceHandle, u64>,

    current_program: Option<ProgramHandle>,
    bound_buffers: FxHashMap<BufferTarget, BufferHandle>,
    bound_textures: FxHashMap<TextureTarget, TextureHandle>,
    draw_framebuffer: Option<FramebufferHandle>,
    read_framebuffer: Option<FramebufferHandle>,
    array_buffer_at_attrib: Option<BufferHandle>,

    surface: (i32, i32, Vec<u8>),
    unpack: UnpackState,
    viewport: [i32; 4],
    scissor: [i32; 4],
    scissor_enabled: bool,
    clear_color: [f32; 4],

    next_fence_serial: u64,
    completed_serial: u64,
    hang: bool,
    fail_links: bool,
    packed_depth_stencil: bool,
    max_texture_size: i32,
    debug_output: Option<bool>,

    stats: DeviceStats,
    draws: Vec<DrawCall>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    /// Desktop GL 4.6 core profile with every extension the pipeline uses.
    #[must_use]
    pub fn new() -> Self {
        Self::with_info(Self::desktop_info())
    }

    /// A device reporting the given context strings.
    #[must_use]
    pub fn with_info(info: ContextInfo) -> Self {
        Self {
            info,
            programs: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            renderbuffers: SlotMap::with_key(),
            fences: SlotMap::with_key(),
            current_program: None,
            bound_buffers: FxHashMap::default(),
            bound_textures: FxHashMap::default(),
            draw_framebuffer: None,
            read_framebuffer: None,
            array_buffer_at_attrib: None,
            surface: (256, 256, vec![0; 256 * 256 * 4]),
            unpack: UnpackState::default(),
            viewport: [0, 0, 256, 256],
            scissor: [0, 0, 256, 256],
            scissor_enabled: false,
            clear_color: [0.0; 4],
            next_fence_serial: 1,
            completed_serial: 0,
            hang: false,
            fail_links: false,
            packed_depth_stencil: true,
            max_texture_size: 16384,
            debug_output: None,
            stats: DeviceStats::default(),
            draws: Vec::new(),
        }
    }

    /// Context strings of a capable desktop driver.
    #[must_use]
    pub fn desktop_info() -> ContextInfo {
        ContextInfo {
            vendor: "glpipe".into(),
            renderer: "glpipe headless device".into(),
            version: "4.6 (Core Profile) Mesa 24.1.0".into(),
            glsl_version: "4.60".into(),
            extensions: [
                "GL_ARB_buffer_storage",
                "GL_ARB_map_buffer_range",
                "GL_ARB_sync",
                "GL_ARB_copy_buffer",
                "GL_ARB_draw_elements_base_vertex",
                "GL_ARB_texture_storage",
                "GL_ARB_texture_swizzle",
                "GL_ARB_texture_rg",
                "GL_ARB_framebuffer_object",
                "GL_ARB_pixel_buffer_object",
                "GL_KHR_debug",
                "GL_MESA_pack_invert",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }

    /// Context strings of an OpenGL ES 3.2 driver.
    #[must_use]
    pub fn gles_info() -> ContextInfo {
        ContextInfo {
            vendor: "glpipe".into(),
            renderer: "glpipe headless device".into(),
            version: "OpenGL ES 3.2 Mesa 24.1.0".into(),
            glsl_version: "OpenGL ES GLSL ES 3.20".into(),
            extensions: [
                "GL_EXT_buffer_storage",
                "GL_EXT_texture_format_BGRA8888",
                "GL_EXT_unpack_subimage",
                "GL_OES_EGL_image",
                "GL_KHR_debug",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }

    // === Test Controls ===

    /// Marks every submitted fence as signaled.
    pub fn complete_gpu_work(&mut self) {
        self.completed_serial = self.next_fence_serial - 1;
    }

    /// When hung, fences never signal and every wait times out.
    pub fn set_hang(&mut self, hang: bool) {
        self.hang = hang;
    }

    /// When set, every program fails to link.
    pub fn set_fail_links(&mut self, fail: bool) {
        self.fail_links = fail;
    }

    pub fn set_packed_depth_stencil(&mut self, supported: bool) {
        self.packed_depth_stencil = supported;
    }

    pub fn set_max_texture_size(&mut self, size: i32) {
        self.max_texture_size = size;
    }

    /// Resizes the window-system framebuffer, clearing it.
    pub fn set_surface_size(&mut self, width: i32, height: i32) {
        let len = (width.max(0) * height.max(0) * 4) as usize;
        self.surface = (width, height, vec![0; len]);
    }

    // === Inspection ===

    #[must_use]
    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    #[must_use]
    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    pub fn clear_draws(&mut self) {
        self.draws.clear();
    }

    #[must_use]
    pub fn current_program(&self) -> Option<ProgramHandle> {
        self.current_program
    }

    #[must_use]
    pub fn program(&self, handle: ProgramHandle) -> Option<&HeadlessProgram> {
        self.programs.get(handle)
    }

    #[must_use]
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Last value uploaded to `name` in `program`.
    #[must_use]
    pub fn uniform_value(&self, program: ProgramHandle, name: &str) -> Option<UniformValue> {
        let p = self.programs.get(program)?;
        let index = p.uniforms.iter().position(|u| u == name)?;
        p.values.get(&(index as u32)).copied()
    }

    #[must_use]
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(buffer).map(|b| b.data.as_slice())
    }

    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn texture(&self, texture: TextureHandle) -> Option<&HeadlessTexture> {
        self.textures.get(texture)
    }

    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    #[must_use]
    pub fn live_fences(&self) -> usize {
        self.fences.len()
    }

    #[must_use]
    pub fn viewport_rect(&self) -> [i32; 4] {
        self.viewport
    }

    #[must_use]
    pub fn debug_output(&self) -> Option<bool> {
        self.debug_output
    }

    // === Internals ===

    fn bound_buffer(&self, target: BufferTarget) -> Option<BufferHandle> {
        self.bound_buffers.get(&target).copied()
    }

    fn bound_buffer_mut(&mut self, target: BufferTarget) -> Option<&mut HeadlessBuffer> {
        let handle = self.bound_buffer(target)?;
        self.buffers.get_mut(handle)
    }

    fn bound_texture_mut(&mut self, target: TextureTarget) -> Option<&mut HeadlessTexture> {
        let handle = self.bound_textures.get(&target).copied()?;
        self.textures.get_mut(handle)
    }

    fn framebuffer_for(&self, target: FramebufferTarget) -> Option<FramebufferHandle> {
        match target {
            FramebufferTarget::Framebuffer | FramebufferTarget::Draw => self.draw_framebuffer,
            FramebufferTarget::Read => self.read_framebuffer,
        }
    }

    fn attachment_size(&self, attachment: AttachmentRef) -> Option<(i32, i32)> {
        match attachment {
            AttachmentRef::Texture(t) => self
                .textures
                .get(t)
                .filter(|t| t.format.is_some())
                .map(|t| (t.width, t.height)),
            AttachmentRef::Renderbuffer(r) => self.renderbuffers.get(r).and_then(|r| r.size),
        }
    }

    /// Color plane of `framebuffer` as `(width, height, texels)`.
    fn color_plane(&self, framebuffer: Option<FramebufferHandle>) -> Option<(i32, i32, &Vec<u8>)> {
        match framebuffer {
            None => Some((self.surface.0, self.surface.1, &self.surface.2)),
            Some(fb) => {
                let fb = self.framebuffers.get(fb)?;
                match fb.attachments.get(&Attachment::Color0)? {
                    AttachmentRef::Texture(t) => {
                        let t = self.textures.get(*t)?;
                        Some((t.width, t.height, &t.pixels))
                    }
                    AttachmentRef::Renderbuffer(_) => None,
                }
            }
        }
    }

    fn color_plane_mut(&mut self, framebuffer: Option<FramebufferHandle>) -> Option<(i32, i32, &mut Vec<u8>)> {
        match framebuffer {
            None => Some((self.surface.0, self.surface.1, &mut self.surface.2)),
            Some(fb) => {
                let fb = self.framebuffers.get(fb)?;
                match fb.attachments.get(&Attachment::Color0)? {
                    AttachmentRef::Texture(t) => {
                        let t = self.textures.get_mut(*t)?;
                        Some((t.width, t.height, &mut t.pixels))
                    }
                    AttachmentRef::Renderbuffer(_) => None,
                }
            }
        }
    }

    /// Gathers `width × height` pixels from `src` honoring the unpack state.
    fn unpack_rows(&self, src: &[u8], width: i32, height: i32, bpp: usize) -> Vec<u8> {
        let row_pixels = if self.unpack.row_length > 0 {
            self.unpack.row_length as usize
        } else {
            width as usize
        };
        let align = self.unpack.alignment.max(1) as usize;
        let stride = (row_pixels * bpp).div_ceil(align) * align;
        let start = self.unpack.skip_rows as usize * stride + self.unpack.skip_pixels as usize * bpp;
        let row_bytes = width as usize * bpp;

        let mut out = vec![0u8; row_bytes * height as usize];
        for row in 0..height as usize {
            let from = start + row * stride;
            if let Some(line) = src.get(from..from + row_bytes) {
                out[row * row_bytes..(row + 1) * row_bytes].copy_from_slice(line);
            }
        }
        out
    }

    fn resolve_source(
        &self,
        source: PixelSource<'_>,
        width: i32,
        height: i32,
        pixel_format: PixelFormat,
        pixel_type: PixelType,
    ) -> Option<Vec<u8>> {
        let bpp = client_bytes_per_pixel(pixel_format, pixel_type);
        let raw = match source {
            PixelSource::Empty => return None,
            PixelSource::Slice(data) => self.unpack_rows(data, width, height, bpp),
            PixelSource::UnpackBuffer(offset) => {
                let pbo = self
                    .bound_buffer(BufferTarget::PixelUnpack)
                    .and_then(|b| self.buffers.get(b))?;
                let data = pbo.data.get(offset..)?;
                self.unpack_rows(data, width, height, bpp)
            }
        };
        Some(to_rgba8(&raw, pixel_format, pixel_type))
    }
}

fn client_bytes_per_pixel(format: PixelFormat, ty: PixelType) -> usize {
    let components = match format {
        PixelFormat::Red | PixelFormat::DepthComponent => 1,
        PixelFormat::Rg => 2,
        PixelFormat::Rgb => 3,
        PixelFormat::Rgba | PixelFormat::Bgra => 4,
    };
    match ty {
        PixelType::UnsignedByte => components,
        PixelType::UnsignedShort | PixelType::HalfFloat => components * 2,
        PixelType::Float => components * 4,
        PixelType::UnsignedInt2101010Rev => 4,
    }
}

/// Only 8-bit client data is tracked texel-exactly; wider types store zeros.
fn to_rgba8(raw: &[u8], format: PixelFormat, ty: PixelType) -> Vec<u8> {
    let bpp = client_bytes_per_pixel(format, ty);
    let count = raw.len() / bpp.max(1);
    if ty != PixelType::UnsignedByte {
        return vec![0; count * 4];
    }
    let mut out = Vec::with_capacity(count * 4);
    for px in raw.chunks_exact(bpp) {
        let rgba = match format {
            PixelFormat::Rgba => [px[0], px[1], px[2], px[3]],
            PixelFormat::Bgra => [px[2], px[1], px[0], px[3]],
            PixelFormat::Rgb => [px[0], px[1], px[2], 255],
            PixelFormat::Rg => [px[0], px[1], 0, 255],
            PixelFormat::Red | PixelFormat::DepthComponent => [px[0], 0, 0, 255],
        };
        out.extend_from_slice(&rgba);
    }
    out
}

/// Uniform names declared in GLSL source, in declaration order.
fn declared_uniforms(source: &str) -> impl Iterator<Item = String> + '_ {
    source.lines().filter_map(|line| {
        let line = line.trim();
        let rest = line.strip_prefix("uniform ")?;
        let decl = rest.split(';').next()?;
        let name = decl.split_whitespace().last()?;
        Some(name.split('[').next().unwrap_or(name).to_string())
    })
}

impl GraphicsDevice for HeadlessDevice {
    fn context_info(&self) -> &ContextInfo {
        &self.info
    }

    // === Programs ===

    fn create_program(&mut self) -> Result<ProgramHandle> {
        Ok(self.programs.insert(HeadlessProgram::default()))
    }

    fn compile_shader(&mut self, program: ProgramHandle, stage: ShaderStage, source: &str) -> CompileOutcome {
        let Some(p) = self.programs.get_mut(program) else {
            return CompileOutcome {
                success: false,
                log: "invalid program".into(),
            };
        };
        if source.trim().is_empty() {
            return CompileOutcome {
                success: false,
                log: format!("0:1(1): error: empty {} shader", stage.name()),
            };
        }
        if let Some(line) = source.lines().position(|l| l.trim_start().starts_with("#error")) {
            return CompileOutcome {
                success: false,
                log: format!("0:{}(1): error: #error directive", line + 1),
            };
        }
        p.stages.push((stage, source.to_string()));
        CompileOutcome {
            success: true,
            log: String::new(),
        }
    }

    fn bind_attrib_location(&mut self, program: ProgramHandle, index: u32, name: &str) {
        if let Some(p) = self.programs.get_mut(program) {
            p.attrib_bindings.push((index, name.to_string()));
        }
    }

    fn bind_frag_data_location(&mut self, program: ProgramHandle, color: u32, name: &str) {
        if let Some(p) = self.programs.get_mut(program) {
            p.frag_bindings.push((color, name.to_string()));
        }
    }

    fn link_program(&mut self, program: ProgramHandle) -> CompileOutcome {
        let Some(p) = self.programs.get_mut(program) else {
            return CompileOutcome {
                success: false,
                log: "invalid program".into(),
            };
        };
        if self.fail_links {
            return CompileOutcome {
                success: false,
                log: "error: linking is disabled on this device".into(),
            };
        }
        let has = |s| p.stages.iter().any(|(stage, _)| *stage == s);
        if !has(ShaderStage::Vertex) || !has(ShaderStage::Fragment) {
            return CompileOutcome {
                success: false,
                log: "error: program lacks a vertex or fragment shader".into(),
            };
        }
        let mut uniforms: Vec<String> = Vec::new();
        for (_, src) in &p.stages {
            for name in declared_uniforms(src) {
                if !uniforms.contains(&name) {
                    uniforms.push(name);
                }
            }
        }
        p.uniforms = uniforms;
        p.linked = true;
        CompileOutcome {
            success: true,
            log: String::new(),
        }
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.stats.program_binds += 1;
        self.current_program = program;
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let p = self.programs.get(program).filter(|p| p.linked)?;
        p.uniforms
            .iter()
            .position(|u| u == name)
            .map(|i| UniformLocation(i as u32))
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let Some(p) = self.current_program.and_then(|h| self.programs.get_mut(h)) else {
            log::warn!("set_uniform without a bound program");
            return;
        };
        p.values.insert(location.0, value);
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.programs.remove(program);
    }

    // === Buffers ===

    fn create_buffer(&mut self) -> Result<BufferHandle> {
        Ok(self.buffers.insert(HeadlessBuffer::default()))
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferHandle>) {
        match buffer {
            Some(b) => self.bound_buffers.insert(target, b),
            None => self.bound_buffers.remove(&target),
        };
    }

    fn buffer_data(&mut self, target: BufferTarget, size: usize, data: Option<&[u8]>, _usage: BufferUsage) {
        self.stats.buffer_allocations += 1;
        let Some(b) = self.bound_buffer_mut(target) else {
            log::warn!("buffer_data with no buffer bound to {target:?}");
            return;
        };
        if b.immutable {
            log::warn!("buffer_data on immutable storage");
            return;
        }
        b.data = match data {
            Some(d) => {
                let mut v = d.to_vec();
                v.resize(size, 0);
                v
            }
            None => vec![0; size],
        };
        b.mapped = None;
        b.persistent = false;
    }

    fn buffer_storage(&mut self, target: BufferTarget, size: usize, _flags: StorageFlags) -> Result<()> {
        self.stats.buffer_allocations += 1;
        let b = self
            .bound_buffer_mut(target)
            .ok_or(GlError::InvalidHandle("no buffer bound"))?;
        if b.immutable {
            return Err(GlError::ObjectCreation("buffer storage is immutable".into()));
        }
        b.data = vec![0; size];
        b.immutable = true;
        Ok(())
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]) {
        self.stats.buffer_sub_data += 1;
        let Some(b) = self.bound_buffer_mut(target) else {
            return;
        };
        match b.data.get_mut(offset..offset + data.len()) {
            Some(dst) => dst.copy_from_slice(data),
            None => log::warn!("buffer_sub_data out of range"),
        }
    }

    fn map_buffer_range(
        &mut self,
        target: BufferTarget,
        offset: usize,
        len: usize,
        access: MapAccess,
    ) -> Option<&mut [u8]> {
        let handle = self.bound_buffer(target)?;
        self.stats.buffer_maps += 1;
        let b = self.buffers.get_mut(handle)?;
        if b.mapped.is_some() || offset + len > b.data.len() {
            log::warn!("map_buffer_range rejected: {offset}+{len} of {}", b.data.len());
            return None;
        }
        if access.contains(MapAccess::INVALIDATE_BUFFER) {
            b.data.fill(0xcd);
        } else if access.contains(MapAccess::INVALIDATE_RANGE) {
            b.data[offset..offset + len].fill(0xcd);
        }
        b.mapped = Some((offset, len));
        b.persistent = access.contains(MapAccess::PERSISTENT);
        Some(&mut b.data[offset..offset + len])
    }

    fn unmap_buffer(&mut self, target: BufferTarget) -> bool {
        if let Some(b) = self.bound_buffer_mut(target) {
            b.mapped = None;
            b.persistent = false;
        }
        true
    }

    fn persistent_mapping(&mut self, buffer: BufferHandle, offset: usize, len: usize) -> Option<&mut [u8]> {
        let b = self.buffers.get_mut(buffer)?;
        let (map_off, map_len) = b.mapped.filter(|_| b.persistent)?;
        if offset < map_off || offset + len > map_off + map_len {
            return None;
        }
        b.data.get_mut(offset..offset + len)
    }

    fn copy_buffer_sub_data(
        &mut self,
        read: BufferTarget,
        write: BufferTarget,
        read_offset: usize,
        write_offset: usize,
        size: usize,
    ) {
        let Some(src) = self
            .bound_buffer(read)
            .and_then(|b| self.buffers.get(b))
            .and_then(|b| b.data.get(read_offset..read_offset + size))
            .map(<[u8]>::to_vec)
        else {
            log::warn!("copy_buffer_sub_data: invalid source range");
            return;
        };
        if let Some(dst) = self
            .bound_buffer_mut(write)
            .and_then(|b| b.data.get_mut(write_offset..write_offset + size))
        {
            dst.copy_from_slice(&src);
        }
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.bound_buffers.retain(|_, b| *b != buffer);
        self.buffers.remove(buffer);
    }

    // === Vertex Input & Drawing ===

    fn vertex_attrib_pointer(&mut self, _index: u32, _components: i32, _stride: i32, _offset: usize) {
        self.array_buffer_at_attrib = self.bound_buffer(BufferTarget::Array);
    }

    fn enable_vertex_attrib_array(&mut self, _index: u32) {}

    fn disable_vertex_attrib_array(&mut self, _index: u32) {}

    fn draw_arrays(&mut self, mode: DrawMode, first: i32, count: i32) {
        self.stats.draw_calls += 1;
        self.draws.push(DrawCall {
            mode,
            first,
            count,
            base_vertex: None,
            program: self.current_program,
            framebuffer: self.draw_framebuffer,
            vertex_buffer: self.array_buffer_at_attrib,
            scissor: self.scissor_enabled.then_some(self.scissor),
        });
    }

    fn draw_elements_base_vertex(&mut self, mode: DrawMode, count: i32, index_offset: usize, base_vertex: i32) {
        if self.bound_buffer(BufferTarget::ElementArray).is_none() {
            log::warn!("indexed draw without an element buffer");
            return;
        }
        self.stats.draw_calls += 1;
        self.draws.push(DrawCall {
            mode,
            first: (index_offset / 2) as i32,
            count,
            base_vertex: Some(base_vertex),
            program: self.current_program,
            framebuffer: self.draw_framebuffer,
            vertex_buffer: self.array_buffer_at_attrib,
            scissor: self.scissor_enabled.then_some(self.scissor),
        });
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.viewport = [x, y, width, height];
    }

    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.scissor = [x, y, width, height];
    }

    fn set_scissor_test(&mut self, enabled: bool) {
        self.scissor_enabled = enabled;
    }

    // === Synchronization ===

    fn fence_sync(&mut self) -> Option<FenceHandle> {
        let serial = self.next_fence_serial;
        self.next_fence_serial += 1;
        Some(self.fences.insert(serial))
    }

    fn fence_signaled(&mut self, fence: FenceHandle) -> bool {
        self.fences
            .get(fence)
            .is_some_and(|&serial| serial <= self.completed_serial)
    }

    fn client_wait_sync(&mut self, fence: FenceHandle, _timeout_ns: u64) -> WaitResult {
        let Some(&serial) = self.fences.get(fence) else {
            return WaitResult::Failed;
        };
        if serial <= self.completed_serial {
            return WaitResult::AlreadySignaled;
        }
        if self.hang {
            self.stats.fence_timeouts += 1;
            return WaitResult::TimeoutExpired;
        }
        self.stats.fence_waits += 1;
        self.completed_serial = serial;
        WaitResult::ConditionSatisfied
    }

    fn delete_sync(&mut self, fence: FenceHandle) {
        self.fences.remove(fence);
    }

    fn flush(&mut self) {}

    fn finish(&mut self) {
        if !self.hang {
            self.complete_gpu_work();
        }
    }

    // === Textures ===

    fn create_texture(&mut self) -> Result<TextureHandle> {
        Ok(self.textures.insert(HeadlessTexture::default()))
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: Option<TextureHandle>) {
        match texture {
            Some(t) => self.bound_textures.insert(target, t),
            None => self.bound_textures.remove(&target),
        };
    }

    fn tex_storage_2d(
        &mut self,
        target: TextureTarget,
        levels: i32,
        format: InternalFormat,
        width: i32,
        height: i32,
    ) -> Result<()> {
        let max = self.max_texture_size;
        if width <= 0 || height <= 0 || width > max || height > max {
            return Err(GlError::TextureAllocation(format!("{width}x{height} exceeds limits")));
        }
        let t = self
            .bound_texture_mut(target)
            .ok_or(GlError::InvalidHandle("no texture bound"))?;
        if t.immutable {
            return Err(GlError::TextureAllocation("storage is immutable".into()));
        }
        t.width = width;
        t.height = height;
        t.format = Some(format);
        t.levels = levels;
        t.immutable = true;
        t.pixels = vec![0; (width * height * 4) as usize];
        Ok(())
    }

    fn tex_image_2d(
        &mut self,
        target: TextureTarget,
        level: i32,
        format: InternalFormat,
        width: i32,
        height: i32,
        pixel_format: PixelFormat,
        pixel_type: PixelType,
        source: PixelSource<'_>,
    ) -> Result<()> {
        let max = self.max_texture_size;
        if width <= 0 || height <= 0 || width > max || height > max {
            return Err(GlError::TextureAllocation(format!("{width}x{height} exceeds limits")));
        }
        if matches!(source, PixelSource::UnpackBuffer(_)) {
            self.stats.unpack_buffer_uploads += 1;
        }
        self.stats.texture_uploads += 1;
        let texels = self.resolve_source(source, width, height, pixel_format, pixel_type);
        let t = self
            .bound_texture_mut(target)
            .ok_or(GlError::InvalidHandle("no texture bound"))?;
        if t.immutable {
            return Err(GlError::TextureAllocation("storage is immutable".into()));
        }
        if level == 0 {
            t.width = width;
            t.height = height;
            t.format = Some(format);
            t.levels = t.levels.max(1);
            t.pixels = texels.unwrap_or_else(|| vec![0; (width * height * 4) as usize]);
        } else {
            t.levels = t.levels.max(level + 1);
        }
        Ok(())
    }

    fn tex_sub_image_2d(
        &mut self,
        target: TextureTarget,
        level: i32,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        pixel_format: PixelFormat,
        pixel_type: PixelType,
        source: PixelSource<'_>,
    ) {
        if matches!(source, PixelSource::UnpackBuffer(_)) {
            self.stats.unpack_buffer_uploads += 1;
        }
        self.stats.texture_uploads += 1;
        let Some(texels) = self.resolve_source(source, width, height, pixel_format, pixel_type) else {
            return;
        };
        let Some(t) = self.bound_texture_mut(target) else {
            log::warn!("tex_sub_image_2d with no texture bound");
            return;
        };
        if level != 0 {
            return;
        }
        if x < 0 || y < 0 || x + width > t.width || y + height > t.height {
            log::warn!("tex_sub_image_2d out of bounds");
            return;
        }
        let row_bytes = (width * 4) as usize;
        for row in 0..height {
            let dst = (((y + row) * t.width + x) * 4) as usize;
            let src = row as usize * row_bytes;
            t.pixels[dst..dst + row_bytes].copy_from_slice(&texels[src..src + row_bytes]);
        }
    }

    fn pixel_store(&mut self, param: PixelStore) {
        match param {
            PixelStore::UnpackRowLength(v) => self.unpack.row_length = v,
            PixelStore::UnpackSkipPixels(v) => self.unpack.skip_pixels = v,
            PixelStore::UnpackSkipRows(v) => self.unpack.skip_rows = v,
            PixelStore::UnpackAlignment(v) => self.unpack.alignment = v,
            PixelStore::PackAlignment(_) => {}
        }
    }

    fn tex_parameter(&mut self, target: TextureTarget, param: TexParameter) {
        let Some(t) = self.bound_texture_mut(target) else {
            return;
        };
        match param {
            TexParameter::MinFilter(f) => t.min_filter = f,
            TexParameter::MagFilter(f) => t.mag_filter = f,
            TexParameter::WrapS(w) => t.wrap_s = w,
            TexParameter::WrapT(w) => t.wrap_t = w,
            TexParameter::MaxLevel(l) => t.max_level = l,
            TexParameter::Swizzle(s) => t.swizzle = s,
        }
    }

    fn generate_mipmap(&mut self, target: TextureTarget) {
        if let Some(t) = self.bound_texture_mut(target) {
            t.mipmaps_generated = true;
        }
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.bound_textures.retain(|_, t| *t != texture);
        self.textures.remove(texture);
    }

    // === Framebuffers ===

    fn create_framebuffer(&mut self) -> Result<FramebufferHandle> {
        Ok(self.framebuffers.insert(HeadlessFramebuffer::default()))
    }

    fn bind_framebuffer(&mut self, target: FramebufferTarget, framebuffer: Option<FramebufferHandle>) {
        self.stats.framebuffer_binds += 1;
        match target {
            FramebufferTarget::Framebuffer => {
                self.draw_framebuffer = framebuffer;
                self.read_framebuffer = framebuffer;
            }
            FramebufferTarget::Draw => self.draw_framebuffer = framebuffer,
            FramebufferTarget::Read => self.read_framebuffer = framebuffer,
        }
    }

    fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.draw_framebuffer
    }

    fn framebuffer_texture_2d(
        &mut self,
        target: FramebufferTarget,
        attachment: Attachment,
        _tex_target: TextureTarget,
        texture: Option<TextureHandle>,
        _level: i32,
    ) {
        let Some(fb) = self.framebuffer_for(target).and_then(|h| self.framebuffers.get_mut(h)) else {
            log::warn!("framebuffer_texture_2d on the default framebuffer");
            return;
        };
        match texture {
            Some(t) => fb.attachments.insert(attachment, AttachmentRef::Texture(t)),
            None => fb.attachments.remove(&attachment),
        };
    }

    fn create_renderbuffer(&mut self) -> Result<RenderbufferHandle> {
        Ok(self.renderbuffers.insert(HeadlessRenderbuffer::default()))
    }

    fn renderbuffer_storage(&mut self, renderbuffer: RenderbufferHandle, format: RenderbufferFormat, width: i32, height: i32) {
        let accepted = format != RenderbufferFormat::Depth24Stencil8 || self.packed_depth_stencil;
        if let Some(rb) = self.renderbuffers.get_mut(renderbuffer) {
            rb.size = accepted.then_some((width, height));
        }
    }

    fn framebuffer_renderbuffer(
        &mut self,
        target: FramebufferTarget,
        attachment: Attachment,
        renderbuffer: Option<RenderbufferHandle>,
    ) {
        let Some(fb) = self.framebuffer_for(target).and_then(|h| self.framebuffers.get_mut(h)) else {
            return;
        };
        match renderbuffer {
            Some(r) => fb.attachments.insert(attachment, AttachmentRef::Renderbuffer(r)),
            None => fb.attachments.remove(&attachment),
        };
    }

    fn check_framebuffer_status(&mut self, target: FramebufferTarget) -> FramebufferStatus {
        let Some(handle) = self.framebuffer_for(target) else {
            return FramebufferStatus::Complete;
        };
        let Some(fb) = self.framebuffers.get(handle) else {
            return FramebufferStatus::Undefined;
        };
        if fb.attachments.is_empty() {
            return FramebufferStatus::MissingAttachment;
        }
        let mut size = None;
        for attachment in fb.attachments.values() {
            let Some(s) = self.attachment_size(*attachment) else {
                return FramebufferStatus::IncompleteAttachment;
            };
            match size {
                None => size = Some(s),
                Some(prev) if prev != s => return FramebufferStatus::IncompleteDimensions,
                Some(_) => {}
            }
        }
        FramebufferStatus::Complete
    }

    fn blit_framebuffer(&mut self, src: BlitRect, dst: BlitRect, mask: BufferBits, _linear: bool) {
        self.stats.blits += 1;
        if !mask.contains(BufferBits::COLOR) {
            return;
        }
        let Some((sw, sh, src_pixels)) = self.color_plane(self.read_framebuffer) else {
            return;
        };
        let src_pixels = src_pixels.clone();
        let Some((dw, dh, dst_pixels)) = self.color_plane_mut(self.draw_framebuffer) else {
            return;
        };

        let (dx_min, dx_max) = (dst.x0.min(dst.x1), dst.x0.max(dst.x1));
        let (dy_min, dy_max) = (dst.y0.min(dst.y1), dst.y0.max(dst.y1));
        let dst_w = (dst.x1 - dst.x0) as f32;
        let dst_h = (dst.y1 - dst.y0) as f32;
        if dst_w == 0.0 || dst_h == 0.0 {
            return;
        }
        for y in dy_min.max(0)..dy_max.min(dh) {
            for x in dx_min.max(0)..dx_max.min(dw) {
                let u = (x as f32 + 0.5 - dst.x0 as f32) / dst_w;
                let v = (y as f32 + 0.5 - dst.y0 as f32) / dst_h;
                let sx = (src.x0 as f32 + u * (src.x1 - src.x0) as f32).floor() as i32;
                let sy = (src.y0 as f32 + v * (src.y1 - src.y0) as f32).floor() as i32;
                if sx < 0 || sy < 0 || sx >= sw || sy >= sh {
                    continue;
                }
                let s = ((sy * sw + sx) * 4) as usize;
                let d = ((y * dw + x) * 4) as usize;
                dst_pixels[d..d + 4].copy_from_slice(&src_pixels[s..s + 4]);
            }
        }
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.clear_color = [r, g, b, a];
    }

    fn clear(&mut self, mask: BufferBits) {
        if !mask.contains(BufferBits::COLOR) {
            return;
        }
        let rgba = self.clear_color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        let scissor = self.scissor_enabled.then_some(self.scissor);
        let Some((w, h, pixels)) = self.color_plane_mut(self.draw_framebuffer) else {
            return;
        };
        let [x0, y0, x1, y1] = match scissor {
            Some([x, y, sw, sh]) => [x.max(0), y.max(0), (x + sw).min(w), (y + sh).min(h)],
            None => [0, 0, w, h],
        };
        for y in y0..y1 {
            for x in x0..x1 {
                let i = ((y * w + x) * 4) as usize;
                pixels[i..i + 4].copy_from_slice(&rgba);
            }
        }
    }

    fn read_pixels(&mut self, x: i32, y: i32, width: i32, height: i32, out: &mut [u8]) {
        let Some((w, h, pixels)) = self.color_plane(self.read_framebuffer) else {
            return;
        };
        for row in 0..height {
            for col in 0..width {
                let (sx, sy) = (x + col, y + row);
                if sx < 0 || sy < 0 || sx >= w || sy >= h {
                    continue;
                }
                let s = ((sy * w + sx) * 4) as usize;
                let d = ((row * width + col) * 4) as usize;
                if let Some(dst) = out.get_mut(d..d + 4) {
                    dst.copy_from_slice(&pixels[s..s + 4]);
                }
            }
        }
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if self.draw_framebuffer == Some(framebuffer) {
            self.draw_framebuffer = None;
        }
        if self.read_framebuffer == Some(framebuffer) {
            self.read_framebuffer = None;
        }
        self.framebuffers.remove(framebuffer);
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        self.renderbuffers.remove(renderbuffer);
    }

    fn enable_debug_output(&mut self, verbose: bool) -> bool {
        if !self.info.has_extension("GL_KHR_debug") {
            return false;
        }
        self.debug_output = Some(verbose);
        true
    }
}
