//! Render Context
//!
//! [`RenderContext`] owns the device and every per-context singleton of the
//! pipeline layer:
//!
//! - the detected [`Capabilities`] and the [`RenderSettings`] in effect
//! - the [`ShaderManager`] and the [`FramebufferStack`]
//! - the streaming [`VertexBuffer`] and the shared quad [`IndexBuffer`]
//! - the [`TextureUploader`] and the [`ReleaseQueue`]
//!
//! There is exactly one context per GL context and it never leaves the
//! thread it was created on. Every GPU object created through it pushes its
//! handle onto the release queue when dropped; the queue is drained at
//! [`begin_frame`](RenderContext::begin_frame) and on
//! [`teardown`](RenderContext::teardown).

use std::marker::PhantomData;
use std::rc::Rc;

use glam::{IVec2, Mat4, Vec2, Vec4};

use super::device::{
    BufferBits, BufferUsage, FramebufferStatus, FramebufferTarget, GraphicsDevice, InternalFormat, TextureFilter,
    UniformValue,
};
use super::release::ReleaseQueue;
use crate::errors::{GlError, Result};
use crate::platform::{Capabilities, GlFeatures, PlatformInterface};
use crate::renderer::pipeline::{GlslDialect, ShaderManager, ShaderProgram, ShaderTraits, UniformSlot};
use crate::renderer::resources::{
    AttachmentSet, Clip, Framebuffer, FramebufferStack, GLVertex2D, ImageData, IndexBuffer, Primitive, Texture,
    TextureSupport, TextureUploader, Vertex, VertexAttrib, VertexBuffer,
};
use crate::renderer::settings::RenderSettings;
use crate::renderer::viewport::{OutputTransform, Rect, RectF, RenderViewport};

/// Per-context state of the pipeline layer.
///
/// `!Send` and `!Sync`: GL objects belong to the thread that made the
/// context current.
pub struct RenderContext<D: GraphicsDevice> {
    device: D,
    settings: RenderSettings,
    interface: PlatformInterface,
    capabilities: Capabilities,
    texture_support: TextureSupport,

    shaders: ShaderManager,
    framebuffers: FramebufferStack,
    streaming: VertexBuffer,
    indices: IndexBuffer,
    uploader: TextureUploader,
    release: ReleaseQueue,

    _not_send: PhantomData<Rc<()>>,
}

impl<D: GraphicsDevice> RenderContext<D> {
    /// Detects the capabilities of the current context and sets up the
    /// per-context singletons.
    ///
    /// `surface_size` is the size of the window-system framebuffer, which is
    /// what the framebuffer stack binds when it is empty.
    pub fn new(mut device: D, settings: RenderSettings, interface: PlatformInterface, surface_size: IVec2) -> Result<Self> {
        let capabilities = Capabilities::detect(device.context_info(), interface);
        capabilities.print_results();

        if capabilities.supports(GlFeatures::DEBUG_OUTPUT) && !device.enable_debug_output(settings.debug_output) {
            log::debug!("Driver debug output unavailable");
        }

        let release = ReleaseQueue::new();
        let shaders = ShaderManager::new(GlslDialect::from_capabilities(&capabilities), release.clone());
        let singletons = Singletons::create(&capabilities, &settings, &release);

        log::info!(
            "Render context ready: {:?} streaming writes, {} texture uploads",
            singletons.streaming.strategy(),
            if singletons.uploader.uses_staging() { "staged" } else { "direct" },
        );

        Ok(Self {
            device,
            settings,
            interface,
            texture_support: TextureSupport::from_capabilities(&capabilities),
            capabilities,
            shaders,
            framebuffers: FramebufferStack::new(surface_size),
            streaming: singletons.streaming,
            indices: singletons.indices,
            uploader: singletons.uploader,
            release,
            _not_send: PhantomData,
        })
    }

    // === Accessors ===

    #[inline]
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[inline]
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn texture_support(&self) -> TextureSupport {
        self.texture_support
    }

    /// A handle to the queue every resource of this context releases into.
    #[must_use]
    pub fn release_queue(&self) -> ReleaseQueue {
        self.release.clone()
    }

    #[must_use]
    pub fn shader_manager(&self) -> &ShaderManager {
        &self.shaders
    }

    #[must_use]
    pub fn framebuffer_stack(&self) -> &FramebufferStack {
        &self.framebuffers
    }

    #[must_use]
    pub fn texture_uploader(&self) -> &TextureUploader {
        &self.uploader
    }

    #[must_use]
    pub fn index_buffer(&self) -> &IndexBuffer {
        &self.indices
    }

    /// The streaming buffer, read-only. Writes go through
    /// [`streaming_buffer`](Self::streaming_buffer).
    #[must_use]
    pub fn vertex_buffer(&self) -> &VertexBuffer {
        &self.streaming
    }

    /// Fails when the context cannot run the compositing pipeline: either a
    /// required feature is missing or the basic texture shader does not
    /// build.
    pub fn check_supported(&mut self) -> Result<()> {
        if !self.capabilities.meets_minimum_requirements() {
            return Err(GlError::Unsupported("context lacks the minimum compositing feature set"));
        }
        let program = self.shaders.shader(&mut self.device, ShaderTraits::MAP_TEXTURE)?;
        if !program.is_valid() {
            return Err(GlError::ShaderLink(program.info_log().to_string()));
        }
        Ok(())
    }

    // === Shaders ===

    /// The cached program for `traits`.
    pub fn shader(&mut self, traits: ShaderTraits) -> Result<Rc<ShaderProgram>> {
        self.shaders.shader(&mut self.device, traits)
    }

    /// Cached program built from caller sources; empty stages are generated.
    pub fn custom_shader(&mut self, traits: ShaderTraits, vertex: &str, fragment: &str) -> Result<Rc<ShaderProgram>> {
        self.shaders.custom_shader(&mut self.device, traits, vertex, fragment)
    }

    /// Uncached program from complete caller sources.
    pub fn load_shader_from_code(&mut self, vertex: &str, fragment: &str) -> Result<ShaderProgram> {
        self.shaders.load_shader_from_code(&mut self.device, vertex, fragment)
    }

    pub fn push_shader(&mut self, traits: ShaderTraits) -> Result<Rc<ShaderProgram>> {
        self.shaders.push_shader(&mut self.device, traits)
    }

    pub fn push_program(&mut self, program: Rc<ShaderProgram>) {
        self.shaders.push_program(&mut self.device, program);
    }

    pub fn pop_shader(&mut self) -> Result<()> {
        self.shaders.pop_shader(&mut self.device)
    }

    #[must_use]
    pub fn bound_shader(&self) -> Option<&Rc<ShaderProgram>> {
        self.shaders.bound_shader()
    }

    /// Pushes the program for `traits` and pops it when the guard drops.
    pub fn bind_shader(&mut self, traits: ShaderTraits) -> Result<ShaderBinding<'_, D>> {
        let program = self.push_shader(traits)?;
        Ok(ShaderBinding { context: self, program })
    }

    /// Like [`bind_shader`](Self::bind_shader) for an existing program.
    pub fn bind_program(&mut self, program: Rc<ShaderProgram>) -> ShaderBinding<'_, D> {
        self.push_program(Rc::clone(&program));
        ShaderBinding { context: self, program }
    }

    // === Textures ===

    /// Allocates an empty texture.
    pub fn create_texture(&mut self, format: InternalFormat, size: IVec2, levels: i32) -> Result<Rc<Texture>> {
        let texture = Texture::allocate(&mut self.device, self.release.clone(), self.texture_support, format, size, levels)?;
        Ok(Rc::new(texture))
    }

    /// Creates a texture holding `image`.
    pub fn upload_texture(&mut self, image: &ImageData) -> Result<Rc<Texture>> {
        let texture = Texture::upload(&mut self.device, self.release.clone(), self.texture_support, image)?;
        Ok(Rc::new(texture))
    }

    /// Brings `texture` up to date with `image`, staging through the
    /// pixel-unpack buffer when enabled.
    pub fn update_texture(&mut self, texture: &Texture, image: &ImageData, dirty: &[Rect]) -> Result<()> {
        self.uploader.upload(&mut self.device, texture, image, dirty)
    }

    // === Framebuffers ===

    /// Creates a framebuffer rendering into `color`.
    ///
    /// An incomplete framebuffer is still returned; check
    /// [`Framebuffer::is_valid`]. Pushing it is refused.
    pub fn create_framebuffer(&mut self, color: Rc<Texture>, attachments: AttachmentSet) -> Result<Rc<Framebuffer>> {
        let framebuffer = Framebuffer::new(&mut self.device, self.release.clone(), &self.capabilities, color, attachments)?;
        Ok(Rc::new(framebuffer))
    }

    /// Makes `framebuffer` the current render target.
    pub fn push_framebuffer(&mut self, framebuffer: Rc<Framebuffer>) -> Result<()> {
        if !framebuffer.is_valid() {
            return Err(GlError::FramebufferIncomplete(FramebufferStatus::Undefined));
        }
        self.framebuffers.push(&mut self.device, framebuffer);
        Ok(())
    }

    /// Pushes several framebuffers, binding only the last.
    pub fn push_framebuffers(&mut self, framebuffers: impl IntoIterator<Item = Rc<Framebuffer>>) -> Result<()> {
        let framebuffers: Vec<_> = framebuffers.into_iter().collect();
        if framebuffers.iter().any(|fb| !fb.is_valid()) {
            return Err(GlError::FramebufferIncomplete(FramebufferStatus::Undefined));
        }
        self.framebuffers.push_framebuffers(&mut self.device, framebuffers);
        Ok(())
    }

    pub fn pop_framebuffer(&mut self) -> Result<Rc<Framebuffer>> {
        self.framebuffers.pop(&mut self.device)
    }

    #[must_use]
    pub fn current_framebuffer(&self) -> Option<&Rc<Framebuffer>> {
        self.framebuffers.current()
    }

    /// The window-system framebuffer was resized.
    pub fn resize(&mut self, surface_size: IVec2) {
        if surface_size.x <= 0 || surface_size.y <= 0 {
            return;
        }
        self.framebuffers.set_surface_size(surface_size);
        if self.framebuffers.depth() == 0 {
            self.framebuffers.bind_top(&mut self.device);
        }
    }

    /// Size of the current render target.
    #[must_use]
    pub fn size(&self) -> IVec2 {
        self.framebuffers.current_size()
    }

    /// Clears the color buffer of the current render target.
    pub fn clear(&mut self, color: Vec4) {
        self.device.clear_color(color.x, color.y, color.z, color.w);
        self.device.clear(BufferBits::COLOR);
    }

    /// Reads `rect` (top-down) of `framebuffer` as tightly packed RGBA8 rows,
    /// bottom row first.
    pub fn read_pixels(&mut self, framebuffer: &Framebuffer, rect: Rect) -> Vec<u8> {
        let mut out = vec![0; (rect.width.max(0) * rect.height.max(0) * 4) as usize];
        let flipped = rect.flipped_y(framebuffer.size().y);
        self.device.bind_framebuffer(FramebufferTarget::Read, framebuffer.handle());
        self.device
            .read_pixels(flipped.x, flipped.y, flipped.width, flipped.height, &mut out);
        self.device
            .bind_framebuffer(FramebufferTarget::Framebuffer, self.framebuffers.current_handle());
        out
    }

    /// Hardware blit from `source` into `target`. Rects are top-down.
    ///
    /// Fails with [`GlError::Unsupported`] on contexts without framebuffer
    /// blits; render-target copies fall back through
    /// [`blit_from_render_target`](Self::blit_from_render_target).
    #[allow(clippy::fn_params_excessive_bools)]
    pub fn blit_from_framebuffer(
        &mut self,
        target: &Framebuffer,
        source: &Framebuffer,
        source_rect: Rect,
        dest_rect: Rect,
        linear: bool,
        flip_x: bool,
        flip_y: bool,
    ) -> Result<()> {
        target.blit_from_framebuffer(
            &mut self.device,
            &self.capabilities,
            &self.framebuffers,
            source,
            source_rect,
            dest_rect,
            linear,
            flip_x,
            flip_y,
        )
    }

    /// Copies the logical `source_rect` of a render target into `dest_rect`
    /// of `target`.
    ///
    /// `viewport` describes how `source` was rendered. An untransformed
    /// source is copied with a hardware blit when the context has one; any
    /// other case is resolved by drawing a textured quad that samples the
    /// source's color texture.
    pub fn blit_from_render_target(
        &mut self,
        target: &Rc<Framebuffer>,
        source: &Framebuffer,
        viewport: &RenderViewport,
        source_rect: RectF,
        dest_rect: Rect,
        linear: bool,
    ) -> Result<()> {
        if viewport.transform() == OutputTransform::Normal && self.capabilities.supports(GlFeatures::BLITS) {
            let device_rect = viewport.map_to_render_target(source_rect).snapped();
            return self.blit_from_framebuffer(target, source, device_rect, dest_rect, linear, false, false);
        }

        let texture = source
            .color_attachment()
            .cloned()
            .ok_or(GlError::Unsupported("quad blit from a framebuffer without a color texture"))?;
        let vertices = textured_blit_quad(viewport, source.size().as_vec2(), source_rect, dest_rect);
        let target_size = target.size().as_vec2();

        // Nothing may fail between the two pushes.
        let program = self.shaders.shader(&mut self.device, ShaderTraits::MAP_TEXTURE)?;
        if !program.is_valid() {
            return Err(GlError::ShaderLink(program.info_log().to_string()));
        }
        self.push_framebuffer(Rc::clone(target))?;
        self.shaders.push_program(&mut self.device, Rc::clone(&program));
        program.set_uniform(
            &mut self.device,
            UniformSlot::ModelViewProjectionMatrix,
            Mat4::orthographic_rh_gl(0.0, target_size.x, target_size.y, 0.0, -1.0, 1.0),
        );
        program.set_uniform(&mut self.device, UniformSlot::TextureMatrix, Mat4::IDENTITY);

        texture.set_filter(if linear { TextureFilter::Linear } else { TextureFilter::Nearest });
        texture.bind(&mut self.device);
        let primitive = if self.streaming.supports_indexed_quads() {
            Primitive::Quads
        } else {
            Primitive::TriangleFan
        };
        let drawn = {
            let mut stream = self.streaming_buffer();
            stream.reset();
            stream.set_vertices(&vertices).and_then(|()| stream.render(primitive, None))
        };
        texture.unbind(&mut self.device);

        self.pop_shader()?;
        self.pop_framebuffer()?;
        drawn
    }

    // === Streaming Geometry ===

    /// Borrows the streaming vertex buffer together with everything a draw
    /// from it needs.
    pub fn streaming_buffer(&mut self) -> StreamingBuffer<'_> {
        StreamingBuffer {
            program: self.shaders.bound_shader().cloned(),
            target_height: self.framebuffers.current_size().y,
            device: &mut self.device,
            buffer: &mut self.streaming,
            indices: &mut self.indices,
        }
    }

    // === Frame Lifecycle ===

    /// Releases dropped objects and reaps signaled fences of the ring.
    pub fn begin_frame(&mut self) {
        self.release.drain(&mut self.device);
        self.streaming.begin_frame(&mut self.device);
    }

    /// Fences this frame's streaming writes.
    pub fn end_frame(&mut self) {
        self.streaming.end_of_frame(&mut self.device);
    }

    /// Rebuilds the per-context singletons after the GL context was lost and
    /// recreated. Handles of the old context are forgotten, not deleted.
    pub fn rebuild_after_context_loss(&mut self) {
        log::warn!("Rebuilding render context after context loss");
        self.capabilities = Capabilities::detect(self.device.context_info(), self.interface);
        self.texture_support = TextureSupport::from_capabilities(&self.capabilities);

        self.shaders.reset(GlslDialect::from_capabilities(&self.capabilities));
        self.framebuffers.clear();
        let Singletons {
            streaming,
            indices,
            uploader,
        } = Singletons::create(&self.capabilities, &self.settings, &self.release);
        self.streaming = streaming;
        self.indices = indices;
        self.uploader = uploader;
        self.release.discard();
    }

    /// Unwinds the bind stacks, deletes every object the context owns and
    /// hands the device back.
    ///
    /// Resources still held by the caller release into a queue nobody
    /// drains; drop them first.
    pub fn teardown(self) -> D {
        let Self {
            mut device,
            mut shaders,
            mut framebuffers,
            streaming,
            indices,
            uploader,
            release,
            ..
        } = self;

        shaders.clear(&mut device);
        while framebuffers.pop(&mut device).is_ok() {}
        drop((shaders, framebuffers, streaming, indices, uploader));

        let released = release.drain(&mut device);
        log::debug!("Render context torn down, released {released} GPU objects");
        device
    }
}

/// Buffers rebuilt from scratch on construction and after context loss.
struct Singletons {
    streaming: VertexBuffer,
    indices: IndexBuffer,
    uploader: TextureUploader,
}

impl Singletons {
    fn create(caps: &Capabilities, settings: &RenderSettings, release: &ReleaseQueue) -> Self {
        Self {
            streaming: VertexBuffer::new(release.clone(), BufferUsage::Stream, caps, settings),
            indices: IndexBuffer::new(release.clone()),
            uploader: TextureUploader::new(release.clone(), staging_enabled(caps, settings)),
        }
    }
}

fn staging_enabled(caps: &Capabilities, settings: &RenderSettings) -> bool {
    settings.staging_upload && caps.supports(GlFeatures::PIXEL_UNPACK_BUFFER)
}

/// Quad covering `dest_rect` whose corners sample the points of the source
/// texture that the corners of `source_rect` were rendered to.
fn textured_blit_quad(viewport: &RenderViewport, source_size: Vec2, source_rect: RectF, dest_rect: Rect) -> [GLVertex2D; 4] {
    let (l, t) = (source_rect.x, source_rect.y);
    let (r, b) = (source_rect.x + source_rect.width, source_rect.y + source_rect.height);
    let dest = RectF::from(dest_rect);
    let (dl, dt) = (dest.x, dest.y);
    let (dr, db) = (dest.x + dest.width, dest.y + dest.height);

    let corners = [
        (Vec2::new(l, t), Vec2::new(dl, dt)),
        (Vec2::new(r, t), Vec2::new(dr, dt)),
        (Vec2::new(r, b), Vec2::new(dr, db)),
        (Vec2::new(l, b), Vec2::new(dl, db)),
    ];
    corners.map(|(logical, position)| {
        let device = viewport.map_to_render_target_point(logical);
        GLVertex2D {
            position,
            texcoord: Vec2::new(device.x / source_size.x, 1.0 - device.y / source_size.y),
        }
    })
}

// ─── Guards ───────────────────────────────────────────────────────────────────

/// Keeps a program bound for the guard's lifetime.
pub struct ShaderBinding<'a, D: GraphicsDevice> {
    context: &'a mut RenderContext<D>,
    program: Rc<ShaderProgram>,
}

impl<D: GraphicsDevice> ShaderBinding<'_, D> {
    #[must_use]
    pub fn program(&self) -> &Rc<ShaderProgram> {
        &self.program
    }

    pub fn set_uniform(&mut self, slot: UniformSlot, value: impl Into<UniformValue>) -> bool {
        self.program.set_uniform(&mut self.context.device, slot, value)
    }

    /// The context, for drawing while the program is bound.
    pub fn context(&mut self) -> &mut RenderContext<D> {
        self.context
    }
}

impl<D: GraphicsDevice> Drop for ShaderBinding<'_, D> {
    fn drop(&mut self) {
        if let Err(e) = self.context.pop_shader() {
            log::warn!("Shader binding released on an empty stack: {e}");
        }
    }
}

/// The streaming vertex buffer plus the device, the quad indices, the bound
/// program and the current target height.
pub struct StreamingBuffer<'a> {
    device: &'a mut dyn GraphicsDevice,
    buffer: &'a mut VertexBuffer,
    indices: &'a mut IndexBuffer,
    program: Option<Rc<ShaderProgram>>,
    target_height: i32,
}

impl StreamingBuffer<'_> {
    #[must_use]
    pub fn buffer(&self) -> &VertexBuffer {
        self.buffer
    }

    pub fn reset(&mut self) {
        self.buffer.reset();
    }

    pub fn set_attrib_layout(&mut self, attribs: &[VertexAttrib], stride: usize) {
        self.buffer.set_attrib_layout(attribs, stride);
    }

    pub fn set_vertex_count(&mut self, count: i32) {
        self.buffer.set_vertex_count(count);
    }

    pub fn set_color(&mut self, color: Vec4) {
        self.buffer.set_color(color);
    }

    pub fn set_use_color(&mut self, enable: bool) {
        self.buffer.set_use_color(enable);
    }

    /// A writable window of `size` bytes. Must be followed by
    /// [`unmap`](Self::unmap) before drawing.
    pub fn map(&mut self, size: usize) -> Result<&mut [u8]> {
        self.buffer.map(&mut *self.device, size)
    }

    pub fn unmap(&mut self) -> Result<()> {
        self.buffer.unmap(&mut *self.device)
    }

    pub fn set_data(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.set_data(&mut *self.device, data)
    }

    pub fn set_vertices<V: Vertex>(&mut self, vertices: &[V]) -> Result<()> {
        self.buffer.set_vertices(&mut *self.device, vertices)
    }

    /// Draws every vertex of the last write with the bound program, clipped
    /// to `region` (top-down pixels of the current target) when given.
    pub fn render(&mut self, primitive: Primitive, region: Option<&[Rect]>) -> Result<()> {
        let clip = region.map(|region| Clip {
            region,
            target_height: self.target_height,
        });
        self.buffer
            .render(&mut *self.device, self.program.as_deref(), self.indices, primitive, clip)
    }

    /// Draws `count` vertices from `first` with the arrays bound around the
    /// call.
    pub fn draw(&mut self, primitive: Primitive, first: i32, count: i32, region: Option<&[Rect]>) -> Result<()> {
        let clip = region.map(|region| Clip {
            region,
            target_height: self.target_height,
        });
        self.buffer.bind_arrays(&mut *self.device, self.program.as_deref());
        let drawn = self
            .buffer
            .draw(&mut *self.device, self.indices, primitive, first, count, clip);
        self.buffer.unbind_arrays(&mut *self.device);
        drawn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::core::headless::HeadlessDevice;
    use crate::renderer::core::device::TextureTarget;
    use crate::renderer::viewport::RenderTarget;

    fn context() -> RenderContext<HeadlessDevice> {
        RenderContext::new(
            HeadlessDevice::new(),
            RenderSettings::default(),
            PlatformInterface::Egl,
            IVec2::new(256, 256),
        )
        .unwrap()
    }

    #[test]
    fn shader_binding_pops_on_drop() {
        let mut cx = context();
        {
            let mut binding = cx.bind_shader(ShaderTraits::UNIFORM_COLOR).unwrap();
            assert!(binding.set_uniform(UniformSlot::GeometryColor, Vec4::ONE));
            assert!(binding.context().bound_shader().is_some());
        }
        assert!(cx.bound_shader().is_none());
        assert_eq!(cx.device().current_program(), None);
    }

    #[test]
    fn incomplete_framebuffer_is_not_pushed() {
        let mut cx = context();
        let color = cx.create_texture(InternalFormat::Rgba8, IVec2::new(16, 16), 1).unwrap();
        let fb = cx.create_framebuffer(color, AttachmentSet::ColorOnly).unwrap();
        cx.push_framebuffer(Rc::clone(&fb)).unwrap();
        assert_eq!(cx.size(), IVec2::new(16, 16));
        cx.pop_framebuffer().unwrap();
        assert_eq!(cx.size(), IVec2::new(256, 256));

        // a color attachment naming a deleted texture
        let stale = cx.device_mut().create_texture().unwrap();
        cx.device_mut().delete_texture(stale);
        let support = cx.texture_support();
        let color = Rc::new(Texture::wrap_foreign(
            stale,
            TextureTarget::Texture2D,
            InternalFormat::Rgba8,
            IVec2::new(16, 16),
            support,
        ));
        let broken = cx.create_framebuffer(color, AttachmentSet::ColorOnly).unwrap();
        assert!(!broken.is_valid());
        assert!(matches!(cx.push_framebuffer(broken), Err(GlError::FramebufferIncomplete(_))));
        assert!(cx.current_framebuffer().is_none());
        assert!(matches!(cx.pop_framebuffer(), Err(GlError::FramebufferStackUnderflow)));
    }

    #[test]
    fn rotated_quad_samples_transformed_corners() {
        let target = RenderTarget::new(None, IVec2::new(200, 100), OutputTransform::Rotate90);
        let viewport = RenderViewport::new(RectF::new(0.0, 0.0, 100.0, 200.0), 1.0, &target);
        let quad = textured_blit_quad(&viewport, Vec2::new(200.0, 100.0), RectF::new(0.0, 0.0, 100.0, 200.0), Rect::new(0, 0, 100, 200));

        assert_eq!(quad[0].position, Vec2::new(0.0, 0.0));
        assert_eq!(quad[2].position, Vec2::new(100.0, 200.0));
        // every corner samples a corner of the source texture
        for v in quad {
            assert!(v.texcoord.x == 0.0 || v.texcoord.x == 1.0, "{:?}", v.texcoord);
            assert!(v.texcoord.y == 0.0 || v.texcoord.y == 1.0, "{:?}", v.texcoord);
        }
        // opposite corners map to opposite texture corners
        assert_eq!(quad[0].texcoord + quad[2].texcoord, Vec2::ONE);
    }

    #[test]
    fn context_loss_forgets_stacks_and_cache() {
        let mut cx = context();
        cx.push_shader(ShaderTraits::MAP_TEXTURE).unwrap();
        let color = cx.create_texture(InternalFormat::Rgba8, IVec2::new(16, 16), 1).unwrap();
        let fb = cx.create_framebuffer(color, AttachmentSet::ColorOnly).unwrap();
        cx.push_framebuffer(Rc::clone(&fb)).unwrap();
        assert_eq!(cx.shader_manager().cached_count(), 1);

        cx.rebuild_after_context_loss();
        assert!(cx.bound_shader().is_none());
        assert!(cx.current_framebuffer().is_none());
        assert_eq!(cx.shader_manager().cached_count(), 0);
        assert_eq!(cx.size(), IVec2::new(256, 256));

        // the cache refills on demand
        cx.push_shader(ShaderTraits::MAP_TEXTURE).unwrap();
        assert_eq!(cx.shader_manager().cached_count(), 1);
        cx.pop_shader().unwrap();
    }

    #[test]
    fn teardown_releases_everything() {
        let mut cx = context();
        cx.push_shader(ShaderTraits::MAP_TEXTURE).unwrap();
        let texture = cx.create_texture(InternalFormat::Rgba8, IVec2::new(8, 8), 1).unwrap();
        {
            let mut stream = cx.streaming_buffer();
            stream.set_data(&[0; 64]).unwrap();
        }
        drop(texture);

        let dev = cx.teardown();
        assert_eq!(dev.program_count(), 0);
        assert_eq!(dev.buffer_count(), 0);
        assert_eq!(dev.texture_count(), 0);
        assert_eq!(dev.current_program(), None);
    }
}
