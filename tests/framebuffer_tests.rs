//! Framebuffer tests
//!
//! Tests for:
//! - Completeness of color-only and depth/stencil targets
//! - Depth/stencil fallbacks when packed storage is rejected
//! - The bind stack and its redundant-bind elision
//! - Clearing, blitting and reading back through the render context
//! - Copies out of rotated render targets

use std::rc::Rc;

use glam::{IVec2, Vec2, Vec4};
use glpipe::platform::capabilities::GlFeatures;
use glpipe::renderer::core::device::{
    Attachment, ContextInfo, FramebufferStatus, FramebufferTarget, InternalFormat, RenderbufferFormat, TextureTarget,
};
use glpipe::renderer::resources::{AttachmentSet, DepthStencilMode, Framebuffer, Texture};
use glpipe::{
    GlError, GraphicsDevice, HeadlessDevice, OutputTransform, PlatformInterface, Rect, RectF, RenderContext, RenderSettings,
    RenderTarget, RenderViewport,
};

// ============================================================================
// Helper
// ============================================================================

fn context_with(device: HeadlessDevice) -> RenderContext<HeadlessDevice> {
    let _ = env_logger::builder().is_test(true).try_init();
    RenderContext::new(device, RenderSettings::default(), PlatformInterface::Egl, IVec2::new(256, 256))
        .expect("headless context")
}

fn context() -> RenderContext<HeadlessDevice> {
    context_with(HeadlessDevice::new())
}

/// An OpenGL ES 2.0 driver: no framebuffer blits.
fn gles2_info() -> ContextInfo {
    ContextInfo {
        vendor: "glpipe".into(),
        renderer: "glpipe headless device".into(),
        version: "OpenGL ES 2.0 Mesa 24.1.0".into(),
        glsl_version: "OpenGL ES GLSL ES 1.00".into(),
        extensions: Default::default(),
    }
}

fn target(cx: &mut RenderContext<HeadlessDevice>, width: i32, height: i32, attachments: AttachmentSet) -> Rc<Framebuffer> {
    let color = cx
        .create_texture(InternalFormat::Rgba8, IVec2::new(width, height), 1)
        .expect("color texture");
    cx.create_framebuffer(color, attachments).expect("framebuffer")
}

fn assert_all_pixels(pixels: &[u8], rgba: [u8; 4]) {
    for (i, px) in pixels.chunks_exact(4).enumerate() {
        assert_eq!(px, rgba, "pixel {i}");
    }
}

// ============================================================================
// Completeness
// ============================================================================

#[test]
fn color_only_target_is_complete() {
    let mut cx = context();
    let fb = target(&mut cx, 32, 24, AttachmentSet::ColorOnly);
    assert!(fb.is_valid());
    assert_eq!(fb.size(), IVec2::new(32, 24));
    assert_eq!(fb.depth_stencil(), DepthStencilMode::None);

    let rt = fb.render_target(OutputTransform::Rotate90);
    assert_eq!(rt.size(), IVec2::new(32, 24));
    assert_eq!(rt.logical_size(), Vec2::new(24.0, 32.0));
}

#[test]
fn mismatched_attachment_sizes_are_incomplete() {
    let mut cx = context();
    let color = cx.create_texture(InternalFormat::Rgba8, IVec2::new(16, 16), 1).unwrap();

    let device = cx.device_mut();
    let fb = device.create_framebuffer().unwrap();
    device.bind_framebuffer(FramebufferTarget::Framebuffer, Some(fb));
    device.framebuffer_texture_2d(
        FramebufferTarget::Framebuffer,
        Attachment::Color0,
        color.target(),
        Some(color.handle()),
        0,
    );
    assert_eq!(device.check_framebuffer_status(FramebufferTarget::Framebuffer), FramebufferStatus::Complete);

    let rb = device.create_renderbuffer().unwrap();
    device.renderbuffer_storage(rb, RenderbufferFormat::Depth24, 8, 8);
    device.framebuffer_renderbuffer(FramebufferTarget::Framebuffer, Attachment::Depth, Some(rb));
    assert_eq!(
        device.check_framebuffer_status(FramebufferTarget::Framebuffer),
        FramebufferStatus::IncompleteDimensions
    );
    device.bind_framebuffer(FramebufferTarget::Framebuffer, None);
}

#[test]
fn packed_depth_stencil_when_available() {
    let mut cx = context();
    let fb = target(&mut cx, 64, 64, AttachmentSet::DepthStencil);
    assert!(fb.is_valid());
    assert_eq!(fb.depth_stencil(), DepthStencilMode::Packed);
}

#[test]
fn depth_only_fallback_when_packed_is_rejected() {
    let mut device = HeadlessDevice::new();
    device.set_packed_depth_stencil(false);
    let mut cx = context_with(device);

    let fb = target(&mut cx, 64, 64, AttachmentSet::DepthStencil);
    assert!(fb.is_valid());
    assert_eq!(fb.depth_stencil(), DepthStencilMode::DepthOnly);
}

// ============================================================================
// Bind Stack
// ============================================================================

#[test]
fn stack_binds_only_on_change() {
    let mut cx = context();
    let fb = target(&mut cx, 32, 32, AttachmentSet::ColorOnly);

    let before = cx.device().stats().framebuffer_binds;
    cx.push_framebuffer(Rc::clone(&fb)).unwrap();
    cx.push_framebuffer(Rc::clone(&fb)).unwrap();
    assert_eq!(cx.device().stats().framebuffer_binds, before + 1);
    assert_eq!(cx.device().viewport_rect(), [0, 0, 32, 32]);

    cx.pop_framebuffer().unwrap();
    assert_eq!(cx.device().stats().framebuffer_binds, before + 1);
    assert_eq!(cx.framebuffer_stack().depth(), 1);

    cx.pop_framebuffer().unwrap();
    assert_eq!(cx.device().stats().framebuffer_binds, before + 2);
    assert_eq!(cx.size(), IVec2::new(256, 256));
    assert_eq!(cx.device().viewport_rect(), [0, 0, 256, 256]);
}

#[test]
fn push_many_binds_the_last() {
    let mut cx = context();
    let a = target(&mut cx, 16, 16, AttachmentSet::ColorOnly);
    let b = target(&mut cx, 48, 48, AttachmentSet::ColorOnly);

    let before = cx.device().stats().framebuffer_binds;
    cx.push_framebuffers([Rc::clone(&a), Rc::clone(&b)]).unwrap();
    assert_eq!(cx.device().stats().framebuffer_binds, before + 1);
    assert_eq!(cx.size(), IVec2::new(48, 48));

    cx.pop_framebuffer().unwrap();
    assert_eq!(cx.size(), IVec2::new(16, 16));
}

#[test]
fn resize_rebinds_the_surface_only_when_idle() {
    let mut cx = context();
    cx.resize(IVec2::new(0, 100));
    assert_eq!(cx.size(), IVec2::new(256, 256));

    cx.resize(IVec2::new(320, 200));
    assert_eq!(cx.size(), IVec2::new(320, 200));
    assert_eq!(cx.device().viewport_rect(), [0, 0, 320, 200]);
}

// ============================================================================
// Clear, Blit, Read
// ============================================================================

#[test]
fn clear_blit_and_read_back() -> anyhow::Result<()> {
    let mut cx = context();
    let source = target(&mut cx, 64, 64, AttachmentSet::ColorOnly);
    let dest = target(&mut cx, 64, 64, AttachmentSet::ColorOnly);

    cx.push_framebuffer(Rc::clone(&source))?;
    cx.clear(Vec4::new(1.0, 0.0, 0.0, 1.0));
    cx.pop_framebuffer()?;

    cx.blit_from_framebuffer(&dest, &source, Rect::new(0, 0, 64, 64), Rect::new(0, 0, 32, 32), false, false, false)?;
    assert_eq!(cx.device().stats().blits, 1);

    // top-left quarter was written, the rest is untouched
    assert_all_pixels(&cx.read_pixels(&dest, Rect::new(0, 0, 32, 32)), [255, 0, 0, 255]);
    assert_all_pixels(&cx.read_pixels(&dest, Rect::new(32, 32, 32, 32)), [0, 0, 0, 0]);
    assert!(cx.current_framebuffer().is_none());
    Ok(())
}

#[test]
fn flipped_blit_mirrors_rows() {
    let mut cx = context();
    let source = target(&mut cx, 8, 8, AttachmentSet::ColorOnly);
    let dest = target(&mut cx, 8, 8, AttachmentSet::ColorOnly);

    // top half green, bottom half left black
    cx.push_framebuffer(Rc::clone(&source)).unwrap();
    cx.device_mut().set_scissor_test(true);
    cx.device_mut().scissor(0, 4, 8, 4);
    cx.clear(Vec4::new(0.0, 1.0, 0.0, 1.0));
    cx.device_mut().set_scissor_test(false);
    cx.pop_framebuffer().unwrap();

    cx.blit_from_framebuffer(&dest, &source, Rect::new(0, 0, 8, 8), Rect::new(0, 0, 8, 8), false, false, true)
        .unwrap();
    assert_all_pixels(&cx.read_pixels(&dest, Rect::new(0, 4, 8, 4)), [0, 255, 0, 255]);
    assert_all_pixels(&cx.read_pixels(&dest, Rect::new(0, 0, 8, 4)), [0, 0, 0, 0]);
}

#[test]
fn blits_involving_invalid_targets_are_refused() {
    let mut cx = context();
    let source = target(&mut cx, 8, 8, AttachmentSet::ColorOnly);

    let stale = cx.device_mut().create_texture().unwrap();
    cx.device_mut().delete_texture(stale);
    let support = cx.texture_support();
    let color = Rc::new(Texture::wrap_foreign(
        stale,
        TextureTarget::Texture2D,
        InternalFormat::Rgba8,
        IVec2::new(8, 8),
        support,
    ));
    let broken = cx.create_framebuffer(color, AttachmentSet::ColorOnly).unwrap();
    assert!(!broken.is_valid());

    let full = Rect::new(0, 0, 8, 8);
    assert!(matches!(
        cx.blit_from_framebuffer(&broken, &source, full, full, false, false, false),
        Err(GlError::FramebufferIncomplete(_))
    ));
    assert!(matches!(
        cx.blit_from_framebuffer(&source, &broken, full, full, false, false, false),
        Err(GlError::FramebufferIncomplete(_))
    ));
    assert_eq!(cx.device().stats().blits, 0);

    // the window-system target is always a valid destination
    let surface = Framebuffer::foreign(None, IVec2::new(256, 256));
    cx.blit_from_framebuffer(&surface, &source, full, full, false, false, false)
        .unwrap();
    assert_eq!(cx.device().stats().blits, 1);
}

// ============================================================================
// Render Targets
// ============================================================================

#[test]
fn normal_render_target_copies_with_a_blit() {
    let mut cx = context();
    let source = target(&mut cx, 64, 32, AttachmentSet::ColorOnly);
    let dest = target(&mut cx, 64, 32, AttachmentSet::ColorOnly);
    let rt = source.render_target(OutputTransform::Normal);
    let viewport = RenderViewport::new(RectF::new(0.0, 0.0, 64.0, 32.0), 1.0, &rt);

    cx.blit_from_render_target(&dest, &source, &viewport, RectF::new(0.0, 0.0, 64.0, 32.0), Rect::new(0, 0, 64, 32), true)
        .unwrap();
    assert_eq!(cx.device().stats().blits, 1);
    assert!(cx.device().draws().is_empty());
}

#[test]
fn rotated_render_target_copies_with_a_quad() -> anyhow::Result<()> {
    let mut cx = context();
    // 200x100 device pixels showing a 100x200 logical output
    let source = target(&mut cx, 200, 100, AttachmentSet::ColorOnly);
    let dest = target(&mut cx, 100, 200, AttachmentSet::ColorOnly);
    let rt = RenderTarget::new(source.handle(), source.size(), OutputTransform::Rotate90);
    let viewport = RenderViewport::new(RectF::new(0.0, 0.0, 100.0, 200.0), 1.0, &rt);

    cx.blit_from_render_target(
        &dest,
        &source,
        &viewport,
        RectF::new(0.0, 0.0, 100.0, 200.0),
        Rect::new(0, 0, 100, 200),
        false,
    )?;

    assert_eq!(cx.device().stats().blits, 0);
    let draws = cx.device().draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].framebuffer, dest.handle());
    // every binding is restored
    assert!(cx.current_framebuffer().is_none());
    assert!(cx.bound_shader().is_none());
    assert_eq!(cx.device().current_program(), None);
    Ok(())
}

#[test]
fn gles2_copies_render_targets_with_a_quad() -> anyhow::Result<()> {
    let mut cx = context_with(HeadlessDevice::with_info(gles2_info()));
    assert!(!cx.capabilities().supports(GlFeatures::BLITS));
    let source = target(&mut cx, 64, 32, AttachmentSet::ColorOnly);
    let dest = target(&mut cx, 64, 32, AttachmentSet::ColorOnly);

    let full = Rect::new(0, 0, 64, 32);
    assert!(matches!(
        cx.blit_from_framebuffer(&dest, &source, full, full, false, false, false),
        Err(GlError::Unsupported(_))
    ));

    let rt = source.render_target(OutputTransform::Normal);
    let viewport = RenderViewport::new(RectF::new(0.0, 0.0, 64.0, 32.0), 1.0, &rt);
    cx.blit_from_render_target(&dest, &source, &viewport, RectF::new(0.0, 0.0, 64.0, 32.0), full, true)?;

    assert_eq!(cx.device().stats().blits, 0);
    let draws = cx.device().draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].framebuffer, dest.handle());
    assert!(cx.current_framebuffer().is_none());
    assert!(cx.bound_shader().is_none());
    Ok(())
}

#[test]
fn failed_blit_program_leaves_stacks_untouched() {
    let mut device = HeadlessDevice::new();
    device.set_fail_links(true);
    let mut cx = context_with(device);
    let source = target(&mut cx, 200, 100, AttachmentSet::ColorOnly);
    let dest = target(&mut cx, 100, 200, AttachmentSet::ColorOnly);
    let rt = RenderTarget::new(source.handle(), source.size(), OutputTransform::Rotate90);
    let viewport = RenderViewport::new(RectF::new(0.0, 0.0, 100.0, 200.0), 1.0, &rt);

    let result = cx.blit_from_render_target(
        &dest,
        &source,
        &viewport,
        RectF::new(0.0, 0.0, 100.0, 200.0),
        Rect::new(0, 0, 100, 200),
        false,
    );

    assert!(matches!(result, Err(GlError::ShaderLink(log)) if log.contains("linking is disabled")));
    assert!(cx.current_framebuffer().is_none());
    assert!(cx.bound_shader().is_none());
    assert!(cx.device().draws().is_empty());
    assert_eq!(cx.size(), IVec2::new(256, 256));
}
