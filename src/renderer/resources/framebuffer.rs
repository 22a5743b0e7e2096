//! Framebuffers and the framebuffer bind stack.
//!
//! A [`Framebuffer`] renders into a color [`Texture`] with optional depth and
//! stencil renderbuffers. The window-system target and framebuffers owned by
//! someone else are wrapped with [`Framebuffer::foreign`].
//!
//! Every bind goes through [`FramebufferStack`], which binds only when the
//! top changes and keeps the viewport in step with the bound target.

use std::rc::Rc;

use glam::IVec2;
use smallvec::SmallVec;

use super::texture::Texture;
use crate::errors::{GlError, Result};
use crate::platform::{Capabilities, GlFeatures};
use crate::renderer::core::device::{
    Attachment, BlitRect, BufferBits, FramebufferHandle, FramebufferStatus, FramebufferTarget, GraphicsDevice,
    RenderbufferFormat, RenderbufferHandle,
};
use crate::renderer::core::release::{GpuResource, ReleaseQueue};
use crate::renderer::viewport::{OutputTransform, Rect, RenderTarget};

/// Extra attachments requested at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttachmentSet {
    #[default]
    ColorOnly,
    /// Depth and stencil, packed if possible.
    DepthStencil,
}

/// Which of the depth/stencil fallbacks ended up attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthStencilMode {
    None,
    Packed,
    DepthOnly,
    StencilOnly,
}

pub struct Framebuffer {
    handle: Option<FramebufferHandle>,
    size: IVec2,
    color: Option<Rc<Texture>>,
    renderbuffer: Option<RenderbufferHandle>,
    depth_stencil: DepthStencilMode,
    valid: bool,
    release: Option<ReleaseQueue>,
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("handle", &self.handle)
            .field("size", &self.size)
            .field("valid", &self.valid)
            .field("depth_stencil", &self.depth_stencil)
            .finish_non_exhaustive()
    }
}

impl Framebuffer {
    /// Renders into `color`. The result may be invalid; an incomplete
    /// framebuffer stays invalid for good, check [`is_valid`](Self::is_valid).
    pub fn new(
        device: &mut dyn GraphicsDevice,
        release: ReleaseQueue,
        caps: &Capabilities,
        color: Rc<Texture>,
        attachments: AttachmentSet,
    ) -> Result<Self> {
        let size = color.size();
        let previous = device.bound_framebuffer();
        let handle = device.create_framebuffer()?;
        device.bind_framebuffer(FramebufferTarget::Framebuffer, Some(handle));
        device.framebuffer_texture_2d(
            FramebufferTarget::Framebuffer,
            Attachment::Color0,
            color.target(),
            Some(color.handle()),
            0,
        );

        let (renderbuffer, depth_stencil) = match attachments {
            AttachmentSet::ColorOnly => (None, DepthStencilMode::None),
            AttachmentSet::DepthStencil => match attach_depth_stencil(device, caps, size) {
                Ok(attached) => attached,
                Err(e) => {
                    device.bind_framebuffer(FramebufferTarget::Framebuffer, previous);
                    device.delete_framebuffer(handle);
                    return Err(e);
                }
            },
        };

        let status = device.check_framebuffer_status(FramebufferTarget::Framebuffer);
        device.bind_framebuffer(FramebufferTarget::Framebuffer, previous);

        let mut framebuffer = Self {
            handle: Some(handle),
            size,
            color: Some(color),
            renderbuffer,
            depth_stencil,
            valid: status.is_complete(),
            release: Some(release),
        };
        if !framebuffer.valid {
            log::error!("Invalid framebuffer status: {status}");
            framebuffer.release_objects();
        }
        Ok(framebuffer)
    }

    /// Wraps a framebuffer this crate doesn't own; `None` is the
    /// window-system target.
    #[must_use]
    pub fn foreign(handle: Option<FramebufferHandle>, size: IVec2) -> Self {
        Self {
            handle,
            size,
            color: None,
            renderbuffer: None,
            depth_stencil: DepthStencilMode::None,
            valid: true,
            release: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> Option<FramebufferHandle> {
        self.handle
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> IVec2 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[inline]
    #[must_use]
    pub fn color_attachment(&self) -> Option<&Rc<Texture>> {
        self.color.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn depth_stencil(&self) -> DepthStencilMode {
        self.depth_stencil
    }

    /// Describes this framebuffer as a render target with the given
    /// content orientation.
    #[must_use]
    pub fn render_target(&self, transform: OutputTransform) -> RenderTarget {
        RenderTarget::new(self.handle, self.size, transform)
    }

    /// Copies `source_rect` of `source` into `dest_rect` of this framebuffer
    /// with a hardware blit. Rects are top-down; flips mirror the source.
    /// The stack's binding is restored afterwards.
    #[allow(clippy::fn_params_excessive_bools)]
    pub fn blit_from_framebuffer(
        &self,
        device: &mut dyn GraphicsDevice,
        caps: &Capabilities,
        stack: &FramebufferStack,
        source: &Framebuffer,
        source_rect: Rect,
        dest_rect: Rect,
        linear: bool,
        flip_x: bool,
        flip_y: bool,
    ) -> Result<()> {
        if !caps.supports(GlFeatures::BLITS) {
            return Err(GlError::Unsupported("framebuffer blits"));
        }
        if !self.valid || !source.valid {
            return Err(GlError::FramebufferIncomplete(FramebufferStatus::Undefined));
        }
        let (src, dst) = blit_rects(source.size, source_rect, self.size, dest_rect, flip_x, flip_y);
        device.bind_framebuffer(FramebufferTarget::Read, source.handle);
        device.bind_framebuffer(FramebufferTarget::Draw, self.handle);
        device.blit_framebuffer(src, dst, BufferBits::COLOR, linear);
        device.bind_framebuffer(FramebufferTarget::Framebuffer, stack.current_handle());
        Ok(())
    }

    fn release_objects(&mut self) {
        let Some(release) = &self.release else {
            return;
        };
        if let Some(handle) = self.handle.take() {
            release.push(GpuResource::Framebuffer(handle));
        }
        if let Some(rb) = self.renderbuffer.take() {
            release.push(GpuResource::Renderbuffer(rb));
        }
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.release_objects();
    }
}

/// Tries packed depth-stencil, then depth-only, then stencil-only. The
/// framebuffer must be bound.
fn attach_depth_stencil(
    device: &mut dyn GraphicsDevice,
    caps: &Capabilities,
    size: IVec2,
) -> Result<(Option<RenderbufferHandle>, DepthStencilMode)> {
    let depth = if !caps.is_gles || caps.supports(GlFeatures::GLES_DEPTH24) {
        RenderbufferFormat::Depth24
    } else {
        RenderbufferFormat::Depth16
    };
    let mut candidates: SmallVec<[(RenderbufferFormat, Attachment, DepthStencilMode); 3]> = SmallVec::new();
    if caps.supports(GlFeatures::PACKED_DEPTH_STENCIL) {
        candidates.push((RenderbufferFormat::Depth24Stencil8, Attachment::DepthStencil, DepthStencilMode::Packed));
    }
    candidates.push((depth, Attachment::Depth, DepthStencilMode::DepthOnly));
    candidates.push((RenderbufferFormat::StencilIndex8, Attachment::Stencil, DepthStencilMode::StencilOnly));

    for (format, attachment, mode) in candidates {
        let rb = device.create_renderbuffer()?;
        device.renderbuffer_storage(rb, format, size.x, size.y);
        device.framebuffer_renderbuffer(FramebufferTarget::Framebuffer, attachment, Some(rb));
        if device.check_framebuffer_status(FramebufferTarget::Framebuffer).is_complete() {
            return Ok((Some(rb), mode));
        }
        log::debug!("{format:?} attachment rejected, trying next fallback");
        device.framebuffer_renderbuffer(FramebufferTarget::Framebuffer, attachment, None);
        device.delete_renderbuffer(rb);
    }
    log::warn!("No depth/stencil attachment accepted");
    Ok((None, DepthStencilMode::None))
}

/// Converts top-down rects to bottom-up blit corners. Flips swap the source
/// corners along that axis.
#[must_use]
pub fn blit_rects(
    source_size: IVec2,
    source: Rect,
    dest_size: IVec2,
    dest: Rect,
    flip_x: bool,
    flip_y: bool,
) -> (BlitRect, BlitRect) {
    let mut src = BlitRect {
        x0: source.x,
        y0: source_size.y - (source.y + source.height),
        x1: source.x + source.width,
        y1: source_size.y - source.y,
    };
    if flip_x {
        std::mem::swap(&mut src.x0, &mut src.x1);
    }
    if flip_y {
        std::mem::swap(&mut src.y0, &mut src.y1);
    }
    let dst = BlitRect {
        x0: dest.x,
        y0: dest_size.y - (dest.y + dest.height),
        x1: dest.x + dest.width,
        y1: dest_size.y - dest.y,
    };
    (src, dst)
}

// ============================================================================
// FramebufferStack
// ============================================================================

/// Stack of bound render targets. Empty means the window-system target.
#[derive(Debug, Default)]
pub struct FramebufferStack {
    stack: SmallVec<[Rc<Framebuffer>; 4]>,
    surface_size: IVec2,
}

impl FramebufferStack {
    #[must_use]
    pub fn new(surface_size: IVec2) -> Self {
        Self {
            stack: SmallVec::new(),
            surface_size,
        }
    }

    /// Size used for the viewport while the window-system target is bound.
    pub fn set_surface_size(&mut self, size: IVec2) {
        self.surface_size = size;
    }

    /// Size of the window-system framebuffer.
    #[must_use]
    pub fn surface_size(&self) -> IVec2 {
        self.surface_size
    }

    #[must_use]
    pub fn current(&self) -> Option<&Rc<Framebuffer>> {
        self.stack.last()
    }

    #[must_use]
    pub fn current_handle(&self) -> Option<FramebufferHandle> {
        self.stack.last().and_then(|fb| fb.handle())
    }

    /// Size of the bound target.
    #[must_use]
    pub fn current_size(&self) -> IVec2 {
        self.stack.last().map_or(self.surface_size, |fb| fb.size())
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn push(&mut self, device: &mut dyn GraphicsDevice, framebuffer: Rc<Framebuffer>) {
        let previous = self.current_handle();
        let changed = self.stack.is_empty() || previous != framebuffer.handle();
        self.stack.push(framebuffer);
        if changed {
            self.bind_top(device);
        }
    }

    /// Pushes several framebuffers, binding only the last.
    pub fn push_framebuffers(&mut self, device: &mut dyn GraphicsDevice, framebuffers: impl IntoIterator<Item = Rc<Framebuffer>>) {
        let previous = (self.stack.len(), self.current_handle());
        self.stack.extend(framebuffers);
        if self.stack.len() != previous.0 && (previous.0 == 0 || self.current_handle() != previous.1) {
            self.bind_top(device);
        }
    }

    /// Pops the top and rebinds what is now current.
    pub fn pop(&mut self, device: &mut dyn GraphicsDevice) -> Result<Rc<Framebuffer>> {
        let popped = self.stack.pop().ok_or(GlError::FramebufferStackUnderflow)?;
        if self.current_handle() != popped.handle() || self.stack.is_empty() {
            self.bind_top(device);
        }
        Ok(popped)
    }

    /// Re-issues the binding of the current target.
    pub fn bind_top(&self, device: &mut dyn GraphicsDevice) {
        device.bind_framebuffer(FramebufferTarget::Framebuffer, self.current_handle());
        let size = self.current_size();
        device.viewport(0, 0, size.x, size.y);
    }

    /// Drops every entry without touching the GPU.
    pub fn clear(&mut self) {
        self.stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blit_rects_flip_to_bottom_up() {
        let (src, dst) = blit_rects(
            IVec2::new(100, 100),
            Rect::new(10, 20, 30, 40),
            IVec2::new(50, 50),
            Rect::new(0, 0, 50, 50),
            false,
            true,
        );
        assert_eq!(src, BlitRect { x0: 10, y0: 80, x1: 40, y1: 40 });
        assert_eq!(dst, BlitRect { x0: 0, y0: 0, x1: 50, y1: 50 });
    }
}
