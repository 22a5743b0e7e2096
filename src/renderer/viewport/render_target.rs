use glam::{IVec2, Vec2};

use super::output_transform::OutputTransform;
use crate::renderer::core::device::FramebufferHandle;

/// Where a frame is rendered to: a framebuffer (or the window-system
/// surface), its size in device pixels and the orientation of its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    framebuffer: Option<FramebufferHandle>,
    size: IVec2,
    transform: OutputTransform,
}

impl RenderTarget {
    #[must_use]
    pub fn new(framebuffer: Option<FramebufferHandle>, size: IVec2, transform: OutputTransform) -> Self {
        Self {
            framebuffer,
            size,
            transform,
        }
    }

    /// The window-system surface.
    #[must_use]
    pub fn surface(size: IVec2, transform: OutputTransform) -> Self {
        Self::new(None, size, transform)
    }

    #[inline]
    #[must_use]
    pub fn framebuffer(&self) -> Option<FramebufferHandle> {
        self.framebuffer
    }

    /// Buffer size in device pixels.
    #[inline]
    #[must_use]
    pub fn size(&self) -> IVec2 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn transform(&self) -> OutputTransform {
        self.transform
    }

    /// Size of the target as seen from logical space, before the transform.
    #[must_use]
    pub fn logical_size(&self) -> Vec2 {
        self.transform.inverted().map_size(self.size.as_vec2())
    }
}
