//! Deferred GPU object deletion.
//!
//! GPU objects can only be deleted on the thread that owns the context, with
//! the device at hand. Resource types therefore don't delete in `Drop`; they
//! push their handles onto a shared [`ReleaseQueue`] which the
//! [`RenderContext`](crate::RenderContext) drains at `begin_frame` and on
//! teardown.

use std::cell::RefCell;
use std::rc::Rc;

use super::device::{
    BufferHandle, FenceHandle, FramebufferHandle, GraphicsDevice, ProgramHandle,
    RenderbufferHandle, TextureHandle,
};

/// A GPU object awaiting deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuResource {
    Program(ProgramHandle),
    Buffer(BufferHandle),
    Texture(TextureHandle),
    Framebuffer(FramebufferHandle),
    Renderbuffer(RenderbufferHandle),
    Fence(FenceHandle),
}

/// Shared, single-threaded queue of pending deletions.
///
/// Cloning is cheap and yields a handle to the same queue.
#[derive(Debug, Clone, Default)]
pub struct ReleaseQueue {
    pending: Rc<RefCell<Vec<GpuResource>>>,
}

impl ReleaseQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, resource: GpuResource) {
        self.pending.borrow_mut().push(resource);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Deletes every queued object. Returns how many were released.
    pub fn drain(&self, device: &mut dyn GraphicsDevice) -> usize {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        let count = pending.len();
        for resource in pending {
            match resource {
                GpuResource::Program(h) => device.delete_program(h),
                GpuResource::Buffer(h) => device.delete_buffer(h),
                GpuResource::Texture(h) => device.delete_texture(h),
                GpuResource::Framebuffer(h) => device.delete_framebuffer(h),
                GpuResource::Renderbuffer(h) => device.delete_renderbuffer(h),
                GpuResource::Fence(h) => device.delete_sync(h),
            }
        }
        if count > 0 {
            log::trace!("Released {count} GPU objects");
        }
        count
    }

    /// Forgets every queued object without deleting it. Used when the
    /// context that owned the handles is gone.
    pub fn discard(&self) -> usize {
        let count = std::mem::take(&mut *self.pending.borrow_mut()).len();
        if count > 0 {
            log::debug!("Discarded {count} GPU objects of a lost context");
        }
        count
    }
}
