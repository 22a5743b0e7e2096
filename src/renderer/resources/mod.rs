//! GPU Resources
//!
//! Objects that own driver-side storage:
//!
//! - [`texture`]: images and their sampling state
//! - [`uploader`]: CPU image → texture transfers
//! - [`vertex_buffer`] / [`index_buffer`]: streamed and static geometry
//! - [`framebuffer`]: offscreen targets and the bind stack
//!
//! None of them delete in `Drop`; handles go to the
//! [`ReleaseQueue`](crate::renderer::core::release::ReleaseQueue).

pub mod framebuffer;
pub mod image;
pub mod index_buffer;
pub mod texture;
pub mod uploader;
pub mod vertex_buffer;

pub use framebuffer::{AttachmentSet, DepthStencilMode, Framebuffer, FramebufferStack};
pub use image::{ImageData, ImageFormat};
pub use index_buffer::IndexBuffer;
pub use texture::{CoordinateType, Texture, TextureSupport, TransferFormat};
pub use uploader::TextureUploader;
pub use vertex_buffer::{
    BufferFence, Clip, GLVertex2D, GLVertex3D, Primitive, Vertex, VertexAttrib, VertexBuffer, WriteStrategy,
};
