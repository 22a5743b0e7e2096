#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! GPU resource and render-pipeline layer of an OpenGL compositor.
//!
//! Everything is driven through a [`RenderContext`], created once per GL
//! context on the thread that owns it.

pub mod errors;
pub mod platform;
pub mod renderer;

pub use errors::{GlError, Result};
pub use platform::{Capabilities, ChipClass, CompositingType, Driver, GlFeatures, NpotSupport, PlatformInterface, Version};
pub use renderer::core::device::GraphicsDevice;
#[cfg(feature = "glow")]
pub use renderer::core::GlowDevice;
pub use renderer::core::{HeadlessDevice, ReleaseQueue, RenderContext, ShaderBinding, StreamingBuffer};
pub use renderer::pipeline::{ShaderManager, ShaderProgram, ShaderTraits, UniformSlot};
pub use renderer::resources::{
    AttachmentSet, Framebuffer, FramebufferStack, GLVertex2D, GLVertex3D, ImageData, ImageFormat, IndexBuffer,
    Primitive, Texture, TextureUploader, VertexBuffer, WriteStrategy,
};
pub use renderer::settings::{PersistentBufferPolicy, RenderSettings, RingBufferTuning};
pub use renderer::viewport::{OutputTransform, Rect, RectF, Region, RenderTarget, RenderViewport};
