//! Device layer and per-context state.
//!
//! Provides:
//! - `GraphicsDevice`: the driver interface every resource talks to
//! - `GlowDevice`: OpenGL / GLES through `glow`
//! - `HeadlessDevice`: software device for tests and offscreen tooling
//! - `ReleaseQueue`: deferred deletion of GPU objects
//! - `RenderContext`: owns the device and the per-context singletons

pub mod context;
pub mod device;
#[cfg(feature = "glow")]
pub mod glow_device;
pub mod headless;
pub mod release;

pub use context::{RenderContext, ShaderBinding, StreamingBuffer};
pub use device::GraphicsDevice;
#[cfg(feature = "glow")]
pub use glow_device::GlowDevice;
pub use headless::HeadlessDevice;
pub use release::{GpuResource, ReleaseQueue};
