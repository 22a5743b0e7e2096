//! Render Pipeline
//!
//! - [`core`]: devices, the release queue and the [`RenderContext`](core::RenderContext)
//! - [`pipeline`]: shader generation and the program bind stack
//! - [`resources`]: textures, buffers and framebuffers
//! - [`viewport`]: logical ↔ device coordinate mapping
//! - [`settings`]: configuration read when a context is created

pub mod core;
pub mod pipeline;
pub mod resources;
pub mod settings;
pub mod viewport;
