//! Error Types
//!
//! This module defines the error types used throughout the pipeline layer.
//!
//! # Overview
//!
//! The main error type [`GlError`] covers the failure modes that callers can
//! actually react to:
//! - context and driver failures
//! - shader compile/link failures
//! - buffer mapping and fence synchronization failures
//! - texture allocation and framebuffer completeness
//!
//! A capability that is simply absent is never an error: every such path has
//! a fallback and is handled internally.
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for `std::result::Result<T, GlError>`.
//!
//! ```rust,ignore
//! use glpipe::errors::{GlError, Result};
//! use glpipe::{GraphicsDevice, RenderContext};
//!
//! fn write_quads(cx: &mut RenderContext<impl GraphicsDevice>) -> Result<()> {
//!     let mut stream = cx.streaming_buffer();
//!     let bytes = stream.map(4096)?;
//!     // fill `bytes` ...
//!     stream.unmap()
//! }
//! ```

use thiserror::Error;

use crate::renderer::core::device::FramebufferStatus;

/// The main error type for the pipeline layer.
#[derive(Error, Debug)]
pub enum GlError {
    // ========================================================================
    // Device & Context Errors
    // ========================================================================
    /// The driver refused to create an object.
    #[error("Failed to create GL object: {0}")]
    ObjectCreation(String),

    /// The handle does not name a live object on this device.
    #[error("Invalid GL handle: {0}")]
    InvalidHandle(&'static str),

    /// An operation needs a feature the context lacks and has no fallback.
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    // ========================================================================
    // Shader Errors
    // ========================================================================
    /// A required program failed to compile or link; carries the driver log.
    #[error("Failed to build shader program: {0}")]
    ShaderLink(String),

    /// Template rendering failed.
    #[error("Shader template error: {0}")]
    ShaderTemplate(#[from] minijinja::Error),

    /// Popped an empty shader stack.
    #[error("Shader stack underflow")]
    ShaderStackUnderflow,

    // ========================================================================
    // Buffer & Synchronization Errors
    // ========================================================================
    /// Waiting for a GPU fence exceeded the timeout.
    #[error("Fence wait timed out after {timeout_ns} ns")]
    FenceWaitTimeout {
        /// The timeout that elapsed
        timeout_ns: u64,
    },

    /// Waiting for a GPU fence failed outright.
    #[error("Fence wait failed")]
    FenceWaitFailed,

    /// The driver failed to map a buffer range.
    #[error("Failed to map {size} bytes at offset {offset}")]
    MapFailed {
        /// Requested offset
        offset: usize,
        /// Requested size
        size: usize,
    },

    /// `unmap` without a preceding `map`.
    #[error("Buffer is not mapped")]
    NotMapped,

    /// A write went past the end of the requested range.
    #[error("Buffer write out of bounds: {offset} + {len} > {capacity}")]
    OutOfBounds {
        /// Write offset
        offset: usize,
        /// Write length
        len: usize,
        /// Available bytes
        capacity: usize,
    },

    // ========================================================================
    // Texture & Framebuffer Errors
    // ========================================================================
    /// A texture could not be allocated.
    #[error("Texture allocation failed: {0}")]
    TextureAllocation(String),

    /// The image data is inconsistent with its declared size/format.
    #[error("Invalid image data: {0}")]
    InvalidImage(String),

    /// Framebuffer is not complete.
    #[error("Framebuffer incomplete: {0}")]
    FramebufferIncomplete(FramebufferStatus),

    /// Popped an empty framebuffer stack.
    #[error("Framebuffer stack underflow")]
    FramebufferStackUnderflow,

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// An environment variable held an unusable value.
    #[error("Invalid value {value:?} for {name}")]
    InvalidSetting {
        /// Variable name
        name: &'static str,
        /// Offending value
        value: String,
    },
}

/// Alias for `Result<T, GlError>`.
pub type Result<T> = std::result::Result<T, GlError>;
