//! Graphics Device Abstraction
//!
//! [`GraphicsDevice`] is the narrow waist between the pipeline layer and the
//! driver. It exposes the subset of OpenGL / OpenGL ES the compositor needs,
//! with typed handles and typed enums instead of raw `GLenum`s.
//!
//! Two implementations exist:
//! - [`GlowDevice`](super::glow_device::GlowDevice): a real context via `glow`
//! - [`HeadlessDevice`](super::headless::HeadlessDevice): a deterministic
//!   software device used by the test-suite
//!
//! All methods are safe. Backends validate handles and bounds themselves and
//! log (rather than panic on) driver-side failures.

use std::fmt;

use bitflags::bitflags;
use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use rustc_hash::FxHashSet;

use crate::errors::Result;

slotmap::new_key_type! {
    /// Handle to a linked (or linkable) program object.
    pub struct ProgramHandle;
    /// Handle to a buffer object.
    pub struct BufferHandle;
    /// Handle to a texture object.
    pub struct TextureHandle;
    /// Handle to a framebuffer object. The window-system framebuffer is `None`.
    pub struct FramebufferHandle;
    /// Handle to a renderbuffer object.
    pub struct RenderbufferHandle;
    /// Handle to a fence sync object.
    pub struct FenceHandle;
}

// ─── Context Description ──────────────────────────────────────────────────────

/// Strings and extension set reported by the active context.
#[derive(Debug, Clone, Default)]
pub struct ContextInfo {
    pub vendor: String,
    pub renderer: String,
    pub version: String,
    pub glsl_version: String,
    pub extensions: FxHashSet<String>,
}

impl ContextInfo {
    #[must_use]
    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    /// `true` for OpenGL ES contexts.
    #[must_use]
    pub fn is_gles(&self) -> bool {
        self.version.starts_with("OpenGL ES")
    }
}

// ─── Shader Types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        }
    }
}

/// Result of a compile or link step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutcome {
    pub success: bool,
    pub log: String,
}

/// Opaque uniform location within the currently used program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// A value uploaded with `glUniform*`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
}

// ─── Buffer Types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Array,
    ElementArray,
    CopyRead,
    CopyWrite,
    PixelUnpack,
}

/// Usage hint passed to `glBufferData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Static,
    Dynamic,
    Stream,
}

bitflags! {
    /// `glMapBufferRange` access bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapAccess: u32 {
        const READ              = 1 << 0;
        const WRITE             = 1 << 1;
        const INVALIDATE_RANGE  = 1 << 2;
        const INVALIDATE_BUFFER = 1 << 3;
        const FLUSH_EXPLICIT    = 1 << 4;
        const UNSYNCHRONIZED    = 1 << 5;
        const PERSISTENT        = 1 << 6;
        const COHERENT          = 1 << 7;
    }
}

bitflags! {
    /// `glBufferStorage` flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StorageFlags: u32 {
        const MAP_READ        = 1 << 0;
        const MAP_WRITE       = 1 << 1;
        const MAP_PERSISTENT  = 1 << 6;
        const MAP_COHERENT    = 1 << 7;
        const DYNAMIC_STORAGE = 1 << 8;
    }
}

/// Primitive topology understood by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawMode {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

// ─── Sync Types ───────────────────────────────────────────────────────────────

/// Outcome of `glClientWaitSync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    AlreadySignaled,
    ConditionSatisfied,
    TimeoutExpired,
    Failed,
}

impl WaitResult {
    #[must_use]
    pub fn is_signaled(self) -> bool {
        matches!(self, Self::AlreadySignaled | Self::ConditionSatisfied)
    }
}

// ─── Texture Types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    Texture2D,
    Rectangle,
}

/// Sized internal formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InternalFormat {
    R8,
    Rg8,
    Rgb8,
    Rgba8,
    Srgb8Alpha8,
    Rgb10A2,
    R16,
    Rg16,
    Rgba16,
    Rgba16F,
    Bgra8,
    Depth16,
    Depth24,
    Depth24Stencil8,
    StencilIndex8,
}

impl InternalFormat {
    /// Bytes per pixel of the canonical client-side layout.
    #[must_use]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::R8 | Self::StencilIndex8 => 1,
            Self::Rg8 | Self::R16 | Self::Depth16 => 2,
            Self::Rgb8 => 3,
            Self::Rgba8
            | Self::Srgb8Alpha8
            | Self::Rgb10A2
            | Self::Rg16
            | Self::Bgra8
            | Self::Depth24
            | Self::Depth24Stencil8 => 4,
            Self::Rgba16 | Self::Rgba16F => 8,
        }
    }

    #[must_use]
    pub fn has_depth(self) -> bool {
        matches!(self, Self::Depth16 | Self::Depth24 | Self::Depth24Stencil8)
    }
}

/// Client-side pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Red,
    Rg,
    Rgb,
    Rgba,
    Bgra,
    DepthComponent,
}

/// Client-side component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelType {
    UnsignedByte,
    UnsignedShort,
    HalfFloat,
    Float,
    UnsignedInt2101010Rev,
}

/// Where texel data for `glTex(Sub)Image2D` comes from.
#[derive(Debug, Clone, Copy)]
pub enum PixelSource<'a> {
    /// Client memory.
    Slice(&'a [u8]),
    /// Allocate only.
    Empty,
    /// Byte offset into the bound pixel-unpack buffer.
    UnpackBuffer(usize),
}

/// `glPixelStorei` parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelStore {
    UnpackRowLength(i32),
    UnpackSkipPixels(i32),
    UnpackSkipRows(i32),
    UnpackAlignment(i32),
    PackAlignment(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

impl TextureFilter {
    #[must_use]
    pub fn uses_mipmaps(self) -> bool {
        !matches!(self, Self::Nearest | Self::Linear)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    Repeat,
    MirroredRepeat,
    #[default]
    ClampToEdge,
    ClampToBorder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Swizzle {
    Red,
    Green,
    Blue,
    Alpha,
    Zero,
    One,
}

/// `glTexParameteri` parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexParameter {
    MinFilter(TextureFilter),
    MagFilter(TextureFilter),
    WrapS(WrapMode),
    WrapT(WrapMode),
    MaxLevel(i32),
    Swizzle([Swizzle; 4]),
}

// ─── Framebuffer Types ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramebufferTarget {
    Framebuffer,
    Draw,
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    Color0,
    Depth,
    Stencil,
    DepthStencil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderbufferFormat {
    Depth24Stencil8,
    Depth24,
    Depth16,
    StencilIndex8,
}

/// `glCheckFramebufferStatus` results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramebufferStatus {
    Complete,
    Undefined,
    IncompleteAttachment,
    MissingAttachment,
    IncompleteDimensions,
    IncompleteDrawBuffer,
    IncompleteReadBuffer,
    IncompleteMultisample,
    Unsupported,
    Unknown(u32),
}

impl FramebufferStatus {
    #[must_use]
    pub fn is_complete(self) -> bool {
        self == Self::Complete
    }
}

impl fmt::Display for FramebufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => f.write_str("GL_FRAMEBUFFER_COMPLETE"),
            Self::Undefined => f.write_str("GL_FRAMEBUFFER_UNDEFINED"),
            Self::IncompleteAttachment => f.write_str("GL_FRAMEBUFFER_INCOMPLETE_ATTACHMENT"),
            Self::MissingAttachment => {
                f.write_str("GL_FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT")
            }
            Self::IncompleteDimensions => f.write_str("GL_FRAMEBUFFER_INCOMPLETE_DIMENSIONS"),
            Self::IncompleteDrawBuffer => f.write_str("GL_FRAMEBUFFER_INCOMPLETE_DRAW_BUFFER"),
            Self::IncompleteReadBuffer => f.write_str("GL_FRAMEBUFFER_INCOMPLETE_READ_BUFFER"),
            Self::IncompleteMultisample => {
                f.write_str("GL_FRAMEBUFFER_INCOMPLETE_MULTISAMPLE")
            }
            Self::Unsupported => f.write_str("GL_FRAMEBUFFER_UNSUPPORTED"),
            Self::Unknown(code) => write!(f, "unknown framebuffer status 0x{code:x}"),
        }
    }
}

bitflags! {
    /// Buffer selection for clears and blits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferBits: u32 {
        const COLOR   = 1 << 0;
        const DEPTH   = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Blit corners `(x0, y0, x1, y1)` in bottom-up framebuffer pixels.
/// Swapping a pair of corners mirrors the blit along that axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlitRect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

// ─── GraphicsDevice ───────────────────────────────────────────────────────────

/// The driver interface used by every resource in this crate.
///
/// Binding semantics follow OpenGL: uniforms apply to the program last passed
/// to [`use_program`](Self::use_program), buffer/texture calls act on the
/// object bound to the given target, and so on.
pub trait GraphicsDevice {
    // === Query ===

    fn context_info(&self) -> &ContextInfo;

    // === Programs ===

    fn create_program(&mut self) -> Result<ProgramHandle>;
    /// Compiles `source` and attaches it to `program` on success.
    fn compile_shader(
        &mut self,
        program: ProgramHandle,
        stage: ShaderStage,
        source: &str,
    ) -> CompileOutcome;
    fn bind_attrib_location(&mut self, program: ProgramHandle, index: u32, name: &str);
    fn bind_frag_data_location(&mut self, program: ProgramHandle, color: u32, name: &str);
    fn link_program(&mut self, program: ProgramHandle) -> CompileOutcome;
    fn use_program(&mut self, program: Option<ProgramHandle>);
    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);
    fn delete_program(&mut self, program: ProgramHandle);

    // === Buffers ===

    fn create_buffer(&mut self) -> Result<BufferHandle>;
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferHandle>);
    /// (Re)specifies the bound buffer's store. `None` allocates uninitialized storage.
    fn buffer_data(&mut self, target: BufferTarget, size: usize, data: Option<&[u8]>, usage: BufferUsage);
    /// Allocates immutable storage for the bound buffer.
    fn buffer_storage(&mut self, target: BufferTarget, size: usize, flags: StorageFlags) -> Result<()>;
    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]);
    /// Maps a range of the bound buffer. With [`MapAccess::PERSISTENT`] the
    /// mapping stays valid after the borrow ends and is reachable through
    /// [`persistent_mapping`](Self::persistent_mapping) until unmapped.
    fn map_buffer_range(
        &mut self,
        target: BufferTarget,
        offset: usize,
        len: usize,
        access: MapAccess,
    ) -> Option<&mut [u8]>;
    /// Returns `false` when the store was corrupted while mapped.
    fn unmap_buffer(&mut self, target: BufferTarget) -> bool;
    /// A window into an existing persistent mapping of `buffer`.
    fn persistent_mapping(&mut self, buffer: BufferHandle, offset: usize, len: usize) -> Option<&mut [u8]>;
    fn copy_buffer_sub_data(
        &mut self,
        read: BufferTarget,
        write: BufferTarget,
        read_offset: usize,
        write_offset: usize,
        size: usize,
    );
    fn delete_buffer(&mut self, buffer: BufferHandle);

    // === Vertex Input & Drawing ===

    /// Float attribute sourced from the bound array buffer.
    fn vertex_attrib_pointer(&mut self, index: u32, components: i32, stride: i32, offset: usize);
    fn enable_vertex_attrib_array(&mut self, index: u32);
    fn disable_vertex_attrib_array(&mut self, index: u32);
    fn draw_arrays(&mut self, mode: DrawMode, first: i32, count: i32);
    /// Indexed draw with 16-bit indices from the bound element buffer.
    fn draw_elements_base_vertex(&mut self, mode: DrawMode, count: i32, index_offset: usize, base_vertex: i32);
    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn set_scissor_test(&mut self, enabled: bool);

    // === Synchronization ===

    fn fence_sync(&mut self) -> Option<FenceHandle>;
    fn fence_signaled(&mut self, fence: FenceHandle) -> bool;
    fn client_wait_sync(&mut self, fence: FenceHandle, timeout_ns: u64) -> WaitResult;
    fn delete_sync(&mut self, fence: FenceHandle);
    fn flush(&mut self);
    fn finish(&mut self);

    // === Textures ===

    fn create_texture(&mut self) -> Result<TextureHandle>;
    fn bind_texture(&mut self, target: TextureTarget, texture: Option<TextureHandle>);
    fn tex_storage_2d(
        &mut self,
        target: TextureTarget,
        levels: i32,
        format: InternalFormat,
        width: i32,
        height: i32,
    ) -> Result<()>;
    fn tex_image_2d(
        &mut self,
        target: TextureTarget,
        level: i32,
        format: InternalFormat,
        width: i32,
        height: i32,
        pixel_format: PixelFormat,
        pixel_type: PixelType,
        source: PixelSource<'_>,
    ) -> Result<()>;
    fn tex_sub_image_2d(
        &mut self,
        target: TextureTarget,
        level: i32,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        pixel_format: PixelFormat,
        pixel_type: PixelType,
        source: PixelSource<'_>,
    );
    fn pixel_store(&mut self, param: PixelStore);
    fn tex_parameter(&mut self, target: TextureTarget, param: TexParameter);
    fn generate_mipmap(&mut self, target: TextureTarget);
    fn delete_texture(&mut self, texture: TextureHandle);

    // === Framebuffers ===

    fn create_framebuffer(&mut self) -> Result<FramebufferHandle>;
    fn bind_framebuffer(&mut self, target: FramebufferTarget, framebuffer: Option<FramebufferHandle>);
    /// The framebuffer currently bound for drawing.
    fn bound_framebuffer(&self) -> Option<FramebufferHandle>;
    fn framebuffer_texture_2d(
        &mut self,
        target: FramebufferTarget,
        attachment: Attachment,
        tex_target: TextureTarget,
        texture: Option<TextureHandle>,
        level: i32,
    );
    fn create_renderbuffer(&mut self) -> Result<RenderbufferHandle>;
    fn renderbuffer_storage(&mut self, renderbuffer: RenderbufferHandle, format: RenderbufferFormat, width: i32, height: i32);
    fn framebuffer_renderbuffer(
        &mut self,
        target: FramebufferTarget,
        attachment: Attachment,
        renderbuffer: Option<RenderbufferHandle>,
    );
    fn check_framebuffer_status(&mut self, target: FramebufferTarget) -> FramebufferStatus;
    fn blit_framebuffer(&mut self, src: BlitRect, dst: BlitRect, mask: BufferBits, linear: bool);
    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32);
    fn clear(&mut self, mask: BufferBits);
    /// Reads RGBA8 pixels from the read framebuffer into `out`.
    fn read_pixels(&mut self, x: i32, y: i32, width: i32, height: i32, out: &mut [u8]);
    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle);
    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle);

    // === Debug ===

    /// Routes driver debug messages into `log`. Returns `false` when the
    /// context has no debug output support.
    fn enable_debug_output(&mut self, verbose: bool) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_info_detects_gles() {
        let info = ContextInfo {
            version: "OpenGL ES 3.2 Mesa 24.0.1".into(),
            ..Default::default()
        };
        assert!(info.is_gles());

        let info = ContextInfo {
            version: "4.6 (Core Profile) Mesa 24.0.1".into(),
            ..Default::default()
        };
        assert!(!info.is_gles());
    }

    #[test]
    fn status_display_names_gl_enum() {
        assert_eq!(
            FramebufferStatus::IncompleteDimensions.to_string(),
            "GL_FRAMEBUFFER_INCOMPLETE_DIMENSIONS"
        );
        assert_eq!(FramebufferStatus::Unknown(0x1234).to_string(), "unknown framebuffer status 0x1234");
    }

    #[test]
    fn filter_mipmap_classification() {
        assert!(!TextureFilter::Linear.uses_mipmaps());
        assert!(TextureFilter::LinearMipmapLinear.uses_mipmaps());
    }
}
