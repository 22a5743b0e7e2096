//! Texture
//!
//! A [`Texture`] owns one GPU image (or borrows a foreign one) and carries
//! the state the draw paths need alongside it:
//!
//! - size, internal format and mip levels
//! - filter and wrap mode, applied lazily on the next [`bind`](Texture::bind)
//! - the y-inversion flag and the two texture-coordinate matrices derived
//!   from it
//!
//! Textures are shared as `Rc<Texture>`. Sampler state lives in `Cell`s so
//! every holder can change it through a shared reference.
//!
//! # Pixel transfer formats
//!
//! | Image layout                 | Desktop                       | GLES                        |
//! |------------------------------|-------------------------------|-----------------------------|
//! | premultiplied BGRA / BGRX    | direct                        | BGRA8 if supported, else RGBA8 |
//! | premultiplied RGBA / RGBX    | direct                        | same                        |
//! | RGB8, gray/alpha, RGBA16     | direct                        | same                        |
//! | straight alpha               | converted to premultiplied BGRA8 | same                     |

use std::cell::Cell;

use glam::{IVec2, Mat4, Vec3};

use super::image::{ImageData, ImageFormat};
use crate::errors::{GlError, Result};
use crate::platform::{Capabilities, GlFeatures, NpotSupport};
use crate::renderer::core::device::{
    GraphicsDevice, InternalFormat, PixelFormat, PixelSource, PixelStore, PixelType, Swizzle,
    TexParameter, TextureFilter, TextureHandle, TextureTarget, WrapMode,
};
use crate::renderer::core::release::{GpuResource, ReleaseQueue};
use crate::renderer::viewport::Rect;

/// The texture-relevant slice of [`Capabilities`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSupport {
    pub is_gles: bool,
    pub texture_storage: bool,
    pub swizzle: bool,
    pub argb32: bool,
    /// `UNPACK_ROW_LENGTH` and friends are available.
    pub unpack_subimage: bool,
    pub limited_npot: bool,
}

impl TextureSupport {
    #[must_use]
    pub fn from_capabilities(caps: &Capabilities) -> Self {
        Self {
            is_gles: caps.is_gles,
            texture_storage: caps.supports(GlFeatures::TEXTURE_STORAGE),
            swizzle: caps.supports(GlFeatures::TEXTURE_SWIZZLE),
            argb32: caps.supports(GlFeatures::ARGB32_TEXTURES),
            unpack_subimage: !caps.is_gles || caps.supports(GlFeatures::UNPACK_SUBIMAGE),
            limited_npot: caps.npot == NpotSupport::Limited,
        }
    }

    /// Client format used for zero-filling and generic BGRA uploads.
    fn native_pixel_format(&self) -> PixelFormat {
        if self.is_gles && !self.argb32 {
            PixelFormat::Rgba
        } else {
            PixelFormat::Bgra
        }
    }
}

/// How an image is handed to `glTex(Sub)Image2D`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferFormat {
    pub internal_format: InternalFormat,
    pub pixel_format: PixelFormat,
    pub pixel_type: PixelType,
    /// Layout the image must be converted to first.
    pub upload_format: ImageFormat,
}

impl TransferFormat {
    const fn new(internal_format: InternalFormat, pixel_format: PixelFormat, pixel_type: PixelType, upload_format: ImageFormat) -> Self {
        Self {
            internal_format,
            pixel_format,
            pixel_type,
            upload_format,
        }
    }

    /// Picks the transfer for `format`: the image's own layout when the
    /// driver takes it, premultiplied BGRA8 (RGBA8 on GLES without BGRA)
    /// otherwise.
    #[must_use]
    pub fn for_image(format: ImageFormat, support: &TextureSupport) -> Self {
        use ImageFormat as F;
        use InternalFormat as I;
        use PixelFormat as P;
        const UB: PixelType = PixelType::UnsignedByte;

        if support.is_gles {
            return if support.argb32 {
                Self::new(I::Bgra8, P::Bgra, UB, F::Bgra8Premultiplied)
            } else {
                Self::new(I::Rgba8, P::Rgba, UB, F::Rgba8Premultiplied)
            };
        }
        match format {
            F::Bgrx8 => Self::new(I::Rgb8, P::Bgra, UB, format),
            F::Bgra8Premultiplied => Self::new(I::Rgba8, P::Bgra, UB, format),
            F::Rgbx8 => Self::new(I::Rgb8, P::Rgba, UB, format),
            F::Rgba8Premultiplied => Self::new(I::Rgba8, P::Rgba, UB, format),
            F::Rgb8 => Self::new(I::Rgb8, P::Rgb, UB, format),
            F::Alpha8 | F::Gray8 => Self::new(I::R8, P::Red, UB, format),
            F::Rgba16Premultiplied => Self::new(I::Rgba16, P::Rgba, PixelType::UnsignedShort, format),
            F::Bgra8 | F::Rgba8 => Self::new(I::Rgba8, P::Bgra, UB, F::Bgra8Premultiplied),
        }
    }
}

/// Which of the two texture matrices to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinateType {
    /// Texture coordinates in `[0, 1]`.
    Normalized,
    /// Texture coordinates in texels.
    Unnormalized,
}

fn is_power_of_two(v: i32) -> bool {
    v > 0 && (v & (v - 1)) == 0
}

/// Rows of 1- and 3-byte pixels aren't 4-byte aligned; the default unpack
/// alignment would skew them.
pub(super) fn set_unpack_alignment(device: &mut dyn GraphicsDevice, format: ImageFormat, active: bool) {
    if format.bytes_per_pixel() % 4 != 0 {
        device.pixel_store(PixelStore::UnpackAlignment(if active { 1 } else { 4 }));
    }
}

/// One GPU image and its sampling state.
pub struct Texture {
    handle: TextureHandle,
    target: TextureTarget,
    internal_format: InternalFormat,
    size: IVec2,
    levels: i32,
    owning: bool,
    can_use_mipmaps: bool,
    npot_limited: bool,
    support: TextureSupport,

    filter: Cell<TextureFilter>,
    wrap_mode: Cell<WrapMode>,
    filter_dirty: Cell<bool>,
    wrap_dirty: Cell<bool>,
    y_inverted: Cell<bool>,
    matrices: Cell<[Mat4; 2]>,

    release: Option<ReleaseQueue>,
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("handle", &self.handle)
            .field("size", &self.size)
            .field("format", &self.internal_format)
            .field("owning", &self.owning)
            .finish_non_exhaustive()
    }
}

impl Texture {
    fn from_parts(
        handle: TextureHandle,
        target: TextureTarget,
        internal_format: InternalFormat,
        size: IVec2,
        levels: i32,
        support: TextureSupport,
        release: Option<ReleaseQueue>,
    ) -> Self {
        let npot_limited = support.limited_npot && !(is_power_of_two(size.x) && is_power_of_two(size.y));
        let texture = Self {
            handle,
            target,
            internal_format,
            size,
            levels,
            owning: release.is_some(),
            can_use_mipmaps: levels > 1 && !npot_limited,
            npot_limited,
            support,
            filter: Cell::new(if levels > 1 {
                TextureFilter::NearestMipmapLinear
            } else {
                TextureFilter::Nearest
            }),
            wrap_mode: Cell::new(WrapMode::Repeat),
            filter_dirty: Cell::new(true),
            wrap_dirty: Cell::new(false),
            y_inverted: Cell::new(false),
            matrices: Cell::new([Mat4::IDENTITY; 2]),
            release,
        };
        if npot_limited {
            texture.wrap_mode.set(WrapMode::ClampToEdge);
            texture.wrap_dirty.set(true);
        }
        texture.update_matrices();
        texture
    }

    /// Allocates uninitialized storage with `levels` mip levels.
    ///
    /// On GLES the storage format follows the upload format (BGRA8 or
    /// RGBA8); [`internal_format`](Self::internal_format) still reports
    /// `format` so callers need not special-case it.
    pub fn allocate(
        device: &mut dyn GraphicsDevice,
        release: ReleaseQueue,
        support: TextureSupport,
        format: InternalFormat,
        size: IVec2,
        levels: i32,
    ) -> Result<Self> {
        let handle = device.create_texture()?;
        let target = TextureTarget::Texture2D;
        device.bind_texture(target, Some(handle));

        let allocated = if !support.is_gles {
            if support.texture_storage {
                device.tex_storage_2d(target, levels, format, size.x, size.y)
            } else {
                device.tex_parameter(target, TexParameter::MaxLevel(levels - 1));
                device.tex_image_2d(target, 0, format, size.x, size.y, PixelFormat::Bgra, PixelType::UnsignedByte, PixelSource::Empty)
            }
        } else {
            let pixel_format = support.native_pixel_format();
            let storage = if pixel_format == PixelFormat::Bgra {
                InternalFormat::Bgra8
            } else {
                InternalFormat::Rgba8
            };
            device.tex_image_2d(target, 0, storage, size.x, size.y, pixel_format, PixelType::UnsignedByte, PixelSource::Empty)
        };
        device.bind_texture(target, None);

        if let Err(e) = allocated {
            log::warn!("Failed to allocate {}x{} {format:?} texture: {e}", size.x, size.y);
            device.delete_texture(handle);
            return Err(e);
        }
        Ok(Self::from_parts(handle, target, format, size, levels, support, Some(release)))
    }

    /// Creates a texture holding `image`. The image is top row first, so the
    /// texture is y-inverted.
    pub fn upload(device: &mut dyn GraphicsDevice, release: ReleaseQueue, support: TextureSupport, image: &ImageData) -> Result<Self> {
        let transfer = TransferFormat::for_image(image.format(), &support);
        let converted = image.converted(transfer.upload_format)?;
        let unpack = support.unpack_subimage.then(|| converted.row_length()).flatten();
        let packed;
        let im: &ImageData = if unpack.is_some() || converted.is_tightly_packed() {
            &converted
        } else {
            packed = converted
                .sub_image(converted.rect())
                .ok_or_else(|| GlError::InvalidImage("empty image".into()))?;
            &packed
        };

        let handle = device.create_texture()?;
        let target = TextureTarget::Texture2D;
        let (w, h) = (im.width(), im.height());
        device.bind_texture(target, Some(handle));
        set_unpack_alignment(device, im.format(), true);
        if let Some(row_length) = unpack {
            device.pixel_store(PixelStore::UnpackRowLength(row_length));
        }

        let source = PixelSource::Slice(im.data());
        let result = if !support.is_gles && support.texture_storage {
            device.tex_storage_2d(target, 1, transfer.internal_format, w, h).map(|()| {
                device.tex_sub_image_2d(target, 0, 0, 0, w, h, transfer.pixel_format, transfer.pixel_type, source);
            })
        } else {
            if !support.is_gles {
                device.tex_parameter(target, TexParameter::MaxLevel(0));
            }
            device.tex_image_2d(target, 0, transfer.internal_format, w, h, transfer.pixel_format, transfer.pixel_type, source)
        };

        if unpack.is_some() {
            device.pixel_store(PixelStore::UnpackRowLength(0));
        }
        set_unpack_alignment(device, im.format(), false);
        device.bind_texture(target, None);

        if let Err(e) = result {
            device.delete_texture(handle);
            return Err(e);
        }
        let texture = Self::from_parts(handle, target, transfer.internal_format, image.size(), 1, support, Some(release));
        texture.set_filter(TextureFilter::Linear);
        texture.set_y_inverted(true);
        Ok(texture)
    }

    /// Wraps a texture owned elsewhere. Dropping the wrapper leaves the GPU
    /// object alone and [`update`](Self::update) is refused.
    #[must_use]
    pub fn wrap_foreign(
        handle: TextureHandle,
        target: TextureTarget,
        internal_format: InternalFormat,
        size: IVec2,
        support: TextureSupport,
    ) -> Self {
        Self::from_parts(handle, target, internal_format, size, 1, support, None)
    }

    // === Accessors ===

    #[inline]
    #[must_use]
    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    #[inline]
    #[must_use]
    pub fn target(&self) -> TextureTarget {
        self.target
    }

    #[inline]
    #[must_use]
    pub fn internal_format(&self) -> InternalFormat {
        self.internal_format
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> IVec2 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> i32 {
        self.size.x
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> i32 {
        self.size.y
    }

    #[inline]
    #[must_use]
    pub fn levels(&self) -> i32 {
        self.levels
    }

    #[inline]
    #[must_use]
    pub fn is_owning(&self) -> bool {
        self.owning
    }

    #[inline]
    #[must_use]
    pub fn can_use_mipmaps(&self) -> bool {
        self.can_use_mipmaps
    }

    #[inline]
    #[must_use]
    pub fn filter(&self) -> TextureFilter {
        self.filter.get()
    }

    #[inline]
    #[must_use]
    pub fn wrap_mode(&self) -> WrapMode {
        self.wrap_mode.get()
    }

    #[inline]
    #[must_use]
    pub fn is_y_inverted(&self) -> bool {
        self.y_inverted.get()
    }

    /// How an image of `format` is transferred into this texture.
    #[must_use]
    pub fn transfer_format(&self, format: ImageFormat) -> TransferFormat {
        TransferFormat::for_image(format, &self.support)
    }

    #[must_use]
    pub fn matrix(&self, kind: CoordinateType) -> Mat4 {
        let [normalized, unnormalized] = self.matrices.get();
        match kind {
            CoordinateType::Normalized => normalized,
            CoordinateType::Unnormalized => unnormalized,
        }
    }

    // === Sampling State ===

    pub fn set_filter(&self, filter: TextureFilter) {
        if self.filter.get() != filter {
            self.filter.set(filter);
            self.filter_dirty.set(true);
        }
    }

    /// Ignored for anything but clamp-to-edge on limited-NPOT hardware when
    /// the size is not a power of two.
    pub fn set_wrap_mode(&self, mode: WrapMode) {
        if self.npot_limited && mode != WrapMode::ClampToEdge {
            log::debug!("Wrap mode {mode:?} unavailable for NPOT texture, keeping clamp-to-edge");
            return;
        }
        if self.wrap_mode.get() != mode {
            self.wrap_mode.set(mode);
            self.wrap_dirty.set(true);
        }
    }

    pub fn set_y_inverted(&self, inverted: bool) {
        if self.y_inverted.get() != inverted {
            self.y_inverted.set(inverted);
            self.update_matrices();
        }
    }

    /// Effective `(min, mag)` filters: mipmap filters fall back to their
    /// base filter when the texture has no usable mip chain.
    #[must_use]
    pub fn resolved_filters(&self) -> (TextureFilter, TextureFilter) {
        use TextureFilter as F;
        let filter = self.filter.get();
        match filter {
            F::Nearest | F::Linear => (filter, filter),
            F::NearestMipmapNearest | F::NearestMipmapLinear => {
                (if self.can_use_mipmaps { filter } else { F::Nearest }, F::Nearest)
            }
            F::LinearMipmapNearest | F::LinearMipmapLinear => {
                (if self.can_use_mipmaps { filter } else { F::Linear }, F::Linear)
            }
        }
    }

    /// Binds the texture and flushes pending filter/wrap changes.
    pub fn bind(&self, device: &mut dyn GraphicsDevice) {
        device.bind_texture(self.target, Some(self.handle));
        if self.filter_dirty.replace(false) {
            let (min, mag) = self.resolved_filters();
            device.tex_parameter(self.target, TexParameter::MinFilter(min));
            device.tex_parameter(self.target, TexParameter::MagFilter(mag));
        }
        if self.wrap_dirty.replace(false) {
            let mode = self.wrap_mode.get();
            device.tex_parameter(self.target, TexParameter::WrapS(mode));
            device.tex_parameter(self.target, TexParameter::WrapT(mode));
        }
    }

    pub fn unbind(&self, device: &mut dyn GraphicsDevice) {
        device.bind_texture(self.target, None);
    }

    /// Returns `false` when the context can't swizzle; the caller must then
    /// reorder channels in the shader instead.
    pub fn set_swizzle(&self, device: &mut dyn GraphicsDevice, swizzle: [Swizzle; 4]) -> bool {
        if !self.support.swizzle {
            return false;
        }
        device.bind_texture(self.target, Some(self.handle));
        device.tex_parameter(self.target, TexParameter::Swizzle(swizzle));
        true
    }

    pub fn generate_mipmaps(&self, device: &mut dyn GraphicsDevice) {
        if self.can_use_mipmaps {
            self.bind(device);
            device.generate_mipmap(self.target);
            self.unbind(device);
        }
    }

    // === Pixel Transfer ===

    /// Uploads the parts of `image` covered by `region` to the texture at
    /// `offset`. An empty region means the whole image.
    pub fn update(&self, device: &mut dyn GraphicsDevice, image: &ImageData, region: &[Rect], offset: IVec2) -> Result<()> {
        if !self.owning {
            return Err(GlError::Unsupported("update of a foreign texture"));
        }
        let transfer = TransferFormat::for_image(image.format(), &self.support);
        let im = image.converted(transfer.upload_format)?;
        let row_length = im.row_length().filter(|_| self.support.unpack_subimage);

        let full = [im.rect()];
        let rects = if region.is_empty() { &full[..] } else { region };

        self.bind(device);
        set_unpack_alignment(device, im.format(), true);
        for rect in rects {
            let r = rect.intersected(&im.rect());
            if r.is_empty() {
                continue;
            }
            let (x, y) = (offset.x + r.x, offset.y + r.y);
            match row_length {
                Some(row_length) => {
                    device.pixel_store(PixelStore::UnpackRowLength(row_length));
                    device.pixel_store(PixelStore::UnpackSkipPixels(r.x));
                    device.pixel_store(PixelStore::UnpackSkipRows(r.y));
                    device.tex_sub_image_2d(
                        self.target,
                        0,
                        x,
                        y,
                        r.width,
                        r.height,
                        transfer.pixel_format,
                        transfer.pixel_type,
                        PixelSource::Slice(im.data()),
                    );
                }
                None => {
                    let Some(sub) = im.sub_image(r) else { continue };
                    device.tex_sub_image_2d(
                        self.target,
                        0,
                        x,
                        y,
                        r.width,
                        r.height,
                        transfer.pixel_format,
                        transfer.pixel_type,
                        PixelSource::Slice(sub.data()),
                    );
                }
            }
        }
        if row_length.is_some() {
            device.pixel_store(PixelStore::UnpackRowLength(0));
            device.pixel_store(PixelStore::UnpackSkipPixels(0));
            device.pixel_store(PixelStore::UnpackSkipRows(0));
        }
        set_unpack_alignment(device, im.format(), false);
        self.unbind(device);
        Ok(())
    }

    /// Zero-fills level 0.
    pub fn clear(&self, device: &mut dyn GraphicsDevice) {
        let zeros = vec![0u8; (self.size.x.max(0) * self.size.y.max(0) * 4) as usize];
        self.bind(device);
        device.tex_sub_image_2d(
            self.target,
            0,
            0,
            0,
            self.size.x,
            self.size.y,
            self.support.native_pixel_format(),
            PixelType::UnsignedByte,
            PixelSource::Slice(&zeros),
        );
        self.unbind(device);
    }

    fn update_matrices(&self) {
        let (w, h) = (self.size.x.max(1) as f32, self.size.y.max(1) as f32);
        let (mut normalized, mut unnormalized) = match self.target {
            TextureTarget::Rectangle => (Mat4::from_scale(Vec3::new(w, h, 1.0)), Mat4::IDENTITY),
            TextureTarget::Texture2D => (Mat4::IDENTITY, Mat4::from_scale(Vec3::new(1.0 / w, 1.0 / h, 1.0))),
        };
        if !self.y_inverted.get() {
            let flip = Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0));
            normalized = normalized * Mat4::from_translation(Vec3::Y) * flip;
            unnormalized = unnormalized * Mat4::from_translation(Vec3::new(0.0, h, 0.0)) * flip;
        }
        self.matrices.set([normalized, unnormalized]);
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if let Some(release) = &self.release {
            release.push(GpuResource::Texture(self.handle));
        }
    }
}
