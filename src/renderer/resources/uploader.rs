//! Texture uploads from CPU images.
//!
//! Two paths exist:
//! - **Staging**: the converted image is copied into a reused pixel-unpack
//!   buffer and transferred in one full-image call. The buffer only grows.
//! - **Direct**: every dirty rectangle is transferred on its own through
//!   [`Texture::update`].

use glam::IVec2;

use super::image::ImageData;
use super::texture::{Texture, set_unpack_alignment};
use crate::errors::{GlError, Result};
use crate::renderer::core::device::{BufferHandle, BufferTarget, BufferUsage, GraphicsDevice, MapAccess, PixelSource};
use crate::renderer::core::release::{GpuResource, ReleaseQueue};
use crate::renderer::viewport::Rect;

pub struct TextureUploader {
    staging: Option<BufferHandle>,
    capacity: usize,
    use_staging: bool,
    release: ReleaseQueue,
}

impl TextureUploader {
    /// `use_staging` should already account for pixel-unpack buffer
    /// support; the context passes `settings.staging_upload && caps.pbo`.
    #[must_use]
    pub fn new(release: ReleaseQueue, use_staging: bool) -> Self {
        Self {
            staging: None,
            capacity: 0,
            use_staging,
            release,
        }
    }

    #[must_use]
    pub fn uses_staging(&self) -> bool {
        self.use_staging
    }

    /// Current size of the staging buffer in bytes.
    #[must_use]
    pub fn staging_capacity(&self) -> usize {
        self.capacity
    }

    /// Brings `texture` up to date with `image`. `dirty` limits the direct
    /// path to those rectangles; staging always transfers the whole image.
    pub fn upload(&mut self, device: &mut dyn GraphicsDevice, texture: &Texture, image: &ImageData, dirty: &[Rect]) -> Result<()> {
        if image.width() > texture.width() || image.height() > texture.height() {
            return Err(GlError::InvalidImage(format!(
                "{}x{} image exceeds {}x{} texture",
                image.width(),
                image.height(),
                texture.width(),
                texture.height()
            )));
        }
        if !self.use_staging || !texture.is_owning() {
            return texture.update(device, image, dirty, IVec2::ZERO);
        }
        self.upload_staged(device, texture, image)
    }

    fn upload_staged(&mut self, device: &mut dyn GraphicsDevice, texture: &Texture, image: &ImageData) -> Result<()> {
        let transfer = texture.transfer_format(image.format());
        let converted = image.converted(transfer.upload_format)?;
        let packed;
        let pixels: &[u8] = if converted.is_tightly_packed() {
            converted.data()
        } else {
            packed = converted
                .sub_image(converted.rect())
                .ok_or_else(|| GlError::InvalidImage("empty image".into()))?;
            packed.data()
        };

        let pbo = match self.staging {
            Some(pbo) => pbo,
            None => {
                let pbo = device.create_buffer()?;
                self.staging = Some(pbo);
                pbo
            }
        };
        device.bind_buffer(BufferTarget::PixelUnpack, Some(pbo));
        if pixels.len() > self.capacity {
            log::debug!("Growing staging upload buffer from {} to {} bytes", self.capacity, pixels.len());
            device.buffer_data(BufferTarget::PixelUnpack, pixels.len(), None, BufferUsage::Stream);
            self.capacity = pixels.len();
        }

        let access = MapAccess::WRITE | MapAccess::INVALIDATE_BUFFER;
        match device.map_buffer_range(BufferTarget::PixelUnpack, 0, pixels.len(), access) {
            Some(dst) => {
                dst.copy_from_slice(pixels);
                if !device.unmap_buffer(BufferTarget::PixelUnpack) {
                    log::warn!("Staging buffer contents lost during upload, retrying with sub-data");
                    device.buffer_sub_data(BufferTarget::PixelUnpack, 0, pixels);
                }
            }
            None => device.buffer_sub_data(BufferTarget::PixelUnpack, 0, pixels),
        }

        texture.bind(device);
        set_unpack_alignment(device, converted.format(), true);
        device.tex_sub_image_2d(
            texture.target(),
            0,
            0,
            0,
            converted.width(),
            converted.height(),
            transfer.pixel_format,
            transfer.pixel_type,
            PixelSource::UnpackBuffer(0),
        );
        set_unpack_alignment(device, converted.format(), false);
        texture.unbind(device);
        device.bind_buffer(BufferTarget::PixelUnpack, None);
        Ok(())
    }
}

impl Drop for TextureUploader {
    fn drop(&mut self) {
        if let Some(pbo) = self.staging.take() {
            self.release.push(GpuResource::Buffer(pbo));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::core::device::InternalFormat;
    use crate::renderer::core::headless::HeadlessDevice;
    use crate::renderer::resources::image::ImageFormat;
    use crate::renderer::resources::texture::TextureSupport;

    fn support() -> TextureSupport {
        TextureSupport {
            is_gles: false,
            texture_storage: true,
            swizzle: true,
            argb32: true,
            unpack_subimage: true,
            limited_npot: false,
        }
    }

    fn solid(w: i32, h: i32, rgba: [u8; 4]) -> ImageData {
        ImageData::new(w, h, ImageFormat::Rgba8Premultiplied, rgba.repeat((w * h) as usize)).unwrap()
    }

    #[test]
    fn staging_buffer_only_grows() {
        let mut dev = HeadlessDevice::new();
        let release = ReleaseQueue::new();
        let tex = Texture::allocate(&mut dev, release.clone(), support(), InternalFormat::Rgba8, IVec2::new(8, 8), 1).unwrap();
        let mut uploader = TextureUploader::new(release.clone(), true);

        uploader.upload(&mut dev, &tex, &solid(8, 8, [1, 2, 3, 4]), &[]).unwrap();
        assert_eq!(uploader.staging_capacity(), 256);
        let allocations = dev.stats().buffer_allocations;

        uploader.upload(&mut dev, &tex, &solid(4, 4, [9, 9, 9, 9]), &[]).unwrap();
        assert_eq!(uploader.staging_capacity(), 256);
        assert_eq!(dev.stats().buffer_allocations, allocations);
        assert_eq!(dev.stats().unpack_buffer_uploads, 2);
        assert_eq!(&dev.texture(tex.handle()).unwrap().pixels[..4], &[9, 9, 9, 9]);

        drop(uploader);
        assert_eq!(release.len(), 1);
    }

    #[test]
    fn direct_path_updates_dirty_rects_only() {
        let mut dev = HeadlessDevice::new();
        let release = ReleaseQueue::new();
        let tex = Texture::allocate(&mut dev, release.clone(), support(), InternalFormat::Rgba8, IVec2::new(4, 4), 1).unwrap();
        let mut uploader = TextureUploader::new(release, false);

        uploader
            .upload(&mut dev, &tex, &solid(4, 4, [255, 0, 0, 255]), &[Rect::new(2, 2, 2, 2)])
            .unwrap();
        let pixels = &dev.texture(tex.handle()).unwrap().pixels;
        assert_eq!(&pixels[..4], &[0, 0, 0, 0]);
        let corner = ((3 * 4 + 3) * 4) as usize;
        assert_eq!(&pixels[corner..corner + 4], &[255, 0, 0, 255]);
        assert_eq!(dev.stats().unpack_buffer_uploads, 0);
    }

    #[test]
    fn oversized_image_is_rejected() {
        let mut dev = HeadlessDevice::new();
        let release = ReleaseQueue::new();
        let tex = Texture::allocate(&mut dev, release.clone(), support(), InternalFormat::Rgba8, IVec2::new(2, 2), 1).unwrap();
        let mut uploader = TextureUploader::new(release, true);
        assert!(uploader.upload(&mut dev, &tex, &solid(3, 2, [0; 4]), &[]).is_err());
    }
}
