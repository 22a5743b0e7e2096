//! CPU-side images handed to the texture upload paths.

use std::borrow::Cow;

use glam::IVec2;

use crate::errors::{GlError, Result};
use crate::renderer::viewport::Rect;

/// Memory layout of one pixel, in byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// B, G, R, A with premultiplied alpha.
    Bgra8Premultiplied,
    /// B, G, R, A with straight alpha.
    Bgra8,
    /// B, G, R and an ignored byte.
    Bgrx8,
    Rgba8Premultiplied,
    Rgba8,
    Rgbx8,
    Rgb8,
    Alpha8,
    Gray8,
    /// Little-endian 16-bit components, premultiplied.
    Rgba16Premultiplied,
}

impl ImageFormat {
    #[must_use]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Alpha8 | Self::Gray8 => 1,
            Self::Rgb8 => 3,
            Self::Rgba16Premultiplied => 8,
            _ => 4,
        }
    }

    /// Straight-alpha formats can't be blended as-is.
    #[must_use]
    pub fn needs_premultiply(self) -> bool {
        matches!(self, Self::Bgra8 | Self::Rgba8)
    }

    /// Decodes one pixel to premultiplied RGBA8.
    fn decode(self, px: &[u8]) -> [u8; 4] {
        match self {
            Self::Bgra8Premultiplied => [px[2], px[1], px[0], px[3]],
            Self::Bgra8 => premultiply([px[2], px[1], px[0], px[3]]),
            Self::Bgrx8 => [px[2], px[1], px[0], 255],
            Self::Rgba8Premultiplied => [px[0], px[1], px[2], px[3]],
            Self::Rgba8 => premultiply([px[0], px[1], px[2], px[3]]),
            Self::Rgbx8 => [px[0], px[1], px[2], 255],
            Self::Rgb8 => [px[0], px[1], px[2], 255],
            Self::Alpha8 => [0, 0, 0, px[0]],
            Self::Gray8 => [px[0], px[0], px[0], 255],
            // high byte of each little-endian component
            Self::Rgba16Premultiplied => [px[1], px[3], px[5], px[7]],
        }
    }
}

fn premultiply([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    let mul = |c: u8| ((u16::from(c) * u16::from(a) + 127) / 255) as u8;
    [mul(r), mul(g), mul(b), a]
}

/// A CPU-side image: `height` rows of `stride` bytes, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    width: i32,
    height: i32,
    stride: usize,
    format: ImageFormat,
    data: Vec<u8>,
}

impl ImageData {
    /// Tightly packed rows.
    pub fn new(width: i32, height: i32, format: ImageFormat, data: Vec<u8>) -> Result<Self> {
        let stride = width.max(0) as usize * format.bytes_per_pixel();
        Self::with_stride(width, height, stride, format, data)
    }

    pub fn with_stride(width: i32, height: i32, stride: usize, format: ImageFormat, data: Vec<u8>) -> Result<Self> {
        if width <= 0 || height <= 0 {
            return Err(GlError::InvalidImage(format!("empty image {width}x{height}")));
        }
        let row_bytes = width as usize * format.bytes_per_pixel();
        if stride < row_bytes {
            return Err(GlError::InvalidImage(format!("stride {stride} < row size {row_bytes}")));
        }
        let needed = stride * (height as usize - 1) + row_bytes;
        if data.len() < needed {
            return Err(GlError::InvalidImage(format!("{} bytes, need {needed}", data.len())));
        }
        Ok(Self {
            width,
            height,
            stride,
            format,
            data,
        })
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> i32 {
        self.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> i32 {
        self.height
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> IVec2 {
        IVec2::new(self.width, self.height)
    }

    #[inline]
    #[must_use]
    pub fn rect(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }

    #[inline]
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Row length in pixels, if the stride is a whole number of pixels.
    /// This is what `UNPACK_ROW_LENGTH` can express.
    #[must_use]
    pub fn row_length(&self) -> Option<i32> {
        let bpp = self.format.bytes_per_pixel();
        (self.stride % bpp == 0).then(|| (self.stride / bpp) as i32)
    }

    #[must_use]
    pub fn is_tightly_packed(&self) -> bool {
        self.stride == self.row_bytes()
    }

    /// Copies `rect` (clamped to the image) into a tightly packed image.
    #[must_use]
    pub fn sub_image(&self, rect: Rect) -> Option<ImageData> {
        let r = rect.intersected(&self.rect());
        if r.is_empty() {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let row_bytes = r.width as usize * bpp;
        let mut data = Vec::with_capacity(row_bytes * r.height as usize);
        for y in r.y..r.bottom() {
            let start = y as usize * self.stride + r.x as usize * bpp;
            data.extend_from_slice(&self.data[start..start + row_bytes]);
        }
        Some(Self {
            width: r.width,
            height: r.height,
            stride: row_bytes,
            format: self.format,
            data,
        })
    }

    /// The image in `target` layout. Only the premultiplied 8-bit four
    /// channel layouts are valid conversion targets.
    pub fn converted(&self, target: ImageFormat) -> Result<Cow<'_, ImageData>> {
        if target == self.format {
            return Ok(Cow::Borrowed(self));
        }
        let encode: fn([u8; 4]) -> [u8; 4] = match target {
            ImageFormat::Bgra8Premultiplied => |[r, g, b, a]| [b, g, r, a],
            ImageFormat::Rgba8Premultiplied => |p| p,
            other => {
                return Err(GlError::InvalidImage(format!("cannot convert to {other:?}")));
            }
        };

        let src_bpp = self.format.bytes_per_pixel();
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height as usize {
            let row = &self.data[y * self.stride..y * self.stride + self.row_bytes()];
            for px in row.chunks_exact(src_bpp) {
                data.extend_from_slice(&encode(self.format.decode(px)));
            }
        }
        Ok(Cow::Owned(Self {
            width: self.width,
            height: self.height,
            stride: self.width as usize * 4,
            format: target,
            data,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_buffers() {
        assert!(ImageData::new(2, 2, ImageFormat::Rgba8, vec![0; 15]).is_err());
        assert!(ImageData::with_stride(2, 2, 4, ImageFormat::Rgba8, vec![0; 16]).is_err());
        // last row needs no padding
        assert!(ImageData::with_stride(2, 2, 12, ImageFormat::Rgba8, vec![0; 20]).is_ok());
    }

    #[test]
    fn straight_alpha_is_premultiplied() {
        let img = ImageData::new(1, 1, ImageFormat::Rgba8, vec![255, 128, 0, 128]).unwrap();
        let bgra = img.converted(ImageFormat::Bgra8Premultiplied).unwrap();
        assert_eq!(bgra.data(), &[0, 64, 128, 128]);
        assert!(matches!(img.converted(ImageFormat::Rgba8), Ok(Cow::Borrowed(_))));
        assert!(img.converted(ImageFormat::Rgb8).is_err());
    }

    #[test]
    fn sub_image_honors_stride() {
        // 3x2 Gray8 rows padded to 4 bytes
        let img = ImageData::with_stride(3, 2, 4, ImageFormat::Gray8, vec![1, 2, 3, 0, 4, 5, 6, 0]).unwrap();
        assert_eq!(img.row_length(), Some(4));
        let sub = img.sub_image(Rect::new(1, 0, 2, 2)).unwrap();
        assert_eq!(sub.data(), &[2, 3, 5, 6]);
        assert!(sub.is_tightly_packed());
        assert!(img.sub_image(Rect::new(5, 5, 1, 1)).is_none());
    }
}
