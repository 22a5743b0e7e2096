//! Shared quad index buffer.
//!
//! Quads are drawn as indexed triangles. Quad `i` uses vertices `4i..4i+4`
//! and the indices `4i + [1, 0, 3, 3, 2, 1]`; base-vertex draws make the
//! same indices valid for any run of quads in the vertex buffer.

use crate::errors::{GlError, Result};
use crate::platform::{Capabilities, GlFeatures};
use crate::renderer::core::device::{BufferHandle, BufferTarget, BufferUsage, GraphicsDevice, MapAccess};
use crate::renderer::core::release::{GpuResource, ReleaseQueue};

const INITIAL_QUADS: usize = 512;
/// 16-bit indices address at most 65536 vertices.
pub const MAX_QUADS: usize = 16_384;
const QUAD_PATTERN: [u16; 6] = [1, 0, 3, 3, 2, 1];

pub struct IndexBuffer {
    buffer: Option<BufferHandle>,
    quads: usize,
    release: ReleaseQueue,
}

impl IndexBuffer {
    /// Indexed quads need base-vertex draws, buffer copies and range maps.
    #[must_use]
    pub fn is_supported(caps: &Capabilities) -> bool {
        caps.supports(GlFeatures::INDEXED_QUADS | GlFeatures::MAP_BUFFER_RANGE)
    }

    #[must_use]
    pub fn new(release: ReleaseQueue) -> Self {
        Self {
            buffer: None,
            quads: 0,
            release,
        }
    }

    /// Number of quads the buffer currently holds indices for.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.quads
    }

    #[must_use]
    pub fn handle(&self) -> Option<BufferHandle> {
        self.buffer
    }

    /// Binds the buffer as element array, creating it on first use.
    pub fn bind(&mut self, device: &mut dyn GraphicsDevice) -> Result<()> {
        if self.buffer.is_none() {
            self.accommodate(device, INITIAL_QUADS)?;
        }
        device.bind_buffer(BufferTarget::ElementArray, self.buffer);
        Ok(())
    }

    /// Grows the buffer to hold at least `quads` quads. The existing indices
    /// are copied on the GPU and only the new tail is written.
    pub fn accommodate(&mut self, device: &mut dyn GraphicsDevice, quads: usize) -> Result<()> {
        if quads <= self.quads {
            return Ok(());
        }
        if quads > MAX_QUADS {
            return Err(GlError::OutOfBounds {
                offset: 0,
                len: quads,
                capacity: MAX_QUADS,
            });
        }
        let count = quads.div_ceil(128).max(1) * 128;
        let count = count.max(INITIAL_QUADS).min(MAX_QUADS);
        let old_size = self.quads * QUAD_PATTERN.len() * 2;
        let size = count * QUAD_PATTERN.len() * 2;

        let buffer = device.create_buffer()?;
        device.bind_buffer(BufferTarget::CopyWrite, Some(buffer));
        device.buffer_data(BufferTarget::CopyWrite, size, None, BufferUsage::Static);

        if let Some(old) = self.buffer.take() {
            device.bind_buffer(BufferTarget::CopyRead, Some(old));
            device.copy_buffer_sub_data(BufferTarget::CopyRead, BufferTarget::CopyWrite, 0, 0, old_size);
            device.bind_buffer(BufferTarget::CopyRead, None);
            device.delete_buffer(old);
            // r600g needs the copy submitted before the map
            device.flush();
        }

        let tail = quad_indices(self.quads, count);
        let access = MapAccess::WRITE | MapAccess::UNSYNCHRONIZED | MapAccess::INVALIDATE_RANGE;
        match device.map_buffer_range(BufferTarget::CopyWrite, old_size, size - old_size, access) {
            Some(dst) => {
                dst.copy_from_slice(&tail);
                device.unmap_buffer(BufferTarget::CopyWrite);
            }
            None => device.buffer_sub_data(BufferTarget::CopyWrite, old_size, &tail),
        }
        device.bind_buffer(BufferTarget::CopyWrite, None);

        log::debug!("Quad index buffer grown from {} to {count} quads", self.quads);
        self.quads = count;
        self.buffer = Some(buffer);
        device.bind_buffer(BufferTarget::ElementArray, self.buffer);
        Ok(())
    }
}

/// Little-endian index bytes for quads `from..to`.
fn quad_indices(from: usize, to: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity((to - from) * QUAD_PATTERN.len() * 2);
    for quad in from..to {
        let first = (quad * 4) as u16;
        for index in QUAD_PATTERN {
            bytes.extend_from_slice(&(first + index).to_le_bytes());
        }
    }
    bytes
}

impl Drop for IndexBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.release.push(GpuResource::Buffer(buffer));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::core::headless::HeadlessDevice;

    fn index_at(bytes: &[u8], i: usize) -> u16 {
        u16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]])
    }

    #[test]
    fn growth_preserves_existing_indices() {
        let mut dev = HeadlessDevice::new();
        let mut indices = IndexBuffer::new(ReleaseQueue::new());
        indices.bind(&mut dev).unwrap();
        assert_eq!(indices.capacity(), 512);

        indices.accommodate(&mut dev, 700).unwrap();
        assert_eq!(indices.capacity(), 768);
        assert_eq!(dev.buffer_count(), 1);

        let bytes = dev.buffer_contents(indices.handle().unwrap()).unwrap();
        assert_eq!(bytes.len(), 768 * 12);
        let first: Vec<u16> = (0..6).map(|i| index_at(bytes, i)).collect();
        assert_eq!(first, [1, 0, 3, 3, 2, 1]);
        // quad 600 was written by the second fill
        assert_eq!(index_at(bytes, 600 * 6 + 1), 2400);
    }

    #[test]
    fn rejects_more_than_sixteen_bit_range() {
        let mut dev = HeadlessDevice::new();
        let mut indices = IndexBuffer::new(ReleaseQueue::new());
        assert!(indices.accommodate(&mut dev, MAX_QUADS).is_ok());
        assert!(matches!(
            indices.accommodate(&mut dev, MAX_QUADS + 1),
            Err(GlError::OutOfBounds { .. })
        ));
    }
}
