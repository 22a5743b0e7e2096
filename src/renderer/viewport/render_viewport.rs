use glam::{Mat4, Vec2, Vec3};

use super::output_transform::OutputTransform;
use super::rect::{Rect, RectF, Region};
use super::render_target::RenderTarget;

/// Maps a logical rectangle of the desktop onto a [`RenderTarget`].
///
/// Logical coordinates are scaled, moved so the render rect's origin lands
/// at the target's origin and then transformed into the buffer orientation:
///
/// ```text
/// logical ──× scale──► device ──− origin──► viewport ──transform──► buffer pixels
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderViewport {
    transform: OutputTransform,
    /// Target size before the transform.
    transform_bounds: Vec2,
    target_size: Vec2,
    render_rect: RectF,
    device_render_rect: RectF,
    scale: f32,
    logical_to_device: Mat4,
    projection: Mat4,
}

impl RenderViewport {
    #[must_use]
    pub fn new(render_rect: RectF, scale: f32, target: &RenderTarget) -> Self {
        let transform = target.transform();
        let transform_bounds = target.logical_size();
        let target_size = target.size().as_vec2();
        let device_render_rect = RectF::from(render_rect.scaled(scale).snapped());

        let logical_to_device = transform.pixel_matrix(transform_bounds)
            * Mat4::from_translation((-device_render_rect.top_left()).extend(0.0))
            * Mat4::from_scale(Vec3::new(scale, scale, 1.0));
        let ortho = Mat4::orthographic_rh_gl(0.0, target_size.x, target_size.y, 0.0, -1.0, 1.0);

        Self {
            transform,
            transform_bounds,
            target_size,
            render_rect,
            device_render_rect,
            scale,
            logical_to_device,
            projection: ortho * logical_to_device,
        }
    }

    /// Logical coordinates → clip space.
    #[inline]
    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    /// Logical coordinates → buffer pixels (y-down).
    #[inline]
    #[must_use]
    pub fn logical_to_device_matrix(&self) -> Mat4 {
        self.logical_to_device
    }

    #[inline]
    #[must_use]
    pub fn render_rect(&self) -> RectF {
        self.render_rect
    }

    #[inline]
    #[must_use]
    pub fn device_render_rect(&self) -> RectF {
        self.device_render_rect
    }

    #[inline]
    #[must_use]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    #[inline]
    #[must_use]
    pub fn transform(&self) -> OutputTransform {
        self.transform
    }

    #[must_use]
    pub fn map_to_render_target(&self, logical: RectF) -> RectF {
        let device = logical
            .scaled(self.scale)
            .translated(-self.device_render_rect.top_left());
        self.transform.map_rect(device, self.transform_bounds)
    }

    #[must_use]
    pub fn map_to_render_target_point(&self, logical: Vec2) -> Vec2 {
        let device = logical * self.scale - self.device_render_rect.top_left();
        self.transform.map_point(device, self.transform_bounds)
    }

    /// Snaps to the pixel grid before transforming, so edges stay exact.
    #[must_use]
    pub fn map_to_render_target_rect(&self, logical: Rect) -> Rect {
        let origin = self.device_render_rect.snapped();
        let device = RectF::from(logical)
            .scaled(self.scale)
            .snapped()
            .translated(-origin.x, -origin.y);
        let bounds = self.transform_bounds.round().as_ivec2();
        self.transform.map_rect_i(device, (bounds.x, bounds.y))
    }

    #[must_use]
    pub fn map_to_render_target_region(&self, logical: &[Rect]) -> Region {
        logical.iter().map(|r| self.map_to_render_target_rect(*r)).collect()
    }

    /// Buffer pixels → logical coordinates.
    #[must_use]
    pub fn map_from_render_target(&self, device: RectF) -> RectF {
        self.transform
            .inverted()
            .map_rect(device, self.target_size)
            .translated(self.device_render_rect.top_left())
            .scaled(1.0 / self.scale)
    }

    /// Like [`map_to_render_target`](Self::map_to_render_target), normalized
    /// to `[0, 1]` texture coordinates of the target's color texture (y up).
    #[must_use]
    pub fn map_to_render_target_texture(&self, logical: RectF) -> RectF {
        let r = self.map_to_render_target(logical);
        let (w, h) = (self.target_size.x, self.target_size.y);
        RectF::new(r.x / w, 1.0 - (r.y + r.height) / h, r.width / w, r.height / h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec2;

    #[test]
    fn identity_viewport_is_passthrough() {
        let target = RenderTarget::surface(IVec2::new(100, 50), OutputTransform::Normal);
        let vp = RenderViewport::new(RectF::new(0.0, 0.0, 100.0, 50.0), 1.0, &target);
        let r = RectF::new(10.0, 5.0, 20.0, 10.0);
        assert_eq!(vp.map_to_render_target(r), r);

        let clip = vp.projection_matrix().project_point3(Vec3::new(0.0, 0.0, 0.0));
        assert!((clip.x + 1.0).abs() < 1e-5 && (clip.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn texture_mapping_flips_y() {
        let target = RenderTarget::surface(IVec2::new(100, 100), OutputTransform::Normal);
        let vp = RenderViewport::new(RectF::new(0.0, 0.0, 100.0, 100.0), 1.0, &target);
        let t = vp.map_to_render_target_texture(RectF::new(0.0, 0.0, 50.0, 25.0));
        assert!(t.approx_eq(&RectF::new(0.0, 0.75, 0.5, 0.25), 1e-6));
    }
}
