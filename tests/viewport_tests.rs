//! Viewport mapping tests
//!
//! Tests for:
//! - Logical → buffer → logical round trips for every output transform
//! - Render rects covering exactly the target, at fractional scales
//! - Integer region mapping staying inside the target
//! - Projection of render rect corners onto clip-space corners

use glam::{IVec2, Vec2};
use glpipe::{OutputTransform, Rect, RectF, RenderTarget, RenderViewport};

// ============================================================================
// Helper
// ============================================================================

const EPSILON: f32 = 1e-3;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

const SCALES: [f32; 3] = [1.0, 1.5, 2.0];

/// Device size of every target in these tests.
const TARGET: IVec2 = IVec2::new(300, 200);

/// A viewport whose render rect, at `scale`, exactly fills the target.
fn viewport(transform: OutputTransform, scale: f32) -> RenderViewport {
    let target = RenderTarget::new(None, TARGET, transform);
    let logical = target.logical_size() / scale;
    let origin = Vec2::new(40.0, 20.0);
    RenderViewport::new(RectF::new(origin.x, origin.y, logical.x, logical.y), scale, &target)
}

// ============================================================================
// Round Trips
// ============================================================================

#[test]
fn round_trip_for_every_transform_and_scale() {
    let samples = [
        RectF::new(40.0, 20.0, 10.0, 10.0),
        RectF::new(55.5, 33.25, 17.0, 4.5),
        RectF::new(60.0, 25.0, 1.0, 50.0),
    ];
    for transform in OutputTransform::ALL {
        for scale in SCALES {
            let vp = viewport(transform, scale);
            for logical in samples {
                let device = vp.map_to_render_target(logical);
                let back = vp.map_from_render_target(device);
                assert!(
                    back.approx_eq(&logical, EPSILON),
                    "{transform:?} @ {scale}: {logical:?} -> {device:?} -> {back:?}"
                );
            }
        }
    }
}

#[test]
fn render_rect_fills_the_target() {
    let full = RectF::new(0.0, 0.0, TARGET.x as f32, TARGET.y as f32);
    for transform in OutputTransform::ALL {
        for scale in SCALES {
            let vp = viewport(transform, scale);
            let mapped = vp.map_to_render_target(vp.render_rect());
            assert!(mapped.approx_eq(&full, EPSILON), "{transform:?} @ {scale}: {mapped:?}");
        }
    }
}

#[test]
fn point_mapping_agrees_with_rect_mapping() {
    for transform in OutputTransform::ALL {
        let vp = viewport(transform, 1.0);
        let r = RectF::new(50.0, 30.0, 20.0, 10.0);
        let mapped = vp.map_to_render_target(r);
        let corners = [r.top_left(), r.bottom_right(), Vec2::new(r.x + r.width, r.y), Vec2::new(r.x, r.y + r.height)];
        for corner in corners {
            let p = vp.map_to_render_target_point(corner);
            assert!(
                p.x >= mapped.x - EPSILON && p.x <= mapped.x + mapped.width + EPSILON,
                "{transform:?}: {p:?} outside {mapped:?}"
            );
            assert!(
                p.y >= mapped.y - EPSILON && p.y <= mapped.y + mapped.height + EPSILON,
                "{transform:?}: {p:?} outside {mapped:?}"
            );
        }
    }
}

// ============================================================================
// Regions
// ============================================================================

#[test]
fn region_maps_inside_the_target() {
    let bounds = Rect::new(0, 0, TARGET.x, TARGET.y);
    for transform in OutputTransform::ALL {
        let vp = viewport(transform, 1.0);
        let logical = vp.render_rect();
        let region = [
            Rect::new(logical.x as i32, logical.y as i32, 10, 10),
            Rect::new(logical.x as i32 + 30, logical.y as i32 + 5, 25, 60),
        ];
        let mapped = vp.map_to_render_target_region(&region);
        assert_eq!(mapped.len(), region.len());
        for (src, dst) in region.iter().zip(&mapped) {
            assert!(bounds.contains(dst), "{transform:?}: {dst:?}");
            // area is preserved, axes may swap
            assert_eq!(src.width * src.height, dst.width * dst.height);
            if transform.swaps_axes() {
                assert_eq!((dst.width, dst.height), (src.height, src.width));
            }
        }
    }
}

#[test]
fn integer_and_float_mapping_agree_on_whole_pixels() {
    for transform in OutputTransform::ALL {
        let vp = viewport(transform, 2.0);
        let logical = Rect::new(45, 25, 12, 7);
        let exact = vp.map_to_render_target_rect(logical);
        let float = vp.map_to_render_target(RectF::from(logical)).snapped();
        assert_eq!(exact, float, "{transform:?}");
    }
}

// ============================================================================
// Projection
// ============================================================================

#[test]
fn projection_maps_render_rect_to_clip_corners() {
    for transform in OutputTransform::ALL {
        for scale in SCALES {
            let vp = viewport(transform, scale);
            let r = vp.render_rect();
            for corner in [r.top_left(), r.bottom_right()] {
                let clip = vp.projection_matrix().project_point3(corner.extend(0.0));
                assert!(approx(clip.x.abs(), 1.0), "{transform:?} @ {scale}: {clip:?}");
                assert!(approx(clip.y.abs(), 1.0), "{transform:?} @ {scale}: {clip:?}");
            }
            let center = vp
                .projection_matrix()
                .project_point3(((r.top_left() + r.bottom_right()) * 0.5).extend(0.0));
            assert!(center.truncate().length() < EPSILON, "{transform:?}: {center:?}");
        }
    }
}

#[test]
fn normal_transform_keeps_top_left_at_top_left() {
    let vp = viewport(OutputTransform::Normal, 1.0);
    let clip = vp
        .projection_matrix()
        .project_point3(vp.render_rect().top_left().extend(0.0));
    assert!(approx(clip.x, -1.0) && approx(clip.y, 1.0), "{clip:?}");
    assert!(approx(clip.z, 0.0));
}
