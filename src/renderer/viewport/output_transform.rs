//! Output Transform
//!
//! The eight orientations an output buffer can have relative to the logical
//! desktop: four rotations, each optionally mirrored horizontally.
//!
//! All mappings work in a y-down space. `bounds` is always the size of the
//! space being mapped *from*.

use glam::{Mat2, Mat3, Mat4, Vec2};

use super::rect::{Rect, RectF};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputTransform {
    #[default]
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
    Flipped,
    Flipped90,
    Flipped180,
    Flipped270,
}

impl OutputTransform {
    pub const ALL: [Self; 8] = [
        Self::Normal,
        Self::Rotate90,
        Self::Rotate180,
        Self::Rotate270,
        Self::Flipped,
        Self::Flipped90,
        Self::Flipped180,
        Self::Flipped270,
    ];

    /// `true` when width and height trade places.
    #[must_use]
    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Rotate90 | Self::Rotate270 | Self::Flipped90 | Self::Flipped270)
    }

    /// Linear part of the transform about the center of the bounds.
    #[must_use]
    pub fn linear(self) -> Mat2 {
        let (c0, c1) = match self {
            Self::Normal => (Vec2::X, Vec2::Y),
            Self::Rotate90 => (Vec2::Y, Vec2::NEG_X),
            Self::Rotate180 => (Vec2::NEG_X, Vec2::NEG_Y),
            Self::Rotate270 => (Vec2::NEG_Y, Vec2::X),
            Self::Flipped => (Vec2::NEG_X, Vec2::Y),
            Self::Flipped90 => (Vec2::Y, Vec2::X),
            Self::Flipped180 => (Vec2::X, Vec2::NEG_Y),
            Self::Flipped270 => (Vec2::NEG_Y, Vec2::NEG_X),
        };
        Mat2::from_cols(c0, c1)
    }

    #[must_use]
    pub fn to_matrix(self) -> Mat4 {
        Mat4::from_mat3(Mat3::from_mat2(self.linear()))
    }

    fn from_linear(m: Mat2) -> Self {
        Self::ALL
            .into_iter()
            .find(|t| t.linear() == m)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn inverted(self) -> Self {
        Self::from_linear(self.linear().transpose())
    }

    /// `self` followed by `other`.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        Self::from_linear(other.linear() * self.linear())
    }

    #[must_use]
    pub fn map_size(self, size: Vec2) -> Vec2 {
        if self.swaps_axes() {
            Vec2::new(size.y, size.x)
        } else {
            size
        }
    }

    #[must_use]
    pub fn map_rect(self, r: RectF, bounds: Vec2) -> RectF {
        let (w, h) = (bounds.x, bounds.y);
        match self {
            Self::Normal => r,
            Self::Rotate90 => RectF::new(h - (r.y + r.height), r.x, r.height, r.width),
            Self::Rotate180 => RectF::new(w - (r.x + r.width), h - (r.y + r.height), r.width, r.height),
            Self::Rotate270 => RectF::new(r.y, w - (r.x + r.width), r.height, r.width),
            Self::Flipped => RectF::new(w - (r.x + r.width), r.y, r.width, r.height),
            Self::Flipped90 => RectF::new(r.y, r.x, r.height, r.width),
            Self::Flipped180 => RectF::new(r.x, h - (r.y + r.height), r.width, r.height),
            Self::Flipped270 => RectF::new(h - (r.y + r.height), w - (r.x + r.width), r.height, r.width),
        }
    }

    /// Integer variant of [`map_rect`](Self::map_rect); exact.
    #[must_use]
    pub fn map_rect_i(self, r: Rect, bounds: (i32, i32)) -> Rect {
        let (w, h) = bounds;
        match self {
            Self::Normal => r,
            Self::Rotate90 => Rect::new(h - r.bottom(), r.x, r.height, r.width),
            Self::Rotate180 => Rect::new(w - r.right(), h - r.bottom(), r.width, r.height),
            Self::Rotate270 => Rect::new(r.y, w - r.right(), r.height, r.width),
            Self::Flipped => Rect::new(w - r.right(), r.y, r.width, r.height),
            Self::Flipped90 => Rect::new(r.y, r.x, r.height, r.width),
            Self::Flipped180 => Rect::new(r.x, h - r.bottom(), r.width, r.height),
            Self::Flipped270 => Rect::new(h - r.bottom(), w - r.right(), r.height, r.width),
        }
    }

    #[must_use]
    pub fn map_point(self, p: Vec2, bounds: Vec2) -> Vec2 {
        self.map_rect(RectF::new(p.x, p.y, 0.0, 0.0), bounds).top_left()
    }

    /// Affine pixel mapping from a `bounds`-sized space into the transformed
    /// one, as a 4×4 matrix acting on `(x, y, 0, 1)`.
    #[must_use]
    pub fn pixel_matrix(self, bounds: Vec2) -> Mat4 {
        let target = self.map_size(bounds);
        Mat4::from_translation((target * 0.5).extend(0.0))
            * self.to_matrix()
            * Mat4::from_translation((-bounds * 0.5).extend(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn rect_mapping_agrees_with_matrix() {
        let bounds = Vec2::new(200.0, 100.0);
        let r = RectF::new(10.0, 20.0, 30.0, 40.0);
        for t in OutputTransform::ALL {
            let m = t.pixel_matrix(bounds);
            let a = m.transform_point3(r.top_left().extend(0.0)).truncate();
            let b = m.transform_point3(r.bottom_right().extend(0.0)).truncate();
            let expected = RectF::from_points(a.min(b), a.max(b));
            assert!(t.map_rect(r, bounds).approx_eq(&expected, EPSILON), "{t:?}");
        }
    }

    #[test]
    fn inverse_pairs() {
        use OutputTransform::*;
        assert_eq!(Rotate90.inverted(), Rotate270);
        assert_eq!(Rotate270.inverted(), Rotate90);
        for t in [Normal, Rotate180, Flipped, Flipped90, Flipped180, Flipped270] {
            assert_eq!(t.inverted(), t);
        }
        for t in OutputTransform::ALL {
            assert_eq!(t.combine(t.inverted()), Normal);
        }
    }

    #[test]
    fn combine_composes_rotations() {
        use OutputTransform::*;
        assert_eq!(Rotate90.combine(Rotate90), Rotate180);
        assert_eq!(Rotate90.combine(Rotate270), Normal);
        assert_eq!(Flipped.combine(Flipped), Normal);
        assert_eq!(Rotate90.combine(Flipped), Flipped90);
        assert_eq!(Flipped.combine(Rotate90), Flipped270);
    }

    #[test]
    fn integer_mapping_matches_float() {
        let r = Rect::new(3, 5, 7, 11);
        for t in OutputTransform::ALL {
            let fi = t.map_rect(r.into(), Vec2::new(64.0, 32.0));
            assert_eq!(RectF::from(t.map_rect_i(r, (64, 32))), fi);
        }
    }
}
