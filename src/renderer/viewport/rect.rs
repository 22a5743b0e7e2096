use glam::{IVec2, Vec2};
use smallvec::SmallVec;

/// Integer rectangle, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// A set of rectangles. An empty region is treated as "everything" by the
/// draw paths when clipping is off.
pub type Region = SmallVec<[Rect; 4]>;

impl Rect {
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    #[must_use]
    pub const fn from_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    #[inline]
    #[must_use]
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    #[inline]
    #[must_use]
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> IVec2 {
        IVec2::new(self.width, self.height)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    #[must_use]
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x && other.y >= self.y && other.right() <= self.right() && other.bottom() <= self.bottom()
    }

    #[must_use]
    pub fn intersected(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        Rect::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0))
    }

    #[must_use]
    pub fn translated(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Same rectangle in a bottom-up space of height `space_height`.
    #[must_use]
    pub fn flipped_y(&self, space_height: i32) -> Rect {
        Rect::new(self.x, space_height - self.bottom(), self.width, self.height)
    }
}

impl From<Rect> for RectF {
    fn from(r: Rect) -> Self {
        RectF::new(r.x as f32, r.y as f32, r.width as f32, r.height as f32)
    }
}

/// Floating-point rectangle, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RectF {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RectF {
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    #[must_use]
    pub fn from_points(top_left: Vec2, bottom_right: Vec2) -> Self {
        Self::new(top_left.x, top_left.y, bottom_right.x - top_left.x, bottom_right.y - top_left.y)
    }

    #[inline]
    #[must_use]
    pub fn top_left(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    #[inline]
    #[must_use]
    pub fn bottom_right(&self) -> Vec2 {
        Vec2::new(self.x + self.width, self.y + self.height)
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    #[must_use]
    pub fn scaled(&self, scale: f32) -> RectF {
        RectF::new(self.x * scale, self.y * scale, self.width * scale, self.height * scale)
    }

    #[must_use]
    pub fn translated(&self, offset: Vec2) -> RectF {
        RectF::new(self.x + offset.x, self.y + offset.y, self.width, self.height)
    }

    /// Rounds each edge to the nearest pixel.
    #[must_use]
    pub fn snapped(&self) -> Rect {
        let x0 = self.x.round() as i32;
        let y0 = self.y.round() as i32;
        let x1 = (self.x + self.width).round() as i32;
        let y1 = (self.y + self.height).round() as i32;
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Smallest integer rectangle covering this one.
    #[must_use]
    pub fn to_aligned_rect(&self) -> Rect {
        let x0 = self.x.floor() as i32;
        let y0 = self.y.floor() as i32;
        let x1 = (self.x + self.width).ceil() as i32;
        let y1 = (self.y + self.height).ceil() as i32;
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    #[must_use]
    pub fn approx_eq(&self, other: &RectF, epsilon: f32) -> bool {
        (self.x - other.x).abs() <= epsilon
            && (self.y - other.y).abs() <= epsilon
            && (self.width - other.width).abs() <= epsilon
            && (self.height - other.height).abs() <= epsilon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapping_rounds_edges_independently() {
        let r = RectF::new(0.4, 0.6, 10.2, 10.2).snapped();
        assert_eq!(r, Rect::new(0, 1, 11, 10));
        assert_eq!(RectF::new(0.4, 0.6, 1.0, 1.0).to_aligned_rect(), Rect::new(0, 0, 2, 2));
    }

    #[test]
    fn intersection_clamps_to_empty() {
        let a = Rect::new(0, 0, 10, 10);
        assert_eq!(a.intersected(&Rect::new(5, 5, 10, 10)), Rect::new(5, 5, 5, 5));
        assert!(a.intersected(&Rect::new(20, 20, 1, 1)).is_empty());
        assert_eq!(Rect::new(2, 3, 4, 5).flipped_y(20), Rect::new(2, 12, 4, 5));
    }
}
