//! Utility types, used throughout the crate.

/// An integer rectangle in document pixel space, extending right and down from `(x, y)`.
///
/// A rectangle with no area is "empty". Empty rectangles are the identity for [`Rect::union`],
/// regardless of where they're positioned.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}
impl Rect {
    pub const EMPTY: Self = Self::new(0, 0, 0, 0);
    #[must_use]
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }
    #[must_use]
    pub fn from_xywh((x, y, w, h): (i32, i32, i32, i32)) -> Self {
        Self { x, y, w, h }
    }
    #[must_use]
    pub fn to_xywh(self) -> (i32, i32, i32, i32) {
        (self.x, self.y, self.w, self.h)
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }
    /// Exclusive right edge.
    #[must_use]
    pub fn right(&self) -> i32 {
        self.x + self.w
    }
    /// Exclusive bottom edge.
    #[must_use]
    pub fn bottom(&self) -> i32 {
        self.y + self.h
    }
    #[must_use]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        !self.is_empty() && x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }
    /// The smallest rect containing both.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        if other.is_empty() {
            return self;
        }
        if self.is_empty() {
            return other;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Self {
            x,
            y,
            w: self.right().max(other.right()) - x,
            h: self.bottom().max(other.bottom()) - y,
        }
    }
    pub fn expand_to_include_rect(&mut self, other: Self) {
        *self = self.union(other);
    }
    /// Grow to cover the pixel at `(x, y)`. An empty rect becomes the 1x1 rect at that pixel.
    pub fn expand_to_include_point(&mut self, x: i32, y: i32) {
        self.expand_to_include_rect(Self::new(x, y, 1, 1));
    }
    /// The overlapping area, or `None` if they don't overlap.
    #[must_use]
    pub fn intersection(self, other: Self) -> Option<Self> {
        if self.is_empty() || other.is_empty() {
            return None;
        }
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        (right > x && bottom > y).then(|| Self::new(x, y, right - x, bottom - y))
    }
    /// True if the rects overlap or share an edge.
    #[must_use]
    pub fn touches(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x <= other.right()
            && other.x <= self.right()
            && self.y <= other.bottom()
            && other.y <= self.bottom()
            // Corners only meeting at a point are not adjacent.
            && !((self.x == other.right() || other.x == self.right())
                && (self.y == other.bottom() || other.y == self.bottom()))
    }
    /// The `size`-aligned square containing the pixel at `(x, y)`.
    #[must_use]
    pub fn tile_aligned(x: i32, y: i32, size: i32) -> Self {
        Self::new(
            x.div_euclid(size) * size,
            y.div_euclid(size) * size,
            size,
            size,
        )
    }
}
impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.w, self.h, self.x, self.y)
    }
}
