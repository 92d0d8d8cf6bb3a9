//! # Damage
//!
//! Every mutation of the document reports the area of the canvas it may have changed, so views
//! can redraw incrementally. The canvas is conceptually infinite, so "everything" has to be
//! representable too - [`Damage::Full`], which travels over the wire as the `(0,0,0,0)` sentinel.

use crate::util::Rect;

/// An area of the canvas needing a redraw.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Damage {
    /// Redraw everything. Also the "infinite" bounding box of layers with no edges.
    Full,
    /// Redraw within this rect. An empty rect means nothing changed.
    Area(Rect),
}
impl Default for Damage {
    fn default() -> Self {
        Self::NONE
    }
}
impl From<Rect> for Damage {
    fn from(value: Rect) -> Self {
        Self::Area(value)
    }
}
impl Damage {
    pub const NONE: Self = Self::Area(Rect::EMPTY);
    /// The `(x, y, w, h)` notification payload. `Full` is `(0, 0, 0, 0)`.
    #[must_use]
    pub fn to_xywh(self) -> (i32, i32, i32, i32) {
        match self {
            Self::Full => (0, 0, 0, 0),
            Self::Area(rect) => rect.to_xywh(),
        }
    }
    /// Inverse of [`Self::to_xywh`]. A zero width and height is read as the full-redraw sentinel.
    #[must_use]
    pub fn from_xywh(xywh: (i32, i32, i32, i32)) -> Self {
        match xywh {
            (_, _, 0, 0) => Self::Full,
            xywh => Self::Area(Rect::from_xywh(xywh)),
        }
    }
    #[must_use]
    pub fn is_full(self) -> bool {
        matches!(self, Self::Full)
    }
    /// True if this damage covers no pixels.
    #[must_use]
    pub fn is_none(self) -> bool {
        match self {
            Self::Full => false,
            Self::Area(rect) => rect.is_empty(),
        }
    }
    /// Bounding union. Full absorbs everything.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        match (self, other) {
            (Self::Full, _) | (_, Self::Full) => Self::Full,
            (Self::Area(a), Self::Area(b)) => Self::Area(a.union(b)),
        }
    }
}

/// Accumulates damage between redraws.
///
/// Overlapping or edge-adjacent areas merge into their bounding rect, so the tracked set stays small
/// while disjoint strokes on opposite ends of the canvas don't force redrawing everything in between.
#[derive(Default, Debug)]
pub struct DamageTracker {
    /// Pairwise disjoint and non-adjacent.
    areas: Vec<Rect>,
    full: bool,
}
impl DamageTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.full && self.areas.is_empty()
    }
    pub fn push(&mut self, damage: Damage) {
        let mut rect = match damage {
            Damage::Full => {
                self.full = true;
                self.areas.clear();
                return;
            }
            Damage::Area(rect) if rect.is_empty() || self.full => return,
            Damage::Area(rect) => rect,
        };
        // Merging may make the grown rect touch ones it didn't before, so keep going until stable.
        while let Some(idx) = self.areas.iter().position(|area| area.touches(&rect)) {
            rect = rect.union(self.areas.swap_remove(idx));
        }
        self.areas.push(rect);
    }
    /// The union of everything tracked.
    #[must_use]
    pub fn bounds(&self) -> Damage {
        if self.full {
            Damage::Full
        } else {
            self.areas
                .iter()
                .fold(Damage::NONE, |acc, &rect| acc.union(rect.into()))
        }
    }
    /// Drain all tracked damage.
    pub fn take(&mut self) -> Vec<Damage> {
        if std::mem::take(&mut self.full) {
            self.areas.clear();
            vec![Damage::Full]
        } else {
            self.areas.drain(..).map(Damage::Area).collect()
        }
    }
}
