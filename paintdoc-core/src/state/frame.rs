//! The document frame: an optional user-chosen crop rectangle, and the document's print resolution.

use crate::util::Rect;

/// Resolution assumed when a document doesn't declare one, in pixels per inch.
pub const DEFAULT_RESOLUTION: u32 = 72;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct Frame {
    pub rect: Rect,
    /// When enabled, the frame takes precedence over the data bbox as the document's effective extent.
    pub enabled: bool,
}

/// A partial change to the frame rectangle. Unset fields keep their current value.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct FrameUpdate {
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub width: Option<i32>,
    pub height: Option<i32>,
}
impl FrameUpdate {
    #[must_use]
    pub fn from_rect(rect: Rect) -> Self {
        Self {
            x: Some(rect.x),
            y: Some(rect.y),
            width: Some(rect.w),
            height: Some(rect.h),
        }
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
    #[must_use]
    pub fn apply_to(&self, rect: Rect) -> Rect {
        Rect::new(
            self.x.unwrap_or(rect.x),
            self.y.unwrap_or(rect.y),
            self.width.unwrap_or(rect.w),
            self.height.unwrap_or(rect.h),
        )
    }
    /// Overlay the fields set in `newer` onto self.
    pub fn merge(&mut self, newer: Self) {
        self.x = newer.x.or(self.x);
        self.y = newer.y.or(self.y);
        self.width = newer.width.or(self.width);
        self.height = newer.height.or(self.height);
    }
}

/// Print resolution, pixels per inch on each axis.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Resolution {
    pub xres: u32,
    pub yres: u32,
}
impl Resolution {
    /// Both axes must be nonzero to be meaningful.
    #[must_use]
    pub fn new(xres: u32, yres: u32) -> Option<Self> {
        (xres != 0 && yres != 0).then_some(Self { xres, yres })
    }
    /// The single effective resolution: the larger axis, at least one.
    #[must_use]
    pub fn effective(self) -> u32 {
        self.xres.max(self.yres).max(1)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn partial_updates() {
        let mut update = FrameUpdate {
            x: Some(5),
            ..Default::default()
        };
        update.merge(FrameUpdate {
            width: Some(20),
            ..Default::default()
        });
        assert_eq!(
            update.apply_to(Rect::new(1, 2, 3, 4)),
            Rect::new(5, 2, 20, 4)
        );
        assert!(FrameUpdate::default().is_empty());
    }
    #[test]
    fn resolution() {
        assert_eq!(Resolution::new(300, 0), None);
        assert_eq!(Resolution::new(150, 300).map(Resolution::effective), Some(300));
    }
}
