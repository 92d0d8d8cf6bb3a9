//! # Tiled surfaces
//!
//! Pixel storage for painting layers: a sparse, unbounded grid of fixed-size tiles. Only tiles which
//! have been written to exist, so the extent of a layer is the union of its populated tiles.
//!
//! Tiles are copy-on-write. Cloning a surface is cheap, which is what undo snapshots rely on -
//! a snapshot only costs memory for the tiles written after it was taken.

use std::sync::Arc;

use crate::util::Rect;

/// Edge length of a tile, in pixels.
pub const TILE_SIZE: i32 = 64;
const TILE_PIXELS: usize = (TILE_SIZE * TILE_SIZE) as usize;

/// Straight (non-premultiplied) RGBA8.
pub type Pixel = [u8; 4];
pub const TRANSPARENT: Pixel = [0; 4];

#[derive(Clone)]
struct Tile([Pixel; TILE_PIXELS]);
impl Tile {
    fn blank() -> Self {
        Self([TRANSPARENT; TILE_PIXELS])
    }
    fn index(local_x: i32, local_y: i32) -> usize {
        // Both in 0..TILE_SIZE
        (local_y * TILE_SIZE + local_x) as usize
    }
    fn is_transparent(&self) -> bool {
        self.0.iter().all(|px| px[3] == 0)
    }
}

/// Tile coordinate containing the given pixel, and the pixel's position within that tile.
fn split(x: i32, y: i32) -> ((i32, i32), (i32, i32)) {
    (
        (x.div_euclid(TILE_SIZE), y.div_euclid(TILE_SIZE)),
        (x.rem_euclid(TILE_SIZE), y.rem_euclid(TILE_SIZE)),
    )
}
fn tile_rect((tx, ty): (i32, i32)) -> Rect {
    Rect::new(tx * TILE_SIZE, ty * TILE_SIZE, TILE_SIZE, TILE_SIZE)
}

#[derive(Clone, Default)]
pub struct TiledSurface {
    tiles: hashbrown::HashMap<(i32, i32), Arc<Tile>>,
}
impl std::fmt::Debug for TiledSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiledSurface")
            .field("tiles", &self.tiles.len())
            .field("bbox", &self.bbox())
            .finish()
    }
}
impl PartialEq for TiledSurface {
    fn eq(&self, other: &Self) -> bool {
        self.same_pixels(other)
    }
}
impl TiledSurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }
    /// Union of all populated tiles. Tile-granular, not pixel-exact.
    #[must_use]
    pub fn bbox(&self) -> Rect {
        self.tiles
            .keys()
            .fold(Rect::EMPTY, |acc, &coord| acc.union(tile_rect(coord)))
    }
    /// The area that must be redrawn if this surface changes wholesale.
    /// For a finite surface, this is just the bbox.
    #[must_use]
    pub fn full_redraw_bbox(&self) -> crate::damage::Damage {
        self.bbox().into()
    }
    #[must_use]
    pub fn pixel(&self, x: i32, y: i32) -> Pixel {
        let (coord, (lx, ly)) = split(x, y);
        self.tiles
            .get(&coord)
            .map_or(TRANSPARENT, |tile| tile.0[Tile::index(lx, ly)])
    }
    /// Write a pixel. Writing transparency into an unpopulated tile does not populate it.
    pub fn set_pixel(&mut self, x: i32, y: i32, pixel: Pixel) {
        let (coord, (lx, ly)) = split(x, y);
        let tile = match self.tiles.entry(coord) {
            hashbrown::hash_map::Entry::Occupied(o) => o.into_mut(),
            hashbrown::hash_map::Entry::Vacant(v) => {
                if pixel[3] == 0 {
                    return;
                }
                v.insert(Arc::new(Tile::blank()))
            }
        };
        Arc::make_mut(tile).0[Tile::index(lx, ly)] = pixel;
    }
    pub fn fill_rect(&mut self, rect: Rect, pixel: Pixel) {
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                self.set_pixel(x, y, pixel);
            }
        }
    }
    pub fn clear(&mut self) {
        self.tiles.clear();
    }
    /// Erase everything outside of `rect`. Returns the area that changed.
    pub fn trim(&mut self, rect: Rect) -> Rect {
        let before = self.bbox();
        let coords: Vec<_> = self.tiles.keys().copied().collect();
        for coord in coords {
            let tile_area = tile_rect(coord);
            match tile_area.intersection(rect) {
                None => {
                    self.tiles.remove(&coord);
                }
                Some(keep) if keep == tile_area => (),
                Some(keep) => {
                    let Some(tile) = self.tiles.get_mut(&coord) else {
                        continue;
                    };
                    let tile = Arc::make_mut(tile);
                    for ly in 0..TILE_SIZE {
                        for lx in 0..TILE_SIZE {
                            if !keep.contains(tile_area.x + lx, tile_area.y + ly) {
                                tile.0[Tile::index(lx, ly)] = TRANSPARENT;
                            }
                        }
                    }
                    if tile.is_transparent() {
                        self.tiles.remove(&coord);
                    }
                }
            }
        }
        before
    }
    /// Composite `src` on top of self with normal source-over, scaled by `opacity`.
    pub fn composite_over(&mut self, src: &Self, opacity: f32) {
        let opacity = opacity.clamp(0.0, 1.0);
        for (&coord, src_tile) in &src.tiles {
            let area = tile_rect(coord);
            for ly in 0..TILE_SIZE {
                for lx in 0..TILE_SIZE {
                    let top = src_tile.0[Tile::index(lx, ly)];
                    if top[3] == 0 {
                        continue;
                    }
                    let (x, y) = (area.x + lx, area.y + ly);
                    let under = self.pixel(x, y);
                    self.set_pixel(x, y, source_over(top, under, opacity));
                }
            }
        }
    }
    /// Multiply every pixel's alpha by `opacity`.
    pub fn scale_alpha(&mut self, opacity: f32) {
        use az::SaturatingAs;
        let opacity = opacity.clamp(0.0, 1.0);
        if opacity >= 1.0 {
            return;
        }
        self.tiles.retain(|_, tile| {
            let tile = Arc::make_mut(tile);
            for pixel in &mut tile.0 {
                pixel[3] = (f32::from(pixel[3]) * opacity).round().saturating_as();
            }
            !tile.is_transparent()
        });
    }
    /// Copy an image in with its top-left at `(x, y)`. Returns the bbox of what was loaded.
    pub fn load_rgba(&mut self, x: i32, y: i32, image: &image::RgbaImage) -> Rect {
        use az::SaturatingAs;
        for (px, py, pixel) in image.enumerate_pixels() {
            self.set_pixel(
                x.saturating_add(px.saturating_as()),
                y.saturating_add(py.saturating_as()),
                pixel.0,
            );
        }
        self.bbox()
    }
    /// Read the pixels within `rect` into an image. Empty rects produce an empty image.
    #[must_use]
    pub fn render_rgba(&self, rect: Rect) -> image::RgbaImage {
        use az::SaturatingAs;
        if rect.is_empty() {
            return image::RgbaImage::new(0, 0);
        }
        let mut image = image::RgbaImage::new(rect.w.saturating_as(), rect.h.saturating_as());
        let row_bytes = rect.w.saturating_as::<usize>() * 4;
        // Copy a tile's worth of each row at a time. Unpopulated tiles stay transparent.
        for (row, y) in image.chunks_exact_mut(row_bytes).zip(rect.y..) {
            let mut x = rect.x;
            while x < rect.right() {
                let ((tx, ty), (lx, ly)) = split(x, y);
                let run = (TILE_SIZE - lx).min(rect.right() - x);
                if let Some(tile) = self.tiles.get(&(tx, ty)) {
                    let start = Tile::index(lx, ly);
                    let pixels = &tile.0[start..start + run.saturating_as::<usize>()];
                    let offset = (x - rect.x).saturating_as::<usize>() * 4;
                    row[offset..offset + pixels.len() * 4]
                        .copy_from_slice(bytemuck::cast_slice(pixels));
                }
                x += run;
            }
        }
        image
    }
    /// True if any tile was written or removed since `before` was cloned from this surface.
    #[must_use]
    pub fn changed_since(&self, before: &Self) -> bool {
        self.tiles.len() != before.tiles.len()
            || self.tiles.iter().any(|(coord, tile)| {
                before
                    .tiles
                    .get(coord)
                    .map_or(true, |old| !Arc::ptr_eq(tile, old))
            })
    }
    /// Pixel-exact comparison.
    #[must_use]
    pub fn same_pixels(&self, other: &Self) -> bool {
        let populated = |surface: &Self| -> hashbrown::HashSet<(i32, i32)> {
            surface
                .tiles
                .iter()
                .filter(|(_, tile)| !tile.is_transparent())
                .map(|(coord, _)| *coord)
                .collect()
        };
        let ours = populated(self);
        ours == populated(other)
            && ours.iter().all(|coord| {
                match (self.tiles.get(coord), other.tiles.get(coord)) {
                    (Some(a), Some(b)) => Arc::ptr_eq(a, b) || a.0 == b.0,
                    _ => false,
                }
            })
    }
    /// Fill the 4-connected region around the seed whose colours, as read from `sample`, are within
    /// `tolerance` of the seed's colour. Never writes outside of `bounds`.
    ///
    /// Returns the bounding rect of the written pixels.
    pub fn flood_fill(
        &mut self,
        (seed_x, seed_y): (i32, i32),
        color: [u8; 3],
        tolerance: f32,
        bounds: Rect,
        sample: Option<&Self>,
    ) -> Rect {
        if !bounds.contains(seed_x, seed_y) {
            return Rect::EMPTY;
        }
        // Sample from ourselves unless told otherwise. Sampling has to see the state from *before*
        // the fill, so take a cheap clone.
        let own_sample;
        let sample = if let Some(sample) = sample {
            sample
        } else {
            own_sample = self.clone();
            &own_sample
        };
        let target = sample.pixel(seed_x, seed_y);
        let tolerance = (tolerance.clamp(0.0, 1.0) * 255.0).round() as i32;
        let matches = |px: Pixel| {
            px.iter()
                .zip(target.iter())
                .all(|(&a, &b)| (i32::from(a) - i32::from(b)).abs() <= tolerance)
        };
        let fill = [color[0], color[1], color[2], 255];

        let width = bounds.w.unsigned_abs() as usize;
        let mut visited = vec![false; width * bounds.h.unsigned_abs() as usize];
        let mut stack = vec![(seed_x, seed_y)];
        let mut filled = Rect::EMPTY;
        while let Some((x, y)) = stack.pop() {
            if !bounds.contains(x, y) {
                continue;
            }
            let idx = (y - bounds.y) as usize * width + (x - bounds.x) as usize;
            if visited[idx] {
                continue;
            }
            visited[idx] = true;
            if !matches(sample.pixel(x, y)) {
                continue;
            }
            self.set_pixel(x, y, fill);
            filled.expand_to_include_point(x, y);
            stack.extend([(x + 1, y), (x - 1, y), (x, y + 1), (x, y - 1)]);
        }
        filled
    }
}

/// Straight-alpha source-over of a single pixel.
fn source_over(top: Pixel, under: Pixel, opacity: f32) -> Pixel {
    let top_a = f32::from(top[3]) / 255.0 * opacity;
    let under_a = f32::from(under[3]) / 255.0;
    let out_a = top_a + under_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return TRANSPARENT;
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let value = (f32::from(top[c]) * top_a + f32::from(under[c]) * under_a * (1.0 - top_a))
            / out_a;
        out[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    out
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn bbox_is_tile_granular() {
        let mut surface = TiledSurface::new();
        assert!(surface.bbox().is_empty());
        surface.set_pixel(3, 3, [255, 0, 0, 255]);
        assert_eq!(surface.bbox(), Rect::new(0, 0, TILE_SIZE, TILE_SIZE));
        surface.set_pixel(-1, 70, [255, 0, 0, 255]);
        assert_eq!(
            surface.bbox(),
            Rect::new(-TILE_SIZE, 0, TILE_SIZE * 2, TILE_SIZE * 2)
        );
    }
    #[test]
    fn transparent_writes_dont_populate() {
        let mut surface = TiledSurface::new();
        surface.set_pixel(500, 500, TRANSPARENT);
        assert!(surface.is_empty());
    }
    #[test]
    fn snapshots_are_copy_on_write() {
        let mut surface = TiledSurface::new();
        surface.set_pixel(0, 0, [1, 2, 3, 255]);
        let before = surface.clone();
        assert!(!surface.changed_since(&before));
        surface.set_pixel(1, 0, [1, 2, 3, 255]);
        assert!(surface.changed_since(&before));
        assert_eq!(before.pixel(1, 0), TRANSPARENT);
        assert!(!surface.same_pixels(&before));
    }
    #[test]
    fn trim_erases_outside() {
        let mut surface = TiledSurface::new();
        surface.fill_rect(Rect::new(0, 0, 100, 100), [9, 9, 9, 255]);
        surface.trim(Rect::new(10, 10, 20, 20));
        assert_eq!(surface.pixel(5, 5), TRANSPARENT);
        assert_eq!(surface.pixel(15, 15), [9, 9, 9, 255]);
        assert_eq!(surface.pixel(80, 80), TRANSPARENT);
        assert_eq!(surface.bbox(), Rect::new(0, 0, TILE_SIZE, TILE_SIZE));
    }
    #[test]
    fn fill_respects_bounds_and_edges() {
        let mut surface = TiledSurface::new();
        // A wall at x = 5
        surface.fill_rect(Rect::new(5, 0, 1, 20), [0, 0, 0, 255]);
        let filled = surface.flood_fill((0, 0), [255, 0, 0], 0.0, Rect::new(0, 0, 20, 20), None);
        assert_eq!(filled, Rect::new(0, 0, 5, 20));
        assert_eq!(surface.pixel(4, 19), [255, 0, 0, 255]);
        assert_eq!(surface.pixel(6, 0), TRANSPARENT);
        // Seeds outside bounds do nothing.
        let filled = surface.flood_fill((50, 50), [255, 0, 0], 0.0, Rect::new(0, 0, 20, 20), None);
        assert!(filled.is_empty());
    }
    #[test]
    fn composite_opaque_replaces() {
        let mut lower = TiledSurface::new();
        lower.set_pixel(0, 0, [0, 0, 255, 255]);
        let mut upper = TiledSurface::new();
        upper.set_pixel(0, 0, [255, 0, 0, 255]);
        upper.set_pixel(1, 0, [255, 0, 0, 255]);
        lower.composite_over(&upper, 1.0);
        assert_eq!(lower.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(lower.pixel(1, 0), [255, 0, 0, 255]);
        // Half opacity over transparency keeps the colour and halves alpha.
        let mut empty = TiledSurface::new();
        empty.composite_over(&upper, 0.5);
        assert_eq!(empty.pixel(0, 0), [255, 0, 0, 128]);
    }
    #[test]
    fn scale_alpha_drops_cleared_tiles() {
        let mut surface = TiledSurface::new();
        surface.set_pixel(0, 0, [9, 9, 9, 200]);
        surface.set_pixel(TILE_SIZE, 0, [9, 9, 9, 1]);
        surface.scale_alpha(0.25);
        assert_eq!(surface.pixel(0, 0), [9, 9, 9, 50]);
        assert_eq!(surface.tile_count(), 1);
    }
    #[test]
    fn render_crosses_tiles() {
        let mut surface = TiledSurface::new();
        surface.set_pixel(-1, -1, [1, 1, 1, 255]);
        surface.set_pixel(0, 0, [2, 2, 2, 255]);
        let image = surface.render_rgba(Rect::new(-2, -2, 4, 3));
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(image.get_pixel(1, 1).0, [1, 1, 1, 255]);
        assert_eq!(image.get_pixel(2, 2).0, [2, 2, 2, 255]);
        assert_eq!(image.get_pixel(3, 2).0, TRANSPARENT);
    }
}
