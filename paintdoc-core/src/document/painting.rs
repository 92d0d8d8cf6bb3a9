//! Pixel-level frontends: strokes, fills, and layer imports.

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use super::Document;
use crate::{
    brush::BrushSetting,
    commands::{Command, FillSample, Insertion},
    io::SaveLoadError,
    state::layers::{LayerError, LayerID, LayerNode},
    surface::{TiledSurface, TILE_SIZE},
    util::Rect,
};

/// Painting done directly on a layer which hasn't been recorded yet.
pub(super) struct PendingStroke {
    layer: LayerID,
    before: TiledSurface,
    started: Instant,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FillOptions {
    /// How far, per channel in `0.0..=1.0`, a colour may be from the seed's to be filled.
    pub tolerance: f32,
    /// Sample colours from all visible layers, instead of just the current one.
    pub sample_merged: bool,
    /// Fill into a new layer above the current one.
    pub make_new_layer: bool,
}
impl Default for FillOptions {
    fn default() -> Self {
        Self {
            tolerance: 0.1,
            sample_merged: false,
            make_new_layer: false,
        }
    }
}

impl Document {
    /// Paint into the current layer. `paint` returns the area it touched, which is reported to
    /// observers right away. The stroke is recorded as one undoable command at the next flush.
    pub fn stroke_surface(
        &mut self,
        paint: impl FnOnce(&mut TiledSurface) -> Rect,
    ) -> Result<Rect, LayerError> {
        let current = self
            .state
            .layers
            .current()
            .ok_or(LayerError::NoCurrentLayer)?;
        if current.locked {
            return Err(LayerError::Locked);
        }
        if current.surface().is_none() {
            return Err(LayerError::NotPainting);
        }
        let layer = current.id();
        if self.stroke.as_ref().is_some_and(|stroke| stroke.layer != layer) {
            self.commit_stroke();
        }
        if self.stroke.is_none() {
            let before = self
                .state
                .layers
                .find(layer)
                .and_then(LayerNode::surface)
                .cloned()
                .unwrap_or_default();
            self.stroke = Some(PendingStroke {
                layer,
                before,
                started: Instant::now(),
            });
        }
        let surface = self
            .state
            .layers
            .current_mut()
            .and_then(LayerNode::surface_mut)
            .ok_or(LayerError::NotPainting)?;
        let touched = paint(surface);
        if !touched.is_empty() {
            self.damage.push(touched.into());
            self.events.canvas_area_modified.emit(&touched.into());
        }
        Ok(touched)
    }
    /// Turn the pending stroke, if any, into a command.
    pub(super) fn commit_stroke(&mut self) {
        let Some(stroke) = self.stroke.take() else {
            return;
        };
        let Some(after) = self
            .state
            .layers
            .find(stroke.layer)
            .and_then(LayerNode::surface)
            .cloned()
        else {
            log::warn!("stroke target {} is gone", stroke.layer);
            return;
        };
        if !after.changed_since(&stroke.before) {
            return;
        }
        self.unsaved_painting_time += stroke.started.elapsed();
        // Failure is logged by `record`.
        let _ = self.record(Command::brushwork(stroke.layer, stroke.before, after));
    }
    /// Notify the document that brush settings changed. Anything but a lightweight change ends the
    /// current stroke.
    pub fn brush_settings_changed(&mut self, changed: &[BrushSetting]) {
        if changed.iter().any(|setting| !setting.is_lightweight()) {
            self.flush_updates();
        }
    }
    /// Flood fill from `(x, y)` with an opaque colour. Returns the limits the fill was given.
    ///
    /// An infinite canvas needs limits. With the frame enabled, fills stay within it. Otherwise
    /// they stay within the data bbox grown to include the seed, or the seed's tile if the
    /// document is empty, letting repeated fills claim more space as they go.
    pub fn flood_fill(
        &mut self,
        x: i32,
        y: i32,
        color: [u8; 3],
        options: FillOptions,
    ) -> Result<Rect, LayerError> {
        self.flush_updates();
        let current = self
            .state
            .layers
            .current()
            .ok_or(LayerError::NoCurrentLayer)?;
        let make_new_layer = options.make_new_layer || !current.is_fillable();
        let mut bounds = self.effective_bbox();
        if bounds.is_empty() {
            bounds = Rect::tile_aligned(x, y, TILE_SIZE);
        } else if !self.state.frame.enabled {
            bounds.expand_to_include_point(x, y);
        }
        let sample = if options.sample_merged {
            FillSample::Merged
        } else {
            FillSample::Layer(current.id())
        };
        let target = if make_new_layer {
            let path = self.current_path_or_err()?;
            Err(Insertion::new(
                &path,
                LayerNode::painting(self.new_layer_name()),
            ))
        } else {
            Ok(current.id())
        };
        let command = Command::flood_fill((x, y), color, options.tolerance, bounds, sample, target);
        self.record(command)?;
        Ok(bounds)
    }
    /// Replace the current layer's pixels with an image placed at `(x, y)`. Returns the new bbox.
    pub fn load_layer_from_rgba(
        &mut self,
        image: &image::RgbaImage,
        x: i32,
        y: i32,
    ) -> Result<Rect, LayerError> {
        self.flush_updates();
        let current = self
            .state
            .layers
            .current()
            .ok_or(LayerError::NoCurrentLayer)?;
        let mut surface = TiledSurface::new();
        let bbox = surface.load_rgba(x, y, image);
        let command = Command::load_layer(&self.state.layers, current.id(), surface)?;
        self.record(command)?;
        Ok(bbox)
    }
    pub fn load_layer_from_png(&mut self, path: &Path, x: i32, y: i32) -> Result<Rect, SaveLoadError> {
        let image = crate::io::raster::read_rgba(path)?;
        Ok(self.load_layer_from_rgba(&image, x, y)?)
    }
    /// Write a layer out for editing in another program. Returns the file to edit, which lives in
    /// the scratch directory.
    pub fn begin_external_layer_edit(&mut self, layer: LayerID) -> Result<PathBuf, SaveLoadError> {
        self.flush_updates();
        let surface = self
            .state
            .layers
            .find(layer)
            .ok_or(LayerError::NotFound)?
            .surface()
            .ok_or(LayerError::NotPainting)?;
        let mut rect = surface.bbox();
        if rect.is_empty() {
            rect = Rect::new(0, 0, TILE_SIZE, TILE_SIZE);
        }
        let image = surface.render_rgba(rect);
        let dir = self
            .scratch_dir()
            .map_err(|e| crate::io::saving_error(e.into()))?;
        let path = dir.join(format!("layer-{}.png", layer.id()));
        crate::io::raster::write_png_file(&image, &path)?;
        self.external_edits.insert(layer, (rect.x, rect.y));
        log::debug!("layer {layer} written for editing at {}", path.display());
        Ok(path)
    }
    /// Load the result of an external edit back into the layer, as an undoable command.
    pub fn update_layer_from_external_edit(
        &mut self,
        layer: LayerID,
        path: &Path,
    ) -> Result<(), SaveLoadError> {
        self.flush_updates();
        let image = crate::io::raster::read_rgba(path)?;
        let (x, y) = self.external_edits.get(&layer).copied().unwrap_or((0, 0));
        let mut surface = TiledSurface::new();
        surface.load_rgba(x, y, &image);
        let command = Command::external_layer_edit(&self.state.layers, layer, surface)?;
        self.record(command).map_err(LayerError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::document::DocumentOptions;

    fn paint(doc: &mut Document, rect: Rect) -> Result<Rect, LayerError> {
        doc.stroke_surface(|surface| {
            surface.fill_rect(rect, [200, 100, 50, 255]);
            rect
        })
    }
    #[test]
    fn strokes_become_one_command() {
        let mut doc = Document::default();
        paint(&mut doc, Rect::new(0, 0, 4, 4)).unwrap();
        paint(&mut doc, Rect::new(4, 0, 4, 4)).unwrap();
        assert!(!doc.history().can_undo());
        // Reading history flushes.
        let last = doc.get_last_command().map(Command::display_name);
        assert_eq!(last, Some("Painting"));
        assert_eq!(doc.history().depth(), (1, 0));
        doc.undo().unwrap();
        assert!(doc.bbox().is_empty());
        doc.redo().unwrap();
        assert_eq!(
            doc.layers().current().unwrap().surface().unwrap().pixel(5, 1),
            [200, 100, 50, 255]
        );
    }
    #[test]
    fn unchanged_strokes_are_dropped() {
        let mut doc = Document::default();
        doc.stroke_surface(|_| Rect::EMPTY).unwrap();
        doc.flush_updates();
        assert!(!doc.history().can_undo());
    }
    #[test]
    fn locked_layers_refuse_paint() {
        let mut doc = Document::default();
        let id = doc.layers().current().unwrap().id();
        doc.set_layer_locked(id, true).unwrap();
        assert_eq!(paint(&mut doc, Rect::new(0, 0, 1, 1)), Err(LayerError::Locked));
    }
    #[test]
    fn lightweight_settings_dont_split() {
        let mut doc = Document::default();
        paint(&mut doc, Rect::new(0, 0, 4, 4)).unwrap();
        doc.brush_settings_changed(&[BrushSetting::ColorH, BrushSetting::RadiusLogarithmic]);
        assert!(!doc.history().can_undo());
        doc.brush_settings_changed(&[BrushSetting::ColorH, BrushSetting::Eraser]);
        assert_eq!(doc.history().depth(), (1, 0));
    }
    #[test]
    fn fill_bounds_tiering() {
        let mut doc = Document::default();
        let red = [255, 0, 0];
        // Empty document: just the seed's tile.
        let first = doc.flood_fill(10, 10, red, FillOptions::default()).unwrap();
        assert_eq!(first, Rect::new(0, 0, TILE_SIZE, TILE_SIZE));
        // Then the data grown to reach the seed.
        let second = doc.flood_fill(200, 200, red, FillOptions::default()).unwrap();
        assert_eq!(second, Rect::new(0, 0, 201, 201));
        assert!(second.contains(10, 10));
        // An enabled frame wins.
        doc.set_frame(Rect::new(0, 0, 32, 32), true).unwrap();
        let framed = doc.flood_fill(100, 100, red, FillOptions::default()).unwrap();
        assert_eq!(framed, Rect::new(0, 0, 32, 32));
    }
    #[test]
    fn fill_into_locked_makes_layer() {
        let mut doc = Document::default();
        let id = doc.layers().current().unwrap().id();
        doc.set_layer_locked(id, true).unwrap();
        doc.flood_fill(1, 1, [0, 0, 255], FillOptions::default()).unwrap();
        assert_eq!(doc.layers().deep_len(), 2);
        let top = doc.layers().get(&[0]).unwrap();
        assert_ne!(top.id(), id);
        assert_eq!(top.surface().unwrap().pixel(1, 1), [0, 0, 255, 255]);
        assert!(doc.layers().get(&[1]).unwrap().is_empty());
        doc.undo().unwrap();
        assert_eq!(doc.layers().deep_len(), 1);
    }
    #[test]
    fn load_layer_replaces_current() {
        let mut doc = Document::default();
        let image = image::RgbaImage::from_pixel(3, 3, image::Rgba([1, 2, 3, 255]));
        let bbox = doc.load_layer_from_rgba(&image, 70, 0).unwrap();
        assert_eq!(bbox, Rect::new(TILE_SIZE, 0, TILE_SIZE, TILE_SIZE));
        assert_eq!(doc.layers().deep_len(), 1);
        doc.undo().unwrap();
        assert!(doc.bbox().is_empty());
    }
    #[test]
    fn external_edit_roundtrip() {
        let mut doc = Document::default();
        paint(&mut doc, Rect::new(64, 64, 2, 2)).unwrap();
        let id = doc.layers().current().unwrap().id();
        let path = doc.begin_external_layer_edit(id).unwrap();
        assert!(path.starts_with(doc.scratch_dir().unwrap()));

        let mut edited = image::open(&path).unwrap().to_rgba8();
        edited.put_pixel(0, 0, image::Rgba([0, 255, 0, 255]));
        edited.save(&path).unwrap();
        doc.update_layer_from_external_edit(id, &path).unwrap();
        let surface = doc.layers().current().unwrap().surface().unwrap();
        // Loaded back at the origin it was written from.
        assert_eq!(surface.pixel(64, 64), [0, 255, 0, 255]);
        assert_eq!(surface.pixel(65, 65), [200, 100, 50, 255]);
        doc.undo().unwrap();
        let surface = doc.layers().current().unwrap().surface().unwrap();
        assert_eq!(surface.pixel(64, 64), [200, 100, 50, 255]);
    }
    #[test]
    fn external_edit_needs_scratch() {
        let mut doc = Document::new(DocumentOptions {
            painting_only: true,
            ..Default::default()
        });
        let id = doc.layers().current().unwrap().id();
        assert!(doc.begin_external_layer_edit(id).is_err());
    }
}
