//! CPU flattening of the layer tree, for export, thumbnails, and sampling.
//!
//! Every blend mode composites as normal source-over. Pass-through groups composite their children
//! directly into the backdrop, other groups are flattened in isolation first.

use super::{LayerKind, LayerNode, LayerStack};
use crate::{surface::TiledSurface, util::Rect};

/// Composite visible `nodes` (top first) onto `backdrop`. Solid colours are realized within `rect`,
/// or skipped entirely if `rect` is `None`.
fn composite_into(backdrop: &mut TiledSurface, nodes: &[LayerNode], rect: Option<Rect>) {
    for node in nodes.iter().rev().filter(|node| node.visible) {
        match &node.kind {
            LayerKind::Painting(surface) => backdrop.composite_over(surface, node.opacity),
            LayerKind::SolidColor(color) => {
                let Some(rect) = rect else { continue };
                let mut fill = TiledSurface::new();
                fill.fill_rect(rect, *color);
                backdrop.composite_over(&fill, node.opacity);
            }
            LayerKind::Group(children) if node.mode == crate::blend::BlendMode::PassThrough => {
                composite_into(backdrop, children, rect);
            }
            LayerKind::Group(children) => {
                let mut isolated = TiledSurface::new();
                composite_into(&mut isolated, children, rect);
                backdrop.composite_over(&isolated, node.opacity);
            }
        }
    }
}

impl LayerNode {
    /// This node alone, flattened. Meaningful within `rect`.
    #[must_use]
    pub fn flatten(&self, rect: Rect) -> TiledSurface {
        let mut out = TiledSurface::new();
        // Render even if hidden, this is an explicit request for this node.
        match &self.kind {
            LayerKind::Painting(surface) => return surface.clone(),
            LayerKind::SolidColor(color) => out.fill_rect(rect, *color),
            LayerKind::Group(children) => composite_into(&mut out, children, Some(rect)),
        }
        out
    }
}

impl LayerStack {
    /// All visible layers, flattened. Meaningful within `rect`.
    #[must_use]
    pub fn flatten(&self, rect: Rect) -> TiledSurface {
        let mut out = TiledSurface::new();
        composite_into(&mut out, &self.children, Some(rect));
        out
    }
    /// All visible painting layers flattened, ignoring solid colours.
    #[must_use]
    pub fn flatten_painted(&self) -> TiledSurface {
        let mut out = TiledSurface::new();
        composite_into(&mut out, &self.children, None);
        out
    }
    #[must_use]
    pub fn render_rgba(&self, rect: Rect) -> image::RgbaImage {
        self.flatten(rect).render_rgba(rect)
    }
    /// Render `rect`, scaled down to fit within a `max_size` square if larger.
    #[must_use]
    pub fn render_thumbnail(&self, rect: Rect, max_size: u32) -> image::RgbaImage {
        let full = self.render_rgba(rect);
        let (w, h) = full.dimensions();
        let longest = w.max(h);
        if longest <= max_size || longest == 0 {
            return full;
        }
        let scale = f64::from(max_size) / f64::from(longest);
        let scaled = |dim: u32| ((f64::from(dim) * scale).round() as u32).max(1);
        image::imageops::thumbnail(&full, scaled(w), scaled(h))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn hidden_layers_dont_render() {
        let mut top = LayerNode::painting("top");
        top.surface_mut().unwrap().set_pixel(0, 0, [255, 0, 0, 255]);
        top.visible = false;
        let bg = LayerNode::solid_color("bg", [0, 0, 255, 255]);
        let stack = LayerStack::from_children(vec![top, bg]);
        let image = stack.render_rgba(Rect::new(0, 0, 2, 2));
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 255, 255]);
        assert!(stack.flatten_painted().is_empty());
    }
    #[test]
    fn group_opacity_applies_once() {
        let mut a = LayerNode::painting("a");
        a.surface_mut().unwrap().set_pixel(0, 0, [255, 0, 0, 255]);
        let mut b = LayerNode::painting("b");
        b.surface_mut().unwrap().set_pixel(0, 0, [255, 0, 0, 255]);
        let mut group = LayerNode::group("g", vec![a, b]);
        group.opacity = 0.5;
        let stack = LayerStack::from_children(vec![group]);
        let image = stack.render_rgba(Rect::new(0, 0, 1, 1));
        // Isolated: the two opaque reds flatten to one opaque red, then halve.
        assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0, 128]);
    }
    #[test]
    fn thumbnail_fits() {
        let mut layer = LayerNode::painting("a");
        layer
            .surface_mut()
            .unwrap()
            .fill_rect(Rect::new(0, 0, 200, 100), [1, 2, 3, 255]);
        let stack = LayerStack::from_children(vec![layer]);
        let thumb = stack.render_thumbnail(Rect::new(0, 0, 200, 100), 50);
        assert_eq!(thumb.dimensions(), (50, 25));
    }
}
