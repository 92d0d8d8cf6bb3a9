//! Layer-editing frontends. These validate against the current state and turn requests into commands.

use super::Document;
use crate::{
    blend::BlendMode,
    commands::{Command, CommandKind, CommandUpdate},
    state::layers::{LayerError, LayerID, LayerNode, LayerPath},
};

impl Document {
    pub(super) fn current_path_or_err(&self) -> Result<LayerPath, LayerError> {
        self.state
            .layers
            .current_path()
            .cloned()
            .ok_or(LayerError::NoCurrentLayer)
    }
    /// Insert a layer at an insertion path, making it current.
    pub fn add_layer(&mut self, path: &[usize], node: LayerNode) -> Result<(), LayerError> {
        if !self.state.layers.is_insertion_path(path) {
            return Err(LayerError::InvalidPath(path.into()));
        }
        Ok(self.do_command(Command::add_layer(path, node))?)
    }
    /// Remove the current layer. Does nothing if there is none.
    ///
    /// Removing the last layer puts a blank one in its place, if the document is set up to.
    pub fn remove_current_layer(&mut self) -> Result<(), LayerError> {
        self.flush_updates();
        let Some(path) = self.state.layers.current_path().cloned() else {
            return Ok(());
        };
        let empties = path.len() == 1 && self.state.layers.len() == 1;
        let placeholder = (empties && self.options.create_layer_if_empty)
            .then(|| LayerNode::painting(self.new_layer_name()));
        let command = Command::remove_layer(&self.state.layers, &path, placeholder)?;
        Ok(self.record(command)?)
    }
    /// Select a layer. Selection is undone along with whatever command comes before it.
    pub fn select_layer(&mut self, path: &[usize]) -> Result<(), LayerError> {
        self.flush_updates();
        let command = Command::select_layer(&self.state.layers, path)?;
        Ok(self.record(command)?)
    }
    pub fn rename_current_layer(&mut self, name: impl Into<String>) -> Result<(), LayerError> {
        self.flush_updates();
        let Some(current) = self.state.layers.current() else {
            return Ok(());
        };
        let command = Command::rename_layer(&self.state.layers, current.id(), name.into())?;
        Ok(self.record(command)?)
    }
    /// Move the layer at `src` to the insertion path `target`, as seen before the move.
    pub fn restack_layer(&mut self, src: &[usize], target: &[usize]) -> Result<(), LayerError> {
        self.flush_updates();
        log::debug!("restack layer at {src:?} to {target:?}");
        let command = Command::restack_layer(&self.state.layers, src, target)?;
        Ok(self.record(command)?)
    }
    /// Swap the current layer with the sibling above it. False if it's already at the top.
    pub fn bubble_current_layer_up(&mut self) -> Result<bool, LayerError> {
        let path = self.current_path_or_err()?;
        let mut target = path.clone();
        match target.last_mut() {
            Some(idx) if *idx > 0 => *idx -= 1,
            _ => return Ok(false),
        }
        self.restack_layer(&path, &target)?;
        Ok(true)
    }
    /// Swap the current layer with the sibling below it. False if it's already at the bottom.
    pub fn bubble_current_layer_down(&mut self) -> Result<bool, LayerError> {
        let path = self.current_path_or_err()?;
        let mut below = path.clone();
        if let Some(idx) = below.last_mut() {
            *idx += 1;
        }
        if self.state.layers.get(&below).is_none() {
            return Ok(false);
        }
        // Insertion paths are as seen before the move, so skip past the sibling.
        let mut target = below;
        if let Some(idx) = target.last_mut() {
            *idx += 1;
        }
        self.restack_layer(&path, &target)?;
        Ok(true)
    }
    pub fn duplicate_current_layer(&mut self) -> Result<(), LayerError> {
        self.flush_updates();
        let path = self.current_path_or_err()?;
        let command = Command::duplicate_layer(&self.state.layers, &path)?;
        Ok(self.record(command)?)
    }
    /// Erase the current layer. Does nothing unless it's a painting layer with content.
    pub fn clear_current_layer(&mut self) -> Result<(), LayerError> {
        self.flush_updates();
        let Some(current) = self.state.layers.current() else {
            return Ok(());
        };
        if current.surface().is_none() || current.is_empty() {
            return Ok(());
        }
        let command = Command::clear_layer(&self.state.layers, current.id())?;
        Ok(self.record(command)?)
    }
    /// Merge the current layer into the one below. False if that's not possible here.
    pub fn merge_current_layer_down(&mut self) -> Result<bool, LayerError> {
        self.flush_updates();
        let Some(path) = self.state.layers.current_path().cloned() else {
            return Ok(false);
        };
        if self.state.layers.merge_down_target(&path).is_none() {
            log::info!("merge down is not possible here");
            return Ok(false);
        }
        let command = Command::merge_layer_down(&self.state.layers, &path)?;
        self.record(command)?;
        Ok(true)
    }
    pub fn merge_visible_layers(&mut self) -> Result<(), LayerError> {
        Ok(self.do_command(Command::merge_visible_layers())?)
    }
    pub fn set_layer_visibility(&mut self, layer: LayerID, visible: bool) -> Result<(), LayerError> {
        self.do_or_update(
            CommandKind::SetLayerVisibility,
            Some(layer),
            CommandUpdate::Visible(visible),
            |layers| Command::set_layer_visibility(layers, layer, visible),
        )
    }
    /// Locked layers can't be painted or filled.
    pub fn set_layer_locked(&mut self, layer: LayerID, locked: bool) -> Result<(), LayerError> {
        self.do_or_update(
            CommandKind::SetLayerLocked,
            Some(layer),
            CommandUpdate::Locked(locked),
            |layers| Command::set_layer_locked(layers, layer, locked),
        )
    }
    /// Consecutive changes to the same layer's opacity become one undo step.
    /// Pass-through groups have no opacity of their own, so they are left alone.
    pub fn set_current_layer_opacity(&mut self, opacity: f32) -> Result<(), LayerError> {
        let Some(current) = self.state.layers.current() else {
            return Ok(());
        };
        if current.mode == BlendMode::PassThrough {
            return Ok(());
        }
        let layer = current.id();
        log::debug!("setting current layer opacity: {opacity}");
        self.do_or_update(
            CommandKind::SetLayerOpacity,
            Some(layer),
            CommandUpdate::Opacity(opacity),
            |layers| Command::set_layer_opacity(layers, layer, opacity),
        )
    }
    /// Consecutive mode changes to the same layer become one undo step.
    pub fn set_current_layer_mode(&mut self, mode: BlendMode) -> Result<(), LayerError> {
        let Some(layer) = self.state.layers.current().map(LayerNode::id) else {
            return Ok(());
        };
        self.do_or_update(
            CommandKind::SetLayerMode,
            Some(layer),
            CommandUpdate::Mode(mode),
            |layers| Command::set_layer_mode(layers, layer, mode),
        )
    }
    /// Bake the current layer's opacity into its pixels, leaving it in normal mode at full
    /// opacity. Does nothing if it already is.
    pub fn normalize_current_layer_mode(&mut self) -> Result<(), LayerError> {
        self.flush_updates();
        let Some(current) = self.state.layers.current() else {
            return Ok(());
        };
        if current.mode == BlendMode::Normal && current.opacity >= 1.0 {
            return Ok(());
        }
        let command = Command::normalize_layer_mode(&self.state.layers, current.id())?;
        Ok(self.record(command)?)
    }
    /// Erase everything in the current layer outside of the frame. Does nothing if the frame is disabled.
    pub fn trim_current_layer(&mut self) -> Result<(), LayerError> {
        if !self.state.frame.enabled {
            return Ok(());
        }
        self.flush_updates();
        let current = self
            .state
            .layers
            .current()
            .ok_or(LayerError::NoCurrentLayer)?;
        let command = Command::trim_layer(&self.state.layers, current.id(), self.state.frame.rect)?;
        Ok(self.record(command)?)
    }
}

#[cfg(test)]
mod test {
    use super::super::{Document, DocumentOptions};
    use crate::{blend::BlendMode, state::layers::LayerNode, util::Rect};

    fn names(doc: &Document) -> Vec<String> {
        doc.layers().deepiter().map(|n| n.name.clone()).collect()
    }
    fn three_layers() -> Document {
        let mut doc = Document::default();
        doc.rename_current_layer("c").unwrap();
        doc.add_layer(&[0], LayerNode::painting("b")).unwrap();
        doc.add_layer(&[0], LayerNode::painting("a")).unwrap();
        doc
    }
    #[test]
    fn removing_last_layer_keeps_one() {
        let mut doc = Document::default();
        doc.remove_current_layer().unwrap();
        assert_eq!(doc.layers().deep_len(), 1);
        assert_eq!(doc.layers().current_path().map(|p| p.to_vec()), Some(vec![0]));
        // Both the removal and the replacement undo together.
        let original = doc.undo().unwrap().map(|c| c.display_name());
        assert_eq!(original, Some("Remove Layer"));
        assert_eq!(names(&doc), vec!["Layer 1"]);

        let mut bare = Document::new(DocumentOptions {
            create_layer_if_empty: false,
            ..Default::default()
        });
        bare.add_layer(&[0], LayerNode::painting("x")).unwrap();
        bare.remove_current_layer().unwrap();
        assert!(bare.layers().is_empty());
        // Nothing to remove.
        bare.remove_current_layer().unwrap();
    }
    #[test]
    fn bubbling() {
        let mut doc = three_layers();
        assert_eq!(names(&doc), vec!["a", "b", "c"]);
        assert!(!doc.bubble_current_layer_up().unwrap());
        assert!(doc.bubble_current_layer_down().unwrap());
        assert_eq!(names(&doc), vec!["b", "a", "c"]);
        assert!(doc.bubble_current_layer_down().unwrap());
        assert_eq!(names(&doc), vec!["b", "c", "a"]);
        assert!(!doc.bubble_current_layer_down().unwrap());
        assert!(doc.bubble_current_layer_up().unwrap());
        assert_eq!(names(&doc), vec!["b", "a", "c"]);
    }
    #[test]
    fn merge_down_reports_impossible() {
        let mut doc = Document::default();
        assert!(!doc.merge_current_layer_down().unwrap());
        let mut doc = three_layers();
        assert!(doc.merge_current_layer_down().unwrap());
        assert_eq!(names(&doc), vec!["b", "c"]);
    }
    #[test]
    fn clear_is_noop_when_empty() {
        let mut doc = Document::default();
        doc.clear_current_layer().unwrap();
        assert!(!doc.history().can_undo());
    }
    #[test]
    fn duplicate_goes_above() {
        let mut doc = three_layers();
        doc.select_layer(&[1]).unwrap();
        doc.duplicate_current_layer().unwrap();
        assert_eq!(names(&doc), vec!["a", "b Copy", "b", "c"]);
        assert_eq!(doc.layers().current_path().map(|p| p.to_vec()), Some(vec![1]));
    }
    #[test]
    fn trim_needs_frame() {
        let mut doc = Document::default();
        doc.trim_current_layer().unwrap();
        assert!(!doc.history().can_undo());
        doc.set_frame(Rect::new(0, 0, 8, 8), true).unwrap();
        doc.trim_current_layer().unwrap();
        assert_eq!(doc.history().depth(), (2, 0));
    }
    #[test]
    fn mode_changes_coalesce() {
        let mut doc = Document::default();
        doc.set_current_layer_mode(BlendMode::Multiply).unwrap();
        doc.set_current_layer_mode(BlendMode::Screen).unwrap();
        assert_eq!(doc.history().depth(), (1, 0));
        assert_eq!(doc.layers().current().map(|l| l.mode), Some(BlendMode::Screen));
        doc.add_layer(&[0], LayerNode::painting("other")).unwrap();
        doc.set_current_layer_mode(BlendMode::Darken).unwrap();
        assert_eq!(doc.history().depth(), (3, 0));
        doc.undo().unwrap();
        doc.undo().unwrap();
        doc.undo().unwrap();
        assert_eq!(doc.layers().current().map(|l| l.mode), Some(BlendMode::Normal));
    }
    #[test]
    fn normalize_bakes_opacity() {
        let mut doc = Document::default();
        doc.stroke_surface(|surface| {
            let rect = Rect::new(0, 0, 2, 2);
            surface.fill_rect(rect, [200, 100, 50, 200]);
            rect
        })
        .unwrap();
        doc.set_current_layer_opacity(0.5).unwrap();
        doc.set_current_layer_mode(BlendMode::Multiply).unwrap();
        let depth = doc.history().depth().0;

        doc.normalize_current_layer_mode().unwrap();
        let layer = doc.layers().current().unwrap();
        assert_eq!(layer.mode, BlendMode::Normal);
        assert_eq!(layer.opacity, 1.0);
        assert_eq!(layer.surface().unwrap().pixel(1, 1), [200, 100, 50, 100]);
        assert_eq!(doc.history().depth().0, depth + 1);
        // Already normal.
        doc.normalize_current_layer_mode().unwrap();
        assert_eq!(doc.history().depth().0, depth + 1);

        let undone = doc.undo().unwrap().map(|c| c.display_name());
        assert_eq!(undone, Some("Normalize Layer Mode"));
        let layer = doc.layers().current().unwrap();
        assert_eq!(layer.mode, BlendMode::Multiply);
        assert_eq!(layer.opacity, 0.5);
        assert_eq!(layer.surface().unwrap().pixel(1, 1), [200, 100, 50, 200]);

        doc.redo().unwrap();
        let layer = doc.layers().current().unwrap();
        assert_eq!(layer.mode, BlendMode::Normal);
        assert_eq!(layer.surface().unwrap().pixel(1, 1), [200, 100, 50, 100]);
    }
    #[test]
    fn normalize_needs_pixels() {
        let mut doc = Document::default();
        let mut group = LayerNode::group("g", vec![]);
        group.opacity = 0.5;
        doc.add_layer(&[0], group).unwrap();
        assert_eq!(
            doc.normalize_current_layer_mode().unwrap_err(),
            crate::state::layers::LayerError::NotPainting
        );
    }
    #[test]
    fn pass_through_has_no_opacity() {
        let mut doc = Document::default();
        let mut group = LayerNode::group("g", vec![]);
        group.mode = BlendMode::PassThrough;
        doc.add_layer(&[0], group).unwrap();
        doc.set_current_layer_opacity(0.5).unwrap();
        assert_eq!(doc.layers().current().map(|l| l.opacity), Some(1.0));
    }
}
