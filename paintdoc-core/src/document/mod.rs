//! # Document
//!
//! A [`Document`] ties the layer stack and frame to their undo history, and tells observers what
//! changed. All modification goes through [`Document::do_command`] or the frontends built on it,
//! each of which first flushes any pending updates (see [`Document::flush_updates`]).

mod layers;
mod painting;
mod scratch;

pub use painting::FillOptions;
pub use scratch::ScratchDir;

use std::time::Duration;

use crate::{
    commands::{Command, CommandError, CommandKind, CommandStack, CommandUpdate},
    damage::{Damage, DamageTracker},
    events::{Event, Hook, SubscriptionID},
    io::{LoadOptions, SaveLoadError, SaveOptions},
    state::{
        frame::{Frame, FrameUpdate, Resolution, DEFAULT_RESOLUTION},
        layers::{LayerError, LayerID, LayerNode, LayerPath, LayerStack},
        DocumentState,
    },
    surface::TILE_SIZE,
    util::Rect,
};

/// Policy knobs for a document.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DocumentOptions {
    /// Never create a scratch directory. External edits are unavailable.
    pub painting_only: bool,
    /// Keep at least one painting layer around: after clearing, and when the last layer is removed.
    pub create_layer_if_empty: bool,
    /// Longest edge of saved thumbnails, in pixels.
    pub thumbnail_size: u32,
    /// Default JPEG export quality, 1..=100.
    pub jpeg_quality: u8,
    /// How many commands of history to keep. `None` for unlimited.
    pub history_limit: Option<usize>,
}
impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            painting_only: false,
            create_layer_if_empty: true,
            thumbnail_size: 256,
            jpeg_quality: 90,
            history_limit: None,
        }
    }
}

/// What happened to the history.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HistoryChange {
    Did(CommandKind),
    Undid(CommandKind),
    Redid(CommandKind),
    Updated(CommandKind),
    Cleared,
}

#[derive(Default, Debug)]
pub struct DocumentEvents {
    /// An area needing a redraw. `Damage::Full` for everything.
    pub canvas_area_modified: Event<Damage>,
    /// (old, new) frame rectangles.
    pub frame_updated: Event<(Rect, Rect)>,
    pub frame_enabled_changed: Event<bool>,
    pub history_changed: Event<HistoryChange>,
    pub current_layer_changed: Event<Option<LayerPath>>,
}

/// What observers get told about when it changes.
struct Observed {
    frame: Frame,
    current: Option<LayerPath>,
}

pub struct Document {
    state: DocumentState,
    history: CommandStack,
    options: DocumentOptions,
    /// `None` if unset, in which case [`DEFAULT_RESOLUTION`] is reported.
    resolution: Option<Resolution>,
    scratch: Option<ScratchDir>,
    /// Accumulated for views, until taken.
    damage: DamageTracker,
    events: DocumentEvents,
    flush_hooks: Hook<Document>,
    stroke: Option<painting::PendingStroke>,
    unsaved_painting_time: Duration,
    /// Where each layer's external edit file was positioned when written.
    external_edits: hashbrown::HashMap<LayerID, (i32, i32)>,
}
impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("layers", &self.state.layers.deep_len())
            .field("bbox", &self.bbox())
            .field("painting_only", &self.options.painting_only)
            .finish_non_exhaustive()
    }
}
impl Default for Document {
    fn default() -> Self {
        Self::new(DocumentOptions::default())
    }
}
impl Drop for Document {
    fn drop(&mut self) {
        self.cleanup();
    }
}
impl Document {
    #[must_use]
    pub fn new(options: DocumentOptions) -> Self {
        let mut this = Self {
            state: DocumentState::default(),
            history: CommandStack::new(options.history_limit),
            options,
            resolution: None,
            scratch: None,
            damage: DamageTracker::new(),
            events: DocumentEvents::default(),
            flush_hooks: Hook::default(),
            stroke: None,
            unsaved_painting_time: Duration::ZERO,
            external_edits: hashbrown::HashMap::new(),
        };
        this.clear();
        this
    }
    #[must_use]
    pub fn options(&self) -> &DocumentOptions {
        &self.options
    }
    #[must_use]
    pub fn layers(&self) -> &LayerStack {
        &self.state.layers
    }
    #[must_use]
    pub fn history(&self) -> &CommandStack {
        &self.history
    }
    pub fn events_mut(&mut self) -> &mut DocumentEvents {
        &mut self.events
    }
    /// Observers writing pending changes into the document before anything else touches it.
    /// They are expected to push their changes with [`Self::do_command`].
    pub fn connect_flush_updates(
        &mut self,
        handler: impl FnMut(&mut Document) + 'static,
    ) -> SubscriptionID {
        self.flush_hooks.connect(handler)
    }
    pub fn disconnect_flush_updates(&mut self, id: SubscriptionID) -> bool {
        self.flush_hooks.disconnect(id)
    }
    /// Write all pending updates into the document, as commands.
    ///
    /// Re-entrant calls, from within a flush observer, only commit the pending stroke.
    pub fn flush_updates(&mut self) {
        let mut hooks = std::mem::take(&mut self.flush_hooks);
        hooks.call(self);
        self.flush_hooks.restore(hooks);
        self.commit_stroke();
    }

    fn observe(&self) -> Observed {
        Observed {
            frame: self.state.frame,
            current: self.state.layers.current_path().cloned(),
        }
    }
    /// Notify observers of everything that changed since `before` was observed.
    fn publish(&mut self, before: Observed, mut damage: DamageTracker) {
        let bounds = damage.bounds();
        for area in damage.take() {
            self.damage.push(area);
        }
        if !bounds.is_none() {
            self.events.canvas_area_modified.emit(&bounds);
        }
        let frame = self.state.frame;
        if frame.rect != before.frame.rect {
            self.events
                .frame_updated
                .emit(&(before.frame.rect, frame.rect));
        }
        if frame.enabled != before.frame.enabled {
            self.events.frame_enabled_changed.emit(&frame.enabled);
        }
        let current = self.state.layers.current_path().cloned();
        if current != before.current {
            self.events.current_layer_changed.emit(&current);
        }
    }
    /// Apply and record a command without flushing first.
    fn record(&mut self, command: Command) -> Result<(), CommandError> {
        let before = self.observe();
        let kind = command.kind();
        let mut damage = DamageTracker::new();
        if let Err(e) = self
            .history
            .do_command(command, &mut self.state, &mut damage)
        {
            log::error!("failed to apply {kind:?}: {e}");
            return Err(e);
        }
        self.publish(before, damage);
        self.events.history_changed.emit(&HistoryChange::Did(kind));
        Ok(())
    }
    fn update_last_unflushed(&mut self, update: CommandUpdate) -> Result<bool, CommandError> {
        let before = self.observe();
        let mut damage = DamageTracker::new();
        let updated = self
            .history
            .update_last_command(update, &mut self.state, &mut damage)?;
        self.publish(before, damage);
        if let (true, Some(last)) = (updated, self.history.get_last_command()) {
            let kind = last.kind();
            self.events
                .history_changed
                .emit(&HistoryChange::Updated(kind));
        }
        Ok(updated)
    }
    /// Merge into the most recent command if it's of the same kind with the same target,
    /// otherwise do a new one.
    fn do_or_update(
        &mut self,
        kind: CommandKind,
        target: Option<LayerID>,
        update: CommandUpdate,
        make: impl FnOnce(&LayerStack) -> Result<Command, LayerError>,
    ) -> Result<(), LayerError> {
        self.flush_updates();
        let coalesce = self
            .history
            .get_last_command()
            .is_some_and(|last| last.kind() == kind && last.target() == target);
        if coalesce && self.update_last_unflushed(update)? {
            return Ok(());
        }
        let command = make(&self.state.layers)?;
        self.record(command)?;
        Ok(())
    }

    /// Apply a command and push it onto the history, forgetting any redo.
    pub fn do_command(&mut self, command: Command) -> Result<(), CommandError> {
        self.flush_updates();
        self.record(command)
    }
    /// Undo the most recent non-automatic command, along with automatic ones done after it.
    pub fn undo(&mut self) -> Result<Option<&Command>, CommandError> {
        self.flush_updates();
        let before = self.observe();
        let mut damage = DamageTracker::new();
        let undone = self
            .history
            .undo(&mut self.state, &mut damage)?
            .map(Command::kind);
        self.publish(before, damage);
        let Some(kind) = undone else {
            return Ok(None);
        };
        log::debug!("undid {kind:?}");
        self.events.history_changed.emit(&HistoryChange::Undid(kind));
        Ok(self.history.get_last_undone())
    }
    pub fn redo(&mut self) -> Result<Option<&Command>, CommandError> {
        self.flush_updates();
        let before = self.observe();
        let mut damage = DamageTracker::new();
        let redone = self
            .history
            .redo(&mut self.state, &mut damage)?
            .map(Command::kind);
        self.publish(before, damage);
        let Some(kind) = redone else {
            return Ok(None);
        };
        log::debug!("redid {kind:?}");
        self.events.history_changed.emit(&HistoryChange::Redid(kind));
        Ok(self.history.get_last_command())
    }
    /// Merge new parameters into the most recent command. False if it doesn't take them.
    pub fn update_last_command(&mut self, update: CommandUpdate) -> Result<bool, CommandError> {
        self.flush_updates();
        self.update_last_unflushed(update)
    }
    pub fn get_last_command(&mut self) -> Option<&Command> {
        self.flush_updates();
        self.history.get_last_command()
    }

    /// Reset to a single blank layer (per the options), with no history, frame, or resolution.
    pub fn clear(&mut self) {
        self.flush_updates();
        let before = self.observe();
        let mut damage = DamageTracker::new();
        damage.push(self.state.layers.full_redraw_bbox());

        self.close_scratch();
        if !self.options.painting_only {
            match ScratchDir::new() {
                Ok(scratch) => self.scratch = Some(scratch),
                // Retried on demand.
                Err(e) => log::warn!("failed to create scratch dir: {e}"),
            }
        }
        self.history.clear();
        self.state.layers.clear();
        self.external_edits.clear();
        self.stroke = None;
        if self.options.create_layer_if_empty {
            let blank = LayerNode::painting(self.new_layer_name());
            self.state.layers = LayerStack::from_children(vec![blank]);
        }
        self.unsaved_painting_time = Duration::ZERO;
        self.state.frame = Frame::default();
        self.resolution = None;

        self.publish(before, damage);
        self.events.history_changed.emit(&HistoryChange::Cleared);
    }
    /// Replace everything with freshly loaded content. History is forgotten.
    pub(crate) fn replace_contents(
        &mut self,
        layers: LayerStack,
        frame: Frame,
        resolution: Option<Resolution>,
    ) {
        let before = self.observe();
        let mut damage = DamageTracker::new();
        damage.push(Damage::Full);
        self.history.clear();
        self.external_edits.clear();
        self.stroke = None;
        self.state = DocumentState { layers, frame };
        self.resolution = resolution;
        self.unsaved_painting_time = Duration::ZERO;
        self.publish(before, damage);
        self.events.history_changed.emit(&HistoryChange::Cleared);
    }
    /// Remove the scratch directory. Also done on drop.
    pub fn cleanup(&mut self) {
        self.close_scratch();
    }
    fn close_scratch(&mut self) {
        if let Some(scratch) = self.scratch.take() {
            scratch.close();
        }
    }
    /// The working directory for temporary files, created if needed.
    pub fn scratch_dir(&mut self) -> std::io::Result<&std::path::Path> {
        if self.options.painting_only {
            return Err(std::io::Error::other(
                "painting-only documents have no scratch directory",
            ));
        }
        let scratch = match self.scratch.take() {
            Some(scratch) => scratch,
            None => ScratchDir::new()?,
        };
        Ok(self.scratch.insert(scratch).path())
    }
    /// A name for a new layer, unique-ish within this document.
    #[must_use]
    pub fn new_layer_name(&self) -> String {
        format!("Layer {}", self.state.layers.deep_len() + 1)
    }

    /// Nominal resolution in pixels per inch.
    #[must_use]
    pub fn resolution(&self) -> u32 {
        self.resolution
            .map_or(DEFAULT_RESOLUTION, Resolution::effective)
    }
    /// The resolution as stored, `None` if unset.
    #[must_use]
    pub fn stored_resolution(&self) -> Option<Resolution> {
        self.resolution
    }
    /// Set both axes to `res`, at least one. `None` unsets.
    pub fn set_resolution(&mut self, res: Option<u32>) {
        self.resolution = res.map(|res| {
            let res = res.max(1);
            Resolution {
                xres: res,
                yres: res,
            }
        });
    }

    #[must_use]
    pub fn frame(&self) -> Rect {
        self.state.frame.rect
    }
    #[must_use]
    pub fn frame_enabled(&self) -> bool {
        self.state.frame.enabled
    }
    pub fn set_frame(&mut self, rect: Rect, user_initiated: bool) -> Result<(), CommandError> {
        self.update_frame(FrameUpdate::from_rect(rect), user_initiated)
    }
    /// Change parts of the frame rectangle.
    ///
    /// User-initiated updates are undoable, enable the frame, and merge into an immediately
    /// preceding frame update. Others take effect directly.
    pub fn update_frame(
        &mut self,
        update: FrameUpdate,
        user_initiated: bool,
    ) -> Result<(), CommandError> {
        if user_initiated {
            self.flush_updates();
            let coalesce = self
                .history
                .get_last_command()
                .is_some_and(|last| last.kind() == CommandKind::UpdateFrame);
            if coalesce && self.update_last_unflushed(CommandUpdate::Frame(update))? {
                return Ok(());
            }
            return self.record(Command::update_frame(self.state.frame, update));
        }
        let rect = update.apply_to(self.state.frame.rect);
        if rect != self.state.frame.rect {
            let before = self.observe();
            self.state.frame.rect = rect;
            self.publish(before, DamageTracker::new());
        }
        Ok(())
    }
    pub fn set_frame_enabled(
        &mut self,
        enabled: bool,
        user_initiated: bool,
    ) -> Result<(), CommandError> {
        self.flush_updates();
        if self.state.frame.enabled == enabled {
            return Ok(());
        }
        if user_initiated {
            return self.do_command(Command::set_frame_enabled(self.state.frame, enabled));
        }
        let before = self.observe();
        self.state.frame.enabled = enabled;
        self.publish(before, DamageTracker::new());
        Ok(())
    }
    pub fn set_frame_to_current_layer(&mut self, user_initiated: bool) -> Result<(), LayerError> {
        let bbox = self
            .state
            .layers
            .current()
            .ok_or(LayerError::NoCurrentLayer)?
            .bbox();
        Ok(self.set_frame(bbox, user_initiated)?)
    }
    pub fn set_frame_to_document(&mut self, user_initiated: bool) -> Result<(), CommandError> {
        self.set_frame(self.bbox(), user_initiated)
    }

    /// Union of every layer's data.
    #[must_use]
    pub fn bbox(&self) -> Rect {
        self.state.layers.bbox()
    }
    #[must_use]
    pub fn full_redraw_bbox(&self) -> Damage {
        self.state.layers.full_redraw_bbox()
    }
    /// The frame if enabled, otherwise the data bbox.
    #[must_use]
    pub fn effective_bbox(&self) -> Rect {
        if self.state.frame.enabled {
            self.state.frame.rect
        } else {
            self.bbox()
        }
    }
    /// The effective bbox, or a single tile at the origin if that's empty.
    #[must_use]
    pub fn export_rect(&self) -> Rect {
        let rect = self.effective_bbox();
        if rect.is_empty() {
            Rect::new(0, 0, TILE_SIZE, TILE_SIZE)
        } else {
            rect
        }
    }
    /// Ask for everything to be redrawn.
    pub fn invalidate_all(&mut self) {
        self.damage.push(Damage::Full);
        self.events.canvas_area_modified.emit(&Damage::Full);
    }
    /// Drain the damage accumulated since the last call.
    pub fn take_damage(&mut self) -> Vec<Damage> {
        self.damage.take()
    }
    /// Time spent painting since the last save, load, or clear.
    #[must_use]
    pub fn unsaved_painting_time(&self) -> Duration {
        self.unsaved_painting_time
    }
    /// The effective bbox, scaled to fit in a `max_size` square.
    #[must_use]
    pub fn render_thumbnail(&self, max_size: u32) -> image::RgbaImage {
        let started = std::time::Instant::now();
        let thumb = self
            .state
            .layers
            .render_thumbnail(self.export_rect(), max_size);
        log::info!("rendered thumbnail in {:?}", started.elapsed());
        thumb
    }

    /// Save to a file, choosing the format by extension. Returns a thumbnail, if the format has one.
    pub fn save(
        &mut self,
        path: &std::path::Path,
        options: &SaveOptions,
    ) -> Result<Option<image::RgbaImage>, SaveLoadError> {
        self.flush_updates();
        let thumbnail = crate::io::save(self, path, options)?;
        self.unsaved_painting_time = Duration::ZERO;
        Ok(thumbnail)
    }
    /// Replace the document with the contents of a file, choosing the format by extension.
    ///
    /// On failure, the document should be cleared or discarded.
    pub fn load(
        &mut self,
        path: &std::path::Path,
        options: &LoadOptions,
    ) -> Result<(), SaveLoadError> {
        crate::io::load(self, path, options)?;
        self.history.clear();
        self.unsaved_painting_time = Duration::ZERO;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    fn painted(doc: &mut Document, rect: Rect) {
        doc.stroke_surface(|surface| {
            surface.fill_rect(rect, [10, 20, 30, 255]);
            rect
        })
        .unwrap();
        doc.flush_updates();
    }

    #[test]
    fn starts_with_blank_layer() {
        let doc = Document::default();
        assert_eq!(doc.layers().deep_len(), 1);
        assert_eq!(doc.layers().current_path().map(|p| p.to_vec()), Some(vec![0]));
        assert!(!doc.history().can_undo());
        assert_eq!(doc.resolution(), DEFAULT_RESOLUTION);
        assert!(doc.bbox().is_empty());

        let doc = Document::new(DocumentOptions {
            create_layer_if_empty: false,
            painting_only: true,
            ..Default::default()
        });
        assert!(doc.layers().is_empty());
        assert!(doc.layers().current_path().is_none());
    }
    #[test]
    fn undo_redo_roundtrip() {
        let mut doc = Document::default();
        painted(&mut doc, Rect::new(0, 0, 10, 10));
        doc.add_layer(&[0], LayerNode::painting("two")).unwrap();
        doc.set_current_layer_opacity(0.5).unwrap();
        let snapshot = doc.layers().clone();
        let frame = doc.state.frame;

        while doc.undo().unwrap().is_some() {}
        assert!(doc.bbox().is_empty());
        assert_eq!(doc.layers().deep_len(), 1);
        while doc.redo().unwrap().is_some() {}
        assert_eq!(*doc.layers(), snapshot);
        assert_eq!(doc.state.frame, frame);
    }
    #[test]
    fn do_clears_redo() {
        let mut doc = Document::default();
        doc.add_layer(&[0], LayerNode::painting("a")).unwrap();
        doc.undo().unwrap();
        assert!(doc.history().can_redo());
        doc.add_layer(&[0], LayerNode::painting("b")).unwrap();
        assert!(!doc.history().can_redo());
    }
    #[test]
    fn opacity_coalesces_per_layer() {
        let mut doc = Document::default();
        for opacity in [0.9, 0.7, 0.5] {
            doc.set_current_layer_opacity(opacity).unwrap();
        }
        assert_eq!(doc.history().depth(), (1, 0));
        doc.add_layer(&[0], LayerNode::painting("other")).unwrap();
        doc.set_current_layer_opacity(0.2).unwrap();
        assert_eq!(doc.history().depth(), (3, 0));
        doc.undo().unwrap();
        doc.undo().unwrap();
        assert_eq!(doc.layers().current().map(|l| l.opacity), Some(0.5));
        doc.undo().unwrap();
        assert_eq!(doc.layers().current().map(|l| l.opacity), Some(1.0));
    }
    #[test]
    fn select_is_skipped_by_undo() {
        let mut doc = Document::default();
        doc.add_layer(&[0], LayerNode::painting("top")).unwrap();
        let bottom = doc.layers().get(&[1]).unwrap().id();
        doc.set_layer_visibility(bottom, false).unwrap();
        doc.select_layer(&[1]).unwrap();
        let undone = doc.undo().unwrap().map(Command::display_name);
        assert_eq!(undone, Some("Layer Visibility"));
        assert!(doc.layers().get(&[1]).unwrap().visible);
        assert_eq!(doc.layers().current_path().map(|p| p.to_vec()), Some(vec![0]));
    }
    #[test]
    fn events_fire() {
        let mut doc = Document::default();
        let areas = Rc::new(RefCell::new(Vec::new()));
        let frames = Rc::new(RefCell::new(Vec::new()));
        {
            let areas = areas.clone();
            doc.events_mut()
                .canvas_area_modified
                .connect(move |damage| areas.borrow_mut().push(damage.to_xywh()));
            let frames = frames.clone();
            doc.events_mut()
                .frame_updated
                .connect(move |(old, new)| frames.borrow_mut().push((*old, *new)));
        }
        painted(&mut doc, Rect::new(0, 0, 4, 4));
        doc.set_frame(Rect::new(1, 2, 3, 4), true).unwrap();
        assert!(doc.frame_enabled());
        assert_eq!(
            *frames.borrow(),
            vec![(Rect::EMPTY, Rect::new(1, 2, 3, 4))]
        );
        let areas = areas.borrow();
        assert!(areas.contains(&(0, 0, TILE_SIZE, TILE_SIZE)));
        // Frame changes redraw everything.
        assert_eq!(areas.last(), Some(&(0, 0, 0, 0)));
    }
    #[test]
    fn history_events() {
        let mut doc = Document::default();
        let changes = Rc::new(RefCell::new(Vec::new()));
        {
            let changes = changes.clone();
            doc.events_mut()
                .history_changed
                .connect(move |change| changes.borrow_mut().push(*change));
        }
        doc.add_layer(&[0], LayerNode::painting("a")).unwrap();
        doc.set_current_layer_opacity(0.5).unwrap();
        doc.set_current_layer_opacity(0.25).unwrap();
        doc.undo().unwrap();
        doc.redo().unwrap();
        // Nothing left to redo, so nothing to report.
        doc.redo().unwrap();
        doc.clear();
        assert_eq!(
            *changes.borrow(),
            vec![
                HistoryChange::Did(CommandKind::AddLayer),
                HistoryChange::Did(CommandKind::SetLayerOpacity),
                HistoryChange::Updated(CommandKind::SetLayerOpacity),
                HistoryChange::Undid(CommandKind::SetLayerOpacity),
                HistoryChange::Redid(CommandKind::SetLayerOpacity),
                HistoryChange::Cleared,
            ]
        );
    }
    #[test]
    fn frame_toggle_sees_pending_work() {
        let mut doc = Document::default();
        let mut pending = true;
        doc.connect_flush_updates(move |doc| {
            if std::mem::take(&mut pending) {
                doc.set_frame_enabled(true, false).unwrap();
            }
        });
        // The pending enable lands first, so this is a real change.
        doc.set_frame_enabled(false, true).unwrap();
        assert!(!doc.frame_enabled());
        assert_eq!(doc.history().depth(), (1, 0));
        doc.undo().unwrap();
        assert!(doc.frame_enabled());
    }
    #[test]
    fn frame_updates_coalesce() {
        let mut doc = Document::default();
        doc.set_frame(Rect::new(0, 0, 10, 10), true).unwrap();
        doc.update_frame(
            FrameUpdate {
                width: Some(50),
                ..Default::default()
            },
            true,
        )
        .unwrap();
        assert_eq!(doc.history().depth(), (1, 0));
        assert_eq!(doc.frame(), Rect::new(0, 0, 50, 10));
        doc.undo().unwrap();
        assert_eq!(doc.frame(), Rect::EMPTY);
        assert!(!doc.frame_enabled());
        // Not user initiated: no history, frame stays disabled.
        doc.set_frame(Rect::new(5, 5, 5, 5), false).unwrap();
        assert_eq!(doc.frame(), Rect::new(5, 5, 5, 5));
        assert!(!doc.frame_enabled());
        assert!(!doc.history().can_undo());
    }
    #[test]
    fn effective_bbox_prefers_enabled_frame() {
        let mut doc = Document::default();
        painted(&mut doc, Rect::new(0, 0, 4, 4));
        assert_eq!(doc.effective_bbox(), doc.bbox());
        doc.set_frame(Rect::new(-5, -5, 10, 10), true).unwrap();
        assert_eq!(doc.effective_bbox(), Rect::new(-5, -5, 10, 10));
    }
    #[test]
    fn resolution() {
        let mut doc = Document::default();
        doc.set_resolution(Some(0));
        assert_eq!(doc.resolution(), 1);
        doc.set_resolution(Some(300));
        assert_eq!(doc.resolution(), 300);
        doc.clear();
        assert_eq!(doc.resolution(), DEFAULT_RESOLUTION);
    }
    #[test]
    fn flush_hooks_commit_pending_work() {
        let mut doc = Document::default();
        let id = doc.connect_flush_updates(|doc| {
            // Re-entrancy is harmless.
            doc.flush_updates();
            if doc.layers().deep_len() == 1 {
                let name = doc.new_layer_name();
                doc.do_command(Command::add_layer(&[0], LayerNode::painting(name)))
                    .unwrap();
            }
        });
        doc.flush_updates();
        assert_eq!(doc.layers().deep_len(), 2);
        assert!(doc.disconnect_flush_updates(id));
        assert!(!doc.disconnect_flush_updates(id));
    }
    #[test]
    fn clear_resets() {
        let mut doc = Document::default();
        painted(&mut doc, Rect::new(0, 0, 4, 4));
        doc.set_frame(Rect::new(0, 0, 4, 4), true).unwrap();
        doc.clear();
        assert!(doc.bbox().is_empty());
        assert!(!doc.history().can_undo());
        assert_eq!(doc.frame(), Rect::EMPTY);
        assert!(!doc.frame_enabled());
        assert_eq!(doc.unsaved_painting_time(), Duration::ZERO);
    }
    #[test]
    fn scratch_dir_lifecycle() {
        let mut doc = Document::default();
        let path = doc.scratch_dir().unwrap().to_owned();
        assert!(path.is_dir());
        doc.cleanup();
        assert!(!path.exists());
        // Recreated on demand.
        assert!(doc.scratch_dir().unwrap().is_dir());

        let mut painting_only = Document::new(DocumentOptions {
            painting_only: true,
            ..Default::default()
        });
        assert!(painting_only.scratch_dir().is_err());
    }
}
