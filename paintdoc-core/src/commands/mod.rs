//! # Commands
//!
//! Commands are the only way the layers and frame of a document are modified. Each one knows how to
//! apply and revert itself, reporting the area of the canvas that changed either way.
//!
//! Commands which write pixels snapshot the target surface the first time they're applied. Redoing
//! restores the snapshot rather than re-running the edit, so redo is exact even for effects that
//! depend on their surroundings (fills sampling other layers, strokes).

mod stack;

pub use stack::CommandStack;

use az::SaturatingAs;

use crate::{
    blend::BlendMode,
    damage::Damage,
    state::{
        frame::{Frame, FrameUpdate},
        layers::{LayerError, LayerID, LayerKind, LayerNode, LayerPath, LayerStack},
        DocumentState,
    },
    surface::TiledSurface,
    util::Rect,
};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("command constructed for a state that does not match the current state")]
    MismatchedState,
    #[error("resource referenced by the command is not found")]
    UnknownResource,
}
pub trait CommandConsumer<C> {
    /// Apply or revert a single command, returning the area of the canvas that changed.
    /// If this generates an error, the state of `self` should *not* be observably changed.
    fn apply(&mut self, command: DoUndo<'_, C>) -> Result<Damage, CommandError>;
}
/// Commands record what they need to undo themselves as they go, hence `mut`.
pub enum DoUndo<'c, T> {
    Do(&'c mut T),
    Undo(&'c mut T),
}

/// A new value for the most recent command, merged in place of pushing a new one.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandUpdate {
    Visible(bool),
    Locked(bool),
    Opacity(f32),
    Mode(BlendMode),
    Name(String),
    Frame(FrameUpdate),
}

/// A node which lives in the command while not in the stack.
#[derive(Debug)]
pub struct Insertion {
    path: LayerPath,
    id: LayerID,
    node: Option<LayerNode>,
    prev_current: Option<LayerPath>,
}
impl Insertion {
    #[must_use]
    pub fn new(path: &[usize], node: LayerNode) -> Self {
        Self {
            path: path.into(),
            id: node.id(),
            node: Some(node),
            prev_current: None,
        }
    }
    #[must_use]
    pub fn id(&self) -> LayerID {
        self.id
    }
    /// Where the node was, or will be, inserted.
    #[must_use]
    pub fn path(&self) -> &[usize] {
        &self.path
    }
    fn apply(&mut self, layers: &mut LayerStack) -> Result<Damage, CommandError> {
        if !layers.is_insertion_path(&self.path) {
            return Err(CommandError::MismatchedState);
        }
        let node = self.node.take().ok_or(CommandError::MismatchedState)?;
        let damage = node.full_redraw_bbox();
        self.prev_current = layers.current_path().cloned();
        let actual = layers
            .insert(&self.path, node)
            .map_err(|_| CommandError::MismatchedState)?;
        layers.set_current_path(Some(&actual));
        self.path = actual;
        Ok(damage)
    }
    fn revert(&mut self, layers: &mut LayerStack) -> Result<Damage, CommandError> {
        if layers.get(&self.path).map(LayerNode::id) != Some(self.id) {
            return Err(CommandError::MismatchedState);
        }
        let node = layers
            .remove(&self.path)
            .ok_or(CommandError::MismatchedState)?;
        let damage = node.full_redraw_bbox();
        self.node = Some(node);
        layers.set_current_path(self.prev_current.as_deref());
        Ok(damage)
    }
    fn is_applied(&self) -> bool {
        self.node.is_none()
    }
}

#[derive(Debug)]
pub struct Removal {
    path: LayerPath,
    id: LayerID,
    node: Option<LayerNode>,
    prev_current: Option<LayerPath>,
    /// Inserted if the removal would leave the stack empty.
    placeholder: Option<Insertion>,
}
impl Removal {
    fn apply(&mut self, layers: &mut LayerStack) -> Result<Damage, CommandError> {
        if layers.get(&self.path).map(LayerNode::id) != Some(self.id) {
            return Err(CommandError::MismatchedState);
        }
        self.prev_current = layers.current_path().cloned();
        let node = layers
            .remove(&self.path)
            .ok_or(CommandError::MismatchedState)?;
        let mut damage = node.full_redraw_bbox();
        self.node = Some(node);
        let nearest = layers.nearest_valid(&self.path);
        layers.set_current_path(nearest.as_deref());
        if layers.is_empty() {
            if let Some(placeholder) = &mut self.placeholder {
                damage = damage.union(placeholder.apply(layers)?);
            }
        }
        Ok(damage)
    }
    fn revert(&mut self, layers: &mut LayerStack) -> Result<Damage, CommandError> {
        let mut damage = Damage::NONE;
        if let Some(placeholder) = self.placeholder.as_mut().filter(|p| p.is_applied()) {
            damage = placeholder.revert(layers)?;
        }
        if !layers.is_insertion_path(&self.path) {
            return Err(CommandError::MismatchedState);
        }
        let node = self.node.take().ok_or(CommandError::MismatchedState)?;
        damage = damage.union(node.full_redraw_bbox());
        layers
            .insert(&self.path, node)
            .map_err(|_| CommandError::MismatchedState)?;
        layers.set_current_path(self.prev_current.as_deref());
        Ok(damage)
    }
}

/// Pixel edit of a single painting layer.
#[derive(Debug)]
pub struct SurfaceEdit {
    layer: LayerID,
    before: Option<TiledSurface>,
    after: Option<TiledSurface>,
}
impl SurfaceEdit {
    #[must_use]
    pub fn new(layer: LayerID) -> Self {
        Self {
            layer,
            before: None,
            after: None,
        }
    }
    /// An edit which has already been made to the layer. Applying it is then a no-op.
    #[must_use]
    pub fn recorded(layer: LayerID, before: TiledSurface, after: TiledSurface) -> Self {
        Self {
            layer,
            before: Some(before),
            after: Some(after),
        }
    }
    #[must_use]
    pub fn layer(&self) -> LayerID {
        self.layer
    }
    fn surface(
        layers: &mut LayerStack,
        layer: LayerID,
    ) -> Result<&mut TiledSurface, CommandError> {
        layers
            .find_mut(layer)
            .ok_or(CommandError::UnknownResource)?
            .surface_mut()
            .ok_or(CommandError::MismatchedState)
    }
    fn apply(
        &mut self,
        layers: &mut LayerStack,
        edit: impl FnOnce(&mut TiledSurface),
    ) -> Result<Damage, CommandError> {
        let surface = Self::surface(layers, self.layer)?;
        let old_bbox = surface.bbox();
        if let Some(after) = &self.after {
            *surface = after.clone();
        } else {
            self.before = Some(surface.clone());
            edit(surface);
            self.after = Some(surface.clone());
        }
        Ok(old_bbox.union(surface.bbox()).into())
    }
    fn revert(&mut self, layers: &mut LayerStack) -> Result<Damage, CommandError> {
        let before = self.before.as_ref().ok_or(CommandError::MismatchedState)?;
        let surface = Self::surface(layers, self.layer)?;
        let damage = surface.bbox().union(before.bbox());
        *surface = before.clone();
        Ok(damage.into())
    }
}

/// Where a flood fill reads colours from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FillSample {
    /// Everything visible.
    Merged,
    Layer(LayerID),
}

#[derive(Debug)]
pub struct FloodFill {
    pub seed: (i32, i32),
    pub color: [u8; 3],
    pub tolerance: f32,
    /// The fill never writes outside of this.
    pub bounds: Rect,
    pub sample: FillSample,
    /// Fill into a fresh layer above the current one.
    new_layer: Option<Insertion>,
    edit: SurfaceEdit,
}
impl FloodFill {
    fn apply(&mut self, layers: &mut LayerStack) -> Result<Damage, CommandError> {
        let mut damage = Damage::NONE;
        if let Some(insertion) = &mut self.new_layer {
            damage = insertion.apply(layers)?;
        }
        // Only needed on the first application, later ones restore the result.
        let sample = if self.edit.after.is_none() {
            let sample = match self.sample {
                FillSample::Merged => layers.flatten(self.bounds),
                FillSample::Layer(id) => layers
                    .find(id)
                    .ok_or(CommandError::UnknownResource)?
                    .flatten(self.bounds),
            };
            Some(sample)
        } else {
            None
        };
        let (seed, color, tolerance, bounds) = (self.seed, self.color, self.tolerance, self.bounds);
        let filled = self.edit.apply(layers, |surface| {
            let filled = surface.flood_fill(seed, color, tolerance, bounds, sample.as_ref());
            log::trace!("filled {filled}");
        })?;
        Ok(damage.union(filled))
    }
    fn revert(&mut self, layers: &mut LayerStack) -> Result<Damage, CommandError> {
        let mut damage = self.edit.revert(layers)?;
        if let Some(insertion) = &mut self.new_layer {
            damage = damage.union(insertion.revert(layers)?);
        }
        Ok(damage)
    }
}

#[derive(Debug, strum::EnumDiscriminants, strum::IntoStaticStr)]
#[strum_discriminants(name(CommandKind), derive(Hash))]
pub enum Command {
    #[strum(serialize = "Add Layer")]
    AddLayer(Insertion),
    #[strum(serialize = "Remove Layer")]
    RemoveLayer(Removal),
    #[strum(serialize = "Move Layer")]
    RestackLayer {
        src: LayerPath,
        /// Insertion path, as seen before the move.
        target: LayerPath,
        moved_to: Option<LayerPath>,
        prev_current: Option<LayerPath>,
    },
    #[strum(serialize = "Select Layer")]
    SelectLayer {
        path: LayerPath,
        prev: Option<LayerPath>,
    },
    #[strum(serialize = "Rename Layer")]
    RenameLayer {
        layer: LayerID,
        old: String,
        new: String,
    },
    #[strum(serialize = "Layer Visibility")]
    SetLayerVisibility { layer: LayerID, old: bool, new: bool },
    #[strum(serialize = "Layer Lock")]
    SetLayerLocked { layer: LayerID, old: bool, new: bool },
    #[strum(serialize = "Layer Opacity")]
    SetLayerOpacity { layer: LayerID, old: f32, new: f32 },
    #[strum(serialize = "Layer Mode")]
    SetLayerMode {
        layer: LayerID,
        old: BlendMode,
        new: BlendMode,
    },
    #[strum(serialize = "Normalize Layer Mode")]
    NormalizeLayerMode {
        layer: LayerID,
        /// Mode, opacity and content from before. `None` until applied.
        before: Option<(BlendMode, f32, LayerKind)>,
    },
    #[strum(serialize = "Duplicate Layer")]
    DuplicateLayer(Insertion),
    #[strum(serialize = "Clear Layer")]
    ClearLayer(SurfaceEdit),
    #[strum(serialize = "Merge Down")]
    MergeLayerDown {
        upper: LayerPath,
        upper_id: LayerID,
        removed: Option<LayerNode>,
        lower: SurfaceEdit,
        prev_current: Option<LayerPath>,
    },
    #[strum(serialize = "Merge Visible Layers")]
    MergeVisibleLayers {
        /// The stack not currently in the document. `None` before first application.
        other: Option<LayerStack>,
    },
    #[strum(serialize = "Trim Layer")]
    TrimLayer { edit: SurfaceEdit, rect: Rect },
    #[strum(serialize = "Fill")]
    FloodFill(Box<FloodFill>),
    #[strum(serialize = "Load Layer")]
    LoadLayer {
        edit: SurfaceEdit,
        replacement: Option<TiledSurface>,
    },
    #[strum(serialize = "Edit Layer Externally")]
    ExternalLayerEdit {
        edit: SurfaceEdit,
        replacement: Option<TiledSurface>,
    },
    #[strum(serialize = "Update Frame")]
    UpdateFrame { old: Frame, update: FrameUpdate },
    #[strum(serialize = "Enable Frame")]
    SetFrameEnabled { old: bool, new: bool },
    #[strum(serialize = "Painting")]
    Brushwork(SurfaceEdit),
}

fn node_mut(layers: &mut LayerStack, id: LayerID) -> Result<&mut LayerNode, CommandError> {
    layers.find_mut(id).ok_or(CommandError::UnknownResource)
}
fn node(layers: &LayerStack, id: LayerID) -> Result<&LayerNode, LayerError> {
    layers.find(id).ok_or(LayerError::NotFound)
}
fn painting(layers: &LayerStack, id: LayerID) -> Result<&LayerNode, LayerError> {
    let node = node(layers, id)?;
    if node.surface().is_none() {
        return Err(LayerError::NotPainting);
    }
    Ok(node)
}
/// Where `target` (a path in the stack before `src` was removed) points after the removal.
fn adjust_for_removal(src: &[usize], target: &[usize]) -> LayerPath {
    let mut target = LayerPath::from_slice(target);
    let depth = src.len() - 1;
    if target.len() > depth && target[..depth] == src[..depth] && target[depth] > src[depth] {
        target[depth] -= 1;
    }
    target
}

// Construction, capturing whatever is needed to undo.
impl Command {
    #[must_use]
    pub fn add_layer(path: &[usize], node: LayerNode) -> Self {
        Self::AddLayer(Insertion::new(path, node))
    }
    /// `placeholder` is inserted in its place if the stack would otherwise become empty.
    pub fn remove_layer(
        layers: &LayerStack,
        path: &[usize],
        placeholder: Option<LayerNode>,
    ) -> Result<Self, LayerError> {
        let node = layers
            .get(path)
            .ok_or_else(|| LayerError::InvalidPath(path.into()))?;
        Ok(Self::RemoveLayer(Removal {
            path: path.into(),
            id: node.id(),
            node: None,
            prev_current: None,
            placeholder: placeholder.map(|p| Insertion::new(&[0], p)),
        }))
    }
    pub fn restack_layer(
        layers: &LayerStack,
        src: &[usize],
        target: &[usize],
    ) -> Result<Self, LayerError> {
        if layers.get(src).is_none() {
            return Err(LayerError::InvalidPath(src.into()));
        }
        if target.starts_with(src) && target.len() > src.len() {
            return Err(LayerError::WouldCycle);
        }
        if !layers.is_insertion_path(target) {
            return Err(LayerError::InvalidPath(target.into()));
        }
        Ok(Self::RestackLayer {
            src: src.into(),
            target: target.into(),
            moved_to: None,
            prev_current: None,
        })
    }
    pub fn select_layer(layers: &LayerStack, path: &[usize]) -> Result<Self, LayerError> {
        if layers.get(path).is_none() {
            return Err(LayerError::InvalidPath(path.into()));
        }
        Ok(Self::SelectLayer {
            path: path.into(),
            prev: None,
        })
    }
    pub fn rename_layer(
        layers: &LayerStack,
        layer: LayerID,
        name: String,
    ) -> Result<Self, LayerError> {
        Ok(Self::RenameLayer {
            layer,
            old: node(layers, layer)?.name.clone(),
            new: name,
        })
    }
    pub fn set_layer_visibility(
        layers: &LayerStack,
        layer: LayerID,
        visible: bool,
    ) -> Result<Self, LayerError> {
        Ok(Self::SetLayerVisibility {
            layer,
            old: node(layers, layer)?.visible,
            new: visible,
        })
    }
    pub fn set_layer_locked(
        layers: &LayerStack,
        layer: LayerID,
        locked: bool,
    ) -> Result<Self, LayerError> {
        Ok(Self::SetLayerLocked {
            layer,
            old: node(layers, layer)?.locked,
            new: locked,
        })
    }
    pub fn set_layer_opacity(
        layers: &LayerStack,
        layer: LayerID,
        opacity: f32,
    ) -> Result<Self, LayerError> {
        Ok(Self::SetLayerOpacity {
            layer,
            old: node(layers, layer)?.opacity,
            new: opacity.clamp(0.0, 1.0),
        })
    }
    pub fn set_layer_mode(
        layers: &LayerStack,
        layer: LayerID,
        mode: BlendMode,
    ) -> Result<Self, LayerError> {
        Ok(Self::SetLayerMode {
            layer,
            old: node(layers, layer)?.mode,
            new: mode,
        })
    }
    /// Bake a painting or solid colour layer's opacity into its content, leaving it normal.
    pub fn normalize_layer_mode(layers: &LayerStack, layer: LayerID) -> Result<Self, LayerError> {
        if node(layers, layer)?.is_group() {
            return Err(LayerError::NotPainting);
        }
        Ok(Self::NormalizeLayerMode {
            layer,
            before: None,
        })
    }
    /// Copy the node at `path`, placing the copy directly above it.
    pub fn duplicate_layer(layers: &LayerStack, path: &[usize]) -> Result<Self, LayerError> {
        let node = layers
            .get(path)
            .ok_or_else(|| LayerError::InvalidPath(path.into()))?;
        Ok(Self::DuplicateLayer(Insertion::new(path, node.duplicate())))
    }
    pub fn clear_layer(layers: &LayerStack, layer: LayerID) -> Result<Self, LayerError> {
        painting(layers, layer)?;
        Ok(Self::ClearLayer(SurfaceEdit::new(layer)))
    }
    pub fn merge_layer_down(layers: &LayerStack, path: &[usize]) -> Result<Self, LayerError> {
        let below = layers
            .merge_down_target(path)
            .ok_or_else(|| LayerError::InvalidPath(path.into()))?;
        // Checked by merge_down_target
        let (Some(upper), Some(lower)) = (layers.get(path), layers.get(&below)) else {
            return Err(LayerError::InvalidPath(path.into()));
        };
        Ok(Self::MergeLayerDown {
            upper: path.into(),
            upper_id: upper.id(),
            removed: None,
            lower: SurfaceEdit::new(lower.id()),
            prev_current: None,
        })
    }
    #[must_use]
    pub fn merge_visible_layers() -> Self {
        Self::MergeVisibleLayers { other: None }
    }
    pub fn trim_layer(layers: &LayerStack, layer: LayerID, rect: Rect) -> Result<Self, LayerError> {
        painting(layers, layer)?;
        Ok(Self::TrimLayer {
            edit: SurfaceEdit::new(layer),
            rect,
        })
    }
    /// Fill into `target`, or into a new layer inserted at `new_layer.path()`.
    #[must_use]
    pub fn flood_fill(
        seed: (i32, i32),
        color: [u8; 3],
        tolerance: f32,
        bounds: Rect,
        sample: FillSample,
        target: Result<LayerID, Insertion>,
    ) -> Self {
        let (edit, new_layer) = match target {
            Ok(id) => (SurfaceEdit::new(id), None),
            Err(insertion) => (SurfaceEdit::new(insertion.id()), Some(insertion)),
        };
        Self::FloodFill(Box::new(FloodFill {
            seed,
            color,
            tolerance,
            bounds,
            sample,
            new_layer,
            edit,
        }))
    }
    /// Replace the pixels of a painting layer.
    pub fn load_layer(
        layers: &LayerStack,
        layer: LayerID,
        surface: TiledSurface,
    ) -> Result<Self, LayerError> {
        painting(layers, layer)?;
        Ok(Self::LoadLayer {
            edit: SurfaceEdit::new(layer),
            replacement: Some(surface),
        })
    }
    /// Replace the pixels of a painting layer with the result of editing it elsewhere.
    pub fn external_layer_edit(
        layers: &LayerStack,
        layer: LayerID,
        surface: TiledSurface,
    ) -> Result<Self, LayerError> {
        painting(layers, layer)?;
        Ok(Self::ExternalLayerEdit {
            edit: SurfaceEdit::new(layer),
            replacement: Some(surface),
        })
    }
    /// Set fields of the frame rect, enabling the frame.
    #[must_use]
    pub fn update_frame(frame: Frame, update: FrameUpdate) -> Self {
        Self::UpdateFrame { old: frame, update }
    }
    #[must_use]
    pub fn set_frame_enabled(frame: Frame, enabled: bool) -> Self {
        Self::SetFrameEnabled {
            old: frame.enabled,
            new: enabled,
        }
    }
    /// Painting which has already happened on `layer`.
    #[must_use]
    pub fn brushwork(layer: LayerID, before: TiledSurface, after: TiledSurface) -> Self {
        Self::Brushwork(SurfaceEdit::recorded(layer, before, after))
    }
}

impl Command {
    /// Human readable name of the command.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        self.into()
    }
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.into()
    }
    /// Automatic commands are skipped over by undo and redo, travelling along with the next
    /// non-automatic command.
    #[must_use]
    pub fn automatic_undo(&self) -> bool {
        matches!(self, Self::SelectLayer { .. })
    }
    /// The layer this command acts upon, if any.
    #[must_use]
    pub fn target(&self) -> Option<LayerID> {
        match self {
            Self::AddLayer(insertion) | Self::DuplicateLayer(insertion) => Some(insertion.id()),
            Self::RemoveLayer(removal) => Some(removal.id),
            Self::RenameLayer { layer, .. }
            | Self::SetLayerVisibility { layer, .. }
            | Self::SetLayerLocked { layer, .. }
            | Self::SetLayerOpacity { layer, .. }
            | Self::SetLayerMode { layer, .. }
            | Self::NormalizeLayerMode { layer, .. } => Some(*layer),
            Self::MergeLayerDown { upper_id, .. } => Some(*upper_id),
            Self::ClearLayer(edit)
            | Self::Brushwork(edit)
            | Self::TrimLayer { edit, .. }
            | Self::LoadLayer { edit, .. }
            | Self::ExternalLayerEdit { edit, .. } => Some(edit.layer()),
            Self::FloodFill(fill) => Some(fill.edit.layer()),
            Self::RestackLayer { .. }
            | Self::SelectLayer { .. }
            | Self::MergeVisibleLayers { .. }
            | Self::UpdateFrame { .. }
            | Self::SetFrameEnabled { .. } => None,
        }
    }
    /// Would `update` be merged into this command rather than becoming its own?
    #[must_use]
    pub fn accepts(&self, update: &CommandUpdate) -> bool {
        matches!(
            (self, update),
            (Self::SetLayerVisibility { .. }, CommandUpdate::Visible(_))
                | (Self::SetLayerLocked { .. }, CommandUpdate::Locked(_))
                | (Self::SetLayerOpacity { .. }, CommandUpdate::Opacity(_))
                | (Self::SetLayerMode { .. }, CommandUpdate::Mode(_))
                | (Self::RenameLayer { .. }, CommandUpdate::Name(_))
                | (Self::UpdateFrame { .. }, CommandUpdate::Frame(_))
        )
    }
    /// Replace the parameters of this already-applied command, re-applying it from its snapshot.
    pub(crate) fn update(
        &mut self,
        update: CommandUpdate,
        state: &mut DocumentState,
    ) -> Result<Damage, CommandError> {
        if !self.accepts(&update) {
            return Err(CommandError::MismatchedState);
        }
        let reverted = self.revert(state)?;
        match (&mut *self, update) {
            (Self::SetLayerVisibility { new, .. }, CommandUpdate::Visible(v))
            | (Self::SetLayerLocked { new, .. }, CommandUpdate::Locked(v)) => *new = v,
            (Self::SetLayerOpacity { new, .. }, CommandUpdate::Opacity(v)) => *new = v.clamp(0.0, 1.0),
            (Self::SetLayerMode { new, .. }, CommandUpdate::Mode(v)) => *new = v,
            (Self::RenameLayer { new, .. }, CommandUpdate::Name(v)) => *new = v,
            (Self::UpdateFrame { update, .. }, CommandUpdate::Frame(v)) => update.merge(v),
            // Checked by `accepts`.
            _ => (),
        }
        Ok(reverted.union(self.apply(state)?))
    }

    /// Set a plain layer property to its new value, or back to its old one.
    fn set_property(&self, layers: &mut LayerStack, forward: bool) -> Result<Damage, CommandError> {
        fn pick<T>(forward: bool, old: T, new: T) -> T {
            if forward {
                new
            } else {
                old
            }
        }
        match self {
            Self::RenameLayer { layer, old, new } => {
                node_mut(layers, *layer)?.name.clone_from(pick(forward, old, new));
                Ok(Damage::NONE)
            }
            Self::SetLayerLocked { layer, old, new } => {
                node_mut(layers, *layer)?.locked = pick(forward, *old, *new);
                Ok(Damage::NONE)
            }
            Self::SetLayerVisibility { layer, old, new } => {
                let node = node_mut(layers, *layer)?;
                node.visible = pick(forward, *old, *new);
                Ok(node.full_redraw_bbox())
            }
            Self::SetLayerOpacity { layer, old, new } => {
                let node = node_mut(layers, *layer)?;
                node.opacity = pick(forward, *old, *new);
                Ok(node.full_redraw_bbox())
            }
            Self::SetLayerMode { layer, old, new } => {
                let node = node_mut(layers, *layer)?;
                node.mode = pick(forward, *old, *new);
                Ok(node.full_redraw_bbox())
            }
            _ => Err(CommandError::MismatchedState),
        }
    }

    fn apply(&mut self, state: &mut DocumentState) -> Result<Damage, CommandError> {
        let layers = &mut state.layers;
        match self {
            Self::AddLayer(insertion) | Self::DuplicateLayer(insertion) => insertion.apply(layers),
            Self::RemoveLayer(removal) => removal.apply(layers),
            Self::RestackLayer {
                src,
                target,
                moved_to,
                prev_current,
            } => {
                let current = layers.current_path().cloned();
                let node = layers.remove(src).ok_or(CommandError::MismatchedState)?;
                let adjusted = adjust_for_removal(src, target);
                if !layers.is_insertion_path(&adjusted) {
                    // Put it back untouched.
                    layers
                        .insert(src, node)
                        .map_err(|_| CommandError::MismatchedState)?;
                    return Err(CommandError::MismatchedState);
                }
                let damage = node.full_redraw_bbox();
                *prev_current = current;
                let actual = layers
                    .insert(&adjusted, node)
                    .map_err(|_| CommandError::MismatchedState)?;
                layers.set_current_path(Some(&actual));
                *moved_to = Some(actual);
                Ok(damage)
            }
            Self::SelectLayer { path, prev } => {
                if layers.get(path).is_none() {
                    return Err(CommandError::UnknownResource);
                }
                *prev = layers.current_path().cloned();
                layers.set_current_path(Some(path));
                Ok(Damage::NONE)
            }
            Self::RenameLayer { .. }
            | Self::SetLayerVisibility { .. }
            | Self::SetLayerLocked { .. }
            | Self::SetLayerOpacity { .. }
            | Self::SetLayerMode { .. } => self.set_property(layers, true),
            Self::NormalizeLayerMode { layer, before } => {
                let node = node_mut(layers, *layer)?;
                if matches!(node.kind, LayerKind::Group(_)) {
                    return Err(CommandError::MismatchedState);
                }
                let damage = node.full_redraw_bbox();
                let opacity = node.opacity.clamp(0.0, 1.0);
                *before = Some((node.mode, node.opacity, node.kind.clone()));
                match &mut node.kind {
                    LayerKind::Painting(surface) => surface.scale_alpha(opacity),
                    LayerKind::SolidColor(color) => {
                        color[3] = (f32::from(color[3]) * opacity).round().saturating_as();
                    }
                    LayerKind::Group(_) => (),
                }
                node.mode = BlendMode::Normal;
                node.opacity = 1.0;
                Ok(damage)
            }
            Self::ClearLayer(edit) => edit.apply(layers, TiledSurface::clear),
            Self::MergeLayerDown {
                upper,
                upper_id,
                removed,
                lower,
                prev_current,
            } => {
                if layers.get(upper).map(LayerNode::id) != Some(*upper_id)
                    || layers.find(lower.layer()).and_then(LayerNode::surface).is_none()
                {
                    return Err(CommandError::MismatchedState);
                }
                *prev_current = layers.current_path().cloned();
                let node = layers.remove(upper).ok_or(CommandError::MismatchedState)?;
                let upper_damage = Damage::from(node.bbox());
                let lower_damage = lower.apply(layers, |surface| {
                    if let (true, Some(src)) = (node.visible, node.surface()) {
                        surface.composite_over(src, node.opacity);
                    }
                })?;
                *removed = Some(node);
                let lower_path = layers.path_of(lower.layer());
                layers.set_current_path(lower_path.as_deref());
                Ok(upper_damage.union(lower_damage))
            }
            Self::MergeVisibleLayers { other } => {
                let merged = match other.take() {
                    Some(merged) => merged,
                    None => merge_visible(layers),
                };
                let damage = merged.full_redraw_bbox().union(layers.full_redraw_bbox());
                *other = Some(std::mem::replace(layers, merged));
                Ok(damage)
            }
            Self::TrimLayer { edit, rect } => {
                let rect = *rect;
                edit.apply(layers, |surface| {
                    surface.trim(rect);
                })
            }
            Self::FloodFill(fill) => fill.apply(layers),
            Self::LoadLayer { edit, replacement } | Self::ExternalLayerEdit { edit, replacement } => {
                edit.apply(layers, |surface| {
                    if let Some(replacement) = replacement.take() {
                        *surface = replacement;
                    }
                })
            }
            Self::UpdateFrame { old, update } => {
                state.frame = Frame {
                    rect: update.apply_to(old.rect),
                    enabled: true,
                };
                Ok(Damage::Full)
            }
            Self::SetFrameEnabled { new, .. } => {
                state.frame.enabled = *new;
                Ok(Damage::Full)
            }
            Self::Brushwork(edit) => edit.apply(layers, |_| ()),
        }
    }
    fn revert(&mut self, state: &mut DocumentState) -> Result<Damage, CommandError> {
        let layers = &mut state.layers;
        match self {
            Self::AddLayer(insertion) | Self::DuplicateLayer(insertion) => insertion.revert(layers),
            Self::RemoveLayer(removal) => removal.revert(layers),
            Self::RestackLayer {
                src,
                moved_to,
                prev_current,
                ..
            } => {
                let at = moved_to.take().ok_or(CommandError::MismatchedState)?;
                let node = layers.remove(&at).ok_or(CommandError::MismatchedState)?;
                let damage = node.full_redraw_bbox();
                layers
                    .insert(src, node)
                    .map_err(|_| CommandError::MismatchedState)?;
                layers.set_current_path(prev_current.as_deref());
                Ok(damage)
            }
            Self::SelectLayer { prev, .. } => {
                layers.set_current_path(prev.as_deref());
                Ok(Damage::NONE)
            }
            Self::RenameLayer { .. }
            | Self::SetLayerVisibility { .. }
            | Self::SetLayerLocked { .. }
            | Self::SetLayerOpacity { .. }
            | Self::SetLayerMode { .. } => self.set_property(layers, false),
            Self::NormalizeLayerMode { layer, before } => {
                let node = node_mut(layers, *layer)?;
                let (mode, opacity, kind) = before.take().ok_or(CommandError::MismatchedState)?;
                node.mode = mode;
                node.opacity = opacity;
                node.kind = kind;
                Ok(node.full_redraw_bbox())
            }
            Self::ClearLayer(edit)
            | Self::Brushwork(edit)
            | Self::TrimLayer { edit, .. }
            | Self::LoadLayer { edit, .. }
            | Self::ExternalLayerEdit { edit, .. } => edit.revert(layers),
            Self::MergeLayerDown {
                upper,
                removed,
                lower,
                prev_current,
                ..
            } => {
                if !layers.is_insertion_path(upper) {
                    return Err(CommandError::MismatchedState);
                }
                let lower_damage = lower.revert(layers)?;
                let node = removed.take().ok_or(CommandError::MismatchedState)?;
                let upper_damage = Damage::from(node.bbox());
                layers
                    .insert(upper, node)
                    .map_err(|_| CommandError::MismatchedState)?;
                layers.set_current_path(prev_current.as_deref());
                Ok(upper_damage.union(lower_damage))
            }
            Self::MergeVisibleLayers { other } => {
                let before = other.take().ok_or(CommandError::MismatchedState)?;
                let damage = before.full_redraw_bbox().union(layers.full_redraw_bbox());
                *other = Some(std::mem::replace(layers, before));
                Ok(damage)
            }
            Self::FloodFill(fill) => fill.revert(layers),
            Self::UpdateFrame { old, .. } => {
                state.frame = *old;
                Ok(Damage::Full)
            }
            Self::SetFrameEnabled { old, .. } => {
                state.frame.enabled = *old;
                Ok(Damage::Full)
            }
        }
    }
}

/// Flatten every visible painting layer into one, placed at the top of the stack.
/// Solid colours and hidden layers are left as they are.
fn merge_visible(layers: &LayerStack) -> LayerStack {
    let merged = LayerNode::with_surface("Merged", layers.flatten_painted());
    let mut next = layers.clone();
    let leaves: Vec<LayerPath> = layers
        .walk(true)
        .filter(|(_, node)| node.surface().is_some())
        .map(|(path, _)| path)
        .collect();
    let groups: Vec<LayerPath> = layers
        .walk(true)
        .filter(|(_, node)| node.is_group() && !node.is_empty())
        .map(|(path, _)| path)
        .collect();
    // Removing from the back keeps the earlier paths valid.
    for path in leaves.iter().rev() {
        next.remove(path);
    }
    for path in groups.iter().rev() {
        let emptied = next
            .get(path)
            .and_then(LayerNode::children)
            .is_some_and(<[LayerNode]>::is_empty);
        if emptied {
            next.remove(path);
        }
    }
    next.children_mut().insert(0, merged);
    next.set_current_path(Some(&[0]));
    next
}

impl CommandConsumer<Command> for DocumentState {
    fn apply(&mut self, command: DoUndo<'_, Command>) -> Result<Damage, CommandError> {
        match command {
            DoUndo::Do(command) => command.apply(self),
            DoUndo::Undo(command) => command.revert(self),
        }
    }
}
