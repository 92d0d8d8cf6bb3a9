//! # Layers
//!
//! The layers of the document form a tree, with painting and solid colour layers as leaves and groups
//! forming the upper levels. Nodes are addressed two ways:
//! * by [`LayerPath`], a list of child indices from the root, where index 0 is the topmost child.
//!   Paths are what the user sees and are invalidated by any restructuring.
//! * by [`LayerID`], which is stable for the lifetime of the node, and what commands target.

mod iter;
mod render;

pub use iter::DeepEnumerate;

use crate::{blend::BlendMode, damage::Damage, surface, util::Rect};

pub type LayerID = crate::FuzzID<LayerNode>;
/// Child indices from the root to a node. Index 0 is the top of its stack.
pub type LayerPath = smallvec::SmallVec<[usize; 4]>;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum LayerError {
    #[error("no layer at path {0:?}")]
    InvalidPath(LayerPath),
    #[error("layer not found")]
    NotFound,
    #[error("can't move a group into itself")]
    WouldCycle,
    #[error("layer has no pixels to edit")]
    NotPainting,
    #[error("layer is locked")]
    Locked,
    #[error("no layer is selected")]
    NoCurrentLayer,
    #[error(transparent)]
    Command(#[from] crate::commands::CommandError),
}

#[derive(Clone, Debug, PartialEq)]
pub enum LayerKind {
    Painting(surface::TiledSurface),
    /// A uniform colour covering the whole infinite canvas.
    SolidColor(surface::Pixel),
    /// Children, top first.
    Group(Vec<LayerNode>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayerNode {
    id: LayerID,
    pub name: String,
    pub visible: bool,
    /// Locked layers may not be painted on.
    pub locked: bool,
    pub opacity: f32,
    pub mode: BlendMode,
    pub kind: LayerKind,
}
impl LayerNode {
    fn with_kind(name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            id: LayerID::default(),
            name: name.into(),
            visible: true,
            locked: false,
            opacity: 1.0,
            mode: BlendMode::Normal,
            kind,
        }
    }
    #[must_use]
    pub fn painting(name: impl Into<String>) -> Self {
        Self::with_kind(name, LayerKind::Painting(surface::TiledSurface::new()))
    }
    #[must_use]
    pub fn with_surface(name: impl Into<String>, surface: surface::TiledSurface) -> Self {
        Self::with_kind(name, LayerKind::Painting(surface))
    }
    #[must_use]
    pub fn solid_color(name: impl Into<String>, color: surface::Pixel) -> Self {
        Self::with_kind(name, LayerKind::SolidColor(color))
    }
    #[must_use]
    pub fn group(name: impl Into<String>, children: Vec<LayerNode>) -> Self {
        Self::with_kind(name, LayerKind::Group(children))
    }
    #[must_use]
    pub fn id(&self) -> LayerID {
        self.id
    }
    #[must_use]
    pub fn is_group(&self) -> bool {
        matches!(self.kind, LayerKind::Group(_))
    }
    #[must_use]
    pub fn surface(&self) -> Option<&surface::TiledSurface> {
        match &self.kind {
            LayerKind::Painting(surface) => Some(surface),
            _ => None,
        }
    }
    pub fn surface_mut(&mut self) -> Option<&mut surface::TiledSurface> {
        match &mut self.kind {
            LayerKind::Painting(surface) => Some(surface),
            _ => None,
        }
    }
    #[must_use]
    pub fn children(&self) -> Option<&[LayerNode]> {
        match &self.kind {
            LayerKind::Group(children) => Some(children),
            _ => None,
        }
    }
    pub fn children_mut(&mut self) -> Option<&mut Vec<LayerNode>> {
        match &mut self.kind {
            LayerKind::Group(children) => Some(children),
            _ => None,
        }
    }
    /// Can a flood fill write into this layer?
    #[must_use]
    pub fn is_fillable(&self) -> bool {
        !self.locked && self.surface().is_some()
    }
    /// True if the layer holds no content at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.kind {
            LayerKind::Painting(surface) => surface.is_empty(),
            LayerKind::SolidColor(_) => false,
            LayerKind::Group(children) => children.iter().all(LayerNode::is_empty),
        }
    }
    /// Bounding box of the pixel data. Solid colours have no data, and so no bbox.
    #[must_use]
    pub fn bbox(&self) -> Rect {
        match &self.kind {
            LayerKind::Painting(surface) => surface.bbox(),
            LayerKind::SolidColor(_) => Rect::EMPTY,
            LayerKind::Group(children) => children
                .iter()
                .fold(Rect::EMPTY, |acc, child| acc.union(child.bbox())),
        }
    }
    /// The area needing a redraw if this layer changes in any way.
    #[must_use]
    pub fn full_redraw_bbox(&self) -> Damage {
        match &self.kind {
            LayerKind::Painting(surface) => surface.full_redraw_bbox(),
            LayerKind::SolidColor(_) => Damage::Full,
            LayerKind::Group(children) => children
                .iter()
                .fold(Damage::NONE, |acc, child| acc.union(child.full_redraw_bbox())),
        }
    }
    /// A deep copy with fresh IDs, named after the original.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        let mut copy = self.fresh_copy();
        copy.name = format!("{} Copy", self.name);
        copy
    }
    fn fresh_copy(&self) -> Self {
        let kind = match &self.kind {
            LayerKind::Group(children) => {
                LayerKind::Group(children.iter().map(Self::fresh_copy).collect())
            }
            other => other.clone(),
        };
        Self {
            id: LayerID::default(),
            kind,
            ..self.clone_props()
        }
    }
    // Everything but the (potentially deep) kind.
    fn clone_props(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            visible: self.visible,
            locked: self.locked,
            opacity: self.opacity,
            mode: self.mode,
            kind: LayerKind::Group(Vec::new()),
        }
    }
}

/// The root of the layer tree, along with the user's selection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerStack {
    children: Vec<LayerNode>,
    current: Option<LayerPath>,
}
impl LayerStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn from_children(children: Vec<LayerNode>) -> Self {
        let mut this = Self {
            children,
            current: None,
        };
        this.ensure_current();
        this
    }
    /// Top level nodes, top first.
    #[must_use]
    pub fn children(&self) -> &[LayerNode] {
        &self.children
    }
    /// Number of top level nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
    /// Number of nodes at any depth, groups included.
    #[must_use]
    pub fn deep_len(&self) -> usize {
        self.deepiter().count()
    }
    pub fn clear(&mut self) {
        self.children.clear();
        self.current = None;
    }
    #[must_use]
    pub fn get(&self, path: &[usize]) -> Option<&LayerNode> {
        let (&first, rest) = path.split_first()?;
        let mut node = self.children.get(first)?;
        for &idx in rest {
            node = node.children()?.get(idx)?;
        }
        Some(node)
    }
    pub fn get_mut(&mut self, path: &[usize]) -> Option<&mut LayerNode> {
        let (&first, rest) = path.split_first()?;
        let mut node = self.children.get_mut(first)?;
        for &idx in rest {
            node = node.children_mut()?.get_mut(idx)?;
        }
        Some(node)
    }
    /// The list of siblings a node at `path` would live in.
    fn siblings_mut(&mut self, path: &[usize]) -> Option<&mut Vec<LayerNode>> {
        let (_, parent) = path.split_last()?;
        if parent.is_empty() {
            Some(&mut self.children)
        } else {
            self.get_mut(parent)?.children_mut()
        }
    }
    /// Is `path` somewhere a node could be inserted? The parent has to exist and be a group.
    #[must_use]
    pub fn is_insertion_path(&self, path: &[usize]) -> bool {
        match path.split_last() {
            None => false,
            Some((_, [])) => true,
            Some((_, parent)) => self.get(parent).is_some_and(LayerNode::is_group),
        }
    }
    /// Insert a node at an insertion path. An index past the end is clamped to the bottom.
    ///
    /// Returns the path the node ended up at.
    pub fn insert(&mut self, path: &[usize], node: LayerNode) -> Result<LayerPath, LayerError> {
        let siblings = self
            .siblings_mut(path)
            .ok_or_else(|| LayerError::InvalidPath(path.into()))?;
        // Some - siblings_mut checked nonempty
        let idx = path.last().copied().unwrap_or(0).min(siblings.len());
        siblings.insert(idx, node);
        let mut actual = LayerPath::from_slice(path);
        if let Some(last) = actual.last_mut() {
            *last = idx;
        }
        Ok(actual)
    }
    /// Remove and return the node at `path`. The selection is *not* adjusted.
    pub fn remove(&mut self, path: &[usize]) -> Option<LayerNode> {
        let idx = *path.last()?;
        let siblings = self.siblings_mut(path)?;
        (idx < siblings.len()).then(|| siblings.remove(idx))
    }
    #[must_use]
    pub fn path_of(&self, id: LayerID) -> Option<LayerPath> {
        self.deepenumerate()
            .find(|(_, node)| node.id() == id)
            .map(|(path, _)| path)
    }
    #[must_use]
    pub fn find(&self, id: LayerID) -> Option<&LayerNode> {
        self.deepiter().find(|node| node.id() == id)
    }
    pub fn find_mut(&mut self, id: LayerID) -> Option<&mut LayerNode> {
        let path = self.path_of(id)?;
        self.get_mut(&path)
    }
    #[must_use]
    pub fn current_path(&self) -> Option<&LayerPath> {
        self.current.as_ref()
    }
    #[must_use]
    pub fn current(&self) -> Option<&LayerNode> {
        self.get(self.current.as_deref()?)
    }
    pub fn current_mut(&mut self) -> Option<&mut LayerNode> {
        let path = self.current.clone()?;
        self.get_mut(&path)
    }
    /// Select the node at `path`, or the nearest valid node if it doesn't exist.
    pub fn set_current_path(&mut self, path: Option<&[usize]>) {
        self.current = match path {
            Some(path) => self.nearest_valid(path),
            None => None,
        };
        self.ensure_current();
    }
    /// Closest existing node to `path`: itself, the sibling above it, or its parent.
    #[must_use]
    pub fn nearest_valid(&self, path: &[usize]) -> Option<LayerPath> {
        let mut path = LayerPath::from_slice(path);
        while !path.is_empty() {
            if self.get(&path).is_some() {
                return Some(path);
            }
            match path.last().copied() {
                Some(last) if last > 0 => {
                    // Past the end - try the new bottom sibling.
                    let n = path.len() - 1;
                    let parent_len = if n == 0 {
                        self.children.len()
                    } else {
                        self.get(&path[..n])
                            .and_then(LayerNode::children)
                            .map_or(0, <[LayerNode]>::len)
                    };
                    path[n] = (last - 1).min(parent_len.saturating_sub(1));
                    if parent_len == 0 {
                        path.pop();
                    }
                }
                _ => {
                    path.pop();
                }
            }
        }
        None
    }
    /// Upholds "exactly one current layer whenever the stack is non-empty".
    fn ensure_current(&mut self) {
        let valid = self
            .current
            .as_deref()
            .is_some_and(|path| self.get(path).is_some());
        if !valid {
            self.current = (!self.children.is_empty()).then(|| smallvec::smallvec![0]);
        }
    }
    /// The layer that the painting layer at `path` would be merged into - its sibling below -
    /// if both are painting layers.
    #[must_use]
    pub fn merge_down_target(&self, path: &[usize]) -> Option<LayerPath> {
        self.get(path)?.surface()?;
        let mut below = LayerPath::from_slice(path);
        *below.last_mut()? += 1;
        self.get(&below)?.surface()?;
        Some(below)
    }
    /// Union of every layer's data bbox.
    #[must_use]
    pub fn bbox(&self) -> Rect {
        self.children
            .iter()
            .fold(Rect::EMPTY, |acc, node| acc.union(node.bbox()))
    }
    /// Union of every layer's full-redraw bbox. Infinite if any layer is.
    #[must_use]
    pub fn full_redraw_bbox(&self) -> Damage {
        self.children
            .iter()
            .fold(Damage::NONE, |acc, node| acc.union(node.full_redraw_bbox()))
    }
    /// Every node, depth-first from the top.
    pub fn deepiter(&self) -> impl Iterator<Item = &LayerNode> + '_ {
        self.deepenumerate().map(|(_, node)| node)
    }
    /// Every node and its path, depth-first from the top.
    #[must_use]
    pub fn deepenumerate(&self) -> DeepEnumerate<'_> {
        DeepEnumerate::new(&self.children, false)
    }
    /// Like [`Self::deepenumerate`], optionally skipping hidden nodes along with everything inside them.
    #[must_use]
    pub fn walk(&self, visible_only: bool) -> DeepEnumerate<'_> {
        DeepEnumerate::new(&self.children, visible_only)
    }
    /// Mutable access to the top level, for whole-stack edits.
    pub(crate) fn children_mut(&mut self) -> &mut Vec<LayerNode> {
        &mut self.children
    }
}
