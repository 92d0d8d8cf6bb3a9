use super::{LayerKind, LayerNode, LayerPath};

/// Depth-first, top-first traversal yielding each node with its path.
/// Groups are yielded before their children.
pub struct DeepEnumerate<'a> {
    /// Remaining siblings at each depth, and the index of the next one.
    stack: Vec<(std::slice::Iter<'a, LayerNode>, usize)>,
    /// Path of the group whose children are on top of `stack`.
    parent: LayerPath,
    visible_only: bool,
}
impl<'a> DeepEnumerate<'a> {
    pub(super) fn new(root: &'a [LayerNode], visible_only: bool) -> Self {
        Self {
            stack: vec![(root.iter(), 0)],
            parent: LayerPath::new(),
            visible_only,
        }
    }
}
impl<'a> Iterator for DeepEnumerate<'a> {
    type Item = (LayerPath, &'a LayerNode);
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (siblings, next_idx) = self.stack.last_mut()?;
            let Some(node) = siblings.next() else {
                // This depth is exhausted, pop up a level.
                self.stack.pop();
                self.parent.pop();
                continue;
            };
            let idx = *next_idx;
            *next_idx += 1;
            if self.visible_only && !node.visible {
                continue;
            }
            let mut path = self.parent.clone();
            path.push(idx);
            if let LayerKind::Group(children) = &node.kind {
                self.parent.push(idx);
                self.stack.push((children.iter(), 0));
            }
            return Some((path, node));
        }
    }
}
