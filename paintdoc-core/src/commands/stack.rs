use super::{Command, CommandConsumer, CommandError, CommandUpdate, DoUndo};
use crate::{damage::DamageTracker, state::DocumentState};

/// Linear undo and redo history.
///
/// Doing a new command forgets everything that could have been redone. Commands which are
/// [automatic](Command::automatic_undo) don't stand on their own: undo and redo carry on past them
/// until a non-automatic command has been processed.
#[derive(Debug, Default)]
pub struct CommandStack {
    undo_stack: Vec<Command>,
    redo_stack: Vec<Command>,
    /// Oldest commands are forgotten past this many. `None` for unbounded.
    limit: Option<usize>,
}
impl CommandStack {
    #[must_use]
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }
    /// Apply a command and push it onto the undo stack.
    pub fn do_command(
        &mut self,
        mut command: Command,
        state: &mut DocumentState,
        damage: &mut DamageTracker,
    ) -> Result<(), CommandError> {
        damage.push(state.apply(DoUndo::Do(&mut command))?);
        log::trace!("did {}", command.display_name());
        self.undo_stack.push(command);
        self.redo_stack.clear();
        if let Some(limit) = self.limit {
            let excess = self.undo_stack.len().saturating_sub(limit);
            if excess != 0 {
                self.undo_stack.drain(..excess);
            }
        }
        Ok(())
    }
    /// Revert commands until one which isn't automatic has been reverted. Returns it, or
    /// `None` if there was nothing to undo.
    pub fn undo(
        &mut self,
        state: &mut DocumentState,
        damage: &mut DamageTracker,
    ) -> Result<Option<&Command>, CommandError> {
        let mut carried = 0;
        loop {
            let Some(mut command) = self.undo_stack.pop() else {
                return Ok(None);
            };
            match state.apply(DoUndo::Undo(&mut command)) {
                Ok(area) => damage.push(area),
                Err(e) => {
                    // Leave it where it was, and redo the automatic commands undone on the way.
                    self.undo_stack.push(command);
                    Self::carry_back(
                        carried,
                        &mut self.redo_stack,
                        &mut self.undo_stack,
                        state,
                        damage,
                        true,
                    );
                    return Err(e);
                }
            }
            let automatic = command.automatic_undo();
            self.redo_stack.push(command);
            if !automatic {
                return Ok(self.redo_stack.last());
            }
            carried += 1;
        }
    }
    /// Reapply commands until one which isn't automatic has been reapplied. Returns it, or
    /// `None` if there was nothing to redo.
    pub fn redo(
        &mut self,
        state: &mut DocumentState,
        damage: &mut DamageTracker,
    ) -> Result<Option<&Command>, CommandError> {
        let mut carried = 0;
        loop {
            let Some(mut command) = self.redo_stack.pop() else {
                return Ok(None);
            };
            match state.apply(DoUndo::Do(&mut command)) {
                Ok(area) => damage.push(area),
                Err(e) => {
                    self.redo_stack.push(command);
                    Self::carry_back(
                        carried,
                        &mut self.undo_stack,
                        &mut self.redo_stack,
                        state,
                        damage,
                        false,
                    );
                    return Err(e);
                }
            }
            let automatic = command.automatic_undo();
            self.undo_stack.push(command);
            if !automatic {
                return Ok(self.undo_stack.last());
            }
            carried += 1;
        }
    }
    /// Move the last `count` commands of `from` back onto `to`, redoing them if `redo` or
    /// undoing them otherwise. Used to put history back after a failed undo or redo.
    fn carry_back(
        count: usize,
        from: &mut Vec<Command>,
        to: &mut Vec<Command>,
        state: &mut DocumentState,
        damage: &mut DamageTracker,
        redo: bool,
    ) {
        for _ in 0..count {
            let Some(mut command) = from.pop() else {
                return;
            };
            let result = if redo {
                state.apply(DoUndo::Do(&mut command))
            } else {
                state.apply(DoUndo::Undo(&mut command))
            };
            match result {
                Ok(area) => damage.push(area),
                Err(e) => log::error!("failed to restore {}: {e}", command.display_name()),
            }
            to.push(command);
        }
    }
    /// Merge new values into the most recent command, if it accepts them.
    ///
    /// Returns false, changing nothing, if there is no such command.
    pub fn update_last_command(
        &mut self,
        update: CommandUpdate,
        state: &mut DocumentState,
        damage: &mut DamageTracker,
    ) -> Result<bool, CommandError> {
        let Some(last) = self.undo_stack.last_mut() else {
            return Ok(false);
        };
        if !last.accepts(&update) {
            return Ok(false);
        }
        damage.push(last.update(update, state)?);
        Ok(true)
    }
    /// The most recently done (or redone) command.
    #[must_use]
    pub fn get_last_command(&self) -> Option<&Command> {
        self.undo_stack.last()
    }
    /// The most recently undone command.
    #[must_use]
    pub fn get_last_undone(&self) -> Option<&Command> {
        self.redo_stack.last()
    }
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }
    /// (undo depth, redo depth)
    #[must_use]
    pub fn depth(&self) -> (usize, usize) {
        (self.undo_stack.len(), self.redo_stack.len())
    }
    /// Forget all history without reverting anything.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::state::layers::{LayerNode, LayerStack};

    fn setup() -> (CommandStack, DocumentState, DamageTracker) {
        let state = DocumentState {
            layers: LayerStack::from_children(vec![
                LayerNode::painting("a"),
                LayerNode::painting("b"),
            ]),
            ..Default::default()
        };
        (CommandStack::default(), state, DamageTracker::new())
    }
    #[test]
    fn do_clears_redo() {
        let (mut stack, mut state, mut damage) = setup();
        let add = Command::add_layer(&[0], LayerNode::painting("c"));
        stack.do_command(add, &mut state, &mut damage).unwrap();
        assert!(stack.undo(&mut state, &mut damage).unwrap().is_some());
        assert!(stack.can_redo());
        let add = Command::add_layer(&[0], LayerNode::painting("d"));
        stack.do_command(add, &mut state, &mut damage).unwrap();
        assert!(!stack.can_redo());
        assert!(stack.redo(&mut state, &mut damage).unwrap().is_none());
    }
    #[test]
    fn undo_skips_automatic() {
        let (mut stack, mut state, mut damage) = setup();
        let id = state.layers.get(&[1]).unwrap().id();
        let hide = Command::set_layer_visibility(&state.layers, id, false).unwrap();
        stack.do_command(hide, &mut state, &mut damage).unwrap();
        let select = Command::select_layer(&state.layers, &[1]).unwrap();
        stack.do_command(select, &mut state, &mut damage).unwrap();
        assert_eq!(stack.depth(), (2, 0));

        // One undo reverts both the selection and the visibility change.
        let undone = stack.undo(&mut state, &mut damage).unwrap().map(Command::display_name);
        assert_eq!(undone, Some("Layer Visibility"));
        assert_eq!(stack.depth(), (0, 2));
        assert!(state.layers.get(&[1]).unwrap().visible);
        assert_eq!(state.layers.current_path().map(|p| p.as_slice()), Some(&[0][..]));

        let redone = stack.redo(&mut state, &mut damage).unwrap().map(Command::display_name);
        assert_eq!(redone, Some("Layer Visibility"));
        assert_eq!(stack.depth(), (1, 1));
    }
    #[test]
    fn coalesces_into_last() {
        let (mut stack, mut state, mut damage) = setup();
        let id = state.layers.get(&[0]).unwrap().id();
        let opacity = Command::set_layer_opacity(&state.layers, id, 0.9).unwrap();
        stack.do_command(opacity, &mut state, &mut damage).unwrap();
        for value in [0.8, 0.5, 0.3] {
            let merged = stack
                .update_last_command(CommandUpdate::Opacity(value), &mut state, &mut damage)
                .unwrap();
            assert!(merged);
        }
        assert!(!stack
            .update_last_command(CommandUpdate::Locked(true), &mut state, &mut damage)
            .unwrap());
        assert_eq!(stack.depth(), (1, 0));
        assert_eq!(state.layers.get(&[0]).unwrap().opacity, 0.3);
        stack.undo(&mut state, &mut damage).unwrap();
        assert_eq!(state.layers.get(&[0]).unwrap().opacity, 1.0);
    }
    #[test]
    fn limit_forgets_oldest() {
        let (_, mut state, mut damage) = setup();
        let mut stack = CommandStack::new(Some(2));
        for name in ["c", "d", "e"] {
            let add = Command::add_layer(&[0], LayerNode::painting(name));
            stack.do_command(add, &mut state, &mut damage).unwrap();
        }
        assert_eq!(stack.depth(), (2, 0));
        stack.undo(&mut state, &mut damage).unwrap();
        stack.undo(&mut state, &mut damage).unwrap();
        assert!(!stack.can_undo());
        // "c" fell off the bottom of the history, so it stays.
        let names: Vec<_> = state.layers.children().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["c", "a", "b"]);
    }
    #[test]
    fn failed_undo_restores_automatic() {
        let (mut stack, mut state, mut damage) = setup();
        let add = Command::add_layer(&[2], LayerNode::painting("c"));
        stack.do_command(add, &mut state, &mut damage).unwrap();
        let c = state.layers.get(&[2]).unwrap().id();
        let hide = Command::set_layer_visibility(&state.layers, c, false).unwrap();
        stack.do_command(hide, &mut state, &mut damage).unwrap();
        let select = Command::select_layer(&state.layers, &[1]).unwrap();
        stack.do_command(select, &mut state, &mut damage).unwrap();
        // Removed behind the history's back.
        state.layers.remove(&[2]).unwrap();

        assert_eq!(
            stack.undo(&mut state, &mut damage).unwrap_err(),
            CommandError::UnknownResource
        );
        assert_eq!(stack.depth(), (3, 0));
        assert_eq!(state.layers.current_path().map(|p| p.as_slice()), Some(&[1][..]));
        assert_eq!(
            stack.get_last_command().map(Command::display_name),
            Some("Select Layer")
        );
    }
}
