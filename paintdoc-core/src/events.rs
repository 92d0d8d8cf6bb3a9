//! # Events
//!
//! Synchronous, in-process notification. Observers are called in the order they connected,
//! on the thread that caused the event.

pub struct Subscription;
pub type SubscriptionID = crate::FuzzID<Subscription>;

/// A list of observers, each called with a reference to the event's arguments.
pub struct Event<Args> {
    handlers: Vec<(SubscriptionID, Box<dyn FnMut(&Args)>)>,
}
impl<Args> Default for Event<Args> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}
impl<Args> std::fmt::Debug for Event<Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
impl<Args> Event<Args> {
    pub fn connect(&mut self, handler: impl FnMut(&Args) + 'static) -> SubscriptionID {
        let id = SubscriptionID::default();
        self.handlers.push((id, Box::new(handler)));
        id
    }
    /// Returns false if the subscription wasn't connected to this event.
    pub fn disconnect(&mut self, id: SubscriptionID) -> bool {
        let len = self.handlers.len();
        self.handlers.retain(|(handler_id, _)| *handler_id != id);
        len != self.handlers.len()
    }
    pub fn emit(&mut self, args: &Args) {
        for (_, handler) in &mut self.handlers {
            handler(args);
        }
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Observers that get mutable access to some target, rather than arguments.
///
/// The target usually owns the hook, so it must be taken out for the duration of the call. Observers
/// connected while it's out are kept, see [`Hook::restore`].
pub struct Hook<Target: ?Sized> {
    handlers: Vec<(SubscriptionID, Box<dyn FnMut(&mut Target)>)>,
}
impl<Target: ?Sized> Default for Hook<Target> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}
impl<Target: ?Sized> std::fmt::Debug for Hook<Target> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
impl<Target: ?Sized> Hook<Target> {
    pub fn connect(&mut self, handler: impl FnMut(&mut Target) + 'static) -> SubscriptionID {
        let id = SubscriptionID::default();
        self.handlers.push((id, Box::new(handler)));
        id
    }
    pub fn disconnect(&mut self, id: SubscriptionID) -> bool {
        let len = self.handlers.len();
        self.handlers.retain(|(handler_id, _)| *handler_id != id);
        len != self.handlers.len()
    }
    pub fn call(&mut self, target: &mut Target) {
        for (_, handler) in &mut self.handlers {
            handler(target);
        }
    }
    /// Put a taken hook back, keeping anything that connected in the meantime after the originals.
    pub fn restore(&mut self, mut taken: Self) {
        taken.handlers.append(&mut self.handlers);
        *self = taken;
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{cell::RefCell, rc::Rc};
    #[test]
    fn emits_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut event = Event::<u32>::default();
        let first = {
            let log = log.clone();
            event.connect(move |v| log.borrow_mut().push(("first", *v)))
        };
        {
            let log = log.clone();
            event.connect(move |v| log.borrow_mut().push(("second", *v)));
        }
        event.emit(&1);
        assert!(event.disconnect(first));
        assert!(!event.disconnect(first));
        event.emit(&2);
        assert_eq!(
            *log.borrow(),
            vec![("first", 1), ("second", 1), ("second", 2)]
        );
    }
    #[test]
    fn hook_restore_keeps_late_connections() {
        let mut hook = Hook::<u32>::default();
        hook.connect(|v| *v += 1);
        let mut taken = std::mem::take(&mut hook);
        hook.connect(|v| *v *= 10);
        let mut value = 1;
        taken.call(&mut value);
        hook.restore(taken);
        hook.call(&mut value);
        assert_eq!(value, 30);
    }
}
