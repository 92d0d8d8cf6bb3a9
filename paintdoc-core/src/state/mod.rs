//! # State
//!
//! The parts of the document that commands operate on. Everything here is plain data - history,
//! notifications, and policy live in [`crate::document`].

pub mod frame;
pub mod layers;

/// Everything a [`crate::commands::Command`] may touch.
#[derive(Clone, Debug, Default)]
pub struct DocumentState {
    pub layers: layers::LayerStack,
    pub frame: frame::Frame,
}
