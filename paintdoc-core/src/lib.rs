pub mod blend;
pub mod brush;
pub mod commands;
pub mod damage;
pub mod document;
pub mod events;
pub mod id;
pub mod io;
pub mod state;
pub mod surface;
pub mod util;

pub use id::FuzzID;
