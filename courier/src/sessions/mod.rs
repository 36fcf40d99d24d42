//! Session drivers shipped with the crate

pub mod tree;

pub use tree::{SessionEvent, TreeSession, UiNode};
