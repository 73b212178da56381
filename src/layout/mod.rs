//! Keyboard layouts
//!
//! Which layouts are installed, which one is active, which layouts can
//! stand in for each other, and what keys type under each of them.

pub mod compat;
pub mod keymaps;
pub mod manager;

pub use compat::Script;
pub use keymaps::{KeyRenderer, XkbKeymaps};
pub use manager::{LayoutAdapter, LayoutManager, LayoutObserver, LayoutState};
