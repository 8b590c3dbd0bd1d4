//! Editing surface for the plate editor: toolbar registration and sync,
//! the decorator selection state machine with its floating quick-action
//! menu, and input routing on top of [`manos_plate_core::Editor`].

mod active_formats;
mod decorator_menu;
mod render;
mod scheduler;
mod surface;
mod toolbar;

pub use crate::active_formats::*;
pub use crate::decorator_menu::*;
pub use crate::render::*;
pub use crate::scheduler::*;
pub use crate::surface::*;
pub use crate::toolbar::*;
