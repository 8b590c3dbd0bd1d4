//! Document model, transactions, commands and content conversion for the
//! plate editor. Everything here is host-agnostic; the `manos-plate` crate
//! layers the toolbar, decorator menu and input surface on top.

mod abort;
pub mod commands;
mod core;
mod decorator;
pub mod dom;
mod fragment;
pub mod html;
mod import;
pub mod markdown;
mod node;
mod normalize;
mod plugin;
mod selection;
mod serde_value;
mod state;
mod tracker;
mod transaction;

pub use crate::abort::*;
pub use crate::core::*;
pub use crate::decorator::*;
pub use crate::fragment::NodeTree;
pub use crate::import::*;
pub use crate::node::*;
pub use crate::plugin::*;
pub use crate::selection::*;
pub use crate::serde_value::*;
pub use crate::state::*;
pub use crate::tracker::*;
pub use crate::transaction::*;
