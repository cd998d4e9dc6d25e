//! Deep-link hydration: turn a decoded fragment plus the verified catalog
//! into the [`SelectedView`] handed to the map.

pub mod directory;
pub mod orchestrator;
pub mod view;

pub use directory::*;
pub use orchestrator::*;
pub use view::*;
