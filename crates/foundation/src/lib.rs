pub mod ids;
pub mod location;

// Foundation crate: small, well-tested primitives only.
pub use ids::*;
pub use location::*;
