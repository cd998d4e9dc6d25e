//! Capability probing for configured data instances.
//!
//! A probe cycle checks every configured instance concurrently, unblocks the
//! UI on the first result and replaces the verified [`catalog::Catalog`] once
//! every check has settled.

pub mod check;
pub mod prober;

pub use check::*;
pub use prober::*;
