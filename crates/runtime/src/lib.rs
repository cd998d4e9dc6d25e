//! Cooperative runtime pieces shared by the viewer shell crates.
//!
//! Everything here assumes a single cooperative executor: state handles are
//! single-writer, and the settle combinators drive their task set on the
//! task that awaits them.

use std::future::Future;
use std::pin::Pin;

pub mod notify;
pub mod settle;
pub mod state;

pub use notify::*;
pub use settle::*;
pub use state::*;

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
