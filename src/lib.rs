//! # Object-mode transform stages with upstream error bubbling
//!
//! This crate provides small object-mode transform stages that are composed
//! by explicit linking. Each stage drives one item at a time through a
//! user-supplied transform; failures surface as stage-local error events
//! instead of panics. Stages can opt into *error bubbling*, which re-emits a
//! stage's errors on every upstream source linked to it, so a whole chain's
//! failures can be handled at the stage where the data originates.
//!
//! ## Core Concepts
//!
//! - **Stage**: an object-mode transform unit with a serialized worker
//! - **Transform**: the per-item extension point (sync by default, async by
//!   opt-in via a one-shot completion handle)
//! - **Link / Unlink**: connecting an upstream source to a stage's input
//! - **Bubbling**: re-emission of a stage's errors on its linked sources
//!
//! ## Example
//!
//! ```rust
//! use stageweld::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let upper = map(|line: String| Ok(line.to_uppercase()));
//!     let sink = Collector::spawn();
//!     upper.link_to(&sink);
//!
//!     upper.write("hello".to_string());
//!     upper.end();
//!
//!     assert_eq!(sink.collected().await, vec!["HELLO".to_string()]);
//!     Ok(())
//! }
//! ```

mod bubble;

pub mod error;
pub mod events;
pub mod link;
pub mod sinks;
pub mod stage;
pub mod stages;

// Re-export commonly used items
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::events::{ListenerId, SourceRef};
    pub use crate::link::{link, unlink, Inlet, Outlet, OutletExt};
    pub use crate::sinks::Collector;
    pub use crate::stage::{Completion, Emitter, Stage, Transform};
    pub use crate::stages::{filter, map, map_async, method, passthrough, Invoke, MapDone};
}

// Re-export main error type
pub use error::{Error, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
