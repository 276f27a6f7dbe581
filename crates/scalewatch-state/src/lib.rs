//! scalewatch-state — embedded state store for standalone operation.
//!
//! Backed by [redb](https://docs.rs/redb). Holds the two things a
//! standalone deployment needs locally:
//!
//! - desired replica counts, so the local scaling target has a system of
//!   record that survives restarts
//! - the local secrets table, used when no external secret store is wired
//!
//! Values are JSON-serialized into redb's `&[u8]` value columns. The
//! `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
