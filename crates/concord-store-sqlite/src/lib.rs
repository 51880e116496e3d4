//! SQLite backend for `concord-core`'s `Store`/`Txn` traits.
//!
//! One connection behind a [`tokio::sync::Mutex`], used only for its
//! synchronous locking API — every method here runs on whatever thread
//! calls it, no async runtime required. See `store.rs` for why that's the
//! design that gives `Txn` an owned, `Send` transaction object.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
