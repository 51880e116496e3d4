//! Record-linkage core: matches and clusters raw per-source contacts into
//! unified aggregates representing real people.
//!
//! This crate is deliberately free of HTTP, CLI, and database dependencies
//! — it is the algorithm and the persistence trait it runs against, nothing
//! that talks to the outside world. `concord-store-sqlite` provides the one
//! concrete backend this workspace tests against; a host wires its own
//! `Store` impl and its own `PhoneNormalizer`/`EmailTokenizer` around it.

pub mod aggregator;
pub mod config;
pub mod engine;
pub mod error;
pub mod external;
pub mod ids;
pub mod matcher;
pub mod model;
pub mod name;
pub mod name_lookup;
pub mod scheduler;
pub mod store;

pub use aggregator::Aggregator;
pub use engine::Engine;
pub use error::{Error, Result};
pub use scheduler::Scheduler;
