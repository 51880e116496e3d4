//! Error types for `concord-core`.
//!
//! Transient store contention is handled transparently by the store's own
//! `yield_if_contended` and never surfaces here. What remains are the other
//! three kinds from the error-handling design: integrity violations (skip
//! the offending row, log at warn), programmer error (an unrecognised
//! mimetype silently contributes no candidate — not an `Err` at all), and
//! fatal store failure (propagated out of a pass).

use thiserror::Error;

use crate::ids::RawContactId;

#[derive(Debug, Error)]
pub enum Error {
  /// A raw contact referenced an aggregate, data row, or peer raw contact
  /// that no longer exists. Callers skip the offending row and continue.
  #[error("integrity violation while aggregating raw contact {0}: {1}")]
  Integrity(RawContactId, String),

  /// The raw contact named in a request was not found at all.
  #[error("raw contact not found: {0}")]
  RawContactNotFound(RawContactId),

  /// The persistence layer failed in a way the core has no opinion about.
  /// Propagated out of a pass; the scheduler leaves the cancel flag set so
  /// the worker exits cleanly and a future `schedule()` retries.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Box a backend-specific store error into [`Error::Store`].
pub(crate) fn store_err<E>(e: E) -> Error
where
  E: std::error::Error + Send + Sync + 'static,
{
  Error::Store(Box::new(e))
}
