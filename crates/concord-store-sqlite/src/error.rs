//! Error type for `concord-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] concord_core::Error),

  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown name_type in name_lookup row: {0:?}")]
  UnknownNameType(String),

  #[error("unknown aggregation_mode in raw_contacts row: {0:?}")]
  UnknownAggregationMode(String),

  #[error("unknown exception_type in aggregation_exceptions row: {0:?}")]
  UnknownExceptionType(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
