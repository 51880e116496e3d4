//! Newtype identifiers for rows handed to us by the persistence layer.
//!
//! Every id here is auto-generated by the store on insert (see
//! [`crate::store::Store`]) — the core never manufactures one itself.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
  ($name:ident, $doc:literal) => {
    #[doc = $doc]
    #[derive(
      Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    )]
    pub struct $name(pub i64);

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
    }

    impl From<i64> for $name {
      fn from(v: i64) -> Self { Self(v) }
    }
  };
}

id_type!(RawContactId, "Id of a `RawContact` row.");
id_type!(AggregateId, "Id of an `Aggregate` row.");
id_type!(DataRowId, "Id of a `DataRow` row.");
