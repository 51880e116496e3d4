//! The persistence interface the algorithm is written against (§6).
//!
//! Deliberately narrow: this is not a general contacts-database API, only
//! the handful of reads and writes the record-linkage core actually needs.
//! Schema, migrations, and the content-provider/CLI/IPC surface that would
//! sit on top of a real implementation are out of scope — see
//! `concord-store-sqlite` for a minimal concrete backend used by this
//! workspace's own tests.

use crate::{
  ids::{AggregateId, DataRowId, RawContactId},
  model::{Aggregate, AggregationException, DataRow, RawContact},
  name_lookup::{NameLookupEntry, NameLookupType},
};

/// A single open transaction. Mirrors the `begin / set_successful / end`
/// nesting described in §6 and §5: created via [`Store::begin`], marked
/// successful exactly once at the single happy exit, then ended — anything
/// else rolls back.
pub trait Txn: Send {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Mark this transaction as having completed successfully. Idempotent.
  fn set_successful(&mut self);

  /// Commit if [`Txn::set_successful`] was called, otherwise roll back.
  /// Consumes the transaction — every exit path goes through here exactly
  /// once.
  fn end(self) -> Result<(), Self::Error>;

  /// Release the write lock for pending readers if any are waiting, then
  /// reacquire it before returning. The only cooperative suspension point
  /// within a pass (§5) — distinct from cancellation, which ends the pass
  /// outright rather than merely pausing it.
  fn yield_if_contended(&mut self);

  // ── Reads ────────────────────────────────────────────────────────────

  fn raw_contact(&mut self, id: RawContactId) -> Result<Option<RawContact>, Self::Error>;

  fn data_rows(&mut self, raw_contact_id: RawContactId) -> Result<Vec<DataRow>, Self::Error>;

  /// All `AggregationException` rows naming `raw_contact_id` on either side.
  fn exceptions_for(
    &mut self,
    raw_contact_id: RawContactId,
  ) -> Result<Vec<AggregationException>, Self::Error>;

  /// The bulk lookup of §4.4 step 2: every `NameLookupEntry` whose
  /// `normalized_name` is one of `keys` *and* whose owning raw contact is
  /// already aggregated (`aggregate_id IS NOT NULL`).
  fn name_lookup_matches(&mut self, keys: &[String]) -> Result<Vec<NameLookupEntry>, Self::Error>;

  /// Raw contact ids of already-aggregated raw contacts whose canonicalised
  /// phone number equals `normalized_phone`. Canonicalisation itself is the
  /// caller's job (§1 scope cut) — this is the exact-equality predicate
  /// mentioned in §6.
  fn phone_lookup(&mut self, normalized_phone: &str) -> Result<Vec<RawContactId>, Self::Error>;

  /// Raw contact ids of already-aggregated raw contacts whose email address
  /// equals `normalized_email` under case-insensitive comparison (already
  /// applied by the caller).
  fn email_lookup(&mut self, normalized_email: &str) -> Result<Vec<RawContactId>, Self::Error>;

  /// Raw contact ids of already-aggregated raw contacts with an exact
  /// `NICKNAME`-tagged `NameLookupEntry` equal to `normalized_nick`.
  fn nickname_lookup(&mut self, normalized_nick: &str) -> Result<Vec<RawContactId>, Self::Error>;

  /// All raw contacts currently belonging to `aggregate_id`.
  fn members(&mut self, aggregate_id: AggregateId) -> Result<Vec<RawContact>, Self::Error>;

  /// Raw contact ids with `aggregate_id IS NULL AND aggregation_mode =
  /// DEFAULT` — the background pass's work queue (§4.7 step 1).
  fn pending_raw_contact_ids(&mut self) -> Result<Vec<RawContactId>, Self::Error>;

  fn aggregate(&mut self, id: AggregateId) -> Result<Option<Aggregate>, Self::Error>;

  // ── Writes ───────────────────────────────────────────────────────────

  /// Create a fresh, empty aggregate and return its id.
  fn create_aggregate(&mut self) -> Result<AggregateId, Self::Error>;

  fn set_aggregate_id(
    &mut self,
    raw_contact_id: RawContactId,
    aggregate_id:   AggregateId,
  ) -> Result<(), Self::Error>;

  /// Detach `raw_contact_id` from whatever aggregate it belongs to and
  /// return that aggregate's id, if any (§6 `mark_contact_for_aggregation`).
  fn clear_aggregate_id(
    &mut self,
    raw_contact_id: RawContactId,
  ) -> Result<Option<AggregateId>, Self::Error>;

  /// Delete every `NameLookupEntry` for `raw_contact_id` without replacing
  /// them — used when a raw contact is pulled out of aggregation entirely,
  /// as opposed to [`Txn::replace_name_lookup`] which re-derives them.
  fn clear_name_lookup(&mut self, raw_contact_id: RawContactId) -> Result<(), Self::Error>;

  /// Replace every `NameLookupEntry` for `raw_contact_id` with `entries`
  /// (invariant 5 — entirely replaced, never partially updated).
  fn replace_name_lookup(
    &mut self,
    raw_contact_id: RawContactId,
    entries:        &[(String, NameLookupType)],
  ) -> Result<(), Self::Error>;

  fn save_aggregate(&mut self, aggregate: &Aggregate) -> Result<(), Self::Error>;

  /// If `aggregate_id` now has zero members, delete it and return `true`.
  fn delete_aggregate_if_orphaned(&mut self, aggregate_id: AggregateId) -> Result<bool, Self::Error>;

  /// Fetch the data row backing a photo, phone, or email id chosen during
  /// derivation — used only to read back `is_restricted`/owner metadata
  /// when promoting primaries (§4.6).
  fn data_row(&mut self, id: DataRowId) -> Result<Option<DataRow>, Self::Error>;
}

/// Opens [`Txn`]s. One implementation per backend; `concord-store-sqlite`
/// provides the one this workspace tests against.
pub trait Store: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;
  type Txn: Txn<Error = Self::Error>;

  fn begin(&self) -> Result<Self::Txn, Self::Error>;
}
