//! [`SqliteStore`] — the SQLite implementation of `concord_core::store::{Store, Txn}`.
//!
//! One physical connection, shared behind a [`tokio::sync::Mutex`] used
//! purely for its synchronous `blocking_lock`/`blocking_lock_owned` API —
//! no async runtime is required to use this store. A [`Txn`] holds an
//! *owned* guard for its entire lifetime, which is what gives this crate
//! its one-deep advisory lock (§5): a second `begin()` call blocks the
//! calling thread until the first `Txn` ends.

use std::path::Path;
use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension as _};
use tokio::sync::{Mutex, OwnedMutexGuard};

use concord_core::{
  external::{DigitsOnlyPhoneNormalizer, EmailTokenizer as _, PhoneNormalizer as _, SimpleEmailTokenizer},
  ids::{AggregateId, DataRowId, RawContactId},
  model::{Aggregate, AggregationException, DataRow, DataRowValue, ExceptionType, RawContact},
  name_lookup::{NameLookupEntry, NameLookupType},
  store::{Store, Txn},
};

use crate::{
  encode::{
    decode_aggregation_mode, decode_data_row_value, decode_dt, decode_name_type,
    encode_data_row_value, encode_dt, encode_exception_type, encode_name_type, RawException,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A `concord-core` store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;
    Ok(Self { conn: Arc::new(Mutex::new(conn)) })
  }

  /// Open an in-memory store — used by this crate's own tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(SCHEMA)?;
    Ok(Self { conn: Arc::new(Mutex::new(conn)) })
  }

  // ── Ingest/fixture helpers ──────────────────────────────────────────────
  //
  // Creating raw contacts and data rows is a content-provider concern that
  // sits upstream of the narrow `Store` trait the algorithm runs against
  // (§6 lists only the reads and writes aggregation itself needs). These
  // are plain inherent methods, not part of that trait, used by this
  // workspace's own tests and by any host wiring its own ingest pipeline
  // around this backend.

  pub fn insert_raw_contact(&self, display_name: Option<&str>, account_name: &str) -> Result<RawContactId> {
    let conn = self.conn.blocking_lock();
    conn.execute(
      "INSERT INTO raw_contacts (display_name, account_name) VALUES (?1, ?2)",
      rusqlite::params![display_name, account_name],
    )?;
    Ok(RawContactId(conn.last_insert_rowid()))
  }

  pub fn set_restricted(&self, raw_contact_id: RawContactId, restricted: bool) -> Result<()> {
    let conn = self.conn.blocking_lock();
    conn.execute(
      "UPDATE raw_contacts SET is_restricted = ?1 WHERE id = ?2",
      rusqlite::params![restricted, raw_contact_id.0],
    )?;
    Ok(())
  }

  /// Insert a data row. Phone/Email rows get a `lookup_key` computed with
  /// this backend's bundled default normalizer — see the module docs on
  /// why that's a simplification, not a general solution.
  pub fn insert_data_row(
    &self,
    raw_contact_id: RawContactId,
    value: DataRowValue,
    is_primary: bool,
  ) -> Result<DataRowId> {
    let lookup_key = match &value {
      DataRowValue::Phone { number } => DigitsOnlyPhoneNormalizer.normalize(number),
      DataRowValue::Email { address } => SimpleEmailTokenizer.normalize(address),
      _ => None,
    };
    let mimetype = value.mimetype().to_string();
    let value_json = encode_data_row_value(&value)?;

    let conn = self.conn.blocking_lock();
    conn.execute(
      "INSERT INTO data_rows (raw_contact_id, mimetype, value_json, is_primary, lookup_key)
       VALUES (?1, ?2, ?3, ?4, ?5)",
      rusqlite::params![raw_contact_id.0, mimetype, value_json, is_primary, lookup_key],
    )?;
    Ok(DataRowId(conn.last_insert_rowid()))
  }

  pub fn insert_exception(
    &self,
    raw_contact_id_1: RawContactId,
    raw_contact_id_2: RawContactId,
    exception_type: ExceptionType,
  ) -> Result<()> {
    let conn = self.conn.blocking_lock();
    conn.execute(
      "INSERT INTO aggregation_exceptions (raw_contact_id_1, raw_contact_id_2, exception_type)
       VALUES (?1, ?2, ?3)",
      rusqlite::params![raw_contact_id_1.0, raw_contact_id_2.0, encode_exception_type(exception_type)],
    )?;
    Ok(())
  }
}

impl Store for SqliteStore {
  type Error = Error;
  type Txn = SqliteTxn;

  fn begin(&self) -> Result<SqliteTxn> {
    let guard = self.conn.clone().blocking_lock_owned();
    guard.execute_batch("BEGIN")?;
    Ok(SqliteTxn { guard, successful: false })
  }
}

// ─── Row decoding ────────────────────────────────────────────────────────────

const RAW_CONTACT_COLUMNS: &str = "id, aggregate_id, aggregation_mode, display_name, account_name,
   custom_ringtone, send_to_voicemail, last_time_contacted, times_contacted, starred, is_restricted";

fn decode_raw_contact(row: &rusqlite::Row) -> rusqlite::Result<(
  i64, Option<i64>, String, Option<String>, String, Option<String>, Option<bool>, Option<String>, i64, bool, bool,
)> {
  Ok((
    row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?,
    row.get(5)?, row.get(6)?, row.get(7)?, row.get(8)?, row.get(9)?, row.get(10)?,
  ))
}

#[allow(clippy::type_complexity)]
fn into_raw_contact(
  cols: (i64, Option<i64>, String, Option<String>, String, Option<String>, Option<bool>, Option<String>, i64, bool, bool),
) -> Result<RawContact> {
  let (id, aggregate_id, mode, display_name, account_name, custom_ringtone, send_to_voicemail, last_contacted, times_contacted, starred, is_restricted) = cols;
  Ok(RawContact {
    id: RawContactId(id),
    aggregate_id: aggregate_id.map(AggregateId),
    aggregation_mode: decode_aggregation_mode(&mode)?,
    display_name,
    account_name,
    custom_ringtone,
    send_to_voicemail,
    last_time_contacted: last_contacted.as_deref().map(decode_dt).transpose()?,
    times_contacted,
    starred,
    is_restricted,
  })
}

const DATA_ROW_COLUMNS: &str = "id, raw_contact_id, value_json, is_primary";

fn decode_data_row(row: &rusqlite::Row) -> rusqlite::Result<(i64, i64, String, bool)> {
  Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_data_row(cols: (i64, i64, String, bool)) -> Result<DataRow> {
  let (id, raw_contact_id, value_json, is_primary) = cols;
  Ok(DataRow {
    id: DataRowId(id),
    raw_contact_id: RawContactId(raw_contact_id),
    value: decode_data_row_value(&value_json)?,
    is_primary,
  })
}

const AGGREGATE_COLUMNS: &str = "id, display_name, photo_id, optimal_primary_phone_id,
   optimal_primary_phone_restricted, fallback_primary_phone_id, optimal_primary_email_id,
   optimal_primary_email_restricted, fallback_primary_email_id, send_to_voicemail, custom_ringtone,
   last_time_contacted, times_contacted, starred, single_is_restricted";

#[allow(clippy::type_complexity)]
fn decode_aggregate(row: &rusqlite::Row) -> rusqlite::Result<(
  i64, Option<String>, Option<i64>, Option<i64>, bool, Option<i64>, Option<i64>, bool, Option<i64>,
  Option<bool>, Option<String>, Option<String>, i64, bool, bool,
)> {
  Ok((
    row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?,
    row.get(7)?, row.get(8)?, row.get(9)?, row.get(10)?, row.get(11)?, row.get(12)?, row.get(13)?, row.get(14)?,
  ))
}

#[allow(clippy::type_complexity)]
fn into_aggregate(
  cols: (
    i64, Option<String>, Option<i64>, Option<i64>, bool, Option<i64>, Option<i64>, bool, Option<i64>,
    Option<bool>, Option<String>, Option<String>, i64, bool, bool,
  ),
) -> Result<Aggregate> {
  let (
    id, display_name, photo_id, optimal_phone, optimal_phone_restricted, fallback_phone, optimal_email,
    optimal_email_restricted, fallback_email, send_to_voicemail, custom_ringtone, last_contacted,
    times_contacted, starred, single_is_restricted,
  ) = cols;
  Ok(Aggregate {
    id: AggregateId(id),
    display_name,
    photo_id: photo_id.map(DataRowId),
    optimal_primary_phone_id: optimal_phone.map(DataRowId),
    optimal_primary_phone_restricted: optimal_phone_restricted,
    fallback_primary_phone_id: fallback_phone.map(DataRowId),
    optimal_primary_email_id: optimal_email.map(DataRowId),
    optimal_primary_email_restricted: optimal_email_restricted,
    fallback_primary_email_id: fallback_email.map(DataRowId),
    send_to_voicemail,
    custom_ringtone,
    last_time_contacted: last_contacted.as_deref().map(decode_dt).transpose()?,
    times_contacted,
    starred,
    single_is_restricted,
  })
}

// ─── Txn ─────────────────────────────────────────────────────────────────────

pub struct SqliteTxn {
  guard:      OwnedMutexGuard<Connection>,
  successful: bool,
}

impl Txn for SqliteTxn {
  type Error = Error;

  fn set_successful(&mut self) { self.successful = true; }

  fn end(self) -> Result<()> {
    if self.successful {
      self.guard.execute_batch("COMMIT")?;
    } else {
      self.guard.execute_batch("ROLLBACK")?;
    }
    Ok(())
  }

  /// This backend has a single exclusive connection guarded by the same
  /// lock the algorithm's one-deep advisory lock already uses — there is
  /// no separate reader class to release time to, so this is a scheduling
  /// hint rather than a real unlock/relock. A backend with row-level
  /// locking or a reader pool would implement this for real.
  fn yield_if_contended(&mut self) { std::thread::yield_now(); }

  fn raw_contact(&mut self, id: RawContactId) -> Result<Option<RawContact>> {
    let sql = format!("SELECT {RAW_CONTACT_COLUMNS} FROM raw_contacts WHERE id = ?1");
    let cols = self.guard.query_row(&sql, rusqlite::params![id.0], decode_raw_contact).optional()?;
    cols.map(into_raw_contact).transpose()
  }

  fn data_rows(&mut self, raw_contact_id: RawContactId) -> Result<Vec<DataRow>> {
    let sql = format!("SELECT {DATA_ROW_COLUMNS} FROM data_rows WHERE raw_contact_id = ?1");
    let mut stmt = self.guard.prepare(&sql)?;
    let rows = stmt
      .query_map(rusqlite::params![raw_contact_id.0], decode_data_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(into_data_row).collect()
  }

  fn exceptions_for(&mut self, raw_contact_id: RawContactId) -> Result<Vec<AggregationException>> {
    let mut stmt = self.guard.prepare(
      "SELECT raw_contact_id_1, raw_contact_id_2, exception_type
       FROM aggregation_exceptions WHERE raw_contact_id_1 = ?1 OR raw_contact_id_2 = ?1",
    )?;
    let rows = stmt
      .query_map(rusqlite::params![raw_contact_id.0], |row| {
        Ok(RawException { raw_contact_id_1: row.get(0)?, raw_contact_id_2: row.get(1)?, exception_type: row.get(2)? })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(RawException::into_exception).collect()
  }

  fn name_lookup_matches(&mut self, keys: &[String]) -> Result<Vec<NameLookupEntry>> {
    if keys.is_empty() {
      return Ok(Vec::new());
    }
    let placeholders = (1..=keys.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
    let sql = format!(
      "SELECT nl.raw_contact_id, nl.normalized_name, nl.name_type
       FROM name_lookup nl
       JOIN raw_contacts rc ON rc.id = nl.raw_contact_id
       WHERE nl.normalized_name IN ({placeholders}) AND rc.aggregate_id IS NOT NULL"
    );
    let mut stmt = self.guard.prepare(&sql)?;
    let params = rusqlite::params_from_iter(keys.iter());
    let rows = stmt
      .query_map(params, |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    rows
      .into_iter()
      .map(|(raw_contact_id, normalized_name, name_type)| {
        Ok(NameLookupEntry {
          raw_contact_id: RawContactId(raw_contact_id),
          normalized_name,
          name_type: decode_name_type(&name_type)?,
        })
      })
      .collect()
  }

  fn phone_lookup(&mut self, normalized_phone: &str) -> Result<Vec<RawContactId>> {
    let mut stmt = self.guard.prepare(
      "SELECT DISTINCT dr.raw_contact_id
       FROM data_rows dr
       JOIN raw_contacts rc ON rc.id = dr.raw_contact_id
       WHERE dr.mimetype = 'phone' AND dr.lookup_key = ?1 AND rc.aggregate_id IS NOT NULL",
    )?;
    let ids = stmt
      .query_map(rusqlite::params![normalized_phone], |row| row.get::<_, i64>(0))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids.into_iter().map(RawContactId).collect())
  }

  fn email_lookup(&mut self, normalized_email: &str) -> Result<Vec<RawContactId>> {
    let mut stmt = self.guard.prepare(
      "SELECT DISTINCT dr.raw_contact_id
       FROM data_rows dr
       JOIN raw_contacts rc ON rc.id = dr.raw_contact_id
       WHERE dr.mimetype = 'email' AND dr.lookup_key = ?1 AND rc.aggregate_id IS NOT NULL",
    )?;
    let ids = stmt
      .query_map(rusqlite::params![normalized_email], |row| row.get::<_, i64>(0))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids.into_iter().map(RawContactId).collect())
  }

  fn nickname_lookup(&mut self, normalized_nick: &str) -> Result<Vec<RawContactId>> {
    let mut stmt = self.guard.prepare(
      "SELECT DISTINCT nl.raw_contact_id
       FROM name_lookup nl
       JOIN raw_contacts rc ON rc.id = nl.raw_contact_id
       WHERE nl.name_type = 'nickname' AND nl.normalized_name = ?1 AND rc.aggregate_id IS NOT NULL",
    )?;
    let ids = stmt
      .query_map(rusqlite::params![normalized_nick], |row| row.get::<_, i64>(0))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids.into_iter().map(RawContactId).collect())
  }

  fn members(&mut self, aggregate_id: AggregateId) -> Result<Vec<RawContact>> {
    let sql = format!("SELECT {RAW_CONTACT_COLUMNS} FROM raw_contacts WHERE aggregate_id = ?1 ORDER BY id");
    let mut stmt = self.guard.prepare(&sql)?;
    let rows = stmt
      .query_map(rusqlite::params![aggregate_id.0], decode_raw_contact)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(into_raw_contact).collect()
  }

  fn pending_raw_contact_ids(&mut self) -> Result<Vec<RawContactId>> {
    let mut stmt = self
      .guard
      .prepare("SELECT id FROM raw_contacts WHERE aggregate_id IS NULL AND aggregation_mode = 'default' ORDER BY id")?;
    let ids = stmt.query_map([], |row| row.get::<_, i64>(0))?.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids.into_iter().map(RawContactId).collect())
  }

  fn aggregate(&mut self, id: AggregateId) -> Result<Option<Aggregate>> {
    let sql = format!("SELECT {AGGREGATE_COLUMNS} FROM aggregates WHERE id = ?1");
    let cols = self.guard.query_row(&sql, rusqlite::params![id.0], decode_aggregate).optional()?;
    cols.map(into_aggregate).transpose()
  }

  fn create_aggregate(&mut self) -> Result<AggregateId> {
    self.guard.execute("INSERT INTO aggregates DEFAULT VALUES", [])?;
    Ok(AggregateId(self.guard.last_insert_rowid()))
  }

  fn set_aggregate_id(&mut self, raw_contact_id: RawContactId, aggregate_id: AggregateId) -> Result<()> {
    self.guard.execute(
      "UPDATE raw_contacts SET aggregate_id = ?1 WHERE id = ?2",
      rusqlite::params![aggregate_id.0, raw_contact_id.0],
    )?;
    Ok(())
  }

  fn clear_aggregate_id(&mut self, raw_contact_id: RawContactId) -> Result<Option<AggregateId>> {
    let previous: Option<i64> = self
      .guard
      .query_row("SELECT aggregate_id FROM raw_contacts WHERE id = ?1", rusqlite::params![raw_contact_id.0], |r| r.get(0))
      .optional()?
      .flatten();
    self.guard.execute(
      "UPDATE raw_contacts SET aggregate_id = NULL WHERE id = ?1",
      rusqlite::params![raw_contact_id.0],
    )?;
    Ok(previous.map(AggregateId))
  }

  fn clear_name_lookup(&mut self, raw_contact_id: RawContactId) -> Result<()> {
    self.guard.execute("DELETE FROM name_lookup WHERE raw_contact_id = ?1", rusqlite::params![raw_contact_id.0])?;
    Ok(())
  }

  fn replace_name_lookup(&mut self, raw_contact_id: RawContactId, entries: &[(String, NameLookupType)]) -> Result<()> {
    self.guard.execute("DELETE FROM name_lookup WHERE raw_contact_id = ?1", rusqlite::params![raw_contact_id.0])?;
    for (normalized_name, name_type) in entries {
      self.guard.execute(
        "INSERT INTO name_lookup (raw_contact_id, normalized_name, name_type) VALUES (?1, ?2, ?3)",
        rusqlite::params![raw_contact_id.0, normalized_name, encode_name_type(*name_type)],
      )?;
    }
    Ok(())
  }

  fn save_aggregate(&mut self, aggregate: &Aggregate) -> Result<()> {
    self.guard.execute(
      "UPDATE aggregates SET
         display_name = ?2, photo_id = ?3,
         optimal_primary_phone_id = ?4, optimal_primary_phone_restricted = ?5, fallback_primary_phone_id = ?6,
         optimal_primary_email_id = ?7, optimal_primary_email_restricted = ?8, fallback_primary_email_id = ?9,
         send_to_voicemail = ?10, custom_ringtone = ?11, last_time_contacted = ?12,
         times_contacted = ?13, starred = ?14, single_is_restricted = ?15
       WHERE id = ?1",
      rusqlite::params![
        aggregate.id.0,
        aggregate.display_name,
        aggregate.photo_id.map(|id| id.0),
        aggregate.optimal_primary_phone_id.map(|id| id.0),
        aggregate.optimal_primary_phone_restricted,
        aggregate.fallback_primary_phone_id.map(|id| id.0),
        aggregate.optimal_primary_email_id.map(|id| id.0),
        aggregate.optimal_primary_email_restricted,
        aggregate.fallback_primary_email_id.map(|id| id.0),
        aggregate.send_to_voicemail,
        aggregate.custom_ringtone,
        aggregate.last_time_contacted.map(encode_dt),
        aggregate.times_contacted,
        aggregate.starred,
        aggregate.single_is_restricted,
      ],
    )?;
    Ok(())
  }

  fn delete_aggregate_if_orphaned(&mut self, aggregate_id: AggregateId) -> Result<bool> {
    let member_count: i64 = self.guard.query_row(
      "SELECT COUNT(*) FROM raw_contacts WHERE aggregate_id = ?1",
      rusqlite::params![aggregate_id.0],
      |r| r.get(0),
    )?;
    if member_count == 0 {
      self.guard.execute("DELETE FROM aggregates WHERE id = ?1", rusqlite::params![aggregate_id.0])?;
      Ok(true)
    } else {
      Ok(false)
    }
  }

  fn data_row(&mut self, id: DataRowId) -> Result<Option<DataRow>> {
    let sql = format!("SELECT {DATA_ROW_COLUMNS} FROM data_rows WHERE id = ?1");
    let cols = self.guard.query_row(&sql, rusqlite::params![id.0], decode_data_row).optional()?;
    cols.map(into_data_row).transpose()
  }
}
