//! SQL schema for the `concord-store-sqlite` backend.
//!
//! Executed once at connection startup via `CREATE TABLE IF NOT EXISTS`,
//! gated on `PRAGMA user_version` the same way the teacher's schema was.

/// Full schema DDL; idempotent.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS aggregates (
    id                                INTEGER PRIMARY KEY AUTOINCREMENT,
    display_name                      TEXT,
    photo_id                          INTEGER,
    optimal_primary_phone_id          INTEGER,
    optimal_primary_phone_restricted  INTEGER NOT NULL DEFAULT 0,
    fallback_primary_phone_id         INTEGER,
    optimal_primary_email_id          INTEGER,
    optimal_primary_email_restricted  INTEGER NOT NULL DEFAULT 0,
    fallback_primary_email_id         INTEGER,
    send_to_voicemail                 INTEGER,
    custom_ringtone                   TEXT,
    last_time_contacted                TEXT,
    times_contacted                   INTEGER NOT NULL DEFAULT 0,
    starred                           INTEGER NOT NULL DEFAULT 0,
    single_is_restricted              INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS raw_contacts (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    aggregate_id        INTEGER REFERENCES aggregates(id),
    aggregation_mode    TEXT NOT NULL DEFAULT 'default',
    display_name        TEXT,
    account_name        TEXT NOT NULL,
    custom_ringtone     TEXT,
    send_to_voicemail   INTEGER,
    last_time_contacted TEXT,
    times_contacted     INTEGER NOT NULL DEFAULT 0,
    starred             INTEGER NOT NULL DEFAULT 0,
    is_restricted       INTEGER NOT NULL DEFAULT 0
);

-- `value_json` holds the serialized DataRowValue (its own `mimetype` tag
-- included). `lookup_key` is populated only for Phone/Email rows, using
-- this backend's bundled normalizer (see store.rs) so phone_lookup and
-- email_lookup can run as plain indexed equality queries.
CREATE TABLE IF NOT EXISTS data_rows (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    raw_contact_id INTEGER NOT NULL REFERENCES raw_contacts(id),
    mimetype       TEXT NOT NULL,
    value_json     TEXT NOT NULL,
    is_primary     INTEGER NOT NULL DEFAULT 0,
    lookup_key     TEXT
);

CREATE INDEX IF NOT EXISTS data_rows_raw_contact_idx ON data_rows(raw_contact_id);
CREATE INDEX IF NOT EXISTS data_rows_lookup_key_idx  ON data_rows(lookup_key);

-- Entirely replaced per raw contact on every aggregation pass (invariant
-- 5) rather than diffed in place.
CREATE TABLE IF NOT EXISTS name_lookup (
    raw_contact_id  INTEGER NOT NULL REFERENCES raw_contacts(id),
    normalized_name TEXT NOT NULL,
    name_type       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS name_lookup_name_idx         ON name_lookup(normalized_name);
CREATE INDEX IF NOT EXISTS name_lookup_raw_contact_idx   ON name_lookup(raw_contact_id);

CREATE TABLE IF NOT EXISTS aggregation_exceptions (
    raw_contact_id_1 INTEGER NOT NULL REFERENCES raw_contacts(id),
    raw_contact_id_2 INTEGER NOT NULL REFERENCES raw_contacts(id),
    exception_type   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS exceptions_rc1_idx ON aggregation_exceptions(raw_contact_id_1);
CREATE INDEX IF NOT EXISTS exceptions_rc2_idx ON aggregation_exceptions(raw_contact_id_2);

PRAGMA user_version = 1;
";
