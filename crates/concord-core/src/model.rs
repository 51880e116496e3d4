//! Domain types: raw contacts, their typed data rows, aggregates, and the
//! user-authored exceptions that override the matcher.
//!
//! None of this is persisted by the core itself — see [`crate::store`] for
//! the interface the persistence layer implements. These are plain value
//! types passed across that boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AggregateId, DataRowId, RawContactId};

// ─── RawContact ──────────────────────────────────────────────────────────────

/// Whether, and how, a raw contact participates in aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
  /// Eligible for the background pass; the common case.
  Default,
  /// Aggregated synchronously, inline with ingest, instead of waiting for
  /// the next background pass.
  Immediate,
  /// Never aggregated. `aggregate_id` stays `None` forever.
  Disabled,
}

/// One address-book entry from one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawContact {
  pub id:                 RawContactId,
  /// The aggregate this raw contact currently belongs to, or `None` while
  /// pending (or permanently, if `aggregation_mode == Disabled`).
  pub aggregate_id:       Option<AggregateId>,
  pub aggregation_mode:   AggregationMode,
  /// Cached display name, used only for aggregate display-name selection —
  /// never consulted by the matcher itself.
  pub display_name:       Option<String>,
  /// The account that owns this raw contact, e.g. `"google:alice@x.com"`.
  /// Used to break ties when choosing the aggregate's photo (§4.5).
  pub account_name:       String,
  pub custom_ringtone:    Option<String>,
  pub send_to_voicemail:  Option<bool>,
  pub last_time_contacted: Option<DateTime<Utc>>,
  pub times_contacted:    i64,
  pub starred:            bool,
  /// Package-scoped visibility; restricted data never leaks into a
  /// `fallback_primary_*` aggregate slot (§4.6).
  pub is_restricted:      bool,
}

// ─── DataRow ─────────────────────────────────────────────────────────────────

/// The typed attribute payloads a `DataRow` may carry.
///
/// `Other` is the escape hatch for mimetypes the matcher doesn't reason
/// about (e.g. a raw `Note`): such rows are read and stored but never
/// contribute a name or identifier candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mimetype", rename_all = "snake_case")]
pub enum DataRowValue {
  StructuredName { given: Option<String>, family: Option<String> },
  Nickname { nick: String },
  Email { address: String },
  Phone { number: String },
  Photo,
  Other { mimetype: String },
}

impl DataRowValue {
  /// Mirrors the Java source's mimetype constants; used for log messages
  /// and tests, never for matching decisions (those switch on the variant).
  pub fn mimetype(&self) -> &str {
    match self {
      Self::StructuredName { .. } => "structured_name",
      Self::Nickname { .. } => "nickname",
      Self::Email { .. } => "email",
      Self::Phone { .. } => "phone",
      Self::Photo => "photo",
      Self::Other { mimetype } => mimetype,
    }
  }
}

/// A typed attribute attached to a raw contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRow {
  pub id:             DataRowId,
  pub raw_contact_id: RawContactId,
  pub value:          DataRowValue,
  pub is_primary:     bool,
}

// ─── Aggregate ───────────────────────────────────────────────────────────────

/// The derived cluster representing one real person (or org/group) across
/// sources. Every field here is recomputed from current members — see
/// [`crate::aggregator`] §4.5/§4.6 — never hand-edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregate {
  pub id:           AggregateId,
  pub display_name: Option<String>,
  pub photo_id:     Option<DataRowId>,

  /// Preferred phone, any visibility.
  pub optimal_primary_phone_id:         Option<DataRowId>,
  pub optimal_primary_phone_restricted: bool,
  /// Preferred phone, unrestricted members only.
  pub fallback_primary_phone_id:        Option<DataRowId>,

  /// Preferred email, any visibility.
  pub optimal_primary_email_id:         Option<DataRowId>,
  pub optimal_primary_email_restricted: bool,
  /// Preferred email, unrestricted members only.
  pub fallback_primary_email_id:        Option<DataRowId>,

  pub send_to_voicemail:   Option<bool>,
  pub custom_ringtone:     Option<String>,
  pub last_time_contacted: Option<DateTime<Utc>>,
  pub times_contacted:     i64,
  pub starred:             bool,

  /// True iff the aggregate has exactly one member and it is restricted.
  pub single_is_restricted: bool,
}

impl Aggregate {
  /// A brand-new aggregate with no members yet attached — every derived
  /// field is empty, to be filled in by the first member that joins.
  pub fn empty(id: AggregateId) -> Self {
    Self {
      id,
      display_name: None,
      photo_id: None,
      optimal_primary_phone_id: None,
      optimal_primary_phone_restricted: false,
      fallback_primary_phone_id: None,
      optimal_primary_email_id: None,
      optimal_primary_email_restricted: false,
      fallback_primary_email_id: None,
      send_to_voicemail: None,
      custom_ringtone: None,
      last_time_contacted: None,
      times_contacted: 0,
      starred: false,
      single_is_restricted: false,
    }
  }
}

// ─── AggregationException ───────────────────────────────────────────────────

/// A user-authored override forcing two raw contacts to merge or split.
/// Immutable to the engine — it only ever reads these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionType {
  KeepIn,
  KeepOut,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AggregationException {
  pub raw_contact_id_1: RawContactId,
  pub raw_contact_id_2: RawContactId,
  pub exception_type:   ExceptionType,
}

impl AggregationException {
  /// The other raw contact in the pair, given one of them.
  pub fn peer_of(&self, raw_contact_id: RawContactId) -> Option<RawContactId> {
    if self.raw_contact_id_1 == raw_contact_id {
      Some(self.raw_contact_id_2)
    } else if self.raw_contact_id_2 == raw_contact_id {
      Some(self.raw_contact_id_1)
    } else {
      None
    }
  }
}
