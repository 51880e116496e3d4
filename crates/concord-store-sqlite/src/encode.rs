//! Encoding and decoding helpers between `concord-core` domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings; `DataRowValue` round-trips through its
//! own `serde(tag = "mimetype")` JSON representation; enums with a small,
//! fixed set of variants get hand-written string mappings rather than
//! leaning on serde, so the column values stay readable in a `sqlite3`
//! shell.

use chrono::{DateTime, Utc};
use concord_core::{
  model::{AggregationException, AggregationMode, DataRowValue, ExceptionType},
  name_lookup::NameLookupType,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── AggregationMode ─────────────────────────────────────────────────────────

pub fn encode_aggregation_mode(m: AggregationMode) -> &'static str {
  match m {
    AggregationMode::Default => "default",
    AggregationMode::Immediate => "immediate",
    AggregationMode::Disabled => "disabled",
  }
}

pub fn decode_aggregation_mode(s: &str) -> Result<AggregationMode> {
  match s {
    "default" => Ok(AggregationMode::Default),
    "immediate" => Ok(AggregationMode::Immediate),
    "disabled" => Ok(AggregationMode::Disabled),
    other => Err(Error::UnknownAggregationMode(other.to_string())),
  }
}

// ─── NameLookupType ──────────────────────────────────────────────────────────

pub fn encode_name_type(t: NameLookupType) -> &'static str {
  use NameLookupType::*;
  match t {
    FullName => "full_name",
    FullNameReverse => "full_name_reverse",
    FullNameConcatenated => "full_name_concatenated",
    FullNameReverseConcatenated => "full_name_reverse_concatenated",
    FullNameWithNickname => "full_name_with_nickname",
    FullNameWithNicknameReverse => "full_name_with_nickname_reverse",
    GivenNameOnly => "given_name_only",
    GivenNameOnlyAsNickname => "given_name_only_as_nickname",
    FamilyNameOnly => "family_name_only",
    FamilyNameOnlyAsNickname => "family_name_only_as_nickname",
    Nickname => "nickname",
    EmailBasedNickname => "email_based_nickname",
  }
}

pub fn decode_name_type(s: &str) -> Result<NameLookupType> {
  use NameLookupType::*;
  Ok(match s {
    "full_name" => FullName,
    "full_name_reverse" => FullNameReverse,
    "full_name_concatenated" => FullNameConcatenated,
    "full_name_reverse_concatenated" => FullNameReverseConcatenated,
    "full_name_with_nickname" => FullNameWithNickname,
    "full_name_with_nickname_reverse" => FullNameWithNicknameReverse,
    "given_name_only" => GivenNameOnly,
    "given_name_only_as_nickname" => GivenNameOnlyAsNickname,
    "family_name_only" => FamilyNameOnly,
    "family_name_only_as_nickname" => FamilyNameOnlyAsNickname,
    "nickname" => Nickname,
    "email_based_nickname" => EmailBasedNickname,
    other => return Err(Error::UnknownNameType(other.to_string())),
  })
}

// ─── ExceptionType ───────────────────────────────────────────────────────────

pub fn encode_exception_type(t: ExceptionType) -> &'static str {
  match t {
    ExceptionType::KeepIn => "keep_in",
    ExceptionType::KeepOut => "keep_out",
  }
}

pub fn decode_exception_type(s: &str) -> Result<ExceptionType> {
  match s {
    "keep_in" => Ok(ExceptionType::KeepIn),
    "keep_out" => Ok(ExceptionType::KeepOut),
    other => Err(Error::UnknownExceptionType(other.to_string())),
  }
}

// ─── DataRowValue ────────────────────────────────────────────────────────────

pub fn encode_data_row_value(v: &DataRowValue) -> Result<String> { Ok(serde_json::to_string(v)?) }

pub fn decode_data_row_value(s: &str) -> Result<DataRowValue> { Ok(serde_json::from_str(s)?) }

/// One row as read straight out of `aggregation_exceptions`.
pub struct RawException {
  pub raw_contact_id_1: i64,
  pub raw_contact_id_2: i64,
  pub exception_type:   String,
}

impl RawException {
  pub fn into_exception(self) -> Result<AggregationException> {
    Ok(AggregationException {
      raw_contact_id_1: concord_core::ids::RawContactId(self.raw_contact_id_1),
      raw_contact_id_2: concord_core::ids::RawContactId(self.raw_contact_id_2),
      exception_type:   decode_exception_type(&self.exception_type)?,
    })
  }
}
