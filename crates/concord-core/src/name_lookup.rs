//! `NameLookupType`, the per-raw-contact name index it tags, and the
//! candidate-expansion functions that turn a structured name (or nickname,
//! or email local-part) into the set of lookup keys the matcher searches
//! for.
//!
//! Two distinct candidate sets exist (§4.4, §4.7 in spec terms):
//! [`CandidateMode::Match`] — everything, used while deciding who a raw
//! contact matches — and [`CandidateMode::Insert`] — everything except the
//! bare single-token `GIVEN_NAME_ONLY`/`FAMILY_NAME_ONLY` fallback, used when
//! rewriting the persisted index, to keep it small.

use serde::{Deserialize, Serialize};

use crate::{ids::RawContactId, name::NicknameLookup, name};

// ─── NameLookupType ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameLookupType {
  FullName,
  FullNameReverse,
  FullNameConcatenated,
  FullNameReverseConcatenated,
  FullNameWithNickname,
  FullNameWithNicknameReverse,
  GivenNameOnly,
  GivenNameOnlyAsNickname,
  FamilyNameOnly,
  FamilyNameOnlyAsNickname,
  /// A free-form `Nickname` data row, matched by exact normalised equality.
  Nickname,
  /// The local-part of an email address, treated as a candidate nickname.
  /// Added as a *candidate* during matching but never written back to the
  /// persisted index — see [`expand_email_based_nickname`].
  EmailBasedNickname,
}

impl NameLookupType {
  /// Distinguishes structured-name derivations (the first ten variants)
  /// from free-form nickname sources. Only structured-name tags are used in
  /// the secondary-match pass's approximate cross-matching (§4.4 step 3).
  pub fn is_based_on_structured_name(self) -> bool {
    !matches!(self, Self::Nickname | Self::EmailBasedNickname)
  }
}

/// A `(raw_contact_id, normalized_name, name_type)` row — the persisted
/// index entry. Entries for a raw contact are entirely replaced, never
/// partially updated (invariant 5).
#[derive(Debug, Clone)]
pub struct NameLookupEntry {
  pub raw_contact_id:  RawContactId,
  pub normalized_name: String,
  pub name_type:        NameLookupType,
}

// ─── Candidate expansion ─────────────────────────────────────────────────────

/// A single expanded lookup key plus the tag that produced it.
#[derive(Debug, Clone)]
pub struct NameCandidate {
  pub key:  String,
  pub kind: NameLookupType,
}

/// Which candidate set to build. `Insert` is the smaller of the two — see
/// module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateMode {
  Match,
  Insert,
}

/// A growing buffer of [`NameCandidate`]s, reused across raw contacts by the
/// pass loop to avoid allocator pressure (§9 "candidate list reuse"). Call
/// [`CandidateList::clear`] between raw contacts; the backing `Vec` is
/// truncated, not dropped.
#[derive(Debug, Default)]
pub struct CandidateList {
  buf: Vec<NameCandidate>,
}

impl CandidateList {
  pub fn new() -> Self { Self { buf: Vec::new() } }

  pub fn clear(&mut self) { self.buf.clear() }

  pub fn push(&mut self, key: String, kind: NameLookupType) {
    self.buf.push(NameCandidate { key, kind });
  }

  pub fn as_slice(&self) -> &[NameCandidate] { &self.buf }

  pub fn iter(&self) -> impl Iterator<Item = &NameCandidate> { self.buf.iter() }

  pub fn is_empty(&self) -> bool { self.buf.is_empty() }

  pub fn len(&self) -> usize { self.buf.len() }
}

/// Expand a structured name (`given`/`family`, already raw — normalisation
/// happens in here) into every applicable [`NameCandidate`], appending to
/// `list`. Existing contents of `list` are left untouched; call
/// [`CandidateList::clear`] first if you want a fresh set.
pub fn expand_structured_name(
  list:      &mut CandidateList,
  given:     Option<&str>,
  family:    Option<&str>,
  nicknames: &dyn NicknameLookup,
  mode:      CandidateMode,
) {
  let given_n  = given.map(name::normalize).filter(|s| !s.is_empty());
  let family_n = family.map(name::normalize).filter(|s| !s.is_empty());

  if let (Some(g), Some(f)) = (&given_n, &family_n) {
    list.push(format!("{g} {f}"), NameLookupType::FullName);
    list.push(format!("{f} {g}"), NameLookupType::FullNameReverse);
    list.push(format!("{g}{f}"), NameLookupType::FullNameConcatenated);
    list.push(format!("{f}{g}"), NameLookupType::FullNameReverseConcatenated);

    for nick in nicknames.nicknames_for(g) {
      list.push(format!("{nick} {f}"), NameLookupType::FullNameWithNickname);
      list.push(format!("{f} {nick}"), NameLookupType::FullNameWithNicknameReverse);
    }
  }

  if mode == CandidateMode::Match {
    if let Some(g) = &given_n {
      list.push(g.clone(), NameLookupType::GivenNameOnly);
      for nick in nicknames.nicknames_for(g) {
        list.push(nick.clone(), NameLookupType::GivenNameOnlyAsNickname);
      }
    }
    if let Some(f) = &family_n {
      list.push(f.clone(), NameLookupType::FamilyNameOnly);
      for nick in nicknames.nicknames_for(f) {
        list.push(nick.clone(), NameLookupType::FamilyNameOnlyAsNickname);
      }
    }
  }
}

/// Expand a free-form `Nickname` data row into its lookup candidate.
pub fn expand_nickname(list: &mut CandidateList, nick: &str) {
  let n = name::normalize(nick);
  if !n.is_empty() {
    list.push(n, NameLookupType::Nickname);
  }
}

/// Expand an email address's local-part into an `EMAIL_BASED_NICKNAME`
/// candidate. Deliberately **not** mirrored by an insert-mode counterpart:
/// this candidate is generated fresh every time a raw contact is matched
/// against (it costs nothing to recompute from the email data row) rather
/// than persisted to the index — see the module docs on `EmailBasedNickname`.
///
/// `local_part` comes from the caller's injected `EmailTokenizer`, not a
/// hardcoded `@`-split, so a host with a stricter address grammar still
/// governs what counts as the local part here.
pub fn expand_email_based_nickname(list: &mut CandidateList, local_part: &str) {
  let n = name::normalize(local_part);
  if !n.is_empty() {
    list.push(n, NameLookupType::EmailBasedNickname);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::name::StaticNicknameTable;

  #[test]
  fn full_name_variants_for_given_and_family() {
    let nicknames = StaticNicknameTable::new();
    let mut list = CandidateList::new();
    expand_structured_name(&mut list, Some("John"), Some("Doe"), &nicknames, CandidateMode::Match);

    let keys: Vec<_> = list.iter().map(|c| (c.key.as_str(), c.kind)).collect();
    assert!(keys.contains(&("john doe", NameLookupType::FullName)));
    assert!(keys.contains(&("doe john", NameLookupType::FullNameReverse)));
    assert!(keys.contains(&("johndoe", NameLookupType::FullNameConcatenated)));
    assert!(keys.contains(&("doejohn", NameLookupType::FullNameReverseConcatenated)));
    assert!(keys.contains(&("john", NameLookupType::GivenNameOnly)));
    assert!(keys.contains(&("doe", NameLookupType::FamilyNameOnly)));
  }

  #[test]
  fn nickname_substitution_bridges_robert_and_bob() {
    let nicknames = StaticNicknameTable::new();
    let mut list = CandidateList::new();
    expand_structured_name(&mut list, Some("Robert"), Some("Miller"), &nicknames, CandidateMode::Match);

    assert!(list
      .iter()
      .any(|c| c.key == "bob miller" && c.kind == NameLookupType::FullNameWithNickname));
  }

  #[test]
  fn insert_mode_skips_bare_single_token_fallback() {
    let nicknames = StaticNicknameTable::new();
    let mut list = CandidateList::new();
    expand_structured_name(&mut list, Some("John"), Some("Doe"), &nicknames, CandidateMode::Insert);

    assert!(!list.iter().any(|c| c.kind == NameLookupType::GivenNameOnly));
    assert!(!list.iter().any(|c| c.kind == NameLookupType::FamilyNameOnly));
    assert!(list.iter().any(|c| c.kind == NameLookupType::FullName));
  }

  #[test]
  fn email_based_nickname_normalizes_the_given_local_part() {
    let mut list = CandidateList::new();
    expand_email_based_nickname(&mut list, "JohnDoe");
    assert!(list
      .iter()
      .any(|c| c.key == "johndoe" && c.kind == NameLookupType::EmailBasedNickname));
  }
}
