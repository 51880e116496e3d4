//! `Aggregator` — the single-contact algorithm of §4.4, §4.5, §4.6, plus the
//! suggestion query of §4.9.
//!
//! One `Aggregator` is meant to live for the lifetime of a pass (or a whole
//! process) and be reused across raw contacts: its `ContactMatcher` and
//! `CandidateList` are cleared and refilled per call rather than
//! reallocated, per the reuse guidance in §9.

use crate::{
  error::{store_err, Error},
  external::{EmailTokenizer, PhoneNormalizer, SimpleEmailTokenizer, DigitsOnlyPhoneNormalizer},
  ids::{AggregateId, DataRowId, RawContactId},
  matcher::ContactMatcher,
  model::{Aggregate, DataRowValue, ExceptionType, RawContact},
  name,
  name::{NicknameLookup, StaticNicknameTable},
  name_lookup::{
    expand_email_based_nickname, expand_nickname, expand_structured_name, CandidateList,
    CandidateMode, NameCandidate, NameLookupType,
  },
  store::Txn,
};

/// Owns the reusable scoreboard and candidate buffer, plus the three
/// injectable collaborators (§1's "external, assumed-correct" boundary).
pub struct Aggregator<N = StaticNicknameTable, P = DigitsOnlyPhoneNormalizer, E = SimpleEmailTokenizer>
where
  N: NicknameLookup,
  P: PhoneNormalizer,
  E: EmailTokenizer,
{
  nicknames: N,
  phone:     P,
  email:     E,
  matcher:   ContactMatcher,
  /// Candidates for the raw contact currently being processed. Also read
  /// back after matching to decide what gets written to the persisted
  /// name-lookup index (§4.4 step 5).
  candidates: CandidateList,
  score_threshold_primary:   i32,
  score_threshold_secondary: i32,
  score_threshold_suggest:   i32,
}

impl Default for Aggregator<StaticNicknameTable, DigitsOnlyPhoneNormalizer, SimpleEmailTokenizer> {
  fn default() -> Self {
    Self::new(
      crate::config::AggregationConfig::default(),
      StaticNicknameTable::new(),
      DigitsOnlyPhoneNormalizer,
      SimpleEmailTokenizer,
    )
  }
}

impl<N, P, E> Aggregator<N, P, E>
where
  N: NicknameLookup,
  P: PhoneNormalizer,
  E: EmailTokenizer,
{
  pub fn new(config: crate::config::AggregationConfig, nicknames: N, phone: P, email: E) -> Self {
    Self {
      nicknames,
      phone,
      email,
      matcher: ContactMatcher::new(),
      candidates: CandidateList::new(),
      score_threshold_primary: config.score_threshold_primary,
      score_threshold_secondary: config.score_threshold_secondary,
      score_threshold_suggest: config.score_threshold_suggest,
    }
  }

  /// §4.4 — match or create an aggregate for `raw_contact_id`, write it
  /// back, and recompute every derived field (§4.5, §4.6) across the
  /// resulting membership. Returns the aggregate it now belongs to.
  pub fn aggregate_contact<T: Txn>(
    &mut self,
    txn: &mut T,
    raw_contact_id: RawContactId,
  ) -> Result<AggregateId, Error> {
    if txn.raw_contact(raw_contact_id).map_err(store_err)?.is_none() {
      return Err(Error::RawContactNotFound(raw_contact_id));
    }

    self.matcher.clear();

    // Step 1 — exceptions. A KEEP_IN hit against an already-aggregated peer
    // wins outright and skips matching entirely; every KEEP_OUT hit against
    // an already-aggregated peer is fed to the matcher so steps 2-3 never
    // consider it.
    let exceptions = txn.exceptions_for(raw_contact_id).map_err(store_err)?;
    let mut forced: Option<AggregateId> = None;
    for exception in &exceptions {
      let Some(peer_id) = exception.peer_of(raw_contact_id) else { continue };
      let Some(peer) = txn.raw_contact(peer_id).map_err(store_err)? else { continue };
      let Some(peer_aggregate_id) = peer.aggregate_id else { continue };
      match exception.exception_type {
        ExceptionType::KeepIn => {
          forced = Some(peer_aggregate_id);
          break;
        }
        ExceptionType::KeepOut => self.matcher.keep_out(peer_aggregate_id),
      }
    }

    // Steps 2-3 run regardless of `forced` — they populate `self.candidates`,
    // which step 5 needs to rewrite the name-lookup index either way.
    self.scan_own_data(txn, raw_contact_id)?;

    let aggregate_id = if let Some(id) = forced {
      id
    } else if let Some(id) = self.matcher.pick_best_match(self.score_threshold_primary) {
      id
    } else if let Some(id) = self.secondary_match(txn)? {
      id
    } else {
      txn.create_aggregate().map_err(store_err)?
    };

    // Step 5 — rewrite the persisted index from scratch.
    let insert_entries: Vec<(String, NameLookupType)> = self
      .candidates
      .iter()
      .filter(|c| is_insert_mode_type(c.kind))
      .map(|c| (c.key.clone(), c.kind))
      .collect();
    txn.replace_name_lookup(raw_contact_id, &insert_entries).map_err(store_err)?;

    // Step 6 — write back.
    txn.set_aggregate_id(raw_contact_id, aggregate_id).map_err(store_err)?;

    // Steps 7-8 — recompute derived fields and promote primaries.
    self.recompute_aggregate(txn, aggregate_id)?;

    // Step 9 — refresh visibility. Folded into `single_is_restricted` and
    // the optimal/fallback primary slots above; there is no separate
    // visibility store to notify since permissions are a host concern
    // (§1 Non-goals).

    Ok(aggregate_id)
  }

  /// §4.9 — rank other aggregates similar to `aggregate_id`'s own members,
  /// for a human to review. Runs step 2's identifier/name scan per member,
  /// without ever joining or writing anything.
  pub fn suggestions<T: Txn>(
    &mut self,
    txn: &mut T,
    aggregate_id: AggregateId,
    max: usize,
  ) -> Result<Vec<AggregateId>, Error> {
    self.matcher.clear();
    self.matcher.keep_out(aggregate_id);

    for member in txn.members(aggregate_id).map_err(store_err)? {
      self.scan_own_data(txn, member.id)?;
    }

    Ok(self.matcher.pick_best_matches(max, self.score_threshold_suggest))
  }

  /// Recompute every derived field of `aggregate_id` from its current
  /// members (§4.5, §4.6). Idempotent — safe to call with no membership
  /// change, e.g. from `update_aggregate_data`.
  pub fn recompute_aggregate<T: Txn>(
    &mut self,
    txn: &mut T,
    aggregate_id: AggregateId,
  ) -> Result<(), Error> {
    let members = txn.members(aggregate_id).map_err(store_err)?;
    if members.is_empty() {
      return Ok(());
    }

    let mut aggregate = txn
      .aggregate(aggregate_id)
      .map_err(store_err)?
      .unwrap_or_else(|| Aggregate::empty(aggregate_id));

    aggregate.display_name = most_complex_display_name(&members);
    aggregate.photo_id = self.choose_photo(txn, &members)?;
    aggregate.send_to_voicemail = aggregate_send_to_voicemail(&members);
    aggregate.custom_ringtone = members.iter().find_map(|m| m.custom_ringtone.clone());
    aggregate.last_time_contacted = members.iter().filter_map(|m| m.last_time_contacted).max();
    aggregate.times_contacted = members.iter().map(|m| m.times_contacted).max().unwrap_or(0);
    aggregate.starred = members.iter().any(|m| m.starred);
    aggregate.single_is_restricted = matches!(members.as_slice(), [only] if only.is_restricted);

    // Primary promotion starts fresh each recompute rather than only
    // folding in the newly-joined member, so a split that removes the
    // current optimal holder is reflected correctly.
    aggregate.optimal_primary_phone_id = None;
    aggregate.optimal_primary_phone_restricted = false;
    aggregate.fallback_primary_phone_id = None;
    aggregate.optimal_primary_email_id = None;
    aggregate.optimal_primary_email_restricted = false;
    aggregate.fallback_primary_email_id = None;

    for member in &members {
      for row in txn.data_rows(member.id).map_err(store_err)?.iter().filter(|r| r.is_primary) {
        match &row.value {
          DataRowValue::Phone { .. } => promote_slot(
            &mut aggregate.optimal_primary_phone_id,
            &mut aggregate.optimal_primary_phone_restricted,
            &mut aggregate.fallback_primary_phone_id,
            row.id,
            member.is_restricted,
          ),
          DataRowValue::Email { .. } => promote_slot(
            &mut aggregate.optimal_primary_email_id,
            &mut aggregate.optimal_primary_email_restricted,
            &mut aggregate.fallback_primary_email_id,
            row.id,
            member.is_restricted,
          ),
          _ => {}
        }
      }
    }

    txn.save_aggregate(&aggregate).map_err(store_err)?;
    Ok(())
  }

  /// Step 2 of §4.4: scan `raw_contact_id`'s data rows, building
  /// `self.candidates` and folding every phone/email/nickname hit plus the
  /// bulk name-lookup match into `self.matcher`.
  fn scan_own_data<T: Txn>(&mut self, txn: &mut T, raw_contact_id: RawContactId) -> Result<(), Error> {
    self.candidates.clear();
    let rows = txn.data_rows(raw_contact_id).map_err(store_err)?;

    for row in &rows {
      match &row.value {
        DataRowValue::StructuredName { given, family } => {
          expand_structured_name(
            &mut self.candidates,
            given.as_deref(),
            family.as_deref(),
            &self.nicknames,
            CandidateMode::Match,
          );
        }
        DataRowValue::Nickname { nick } => {
          expand_nickname(&mut self.candidates, nick);
          let normalized = name::normalize(nick);
          if !normalized.is_empty() {
            for peer_id in txn.nickname_lookup(&normalized).map_err(store_err)? {
              if let Some(agg_id) = self.aggregate_id_of(txn, peer_id)? {
                self.matcher.update_score_with_nickname_match(agg_id);
              }
            }
          }
        }
        DataRowValue::Email { address } => {
          if let Some(local_part) = self.email.local_part(address) {
            expand_email_based_nickname(&mut self.candidates, &local_part);
          }
          if let Some(normalized) = self.email.normalize(address) {
            for peer_id in txn.email_lookup(&normalized).map_err(store_err)? {
              if let Some(agg_id) = self.aggregate_id_of(txn, peer_id)? {
                self.matcher.update_score_with_email_match(agg_id);
              }
            }
          }
        }
        DataRowValue::Phone { number } => {
          if let Some(normalized) = self.phone.normalize(number) {
            for peer_id in txn.phone_lookup(&normalized).map_err(store_err)? {
              if let Some(agg_id) = self.aggregate_id_of(txn, peer_id)? {
                self.matcher.update_score_with_phone_match(agg_id);
              }
            }
          }
        }
        DataRowValue::Photo | DataRowValue::Other { .. } => {}
      }
    }

    if self.candidates.is_empty() {
      return Ok(());
    }

    let keys: Vec<String> = self.candidates.iter().map(|c| c.key.clone()).collect();
    for entry in txn.name_lookup_matches(&keys).map_err(store_err)? {
      let Some(agg_id) = self.aggregate_id_of(txn, entry.raw_contact_id)? else { continue };
      for candidate in self.candidates.iter().filter(|c| c.key == entry.normalized_name) {
        self.matcher.match_name(
          agg_id,
          candidate.kind,
          &candidate.key,
          entry.name_type,
          &entry.normalized_name,
          false,
        );
      }
    }

    Ok(())
  }

  /// Step 3 of §4.4: for every aggregate with a phone/email hit but a
  /// sub-threshold name score, approximately cross-match its members'
  /// structured names against `self.candidates`.
  fn secondary_match<T: Txn>(&mut self, txn: &mut T) -> Result<Option<AggregateId>, Error> {
    let secondary_aggregates = self.matcher.prepare_secondary_match_candidates(self.score_threshold_primary);
    if secondary_aggregates.is_empty() {
      return Ok(None);
    }

    let own_candidates: Vec<NameCandidate> = self
      .candidates
      .iter()
      .filter(|c| c.kind.is_based_on_structured_name())
      .cloned()
      .collect();
    if own_candidates.is_empty() {
      return Ok(None);
    }

    let mut peer_candidates = CandidateList::new();
    for aggregate_id in secondary_aggregates {
      for member in txn.members(aggregate_id).map_err(store_err)? {
        peer_candidates.clear();
        for row in txn.data_rows(member.id).map_err(store_err)? {
          if let DataRowValue::StructuredName { given, family } = &row.value {
            expand_structured_name(
              &mut peer_candidates,
              given.as_deref(),
              family.as_deref(),
              &self.nicknames,
              CandidateMode::Match,
            );
          }
        }
        for peer in peer_candidates.iter().filter(|c| c.kind.is_based_on_structured_name()) {
          for own in &own_candidates {
            self.matcher.match_name(aggregate_id, own.kind, &own.key, peer.kind, &peer.key, true);
          }
        }
      }
    }

    Ok(self.matcher.pick_best_match(self.score_threshold_secondary))
  }

  fn aggregate_id_of<T: Txn>(
    &self,
    txn: &mut T,
    raw_contact_id: RawContactId,
  ) -> Result<Option<AggregateId>, Error> {
    Ok(txn.raw_contact(raw_contact_id).map_err(store_err)?.and_then(|rc| rc.aggregate_id))
  }

  fn choose_photo<T: Txn>(
    &self,
    txn: &mut T,
    members: &[RawContact],
  ) -> Result<Option<DataRowId>, Error> {
    let mut choice: Option<(String, DataRowId)> = None;
    for member in members {
      let Some(photo_row) = txn
        .data_rows(member.id)
        .map_err(store_err)?
        .into_iter()
        .find(|r| matches!(r.value, DataRowValue::Photo))
      else {
        continue;
      };
      let key = member.account_name.to_lowercase();
      choice = match choice {
        Some((cur_key, cur_id)) if cur_key <= key => Some((cur_key, cur_id)),
        _ => Some((key, photo_row.id)),
      };
    }
    Ok(choice.map(|(_, id)| id))
  }
}

/// Sets `optimal` the first time any candidate arrives (any visibility),
/// and `fallback` the first time an *unrestricted* candidate arrives
/// (§4.6). Both are sticky for the rest of the pass over this aggregate's
/// members — first writer wins.
fn promote_slot(
  optimal: &mut Option<DataRowId>,
  optimal_restricted: &mut bool,
  fallback: &mut Option<DataRowId>,
  candidate_id: DataRowId,
  candidate_restricted: bool,
) {
  if optimal.is_none() {
    *optimal = Some(candidate_id);
    *optimal_restricted = candidate_restricted;
  }
  if fallback.is_none() && !candidate_restricted {
    *fallback = Some(candidate_id);
  }
}

fn most_complex_display_name(members: &[RawContact]) -> Option<String> {
  let mut best: Option<&str> = None;
  for member in members {
    let Some(name) = member.display_name.as_deref().filter(|n| !n.is_empty()) else { continue };
    best = match best {
      None => Some(name),
      Some(current) if name::compare_complexity(name, current) == std::cmp::Ordering::Greater => Some(name),
      other => other,
    };
  }
  best.map(|s| s.to_string())
}

fn aggregate_send_to_voicemail(members: &[RawContact]) -> Option<bool> {
  let values: Vec<bool> = members.iter().filter_map(|m| m.send_to_voicemail).collect();
  if values.is_empty() {
    None
  } else {
    Some(values.iter().all(|&v| v))
  }
}

/// The persisted index excludes the bare single-token fallback (§4.2) and
/// `EMAIL_BASED_NICKNAME`, which is recomputed fresh on every match instead
/// of stored (see `name_lookup` module docs).
fn is_insert_mode_type(kind: NameLookupType) -> bool {
  use NameLookupType::*;
  !matches!(
    kind,
    GivenNameOnly | GivenNameOnlyAsNickname | FamilyNameOnly | FamilyNameOnlyAsNickname | EmailBasedNickname
  )
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;
  use crate::{
    ids::{AggregateId, DataRowId, RawContactId},
    model::{AggregationException, AggregationMode, DataRow},
    name_lookup::NameLookupEntry,
  };

  /// A minimal in-memory `Txn` sufficient to exercise the aggregator
  /// without a real backend. `concord-store-sqlite` provides the backend
  /// this workspace actually persists against.
  #[derive(Default)]
  struct MemTxn {
    raw_contacts: HashMap<i64, RawContact>,
    data_rows:    HashMap<i64, Vec<DataRow>>,
    aggregates:   HashMap<i64, Aggregate>,
    name_lookup:  Vec<NameLookupEntry>,
    exceptions:   Vec<AggregationException>,
    next_aggregate_id: i64,
    next_data_row_id:  i64,
  }

  impl MemTxn {
    fn add_raw_contact(&mut self, id: i64, display_name: &str, account: &str) {
      self.raw_contacts.insert(
        id,
        RawContact {
          id: RawContactId(id),
          aggregate_id: None,
          aggregation_mode: AggregationMode::Default,
          display_name: Some(display_name.to_string()),
          account_name: account.to_string(),
          custom_ringtone: None,
          send_to_voicemail: None,
          last_time_contacted: None,
          times_contacted: 0,
          starred: false,
          is_restricted: false,
        },
      );
    }

    fn add_name_row(&mut self, raw_contact_id: i64, given: &str, family: &str) {
      self.next_data_row_id += 1;
      self.data_rows.entry(raw_contact_id).or_default().push(DataRow {
        id: DataRowId(self.next_data_row_id),
        raw_contact_id: RawContactId(raw_contact_id),
        value: DataRowValue::StructuredName {
          given: Some(given.to_string()),
          family: Some(family.to_string()),
        },
        is_primary: false,
      });
    }

    fn add_phone_row(&mut self, raw_contact_id: i64, number: &str) {
      self.next_data_row_id += 1;
      self.data_rows.entry(raw_contact_id).or_default().push(DataRow {
        id: DataRowId(self.next_data_row_id),
        raw_contact_id: RawContactId(raw_contact_id),
        value: DataRowValue::Phone { number: number.to_string() },
        is_primary: true,
      });
    }

    fn add_email_row(&mut self, raw_contact_id: i64, address: &str) {
      self.next_data_row_id += 1;
      self.data_rows.entry(raw_contact_id).or_default().push(DataRow {
        id: DataRowId(self.next_data_row_id),
        raw_contact_id: RawContactId(raw_contact_id),
        value: DataRowValue::Email { address: address.to_string() },
        is_primary: true,
      });
    }
  }

  impl Txn for MemTxn {
    type Error = std::convert::Infallible;

    fn set_successful(&mut self) {}
    fn end(self) -> Result<(), Self::Error> { Ok(()) }
    fn yield_if_contended(&mut self) {}

    fn raw_contact(&mut self, id: RawContactId) -> Result<Option<RawContact>, Self::Error> {
      Ok(self.raw_contacts.get(&id.0).cloned())
    }

    fn data_rows(&mut self, raw_contact_id: RawContactId) -> Result<Vec<DataRow>, Self::Error> {
      Ok(self.data_rows.get(&raw_contact_id.0).cloned().unwrap_or_default())
    }

    fn exceptions_for(
      &mut self,
      raw_contact_id: RawContactId,
    ) -> Result<Vec<AggregationException>, Self::Error> {
      Ok(
        self
          .exceptions
          .iter()
          .filter(|e| e.peer_of(raw_contact_id).is_some())
          .copied()
          .collect(),
      )
    }

    fn name_lookup_matches(&mut self, keys: &[String]) -> Result<Vec<NameLookupEntry>, Self::Error> {
      Ok(
        self
          .name_lookup
          .iter()
          .filter(|e| keys.contains(&e.normalized_name))
          .filter(|e| {
            self
              .raw_contacts
              .get(&e.raw_contact_id.0)
              .is_some_and(|rc| rc.aggregate_id.is_some())
          })
          .cloned()
          .collect(),
      )
    }

    fn phone_lookup(&mut self, normalized_phone: &str) -> Result<Vec<RawContactId>, Self::Error> {
      let mut out = Vec::new();
      for (rc_id, rows) in &self.data_rows {
        let aggregated = self.raw_contacts.get(rc_id).is_some_and(|rc| rc.aggregate_id.is_some());
        if !aggregated {
          continue;
        }
        if rows.iter().any(|r| matches!(&r.value, DataRowValue::Phone { number } if number == normalized_phone)) {
          out.push(RawContactId(*rc_id));
        }
      }
      Ok(out)
    }

    fn email_lookup(&mut self, normalized_email: &str) -> Result<Vec<RawContactId>, Self::Error> {
      let mut out = Vec::new();
      for (rc_id, rows) in &self.data_rows {
        let aggregated = self.raw_contacts.get(rc_id).is_some_and(|rc| rc.aggregate_id.is_some());
        if !aggregated {
          continue;
        }
        if rows.iter().any(|r| matches!(&r.value, DataRowValue::Email { address } if address.eq_ignore_ascii_case(normalized_email))) {
          out.push(RawContactId(*rc_id));
        }
      }
      Ok(out)
    }

    fn nickname_lookup(&mut self, normalized_nick: &str) -> Result<Vec<RawContactId>, Self::Error> {
      Ok(
        self
          .name_lookup
          .iter()
          .filter(|e| e.name_type == NameLookupType::Nickname && e.normalized_name == normalized_nick)
          .filter(|e| {
            self
              .raw_contacts
              .get(&e.raw_contact_id.0)
              .is_some_and(|rc| rc.aggregate_id.is_some())
          })
          .map(|e| e.raw_contact_id)
          .collect(),
      )
    }

    fn members(&mut self, aggregate_id: AggregateId) -> Result<Vec<RawContact>, Self::Error> {
      let mut out: Vec<RawContact> = self
        .raw_contacts
        .values()
        .filter(|rc| rc.aggregate_id == Some(aggregate_id))
        .cloned()
        .collect();
      out.sort_by_key(|rc| rc.id.0);
      Ok(out)
    }

    fn pending_raw_contact_ids(&mut self) -> Result<Vec<RawContactId>, Self::Error> {
      Ok(
        self
          .raw_contacts
          .values()
          .filter(|rc| rc.aggregate_id.is_none() && rc.aggregation_mode == AggregationMode::Default)
          .map(|rc| rc.id)
          .collect(),
      )
    }

    fn aggregate(&mut self, id: AggregateId) -> Result<Option<Aggregate>, Self::Error> {
      Ok(self.aggregates.get(&id.0).cloned())
    }

    fn create_aggregate(&mut self) -> Result<AggregateId, Self::Error> {
      self.next_aggregate_id += 1;
      let id = AggregateId(self.next_aggregate_id);
      self.aggregates.insert(id.0, Aggregate::empty(id));
      Ok(id)
    }

    fn set_aggregate_id(
      &mut self,
      raw_contact_id: RawContactId,
      aggregate_id: AggregateId,
    ) -> Result<(), Self::Error> {
      if let Some(rc) = self.raw_contacts.get_mut(&raw_contact_id.0) {
        rc.aggregate_id = Some(aggregate_id);
      }
      Ok(())
    }

    fn clear_aggregate_id(
      &mut self,
      raw_contact_id: RawContactId,
    ) -> Result<Option<AggregateId>, Self::Error> {
      Ok(self.raw_contacts.get_mut(&raw_contact_id.0).and_then(|rc| rc.aggregate_id.take()))
    }

    fn clear_name_lookup(&mut self, raw_contact_id: RawContactId) -> Result<(), Self::Error> {
      self.name_lookup.retain(|e| e.raw_contact_id != raw_contact_id);
      Ok(())
    }

    fn replace_name_lookup(
      &mut self,
      raw_contact_id: RawContactId,
      entries: &[(String, NameLookupType)],
    ) -> Result<(), Self::Error> {
      self.name_lookup.retain(|e| e.raw_contact_id != raw_contact_id);
      for (normalized_name, name_type) in entries {
        self.name_lookup.push(NameLookupEntry {
          raw_contact_id,
          normalized_name: normalized_name.clone(),
          name_type: *name_type,
        });
      }
      Ok(())
    }

    fn save_aggregate(&mut self, aggregate: &Aggregate) -> Result<(), Self::Error> {
      self.aggregates.insert(aggregate.id.0, aggregate.clone());
      Ok(())
    }

    fn delete_aggregate_if_orphaned(&mut self, aggregate_id: AggregateId) -> Result<bool, Self::Error> {
      let has_members = self.raw_contacts.values().any(|rc| rc.aggregate_id == Some(aggregate_id));
      if !has_members {
        self.aggregates.remove(&aggregate_id.0);
        return Ok(true);
      }
      Ok(false)
    }

    fn data_row(&mut self, id: DataRowId) -> Result<Option<DataRow>, Self::Error> {
      Ok(self.data_rows.values().flatten().find(|r| r.id == id).cloned())
    }
  }

  fn aggregator() -> Aggregator {
    Aggregator::default()
  }

  /// S1 — two raw contacts with exactly the same name join the same
  /// aggregate on an exact `FULL_NAME` match.
  #[test]
  fn exact_full_name_match_joins_one_aggregate() {
    let mut txn = MemTxn::default();
    txn.add_raw_contact(1, "John Doe", "a");
    txn.add_raw_contact(2, "John Doe", "b");
    txn.add_name_row(1, "John", "Doe");
    txn.add_name_row(2, "John", "Doe");

    let mut agg = aggregator();
    let a1 = agg.aggregate_contact(&mut txn, RawContactId(1)).unwrap();
    let a2 = agg.aggregate_contact(&mut txn, RawContactId(2)).unwrap();
    assert_eq!(a1, a2);
  }

  /// S2 — a nickname-substituted name ("Bob" for "Robert") still joins.
  #[test]
  fn nickname_variant_joins_the_same_aggregate() {
    let mut txn = MemTxn::default();
    txn.add_raw_contact(1, "Robert Miller", "a");
    txn.add_raw_contact(2, "Bob Miller", "b");
    txn.add_name_row(1, "Robert", "Miller");
    txn.add_name_row(2, "Bob", "Miller");

    let mut agg = aggregator();
    let a1 = agg.aggregate_contact(&mut txn, RawContactId(1)).unwrap();
    let a2 = agg.aggregate_contact(&mut txn, RawContactId(2)).unwrap();
    assert_eq!(a1, a2);
  }

  /// Distinct names with nothing else in common each start their own
  /// aggregate.
  #[test]
  fn unrelated_names_do_not_join() {
    let mut txn = MemTxn::default();
    txn.add_raw_contact(1, "John Doe", "a");
    txn.add_raw_contact(2, "Alice Smith", "b");
    txn.add_name_row(1, "John", "Doe");
    txn.add_name_row(2, "Alice", "Smith");

    let mut agg = aggregator();
    let a1 = agg.aggregate_contact(&mut txn, RawContactId(1)).unwrap();
    let a2 = agg.aggregate_contact(&mut txn, RawContactId(2)).unwrap();
    assert_ne!(a1, a2);
  }

  /// S3 — a shared phone number plus a secondary (sub-threshold but
  /// approximately similar) name joins via the secondary pass.
  #[test]
  fn shared_phone_with_similar_name_joins_via_secondary_match() {
    let mut txn = MemTxn::default();
    txn.add_raw_contact(1, "Jon Doe", "a");
    txn.add_raw_contact(2, "John Doe", "b");
    txn.add_name_row(1, "Jon", "Doe");
    txn.add_name_row(2, "John", "Doe");
    txn.add_phone_row(1, "+14155551111");
    txn.add_phone_row(2, "+14155551111");

    let mut agg = aggregator();
    let a1 = agg.aggregate_contact(&mut txn, RawContactId(1)).unwrap();
    let a2 = agg.aggregate_contact(&mut txn, RawContactId(2)).unwrap();
    assert_eq!(a1, a2);
  }

  /// A `KEEP_OUT` exception prevents an otherwise-exact name match.
  #[test]
  fn keep_out_exception_prevents_join() {
    let mut txn = MemTxn::default();
    txn.add_raw_contact(1, "John Doe", "a");
    txn.add_raw_contact(2, "John Doe", "b");
    txn.add_name_row(1, "John", "Doe");
    txn.add_name_row(2, "John", "Doe");

    let mut agg = aggregator();
    let a1 = agg.aggregate_contact(&mut txn, RawContactId(1)).unwrap();

    txn.exceptions.push(AggregationException {
      raw_contact_id_1: RawContactId(1),
      raw_contact_id_2: RawContactId(2),
      exception_type: ExceptionType::KeepOut,
    });
    let a2 = agg.aggregate_contact(&mut txn, RawContactId(2)).unwrap();
    assert_ne!(a1, a2);
  }

  /// A `KEEP_IN` exception forces a join the name alone would never make.
  #[test]
  fn keep_in_exception_forces_join() {
    let mut txn = MemTxn::default();
    txn.add_raw_contact(1, "John Doe", "a");
    txn.add_raw_contact(2, "Completely Different", "b");
    txn.add_name_row(1, "John", "Doe");
    txn.add_name_row(2, "Completely", "Different");

    let mut agg = aggregator();
    let a1 = agg.aggregate_contact(&mut txn, RawContactId(1)).unwrap();

    txn.exceptions.push(AggregationException {
      raw_contact_id_1: RawContactId(1),
      raw_contact_id_2: RawContactId(2),
      exception_type: ExceptionType::KeepIn,
    });
    let a2 = agg.aggregate_contact(&mut txn, RawContactId(2)).unwrap();
    assert_eq!(a1, a2);
  }

  /// Display name picks the more complex (mixed-case, longer) candidate.
  #[test]
  fn display_name_prefers_mixed_case_member() {
    let mut txn = MemTxn::default();
    txn.add_raw_contact(1, "john doe", "a");
    txn.add_raw_contact(2, "John Doe", "b");
    txn.add_name_row(1, "John", "Doe");
    txn.add_name_row(2, "John", "Doe");

    let mut agg = aggregator();
    let a1 = agg.aggregate_contact(&mut txn, RawContactId(1)).unwrap();
    agg.aggregate_contact(&mut txn, RawContactId(2)).unwrap();

    let aggregate = txn.aggregate(a1).unwrap().unwrap();
    assert_eq!(aggregate.display_name.as_deref(), Some("John Doe"));
  }

  /// A restricted member's primary phone never fills the fallback slot,
  /// even though it still fills the optimal slot.
  #[test]
  fn restricted_primary_phone_skips_fallback_slot() {
    let mut txn = MemTxn::default();
    txn.add_raw_contact(1, "John Doe", "a");
    if let Some(rc) = txn.raw_contacts.get_mut(&1) {
      rc.is_restricted = true;
    }
    txn.add_name_row(1, "John", "Doe");
    txn.add_phone_row(1, "+14155551111");

    let mut agg = aggregator();
    let a1 = agg.aggregate_contact(&mut txn, RawContactId(1)).unwrap();

    let aggregate = txn.aggregate(a1).unwrap().unwrap();
    assert!(aggregate.optimal_primary_phone_id.is_some());
    assert!(aggregate.fallback_primary_phone_id.is_none());
    assert!(aggregate.optimal_primary_phone_restricted);
  }

  /// Re-running aggregation with no data changes is a no-op (invariant from
  /// the testable-properties list): the aggregate id doesn't change and the
  /// derived fields stay the same.
  #[test]
  fn rerunning_aggregation_is_idempotent() {
    let mut txn = MemTxn::default();
    txn.add_raw_contact(1, "John Doe", "a");
    txn.add_name_row(1, "John", "Doe");

    let mut agg = aggregator();
    let a1 = agg.aggregate_contact(&mut txn, RawContactId(1)).unwrap();
    let a1_again = agg.aggregate_contact(&mut txn, RawContactId(1)).unwrap();
    assert_eq!(a1, a1_again);
  }

  /// `query_aggregation_suggestions` surfaces a similar-but-not-joined
  /// aggregate without merging anything.
  #[test]
  fn suggestions_surface_similar_aggregates_without_joining() {
    let mut txn = MemTxn::default();
    txn.add_raw_contact(1, "John Doe", "a");
    txn.add_raw_contact(2, "Jon Doe", "b");
    txn.add_name_row(1, "John", "Doe");
    txn.add_name_row(2, "Jon", "Doe");

    let mut agg = aggregator();
    let a1 = agg.aggregate_contact(&mut txn, RawContactId(1)).unwrap();
    let a2 = agg.aggregate_contact(&mut txn, RawContactId(2)).unwrap();
    assert_ne!(a1, a2);

    let suggestions = agg.suggestions(&mut txn, a1, 5).unwrap();
    assert!(suggestions.contains(&a2));
    // Unchanged by the query.
    assert_eq!(txn.raw_contact(RawContactId(1)).unwrap().unwrap().aggregate_id, Some(a1));
  }

  /// S3 — a shared phone number with a genuinely different name is not
  /// enough to join: the secondary pass requires the phone/email hit *and*
  /// an approximate name match, and "Deborah"/"John" isn't one.
  #[test]
  fn shared_phone_with_unrelated_name_does_not_join() {
    let mut txn = MemTxn::default();
    txn.add_raw_contact(1, "John Doe", "a");
    txn.add_raw_contact(2, "Deborah Doe", "b");
    txn.add_name_row(1, "John", "Doe");
    txn.add_name_row(2, "Deborah", "Doe");
    txn.add_phone_row(1, "+14155551111");
    txn.add_phone_row(2, "+14155551111");

    let mut agg = aggregator();
    let a1 = agg.aggregate_contact(&mut txn, RawContactId(1)).unwrap();
    let a2 = agg.aggregate_contact(&mut txn, RawContactId(2)).unwrap();
    assert_ne!(a1, a2);
  }

  /// S7 — an email address whose local part equals another raw contact's
  /// full name joins via the `EMAIL_BASED_NICKNAME` candidate.
  #[test]
  fn email_local_part_joins_matching_structured_name() {
    let mut txn = MemTxn::default();
    txn.add_raw_contact(1, "John Doe", "a");
    txn.add_name_row(1, "John", "Doe");

    txn.add_raw_contact(2, "johndoe@example.com", "b");
    txn.add_email_row(2, "johndoe@example.com");

    let mut agg = aggregator();
    let a1 = agg.aggregate_contact(&mut txn, RawContactId(1)).unwrap();
    let a2 = agg.aggregate_contact(&mut txn, RawContactId(2)).unwrap();
    assert_eq!(a1, a2);
  }

  /// `EMAIL_BASED_NICKNAME` candidates are never written back to the
  /// persisted index (§9): re-running aggregation on the email-only raw
  /// contact must still work, since the candidate is recomputed fresh each
  /// time rather than read back from storage.
  #[test]
  fn email_based_nickname_is_not_persisted_to_name_lookup() {
    let mut txn = MemTxn::default();
    txn.add_raw_contact(1, "johndoe@example.com", "a");
    txn.add_email_row(1, "johndoe@example.com");

    let mut agg = aggregator();
    agg.aggregate_contact(&mut txn, RawContactId(1)).unwrap();

    assert!(!txn
      .name_lookup
      .iter()
      .any(|e| e.name_type == NameLookupType::EmailBasedNickname));
  }

  /// Derived-field test: `times_contacted` rolls up by `max`, not `sum`
  /// (§4.5, §9 — a documented source quirk this crate preserves as-is).
  #[test]
  fn times_contacted_rolls_up_by_max_not_sum() {
    let mut txn = MemTxn::default();
    txn.add_raw_contact(1, "John Doe", "a");
    txn.add_raw_contact(2, "John Doe", "b");
    txn.add_name_row(1, "John", "Doe");
    txn.add_name_row(2, "John", "Doe");
    txn.raw_contacts.get_mut(&1).unwrap().times_contacted = 2;
    txn.raw_contacts.get_mut(&2).unwrap().times_contacted = 5;

    let mut agg = aggregator();
    let a1 = agg.aggregate_contact(&mut txn, RawContactId(1)).unwrap();
    agg.aggregate_contact(&mut txn, RawContactId(2)).unwrap();

    assert_eq!(txn.aggregate(a1).unwrap().unwrap().times_contacted, 5);
  }

  /// Derived-field test: `send_to_voicemail` is true only if every member
  /// with a non-null value is true; `starred` is a logical OR.
  #[test]
  fn send_to_voicemail_is_all_and_starred_is_any() {
    let mut txn = MemTxn::default();
    txn.add_raw_contact(1, "John Doe", "a");
    txn.add_raw_contact(2, "John Doe", "b");
    txn.add_name_row(1, "John", "Doe");
    txn.add_name_row(2, "John", "Doe");
    txn.raw_contacts.get_mut(&1).unwrap().send_to_voicemail = Some(true);
    txn.raw_contacts.get_mut(&2).unwrap().send_to_voicemail = None;
    txn.raw_contacts.get_mut(&1).unwrap().starred = false;
    txn.raw_contacts.get_mut(&2).unwrap().starred = true;

    let mut agg = aggregator();
    let a1 = agg.aggregate_contact(&mut txn, RawContactId(1)).unwrap();
    agg.aggregate_contact(&mut txn, RawContactId(2)).unwrap();

    let aggregate = txn.aggregate(a1).unwrap().unwrap();
    assert_eq!(aggregate.send_to_voicemail, Some(true));
    assert!(aggregate.starred);
  }

  /// Invariant 7: a non-null `optimal_primary_phone_id` always references a
  /// phone data row belonging to a current member of the aggregate.
  #[test]
  fn optimal_primary_phone_references_a_member_data_row() {
    let mut txn = MemTxn::default();
    txn.add_raw_contact(1, "John Doe", "a");
    txn.add_name_row(1, "John", "Doe");
    txn.add_phone_row(1, "+14155551111");

    let mut agg = aggregator();
    let a1 = agg.aggregate_contact(&mut txn, RawContactId(1)).unwrap();

    let aggregate = txn.aggregate(a1).unwrap().unwrap();
    let phone_id = aggregate.optimal_primary_phone_id.unwrap();
    let row = txn.data_row(phone_id).unwrap().unwrap();
    assert_eq!(row.raw_contact_id, RawContactId(1));
    assert!(matches!(row.value, DataRowValue::Phone { .. }));
  }
}
