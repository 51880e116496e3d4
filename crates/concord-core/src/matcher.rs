//! `ContactMatcher` — the per-pass scoreboard.
//!
//! A flat `aggregate_id → score` map, rebuilt fresh for every raw contact
//! (§9 "scoreboard as a flat map" — no inheritance, no listener pattern).
//! Not shared across raw contacts within a pass except by being `clear()`ed
//! and reused, matching the candidate-list reuse strategy in §9.

use std::collections::HashMap;

use crate::{ids::AggregateId, name_lookup::NameLookupType};

// ─── Thresholds ───────────────────────────────────────────────────────────────

/// Accept a match on name alone at or above this score.
pub const SCORE_THRESHOLD_PRIMARY: i32 = 28;
/// Accept a match only in combination with a phone/email hit at or above
/// this (lower) score. Set well above the score a merely-shared-surname
/// pair scores on its own (e.g. "John Doe"/"Deborah Doe" ~18) so a shared
/// last name plus a coincidental shared phone never joins two different
/// people (spec.md §8 S3) — while staying comfortably below a genuine
/// one-character near-miss like "Jon Doe"/"John Doe" (~35).
pub const SCORE_THRESHOLD_SECONDARY: i32 = 20;
/// Used exclusively by the UI suggestion query — lower still, since a human
/// reviews the result.
pub const SCORE_THRESHOLD_SUGGEST: i32 = 8;

const SCORE_EXACT: i32 = 40;
const SCORE_VARIANT: i32 = 35;
const SCORE_SINGLE_TOKEN: i32 = 5;

// ─── Scoring table ───────────────────────────────────────────────────────────

/// Score a `(candidate_type, target_type)` pairing, before any
/// approximate-match attenuation. Symmetric: `base_score(a, b) ==
/// base_score(b, a)`.
///
/// Exact full-name pairings (`FULL_NAME` vs itself or its nickname-
/// substituted counterpart, same for the reversed forms, same for bare
/// `NICKNAME` rows) score highest. The concatenated and nickname-derived
/// variants sit in the middle. Same-tag single-field matches (`GIVEN` vs
/// `GIVEN`, `FAMILY` vs `FAMILY`) score lowest — a shared first name alone is
/// weak evidence. Anything else scores zero: the pair isn't considered
/// comparable at all.
pub fn base_score(t1: NameLookupType, t2: NameLookupType) -> i32 {
  use NameLookupType::*;

  // Canonicalise so the match arms below only need to list each pairing
  // once, with the lower-discriminant type first.
  let (a, b) = if (t1 as u8) <= (t2 as u8) { (t1, t2) } else { (t2, t1) };

  match (a, b) {
    (FullName, FullName)
    | (FullName, FullNameWithNickname)
    | (FullNameWithNickname, FullNameWithNickname)
    | (FullNameReverse, FullNameReverse)
    | (FullNameReverse, FullNameWithNicknameReverse)
    | (FullNameWithNicknameReverse, FullNameWithNicknameReverse)
    | (Nickname, Nickname) => SCORE_EXACT,

    (FullNameConcatenated, FullNameConcatenated)
    | (FullNameConcatenated, FullNameWithNickname)
    | (FullNameConcatenated, EmailBasedNickname)
    | (FullNameWithNickname, EmailBasedNickname)
    | (FullNameReverseConcatenated, FullNameReverseConcatenated)
    | (FullNameReverseConcatenated, FullNameWithNicknameReverse)
    | (GivenNameOnlyAsNickname, GivenNameOnlyAsNickname)
    | (FamilyNameOnlyAsNickname, FamilyNameOnlyAsNickname) => SCORE_VARIANT,

    (GivenNameOnly, GivenNameOnly) | (FamilyNameOnly, FamilyNameOnly) => SCORE_SINGLE_TOKEN,

    _ => 0,
  }
}

// ─── Scoreboard ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
struct MatchScore {
  name_score:   i32,
  phone_hit:    bool,
  email_hit:    bool,
  nickname_hit: bool,
  kept_out:     bool,
}

/// Per-aggregation scoreboard. Reused across raw contacts within a pass —
/// call [`ContactMatcher::clear`] between them rather than reallocating.
#[derive(Debug, Default)]
pub struct ContactMatcher {
  scores: HashMap<AggregateId, MatchScore>,
}

impl ContactMatcher {
  pub fn new() -> Self { Self::default() }

  pub fn clear(&mut self) { self.scores.clear() }

  /// Mark `aggregate_id` ineligible. All further score updates against it
  /// are ignored; the final pickers skip it outright.
  pub fn keep_out(&mut self, aggregate_id: AggregateId) {
    self.scores.entry(aggregate_id).or_default().kept_out = true;
  }

  fn is_kept_out(&self, aggregate_id: AggregateId) -> bool {
    self.scores.get(&aggregate_id).is_some_and(|s| s.kept_out)
  }

  /// Score a candidate/target name pairing for `aggregate_id` and fold it
  /// into that aggregate's running name score by `max`. If `approximate`,
  /// the base score is attenuated by normalised edit distance between the
  /// two literal strings (Open Question #3 in the design doc).
  pub fn match_name(
    &mut self,
    aggregate_id:  AggregateId,
    candidate_type: NameLookupType,
    candidate_name: &str,
    target_type:    NameLookupType,
    target_name:    &str,
    approximate:    bool,
  ) {
    if self.is_kept_out(aggregate_id) {
      return;
    }

    let base = base_score(candidate_type, target_type);
    if base == 0 {
      return;
    }

    let score = if approximate {
      let similarity = strsim::normalized_levenshtein(candidate_name, target_name);
      ((base as f64) * similarity).floor() as i32
    } else {
      base
    };

    let entry = self.scores.entry(aggregate_id).or_default();
    entry.name_score = entry.name_score.max(score);
  }

  pub fn update_score_with_phone_match(&mut self, aggregate_id: AggregateId) {
    if !self.is_kept_out(aggregate_id) {
      self.scores.entry(aggregate_id).or_default().phone_hit = true;
    }
  }

  pub fn update_score_with_email_match(&mut self, aggregate_id: AggregateId) {
    if !self.is_kept_out(aggregate_id) {
      self.scores.entry(aggregate_id).or_default().email_hit = true;
    }
  }

  pub fn update_score_with_nickname_match(&mut self, aggregate_id: AggregateId) {
    if !self.is_kept_out(aggregate_id) {
      self.scores.entry(aggregate_id).or_default().nickname_hit = true;
    }
  }

  /// Aggregates whose name score falls below `threshold` (typically
  /// `SCORE_THRESHOLD_PRIMARY`) but which have a phone or email hit — the
  /// candidate set for the secondary-data pass.
  pub fn prepare_secondary_match_candidates(&self, threshold: i32) -> Vec<AggregateId> {
    self
      .scores
      .iter()
      .filter(|(_, s)| !s.kept_out && s.name_score < threshold && (s.phone_hit || s.email_hit))
      .map(|(id, _)| *id)
      .collect()
  }

  /// The single aggregate whose name score is `>= threshold` and maximal;
  /// ties broken by smallest aggregate id. `None` if nothing qualifies.
  pub fn pick_best_match(&self, threshold: i32) -> Option<AggregateId> {
    let mut best: Option<(AggregateId, i32)> = None;
    for (&id, s) in &self.scores {
      if s.kept_out || s.name_score < threshold {
        continue;
      }
      best = Some(match best {
        None => (id, s.name_score),
        Some((best_id, best_score)) => {
          if s.name_score > best_score || (s.name_score == best_score && id.0 < best_id.0) {
            (id, s.name_score)
          } else {
            (best_id, best_score)
          }
        }
      });
    }
    best.map(|(id, _)| id)
  }

  /// Up to `k` aggregates at or above `threshold`, ordered by descending
  /// score then ascending id — for the UI suggestion query.
  pub fn pick_best_matches(&self, k: usize, threshold: i32) -> Vec<AggregateId> {
    let mut candidates: Vec<(AggregateId, i32)> = self
      .scores
      .iter()
      .filter(|(_, s)| !s.kept_out && s.name_score >= threshold)
      .map(|(&id, s)| (id, s.name_score))
      .collect();

    candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0 .0.cmp(&b.0 .0)));
    candidates.into_iter().take(k).map(|(id, _)| id).collect()
  }
}
