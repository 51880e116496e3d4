//! Name normalisation, the nickname cluster table, and the complexity
//! comparator used to pick an aggregate's display name.
//!
//! Everything here is a pure function over `&str` — no store access, no
//! allocation beyond the returned `String`s.

use std::cmp::Ordering;
use std::collections::HashMap;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Case-fold, strip diacritics/punctuation/whitespace, and return the
/// canonical lookup key used everywhere a name is compared for equality.
///
/// `"O'Brien"` and `"Jean-Luc"` and `"Jéan Luc"` all collapse to keys that
/// compare equal to their plain-ASCII counterparts once accents are gone.
pub fn normalize(s: &str) -> String {
  s.nfd()
    .filter(|c| !is_combining_mark(*c))
    .flat_map(|c| c.to_lowercase())
    .filter(|c| c.is_alphanumeric())
    .collect()
}

/// Rank two display-name candidates for aggregate display-name selection
/// (§4.1, §4.5): mixed case beats mono-case, longer beats shorter.
///
/// Returns `Ordering::Greater` if `a` is the more "complex" (i.e. preferred)
/// name.
pub fn compare_complexity(a: &str, b: &str) -> Ordering {
  complexity_score(a).cmp(&complexity_score(b))
}

fn complexity_score(s: &str) -> (bool, usize) {
  let has_mixed_case = s.chars().any(|c| c.is_uppercase())
    && s.chars().any(|c| c.is_lowercase());
  (has_mixed_case, s.chars().count())
}

// ─── Nickname cluster table ──────────────────────────────────────────────────

/// Injectable collaborator mapping a canonical given name to the common
/// nicknames clustered with it (e.g. `"robert"` → `["bob", "rob", "bobby"]`).
///
/// Consulted when expanding `FULL_NAME_WITH_NICKNAME` candidates (§4.2) and
/// when matching a bare `NICKNAME` data row. Tests substitute a synthetic
/// table; production code uses [`StaticNicknameTable`].
pub trait NicknameLookup: Send + Sync {
  /// Nicknames clustered with `canonical_given_name` (already normalised).
  /// Returns an empty slice if the name has no known cluster.
  fn nicknames_for(&self, canonical_given_name: &str) -> &[String];
}

/// A small built-in nickname cluster table covering common English given
/// names. Not exhaustive — a production system would load this from a data
/// file, but the spec treats the table itself as out of scope and asks only
/// that it be swappable for testing.
pub struct StaticNicknameTable {
  clusters: HashMap<&'static str, Vec<String>>,
  empty:    Vec<String>,
}

impl StaticNicknameTable {
  pub fn new() -> Self {
    let raw: &[(&str, &[&str])] = &[
      ("robert", &["bob", "rob", "bobby", "robbie"]),
      ("william", &["bill", "will", "billy", "willie"]),
      ("richard", &["rick", "dick", "richie", "ricky"]),
      ("james", &["jim", "jimmy", "jamie"]),
      ("john", &["jon", "johnny", "jack"]),
      ("elizabeth", &["liz", "beth", "eliza", "betty", "lisa"]),
      ("margaret", &["maggie", "meg", "peggy", "peg"]),
      ("katherine", &["kate", "katie", "kathy", "kat"]),
      ("michael", &["mike", "mikey", "mick"]),
      ("christopher", &["chris", "topher"]),
      ("alexander", &["alex", "xander", "sasha"]),
      ("deborah", &["deb", "debbie"]),
      ("joseph", &["joe", "joey"]),
      ("patricia", &["pat", "patty", "tricia"]),
      ("thomas", &["tom", "tommy"]),
      ("daniel", &["dan", "danny"]),
      ("samuel", &["sam", "sammy"]),
      ("benjamin", &["ben", "benny"]),
      ("edward", &["ed", "eddie", "ted", "teddy"]),
      ("susan", &["sue", "susie"]),
    ];

    let mut clusters = HashMap::new();
    for (canonical, nicknames) in raw {
      clusters.insert(*canonical, nicknames.iter().map(|s| s.to_string()).collect());
    }
    Self { clusters, empty: Vec::new() }
  }
}

impl Default for StaticNicknameTable {
  fn default() -> Self { Self::new() }
}

impl NicknameLookup for StaticNicknameTable {
  fn nicknames_for(&self, canonical_given_name: &str) -> &[String] {
    self.clusters.get(canonical_given_name).unwrap_or(&self.empty)
  }
}
