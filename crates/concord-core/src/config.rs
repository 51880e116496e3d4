//! Tunable constants for the aggregation engine.
//!
//! The teacher's server crate (`kith-carddav`) assembles its configuration
//! from layered TOML/env sources via the `config` crate, because it is a
//! long-running service with files on disk to merge. This crate has no such
//! outer application — IPC/CLI is explicitly out of scope (spec.md §1, §6)
//! — so there is nothing for `config` to layer. The ambient concern is
//! still carried in miniature: a plain, `serde`-deserialisable struct with
//! the spec's literal defaults, so a host that does have a config file can
//! deserialize straight into it without this crate knowing about TOML.

use serde::{Deserialize, Serialize};

use crate::matcher::{SCORE_THRESHOLD_PRIMARY, SCORE_THRESHOLD_SECONDARY, SCORE_THRESHOLD_SUGGEST};

/// Debounce delay for [`crate::scheduler::Scheduler::schedule`] (§4.7, §4.8).
pub const AGGREGATION_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
  pub aggregation_delay_ms:      u64,
  pub score_threshold_primary:   i32,
  pub score_threshold_secondary: i32,
  pub score_threshold_suggest:   i32,
}

impl Default for AggregationConfig {
  fn default() -> Self {
    Self {
      aggregation_delay_ms:      AGGREGATION_DELAY_MS,
      score_threshold_primary:   SCORE_THRESHOLD_PRIMARY,
      score_threshold_secondary: SCORE_THRESHOLD_SECONDARY,
      score_threshold_suggest:   SCORE_THRESHOLD_SUGGEST,
    }
  }
}
