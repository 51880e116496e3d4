//! `Engine` — the external interface of §6, wiring a `Store` and an
//! `Aggregator` together behind the one-deep advisory lock of §5.
//!
//! A single `std::sync::Mutex` around the `Aggregator` *is* that lock:
//! every entry point below acquires it for the duration of one raw
//! contact's worth of work and releases it immediately after, so a
//! synchronous single-contact call and the background pass never run the
//! algorithm concurrently, but also never block each other for longer than
//! one raw contact.

use std::sync::{atomic::AtomicBool, atomic::Ordering, Mutex};

use crate::{
  aggregator::Aggregator,
  error::{store_err, Error},
  external::{EmailTokenizer, PhoneNormalizer},
  ids::{AggregateId, RawContactId},
  model::AggregationMode,
  name::NicknameLookup,
  store::{Store, Txn},
};

pub struct Engine<S, N, P, E>
where
  S: Store,
  N: NicknameLookup,
  P: PhoneNormalizer,
  E: EmailTokenizer,
{
  store:      S,
  aggregator: Mutex<Aggregator<N, P, E>>,
}

impl<S, N, P, E> Engine<S, N, P, E>
where
  S: Store,
  N: NicknameLookup,
  P: PhoneNormalizer,
  E: EmailTokenizer,
{
  pub fn new(store: S, aggregator: Aggregator<N, P, E>) -> Self {
    Self { store, aggregator: Mutex::new(aggregator) }
  }

  pub fn store(&self) -> &S { &self.store }

  /// §6 `aggregate_contact(raw_id)` — opens its own transaction.
  pub fn aggregate_contact(&self, raw_contact_id: RawContactId) -> Result<AggregateId, Error> {
    let mut txn = self.store.begin().map_err(store_err)?;
    let result = self.aggregate_contact_in(&mut txn, raw_contact_id);
    if result.is_ok() {
      txn.set_successful();
    }
    txn.end().map_err(store_err)?;
    result
  }

  /// §6 `aggregate_contact(txn, raw_id)` — joins an already-open
  /// transaction, e.g. for `AggregationMode::Immediate` contacts
  /// aggregated inline with ingest rather than waiting for a pass.
  pub fn aggregate_contact_in(
    &self,
    txn: &mut S::Txn,
    raw_contact_id: RawContactId,
  ) -> Result<AggregateId, Error> {
    let mut guard = self.aggregator.lock().unwrap_or_else(|poison| poison.into_inner());
    guard.aggregate_contact(txn, raw_contact_id)
  }

  /// §6 `mark_contact_for_aggregation` — detaches a raw contact from its
  /// aggregate and clears its name-lookup index so the next pass (or an
  /// immediate call) starts over from scratch. A no-op on a `Disabled`
  /// contact.
  pub fn mark_contact_for_aggregation(
    &self,
    raw_contact_id: RawContactId,
  ) -> Result<AggregationMode, Error> {
    let mut txn = self.store.begin().map_err(store_err)?;

    let Some(raw_contact) = txn.raw_contact(raw_contact_id).map_err(store_err)? else {
      return Err(Error::RawContactNotFound(raw_contact_id));
    };

    if raw_contact.aggregation_mode == AggregationMode::Disabled {
      txn.set_successful();
      txn.end().map_err(store_err)?;
      return Ok(AggregationMode::Disabled);
    }

    let previous_aggregate = txn.clear_aggregate_id(raw_contact_id).map_err(store_err)?;
    txn.clear_name_lookup(raw_contact_id).map_err(store_err)?;
    if let Some(aggregate_id) = previous_aggregate {
      txn.delete_aggregate_if_orphaned(aggregate_id).map_err(store_err)?;
    }

    txn.set_successful();
    txn.end().map_err(store_err)?;
    Ok(raw_contact.aggregation_mode)
  }

  /// §6 `update_aggregate_data` — recompute derived fields with no
  /// membership change, e.g. after a raw contact's data row is edited in
  /// place.
  pub fn update_aggregate_data(&self, aggregate_id: AggregateId) -> Result<(), Error> {
    let mut txn = self.store.begin().map_err(store_err)?;
    {
      let mut guard = self.aggregator.lock().unwrap_or_else(|poison| poison.into_inner());
      guard.recompute_aggregate(&mut txn, aggregate_id)?;
    }
    txn.set_successful();
    txn.end().map_err(store_err)?;
    Ok(())
  }

  /// §6 `query_aggregation_suggestions` — §4.9's ranked, human-reviewed
  /// merge candidates. Read-only: never joins anything.
  pub fn query_aggregation_suggestions(
    &self,
    aggregate_id: AggregateId,
    max: usize,
  ) -> Result<Vec<AggregateId>, Error> {
    let mut txn = self.store.begin().map_err(store_err)?;
    let ranked = {
      let mut guard = self.aggregator.lock().unwrap_or_else(|poison| poison.into_inner());
      guard.suggestions(&mut txn, aggregate_id, max)?
    };
    txn.set_successful();
    txn.end().map_err(store_err)?;
    Ok(ranked)
  }

  /// §4.7 — one full background pass over every pending raw contact,
  /// cooperatively cancellable via `cancel`. Returns `(processed, total)`;
  /// the scheduler logs completion or interruption from these.
  ///
  /// Opens one transaction for the whole pass rather than the source
  /// design's separate read-cursor-then-write-transaction — behaviourally
  /// equivalent through this crate's `Store` abstraction, and
  /// `yield_if_contended` still gives readers their cooperative opening
  /// (see DESIGN.md).
  pub fn run_pass(&self, cancel: &AtomicBool) -> Result<(usize, usize), Error> {
    let mut txn = self.store.begin().map_err(store_err)?;
    let pending = txn.pending_raw_contact_ids().map_err(store_err)?;
    let total = pending.len();
    let mut processed = 0;

    for raw_contact_id in pending {
      if cancel.load(Ordering::SeqCst) {
        break;
      }

      let outcome = {
        let mut guard = self.aggregator.lock().unwrap_or_else(|poison| poison.into_inner());
        guard.aggregate_contact(&mut txn, raw_contact_id)
      };

      match outcome {
        Ok(_) => {}
        Err(Error::RawContactNotFound(_)) | Err(Error::Integrity(..)) => {
          tracing::warn!(raw_contact_id = raw_contact_id.0, "skipping raw contact: integrity violation");
        }
        Err(other) => {
          // Leave the worker's cancel flag set on the way out so the
          // scheduler's loop exits cleanly instead of waiting on a
          // notification that already happened (§7: abort, leave cancel
          // set, scheduler retries on the next `schedule()`).
          cancel.store(true, Ordering::SeqCst);
          return Err(other);
        }
      }

      processed += 1;
      txn.yield_if_contended();
    }

    txn.set_successful();
    txn.end().map_err(store_err)?;

    if processed == total {
      tracing::info!(processed, total, "aggregation pass complete");
    } else {
      tracing::info!(processed, total, "aggregation pass interrupted");
    }

    Ok((processed, total))
  }
}
