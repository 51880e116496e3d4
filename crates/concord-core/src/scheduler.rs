//! `Scheduler` — the debounced background worker of §4.7/§4.8.
//!
//! `schedule()` may be called many times in a burst (one per ingested raw
//! contact); only one pass ever runs, `AGGREGATION_DELAY_MS` after the last
//! call. `interrupt()` cooperatively cancels a pass in progress at its next
//! per-raw-contact boundary; `stop()` tears the worker down entirely.

use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use tokio::{sync::Notify, task::JoinHandle, time};

use crate::{engine::Engine, external::EmailTokenizer, external::PhoneNormalizer, name::NicknameLookup, store::Store};

pub struct Scheduler {
  notify:  Arc<Notify>,
  cancel:  Arc<AtomicBool>,
  stopped: Arc<AtomicBool>,
  handle:  Option<JoinHandle<()>>,
}

impl Scheduler {
  /// Spawn the worker task against `engine`, debouncing by `delay`.
  pub fn start<S, N, P, E>(engine: Arc<Engine<S, N, P, E>>, delay: Duration) -> Self
  where
    S: Store + 'static,
    N: NicknameLookup + 'static,
    P: PhoneNormalizer + 'static,
    E: EmailTokenizer + 'static,
  {
    let notify = Arc::new(Notify::new());
    let cancel = Arc::new(AtomicBool::new(false));
    let stopped = Arc::new(AtomicBool::new(false));

    let worker_notify = notify.clone();
    let worker_cancel = cancel.clone();
    let worker_stopped = stopped.clone();

    let handle = tokio::spawn(async move {
      loop {
        worker_notify.notified().await;
        if worker_stopped.load(Ordering::SeqCst) {
          break;
        }

        // Debounce: every further schedule() call while we're waiting
        // resets the timer instead of queuing a second run.
        loop {
          tokio::select! {
            _ = time::sleep(delay) => break,
            _ = worker_notify.notified() => continue,
          }
        }

        if worker_stopped.load(Ordering::SeqCst) {
          break;
        }

        worker_cancel.store(false, Ordering::SeqCst);
        let engine = engine.clone();
        let pass_cancel = worker_cancel.clone();
        match tokio::task::spawn_blocking(move || engine.run_pass(&pass_cancel)).await {
          Ok(Ok(_)) => {}
          Ok(Err(err)) => tracing::warn!(error = %err, "aggregation pass failed"),
          Err(join_err) => tracing::warn!(error = %join_err, "aggregation pass task panicked"),
        }
      }
    });

    Self { notify, cancel, stopped, handle: Some(handle) }
  }

  /// Debounce a run. Safe to call from many places concurrently (once per
  /// ingested raw contact, typically).
  pub fn schedule(&self) { self.notify.notify_one(); }

  /// Ask the pass in progress to stop at its next per-raw-contact
  /// boundary. A raw contact already mid-aggregation always finishes.
  pub fn interrupt(&self) { self.cancel.store(true, Ordering::SeqCst); }

  /// Terminate the worker, interrupting any pass in progress. The name the
  /// external interface (§6) uses for this operation.
  pub async fn quit(self) { self.stop().await }

  /// Terminate the worker, interrupting any pass in progress.
  pub async fn stop(mut self) {
    self.stopped.store(true, Ordering::SeqCst);
    self.cancel.store(true, Ordering::SeqCst);
    self.notify.notify_one();
    if let Some(handle) = self.handle.take() {
      let _ = handle.await;
    }
  }
}
