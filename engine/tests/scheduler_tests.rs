//! Integration tests for the background identifier.
//!
//! The scheduling loop runs on the real runtime while the virtual clock
//! decides when jobs fall due; events arrive through the observer channel.

mod common;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use common::{alice_id, bob_id, id, test_config, Harness};
use vetted_engine::{BackgroundIdentifier, EngineConfig, IdentifyError, ShutdownController, WatchEvent};
use vetted_types::ProofState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Watcher {
    h: Harness,
    bg: BackgroundIdentifier,
    events: mpsc::UnboundedReceiver<WatchEvent>,
    shutdown: ShutdownController,
    task: Option<JoinHandle<()>>,
}

impl Watcher {
    fn new() -> Self {
        Self::with_config(test_config())
    }

    fn with_config(config: EngineConfig) -> Self {
        let h = Harness::with_config(config);
        let bg = BackgroundIdentifier::new(h.ctx.clone());
        let (tx, events) = mpsc::unbounded_channel();
        bg.set_observer(tx);
        Self {
            h,
            bg,
            events,
            shutdown: ShutdownController::new(),
            task: None,
        }
    }

    fn start(&mut self) {
        self.task = Some(self.bg.spawn(&self.shutdown));
    }

    async fn next_event(&mut self) -> WatchEvent {
        tokio::time::timeout(Duration::from_secs(2), self.events.recv())
            .await
            .expect("no watch event within 2s")
            .expect("observer channel closed")
    }

    async fn assert_quiet(&mut self) {
        let got = tokio::time::timeout(Duration::from_millis(100), self.events.recv()).await;
        assert!(got.is_err(), "unexpected watch event: {got:?}");
    }

    /// Wait (in wall time) until `n` proof checks have started.
    async fn wait_for_checks(&self, n: usize) {
        for _ in 0..400 {
            if self.h.checker.calls() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("only {} proof checks started", self.h.checker.calls());
    }

    fn waits(&self) -> (u64, u64, u64) {
        let w = &self.h.ctx.config.watch;
        (w.wait_clean_secs, w.wait_soft_failure_secs, w.wait_hard_failure_secs)
    }
}

// ---------------------------------------------------------------------------
// 1. Backoff
// ---------------------------------------------------------------------------

#[tokio::test]
async fn runs_are_spaced_by_outcome() {
    let mut w = Watcher::new();
    let (clean, soft, _) = w.waits();
    w.start();

    // First run is due immediately.
    assert!(w.bg.add(alice_id()));
    let event = w.next_event().await;
    assert_eq!(event.identity, alice_id());
    assert_eq!(event.error, None);
    assert_eq!(event.previous_error, None);
    assert_eq!(w.h.checker.calls_for(alice_id()), 3);

    // Clean runs wait the full clean interval.
    w.h.clock.advance(clean - 1);
    w.assert_quiet().await;
    w.h.clock.advance(1);
    assert_eq!(w.next_event().await.error, None);
    assert_eq!(w.h.checker.calls_for(alice_id()), 6);

    // Removed: the pending entry fires without a run.
    assert!(w.bg.remove(alice_id()));
    w.h.clock.advance(clean);
    w.assert_quiet().await;
    assert_eq!(w.h.checker.calls_for(alice_id()), 6);

    // Re-added with a soft-broken proof.
    w.h.checker.set_state("twitter", "alice", ProofState::SoftBroken);
    assert!(w.bg.add(alice_id()));
    let event = w.next_event().await;
    assert!(matches!(event.error, Some(IdentifyError::ProofSoftFailure { .. })));
    assert_eq!(event.previous_error, None);

    w.h.clock.advance(soft - 1);
    w.assert_quiet().await;
    w.h.clock.advance(1);
    let event = w.next_event().await;
    assert!(matches!(event.error, Some(IdentifyError::ProofSoftFailure { .. })));
    assert!(matches!(
        event.previous_error,
        Some(IdentifyError::ProofSoftFailure { .. })
    ));
}

#[tokio::test]
async fn hard_failures_retry_soonest() {
    let mut w = Watcher::new();
    let (_, _, hard) = w.waits();
    w.start();

    w.bg.add(id(0x42));
    let event = w.next_event().await;
    assert_eq!(event.error, Some(IdentifyError::IdentityNotFound(id(0x42))));

    w.h.clock.advance(hard);
    let event = w.next_event().await;
    assert_eq!(event.previous_error, Some(IdentifyError::IdentityNotFound(id(0x42))));
    assert!(w.bg.is_watching(id(0x42)));
}

#[tokio::test]
async fn recovery_returns_to_the_clean_interval() {
    let mut w = Watcher::new();
    let (clean, soft, _) = w.waits();
    w.h.checker.set_state("github", "alice", ProofState::SoftBroken);
    w.start();

    w.bg.add(alice_id());
    assert!(w.next_event().await.error.is_some());

    w.h.checker.set_state("github", "alice", ProofState::Confirmed);
    w.h.clock.advance(soft);
    let event = w.next_event().await;
    assert_eq!(event.error, None);
    assert!(event.previous_error.is_some());

    w.h.clock.advance(soft);
    w.assert_quiet().await;
    w.h.clock.advance(clean - soft);
    assert_eq!(w.next_event().await.error, None);
}

#[tokio::test]
async fn background_runs_force_fresh_checks() {
    let mut w = Watcher::new();
    w.start();
    w.h.verifier(alice_id()).run().await.unwrap();
    w.h.settle().await;

    w.bg.add(alice_id());
    w.next_event().await;

    let log = w.h.checker.call_log();
    assert_eq!(log.len(), 6);
    assert!(log[3..].iter().all(|c| c.force));
}

// ---------------------------------------------------------------------------
// 2. Membership
// ---------------------------------------------------------------------------

#[tokio::test]
async fn removal_before_the_run_means_no_checks() {
    let mut w = Watcher::new();
    w.bg.add(alice_id());
    assert!(w.bg.remove(alice_id()));
    assert!(!w.bg.remove(alice_id()));

    w.start();
    w.bg.add(bob_id());
    assert_eq!(w.next_event().await.identity, bob_id());
    w.assert_quiet().await;
    assert_eq!(w.h.checker.calls_for(alice_id()), 0);
    assert_eq!(w.h.directory.loads(alice_id()), 0);
}

#[tokio::test]
async fn adding_twice_schedules_once() {
    let mut w = Watcher::new();
    assert!(w.bg.add(alice_id()));
    assert!(!w.bg.add(alice_id()));
    assert_eq!(w.bg.len(), 1);

    w.start();
    w.next_event().await;
    w.assert_quiet().await;
    assert_eq!(w.h.checker.calls_for(alice_id()), 3);
}

#[tokio::test]
async fn removal_during_a_run_stops_the_requeue() {
    let mut w = Watcher::new();
    let (clean, _, _) = w.waits();
    w.h.checker.hold("twitter", "alice");
    w.start();

    w.bg.add(alice_id());
    w.wait_for_checks(3).await;
    assert!(w.bg.remove(alice_id()));
    w.h.checker.release("twitter", "alice");

    // The in-flight run still reports, but is not scheduled again.
    assert_eq!(w.next_event().await.identity, alice_id());
    assert!(!w.bg.is_watching(alice_id()));
    w.h.clock.advance(clean);
    w.assert_quiet().await;
    assert_eq!(w.h.checker.calls_for(alice_id()), 3);
}

#[tokio::test]
async fn re_add_during_a_run_keeps_one_schedule() {
    let mut w = Watcher::new();
    let (clean, _, _) = w.waits();
    w.h.checker.hold("twitter", "alice");
    w.start();

    w.bg.add(alice_id());
    w.wait_for_checks(3).await;
    w.bg.remove(alice_id());
    assert!(w.bg.add(alice_id()));
    w.h.checker.release("twitter", "alice");

    // The finished run is not requeued; the re-added entry runs right away.
    w.next_event().await;
    let event = w.next_event().await;
    assert_eq!(event.previous_error, None);
    w.assert_quiet().await;
    assert_eq!(w.h.checker.calls_for(alice_id()), 6);

    w.h.clock.advance(clean);
    w.next_event().await;
    w.assert_quiet().await;
    assert_eq!(w.bg.len(), 1);
}

#[tokio::test]
async fn nil_identity_is_never_watched() {
    let w = Watcher::new();
    assert!(!w.bg.add(id(0)));
    assert!(w.bg.is_empty());
}

#[tokio::test]
async fn jobs_run_in_due_order() {
    let mut w = Watcher::new();
    w.bg.add(alice_id());
    w.h.clock.advance(5);
    w.bg.add(bob_id());
    w.start();

    assert_eq!(w.next_event().await.identity, alice_id());
    assert_eq!(w.next_event().await.identity, bob_id());
}

// ---------------------------------------------------------------------------
// 3. Delay slot and lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delay_slot_separates_consecutive_runs() {
    let mut config = test_config();
    config.watch.delay_slot_secs = 30;
    let mut w = Watcher::with_config(config);
    w.bg.add(alice_id());
    w.bg.add(bob_id());
    w.start();

    assert_eq!(w.next_event().await.identity, alice_id());
    w.assert_quiet().await;
    w.h.clock.advance(30);
    assert_eq!(w.next_event().await.identity, bob_id());
}

#[tokio::test]
async fn shutdown_stops_the_loop() {
    let mut w = Watcher::new();
    w.start();
    w.bg.add(alice_id());
    w.next_event().await;

    w.shutdown.shutdown();
    let task = w.task.take().expect("started");
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("loop did not stop")
        .expect("loop panicked");

    w.h.clock.advance(w.waits().0);
    w.assert_quiet().await;
}

#[tokio::test]
async fn disabled_identifier_returns_immediately() {
    let mut config = test_config();
    config.watch.enabled = false;
    let mut w = Watcher::with_config(config);
    w.bg.add(alice_id());
    w.start();

    let task = w.task.take().expect("started");
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("disabled loop kept running")
        .expect("loop panicked");
    assert_eq!(w.h.checker.calls(), 0);
}

#[tokio::test]
async fn watch_runs_are_counted() {
    let mut config = test_config();
    config.enable_metrics = true;
    let mut w = Watcher::with_config(config);
    w.start();
    w.bg.add(alice_id());
    w.bg.add(bob_id());
    w.next_event().await;
    w.next_event().await;

    let m = w.h.ctx.metrics.as_ref().expect("metrics enabled");
    assert_eq!(m.watch_runs.get(), 2);
    assert_eq!(m.watch_queue_len.get(), 2);
}
