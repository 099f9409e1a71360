//! Background re-identification of a watch list.
//!
//! A single loop keeps every watched identity fresh by re-running the
//! verifier for it, spacing runs by how the previous one went: a clean run
//! waits longest, a soft failure (might recover by itself) less, a hard
//! failure least.
//!
//! Jobs live in a min-heap ordered by `next_run_at`. Removal is lazy: it
//! only clears the identity's membership, and the orphaned heap entry is
//! discarded when it is popped. Each membership records the sequence number
//! of its live heap entry, so a remove followed by a re-add does not revive
//! the old entry.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::BoxFuture;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, Instrument};

use vetted_types::{format_duration, IdentityId, Timestamp};

use crate::config::WatchConfig;
use crate::tracing_spans::watch_run_span;
use crate::{
    FailureClass, IdentifyError, IdentifyOptions, IdentifyVerifier, ShutdownController,
    VerifierContext,
};

/// Reported to the observer after every scheduled run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    pub identity: IdentityId,
    pub error: Option<IdentifyError>,
    pub previous_error: Option<IdentifyError>,
}

struct ScheduledJob {
    id: IdentityId,
    next_run_at: Timestamp,
    /// Insertion order; also identifies the live entry for `id`.
    seq: u64,
    last_error: Option<IdentifyError>,
}

impl Eq for ScheduledJob {}

impl PartialEq for ScheduledJob {
    fn eq(&self, other: &Self) -> bool {
        self.next_run_at == other.next_run_at && self.seq == other.seq
    }
}

impl Ord for ScheduledJob {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: the earliest job, then the earliest
        // insertion, must compare greatest.
        other
            .next_run_at
            .cmp(&self.next_run_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ScheduledJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<ScheduledJob>,
    /// Watched identities and the `seq` of their live heap entry.
    members: HashMap<IdentityId, u64>,
    seq: u64,
}

impl Queue {
    fn push(&mut self, id: IdentityId, next_run_at: Timestamp, last_error: Option<IdentifyError>) {
        self.seq += 1;
        self.members.insert(id, self.seq);
        self.heap.push(ScheduledJob {
            id,
            next_run_at,
            seq: self.seq,
            last_error,
        });
    }

    fn is_live(&self, job: &ScheduledJob) -> bool {
        self.members.get(&job.id) == Some(&job.seq)
    }

    /// Pop the earliest live job due at `now`, discarding dead entries on
    /// the way.
    fn pop_due(&mut self, now: Timestamp) -> Option<ScheduledJob> {
        while self.heap.peek().is_some_and(|job| job.next_run_at <= now) {
            let job = self.heap.pop()?;
            if self.is_live(&job) {
                return Some(job);
            }
            debug!(identity = %job.id, "discarding removed watch entry");
        }
        None
    }

    fn next_due(&self) -> Option<Timestamp> {
        self.heap.peek().map(|job| job.next_run_at)
    }
}

struct Shared {
    ctx: VerifierContext,
    config: WatchConfig,
    queue: Mutex<Queue>,
    wake: Notify,
    observer: Mutex<Option<mpsc::UnboundedSender<WatchEvent>>>,
}

/// Keeps a watch list of identities verified in the background.
#[derive(Clone)]
pub struct BackgroundIdentifier {
    shared: Arc<Shared>,
}

impl BackgroundIdentifier {
    pub fn new(ctx: VerifierContext) -> Self {
        let config = ctx.config.watch.clone();
        Self {
            shared: Arc::new(Shared {
                ctx,
                config,
                queue: Mutex::new(Queue::default()),
                wake: Notify::new(),
                observer: Mutex::new(None),
            }),
        }
    }

    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start watching `id`; its first run is due immediately. Returns
    /// `false` if it was already watched.
    pub fn add(&self, id: IdentityId) -> bool {
        if id.is_nil() {
            return false;
        }
        let watched = {
            let mut queue = self.queue();
            if queue.members.contains_key(&id) {
                return false;
            }
            let now = self.shared.ctx.now();
            queue.push(id, now, None);
            queue.members.len()
        };
        debug!(identity = %id, "watching identity");
        self.shared.ctx.metrics(|m| m.watch_queue_len.set(watched as i64));
        self.shared.wake.notify_one();
        true
    }

    /// Stop watching `id`. Returns `false` if it was not watched.
    pub fn remove(&self, id: IdentityId) -> bool {
        let (removed, watched) = {
            let mut queue = self.queue();
            let removed = queue.members.remove(&id).is_some();
            (removed, queue.members.len())
        };
        if removed {
            debug!(identity = %id, "stopped watching identity");
            self.shared.ctx.metrics(|m| m.watch_queue_len.set(watched as i64));
        }
        removed
    }

    pub fn is_watching(&self, id: IdentityId) -> bool {
        self.queue().members.contains_key(&id)
    }

    /// Number of watched identities.
    pub fn len(&self) -> usize {
        self.queue().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receive a [`WatchEvent`] after every scheduled run.
    pub fn set_observer(&self, observer: mpsc::UnboundedSender<WatchEvent>) {
        *self
            .shared
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    /// Spawn the scheduling loop. It exits when `shutdown` fires.
    pub fn spawn(&self, shutdown: &ShutdownController) -> JoinHandle<()> {
        let this = self.clone();
        let stop = shutdown.subscribe();
        tokio::spawn(async move { this.run(stop).await })
    }

    /// The scheduling loop.
    pub async fn run(&self, mut stop: broadcast::Receiver<()>) {
        if !self.shared.config.enabled {
            info!("background identifier disabled");
            return;
        }
        let c = &self.shared.config;
        info!(
            clean = %format_duration(c.wait_clean_secs),
            soft = %format_duration(c.wait_soft_failure_secs),
            hard = %format_duration(c.wait_hard_failure_secs),
            "background identifier started"
        );

        loop {
            let next = self.queue().next_due();
            let timer: BoxFuture<'static, ()> = match next {
                Some(at) => self.shared.ctx.clock.sleep_until(at),
                None => Box::pin(std::future::pending()),
            };

            tokio::select! {
                _ = stop.recv() => break,
                _ = self.shared.wake.notified() => continue,
                _ = timer => {}
            }

            let now = self.shared.ctx.now();
            let due = self.queue().pop_due(now);
            let Some(job) = due else {
                continue;
            };
            self.run_job(job).await;

            let slot = c.delay_slot_secs;
            if slot > 0 {
                let resume = self.shared.ctx.now().plus_secs(slot);
                tokio::select! {
                    _ = stop.recv() => break,
                    _ = self.shared.ctx.clock.sleep_until(resume) => {}
                }
            }
        }
        info!("background identifier stopped");
    }

    async fn run_job(&self, job: ScheduledJob) {
        assert!(!job.id.is_nil(), "scheduled watch job without an identity");
        let ctx = &self.shared.ctx;
        let c = &self.shared.config;

        let outcome = IdentifyVerifier::new(ctx.clone(), job.id)
            .with_options(IdentifyOptions::background())
            .run()
            .instrument(watch_run_span(job.id))
            .await;
        ctx.metrics(|m| m.watch_runs.inc());

        let error = outcome.err();
        let wait = match error.as_ref().map(IdentifyError::failure_class) {
            None => c.wait_clean_secs,
            Some(FailureClass::Soft) => c.wait_soft_failure_secs,
            Some(FailureClass::Hard) => c.wait_hard_failure_secs,
        };
        let next_run_at = ctx.now().plus_secs(wait);

        // Requeue before telling anyone, so an observer that moves the
        // clock cannot get ahead of the new entry.
        let requeued = {
            let mut queue = self.queue();
            if queue.is_live(&job) {
                queue.push(job.id, next_run_at, error.clone());
                true
            } else {
                false
            }
        };
        match &error {
            None => debug!(identity = %job.id, requeued, next = %format_duration(wait), "watch run clean"),
            Some(e) => info!(identity = %job.id, requeued, error = %e, next = %format_duration(wait), "watch run failed"),
        }

        let event = WatchEvent {
            identity: job.id,
            error,
            previous_error: job.last_error,
        };
        let mut observer = self
            .shared
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = observer.as_ref() {
            if tx.send(event).is_err() {
                *observer = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> IdentityId {
        IdentityId::new([byte; 16])
    }

    #[test]
    fn heap_pops_earliest_first() {
        let mut q = Queue::default();
        q.push(id(1), Timestamp::new(30), None);
        q.push(id(2), Timestamp::new(10), None);
        q.push(id(3), Timestamp::new(20), None);

        assert_eq!(q.next_due(), Some(Timestamp::new(10)));
        let order: Vec<_> = std::iter::from_fn(|| q.pop_due(Timestamp::new(100)))
            .map(|j| j.id)
            .collect();
        assert_eq!(order, vec![id(2), id(3), id(1)]);
    }

    #[test]
    fn nothing_pops_before_due() {
        let mut q = Queue::default();
        q.push(id(1), Timestamp::new(50), None);
        assert!(q.pop_due(Timestamp::new(49)).is_none());
        assert!(q.pop_due(Timestamp::new(50)).is_some());
    }

    #[test]
    fn removed_entries_are_discarded_lazily() {
        let mut q = Queue::default();
        q.push(id(1), Timestamp::new(10), None);
        q.push(id(2), Timestamp::new(20), None);
        q.members.remove(&id(1));
        assert_eq!(q.heap.len(), 2);

        let job = q.pop_due(Timestamp::new(100)).unwrap();
        assert_eq!(job.id, id(2));
        assert!(q.heap.is_empty());
    }

    #[test]
    fn re_add_does_not_revive_old_entry() {
        let mut q = Queue::default();
        q.push(id(1), Timestamp::new(10), None);
        q.members.remove(&id(1));
        q.push(id(1), Timestamp::new(40), None);

        assert!(q.pop_due(Timestamp::new(20)).is_none());
        let job = q.pop_due(Timestamp::new(40)).unwrap();
        assert_eq!(job.next_run_at, Timestamp::new(40));
        assert!(q.pop_due(Timestamp::new(100)).is_none());
    }
}
