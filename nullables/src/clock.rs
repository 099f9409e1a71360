//! Nullable clock: deterministic time for testing.

use futures_util::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::watch;

use vetted_types::{Clock, Timestamp};

/// A deterministic clock for testing.
///
/// Time only advances when you tell it to. Timers created through
/// [`Clock::sleep_until`] fire when an `advance` or `set` moves the clock
/// past their deadline. Clones share the same time.
#[derive(Clone)]
pub struct NullClock {
    current: Arc<watch::Sender<Timestamp>>,
}

impl NullClock {
    pub fn new(initial_secs: u64) -> Self {
        let (tx, _) = watch::channel(Timestamp::new(initial_secs));
        Self {
            current: Arc::new(tx),
        }
    }

    /// Get the current time.
    pub fn now(&self) -> Timestamp {
        *self.current.borrow()
    }

    /// Advance time by a number of seconds.
    pub fn advance(&self, secs: u64) {
        self.current.send_modify(|t| *t = t.plus_secs(secs));
    }

    /// Set the time to a specific value.
    pub fn set(&self, secs: u64) {
        self.current.send_replace(Timestamp::new(secs));
    }
}

impl Clock for NullClock {
    fn now(&self) -> Timestamp {
        NullClock::now(self)
    }

    fn sleep_until(&self, deadline: Timestamp) -> BoxFuture<'static, ()> {
        let mut rx = self.current.subscribe();
        Box::pin(async move {
            if rx.wait_for(|now| *now >= deadline).await.is_err() {
                // Clock dropped: time never advances again.
                std::future::pending::<()>().await;
            }
        })
    }
}
