//! Eager-or-final result slot.
//!
//! A verification run completes its slot at most twice: optionally once
//! early ("eager": enough is proven for callers that do not need every
//! proof), and exactly once at the end ("final"). The first write is what
//! non-blocking callers see; blocking callers wait for the final write. A
//! final write with no preceding eager write serves both.

use tokio::sync::watch;

use crate::{IdentifyError, VerificationResult};

/// What a run hands back to its callers.
pub type RunOutcome = Result<VerificationResult, IdentifyError>;

#[derive(Clone, Debug, Default)]
struct SlotState {
    first: Option<RunOutcome>,
    last: Option<RunOutcome>,
}

/// Writing half, owned by the run.
#[derive(Debug)]
pub struct EagerOrFinal {
    tx: watch::Sender<SlotState>,
}

impl EagerOrFinal {
    pub fn new() -> (Self, ResultWaiter) {
        let (tx, rx) = watch::channel(SlotState::default());
        (Self { tx }, ResultWaiter { rx })
    }

    /// Release non-blocking callers early. Returns `false` (and changes
    /// nothing) if a first result was already written.
    pub fn complete_eager(&self, outcome: RunOutcome) -> bool {
        self.tx.send_if_modified(|state| {
            if state.first.is_some() {
                return false;
            }
            state.first = Some(outcome);
            true
        })
    }

    /// Write the final result. Only the first call has any effect.
    pub fn complete_final(&self, outcome: RunOutcome) -> bool {
        self.tx.send_if_modified(|state| {
            if state.last.is_some() {
                return false;
            }
            if state.first.is_none() {
                state.first = Some(outcome.clone());
            }
            state.last = Some(outcome);
            true
        })
    }

    pub fn is_eager_complete(&self) -> bool {
        self.tx.borrow().first.is_some()
    }

    pub fn is_final_complete(&self) -> bool {
        self.tx.borrow().last.is_some()
    }

    pub fn subscribe(&self) -> ResultWaiter {
        ResultWaiter {
            rx: self.tx.subscribe(),
        }
    }
}

/// Reading half. Any number of waiters may observe the same slot.
#[derive(Clone, Debug)]
pub struct ResultWaiter {
    rx: watch::Receiver<SlotState>,
}

impl ResultWaiter {
    /// Wait for the first write, eager or final.
    ///
    /// If the run goes away without writing, the result is
    /// [`IdentifyError::DidNotComplete`].
    pub async fn wait_first(&mut self) -> RunOutcome {
        self.wait(|s| s.first.as_ref()).await
    }

    /// Wait for the final write.
    pub async fn wait_final(&mut self) -> RunOutcome {
        self.wait(|s| s.last.as_ref()).await
    }

    async fn wait(&mut self, pick: fn(&SlotState) -> Option<&RunOutcome>) -> RunOutcome {
        match self.rx.wait_for(|s| pick(s).is_some()).await {
            Ok(state) => pick(&state).cloned().unwrap_or(Err(IdentifyError::DidNotComplete)),
            Err(_) => Err(IdentifyError::DidNotComplete),
        }
    }

    /// The first write, if it already happened.
    pub fn peek_first(&self) -> Option<RunOutcome> {
        self.rx.borrow().first.clone()
    }
}
