//! The per-request verification state machine.
//!
//! A run has two halves. The caller half parses the assertion, answers from
//! the fast cache when it can, and otherwise takes the identity's
//! single-flight lock. The lock is then moved into a spawned continuation
//! that loads the identity, checks local assertions, consults the slow
//! cache, and runs the proof checks. The caller waits on the run's
//! [`EagerOrFinal`] slot and may be released before the continuation is
//! done; the continuation always writes the final result, updates the cache
//! and only then lets go of the lock.

use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, warn, Instrument};

use vetted_assertion::{AssertionSet, PartialMatch, ProofSet, ProofSetMatcher};
use vetted_store::{IdentifyOutcome, ProofResult, TrackRecord};
use vetted_types::{IdentityId, IdentitySnapshot, ProofFact, ProofState, Timestamp};

use crate::cache::VerificationRecord;
use crate::lock_table::NamedLockGuard;
use crate::result_slot::{EagerOrFinal, ResultWaiter, RunOutcome};
use crate::tracing_spans::{identify_span, proof_check_span};
use crate::{
    IdentifyError, IdentifyOptions, ProofBreak, ResultSource, VerificationResult, VerifierContext,
};

/// One verification request.
pub struct IdentifyVerifier {
    ctx: VerifierContext,
    target: IdentityId,
    assertion: String,
    options: IdentifyOptions,
}

/// Caller-side view of a started run.
#[derive(Clone, Debug)]
pub struct RunHandle {
    waiter: ResultWaiter,
}

impl RunHandle {
    fn ready(outcome: RunOutcome) -> Self {
        let (slot, waiter) = EagerOrFinal::new();
        slot.complete_final(outcome);
        Self { waiter }
    }

    /// The first result: eager, partial, or final.
    pub async fn first(&mut self) -> RunOutcome {
        self.waiter.wait_first().await
    }

    /// The final result, after every proof check and the cache write.
    pub async fn finished(&mut self) -> RunOutcome {
        self.waiter.wait_final().await
    }

    async fn wait(&mut self, options: &IdentifyOptions) -> RunOutcome {
        if options.blocks_until_final() {
            self.finished().await
        } else {
            self.first().await
        }
    }
}

impl IdentifyVerifier {
    pub fn new(ctx: VerifierContext, target: IdentityId) -> Self {
        Self {
            ctx,
            target,
            assertion: String::new(),
            options: IdentifyOptions::default(),
        }
    }

    pub fn with_assertion(mut self, assertion: impl Into<String>) -> Self {
        self.assertion = assertion.into();
        self
    }

    pub fn with_options(mut self, options: IdentifyOptions) -> Self {
        self.options = options;
        self
    }

    /// Verify and wait as the options ask: for the first result by
    /// default, for the final one with `always_block` or `need_proof_set`.
    pub async fn run(&self) -> RunOutcome {
        let started = Instant::now();
        let wait = async {
            let mut handle = self.start().await;
            handle.wait(&self.options).await
        };
        let outcome = match self.options.timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .unwrap_or(Err(IdentifyError::DidNotComplete)),
            None => wait.await,
        };
        self.ctx.metrics(|m| {
            m.identify_duration_ms
                .observe(started.elapsed().as_secs_f64() * 1000.0)
        });
        outcome
    }

    /// Start the run and return a handle for its results.
    ///
    /// Resolves once the run either answered from the fast cache, failed
    /// before loading anything, or owns the identity's lock and has handed
    /// it to its background continuation.
    pub async fn start(&self) -> RunHandle {
        let span = identify_span(self.target, &self.assertion);
        self.start_inner().instrument(span).await
    }

    async fn start_inner(&self) -> RunHandle {
        self.ctx.metrics(|m| m.identify_runs.inc());

        if self.target.is_nil() {
            return RunHandle::ready(Err(IdentifyError::NoIdentityId));
        }
        let assertions = match AssertionSet::parse(&self.assertion) {
            Ok(set) => set,
            Err(e) => return RunHandle::ready(Err(e.into())),
        };

        // The fast tier only answers "is this still them", never an assertion.
        let fast_allowed = assertions.is_empty() && self.options.allows_early_outs();
        if fast_allowed {
            if let Some(hit) = self.fast_hit(false) {
                return RunHandle::ready(Ok(hit));
            }
        }

        let guard = self.ctx.locks.acquire(self.target).await;
        self.ctx.update_lock_gauge();

        // Whoever held the lock before us may have just filled the cache.
        if fast_allowed {
            if let Some(hit) = self.fast_hit(true) {
                drop(guard);
                self.ctx.update_lock_gauge();
                return RunHandle::ready(Ok(hit));
            }
        }

        let (slot, waiter) = EagerOrFinal::new();
        let continuation = Continuation {
            ctx: self.ctx.clone(),
            target: self.target,
            assertions,
            options: self.options.clone(),
            slot,
            lock: guard,
        };
        tokio::spawn(continuation.run().in_current_span());
        RunHandle { waiter }
    }

    /// Tier stats count one fast lookup per request, so the recheck after
    /// taking the lock peeks.
    fn fast_hit(&self, recheck: bool) -> Option<VerificationResult> {
        let now = self.ctx.now();
        let tolerate = self.options.warn_on_broken_proofs;
        let record = if recheck {
            self.ctx.cache.fast_peek(self.target, now, tolerate)
        } else {
            self.ctx.cache.fast_check(self.target, now, tolerate)
        }?;
        debug!(identity = %self.target, recheck, "fast cache hit");
        self.ctx.metrics(|m| m.fast_cache_hits.inc());
        Some(result_from_record(&record, ResultSource::FastCache))
    }
}

fn result_from_record(record: &VerificationRecord, source: ResultSource) -> VerificationResult {
    VerificationResult::new(
        record.snapshot.clone(),
        record.last_fully_identified_at,
        source,
    )
    .with_breaks(record.breaks.clone())
}

/// The background half of a run. Owns the identity's lock until dropped.
struct Continuation {
    ctx: VerifierContext,
    target: IdentityId,
    assertions: AssertionSet,
    options: IdentifyOptions,
    slot: EagerOrFinal,
    lock: NamedLockGuard,
}

impl Continuation {
    async fn run(self) {
        self.ctx.notify_started(self.target);

        let outcome = self.verify().await;
        match &outcome {
            Ok(result) => debug!(identity = %self.target, source = ?result.source, "identify finished"),
            Err(e) => debug!(identity = %self.target, error = %e, "identify failed"),
        }

        let summary = IdentifyOutcome {
            error: outcome.as_ref().err().map(ToString::to_string),
            breaks: outcome.as_ref().map_or(0, |r| r.breaks.len()),
        };
        self.ctx.notify_finished(self.target, &summary);
        self.slot.complete_final(outcome);

        let ctx = self.ctx.clone();
        drop(self.lock);
        ctx.update_lock_gauge();
    }

    async fn verify(&self) -> RunOutcome {
        let now = self.ctx.now();
        let opts = &self.options;
        let has_remote = self.assertions.has_remote();

        let (me, them) = tokio::join!(self.load_self(), self.ctx.users.load_by_id(self.target));
        let me = me?;
        let them = Arc::new(them?);
        if them.is_deleted() && !opts.allow_deleted_users {
            return Err(IdentifyError::IdentityDeleted(self.target));
        }

        let base = ProofSet::from_facts(them.base_facts());
        if !self.assertions.local().match_set(&base) {
            return Err(IdentifyError::UnmetLocalAssertion(
                self.assertions.local().to_string(),
            ));
        }

        let is_self = me.as_ref().is_some_and(|m| m.id == self.target);
        if is_self && !opts.no_skip_self && !has_remote && !opts.need_proof_set {
            debug!(identity = %self.target, "self identify short-circuit");
            self.ctx
                .cache
                .insert(VerificationRecord::new(them.clone(), self.ctx.now()));
            return Ok(VerificationResult::new(them, now, ResultSource::SelfLoad));
        }

        if opts.skip_external_checks {
            return Ok(self.attach_proof_set(
                VerificationResult::new(them, now, ResultSource::SkippedExternalChecks),
                base,
            ));
        }

        if them.is_deleted() {
            // Loaded only because deleted identities were allowed. A deleted
            // identity proves nothing remote.
            if has_remote {
                return Err(self.unmet_remote());
            }
            return Ok(VerificationResult::new(them, now, ResultSource::Live));
        }

        if !has_remote && opts.allows_early_outs() {
            if let Some(record) = self.ctx.cache.slow_check(
                self.target,
                &them.freshness,
                now,
                opts.warn_on_broken_proofs,
            ) {
                debug!(identity = %self.target, "slow cache hit");
                self.ctx.metrics(|m| m.slow_cache_hits.inc());
                return Ok(result_from_record(&record, ResultSource::SlowCache));
            }
        }

        let track = self.lookup_track(me.as_ref()).await;
        let tracking = track.is_some();

        if !tracking && !has_remote && opts.allow_untracked_fast_path && opts.allows_early_outs() {
            return Ok(VerificationResult::new(
                them,
                now,
                ResultSource::UntrackedFastPath,
            ));
        }

        // Every asserted remote factor must at least be claimed.
        let claimed = them.claimed_facts();
        let unclaimed = self
            .assertions
            .remote()
            .factors()
            .iter()
            .any(|factor| !claimed.iter().any(|fact| factor.names(fact)));
        if unclaimed {
            return Err(self.unmet_remote());
        }

        if !tracking && !has_remote && !opts.need_proof_set {
            self.release_early(Ok(VerificationResult::new(
                them.clone(),
                now,
                ResultSource::Eager,
            )));
        }

        self.check_proofs(them, base, track.as_ref(), now).await
    }

    async fn check_proofs(
        &self,
        them: Arc<IdentitySnapshot>,
        base: ProofSet,
        track: Option<&TrackRecord>,
        now: Timestamp,
    ) -> RunOutcome {
        let opts = &self.options;
        let has_remote = self.assertions.has_remote();
        let partial_allowed = has_remote && track.is_none() && !opts.need_proof_set;
        let force = opts.force_remote_check;

        let mut checks: FuturesUnordered<_> = them
            .proofs
            .iter()
            .cloned()
            .map(|claim| {
                let checker = self.ctx.checker.clone();
                let span = proof_check_span(self.target, &claim.service, &claim.value);
                let owner = self.target;
                async move { checker.check(owner, claim, force).await }.instrument(span)
            })
            .collect();

        let mut matcher = ProofSetMatcher::new(self.assertions.remote().clone(), base);
        let mut results: Vec<ProofResult> = Vec::with_capacity(them.proofs.len());
        let mut disqualified: Option<ProofResult> = None;

        while let Some(result) = checks.next().await {
            let fact = result.to_fact();
            debug!(identity = %self.target, proof = %fact, state = ?fact.state, "proof checked");
            self.ctx.metrics(|m| {
                m.proof_checks.inc();
                if fact.state.is_broken() {
                    m.proof_failures.inc();
                }
            });
            self.ctx.notify_proof(self.target, &fact);

            match matcher.observe(fact) {
                PartialMatch::Satisfied if partial_allowed => {
                    self.release_early(Ok(VerificationResult::new(
                        them.clone(),
                        now,
                        ResultSource::Partial,
                    )));
                }
                PartialMatch::Disqualified(_) if disqualified.is_none() => {
                    let err = proof_error(&result_break(&result));
                    disqualified = Some(result.clone());
                    if partial_allowed {
                        self.release_early(Err(err));
                    }
                }
                _ => {}
            }
            results.push(result);
        }

        if let Some(failed) = disqualified {
            return Err(proof_error(&result_break(&failed)));
        }
        if has_remote && !matcher.is_satisfied() {
            return Err(self.unmet_remote());
        }

        let mut breaks = track
            .map(|t| tracking_breaks(t, &them))
            .unwrap_or_default();
        breaks.extend(
            results
                .iter()
                .filter(|r| r.state.is_broken())
                .map(result_break),
        );
        if !breaks.is_empty() && !opts.warn_on_broken_proofs {
            let worst = breaks
                .iter()
                .find(|b| b.is_hard())
                .unwrap_or(&breaks[0]);
            return Err(proof_error(worst));
        }
        if !breaks.is_empty() {
            warn!(identity = %self.target, breaks = breaks.len(), "identify succeeded with broken proofs");
        }

        let identified_at = self.ctx.now();
        if !has_remote {
            self.ctx.cache.insert(
                VerificationRecord::new(them.clone(), identified_at).with_breaks(breaks.clone()),
            );
        }
        let result = VerificationResult::new(them, identified_at, ResultSource::Live).with_breaks(breaks);
        Ok(self.attach_proof_set(result, matcher.into_received()))
    }

    async fn load_self(&self) -> Result<Option<IdentitySnapshot>, IdentifyError> {
        if self.options.act_logged_out {
            return Ok(None);
        }
        Ok(self.ctx.users.load_self().await?)
    }

    async fn lookup_track(&self, me: Option<&IdentitySnapshot>) -> Option<TrackRecord> {
        let (me, store) = (me?, self.ctx.tracks.as_ref()?);
        match store.lookup(me.id, self.target).await {
            Ok(record) => record,
            Err(e) => {
                warn!(identity = %self.target, error = %e, "track lookup failed, treating as untracked");
                None
            }
        }
    }

    fn release_early(&self, outcome: RunOutcome) {
        if self.slot.complete_eager(outcome) {
            debug!(identity = %self.target, "caller released early");
            self.ctx.metrics(|m| m.eager_unblocks.inc());
        }
    }

    fn unmet_remote(&self) -> IdentifyError {
        IdentifyError::UnmetRemoteAssertion(self.assertions.remote().to_string())
    }

    fn attach_proof_set(&self, result: VerificationResult, proof_set: ProofSet) -> VerificationResult {
        if self.options.need_proof_set {
            result.with_proof_set(proof_set)
        } else {
            result
        }
    }
}

fn result_break(result: &ProofResult) -> ProofBreak {
    let reason = result
        .detail
        .clone()
        .unwrap_or_else(|| "proof check failed".to_string());
    ProofBreak::new(result.to_fact(), reason)
}

fn proof_error(brk: &ProofBreak) -> IdentifyError {
    let proof = brk.proof.to_string();
    let reason = brk.reason.clone();
    if brk.is_hard() {
        IdentifyError::ProofHardFailure { proof, reason }
    } else {
        IdentifyError::ProofSoftFailure { proof, reason }
    }
}

/// Differences between a tracking statement and the identity as it is now
/// that proof checks alone cannot see: tracked proofs that are no longer
/// claimed, tracked keys that are no longer live.
fn tracking_breaks(track: &TrackRecord, them: &IdentitySnapshot) -> Vec<ProofBreak> {
    let missing_proofs = track
        .proofs
        .iter()
        .filter(|tracked| tracked.state.is_confirmed())
        .filter(|tracked| {
            !them
                .proofs
                .iter()
                .any(|c| c.service == tracked.key && c.value == tracked.value)
        })
        .map(|tracked| {
            ProofBreak::new(
                ProofFact::new(tracked.key.clone(), tracked.value.clone(), ProofState::HardBroken),
                "tracked proof is no longer claimed",
            )
        });
    let missing_keys = track
        .key_kids
        .iter()
        .filter(|kid| !them.keys.live().any(|k| &k.kid == *kid))
        .map(|kid| {
            ProofBreak::new(
                ProofFact::new("kid", kid.clone(), ProofState::HardBroken),
                "tracked key was revoked or removed",
            )
        });
    missing_proofs.chain(missing_keys).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vetted_types::{ProofClaim, PublicKeyEntry};

    #[test]
    fn tracking_breaks_flag_missing_proofs_and_keys() {
        let id = IdentityId::new([1; 16]);
        let them = IdentitySnapshot::new(id, "alice")
            .with_key(PublicKeyEntry::new("k1"))
            .with_proof(ProofClaim::new("twitter", "alice", "l1"));
        let track = TrackRecord::new(IdentityId::new([2; 16]), id, Timestamp::EPOCH)
            .with_key("k1")
            .with_key("k0")
            .with_proof(ProofFact::confirmed("twitter", "alice"))
            .with_proof(ProofFact::confirmed("github", "alice"))
            .with_proof(ProofFact::new("reddit", "alice", ProofState::SoftBroken));

        let breaks = tracking_breaks(&track, &them);
        let names: Vec<_> = breaks.iter().map(|b| b.proof.to_string()).collect();
        assert_eq!(names, vec!["alice@github", "k0@kid"]);
        assert!(breaks.iter().all(ProofBreak::is_hard));
    }

    #[test]
    fn proof_error_follows_break_severity() {
        let soft = ProofBreak::new(ProofFact::new("dns", "a.com", ProofState::SoftBroken), "timeout");
        let hard = ProofBreak::new(ProofFact::new("dns", "a.com", ProofState::HardBroken), "gone");
        assert!(matches!(proof_error(&soft), IdentifyError::ProofSoftFailure { .. }));
        assert!(matches!(proof_error(&hard), IdentifyError::ProofHardFailure { .. }));
    }
}
