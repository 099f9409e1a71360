//! Pre-built [`tracing::Span`] constructors for engine operations.
//!
//! Consistent span names and fields make it easy to correlate the step trace
//! of one verification run across its caller-side and background halves.

use tracing::{debug_span, info_span, Span};

use vetted_types::IdentityId;

/// Span covering one verification run, including its background continuation.
pub fn identify_span(id: IdentityId, assertion: &str) -> Span {
    info_span!("identify", identity = %id, assertion = %assertion)
}

/// Span covering one scheduled background re-verification.
pub fn watch_run_span(id: IdentityId) -> Span {
    info_span!("watch_run", identity = %id)
}

/// Span covering a single remote proof check.
pub fn proof_check_span(id: IdentityId, service: &str, value: &str) -> Span {
    debug_span!("proof_check", identity = %id, service = %service, value = %value)
}
